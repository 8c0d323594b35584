//! Receiving HTTP transports: polling (xhr, jsonp) and streaming
//! (xhr_streaming, eventsource, htmlfile).

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::HeaderValue;
use axum::response::Response;
use sockjs_common::{CloseReason, Frame};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::framing::{callback_param, Framing};
use super::http::NO_CACHE;
use super::SessionPath;
use crate::error::SockJsError;
use crate::gc::ByteBudget;
use crate::session::{Attach, RequestInfo, Session};
use crate::ServiceState;

/// Chunks buffered between the delivery task and the response body.
const RESPONSE_BUFFER: usize = 16;

type Chunk = Result<String, Infallible>;

pub(super) async fn xhr(
    State(state): State<ServiceState>,
    path: SessionPath,
    request: RequestInfo,
) -> Response {
    open_receiver(&state, &path, request, Framing::Xhr)
}

pub(super) async fn xhr_streaming(
    State(state): State<ServiceState>,
    path: SessionPath,
    request: RequestInfo,
) -> Response {
    open_receiver(&state, &path, request, Framing::XhrStreaming)
}

pub(super) async fn eventsource(
    State(state): State<ServiceState>,
    path: SessionPath,
    request: RequestInfo,
) -> Response {
    open_receiver(&state, &path, request, Framing::EventSource)
}

pub(super) async fn htmlfile(
    State(state): State<ServiceState>,
    path: SessionPath,
    request: RequestInfo,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, SockJsError> {
    let callback = callback_param(&query)?;
    Ok(open_receiver(&state, &path, request, Framing::HtmlFile { callback }))
}

pub(super) async fn jsonp(
    State(state): State<ServiceState>,
    path: SessionPath,
    request: RequestInfo,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, SockJsError> {
    let callback = callback_param(&query)?;
    Ok(open_receiver(&state, &path, request, Framing::Jsonp { callback }))
}

/// Start a response body fed by a delivery task bound to the session.
fn open_receiver(
    state: &ServiceState,
    path: &SessionPath,
    request: RequestInfo,
    framing: Framing,
) -> Response {
    tracing::trace!(
        server_id = %path.server_id,
        session_id = %path.session_id,
        transport = framing.name(),
        "receiver requested"
    );
    let session = state.registry.get_or_create(&path.session_id, request);
    let (tx, rx) = mpsc::channel::<Chunk>(RESPONSE_BUFFER);

    let mut resp = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    let headers = resp.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(framing.content_type()));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    if matches!(framing, Framing::Jsonp { .. }) {
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    }

    let delivery = Delivery {
        session,
        framing,
        heartbeat: state.options.heartbeat_interval,
        max_bytes: state.options.max_bytes_streaming,
    };
    tokio::spawn(delivery.run(tx));
    resp
}

struct Delivery {
    session: Arc<Session>,
    framing: Framing,
    heartbeat: Duration,
    max_bytes: usize,
}

impl Delivery {
    async fn run(self, tx: mpsc::Sender<Chunk>) {
        let session_id = self.session.id().to_string();
        let transport = self.framing.name();

        if let Some(prelude) = self.framing.prelude() {
            if tx.send(Ok(prelude)).await.is_err() {
                return;
            }
        }

        let mut receiver = match self.session.attach() {
            Attach::Receiver(receiver) => receiver,
            Attach::Busy => {
                let frame = Frame::Close(CloseReason::another_connection_open());
                let _ = tx.send(Ok(self.framing.wrap(&frame))).await;
                return;
            }
            Attach::Closed(close) => {
                let _ = tx.send(Ok(self.framing.wrap(&Frame::Close(close)))).await;
                return;
            }
        };

        let mut budget = ByteBudget::new(self.max_bytes);
        loop {
            let frame = tokio::select! {
                frame = receiver.next_frame(self.heartbeat) => frame,
                _ = tx.closed() => {
                    tracing::debug!(%session_id, transport, "client went away while waiting");
                    return;
                }
            };

            let closing = matches!(frame, Frame::Close(_));
            let chunk = self.framing.wrap(&frame);
            let written = chunk.len();
            if tx.send(Ok(chunk)).await.is_err() {
                tracing::debug!(%session_id, transport, "client went away mid-write");
                return;
            }

            if closing || !self.framing.is_streaming() {
                break;
            }
            if budget.record(written) {
                tracing::debug!(%session_id, transport, sent = budget.sent(), "streaming response reached byte limit");
                break;
            }
        }
        receiver.finish();
    }
}
