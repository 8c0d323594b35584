//! Framed (`/<server>/<session>/websocket`) and raw (`/websocket`)
//! websocket transports.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use sockjs_common::frame::close_code;
use sockjs_common::id::{prefix, prefixed_ulid};
use sockjs_common::{decode_messages, CloseReason, Frame};

use super::SessionPath;
use crate::error::SockJsError;
use crate::session::{Attach, Receiver, RequestInfo, Session, SessionKind};
use crate::ServiceState;

type WsSink = SplitSink<WebSocket, Message>;

pub(super) async fn framed(
    State(state): State<ServiceState>,
    method: Method,
    path: SessionPath,
    request: RequestInfo,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, SockJsError> {
    let ws = checked_upgrade(&method, ws)?;
    let session = Session::new(
        path.session_id,
        SessionKind::WebSocket,
        Arc::clone(state.registry.handler()),
        request,
    );
    let heartbeat = state.options.heartbeat_interval;
    Ok(ws
        .on_upgrade(move |socket| run_framed(socket, session, heartbeat))
        .into_response())
}

pub(super) async fn raw(
    State(state): State<ServiceState>,
    method: Method,
    request: RequestInfo,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, SockJsError> {
    let ws = checked_upgrade(&method, ws)?;
    let session = Session::new(
        prefixed_ulid(prefix::RAW_SESSION),
        SessionKind::WebSocket,
        Arc::clone(state.registry.handler()),
        request,
    );
    let heartbeat = state.options.heartbeat_interval;
    Ok(ws
        .on_upgrade(move |socket| run_raw(socket, session, heartbeat))
        .into_response())
}

fn checked_upgrade(
    method: &Method,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<WebSocketUpgrade, SockJsError> {
    if method != Method::GET {
        return Err(SockJsError::MethodNotAllowed);
    }
    ws.map_err(|rejection| {
        tracing::debug!(%rejection, "invalid websocket handshake");
        SockJsError::InvalidUpgradeRequest
    })
}

/// Only 1000 and the 3000-4999 application range may be sent in a close
/// frame by an endpoint.
fn wire_close_code(code: u16) -> u16 {
    match code {
        close_code::NORMAL_CLOSURE | 3000..=4999 => code,
        _ => close_code::NORMAL_CLOSURE,
    }
}

async fn send_close(ws_tx: &mut WsSink, close: &CloseReason) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code: wire_close_code(close.code),
        reason: close.reason.clone().into(),
    }));
    ws_tx.send(close_msg).await
}

fn attach_fresh(session: &Arc<Session>) -> Option<Receiver> {
    match session.attach() {
        Attach::Receiver(receiver) => Some(receiver),
        other => {
            tracing::debug!(session_id = %session.id(), outcome = ?other, "fresh websocket session refused a receiver");
            None
        }
    }
}

async fn run_framed(socket: WebSocket, session: Arc<Session>, heartbeat: Duration) {
    let Some(mut receiver) = attach_fresh(&session) else {
        return;
    };
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            frame = receiver.next_frame(heartbeat) => {
                let text = frame.encode();
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
                if let Frame::Close(close) = frame {
                    let _ = send_close(&mut ws_tx, &close).await;
                    receiver.finish();
                    break;
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(err) = deliver_framed(&session, text.as_str()) {
                            tracing::warn!(session_id = %session.id(), %err, "broken JSON on websocket, dropping connection");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(?e, session_id = %session.id(), "ws read error");
                        break;
                    }
                }
            }
        }
    }

    session.terminate();
    tracing::info!(session_id = %session.id(), "websocket session ended");
}

/// Empty text and empty arrays carry no messages and are ignored.
fn deliver_framed(session: &Session, text: &str) -> Result<(), serde_json::Error> {
    if text.is_empty() {
        return Ok(());
    }
    let messages = decode_messages(text)?;
    if !messages.is_empty() {
        let _ = session.push_inbound(messages);
    }
    Ok(())
}

async fn run_raw(socket: WebSocket, session: Arc<Session>, heartbeat: Duration) {
    let Some(mut receiver) = attach_fresh(&session) else {
        return;
    };
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            frame = receiver.next_frame(heartbeat) => {
                match frame {
                    Frame::Open | Frame::Heartbeat => continue,
                    Frame::Array(messages) => {
                        if !send_raw(&mut ws_tx, messages).await {
                            break;
                        }
                    }
                    Frame::Close(close) => {
                        let _ = send_close(&mut ws_tx, &close).await;
                        receiver.finish();
                        break;
                    }
                }
            }

            msg = ws_rx.next() => {
                if !receive_raw(&session, msg) {
                    break;
                }
            }
        }
    }

    session.terminate();
    tracing::info!(session_id = %session.id(), "raw websocket session ended");
}

async fn send_raw(ws_tx: &mut WsSink, messages: Vec<String>) -> bool {
    for message in messages {
        if ws_tx.send(Message::Text(message.into())).await.is_err() {
            return false;
        }
    }
    true
}

/// Returns false once the connection is done.
fn receive_raw(session: &Session, msg: Option<Result<Message, axum::Error>>) -> bool {
    let text = match msg {
        Some(Ok(Message::Text(text))) => text.as_str().to_string(),
        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => text,
            Err(_) => {
                tracing::debug!(session_id = %session.id(), "ignoring non-UTF-8 binary message");
                return true;
            }
        },
        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => return true,
        Some(Ok(Message::Close(_))) | None => return false,
        Some(Err(e)) => {
            tracing::debug!(?e, session_id = %session.id(), "ws read error");
            return false;
        }
    };
    let _ = session.push_inbound(vec![text]);
    true
}
