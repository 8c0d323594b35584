//! Logical SockJS sessions.
//!
//! A session outlives the HTTP requests that carry it. Every transport talks
//! to it through the same small surface: attach a receiver to pull frames,
//! push inbound messages, or close. All mutation happens under the
//! per-session `parking_lot::Mutex`; waiting receivers are woken through a
//! `tokio::sync::Notify`.

mod receiver;
mod registry;
mod request;

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use sockjs_common::{CloseReason, Frame};
use tokio::sync::{mpsc, Notify};

use crate::handler::{SockJsSocket, SocketHandler};

pub use receiver::{Attach, Receiver, ReceiverSlot};
pub use registry::SessionRegistry;
pub use request::RequestInfo;

/// Lifecycle phase. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Which family of transport backs the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// HTTP polling and streaming transports. Survives between requests.
    Polling,
    /// Framed or raw websocket. Lives exactly as long as its connection.
    WebSocket,
}

/// Returned when an operation needs an open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session is not open")]
pub struct SessionClosed;

struct SessionState {
    phase: Phase,
    outbound: Vec<String>,
    close: Option<CloseReason>,
    slot: ReceiverSlot,
    inbound_tx: Option<mpsc::UnboundedSender<String>>,
    /// Handed to the application socket on open.
    inbound_rx: Option<mpsc::UnboundedReceiver<String>>,
    last_detach_at: Instant,
}

pub struct Session {
    id: String,
    kind: SessionKind,
    handler: Arc<dyn SocketHandler>,
    state: Mutex<SessionState>,
    changed: Notify,
    request: RequestInfo,
    created_at: Instant,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        kind: SessionKind,
        handler: Arc<dyn SocketHandler>,
        request: RequestInfo,
    ) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let now = Instant::now();
        Arc::new(Self {
            id: id.into(),
            kind,
            handler,
            state: Mutex::new(SessionState {
                phase: Phase::Connecting,
                outbound: Vec::new(),
                close: None,
                slot: ReceiverSlot::default(),
                inbound_tx: Some(inbound_tx),
                inbound_rx: Some(inbound_rx),
                last_detach_at: now,
            }),
            changed: Notify::new(),
            request,
            created_at: now,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// The request that opened this session.
    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    /// The recorded close, if any.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.state.lock().close.clone()
    }

    /// Try to become this session's receiver.
    ///
    /// A recorded close with nothing left to flush is replayed instead of
    /// attaching, and marks the session closed.
    pub fn attach(self: &Arc<Self>) -> Attach {
        let mut st = self.state.lock();
        if let Some(close) = st.close.clone() {
            if st.outbound.is_empty() {
                st.phase = Phase::Closed;
                return Attach::Closed(close);
            }
        }

        let receiver_id = sockjs_common::id::prefixed_ulid(sockjs_common::id::prefix::RECEIVER);
        if !st.slot.occupy(&receiver_id) {
            tracing::debug!(session_id = %self.id, "receiver rejected, slot occupied");
            return Attach::Busy;
        }
        tracing::debug!(session_id = %self.id, %receiver_id, "receiver attached");
        Attach::Receiver(Receiver::new(Arc::clone(self), receiver_id))
    }

    /// Queue an application message for the next delivery.
    pub fn enqueue(&self, message: String) -> Result<(), SessionClosed> {
        let mut st = self.state.lock();
        if st.phase != Phase::Open {
            return Err(SessionClosed);
        }
        if message.is_empty() {
            return Ok(());
        }
        st.outbound.push(message);
        drop(st);
        self.changed.notify_waiters();
        Ok(())
    }

    /// Hand messages received from the client to the application.
    pub fn push_inbound(&self, messages: Vec<String>) -> Result<(), SessionClosed> {
        let st = self.state.lock();
        let tx = st.inbound_tx.as_ref().ok_or(SessionClosed)?;
        for message in messages {
            // The application may have stopped reading; that is its choice.
            let _ = tx.send(message);
        }
        Ok(())
    }

    /// Record the application's close. The first close wins.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let mut st = self.state.lock();
        if !self.record_close(&mut st, CloseReason::new(code, reason)) {
            return;
        }
        drop(st);
        self.changed.notify_waiters();
    }

    /// Tear the session down for good. Used on eviction and when a
    /// websocket connection goes away.
    pub fn terminate(&self) {
        let mut st = self.state.lock();
        if st.close.is_none() {
            st.close = Some(CloseReason::go_away());
        }
        st.phase = Phase::Closed;
        st.outbound.clear();
        st.inbound_tx = None;
        st.inbound_rx = None;
        drop(st);
        self.changed.notify_waiters();
    }

    /// When the slot has been empty since, or `None` while a receiver is
    /// attached.
    pub fn idle_since(&self) -> Option<Instant> {
        let st = self.state.lock();
        (!st.slot.is_occupied()).then_some(st.last_detach_at)
    }

    fn record_close(&self, st: &mut SessionState, close: CloseReason) -> bool {
        if st.close.is_some() {
            return false;
        }
        tracing::info!(
            session_id = %self.id,
            code = close.code,
            reason = %close.reason,
            "session closing"
        );
        st.close = Some(close);
        st.phase = match self.kind {
            SessionKind::WebSocket => Phase::Closed,
            SessionKind::Polling => st.phase.max(Phase::Closing),
        };
        st.inbound_tx = None;
        st.inbound_rx = None;
        true
    }

    /// Take the next deliverable frame, if one is ready.
    fn take_ready_frame(self: &Arc<Self>) -> Option<Frame> {
        let mut st = self.state.lock();
        let phase = st.phase;
        match phase {
            Phase::Connecting => {
                st.phase = Phase::Open;
                let inbound = st.inbound_rx.take();
                drop(st);
                if let Some(inbound) = inbound {
                    self.spawn_handler(inbound);
                }
                Some(Frame::Open)
            }
            Phase::Open => {
                (!st.outbound.is_empty()).then(|| Frame::Array(std::mem::take(&mut st.outbound)))
            }
            Phase::Closing | Phase::Closed => {
                if !st.outbound.is_empty() {
                    return Some(Frame::Array(std::mem::take(&mut st.outbound)));
                }
                st.phase = Phase::Closed;
                st.close.clone().map(Frame::Close)
            }
        }
    }

    fn detach(&self, receiver_id: &str, graceful: bool) {
        let mut st = self.state.lock();
        if !st.slot.release(receiver_id) {
            return;
        }
        st.last_detach_at = Instant::now();
        if graceful {
            tracing::debug!(session_id = %self.id, %receiver_id, "receiver detached");
            return;
        }

        tracing::debug!(session_id = %self.id, %receiver_id, "receiver interrupted");
        match self.kind {
            SessionKind::Polling => {
                self.record_close(&mut st, CloseReason::connection_interrupted());
            }
            SessionKind::WebSocket => {
                if st.close.is_none() {
                    st.close = Some(CloseReason::connection_interrupted());
                }
                st.phase = Phase::Closed;
                st.outbound.clear();
                st.inbound_tx = None;
                st.inbound_rx = None;
            }
        }
        drop(st);
        self.changed.notify_waiters();
    }

    fn spawn_handler(self: &Arc<Self>, inbound: mpsc::UnboundedReceiver<String>) {
        let socket = SockJsSocket::new(Arc::clone(self), inbound);
        tracing::info!(
            session_id = %self.id,
            socket_id = %socket.id(),
            kind = ?self.kind,
            "session opened"
        );
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            handler.on_open(socket).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sockjs_common::frame::close_code;

    use super::*;
    use crate::handler::EchoHandler;

    const HEARTBEAT: Duration = Duration::from_secs(5);

    struct IdleHandler;

    #[async_trait::async_trait]
    impl SocketHandler for IdleHandler {
        async fn on_open(&self, _socket: SockJsSocket) {}
    }

    fn polling_session(handler: Arc<dyn SocketHandler>) -> Arc<Session> {
        Session::new("s1", SessionKind::Polling, handler, RequestInfo::default())
    }

    fn expect_receiver(attach: Attach) -> Receiver {
        match attach {
            Attach::Receiver(receiver) => receiver,
            other => panic!("expected a receiver, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_receiver_gets_open_frame() {
        let session = polling_session(Arc::new(IdleHandler));
        assert_eq!(session.phase(), Phase::Connecting);

        let mut receiver = expect_receiver(session.attach());
        assert_eq!(receiver.next_frame(HEARTBEAT).await, Frame::Open);
        receiver.finish();
        assert_eq!(session.phase(), Phase::Open);
    }

    #[tokio::test]
    async fn sends_between_deliveries_coalesce() {
        let session = polling_session(Arc::new(IdleHandler));
        expect_receiver(session.attach()).finish_after_open().await;

        session.enqueue("a".into()).unwrap();
        session.enqueue("".into()).unwrap();
        session.enqueue("b".into()).unwrap();

        let mut receiver = expect_receiver(session.attach());
        assert_eq!(
            receiver.next_frame(HEARTBEAT).await,
            Frame::Array(vec!["a".into(), "b".into()])
        );
    }

    #[tokio::test]
    async fn enqueue_requires_open_session() {
        let session = polling_session(Arc::new(IdleHandler));
        assert_eq!(session.enqueue("early".into()), Err(SessionClosed));

        expect_receiver(session.attach()).finish_after_open().await;
        session.close(close_code::GO_AWAY, "Go away!");
        assert_eq!(session.enqueue("late".into()), Err(SessionClosed));
    }

    #[tokio::test]
    async fn second_receiver_is_rejected() {
        let session = polling_session(Arc::new(IdleHandler));
        let _first = expect_receiver(session.attach());
        assert!(matches!(session.attach(), Attach::Busy));
    }

    #[tokio::test]
    async fn waiting_receiver_wakes_on_enqueue() {
        let session = polling_session(Arc::new(IdleHandler));
        expect_receiver(session.attach()).finish_after_open().await;

        let mut receiver = expect_receiver(session.attach());
        let sender = Arc::clone(&session);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender.enqueue("late".into()).unwrap();
        });
        assert_eq!(
            receiver.next_frame(HEARTBEAT).await,
            Frame::Array(vec!["late".into()])
        );
    }

    #[tokio::test]
    async fn idle_receiver_gets_heartbeat() {
        let session = polling_session(Arc::new(IdleHandler));
        expect_receiver(session.attach()).finish_after_open().await;

        let mut receiver = expect_receiver(session.attach());
        assert_eq!(
            receiver.next_frame(Duration::from_millis(30)).await,
            Frame::Heartbeat
        );
    }

    #[tokio::test]
    async fn close_is_replayed_to_every_later_receiver() {
        let session = polling_session(Arc::new(IdleHandler));
        expect_receiver(session.attach()).finish_after_open().await;

        session.close(close_code::GO_AWAY, "Go away!");
        session.close(4000, "ignored");
        assert_eq!(session.phase(), Phase::Closing);

        for _ in 0..2 {
            match session.attach() {
                Attach::Closed(close) => assert_eq!(close, CloseReason::go_away()),
                other => panic!("expected close replay, got {other:?}"),
            }
        }
        assert_eq!(session.phase(), Phase::Closed);
    }

    #[tokio::test]
    async fn pending_messages_flush_before_close() {
        let session = polling_session(Arc::new(IdleHandler));
        expect_receiver(session.attach()).finish_after_open().await;

        session.enqueue("last words".into()).unwrap();
        session.close(close_code::GO_AWAY, "Go away!");

        let mut receiver = expect_receiver(session.attach());
        assert_eq!(
            receiver.next_frame(HEARTBEAT).await,
            Frame::Array(vec!["last words".into()])
        );
        assert_eq!(
            receiver.next_frame(HEARTBEAT).await,
            Frame::Close(CloseReason::go_away())
        );
    }

    #[tokio::test]
    async fn interrupted_polling_receiver_records_1002() {
        let session = polling_session(Arc::new(IdleHandler));
        expect_receiver(session.attach()).finish_after_open().await;

        let receiver = expect_receiver(session.attach());
        drop(receiver);

        match session.attach() {
            Attach::Closed(close) => assert_eq!(close, CloseReason::connection_interrupted()),
            other => panic!("expected interruption close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn websocket_session_terminates_on_drop() {
        let session = Session::new(
            "ws",
            SessionKind::WebSocket,
            Arc::new(IdleHandler),
            RequestInfo::default(),
        );
        let mut receiver = expect_receiver(session.attach());
        assert_eq!(receiver.next_frame(HEARTBEAT).await, Frame::Open);
        drop(receiver);
        assert_eq!(session.phase(), Phase::Closed);
    }

    #[tokio::test]
    async fn websocket_close_skips_closing() {
        let session = Session::new(
            "ws",
            SessionKind::WebSocket,
            Arc::new(IdleHandler),
            RequestInfo::default(),
        );
        let mut receiver = expect_receiver(session.attach());
        receiver.next_frame(HEARTBEAT).await;
        session.close(close_code::GO_AWAY, "Go away!");
        assert_eq!(session.phase(), Phase::Closed);
        assert_eq!(
            receiver.next_frame(HEARTBEAT).await,
            Frame::Close(CloseReason::go_away())
        );
    }

    #[tokio::test]
    async fn inbound_messages_reach_the_handler() {
        let session = polling_session(Arc::new(EchoHandler));
        let mut receiver = expect_receiver(session.attach());
        assert_eq!(receiver.next_frame(HEARTBEAT).await, Frame::Open);

        session.push_inbound(vec!["x".into(), "y".into()]).unwrap();

        let mut delivered = Vec::new();
        while delivered.len() < 2 {
            match receiver.next_frame(HEARTBEAT).await {
                Frame::Array(messages) => delivered.extend(messages),
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert_eq!(delivered, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn closed_session_refuses_inbound() {
        let session = polling_session(Arc::new(IdleHandler));
        session.terminate();
        assert_eq!(session.push_inbound(vec!["x".into()]), Err(SessionClosed));
        assert!(matches!(session.attach(), Attach::Closed(_)));
    }

    impl Receiver {
        /// Test helper: consume the open frame and detach gracefully.
        async fn finish_after_open(mut self) {
            assert_eq!(self.next_frame(HEARTBEAT).await, Frame::Open);
            self.finish();
        }
    }
}
