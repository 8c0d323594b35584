//! Single-receiver enforcement and the receiving end of a session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sockjs_common::{CloseReason, Frame};
use tokio::time::{self, Instant};

use super::Session;

/// Holds the id of the one receiver currently entitled to a session's
/// frames.
#[derive(Debug, Default)]
pub struct ReceiverSlot {
    occupant: Option<String>,
}

impl ReceiverSlot {
    /// Occupy the slot. Returns false if someone else holds it.
    pub fn occupy(&mut self, receiver_id: &str) -> bool {
        if self.occupant.is_some() {
            return false;
        }
        self.occupant = Some(receiver_id.to_string());
        true
    }

    /// Release the slot if `receiver_id` holds it.
    pub fn release(&mut self, receiver_id: &str) -> bool {
        if self.occupant.as_deref() != Some(receiver_id) {
            return false;
        }
        self.occupant = None;
        true
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }
}

/// Outcome of [`Session::attach`].
#[derive(Debug)]
pub enum Attach {
    Receiver(Receiver),
    /// Another receiver is attached; reply with the 2010 close frame.
    Busy,
    /// The session has closed; reply with its close frame.
    Closed(CloseReason),
}

/// The attached receiving end of a session.
///
/// Call [`Receiver::finish`] when the response completed normally. A
/// receiver dropped without finishing counts as an interrupted connection.
pub struct Receiver {
    session: Arc<Session>,
    id: String,
    finished: bool,
    /// When the pending heartbeat is due. Cleared whenever a frame is
    /// handed out, so it survives a cancelled `next_frame`.
    heartbeat_due: Option<Instant>,
}

impl Receiver {
    pub(super) fn new(session: Arc<Session>, id: String) -> Self {
        Self {
            session,
            id,
            finished: false,
            heartbeat_due: None,
        }
    }

    /// Wait for the next frame. Yields a heartbeat if nothing becomes ready
    /// within `heartbeat` of the previous frame.
    ///
    /// Cancel safe: dropping the future keeps the heartbeat deadline, so a
    /// caller polling this in a `select!` loop still gets its heartbeat on
    /// time.
    pub async fn next_frame(&mut self, heartbeat: Duration) -> Frame {
        let deadline = *self
            .heartbeat_due
            .get_or_insert_with(|| Instant::now() + heartbeat);
        let frame = loop {
            let changed = self.session.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if let Some(frame) = self.session.take_ready_frame() {
                break frame;
            }
            if time::timeout_at(deadline, changed).await.is_err() {
                break Frame::Heartbeat;
            }
        };
        self.heartbeat_due = None;
        frame
    }

    /// Detach after a completed response.
    pub fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.session.detach(&self.id, self.finished);
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("session_id", &self.session.id())
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{SockJsSocket, SocketHandler};
    use crate::session::{RequestInfo, SessionKind};

    #[test]
    fn slot_holds_one_occupant() {
        let mut slot = ReceiverSlot::default();
        assert!(slot.occupy("rcv_1"));
        assert!(!slot.occupy("rcv_2"));
        assert!(slot.is_occupied());
    }

    #[test]
    fn only_the_occupant_can_release() {
        let mut slot = ReceiverSlot::default();
        slot.occupy("rcv_1");
        assert!(!slot.release("rcv_2"));
        assert!(slot.is_occupied());
        assert!(slot.release("rcv_1"));
        assert!(!slot.is_occupied());
        assert!(slot.occupy("rcv_2"));
    }

    #[tokio::test]
    async fn heartbeat_deadline_survives_cancelled_waits() {
        struct IdleHandler;

        #[async_trait::async_trait]
        impl SocketHandler for IdleHandler {
            async fn on_open(&self, _socket: SockJsSocket) {}
        }

        let session = Session::new(
            "hb",
            SessionKind::Polling,
            Arc::new(IdleHandler),
            RequestInfo::default(),
        );
        let mut receiver = match session.attach() {
            Attach::Receiver(receiver) => receiver,
            other => panic!("expected a receiver, got {other:?}"),
        };
        assert_eq!(receiver.next_frame(Duration::from_secs(1)).await, Frame::Open);

        // Keep interrupting the wait well before the heartbeat is due, the
        // way a websocket loop does when client traffic arrives.
        let heartbeat = Duration::from_millis(300);
        let started = Instant::now();
        let frame = loop {
            match time::timeout(Duration::from_millis(50), receiver.next_frame(heartbeat)).await {
                Ok(frame) => break frame,
                Err(_) => assert!(started.elapsed() < Duration::from_secs(2), "no heartbeat"),
            }
        };
        assert_eq!(frame, Frame::Heartbeat);
        assert!(started.elapsed() < Duration::from_millis(600));
        receiver.finish();
    }
}
