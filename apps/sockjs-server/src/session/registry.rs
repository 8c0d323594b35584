//! Per-service table of polling sessions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::{RequestInfo, Session, SessionKind};
use crate::handler::SocketHandler;

/// Owns every HTTP-backed session of one service, keyed by session id.
///
/// Websocket sessions are never registered. They live exactly as long as
/// their connection, and their ids may repeat.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    handler: Arc<dyn SocketHandler>,
    disconnect_timeout: Duration,
    sweeper: CancellationToken,
}

impl SessionRegistry {
    pub fn new(handler: Arc<dyn SocketHandler>, disconnect_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            handler,
            disconnect_timeout,
            sweeper: CancellationToken::new(),
        }
    }

    /// The application handler sessions of this service are opened with.
    pub fn handler(&self) -> &Arc<dyn SocketHandler> {
        &self.handler
    }

    /// Return the session for `session_id`, creating it from `request` if
    /// unseen.
    pub fn get_or_create(&self, session_id: &str, request: RequestInfo) -> Arc<Session> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(%session_id, "session created");
                Session::new(
                    session_id,
                    SessionKind::Polling,
                    Arc::clone(&self.handler),
                    request,
                )
            })
            .value()
            .clone()
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    /// Remove a session and terminate it. Handles still held by in-flight
    /// requests observe it as closed.
    pub fn evict(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some((_, session)) => {
                session.terminate();
                tracing::debug!(
                    %session_id,
                    age_ms = session.created_at.elapsed().as_millis() as u64,
                    "session evicted"
                );
                true
            }
            None => false,
        }
    }

    /// Evict every session that has gone without a receiver for at least
    /// the disconnect timeout. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let timeout = self.disconnect_timeout;
        let mut expired = Vec::new();
        self.sessions.retain(|_, session| {
            let idle = session
                .idle_since()
                .is_some_and(|since| now.saturating_duration_since(since) >= timeout);
            if idle {
                expired.push(Arc::clone(session));
            }
            !idle
        });
        for session in &expired {
            session.terminate();
            tracing::debug!(
                session_id = %session.id(),
                age_ms = session.created_at.elapsed().as_millis() as u64,
                "idle session evicted"
            );
        }
        expired.len()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until
    /// [`shutdown`](Self::shutdown).
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let cancel = self.sweeper.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // First tick fires immediately; skip it.
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = registry.sweep();
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = registry.len(), "session sweep");
                        }
                    }
                }
            }
        })
    }

    /// Stop the sweeper and evict every session.
    pub fn shutdown(&self) {
        self.sweeper.cancel();
        let ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        for id in &ids {
            self.evict(id);
        }
        tracing::info!(evicted = ids.len(), "session registry shut down");
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{EchoHandler, SockJsSocket};
    use crate::session::{Attach, Phase};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn make_registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(EchoHandler), TIMEOUT)
    }

    #[test]
    fn get_or_create_returns_same_session() {
        let registry = make_registry();
        let a = registry.get_or_create("abc", RequestInfo::default());
        let b = registry.get_or_create("abc", RequestInfo::default());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert_eq!(a.phase(), Phase::Connecting);
    }

    #[test]
    fn get_returns_none_for_unknown() {
        let registry = make_registry();
        assert!(registry.get("bogus").is_none());
    }

    #[test]
    fn evict_terminates_session() {
        let registry = make_registry();
        let session = registry.get_or_create("abc", RequestInfo::default());
        assert!(registry.evict("abc"));
        assert!(!registry.evict("abc"));
        assert!(registry.get("abc").is_none());
        assert_eq!(session.phase(), Phase::Closed);
    }

    #[test]
    fn sweep_removes_idle_sessions() {
        let registry = make_registry();
        registry.get_or_create("s1", RequestInfo::default());
        registry.get_or_create("s2", RequestInfo::default());

        // Nothing has been idle long enough yet.
        assert_eq!(registry.sweep(), 0);

        let later = Instant::now() + TIMEOUT;
        assert_eq!(registry.sweep_at(later), 2);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn sweep_keeps_sessions_with_a_receiver() {
        let registry = make_registry();
        let busy = registry.get_or_create("busy", RequestInfo::default());
        registry.get_or_create("idle", RequestInfo::default());

        let _receiver = match busy.attach() {
            Attach::Receiver(receiver) => receiver,
            other => panic!("expected a receiver, got {other:?}"),
        };

        let later = Instant::now() + TIMEOUT * 2;
        assert_eq!(registry.sweep_at(later), 1);
        assert!(registry.get("busy").is_some());
        assert!(registry.get("idle").is_none());
    }

    #[tokio::test]
    async fn shutdown_evicts_everything() {
        let registry = Arc::new(make_registry());
        let sweeper = registry.spawn_sweeper(Duration::from_millis(10));
        registry.get_or_create("s1", RequestInfo::default());
        registry.get_or_create("s2", RequestInfo::default());

        registry.shutdown();
        assert!(registry.is_empty());
        sweeper.await.unwrap();
    }

    #[test]
    fn registry_hands_out_its_handler() {
        struct Marker;

        #[async_trait::async_trait]
        impl SocketHandler for Marker {
            async fn on_open(&self, _socket: SockJsSocket) {}
        }

        let handler: Arc<dyn SocketHandler> = Arc::new(Marker);
        let registry = SessionRegistry::new(Arc::clone(&handler), TIMEOUT);
        assert!(Arc::ptr_eq(registry.handler(), &handler));
    }
}
