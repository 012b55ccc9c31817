use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

/// One outbound item on a session's stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Announces the session id to the peer. Always the first frame.
    Connection(String),
    Message(serde_json::Value),
    Keepalive,
}

impl Frame {
    /// Encode as a `text/event-stream` block.
    pub fn encode(&self) -> String {
        match self {
            Frame::Connection(id) => format!(
                "event: connection\ndata: {}\n\n",
                serde_json::json!({ "connectionId": id })
            ),
            Frame::Message(value) => format!("data: {}\n\n", value),
            Frame::Keepalive => ": keepalive\n\n".to_string(),
        }
    }
}

/// Where a delivered message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Addressed,
    /// Sent to every live session; the count may be zero.
    Broadcast(usize),
}

/// Live streaming sessions, each with an unbounded FIFO queue.
///
/// Safe under concurrent open, close, and delivery. Independent instances
/// share nothing.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, mpsc::UnboundedSender<Frame>>>,
    keepalive: Duration,
}

impl SessionRegistry {
    pub fn new(keepalive: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            keepalive,
        })
    }

    /// Register a fresh session and queue its announcement frame.
    pub fn open_session(self: &Arc<Self>) -> SessionStream {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Frame::Connection(id.clone()));

        let live = {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            sessions.insert(id.clone(), tx);
            sessions.len()
        };
        info!(connection_id = %id, live, "Session opened");

        SessionStream {
            id,
            rx,
            keepalive: self.keepalive,
            registry: Arc::clone(self),
        }
    }

    /// Deregister a session and discard its queue. Idempotent.
    pub fn close_session(&self, id: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some();
        if removed {
            info!(connection_id = %id, "Session closed");
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    pub fn live_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Enqueue `message` on the addressed session when it is live, otherwise
    /// on every live session.
    pub fn deliver(&self, addressed: Option<&str>, message: serde_json::Value) -> Delivery {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());

        if let Some(tx) = addressed.and_then(|id| sessions.get(id)) {
            if tx.send(Frame::Message(message.clone())).is_ok() {
                debug!(connection_id = ?addressed, "Delivered to addressed session");
                return Delivery::Addressed;
            }
        }

        let mut sent = 0;
        for tx in sessions.values() {
            if tx.send(Frame::Message(message.clone())).is_ok() {
                sent += 1;
            }
        }
        debug!(addressed = ?addressed, sessions = sent, "Broadcast message");
        Delivery::Broadcast(sent)
    }
}

/// The consuming end of a session. Dropping it closes the session.
pub struct SessionStream {
    id: String,
    rx: mpsc::UnboundedReceiver<Frame>,
    keepalive: Duration,
    registry: Arc<SessionRegistry>,
}

impl SessionStream {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next frame, or a keepalive after the idle interval. `None` once the
    /// session has been closed.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        match tokio::time::timeout(self.keepalive, self.rx.recv()).await {
            Ok(frame) => frame,
            Err(_) => Some(Frame::Keepalive),
        }
    }

    /// Encoded SSE text, one frame at a time, until the session closes.
    pub fn into_event_stream(
        mut self,
    ) -> impl futures::Stream<Item = Result<String, std::convert::Infallible>> + Send {
        async_stream::stream! {
            while let Some(frame) = self.next_frame().await {
                yield Ok(frame.encode());
            }
        }
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        self.registry.close_session(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Arc<SessionRegistry> {
        SessionRegistry::new(Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_first_frame_announces_id() {
        let reg = registry();
        let mut session = reg.open_session();
        let first = session.next_frame().await.unwrap();
        assert_eq!(first, Frame::Connection(session.id().to_string()));
        assert!(reg.contains(session.id()));
    }

    #[tokio::test]
    async fn test_addressed_delivery_is_fifo() {
        let reg = registry();
        let mut a = reg.open_session();
        let mut b = reg.open_session();
        a.next_frame().await;
        b.next_frame().await;

        for i in 0..3 {
            assert_eq!(reg.deliver(Some(a.id()), json!(i)), Delivery::Addressed);
        }
        for i in 0..3 {
            assert_eq!(a.next_frame().await, Some(Frame::Message(json!(i))));
        }
        assert!(b.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_address_broadcasts() {
        let reg = registry();
        let mut a = reg.open_session();
        let mut b = reg.open_session();
        a.next_frame().await;
        b.next_frame().await;

        assert_eq!(reg.deliver(Some("gone"), json!("x")), Delivery::Broadcast(2));
        assert_eq!(reg.deliver(None, json!("y")), Delivery::Broadcast(2));
        assert_eq!(a.next_frame().await, Some(Frame::Message(json!("x"))));
        assert_eq!(b.next_frame().await, Some(Frame::Message(json!("x"))));
        assert_eq!(b.next_frame().await, Some(Frame::Message(json!("y"))));
    }

    #[tokio::test]
    async fn test_closed_session_falls_back_to_broadcast() {
        let reg = registry();
        let closed = reg.open_session();
        let closed_id = closed.id().to_string();
        let mut other = reg.open_session();
        other.next_frame().await;

        drop(closed);
        assert!(!reg.contains(&closed_id));
        assert!(!reg.close_session(&closed_id));

        assert_eq!(reg.deliver(Some(&closed_id), json!(1)), Delivery::Broadcast(1));
        assert_eq!(other.next_frame().await, Some(Frame::Message(json!(1))));

        drop(other);
        assert_eq!(reg.deliver(Some(&closed_id), json!(2)), Delivery::Broadcast(0));
        assert_eq!(reg.live_count(), 0);
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let reg = registry();
        let mut session = reg.open_session();
        session.next_frame().await;
        let id = session.id().to_string();
        assert!(reg.close_session(&id));
        assert_eq!(session.next_frame().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_emits_keepalive() {
        let reg = registry();
        let mut session = reg.open_session();
        session.next_frame().await;
        assert_eq!(session.next_frame().await, Some(Frame::Keepalive));

        reg.deliver(Some(session.id()), json!("after"));
        assert_eq!(session.next_frame().await, Some(Frame::Message(json!("after"))));
    }

    #[test]
    fn test_frame_encoding() {
        assert_eq!(
            Frame::Connection("abc".into()).encode(),
            "event: connection\ndata: {\"connectionId\":\"abc\"}\n\n"
        );
        assert_eq!(Frame::Message(json!({"a": 1})).encode(), "data: {\"a\":1}\n\n");
        assert_eq!(Frame::Keepalive.encode(), ": keepalive\n\n");
    }

    #[tokio::test]
    async fn test_concurrent_open_close_deliver() {
        let reg = registry();
        let mut handles = Vec::new();
        for i in 0..16 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move {
                let mut s = reg.open_session();
                s.next_frame().await;
                reg.deliver(Some(s.id()), json!(i));
                s.next_frame().await
            }));
        }
        for h in handles {
            assert!(matches!(h.await.unwrap(), Some(Frame::Message(_))));
        }
        assert_eq!(reg.live_count(), 0);
    }
}
