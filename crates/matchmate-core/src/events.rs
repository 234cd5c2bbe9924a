//! Session-change notifications.
//!
//! Replaces a process-wide emitter: the bus is created by the caller and
//! handed to whoever publishes or listens.

use tokio::sync::broadcast;
use tracing::debug;

/// Buffer size for the event channel.
/// Auth events are rare; a slow listener only ever misses stale ones.
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn,
    LoggedOut,
    /// The refresh token was rejected and the session was cleared.
    SessionExpired,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish to every current listener. Returns how many received it;
    /// having none is not an error.
    pub fn publish(&self, event: AuthEvent) -> usize {
        let delivered = self.sender.send(event).unwrap_or(0);
        debug!(?event, listeners = delivered, "Auth event published");
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_listeners() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(AuthEvent::LoggedOut), 0);
    }

    #[tokio::test]
    async fn test_listeners_receive_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let other = bus.clone();

        assert_eq!(bus.publish(AuthEvent::LoggedIn), 1);
        other.publish(AuthEvent::LoggedOut);

        assert_eq!(rx.recv().await.unwrap(), AuthEvent::LoggedIn);
        assert_eq!(rx.recv().await.unwrap(), AuthEvent::LoggedOut);
    }
}
