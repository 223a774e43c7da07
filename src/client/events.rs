//! Process-wide authentication notifications.
//!
//! The API client emits [`AuthEvent::AuthFailed`] when a `401` could not be
//! recovered by refreshing the token. UI layers subscribe to react, for
//! example by navigating to the login screen.
//!
//! ```
//! use dashboard_client::client::{AuthEvent, AuthEventBus};
//!
//! let bus = AuthEventBus::new();
//! let mut events = bus.subscribe();
//! bus.emit(AuthEvent::AuthFailed);
//! assert_eq!(events.try_recv().unwrap(), AuthEvent::AuthFailed);
//! ```

use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 16;

/// Authentication lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// Token refresh failed after a `401`; the session has been cleared
    AuthFailed,
}

/// Broadcast bus for [`AuthEvent`]s.
#[derive(Debug, Clone)]
pub struct AuthEventBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl AuthEventBus {
    /// A bus with no subscribers.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Register a new listener. It only sees events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    /// Deliver `event` to every current subscriber.
    pub fn emit(&self, event: AuthEvent) {
        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::debug!(?event, delivered, "auth event emitted");
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuthEventBus {
    fn default() -> Self {
        Self::new()
    }
}
