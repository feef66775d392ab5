//! Group-session transport abstraction.
//!
//! The engine never owns a network protocol. It talks to a group session
//! through [`GroupSession`] and learns about new sessions through a
//! [`SessionSource`]. Implementations must deliver messages reliably and in
//! order per sender.

mod memory;
mod websocket;

pub use memory::{MemoryHub, MemorySession, MemorySource};
pub use websocket::{RelayConfig, RelaySession, RelaySource};

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::membership::Participant;

/// Boxed future for transport operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Who a message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    /// Every other participant of the session.
    All,
    /// Only the listed participants.
    Only(HashSet<Participant>),
}

impl Recipients {
    /// Whether `participant` should receive a message sent by `sender`.
    pub fn includes(&self, participant: &Participant, sender: &Participant) -> bool {
        if participant == sender {
            return false;
        }
        match self {
            Recipients::All => true,
            Recipients::Only(set) => set.contains(participant),
        }
    }
}

/// Lifecycle states reported by a group session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSessionState {
    /// Announced but not yet joined.
    Waiting,
    /// Joined; messages can flow.
    Joined,
    /// Ended locally, by a peer, or by the system.
    Invalidated,
}

/// Notifications delivered by a group session, in order.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(GroupSessionState),
    ParticipantsChanged(HashSet<Participant>),
    Message { bytes: Vec<u8>, from: Participant },
}

/// Send errors.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Session not joined")]
    NotJoined,
    #[error("Session closed")]
    Closed,
}

/// Reasons a requested session did not start.
#[derive(Debug, Clone, Error)]
pub enum ActivationError {
    #[error("Activation cancelled")]
    Cancelled,
    #[error("Group activities are disabled")]
    Disabled,
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// One shared session, as exposed by the transport.
pub trait GroupSession: Send + Sync {
    /// Identity of this device in the session.
    fn local_participant(&self) -> Participant;

    /// Join the session. Readiness is reported through
    /// [`SessionEvent::StateChanged`].
    fn join(&self);

    /// Send an encoded message.
    fn send(&self, bytes: Vec<u8>, to: Recipients) -> BoxFuture<'_, Result<(), SendError>>;

    /// Leave the session. The transport reports `Invalidated` afterwards.
    fn end(&self);
}

/// A session announced by a [`SessionSource`], with its event stream.
///
/// The event stream is not restartable: once it ends, the session is over.
pub struct AnnouncedSession {
    pub session: Arc<dyn GroupSession>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl std::fmt::Debug for AnnouncedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnouncedSession")
            .field("local", &self.session.local_participant())
            .finish_non_exhaustive()
    }
}

/// Announces group sessions this device is invited into.
pub trait SessionSource: Send {
    /// Ask the platform to start a new shared session.
    ///
    /// The returned future does not borrow the source: it may still be
    /// running while the source announces sessions.
    fn activate(&self) -> BoxFuture<'static, Result<(), ActivationError>>;

    /// Wait for the next announced session. `None` once the source is closed.
    ///
    /// Must be cancel-safe: dropping the future loses no announcement.
    fn next_session(&mut self) -> BoxFuture<'_, Option<AnnouncedSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipients_never_include_sender() {
        let me = Participant::new();
        assert!(!Recipients::All.includes(&me, &me));

        let only = Recipients::Only([me].into_iter().collect());
        assert!(!only.includes(&me, &me));
    }

    #[test]
    fn test_recipients_subset() {
        let (sender, a, b) = (Participant::new(), Participant::new(), Participant::new());
        let only = Recipients::Only([a].into_iter().collect());

        assert!(only.includes(&a, &sender));
        assert!(!only.includes(&b, &sender));
        assert!(Recipients::All.includes(&b, &sender));
    }
}
