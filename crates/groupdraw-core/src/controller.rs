//! Synchronization controller.
//!
//! Applies inbound messages to the local drawing, decides when to emit
//! catch-up versus incremental messages, and owns the session state machine.
//! The controller is synchronous: outbound messages are queued and drained by
//! whoever owns it (see [`crate::session`]).

use std::collections::HashSet;

use crate::drawing::Drawing;
use crate::membership::{MembershipChange, MembershipTracker, Participant};
use crate::message::{self, DecodeError, SyncMessage};
use crate::stroke::Stroke;
use crate::transport::Recipients;

/// Session lifecycle as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session. Local edits stay local.
    #[default]
    Idle,
    /// A session is configured but its transport is not ready yet.
    Joining,
    /// Transport ready; messages flow both ways.
    Active,
    /// The last session ended. Waiting for the next one.
    Invalidated,
}

/// A message waiting to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub message: SyncMessage,
    pub recipients: Recipients,
}

/// Keeps one peer's drawing in step with the group.
#[derive(Debug, Default)]
pub struct SyncController {
    drawing: Drawing,
    state: SessionState,
    membership: MembershipTracker,
    /// Membership reported before the transport was ready.
    pending_participants: Option<HashSet<Participant>>,
    /// Pending outgoing messages.
    outgoing: Vec<Outbound>,
}

impl SyncController {
    /// Create an idle controller with an empty drawing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn drawing(&self) -> &Drawing {
        &self.drawing
    }

    pub fn participants(&self) -> &HashSet<Participant> {
        self.membership.active_participants()
    }

    // --- Lifecycle ---

    /// A new session was announced for `local`. Starts from an empty drawing.
    pub fn session_configured(&mut self, local: Participant) {
        if matches!(self.state, SessionState::Joining | SessionState::Active) {
            log::warn!("Configuring a new session while {:?}; tearing down", self.state);
            self.invalidate();
        }

        self.drawing.clear();
        self.membership.reset(Some(local));
        self.pending_participants = None;
        self.outgoing.clear();
        self.state = SessionState::Joining;
        log::info!("Session configured for {}", local);
    }

    /// The transport reported it is ready. Membership reported while joining
    /// is applied now, so early peers still get their catch-up.
    pub fn transport_ready(&mut self) {
        if self.state == SessionState::Joining {
            self.state = SessionState::Active;
            log::info!("Session active");
            if let Some(pending) = self.pending_participants.take() {
                self.participants_changed(pending);
            }
        }
    }

    /// The session ended. Clears the drawing and drops anything unsent.
    pub fn invalidate(&mut self) {
        if matches!(self.state, SessionState::Idle | SessionState::Invalidated) {
            return;
        }

        self.drawing.clear();
        self.membership.reset(None);
        self.pending_participants = None;
        self.outgoing.clear();
        self.state = SessionState::Invalidated;
        log::info!("Session invalidated");
    }

    // --- Membership ---

    /// Handle a membership notification. Newly joined peers get a catch-up
    /// addressed to them alone.
    ///
    /// While joining, the latest notification is held until the transport is
    /// ready. Outside a session notifications are ignored.
    pub fn participants_changed(&mut self, current: HashSet<Participant>) -> MembershipChange {
        match self.state {
            SessionState::Active => {}
            SessionState::Joining => {
                log::debug!("Deferring membership of {} until active", current.len());
                self.pending_participants = Some(current);
                return MembershipChange::default();
            }
            SessionState::Idle | SessionState::Invalidated => {
                log::debug!("Ignoring membership while {:?}", self.state);
                return MembershipChange::default();
            }
        }

        let change = self.membership.update(current);

        for participant in &change.left {
            log::info!("Participant left: {}", participant);
        }

        if !change.joined.is_empty() {
            log::info!("Participants joined: {}", change.joined.len());
            self.queue(
                SyncMessage::catchup(&self.drawing),
                Recipients::Only(change.joined.clone()),
            );
        }

        change
    }

    // --- Inbound ---

    /// Decode and apply a message received from the transport.
    ///
    /// Messages are only consumed while the session is active.
    pub fn receive(&mut self, bytes: &[u8], from: Participant) -> Result<(), DecodeError> {
        let message = message::decode(bytes)?;
        self.receive_message(message, from);
        Ok(())
    }

    /// Apply an already decoded message received from the transport.
    pub fn receive_message(&mut self, message: SyncMessage, from: Participant) {
        if !self.is_active() {
            log::debug!("Dropping {} from {} while {:?}", message.kind(), from, self.state);
            return;
        }
        log::debug!("Applying {} from {}", message.kind(), from);
        self.apply(message);
    }

    /// Apply a message to the drawing. Returns whether the drawing changed.
    pub fn apply(&mut self, message: SyncMessage) -> bool {
        match message {
            SyncMessage::Draw { mut drawing } => {
                if drawing.stroke_count() != 1 {
                    log::warn!("Draw message with {} strokes", drawing.stroke_count());
                }
                match drawing.remove_last() {
                    Some(stroke) => {
                        self.drawing.append(stroke);
                        true
                    }
                    None => false,
                }
            }
            SyncMessage::Catchup { drawing } => {
                if drawing.stroke_count() > self.drawing.stroke_count() {
                    self.drawing.replace(drawing);
                    true
                } else {
                    false
                }
            }
            SyncMessage::Erase => self.drawing.remove_last().is_some(),
            SyncMessage::Clear => {
                let changed = !self.drawing.is_empty();
                self.drawing.clear();
                changed
            }
        }
    }

    // --- Local edits ---

    /// Commit a stroke drawn on this device and broadcast it.
    pub fn commit_local_stroke(&mut self, stroke: Stroke) {
        self.drawing.append(stroke.clone());
        self.queue(SyncMessage::draw(stroke), Recipients::All);
    }

    /// Remove the last stroke (whoever drew it) and broadcast `Erase`.
    pub fn erase_last_local(&mut self) -> Option<Stroke> {
        let removed = self.drawing.remove_last();
        self.queue(SyncMessage::Erase, Recipients::All);
        removed
    }

    /// Put a stroke back without telling anyone.
    pub fn restore_local_stroke(&mut self, stroke: Stroke) {
        self.drawing.append(stroke);
    }

    /// Clear the drawing and broadcast `Clear`.
    pub fn clear_local(&mut self) {
        self.drawing.clear();
        self.queue(SyncMessage::Clear, Recipients::All);
    }

    // --- Outgoing queue ---

    fn queue(&mut self, message: SyncMessage, recipients: Recipients) {
        if self.is_active() {
            self.outgoing.push(Outbound { message, recipients });
        }
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outgoing)
    }

    /// Check if there are pending outgoing messages.
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }
}
