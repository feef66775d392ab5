//! In-process group sessions for tests and local demos.
//!
//! A [`MemoryHub`] plays the role of the platform: every device registers a
//! [`MemorySource`], activation announces one shared room to every device not
//! already in it, and messages are delivered over per-member channels (so
//! per-sender order holds).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use super::{
    ActivationError, AnnouncedSession, BoxFuture, GroupSession, GroupSessionState, Recipients,
    SendError, SessionEvent, SessionSource,
};
use crate::membership::Participant;

/// One live shared room.
struct Room {
    id: u64,
    /// Devices the room was announced to and that have not left.
    announced: HashSet<Participant>,
    /// Joined devices and their event channels.
    members: HashMap<Participant, mpsc::UnboundedSender<SessionEvent>>,
}

impl Room {
    fn member_set(&self) -> HashSet<Participant> {
        self.members.keys().copied().collect()
    }

    fn broadcast_members(&self) {
        let members = self.member_set();
        for tx in self.members.values() {
            let _ = tx.send(SessionEvent::ParticipantsChanged(members.clone()));
        }
    }
}

#[derive(Default)]
struct HubInner {
    sources: HashMap<Participant, mpsc::UnboundedSender<AnnouncedSession>>,
    room: Option<Room>,
    next_room_id: u64,
    activation_failure: Option<ActivationError>,
}

/// Shared in-memory stand-in for the platform's group-session service.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new device. If a room is live, it is announced right away.
    pub fn source(&self) -> MemorySource {
        let participant = Participant::new();
        let (tx, announcements) = mpsc::unbounded_channel();

        let mut inner = self.lock();
        inner.sources.insert(participant, tx.clone());
        if let Some(room) = inner.room.as_mut() {
            if !room.members.is_empty() {
                self.announce(room, participant, &tx);
            }
        }
        drop(inner);

        MemorySource {
            hub: self.clone(),
            participant,
            announcements,
        }
    }

    /// Make every following activation fail with `failure` (or succeed again
    /// with `None`).
    pub fn set_activation_failure(&self, failure: Option<ActivationError>) {
        self.lock().activation_failure = failure;
    }

    /// End the live room for everyone, as the system would.
    pub fn invalidate_all(&self) {
        if let Some(room) = self.lock().room.take() {
            log::info!("Invalidating room {}", room.id);
            for tx in room.members.values() {
                let _ = tx.send(SessionEvent::StateChanged(GroupSessionState::Invalidated));
            }
        }
    }

    fn activate(&self) -> Result<(), ActivationError> {
        let mut inner = self.lock();
        if let Some(failure) = inner.activation_failure.clone() {
            return Err(failure);
        }

        if inner.room.is_none() {
            inner.next_room_id += 1;
            let id = inner.next_room_id;
            log::info!("Opening room {}", id);
            inner.room = Some(Room {
                id,
                announced: HashSet::new(),
                members: HashMap::new(),
            });
        }

        let HubInner { sources, room, .. } = &mut *inner;
        if let Some(room) = room.as_mut() {
            for (participant, tx) in sources.iter() {
                if !room.announced.contains(participant) {
                    self.announce(room, *participant, tx);
                }
            }
        }
        Ok(())
    }

    fn announce(
        &self,
        room: &mut Room,
        participant: Participant,
        source: &mpsc::UnboundedSender<AnnouncedSession>,
    ) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let _ = events_tx.send(SessionEvent::StateChanged(GroupSessionState::Waiting));

        let session = Arc::new(MemorySession {
            hub: self.clone(),
            room_id: room.id,
            local: participant,
            events: events_tx,
        });
        if source.send(AnnouncedSession { session, events }).is_ok() {
            room.announced.insert(participant);
        }
    }
}

/// A device's view of the [`MemoryHub`].
pub struct MemorySource {
    hub: MemoryHub,
    participant: Participant,
    announcements: mpsc::UnboundedReceiver<AnnouncedSession>,
}

impl MemorySource {
    /// The participant id this device uses in every session.
    pub fn participant(&self) -> Participant {
        self.participant
    }
}

impl Drop for MemorySource {
    fn drop(&mut self) {
        self.hub.lock().sources.remove(&self.participant);
    }
}

impl SessionSource for MemorySource {
    fn activate(&self) -> BoxFuture<'static, Result<(), ActivationError>> {
        let hub = self.hub.clone();
        Box::pin(async move { hub.activate() })
    }

    fn next_session(&mut self) -> BoxFuture<'_, Option<AnnouncedSession>> {
        Box::pin(self.announcements.recv())
    }
}

/// One device's membership in a [`MemoryHub`] room.
pub struct MemorySession {
    hub: MemoryHub,
    room_id: u64,
    local: Participant,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl MemorySession {
    fn invalidated(&self) {
        let _ = self
            .events
            .send(SessionEvent::StateChanged(GroupSessionState::Invalidated));
    }
}

impl GroupSession for MemorySession {
    fn local_participant(&self) -> Participant {
        self.local
    }

    fn join(&self) {
        let mut inner = self.hub.lock();
        let Some(room) = inner.room.as_mut().filter(|room| room.id == self.room_id) else {
            log::debug!("Joining a room that no longer exists");
            self.invalidated();
            return;
        };

        room.members.insert(self.local, self.events.clone());
        let _ = self
            .events
            .send(SessionEvent::StateChanged(GroupSessionState::Joined));
        room.broadcast_members();
    }

    fn send(&self, bytes: Vec<u8>, to: Recipients) -> BoxFuture<'_, Result<(), SendError>> {
        let inner = self.hub.lock();
        let result = match inner.room.as_ref().filter(|room| room.id == self.room_id) {
            Some(room) if room.members.contains_key(&self.local) => {
                for (participant, tx) in &room.members {
                    if to.includes(participant, &self.local) {
                        let _ = tx.send(SessionEvent::Message {
                            bytes: bytes.clone(),
                            from: self.local,
                        });
                    }
                }
                Ok(())
            }
            Some(_) => Err(SendError::NotJoined),
            None => Err(SendError::Closed),
        };
        drop(inner);
        Box::pin(std::future::ready(result))
    }

    fn end(&self) {
        let mut inner = self.hub.lock();
        let room_gone = match inner.room.as_mut().filter(|room| room.id == self.room_id) {
            Some(room) => {
                room.announced.remove(&self.local);
                if room.members.remove(&self.local).is_some() {
                    room.broadcast_members();
                }
                room.announced.is_empty()
            }
            None => false,
        };
        if room_gone {
            inner.room = None;
        }
        drop(inner);

        self.invalidated();
    }
}
