//! Room bookkeeping for the relay.

use std::collections::HashSet;

use dashmap::DashMap;
use groupdraw_core::Participant;
use groupdraw_core::relay::ServerMessage;
use tokio::sync::broadcast;
use tracing::debug;

/// A message on a room's broadcast channel, with its delivery filter.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Sender, who never gets its own message back.
    pub from: Option<Participant>,
    /// Explicit recipients. `None` means every member.
    pub to: Option<HashSet<Participant>>,
    pub message: ServerMessage,
}

impl Envelope {
    /// Membership notice for every member except `from`.
    pub fn participants(from: Participant, participants: Vec<Participant>) -> Self {
        Self {
            from: Some(from),
            to: None,
            message: ServerMessage::Participants { participants },
        }
    }

    /// Whether `participant` should receive this envelope.
    pub fn is_for(&self, participant: &Participant) -> bool {
        if self.from.as_ref() == Some(participant) {
            return false;
        }
        self.to.as_ref().is_none_or(|to| to.contains(participant))
    }
}

/// Room state
struct Room {
    /// Broadcast channel for this room
    tx: broadcast::Sender<Envelope>,
    /// Connected participants
    peers: HashSet<Participant>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            peers: HashSet::new(),
        }
    }

    fn sorted_peers(&self) -> Vec<Participant> {
        let mut peers: Vec<_> = self.peers.iter().copied().collect();
        peers.sort();
        peers
    }
}

/// Shared application state
pub struct AppState {
    rooms: DashMap<String, Room>,
    channel_capacity: usize,
}

impl AppState {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            channel_capacity,
        }
    }

    /// Add a participant to a room, creating it if needed. Returns the
    /// room's receiver and its members, the new one included.
    pub fn join_room(
        &self,
        room_id: &str,
        participant: Participant,
    ) -> (broadcast::Receiver<Envelope>, Vec<Participant>) {
        let mut room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(self.channel_capacity));
        room.peers.insert(participant);
        (room.tx.subscribe(), room.sorted_peers())
    }

    /// Remove a participant. Returns the remaining members, or `None` if the
    /// room is now gone.
    pub fn leave_room(&self, room_id: &str, participant: &Participant) -> Option<Vec<Participant>> {
        let remaining = self.remove_peer(room_id, participant)?;
        if remaining.is_empty() {
            self.remove_if_empty(room_id);
            return None;
        }
        Some(remaining)
    }

    fn remove_peer(&self, room_id: &str, participant: &Participant) -> Option<Vec<Participant>> {
        let mut room = self.rooms.get_mut(room_id)?;
        room.peers.remove(participant);
        Some(room.sorted_peers())
    }

    /// Drop a room unless someone joined it since it emptied.
    fn remove_if_empty(&self, room_id: &str) {
        if self
            .rooms
            .remove_if(room_id, |_, room| room.peers.is_empty())
            .is_some()
        {
            debug!("Removed empty room {}", room_id);
        }
    }

    /// Broadcast an envelope to a room's members.
    pub fn broadcast(&self, room_id: &str, envelope: Envelope) {
        if let Some(room) = self.rooms.get(room_id) {
            // No receivers just means nobody is listening right now
            let _ = room.tx.send(envelope);
        }
    }

    pub fn participants(&self, room_id: &str) -> Vec<Participant> {
        self.rooms
            .get(room_id)
            .map(|room| room.sorted_peers())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(from: Participant) -> ServerMessage {
        ServerMessage::Message {
            from,
            data: "eA==".to_string(),
        }
    }

    #[test]
    fn test_join_and_leave() {
        let state = AppState::new(8);
        let (a, b) = (Participant::new(), Participant::new());

        let (_rx_a, members) = state.join_room("room", a);
        assert_eq!(members, vec![a]);
        let (_rx_b, members) = state.join_room("room", b);
        assert_eq!(members.len(), 2);

        assert_eq!(state.leave_room("room", &a), Some(vec![b]));
        assert_eq!(state.participants("room"), vec![b]);
    }

    #[test]
    fn test_empty_room_is_removed() {
        let state = AppState::new(8);
        let a = Participant::new();
        let _rx = state.join_room("room", a);

        assert_eq!(state.leave_room("room", &a), None);
        assert_eq!(state.room_count(), 0);
        assert!(state.participants("room").is_empty());
    }

    #[tokio::test]
    async fn test_rejoined_room_survives_cleanup() {
        let state = AppState::new(8);
        let (a, b) = (Participant::new(), Participant::new());
        let _rx_a = state.join_room("room", a);

        // `b` joins between `a` leaving and the empty room being dropped.
        assert_eq!(state.remove_peer("room", &a), Some(Vec::new()));
        let (mut rx_b, members) = state.join_room("room", b);
        assert_eq!(members, vec![b]);
        state.remove_if_empty("room");

        assert_eq!(state.room_count(), 1);
        assert_eq!(state.participants("room"), vec![b]);
        state.broadcast("room", Envelope::participants(a, vec![b]));
        assert!(rx_b.recv().await.unwrap().is_for(&b));
    }

    #[test]
    fn test_rooms_are_isolated() {
        let state = AppState::new(8);
        let (a, b) = (Participant::new(), Participant::new());
        let (mut rx_a, _) = state.join_room("one", a);
        let _rx_b = state.join_room("two", b);

        state.broadcast(
            "two",
            Envelope {
                from: Some(b),
                to: None,
                message: message(b),
            },
        );
        assert!(rx_a.try_recv().is_err());
        assert_eq!(state.room_count(), 2);
    }

    #[test]
    fn test_envelope_filter() {
        let (sender, a, b) = (Participant::new(), Participant::new(), Participant::new());

        let to_all = Envelope {
            from: Some(sender),
            to: None,
            message: message(sender),
        };
        assert!(to_all.is_for(&a));
        assert!(to_all.is_for(&b));
        assert!(!to_all.is_for(&sender));

        let to_a = Envelope {
            to: Some([a].into_iter().collect()),
            ..to_all
        };
        assert!(to_a.is_for(&a));
        assert!(!to_a.is_for(&b));
        assert!(!to_a.is_for(&sender));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_members() {
        let state = AppState::new(8);
        let (a, b) = (Participant::new(), Participant::new());
        let (_rx_a, _) = state.join_room("room", a);
        let (mut rx_b, _) = state.join_room("room", b);

        state.broadcast("room", Envelope::participants(a, vec![a, b]));

        let envelope = rx_b.recv().await.unwrap();
        assert!(envelope.is_for(&b));
        assert!(matches!(envelope.message, ServerMessage::Participants { .. }));
    }
}
