//! End-to-end synchronization tests.
//!
//! These run real session drivers against an in-memory hub, verifying the
//! full pipeline from local edit to remote drawing.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use groupdraw_core::transport::BoxFuture;
use groupdraw_core::{
    ActivationError, AnnouncedSession, Drawing, GroupSession, GroupSessionState, MemoryHub,
    Participant, Recipients, SendError, SessionDriver, SessionEvent, SessionSource, SessionState,
    Stroke, SyncHandle, SyncMessage,
};
use kurbo::Point;
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep, timeout};

const WAIT: Duration = Duration::from_secs(2);

fn stroke(x: f64) -> Stroke {
    Stroke::from_points(vec![Point::new(x, 0.0), Point::new(x, 20.0)])
}

async fn within<F: Future>(future: F) -> F::Output {
    timeout(WAIT, future).await.expect("timed out")
}

fn spawn_peer(hub: &MemoryHub) -> SyncHandle {
    let (handle, _task) = SessionDriver::spawn(hub.source());
    handle
}

async fn wait_for_strokes(peer: &SyncHandle, expected: &[Stroke]) -> Drawing {
    within(peer.wait_for_drawing(|d| d.strokes() == expected))
        .await
        .unwrap()
}

/// Source whose activation never completes and which never announces.
struct StalledSource;

impl SessionSource for StalledSource {
    fn activate(&self) -> BoxFuture<'static, Result<(), ActivationError>> {
        Box::pin(std::future::pending())
    }

    fn next_session(&mut self) -> BoxFuture<'_, Option<AnnouncedSession>> {
        Box::pin(std::future::pending())
    }
}

/// Source that announces whatever the test pushes into it.
struct ScriptedSource {
    announcements: mpsc::UnboundedReceiver<AnnouncedSession>,
}

impl SessionSource for ScriptedSource {
    fn activate(&self) -> BoxFuture<'static, Result<(), ActivationError>> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn next_session(&mut self) -> BoxFuture<'_, Option<AnnouncedSession>> {
        Box::pin(self.announcements.recv())
    }
}

/// Session whose events are driven entirely by the test.
struct QuietSession {
    local: Participant,
}

impl GroupSession for QuietSession {
    fn local_participant(&self) -> Participant {
        self.local
    }

    fn join(&self) {}

    fn send(&self, _bytes: Vec<u8>, _to: Recipients) -> BoxFuture<'_, Result<(), SendError>> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn end(&self) {}
}

/// Announce a scripted session, join it with one remote peer, and return its
/// event sender along with that peer.
async fn announce_joined(
    announce: &mpsc::UnboundedSender<AnnouncedSession>,
    peer: &SyncHandle,
) -> (mpsc::UnboundedSender<SessionEvent>, Participant) {
    let local = Participant::new();
    let remote = Participant::new();
    let (events_tx, events) = mpsc::unbounded_channel();
    announce
        .send(AnnouncedSession {
            session: Arc::new(QuietSession { local }),
            events,
        })
        .unwrap();

    events_tx
        .send(SessionEvent::StateChanged(GroupSessionState::Joined))
        .unwrap();
    let members: HashSet<Participant> = [local, remote].into_iter().collect();
    events_tx.send(SessionEvent::ParticipantsChanged(members)).unwrap();
    within(peer.wait_for_participants(2)).await.unwrap();
    assert_eq!(peer.state(), SessionState::Active);

    (events_tx, remote)
}

fn draw_event(stroke: Stroke, from: Participant) -> SessionEvent {
    SessionEvent::Message {
        bytes: groupdraw_core::encode(&SyncMessage::draw(stroke)).unwrap(),
        from,
    }
}

/// Two peers that both see each other in an active session.
async fn joined_pair(hub: &MemoryHub) -> (SyncHandle, SyncHandle) {
    let peer1 = spawn_peer(hub);
    let peer2 = spawn_peer(hub);

    peer1.start().unwrap();
    within(peer1.wait_for_participants(2)).await.unwrap();
    within(peer2.wait_for_participants(2)).await.unwrap();
    assert_eq!(peer1.state(), SessionState::Active);
    assert_eq!(peer2.state(), SessionState::Active);

    (peer1, peer2)
}

#[tokio::test]
async fn test_two_peers_draw_and_undo() {
    let hub = MemoryHub::new();
    let (peer1, peer2) = joined_pair(&hub).await;
    let (s1, s2) = (stroke(1.0), stroke(2.0));

    peer1.draw(s1.clone()).unwrap();
    wait_for_strokes(&peer2, &[s1.clone()]).await;

    peer2.draw(s2.clone()).unwrap();
    wait_for_strokes(&peer1, &[s1.clone(), s2.clone()]).await;

    // Undo removes whatever stroke is last, here peer 2's
    peer1.undo().unwrap();
    wait_for_strokes(&peer1, &[s1.clone()]).await;
    wait_for_strokes(&peer2, &[s1]).await;
}

#[tokio::test]
async fn test_late_joiner_catches_up() {
    let hub = MemoryHub::new();
    let (peer1, peer2) = joined_pair(&hub).await;
    let (s1, s2) = (stroke(1.0), stroke(2.0));

    peer1.draw(s1.clone()).unwrap();
    peer2.draw(s2.clone()).unwrap();
    within(peer1.wait_for_drawing(|d| d.stroke_count() == 2)).await.unwrap();
    within(peer2.wait_for_drawing(|d| d.stroke_count() == 2)).await.unwrap();
    let expected = peer1.drawing();

    let peer3 = spawn_peer(&hub);
    within(peer3.wait_for_participants(3)).await.unwrap();
    let caught_up = within(peer3.wait_for_drawing(|d| d.stroke_count() == 2))
        .await
        .unwrap();

    // Both catch-ups carry two strokes; only the first one is applied.
    assert_eq!(caught_up.stroke_count(), expected.stroke_count());
    assert!(caught_up.strokes().contains(&s1));
    assert!(caught_up.strokes().contains(&s2));
}

#[tokio::test]
async fn test_clear_reaches_peers() {
    let hub = MemoryHub::new();
    let (peer1, peer2) = joined_pair(&hub).await;

    peer2.draw(stroke(1.0)).unwrap();
    wait_for_strokes(&peer1, &[stroke(1.0)]).await;

    peer1.clear().unwrap();
    wait_for_strokes(&peer2, &[]).await;
    assert!(peer1.drawing().is_empty());
}

#[tokio::test]
async fn test_redo_is_not_synchronized() {
    let hub = MemoryHub::new();
    let (peer1, peer2) = joined_pair(&hub).await;
    let (s1, s3) = (stroke(1.0), stroke(3.0));

    peer1.draw(s1.clone()).unwrap();
    wait_for_strokes(&peer2, &[s1.clone()]).await;

    peer1.undo().unwrap();
    wait_for_strokes(&peer2, &[]).await;

    peer1.redo().unwrap();
    wait_for_strokes(&peer1, &[s1.clone()]).await;

    // The next draw reaches peer 2, but the redone stroke never does.
    peer1.draw(s3.clone()).unwrap();
    wait_for_strokes(&peer2, &[s3.clone()]).await;
    assert_eq!(peer1.drawing().strokes(), &[s1, s3]);
}

#[tokio::test]
async fn test_local_end_then_rejoin() {
    let hub = MemoryHub::new();
    let (peer1, peer2) = joined_pair(&hub).await;
    let s1 = stroke(1.0);

    peer1.draw(s1.clone()).unwrap();
    wait_for_strokes(&peer2, &[s1.clone()]).await;

    peer1.end().unwrap();
    within(peer1.wait_for_state(SessionState::Invalidated)).await.unwrap();
    assert!(peer1.drawing().is_empty());
    assert!(peer1.participants().is_empty());

    // Peer 2 keeps its drawing and sees peer 1 leave.
    let mut participants = peer2.subscribe_participants();
    within(participants.wait_for(|p| p.len() == 1)).await.unwrap();
    assert_eq!(peer2.drawing().strokes(), &[s1.clone()]);

    // Rejoining starts empty and gets caught up by peer 2.
    peer1.start().unwrap();
    within(peer1.wait_for_state(SessionState::Active)).await.unwrap();
    wait_for_strokes(&peer1, &[s1]).await;
}

#[tokio::test]
async fn test_system_invalidation_rearms() {
    let hub = MemoryHub::new();
    let (peer1, peer2) = joined_pair(&hub).await;

    peer1.draw(stroke(1.0)).unwrap();
    wait_for_strokes(&peer2, &[stroke(1.0)]).await;

    hub.invalidate_all();
    within(peer1.wait_for_state(SessionState::Invalidated)).await.unwrap();
    within(peer2.wait_for_state(SessionState::Invalidated)).await.unwrap();
    wait_for_strokes(&peer1, &[]).await;
    wait_for_strokes(&peer2, &[]).await;

    // No restart of the drivers needed: the next activation is picked up.
    peer2.start().unwrap();
    within(peer1.wait_for_participants(2)).await.unwrap();
    within(peer2.wait_for_participants(2)).await.unwrap();

    peer2.draw(stroke(5.0)).unwrap();
    wait_for_strokes(&peer1, &[stroke(5.0)]).await;
}

#[tokio::test]
async fn test_activation_failure_is_a_noop() {
    let hub = MemoryHub::new();
    hub.set_activation_failure(Some(ActivationError::Cancelled));
    let peer = spawn_peer(&hub);

    peer.start().unwrap();
    peer.draw(stroke(1.0)).unwrap();
    wait_for_strokes(&peer, &[stroke(1.0)]).await;

    assert_eq!(peer.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_shutdown_stops_driver() {
    let hub = MemoryHub::new();
    let (peer, task) = SessionDriver::spawn(hub.source());

    peer.shutdown().unwrap();
    within(task).await.unwrap();
    assert!(peer.draw(stroke(1.0)).is_err());
}

#[tokio::test]
async fn test_pending_activation_does_not_block_edits() {
    let (peer, task) = SessionDriver::spawn(StalledSource);

    peer.start().unwrap();
    peer.draw(stroke(1.0)).unwrap();
    wait_for_strokes(&peer, &[stroke(1.0)]).await;
    assert_eq!(peer.state(), SessionState::Idle);

    // The stuck activation is abandoned on shutdown.
    peer.shutdown().unwrap();
    within(task).await.unwrap();
}

#[tokio::test]
async fn test_ended_session_events_are_ignored() {
    let (announce, announcements) = mpsc::unbounded_channel();
    let (peer, _task) = SessionDriver::spawn(ScriptedSource { announcements });

    let (events1, remote1) = announce_joined(&announce, &peer).await;
    events1.send(draw_event(stroke(1.0), remote1)).unwrap();
    wait_for_strokes(&peer, &[stroke(1.0)]).await;

    peer.end().unwrap();
    within(peer.wait_for_state(SessionState::Invalidated)).await.unwrap();
    assert!(peer.drawing().is_empty());
    // The first session's listener is gone along with its receiver.
    assert!(events1.is_closed());

    let (events2, remote2) = announce_joined(&announce, &peer).await;
    let _ = events1.send(draw_event(stroke(9.0), remote1));
    sleep(Duration::from_millis(50)).await;
    assert!(peer.drawing().is_empty());

    events2.send(draw_event(stroke(2.0), remote2)).unwrap();
    wait_for_strokes(&peer, &[stroke(2.0)]).await;
}
