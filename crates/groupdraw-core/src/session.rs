//! Session driver: the single owner of the drawing.
//!
//! [`SessionDriver`] runs as one tokio task. Local edits, announced sessions,
//! and inbound transport events are all funneled through its loop, so the
//! drawing and participant set have exactly one writer.
//!
//! Each configured session gets a generation number and two tasks held in a
//! `JoinSet`:
//! - a listener that decodes transport events and hands them to the loop,
//! - a sender that writes outbound messages one at a time (keeping per-sender
//!   order).
//!
//! On invalidation both tasks are shut down before anything else happens, and
//! events tagged with an older generation are discarded. The driver then
//! waits for the next announced session.
//!
//! Activation requests run as tasks of their own, so a slow or stuck
//! activation never holds up local edits.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::bridge::LocalEditBridge;
use crate::controller::{Outbound, SessionState, SyncController};
use crate::drawing::Drawing;
use crate::membership::Participant;
use crate::message::{self, SyncMessage};
use crate::stroke::Stroke;
use crate::transport::{
    ActivationError, AnnouncedSession, GroupSession, GroupSessionState, SessionEvent,
    SessionSource,
};

/// Requests from the UI side.
#[derive(Debug, Clone)]
pub enum Command {
    /// The user finished a tool stroke.
    ToolEnded,
    /// The surface drawing changed; carries its full stroke list.
    DrawingChanged(Vec<Stroke>),
    /// A finished stroke handed over directly.
    Draw(Stroke),
    Undo,
    Redo,
    Clear,
    /// Ask the transport to start a shared session.
    Start,
    /// Leave the current session.
    End,
    /// Stop the driver.
    Shutdown,
}

/// The driver task is gone.
#[derive(Debug, Error)]
#[error("Session driver stopped")]
pub struct DriverStopped;

/// Decoded transport event, as forwarded by a listener task.
#[derive(Debug)]
enum ListenerEvent {
    State(GroupSessionState),
    Participants(HashSet<Participant>),
    Message(SyncMessage, Participant),
    /// The transport's event stream ended.
    Closed,
}

#[derive(Debug)]
struct DriverEvent {
    generation: u64,
    event: ListenerEvent,
}

/// Tasks and channels belonging to the current session.
struct CurrentSession {
    generation: u64,
    session: Arc<dyn GroupSession>,
    outbound: mpsc::UnboundedSender<Outbound>,
    tasks: JoinSet<()>,
}

/// Cheap, cloneable handle for talking to a running [`SessionDriver`].
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    drawing: watch::Receiver<Drawing>,
    state: watch::Receiver<SessionState>,
    participants: watch::Receiver<HashSet<Participant>>,
}

impl SyncHandle {
    fn send(&self, command: Command) -> Result<(), DriverStopped> {
        self.commands.send(command).map_err(|_| DriverStopped)
    }

    pub fn draw(&self, stroke: Stroke) -> Result<(), DriverStopped> {
        self.send(Command::Draw(stroke))
    }

    pub fn tool_ended(&self) -> Result<(), DriverStopped> {
        self.send(Command::ToolEnded)
    }

    pub fn drawing_changed(&self, strokes: Vec<Stroke>) -> Result<(), DriverStopped> {
        self.send(Command::DrawingChanged(strokes))
    }

    pub fn undo(&self) -> Result<(), DriverStopped> {
        self.send(Command::Undo)
    }

    pub fn redo(&self) -> Result<(), DriverStopped> {
        self.send(Command::Redo)
    }

    pub fn clear(&self) -> Result<(), DriverStopped> {
        self.send(Command::Clear)
    }

    pub fn start(&self) -> Result<(), DriverStopped> {
        self.send(Command::Start)
    }

    pub fn end(&self) -> Result<(), DriverStopped> {
        self.send(Command::End)
    }

    pub fn shutdown(&self) -> Result<(), DriverStopped> {
        self.send(Command::Shutdown)
    }

    /// Current drawing.
    pub fn drawing(&self) -> Drawing {
        self.drawing.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Current session participants, including this device.
    pub fn participants(&self) -> HashSet<Participant> {
        self.participants.borrow().clone()
    }

    /// Receiver that yields every published drawing, for renderers.
    pub fn subscribe_drawing(&self) -> watch::Receiver<Drawing> {
        self.drawing.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn subscribe_participants(&self) -> watch::Receiver<HashSet<Participant>> {
        self.participants.clone()
    }

    /// Wait until the drawing satisfies `predicate`.
    pub async fn wait_for_drawing(
        &self,
        predicate: impl FnMut(&Drawing) -> bool,
    ) -> Result<Drawing, DriverStopped> {
        let mut rx = self.drawing.clone();
        let drawing = rx.wait_for(predicate).await.map_err(|_| DriverStopped)?;
        Ok((*drawing).clone())
    }

    /// Wait until the session reaches `state`.
    pub async fn wait_for_state(&self, state: SessionState) -> Result<(), DriverStopped> {
        let mut rx = self.state.clone();
        rx.wait_for(|s| *s == state).await.map_err(|_| DriverStopped)?;
        Ok(())
    }

    /// Wait until at least `count` participants (this device included) are present.
    pub async fn wait_for_participants(&self, count: usize) -> Result<(), DriverStopped> {
        let mut rx = self.participants.clone();
        rx.wait_for(|p| p.len() >= count).await.map_err(|_| DriverStopped)?;
        Ok(())
    }
}

fn activation_finished(result: Result<Result<(), ActivationError>, JoinError>) {
    match result {
        Ok(Ok(())) => log::info!("Group session activation requested"),
        Ok(Err(e)) => log::info!("Group session not started: {}", e),
        Err(e) if e.is_cancelled() => {}
        Err(e) => log::warn!("Activation task failed: {}", e),
    }
}

/// Owns the controller and bridge; drives one session at a time.
pub struct SessionDriver<S> {
    controller: SyncController,
    bridge: LocalEditBridge,
    source: S,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events_rx: mpsc::UnboundedReceiver<DriverEvent>,
    current: Option<CurrentSession>,
    generation: u64,
    /// Pending activation requests.
    activations: JoinSet<Result<(), ActivationError>>,
    drawing_tx: watch::Sender<Drawing>,
    state_tx: watch::Sender<SessionState>,
    participants_tx: watch::Sender<HashSet<Participant>>,
}

impl<S: SessionSource + 'static> SessionDriver<S> {
    /// Create a driver and its handle without starting it.
    pub fn new(source: S) -> (Self, SyncHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (drawing_tx, drawing_rx) = watch::channel(Drawing::new());
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (participants_tx, participants_rx) = watch::channel(HashSet::new());

        let driver = Self {
            controller: SyncController::new(),
            bridge: LocalEditBridge::new(),
            source,
            commands,
            events_tx,
            events_rx,
            current: None,
            generation: 0,
            activations: JoinSet::new(),
            drawing_tx,
            state_tx,
            participants_tx,
        };
        let handle = SyncHandle {
            commands: commands_tx,
            drawing: drawing_rx,
            state: state_rx,
            participants: participants_rx,
        };
        (driver, handle)
    }

    /// Spawn a driver on the current tokio runtime.
    pub fn spawn(source: S) -> (SyncHandle, JoinHandle<()>) {
        let (driver, handle) = Self::new(source);
        (handle, tokio::spawn(driver.run()))
    }

    /// Run until shutdown is requested or every handle is dropped.
    pub async fn run(mut self) {
        let mut source_open = true;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                announced = self.source.next_session(), if source_open => match announced {
                    Some(announced) => self.configure(announced).await,
                    None => {
                        log::info!("Session source closed");
                        source_open = false;
                    }
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
                Some(result) = self.activations.join_next() => activation_finished(result),
            }

            self.flush();
            self.publish();
        }

        self.activations.shutdown().await;
        if let Some(current) = &self.current {
            current.session.end();
        }
        self.teardown().await;
        self.publish();
        log::info!("Session driver stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::ToolEnded => self.bridge.tool_ended(),
            Command::DrawingChanged(strokes) => {
                self.bridge.drawing_changed(&mut self.controller, &strokes);
            }
            Command::Draw(stroke) => self.bridge.stroke_completed(&mut self.controller, stroke),
            Command::Undo => {
                if !self.bridge.undo(&mut self.controller) {
                    log::debug!("Nothing to undo");
                }
            }
            Command::Redo => {
                if !self.bridge.redo(&mut self.controller) {
                    log::debug!("Nothing to redo");
                }
            }
            Command::Clear => self.bridge.clear(&mut self.controller),
            Command::Start => {
                self.activations.spawn(self.source.activate());
            }
            Command::End => {
                let Some(current) = &self.current else {
                    log::debug!("No session to end");
                    return;
                };
                log::info!("Ending session");
                current.session.end();
                self.teardown().await;
            }
            Command::Shutdown => {}
        }
    }

    /// Take over a newly announced session.
    async fn configure(&mut self, announced: AnnouncedSession) {
        if self.current.is_some() {
            log::warn!("New session announced while another is running");
            self.teardown().await;
        }

        self.generation += 1;
        let generation = self.generation;
        let AnnouncedSession { session, mut events } = announced;

        self.controller.session_configured(session.local_participant());
        self.bridge.reset();

        let mut tasks = JoinSet::new();

        let events_tx = self.events_tx.clone();
        tasks.spawn(async move {
            while let Some(event) = events.recv().await {
                let event = match event {
                    SessionEvent::StateChanged(state) => ListenerEvent::State(state),
                    SessionEvent::ParticipantsChanged(set) => ListenerEvent::Participants(set),
                    SessionEvent::Message { bytes, from } => match message::decode(&bytes) {
                        Ok(message) => ListenerEvent::Message(message, from),
                        Err(e) => {
                            log::warn!("Dropping message from {}: {}", from, e);
                            continue;
                        }
                    },
                };
                if events_tx.send(DriverEvent { generation, event }).is_err() {
                    return;
                }
            }
            let _ = events_tx.send(DriverEvent {
                generation,
                event: ListenerEvent::Closed,
            });
        });

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let sender = Arc::clone(&session);
        tasks.spawn(async move {
            while let Some(Outbound { message, recipients }) = outbound_rx.recv().await {
                let bytes = match message::encode(&message) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        log::warn!("Dropping {}: {}", message.kind(), e);
                        continue;
                    }
                };
                if let Err(e) = sender.send(bytes, recipients).await {
                    log::warn!("Failed to send {}: {}", message.kind(), e);
                }
            }
        });

        session.join();
        self.current = Some(CurrentSession {
            generation,
            session,
            outbound,
            tasks,
        });
    }

    async fn handle_event(&mut self, DriverEvent { generation, event }: DriverEvent) {
        let is_current = self
            .current
            .as_ref()
            .is_some_and(|current| current.generation == generation);
        if !is_current {
            log::debug!("Ignoring event from superseded session {}", generation);
            return;
        }

        match event {
            ListenerEvent::State(GroupSessionState::Waiting) => {}
            ListenerEvent::State(GroupSessionState::Joined) => self.controller.transport_ready(),
            ListenerEvent::State(GroupSessionState::Invalidated) => {
                log::info!("Session invalidated by transport");
                self.teardown().await;
            }
            ListenerEvent::Participants(set) => {
                self.controller.participants_changed(set);
            }
            ListenerEvent::Message(message, from) => self.controller.receive_message(message, from),
            ListenerEvent::Closed => {
                log::warn!("Session event stream closed");
                self.teardown().await;
            }
        }
    }

    /// Stop the current session's tasks and reset to await the next session.
    async fn teardown(&mut self) {
        if let Some(mut current) = self.current.take() {
            current.tasks.shutdown().await;
            log::debug!("Session {} tasks stopped", current.generation);
        }
        self.controller.invalidate();
        self.bridge.reset();
    }

    /// Hand queued messages to the sender task.
    fn flush(&mut self) {
        let outgoing = self.controller.take_outgoing();
        let Some(current) = &self.current else {
            return;
        };
        for outbound in outgoing {
            if current.outbound.send(outbound).is_err() {
                log::warn!("Sender task gone; dropping outgoing message");
            }
        }
    }

    /// Publish state for renderers and observers.
    fn publish(&self) {
        let drawing = self.controller.drawing();
        self.drawing_tx.send_if_modified(|published| {
            if *published != *drawing {
                *published = drawing.clone();
                true
            } else {
                false
            }
        });

        let state = self.controller.state();
        self.state_tx.send_if_modified(|published| {
            if *published != state {
                *published = state;
                true
            } else {
                false
            }
        });

        let participants = self.controller.participants();
        self.participants_tx.send_if_modified(|published| {
            if *published != *participants {
                *published = participants.clone();
                true
            } else {
                false
            }
        });
    }
}
