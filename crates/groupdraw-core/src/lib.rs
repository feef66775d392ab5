//! GroupDraw Core Library
//!
//! Keeps the drawings of several devices in step during a shared session.
//! Peers exchange whole strokes: an incremental `Draw` for each new stroke,
//! a full `Catchup` for newly joined peers, plus `Erase` and `Clear`.

pub mod bridge;
pub mod controller;
pub mod drawing;
pub mod membership;
pub mod message;
pub mod relay;
pub mod session;
pub mod stroke;
pub mod transport;

pub use bridge::LocalEditBridge;
pub use controller::{Outbound, SessionState, SyncController};
pub use drawing::Drawing;
pub use membership::{MembershipChange, MembershipTracker, Participant};
pub use message::{DecodeError, EncodeError, SyncMessage, decode, encode};
pub use session::{Command, DriverStopped, SessionDriver, SyncHandle};
pub use stroke::{InkColor, InkKind, InkStyle, Stroke};
pub use transport::{
    ActivationError, AnnouncedSession, GroupSession, GroupSessionState, MemoryHub, Recipients,
    RelayConfig, RelaySource, SendError, SessionEvent, SessionSource,
};
