//! Backend trait: the raw calls the transport makes against an audio server.
//!
//! `Backend` captures what the mixer needs from the server (list entities,
//! apply a change, follow events, tap a meter) independently of how it's done
//! (`pactl`/`parec` subprocesses in production). Every call is blocking; the
//! `Context` runs them on its own worker thread and turns them into
//! asynchronous operations with callbacks.
//! This enables unit testing of the session without a running audio server.

use std::fmt;

use pamix_types::{EntityInfo, EntityKind};

/// Result type for backend operations.
pub type BackendResult<T = ()> = Result<T, BackendError>;

/// Error from a backend operation.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The server is unreachable. Fatal to the connection.
    Disconnected(String),
    /// The server rejected a request or a helper command failed.
    Command(String),
    /// Reply could not be decoded.
    Decode(String),
    Io(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Disconnected(msg) => write!(f, "disconnected: {}", msg),
            BackendError::Command(msg) => write!(f, "command failed: {}", msg),
            BackendError::Decode(msg) => write!(f, "decode error: {}", msg),
            BackendError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Decode(e.to_string())
    }
}

/// What the server reported about itself on connect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub server_name: String,
    pub server_version: String,
    pub default_sink: Option<String>,
    pub default_source: Option<String>,
}

/// Server-side object classes that emit change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facility {
    Sink,
    Source,
    SinkInput,
    SourceOutput,
    Module,
    Client,
    SampleCache,
    Server,
    Card,
}

impl Facility {
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Some(match name {
            "sink" => Facility::Sink,
            "source" => Facility::Source,
            "sink-input" => Facility::SinkInput,
            "source-output" => Facility::SourceOutput,
            "module" => Facility::Module,
            "client" => Facility::Client,
            "sample-cache" => Facility::SampleCache,
            "server" => Facility::Server,
            "card" => Facility::Card,
            _ => return None,
        })
    }

    /// The entity kind this facility's events concern, if the mixer tracks it.
    pub fn entity_kind(self) -> Option<EntityKind> {
        match self {
            Facility::Sink => Some(EntityKind::Sink),
            Facility::Source => Some(EntityKind::Source),
            Facility::SinkInput => Some(EntityKind::SinkInput),
            Facility::SourceOutput => Some(EntityKind::SourceOutput),
            Facility::Card => Some(EntityKind::Card),
            _ => None,
        }
    }

    fn bit(self) -> u32 {
        1 << match self {
            Facility::Sink => 0,
            Facility::Source => 1,
            Facility::SinkInput => 2,
            Facility::SourceOutput => 3,
            Facility::Module => 4,
            Facility::Client => 5,
            Facility::SampleCache => 6,
            Facility::Server => 7,
            Facility::Card => 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    New,
    Change,
    Remove,
}

impl EventType {
    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "new" => Some(EventType::New),
            "change" => Some(EventType::Change),
            "remove" => Some(EventType::Remove),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionEvent {
    pub facility: Facility,
    pub event_type: EventType,
    pub index: u32,
}

/// Set of facilities a subscription delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionMask(u32);

impl SubscriptionMask {
    pub const NONE: SubscriptionMask = SubscriptionMask(0);
    pub const ALL: SubscriptionMask = SubscriptionMask(0x02ff);

    pub fn with(self, facility: Facility) -> Self {
        SubscriptionMask(self.0 | facility.bit())
    }

    pub fn contains(self, facility: Facility) -> bool {
        self.0 & facility.bit() != 0
    }
}

/// A change the mixer asks the server to make.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    SetVolume { kind: EntityKind, index: u32, levels: Vec<u32> },
    SetMute { kind: EntityKind, index: u32, muted: bool },
    SetPort { kind: EntityKind, index: u32, port: String },
    SetProfile { index: u32, profile: String },
    /// Move a stream to another device.
    Move { kind: EntityKind, index: u32, device: u32 },
    Kill { kind: EntityKind, index: u32 },
}

/// Where a metering substream records from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MeterTarget {
    /// A source (by name or index), including a sink's monitor source.
    Source(String),
    /// The implicit monitor point of one playback stream.
    SinkInput(u32),
}

/// Unblocks a pending `next_event`/`read_batch` from another thread.
pub type Interrupt = Box<dyn FnOnce() + Send>;

/// Blocking stream of subscription events. `None` means the stream ended.
pub trait EventSource: Send {
    fn next_event(&mut self) -> Option<SubscriptionEvent>;
    fn interrupter(&self) -> Interrupt;
}

/// Blocking stream of meter samples.
///
/// Each batch holds one or more peak samples; `Ok(None)` means the source
/// ended.
pub trait MeterSource: Send {
    fn read_batch(&mut self) -> BackendResult<Option<Vec<f32>>>;
    fn interrupter(&self) -> Interrupt;
}

/// Blocking audio server calls.
///
/// Implementations translate these into server-specific commands or record
/// them for testing.
pub trait Backend: Send + Sync {
    /// Establish that the server is reachable and describe it.
    fn connect(&self, autospawn: bool) -> BackendResult<ServerInfo>;

    /// Every entity of one kind, in server order.
    fn list(&self, kind: EntityKind) -> BackendResult<Vec<EntityInfo>>;

    /// One entity by index.
    fn info(&self, kind: EntityKind, index: u32) -> BackendResult<Option<EntityInfo>> {
        Ok(self.list(kind)?.into_iter().find(|e| e.index == index))
    }

    fn execute(&self, request: &Request) -> BackendResult;

    /// Start following server events.
    fn subscribe(&self) -> BackendResult<Box<dyn EventSource>>;

    /// Open a single-channel peak meter producing roughly `rate` samples a second.
    fn open_meter(&self, target: &MeterTarget, rate: u32) -> BackendResult<Box<dyn MeterSource>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_membership() {
        let mask = SubscriptionMask::NONE
            .with(Facility::Sink)
            .with(Facility::Card);
        assert!(mask.contains(Facility::Sink));
        assert!(mask.contains(Facility::Card));
        assert!(!mask.contains(Facility::Client));
        for f in [Facility::Sink, Facility::Module, Facility::Server, Facility::Card] {
            assert!(SubscriptionMask::ALL.contains(f));
        }
    }

    #[test]
    fn facilities_map_to_tracked_kinds() {
        assert_eq!(Facility::from_wire_name("sink-input"), Some(Facility::SinkInput));
        assert_eq!(Facility::SinkInput.entity_kind(), Some(EntityKind::SinkInput));
        assert_eq!(Facility::Client.entity_kind(), None);
        assert_eq!(Facility::from_wire_name("bogus"), None);
    }
}
