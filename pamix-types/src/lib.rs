//! # pamix-types
//!
//! Shared type definitions for pamix: entity kinds, the entity record itself,
//! per-channel volume arithmetic and the abstract action set that key bindings
//! resolve to. Nothing in here talks to the audio server or the terminal.

pub mod action;
pub mod entity;
pub mod kind;
pub mod volume;

pub use action::*;
pub use entity::*;
pub use kind::EntityKind;
pub use volume::*;

/// Identifies one metering substream for the lifetime of the process.
///
/// Handles are never reused, so a stale handle held by a late callback can
/// never alias a newer substream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct MonitorHandle(u64);

impl MonitorHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MonitorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Process-unique identity of an entity record.
///
/// Assigned when the store first creates the record and kept across every
/// in-place update, so two observations with the same uid are the same object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct EntityUid(u64);

impl EntityUid {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Address of an entity inside the store: its kind plus the server index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub index: u32,
}

impl EntityKey {
    pub fn new(kind: EntityKind, index: u32) -> Self {
        Self { kind, index }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} #{}", self.kind.wire_name(), self.index)
    }
}
