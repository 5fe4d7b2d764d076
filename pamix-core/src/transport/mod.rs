//! Asynchronous audio server client.
//!
//! Models a threaded-mainloop client library over a blocking [`Backend`]:
//! - `mainloop`: the transport lock and its operation handles
//! - `context`: the connection and every asynchronous call made on it
//! - `stream`: single-channel metering substreams
//! - `pactl`: production backend driving `pactl`/`parec`

pub mod backend;
mod context;
mod mainloop;
pub mod pactl;
mod stream;
#[cfg(test)]
pub(crate) mod test_backend;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use backend::{
    Backend, BackendError, BackendResult, EventSource, EventType, Facility, Interrupt,
    MeterSource, MeterTarget, Request, ServerInfo, SubscriptionEvent, SubscriptionMask,
};
pub use context::{Context, ContextState, ListResult, StateCallback, SubscribeCallback};
pub use mainloop::{wait_for, Mainloop, MainloopGuard, Operation, OperationState};
pub use pactl::PactlBackend;
pub use stream::{ReadCallback, Stream, StreamState, StreamStateCallback};

/// Lock a mutex, ignoring poisoning: a panicked callback must not take the
/// whole transport down with it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
