//! # pamix-core
//!
//! Everything in the mixer that is not drawing to a terminal: the local
//! mirror of the audio server's entities, the connection that keeps it in
//! sync, per-entity peak metering, and the action dispatcher.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pamix_core::config::Configuration;
//! use pamix_core::dispatch::Dispatcher;
//! use pamix_core::scheduler::UpdateScheduler;
//! use pamix_core::session::{Session, SessionConfig};
//! use pamix_core::transport::PactlBackend;
//!
//! let config = Configuration::load();
//! let session = Session::new(Arc::new(PactlBackend::new()), SessionConfig {
//!     autospawn: config.autospawn(),
//!     meter_rate: config.meter_rate(),
//!     ..SessionConfig::default()
//! })?;
//! let scheduler = Arc::new(UpdateScheduler::new());
//! session.connect();
//!
//! let dispatcher = Dispatcher::new(session.clone(), scheduler.clone());
//! for action in config.actions_for("j") {
//!     dispatcher.dispatch(action);
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`transport`]: asynchronous client over a blocking backend, with the
//!   mainloop, `Context`, metering `Stream` and the `pactl` backend
//! - [`store`]: `EntityStore`, the per-kind entity collections
//! - [`session`]: `Session`, the connection and everything sent over it
//! - [`monitor`]: `PeakMonitor`, one metering substream per entity
//! - [`notify`]: change notifications fanned out to the UI
//! - [`scheduler`]: `UpdateScheduler`, the redraw queue
//! - [`dispatch`]: `Selection` and `Dispatcher`
//! - [`config`]: key bindings and variables from `pamix.conf`
//! - [`projection`]: screen layout as draw operations
//!
//! ## Locking
//!
//! Locks are always taken in this order: selection, mainloop, store,
//! substream table. Nothing blocks on the server while holding the store.

pub mod config;
pub mod dispatch;
pub mod monitor;
pub mod notify;
pub mod projection;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod transport;
