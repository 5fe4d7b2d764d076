//! App runtime coordinator.
//!
//! Three threads share one [`Dispatcher`]:
//! - `input`: dispatches the actions bound to each key
//! - `supervisor`: reconnects to the audio server while disconnected
//! - the calling thread: drains the [`UpdateScheduler`] and draws (`render`)

mod input;
mod render;
mod supervisor;

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use pamix_core::config::Configuration;
use pamix_core::dispatch::Dispatcher;
use pamix_core::projection::{Frame, Projection};
use pamix_core::scheduler::UpdateScheduler;
use pamix_core::session::{Session, SessionConfig};
use pamix_core::transport::PactlBackend;

use crate::ui::{RatatuiBackend, RatatuiFrame};

/// How long the draw loop waits before re-checking whether to quit.
const DRAW_WAIT: Duration = Duration::from_millis(250);

/// Top-level runtime that owns the session and drives the draw loop.
pub struct AppRuntime {
    pub(crate) config: Arc<Configuration>,
    pub(crate) session: Arc<Session>,
    pub(crate) scheduler: Arc<UpdateScheduler>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) projection: Projection,
    /// Last full layout and the screen it produced; meters-only redraws
    /// repaint on top of it.
    pub(crate) last_frame: Option<(Frame, RatatuiFrame)>,
    threads: Vec<JoinHandle<()>>,
}

impl AppRuntime {
    /// Load configuration and create a disconnected session.
    pub fn new() -> io::Result<Self> {
        let config = Arc::new(Configuration::load());
        let session = Session::new(
            Arc::new(PactlBackend::new()),
            SessionConfig {
                autospawn: config.autospawn(),
                meter_rate: config.meter_rate(),
                ..SessionConfig::default()
            },
        )?;
        let scheduler = Arc::new(UpdateScheduler::new());
        let dispatcher = Arc::new(Dispatcher::new(session.clone(), scheduler.clone()));

        let redraws = scheduler.clone();
        session.subscribe(Box::new(move |notification| {
            redraws.post(notification.needs_full_redraw());
        }));

        Ok(Self {
            config,
            session,
            scheduler,
            dispatcher,
            projection: Projection::new(),
            last_frame: None,
            threads: Vec::new(),
        })
    }

    /// Run until a quit action, then tear the session down.
    pub fn run(&mut self, backend: &mut RatatuiBackend) -> io::Result<()> {
        self.threads.push(self.spawn_input()?);
        self.threads.push(self.spawn_supervisor()?);
        self.scheduler.post_full();

        let result = self.draw_loop(backend);

        self.scheduler.close();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        self.session.shutdown();
        log::info!(target: "ui", "pamix exiting");
        result
    }

    fn draw_loop(&mut self, backend: &mut RatatuiBackend) -> io::Result<()> {
        while self.dispatcher.is_running() {
            let Some(update) = self.scheduler.wait_timeout(DRAW_WAIT) else {
                continue;
            };
            if !self.dispatcher.is_running() {
                break;
            }
            self.render(backend, update.full_redraw)?;
        }
        Ok(())
    }

    fn spawn(name: &str, body: impl FnOnce() + Send + 'static) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name.to_string()).spawn(body)
    }
}
