//! Reconnect supervisor: keeps trying to reach the audio server.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::AppRuntime;

const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);
const TICK: Duration = Duration::from_millis(100);

impl AppRuntime {
    pub(crate) fn spawn_supervisor(&self) -> io::Result<JoinHandle<()>> {
        let session = self.session.clone();
        let dispatcher = self.dispatcher.clone();
        let scheduler = self.scheduler.clone();
        Self::spawn("pamix-reconnect", move || {
            let mut last_attempt: Option<Instant> = None;
            while dispatcher.is_running() {
                let due = last_attempt.map_or(true, |t| t.elapsed() >= RECONNECT_INTERVAL);
                if due && !session.is_connected() {
                    last_attempt = Some(Instant::now());
                    if session.connect() {
                        log::info!(target: "ui", "connected to audio server");
                        scheduler.post_full();
                    } else {
                        log::debug!(target: "ui", "audio server unavailable, retrying");
                    }
                }
                thread::sleep(TICK);
            }
        })
    }
}
