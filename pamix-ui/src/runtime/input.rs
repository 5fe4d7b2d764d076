//! Input thread: terminal events to dispatched actions.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use pamix_core::config::Configuration;
use pamix_core::dispatch::Dispatcher;
use pamix_core::scheduler::UpdateScheduler;
use pamix_types::Action;

use super::AppRuntime;
use crate::ui::{AppEvent, InputSource, TerminalInput};

/// Poll interval; bounds how long quitting takes to reach this thread.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

impl AppRuntime {
    pub(crate) fn spawn_input(&self) -> io::Result<JoinHandle<()>> {
        let config = self.config.clone();
        let dispatcher = self.dispatcher.clone();
        let scheduler = self.scheduler.clone();
        Self::spawn("pamix-input", move || {
            let mut source = TerminalInput;
            input_loop(&mut source, &config, &dispatcher, &scheduler);
        })
    }
}

/// Runs until a quit action stops the dispatcher.
pub(crate) fn input_loop(
    source: &mut dyn InputSource,
    config: &Configuration,
    dispatcher: &Dispatcher,
    scheduler: &UpdateScheduler,
) {
    while dispatcher.is_running() {
        match source.poll_event(POLL_TIMEOUT) {
            Some(AppEvent::Key(name)) => {
                let actions: &[Action] = config.actions_for(&name);
                if actions.is_empty() {
                    log::debug!(target: "ui", "unbound key {}", name);
                }
                for action in actions {
                    dispatcher.dispatch(action);
                    if !dispatcher.is_running() {
                        break;
                    }
                }
            }
            Some(AppEvent::Resize(w, h)) => {
                log::debug!(target: "ui", "resize to {}x{}", w, h);
                scheduler.post_full();
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use pamix_core::session::{Session, SessionConfig};
    use pamix_core::transport::PactlBackend;

    struct ScriptedInput(VecDeque<AppEvent>);

    impl InputSource for ScriptedInput {
        fn poll_event(&mut self, _timeout: Duration) -> Option<AppEvent> {
            self.0.pop_front()
        }
    }

    #[test]
    fn resize_redraws_and_quit_key_stops_the_loop() {
        let session = Session::new(Arc::new(PactlBackend::new()), SessionConfig::default()).unwrap();
        let scheduler = Arc::new(UpdateScheduler::new());
        let dispatcher = Dispatcher::new(session.clone(), scheduler.clone());
        let config = Configuration::builtin();

        let mut source = ScriptedInput(VecDeque::from([
            AppEvent::Resize(100, 30),
            AppEvent::Key("KEY_F(13)".into()),
            AppEvent::Key("j".into()),
            AppEvent::Key("q".into()),
        ]));
        input_loop(&mut source, &config, &dispatcher, &scheduler);

        assert!(!dispatcher.is_running());
        assert!(source.0.is_empty());
        let update = scheduler.wait_timeout(Duration::ZERO).unwrap();
        assert!(update.full_redraw);
        session.shutdown();
    }
}
