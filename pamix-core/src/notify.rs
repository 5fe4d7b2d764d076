use std::sync::Mutex;

use crate::transport::lock;

/// What changed, as far as the screen is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// Entities were added, removed or changed; relayout everything.
    InfoChanged,
    /// Only meter levels moved.
    PeakChanged,
    /// A server event the store does not track.
    Other,
}

impl Notification {
    pub fn needs_full_redraw(self) -> bool {
        self == Notification::InfoChanged
    }
}

pub type Listener = Box<dyn Fn(Notification) + Send + Sync>;

/// Fan-out of session notifications. Listeners run on whichever thread
/// raised the notification and must not block.
#[derive(Default)]
pub struct Notifier {
    listeners: Mutex<Vec<Listener>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Listener) {
        lock(&self.listeners).push(listener);
    }

    pub fn notify(&self, notification: Notification) {
        for listener in lock(&self.listeners).iter() {
            listener(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn every_listener_sees_every_notification() {
        let notifier = Notifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for id in 0..2 {
            let seen = seen.clone();
            notifier.subscribe(Box::new(move |n| seen.lock().unwrap().push((id, n))));
        }
        notifier.notify(Notification::PeakChanged);
        notifier.notify(Notification::InfoChanged);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen.contains(&(1, Notification::InfoChanged)));
        assert!(Notification::InfoChanged.needs_full_redraw());
        assert!(!Notification::Other.needs_full_redraw());
    }
}
