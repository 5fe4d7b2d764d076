use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// One redraw request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Update {
    /// Full relayout; otherwise only the meters are repainted.
    pub full_redraw: bool,
}

struct Queue {
    pending: VecDeque<Update>,
    closed: bool,
}

/// Redraw requests from any thread, drained by the draw thread.
///
/// Producers never block beyond the queue mutex. The consumer takes every
/// pending request at once and merges them: one full redraw covers any
/// number of meter updates.
pub struct UpdateScheduler {
    queue: Mutex<Queue>,
    ready: Condvar,
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                pending: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    pub fn post(&self, full_redraw: bool) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.pending.push_back(Update { full_redraw });
        self.ready.notify_one();
    }

    pub fn post_full(&self) {
        self.post(true);
    }

    pub fn post_meters(&self) {
        self.post(false);
    }

    /// Wake the consumer for good. Pending requests are still delivered.
    pub fn close(&self) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.closed = true;
        self.ready.notify_all();
    }

    /// Block until something is queued. `None` once closed and drained.
    pub fn wait(&self) -> Option<Update> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        while queue.pending.is_empty() && !queue.closed {
            queue = self.ready.wait(queue).unwrap_or_else(PoisonError::into_inner);
        }
        Self::drain(&mut queue)
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Update> {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut queue, _) = self
            .ready
            .wait_timeout_while(queue, timeout, |q| q.pending.is_empty() && !q.closed)
            .unwrap_or_else(PoisonError::into_inner);
        Self::drain(&mut queue)
    }

    pub fn is_closed(&self) -> bool {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).closed
    }

    fn drain(queue: &mut Queue) -> Option<Update> {
        if queue.pending.is_empty() {
            return None;
        }
        let full_redraw = queue.pending.drain(..).any(|u| u.full_redraw);
        Some(Update { full_redraw })
    }
}
