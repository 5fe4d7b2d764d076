use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Proof that the caller holds the mainloop lock.
pub type MainloopGuard<'a> = MutexGuard<'a, ()>;

/// The transport lock and its wakeup signal.
///
/// Every transport callback runs while this lock is held. Synchronous callers
/// take the lock, start an operation, then `wait` (which releases the lock)
/// until the operation reaches a terminal state.
pub struct Mainloop {
    lock: Mutex<()>,
    cond: Condvar,
}

impl Mainloop {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lock: Mutex::new(()),
            cond: Condvar::new(),
        })
    }

    pub fn lock(&self) -> MainloopGuard<'_> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release the lock, sleep until signalled, reacquire.
    ///
    /// Wakeups are not tied to any particular operation; always recheck.
    pub fn wait<'a>(&self, guard: MainloopGuard<'a>) -> MainloopGuard<'a> {
        self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    pub fn signal(&self) {
        self.cond.notify_all();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Running,
    Done,
    Cancelled,
}

const RUNNING: u8 = 0;
const DONE: u8 = 1;
const CANCELLED: u8 = 2;

/// Handle on one in-flight asynchronous request.
#[derive(Debug, Clone)]
pub struct Operation {
    state: Arc<AtomicU8>,
}

impl Operation {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(RUNNING)),
        }
    }

    pub fn state(&self) -> OperationState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => OperationState::Running,
            DONE => OperationState::Done,
            _ => OperationState::Cancelled,
        }
    }

    /// Running -> Done. Must be called with the mainloop lock held.
    pub(crate) fn complete(&self) {
        let _ = self
            .state
            .compare_exchange(RUNNING, DONE, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Running -> Cancelled. Must be called with the mainloop lock held.
    pub(crate) fn cancel(&self) {
        let _ = self
            .state
            .compare_exchange(RUNNING, CANCELLED, Ordering::AcqRel, Ordering::Acquire);
    }

    pub(crate) fn same(&self, other: &Operation) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Block until `op` leaves the running state.
pub fn wait_for<'a>(
    mainloop: &Mainloop,
    mut guard: MainloopGuard<'a>,
    op: &Operation,
) -> (MainloopGuard<'a>, OperationState) {
    loop {
        match op.state() {
            OperationState::Running => guard = mainloop.wait(guard),
            terminal => return (guard, terminal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_for_survives_unrelated_wakeups() {
        let mainloop = Mainloop::new();
        let op = Operation::new();

        let ml = mainloop.clone();
        let remote = op.clone();
        let worker = thread::spawn(move || {
            for _ in 0..5 {
                thread::sleep(Duration::from_millis(2));
                let _g = ml.lock();
                ml.signal();
            }
            let _g = ml.lock();
            remote.complete();
            ml.signal();
        });

        let guard = mainloop.lock();
        let (_guard, state) = wait_for(&mainloop, guard, &op);
        assert_eq!(state, OperationState::Done);
        drop(_guard);
        worker.join().unwrap();
    }

    #[test]
    fn terminal_states_are_sticky() {
        let op = Operation::new();
        op.cancel();
        op.complete();
        assert_eq!(op.state(), OperationState::Cancelled);

        let op = Operation::new();
        op.complete();
        op.cancel();
        assert_eq!(op.state(), OperationState::Done);
    }
}
