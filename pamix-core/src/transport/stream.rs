use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use pamix_types::MonitorHandle;

use super::backend::{Backend, BackendError, BackendResult, Interrupt, MeterSource, MeterTarget};
use super::context::{Context, ContextState};
use super::lock;
use super::mainloop::Mainloop;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Unconnected,
    Creating,
    Ready,
    Failed,
    Terminated,
}

pub type ReadCallback = Box<dyn FnMut(&[f32]) + Send>;
pub type StreamStateCallback = Box<dyn FnMut(StreamState) + Send>;

pub(crate) struct StreamInner {
    handle: MonitorHandle,
    name: String,
    rate: u32,
    mainloop: Arc<Mainloop>,
    backend: Arc<dyn Backend>,
    state: Mutex<StreamState>,
    read_callback: Mutex<Option<ReadCallback>>,
    state_callback: Mutex<Option<StreamStateCallback>>,
    interrupt: Mutex<Option<Interrupt>>,
}

/// A single-channel metering substream.
///
/// Samples and state changes are delivered from a reader thread with the
/// mainloop lock held. [`Stream::disconnect`] never invokes callbacks itself.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl Stream {
    /// Create a substream on a ready context.
    pub fn new(context: &Context, name: &str, rate: u32) -> BackendResult<Self> {
        if context.state() != ContextState::Ready {
            return Err(BackendError::Disconnected("context not ready".into()));
        }
        let ctx = context.inner();
        let inner = Arc::new(StreamInner {
            handle: MonitorHandle::new(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)),
            name: name.to_string(),
            rate: rate.max(1),
            mainloop: ctx.mainloop.clone(),
            backend: ctx.backend.clone(),
            state: Mutex::new(StreamState::Unconnected),
            read_callback: Mutex::new(None),
            state_callback: Mutex::new(None),
            interrupt: Mutex::new(None),
        });
        ctx.register_stream(&inner);
        Ok(Self { inner })
    }

    pub fn handle(&self) -> MonitorHandle {
        self.inner.handle
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> StreamState {
        *lock(&self.inner.state)
    }

    pub fn set_read_callback(&self, callback: Option<ReadCallback>) {
        *lock(&self.inner.read_callback) = callback;
    }

    pub fn set_state_callback(&self, callback: Option<StreamStateCallback>) {
        *lock(&self.inner.state_callback) = callback;
    }

    /// Start recording from `target`. Moves to `Creating`; the reader thread
    /// reports `Ready` or `Failed` through the state callback.
    pub fn connect_record(&self, target: MeterTarget) -> BackendResult {
        {
            let mut state = lock(&self.inner.state);
            if *state != StreamState::Unconnected {
                return Err(BackendError::Command(format!(
                    "stream {} already connected",
                    self.inner.handle
                )));
            }
            *state = StreamState::Creating;
        }
        let inner = self.inner.clone();
        let spawned = thread::Builder::new()
            .name(format!("pamix-meter-{}", self.inner.handle.get()))
            .spawn(move || inner.run(target));
        if let Err(e) = spawned {
            *lock(&self.inner.state) = StreamState::Failed;
            return Err(e.into());
        }
        Ok(())
    }

    /// Stop recording and release the server-side stream.
    pub fn disconnect(&self) {
        self.inner.terminate();
    }
}

impl StreamInner {
    /// Move to `Terminated` without notifying anyone.
    pub(crate) fn terminate(&self) {
        {
            let mut state = lock(&self.state);
            if matches!(*state, StreamState::Failed | StreamState::Terminated) {
                return;
            }
            *state = StreamState::Terminated;
        }
        if let Some(interrupt) = lock(&self.interrupt).take() {
            interrupt();
        }
        lock(&self.read_callback).take();
        lock(&self.state_callback).take();
    }

    /// The callback is taken out of its slot while it runs so it may
    /// disconnect this stream.
    fn notify_state(&self, state: StreamState) {
        *lock(&self.state) = state;
        let callback = lock(&self.state_callback).take();
        if let Some(mut callback) = callback {
            callback(state);
            let terminated = *lock(&self.state) == StreamState::Terminated;
            let mut slot = lock(&self.state_callback);
            if slot.is_none() && !terminated {
                *slot = Some(callback);
            }
        }
        self.mainloop.signal();
    }

    fn run(self: Arc<Self>, target: MeterTarget) {
        let opened = self.backend.open_meter(&target, self.rate);
        let mut source: Box<dyn MeterSource> = {
            let _guard = self.mainloop.lock();
            match opened {
                Ok(source) => {
                    if *lock(&self.state) != StreamState::Creating {
                        source.interrupter()();
                        return;
                    }
                    *lock(&self.interrupt) = Some(source.interrupter());
                    self.notify_state(StreamState::Ready);
                    source
                }
                Err(e) => {
                    log::debug!(target: "transport", "meter {} failed to open: {}", self.handle, e);
                    if *lock(&self.state) == StreamState::Creating {
                        self.notify_state(StreamState::Failed);
                    }
                    return;
                }
            }
        };

        loop {
            let batch = source.read_batch();
            let _guard = self.mainloop.lock();
            if *lock(&self.state) != StreamState::Ready {
                return;
            }
            match batch {
                Ok(Some(samples)) => {
                    if let Some(callback) = lock(&self.read_callback).as_mut() {
                        callback(&samples);
                    }
                }
                Ok(None) => {
                    log::debug!(target: "transport", "meter {} ended", self.handle);
                    self.notify_state(StreamState::Failed);
                    return;
                }
                Err(e) => {
                    log::debug!(target: "transport", "meter {} read error: {}", self.handle, e);
                    self.notify_state(StreamState::Failed);
                    return;
                }
            }
        }
    }
}
