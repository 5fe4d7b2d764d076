use std::sync::{Arc, Mutex, Weak};
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use pamix_types::{EntityInfo, EntityKind};

use super::backend::{
    Backend, BackendError, BackendResult, EventSource, Interrupt, Request, ServerInfo,
    SubscriptionEvent, SubscriptionMask,
};
use super::mainloop::{Mainloop, Operation, OperationState};
use super::stream::StreamInner;
use super::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Unconnected,
    Connecting,
    Ready,
    Failed,
    Terminated,
}

impl ContextState {
    /// Not (yet) in a terminal state.
    pub fn is_good(self) -> bool {
        matches!(
            self,
            ContextState::Unconnected | ContextState::Connecting | ContextState::Ready
        )
    }
}

/// One step of a list query: an item, the end marker, or a failure.
#[derive(Debug)]
pub enum ListResult<'a, T> {
    Item(&'a T),
    End,
    Error(BackendError),
}

pub type StateCallback = Box<dyn FnMut(ContextState) + Send>;
pub type SubscribeCallback = Box<dyn FnMut(SubscriptionEvent) + Send>;

type Job = Box<dyn FnOnce(&Arc<ContextInner>) + Send>;

pub(crate) struct ContextInner {
    name: String,
    pub(crate) mainloop: Arc<Mainloop>,
    pub(crate) backend: Arc<dyn Backend>,
    state: Mutex<ContextState>,
    server: Mutex<Option<ServerInfo>>,
    state_callback: Mutex<Option<StateCallback>>,
    subscribe_callback: Mutex<Option<SubscribeCallback>>,
    jobs: Mutex<Option<Sender<Job>>>,
    pending: Mutex<Vec<Operation>>,
    events: Mutex<Option<Interrupt>>,
    streams: Mutex<Vec<Weak<StreamInner>>>,
}

/// Connection to the audio server.
///
/// Calls return immediately; results arrive through callbacks invoked on the
/// transport's worker thread with the mainloop lock held. Callers that need a
/// result synchronously hold the mainloop lock and use
/// [`wait_for`](super::wait_for) on the returned [`Operation`].
///
/// Callbacks must not re-register callbacks on the same context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub fn new(mainloop: Arc<Mainloop>, backend: Arc<dyn Backend>, name: &str) -> BackendResult<Self> {
        let (tx, rx) = unbounded::<Job>();
        let inner = Arc::new(ContextInner {
            name: name.to_string(),
            mainloop,
            backend,
            state: Mutex::new(ContextState::Unconnected),
            server: Mutex::new(None),
            state_callback: Mutex::new(None),
            subscribe_callback: Mutex::new(None),
            jobs: Mutex::new(Some(tx)),
            pending: Mutex::new(Vec::new()),
            events: Mutex::new(None),
            streams: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&inner);
        thread::Builder::new()
            .name("pamix-transport".into())
            .spawn(move || {
                for job in rx {
                    match weak.upgrade() {
                        Some(inner) => job(&inner),
                        None => break,
                    }
                }
                log::debug!(target: "transport", "worker exiting");
            })?;

        Ok(Self { inner })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> ContextState {
        self.inner.state()
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        lock(&self.inner.server).clone()
    }

    pub fn set_state_callback(&self, callback: Option<StateCallback>) {
        *lock(&self.inner.state_callback) = callback;
    }

    pub fn set_subscribe_callback(&self, callback: Option<SubscribeCallback>) {
        *lock(&self.inner.subscribe_callback) = callback;
    }

    /// Start connecting. Progress is reported through the state callback.
    pub fn connect(&self, autospawn: bool) -> BackendResult {
        {
            let mut state = lock(&self.inner.state);
            if *state != ContextState::Unconnected {
                return Err(BackendError::Command(format!(
                    "context already used (state {:?})",
                    *state
                )));
            }
            *state = ContextState::Connecting;
        }
        self.inner.enqueue(Box::new(move |inner| {
            let result = inner.backend.connect(autospawn);
            let _guard = inner.mainloop.lock();
            if inner.state() != ContextState::Connecting {
                return;
            }
            match result {
                Ok(info) => {
                    log::info!(
                        target: "transport",
                        "connected to {} {}",
                        info.server_name,
                        info.server_version
                    );
                    *lock(&inner.server) = Some(info);
                    inner.set_state(ContextState::Ready);
                }
                Err(e) => {
                    log::warn!(target: "transport", "connect failed: {}", e);
                    inner.set_state(ContextState::Failed);
                }
            }
        }))
    }

    /// Follow server events for the facilities in `mask`.
    ///
    /// `done` reports whether the subscription was established.
    pub fn subscribe<F>(&self, mask: SubscriptionMask, done: F) -> Operation
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.inner.submit(
            |backend| backend.subscribe(),
            move |inner, result| match result {
                Ok(source) => {
                    if let Some(previous) = lock(&inner.events).replace(source.interrupter()) {
                        previous();
                    }
                    match spawn_event_pump(inner, source, mask) {
                        Ok(()) => done(true),
                        Err(e) => {
                            log::warn!(target: "transport", "event thread failed: {}", e);
                            done(false)
                        }
                    }
                }
                Err(e) => {
                    log::warn!(target: "transport", "subscribe failed: {}", e);
                    done(false)
                }
            },
        )
    }

    /// List every entity of `kind`: one `Item` per entity, then `End`.
    pub fn get_info_list<F>(&self, kind: EntityKind, mut callback: F) -> Operation
    where
        F: FnMut(ListResult<'_, EntityInfo>) + Send + 'static,
    {
        self.inner.submit(
            move |backend| backend.list(kind),
            move |_, result| match result {
                Ok(items) => {
                    for item in &items {
                        callback(ListResult::Item(item));
                    }
                    callback(ListResult::End);
                }
                Err(e) => callback(ListResult::Error(e)),
            },
        )
    }

    /// Look up one entity by index.
    pub fn get_info<F>(&self, kind: EntityKind, index: u32, callback: F) -> Operation
    where
        F: FnOnce(BackendResult<Option<EntityInfo>>) + Send + 'static,
    {
        self.inner
            .submit(move |backend| backend.info(kind, index), move |_, result| callback(result))
    }

    /// Send a change to the server; `done` reports success.
    pub fn request<F>(&self, request: Request, done: F) -> Operation
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.inner.submit(
            move |backend| backend.execute(&request),
            move |_, result| match result {
                Ok(_) => done(true),
                Err(e) => {
                    log::warn!(target: "transport", "request failed: {}", e);
                    done(false)
                }
            },
        )
    }

    /// Close the connection. Pending operations are cancelled and substreams
    /// terminated; no callbacks are invoked.
    ///
    /// Call with the mainloop lock held.
    pub fn disconnect(&self) {
        if self.inner.state() == ContextState::Terminated {
            return;
        }
        self.inner.shutdown();
        *lock(&self.inner.state) = ContextState::Terminated;
        lock(&self.inner.state_callback).take();
        lock(&self.inner.subscribe_callback).take();
        self.inner.mainloop.signal();
    }

    pub(crate) fn inner(&self) -> &Arc<ContextInner> {
        &self.inner
    }
}

impl ContextInner {
    pub(crate) fn state(&self) -> ContextState {
        *lock(&self.state)
    }

    fn set_state(&self, state: ContextState) {
        *lock(&self.state) = state;
        let callback = lock(&self.state_callback).take();
        if let Some(mut callback) = callback {
            callback(state);
            let terminated = self.state() == ContextState::Terminated;
            let mut slot = lock(&self.state_callback);
            if slot.is_none() && !terminated {
                *slot = Some(callback);
            }
        }
        self.mainloop.signal();
    }

    fn enqueue(&self, job: Job) -> BackendResult {
        match lock(&self.jobs).as_ref() {
            Some(tx) => tx
                .send(job)
                .map_err(|_| BackendError::Disconnected("transport worker gone".into())),
            None => Err(BackendError::Disconnected("context closed".into())),
        }
    }

    /// Run `call` on the worker thread, then `deliver` its result under the
    /// mainloop lock unless the operation was cancelled meanwhile.
    fn submit<T, C, D>(&self, call: C, deliver: D) -> Operation
    where
        T: Send + 'static,
        C: FnOnce(&dyn Backend) -> BackendResult<T> + Send + 'static,
        D: FnOnce(&Arc<ContextInner>, BackendResult<T>) + Send + 'static,
    {
        let op = Operation::new();
        lock(&self.pending).push(op.clone());

        let job_op = op.clone();
        let job: Job = Box::new(move |inner| {
            if job_op.state() != OperationState::Running {
                return;
            }
            let result = call(inner.backend.as_ref());
            let _guard = inner.mainloop.lock();
            if job_op.state() == OperationState::Running {
                match result {
                    Err(BackendError::Disconnected(reason)) => inner.fail(&reason),
                    other => {
                        deliver(inner, other);
                        job_op.complete();
                    }
                }
            }
            lock(&inner.pending).retain(|o| !o.same(&job_op));
            inner.mainloop.signal();
        });

        if self.state() != ContextState::Ready || self.enqueue(job).is_err() {
            op.cancel();
            lock(&self.pending).retain(|o| !o.same(&op));
        }
        op
    }

    /// Connection lost: tear everything down and report `Failed`.
    pub(crate) fn fail(&self, reason: &str) {
        if !self.state().is_good() {
            return;
        }
        log::warn!(target: "transport", "connection lost: {}", reason);
        self.shutdown();
        self.set_state(ContextState::Failed);
    }

    fn shutdown(&self) {
        lock(&self.jobs).take();
        for op in lock(&self.pending).drain(..) {
            op.cancel();
        }
        if let Some(interrupt) = lock(&self.events).take() {
            interrupt();
        }
        let streams: Vec<Weak<StreamInner>> = lock(&self.streams).drain(..).collect();
        for stream in streams.iter().filter_map(Weak::upgrade) {
            stream.terminate();
        }
        self.mainloop.signal();
    }

    pub(crate) fn register_stream(&self, stream: &Arc<StreamInner>) {
        let mut streams = lock(&self.streams);
        streams.retain(|s| s.strong_count() > 0);
        streams.push(Arc::downgrade(stream));
    }
}

fn spawn_event_pump(
    inner: &Arc<ContextInner>,
    mut source: Box<dyn EventSource>,
    mask: SubscriptionMask,
) -> std::io::Result<()> {
    let weak = Arc::downgrade(inner);
    thread::Builder::new()
        .name("pamix-events".into())
        .spawn(move || {
            while let Some(event) = source.next_event() {
                let Some(inner) = weak.upgrade() else { return };
                let _guard = inner.mainloop.lock();
                if inner.state() != ContextState::Ready {
                    return;
                }
                if mask.contains(event.facility) {
                    if let Some(callback) = lock(&inner.subscribe_callback).as_mut() {
                        callback(event);
                    }
                }
            }
            if let Some(inner) = weak.upgrade() {
                let _guard = inner.mainloop.lock();
                inner.fail("event stream closed");
            }
        })
        .map(|_| ())
}
