//! Connection to the audio server and the synchronous operations on it.
//!
//! Every wrapper here follows the same pattern: take the mainloop lock,
//! issue an operation, and wait for it with the store lock released. The
//! store lock is only taken for the short, non-blocking parts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use pamix_types::{wrap_step, EntityInfo, EntityKey, EntityKind};

use crate::monitor::PeakMonitor;
use crate::notify::{Listener, Notification, Notifier};
use crate::store::EntityStore;
use crate::transport::{
    lock, wait_for, Backend, Context, ContextState, ListResult, Mainloop, MainloopGuard,
    OperationState, Request, ServerInfo, SubscribeCallback, StateCallback, SubscriptionMask,
};

/// Devices first, so stream device names resolve from the store.
const CONNECT_ORDER: [EntityKind; 5] = [
    EntityKind::Sink,
    EntityKind::Source,
    EntityKind::SinkInput,
    EntityKind::SourceOutput,
    EntityKind::Card,
];

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub client_name: String,
    /// Let the client start a server when none is running.
    pub autospawn: bool,
    /// Meter updates per second.
    pub meter_rate: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_name: "pamix".to_string(),
            autospawn: false,
            meter_rate: 25,
        }
    }
}

type RefreshQueue = Arc<Mutex<Option<Sender<EntityKind>>>>;

pub struct Session {
    mainloop: Arc<Mainloop>,
    backend: Arc<dyn Backend>,
    config: SessionConfig,
    context: Mutex<Option<Context>>,
    store: Arc<Mutex<EntityStore>>,
    notifier: Arc<Notifier>,
    monitor: Arc<PeakMonitor>,
    refresh_tx: RefreshQueue,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a disconnected session and its refresh worker.
    pub fn new(backend: Arc<dyn Backend>, config: SessionConfig) -> std::io::Result<Arc<Self>> {
        let store = Arc::new(Mutex::new(EntityStore::new()));
        let notifier = Arc::new(Notifier::new());
        let monitor = Arc::new(PeakMonitor::new(store.clone(), notifier.clone(), config.meter_rate));
        let (tx, rx) = unbounded();

        let session = Arc::new(Self {
            mainloop: Mainloop::new(),
            backend,
            config,
            context: Mutex::new(None),
            store,
            notifier,
            monitor,
            refresh_tx: Arc::new(Mutex::new(Some(tx))),
            worker: Mutex::new(None),
        });

        let weak = Arc::downgrade(&session);
        let handle = thread::Builder::new()
            .name("pamix-refresh".into())
            .spawn(move || refresh_worker(weak, rx))?;
        *lock(&session.worker) = Some(handle);
        Ok(session)
    }

    pub fn store(&self) -> &Arc<Mutex<EntityStore>> {
        &self.store
    }

    pub fn subscribe(&self, listener: Listener) {
        self.notifier.subscribe(listener);
    }

    pub fn is_connected(&self) -> bool {
        self.ready_context().is_some()
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        lock(&self.context).as_ref().and_then(Context::server_info)
    }

    /// Connect, subscribe to every event class and load every kind.
    /// Returns false on any failure, leaving the session disconnected.
    pub fn connect(&self) -> bool {
        if self.is_connected() {
            return true;
        }
        let stale = lock(&self.context).take();
        if let Some(stale) = stale {
            let _guard = self.mainloop.lock();
            stale.disconnect();
        }

        let context = match Context::new(self.mainloop.clone(), self.backend.clone(), &self.config.client_name) {
            Ok(context) => context,
            Err(e) => {
                log::error!(target: "session", "cannot create context: {}", e);
                return false;
            }
        };
        context.set_state_callback(Some(self.state_callback()));

        let mut guard = self.mainloop.lock();
        if let Err(e) = context.connect(self.config.autospawn) {
            log::warn!(target: "session", "connect failed: {}", e);
            context.disconnect();
            return false;
        }
        loop {
            match context.state() {
                ContextState::Ready => break,
                state if !state.is_good() => {
                    log::info!(target: "session", "connection ended in state {:?}", state);
                    context.disconnect();
                    return false;
                }
                _ => guard = self.mainloop.wait(guard),
            }
        }

        context.set_subscribe_callback(Some(self.subscribe_callback()));
        let subscribed = Arc::new(AtomicBool::new(false));
        let flag = subscribed.clone();
        let op = context.subscribe(SubscriptionMask::ALL, move |ok| flag.store(ok, Ordering::SeqCst));
        let (guard, state) = wait_for(&self.mainloop, guard, &op);
        if state != OperationState::Done || !subscribed.load(Ordering::SeqCst) {
            log::warn!(target: "session", "event subscription failed");
            context.disconnect();
            return false;
        }
        drop(guard);
        *lock(&self.context) = Some(context);

        for kind in CONNECT_ORDER {
            if !self.refresh(kind) {
                log::warn!(target: "session", "initial load of {} failed", kind.wire_name());
                self.abandon_connection();
                return false;
            }
        }
        log::info!(target: "session", "connected");
        true
    }

    /// Reload every entity of `kind` from the server.
    ///
    /// Blocks until the list query finishes. The store is updated in one
    /// critical section, so readers never see it half marked.
    pub fn refresh(&self, kind: EntityKind) -> bool {
        let Some(context) = self.ready_context() else {
            return false;
        };

        let staged: Arc<Mutex<Vec<EntityInfo>>> = Arc::new(Mutex::new(Vec::new()));
        let failed = Arc::new(AtomicBool::new(false));
        let guard = self.mainloop.lock();
        let op = {
            let staged = staged.clone();
            let failed = failed.clone();
            context.get_info_list(kind, move |result| match result {
                ListResult::Item(info) => lock(&staged).push(info.clone()),
                ListResult::End => {}
                ListResult::Error(e) => {
                    log::warn!(target: "session", "listing {} failed: {}", kind.wire_name(), e);
                    failed.store(true, Ordering::SeqCst);
                }
            })
        };
        let (guard, state) = wait_for(&self.mainloop, guard, &op);
        if state != OperationState::Done || failed.load(Ordering::SeqCst) {
            log::debug!(target: "session", "refresh of {} aborted", kind.wire_name());
            return false;
        }
        let infos = std::mem::take(&mut *lock(&staged));

        let unresolved = {
            let mut store = lock(&self.store);
            store.begin_refresh(kind);
            for info in infos {
                store.apply_info(info);
            }
            for removed in store.end_refresh(kind) {
                if let Some(handle) = removed.monitor {
                    self.monitor.destroy(handle);
                }
            }
            let unresolved = match (kind.stream_kind(), kind.device_kind()) {
                (Some(streams), _) => store.resolve_device_names(streams, true),
                (_, Some(_)) => store.resolve_device_names(kind, true),
                _ => Vec::new(),
            };
            self.monitor.ensure_attached(&context, &mut store, kind);
            unresolved
        };

        self.lookup_device_names(&context, guard, unresolved);
        true
    }

    /// Ask the refresh worker to reload `kind` soon.
    pub fn queue_refresh(&self, kind: EntityKind) {
        if let Some(tx) = lock(&self.refresh_tx).as_ref() {
            let _ = tx.send(kind);
        }
    }

    // Mutations. Local state changes first; the server is told afterwards.
    // A failed request schedules a refresh that restores the server's view.

    pub fn set_volume(&self, key: EntityKey, channel: Option<usize>, level: u32) -> bool {
        self.mutate(key, |store| store.set_volume(key, channel, level))
    }

    pub fn add_volume(&self, key: EntityKey, channel: Option<usize>, pct: f64) -> bool {
        self.mutate(key, |store| store.add_volume_delta(key, channel, pct))
    }

    pub fn set_mute(&self, key: EntityKey, muted: bool) -> bool {
        self.mutate(key, |store| store.set_mute(key, muted))
    }

    pub fn toggle_mute(&self, key: EntityKey) -> bool {
        self.mutate(key, |store| {
            let muted = !store.entity(key)?.muted;
            store.set_mute(key, muted)
        })
    }

    /// Channel lock lives only in the mixer.
    pub fn set_lock(&self, key: EntityKey, locked: bool) -> bool {
        lock(&self.store).set_lock(key, locked)
    }

    pub fn toggle_lock(&self, key: EntityKey) -> bool {
        let mut store = lock(&self.store);
        match store.entity(key).map(|e| e.volume_locked) {
            Some(locked) => store.set_lock(key, !locked),
            None => false,
        }
    }

    /// Next/previous device for streams, port for devices, profile for cards.
    pub fn cycle(&self, key: EntityKey, forward: bool) -> bool {
        if key.kind.is_stream() {
            self.cycle_device(key, forward)
        } else {
            self.mutate(key, |store| store.cycle_option(key, forward))
        }
    }

    pub fn move_to_device(&self, key: EntityKey, device: u32) -> bool {
        self.mutate(key, |store| {
            let request = store.move_to_device(key, device);
            store.resolve_device_names(key.kind, false);
            request
        })
    }

    pub fn kill(&self, key: EntityKey) -> bool {
        self.mutate(key, |store| store.kill_request(key))
    }

    /// Drop the connection and everything learned through it.
    pub fn disconnect(&self) {
        self.abandon_connection();
        self.notifier.notify(Notification::InfoChanged);
    }

    /// Disconnect and stop the refresh worker.
    pub fn shutdown(&self) {
        self.disconnect();
        lock(&self.refresh_tx).take();
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }

    /// Undo a half-finished `connect`: the context goes, and so does
    /// whatever it already loaded.
    fn abandon_connection(&self) {
        let context = lock(&self.context).take();
        if let Some(context) = context {
            let _guard = self.mainloop.lock();
            context.disconnect();
            drop_all_state(&self.store, &self.monitor);
        }
    }

    fn ready_context(&self) -> Option<Context> {
        lock(&self.context)
            .as_ref()
            .filter(|c| c.state() == ContextState::Ready)
            .cloned()
    }

    fn mutate<F>(&self, key: EntityKey, change: F) -> bool
    where
        F: FnOnce(&mut EntityStore) -> Option<Request>,
    {
        let Some(context) = self.ready_context() else {
            return false;
        };
        let guard = self.mainloop.lock();
        let request = change(&mut lock(&self.store));
        match request {
            Some(request) => self.issue(&context, guard, key.kind, request),
            None => false,
        }
    }

    fn issue(&self, context: &Context, guard: MainloopGuard<'_>, kind: EntityKind, request: Request) -> bool {
        let accepted = Arc::new(AtomicBool::new(false));
        let flag = accepted.clone();
        let op = context.request(request, move |ok| flag.store(ok, Ordering::SeqCst));
        let (guard, state) = wait_for(&self.mainloop, guard, &op);
        drop(guard);
        let ok = state == OperationState::Done && accepted.load(Ordering::SeqCst);
        if !ok {
            self.queue_refresh(kind);
        }
        ok
    }

    fn cycle_device(&self, key: EntityKey, forward: bool) -> bool {
        let Some(context) = self.ready_context() else {
            return false;
        };
        let Some(device_kind) = key.kind.device_kind() else {
            return false;
        };
        let guard = self.mainloop.lock();
        let Some(current) = lock(&self.store).entity(key).and_then(|e| e.device()) else {
            return false;
        };

        let devices: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let op = {
            let devices = devices.clone();
            context.get_info_list(device_kind, move |result| {
                if let ListResult::Item(info) = result {
                    lock(&devices).push(info.index);
                }
            })
        };
        let (guard, state) = wait_for(&self.mainloop, guard, &op);
        if state != OperationState::Done {
            return false;
        }
        let devices = std::mem::take(&mut *lock(&devices));
        let Some(position) = devices.iter().position(|d| *d == current) else {
            log::warn!(target: "session", "{} is on unknown device #{}", key, current);
            return false;
        };
        let Some(next) = wrap_step(devices.len(), position, forward) else {
            return false;
        };

        let request = {
            let mut store = lock(&self.store);
            let request = store.move_to_device(key, devices[next]);
            store.resolve_device_names(key.kind, false);
            request
        };
        match request {
            Some(request) => self.issue(&context, guard, key.kind, request),
            None => false,
        }
    }

    /// Look up names of devices the store does not know yet, one query at a
    /// time with the store unlocked.
    fn lookup_device_names(&self, context: &Context, mut guard: MainloopGuard<'_>, unresolved: Vec<(EntityKey, u32)>) {
        for (key, device) in unresolved {
            let Some(device_kind) = key.kind.device_kind() else { continue };
            let found: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
            let op = {
                let found = found.clone();
                context.get_info(device_kind, device, move |result| {
                    if let Ok(Some(info)) = result {
                        *lock(&found) = Some(info.description);
                    }
                })
            };
            let (g, state) = wait_for(&self.mainloop, guard, &op);
            guard = g;
            if state != OperationState::Done {
                return;
            }
            let name = lock(&found).take();
            if let Some(name) = name {
                lock(&self.store).set_device_name(key, device, name);
            }
        }
    }

    fn state_callback(&self) -> StateCallback {
        let store = self.store.clone();
        let monitor = self.monitor.clone();
        let notifier = self.notifier.clone();
        Box::new(move |state| {
            if state == ContextState::Failed {
                log::warn!(target: "session", "connection to audio server lost");
                drop_all_state(&store, &monitor);
                notifier.notify(Notification::InfoChanged);
            }
        })
    }

    fn subscribe_callback(&self) -> SubscribeCallback {
        let queue = self.refresh_tx.clone();
        let notifier = self.notifier.clone();
        Box::new(move |event| match event.facility.entity_kind() {
            Some(kind) => {
                if let Some(tx) = lock(&queue).as_ref() {
                    let _ = tx.send(kind);
                }
            }
            None => notifier.notify(Notification::Other),
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        lock(&self.refresh_tx).take();
        let context = lock(&self.context).take();
        if let Some(context) = context {
            let _guard = self.mainloop.lock();
            context.disconnect();
        }
        self.monitor.forget_all();
    }
}

fn drop_all_state(store: &Mutex<EntityStore>, monitor: &PeakMonitor) {
    let handles = lock(store).clear();
    log::debug!(target: "session", "dropping {} substreams", handles.len());
    monitor.forget_all();
}

/// Serves refresh requests from event callbacks. Requests that pile up while
/// a refresh runs are merged per kind.
fn refresh_worker(session: Weak<Session>, rx: Receiver<EntityKind>) {
    while let Ok(first) = rx.recv() {
        let mut kinds = vec![first];
        for kind in rx.try_iter() {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        let Some(session) = session.upgrade() else { break };
        let mut changed = false;
        for kind in kinds {
            changed |= session.refresh(kind);
        }
        if changed {
            session.notifier.notify(Notification::InfoChanged);
        }
    }
    log::debug!(target: "session", "refresh worker exiting");
}
