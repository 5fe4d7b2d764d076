//! In-memory backend for tests.
//!
//! Serves entity lists from memory, records every request, and lets tests
//! push subscription events and meter samples through channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use pamix_types::{
    ChannelVolumes, EntityData, EntityInfo, EntityKind, NamedOption, VOLUME_NORM,
};

use super::backend::{
    Backend, BackendError, BackendResult, EventSource, Interrupt, MeterSource, MeterTarget,
    Request, ServerInfo, SubscriptionEvent,
};
use super::lock;

pub(crate) struct TestBackend {
    lists: Mutex<HashMap<EntityKind, Vec<EntityInfo>>>,
    requests: Mutex<Vec<Request>>,
    reachable: AtomicBool,
    reject_requests: AtomicBool,
    failing_lists: Mutex<Vec<EntityKind>>,
    request_delay: Mutex<Duration>,
    events: Mutex<Vec<Sender<Option<SubscriptionEvent>>>>,
    meters: Mutex<Vec<(MeterTarget, Sender<Option<Vec<f32>>>)>>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            reachable: AtomicBool::new(true),
            reject_requests: AtomicBool::new(false),
            failing_lists: Mutex::new(Vec::new()),
            request_delay: Mutex::new(Duration::ZERO),
            events: Mutex::new(Vec::new()),
            meters: Mutex::new(Vec::new()),
        }
    }

    pub fn set_list(&self, kind: EntityKind, infos: Vec<EntityInfo>) {
        lock(&self.lists).insert(kind, infos);
    }

    /// Make the server unreachable and close every event stream.
    pub fn go_away(&self) {
        self.reachable.store(false, Ordering::SeqCst);
        for tx in lock(&self.events).drain(..) {
            let _ = tx.send(None);
        }
    }

    pub fn reject_requests(&self, reject: bool) {
        self.reject_requests.store(reject, Ordering::SeqCst);
    }

    /// Make listing `kind` fail while everything else keeps working.
    pub fn fail_list(&self, kind: EntityKind) {
        lock(&self.failing_lists).push(kind);
    }

    /// Hold every request this long before answering.
    pub fn slow_requests(&self, delay: Duration) {
        *lock(&self.request_delay) = delay;
    }

    pub fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    pub fn emit(&self, event: SubscriptionEvent) {
        for tx in lock(&self.events).iter() {
            let _ = tx.send(Some(event));
        }
    }

    /// Targets of every meter opened so far, oldest first.
    pub fn meter_targets(&self) -> Vec<MeterTarget> {
        lock(&self.meters).iter().map(|(t, _)| t.clone()).collect()
    }

    /// Deliver a batch to every open meter on `target`.
    pub fn feed(&self, target: &MeterTarget, samples: Vec<f32>) {
        for (t, tx) in lock(&self.meters).iter() {
            if t == target {
                let _ = tx.send(Some(samples.clone()));
            }
        }
    }

    /// End every meter on `target`, as if the server dropped it.
    pub fn end_meter(&self, target: &MeterTarget) {
        for (t, tx) in lock(&self.meters).iter() {
            if t == target {
                let _ = tx.send(None);
            }
        }
    }

    fn check_reachable(&self) -> BackendResult {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Disconnected("test server gone".into()))
        }
    }
}

impl Backend for TestBackend {
    fn connect(&self, _autospawn: bool) -> BackendResult<ServerInfo> {
        self.check_reachable()?;
        Ok(ServerInfo {
            server_name: "test".into(),
            server_version: "1.0".into(),
            ..ServerInfo::default()
        })
    }

    fn list(&self, kind: EntityKind) -> BackendResult<Vec<EntityInfo>> {
        self.check_reachable()?;
        if lock(&self.failing_lists).contains(&kind) {
            return Err(BackendError::Command(format!("cannot list {}", kind.wire_name())));
        }
        Ok(lock(&self.lists).get(&kind).cloned().unwrap_or_default())
    }

    fn execute(&self, request: &Request) -> BackendResult {
        self.check_reachable()?;
        let delay = *lock(&self.request_delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        lock(&self.requests).push(request.clone());
        if self.reject_requests.load(Ordering::SeqCst) {
            return Err(BackendError::Command("rejected".into()));
        }
        Ok(())
    }

    fn subscribe(&self) -> BackendResult<Box<dyn EventSource>> {
        self.check_reachable()?;
        let (tx, rx) = unbounded();
        lock(&self.events).push(tx.clone());
        Ok(Box::new(ChannelSource { tx, rx }))
    }

    fn open_meter(&self, target: &MeterTarget, _rate: u32) -> BackendResult<Box<dyn MeterSource>> {
        self.check_reachable()?;
        let (tx, rx) = unbounded();
        lock(&self.meters).push((target.clone(), tx.clone()));
        Ok(Box::new(ChannelSource { tx, rx }))
    }
}

struct ChannelSource<T> {
    tx: Sender<Option<T>>,
    rx: Receiver<Option<T>>,
}

impl<T: Send + 'static> ChannelSource<T> {
    fn stopper(&self) -> Interrupt {
        let tx = self.tx.clone();
        Box::new(move || {
            let _ = tx.send(None);
        })
    }
}

impl EventSource for ChannelSource<SubscriptionEvent> {
    fn next_event(&mut self) -> Option<SubscriptionEvent> {
        self.rx.recv().ok().flatten()
    }

    fn interrupter(&self) -> Interrupt {
        self.stopper()
    }
}

impl MeterSource for ChannelSource<Vec<f32>> {
    fn read_batch(&mut self) -> BackendResult<Option<Vec<f32>>> {
        Ok(self.rx.recv().ok().flatten())
    }

    fn interrupter(&self) -> Interrupt {
        self.stopper()
    }
}

/// Poll `cond` until it holds or a couple of seconds pass.
pub(crate) fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub(crate) fn sink(index: u32, description: &str, ports: &[&str], active: Option<usize>) -> EntityInfo {
    EntityInfo {
        kind: EntityKind::Sink,
        index,
        name: format!("sink.{index}"),
        description: description.to_string(),
        volume: ChannelVolumes::uniform(2, VOLUME_NORM),
        muted: false,
        corked: false,
        data: EntityData::Device {
            ports: ports.iter().map(|p| NamedOption::new(*p, p.to_uppercase())).collect(),
            active_port: active,
            monitor_source: Some(format!("sink.{index}.monitor")),
        },
    }
}

pub(crate) fn sink_input(index: u32, description: &str, device: u32, channels: usize) -> EntityInfo {
    EntityInfo {
        kind: EntityKind::SinkInput,
        index,
        name: format!("stream.{index}"),
        description: description.to_string(),
        volume: ChannelVolumes::uniform(channels, VOLUME_NORM / 2),
        muted: false,
        corked: false,
        data: EntityData::Stream { device, device_name: None },
    }
}

pub(crate) fn card(index: u32, profiles: &[&str], active: Option<usize>) -> EntityInfo {
    EntityInfo {
        kind: EntityKind::Card,
        index,
        name: format!("card.{index}"),
        description: format!("Card {index}"),
        volume: ChannelVolumes::empty(),
        muted: false,
        corked: false,
        data: EntityData::Card {
            profiles: profiles.iter().map(|p| NamedOption::new(*p, p.to_uppercase())).collect(),
            active_profile: active,
        },
    }
}
