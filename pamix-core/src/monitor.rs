//! Per-entity peak metering.
//!
//! Every sink, source and stream gets one metering substream. Samples land
//! on the owning entity through a small association record held by the
//! substream's callbacks, so delivery never searches the reverse index.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use pamix_types::{clamp_peak, Entity, EntityData, EntityKey, EntityKind, MonitorHandle};

use crate::notify::{Notification, Notifier};
use crate::store::EntityStore;
use crate::transport::{lock, Context, MeterTarget, Stream, StreamState};

type StreamTable = Mutex<HashMap<MonitorHandle, Stream>>;

/// Links a substream to the entity it meters. Cleared when the substream
/// dies so late samples go nowhere.
struct PeakLink {
    owner: Mutex<Option<EntityKey>>,
}

impl PeakLink {
    fn new(owner: EntityKey) -> Arc<Self> {
        Arc::new(Self { owner: Mutex::new(Some(owner)) })
    }

    fn owner(&self) -> Option<EntityKey> {
        *lock(&self.owner)
    }

    fn clear(&self) {
        lock(&self.owner).take();
    }
}

/// Owns every live metering substream.
///
/// Lock order: mainloop, then store, then the substream table. The table
/// lock is never held while calling out.
pub struct PeakMonitor {
    store: Arc<Mutex<EntityStore>>,
    notifier: Arc<Notifier>,
    streams: Arc<StreamTable>,
    rate: u32,
}

impl PeakMonitor {
    pub fn new(store: Arc<Mutex<EntityStore>>, notifier: Arc<Notifier>, rate: u32) -> Self {
        Self {
            store,
            notifier,
            streams: Arc::new(Mutex::new(HashMap::new())),
            rate: rate.max(1),
        }
    }

    /// Open a substream for `key`, replacing any it already has.
    ///
    /// Call with the mainloop lock held and `store` borrowed from the locked
    /// store, so the association is recorded before the substream can report
    /// readiness.
    pub fn attach(&self, context: &Context, store: &mut EntityStore, key: EntityKey) -> bool {
        let Some(target) = store.entity(key).and_then(meter_target) else {
            return false;
        };
        if let Some(previous) = store.detach_monitor(key) {
            self.destroy(previous);
        }

        let stream = match Stream::new(context, &format!("PeakMonitor {key}"), self.rate) {
            Ok(stream) => stream,
            Err(e) => {
                log::debug!(target: "monitor", "no substream for {}: {}", key, e);
                return false;
            }
        };
        let handle = stream.handle();
        let link = PeakLink::new(key);
        stream.set_read_callback(Some(self.read_callback(handle, link.clone())));
        stream.set_state_callback(Some(self.state_callback(handle, link)));

        if let Err(e) = stream.connect_record(target) {
            log::warn!(target: "monitor", "failed to start meter for {}: {}", key, e);
            return false;
        }
        store.attach_monitor(key, handle);
        lock(&self.streams).insert(handle, stream);
        log::debug!(target: "monitor", "attached {} to {}", handle, key);
        true
    }

    /// Attach substreams to every entity of `kind` that lacks one.
    pub fn ensure_attached(&self, context: &Context, store: &mut EntityStore, kind: EntityKind) {
        let missing: Vec<EntityKey> = store
            .get(kind)
            .iter()
            .filter(|e| e.monitor.is_none())
            .map(Entity::key)
            .collect();
        for key in missing {
            self.attach(context, store, key);
        }
    }

    /// Disconnect and drop a substream. Its callbacks are cleared first so
    /// nothing more is delivered for it.
    pub fn destroy(&self, handle: MonitorHandle) {
        let stream = lock(&self.streams).remove(&handle);
        if let Some(stream) = stream {
            close(&stream);
        }
    }

    /// Drop every substream, e.g. after the connection died.
    pub fn forget_all(&self) {
        let streams: Vec<Stream> = lock(&self.streams).drain().map(|(_, s)| s).collect();
        for stream in &streams {
            close(stream);
        }
    }

    pub fn live_count(&self) -> usize {
        lock(&self.streams).len()
    }

    fn read_callback(&self, handle: MonitorHandle, link: Arc<PeakLink>) -> Box<dyn FnMut(&[f32]) + Send> {
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        Box::new(move |samples: &[f32]| {
            let Some(&last) = samples.last() else { return };
            let Some(owner) = link.owner() else { return };
            let stored = lock(&store).set_peak(owner, handle, clamp_peak(last));
            if stored {
                notifier.notify(Notification::PeakChanged);
            }
        })
    }

    fn state_callback(&self, handle: MonitorHandle, link: Arc<PeakLink>) -> Box<dyn FnMut(StreamState) + Send> {
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let streams: Weak<StreamTable> = Arc::downgrade(&self.streams);
        Box::new(move |state| match state {
            StreamState::Ready => {
                let orphaned = lock(&store).owner_of(handle).is_none();
                if orphaned {
                    log::debug!(target: "monitor", "{} ready without an owner, closing", handle);
                    link.clear();
                    if let Some(streams) = streams.upgrade() {
                        let stream = lock(&streams).remove(&handle);
                        if let Some(stream) = stream {
                            close(&stream);
                        }
                    }
                }
            }
            StreamState::Failed | StreamState::Terminated => {
                link.clear();
                let released = lock(&store).release_monitor(handle);
                if let Some(streams) = streams.upgrade() {
                    lock(&streams).remove(&handle);
                }
                if let Some(key) = released {
                    log::debug!(target: "monitor", "{} for {} went away", handle, key);
                    notifier.notify(Notification::PeakChanged);
                }
            }
            StreamState::Unconnected | StreamState::Creating => {}
        })
    }
}

fn close(stream: &Stream) {
    stream.set_read_callback(None);
    stream.set_state_callback(None);
    stream.disconnect();
}

/// Where to meter an entity, if anywhere.
pub fn meter_target(entity: &Entity) -> Option<MeterTarget> {
    match (entity.kind, &entity.data) {
        (EntityKind::Sink | EntityKind::Source, EntityData::Device { monitor_source, .. }) => {
            monitor_source.clone().map(MeterTarget::Source)
        }
        (EntityKind::SinkInput, _) => Some(MeterTarget::SinkInput(entity.index)),
        (EntityKind::SourceOutput, EntityData::Stream { device, .. }) => {
            Some(MeterTarget::Source(device.to_string()))
        }
        _ => None,
    }
}
