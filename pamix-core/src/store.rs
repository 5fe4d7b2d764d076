//! Entity store: the local mirror of the server's devices, streams and cards.
//!
//! One collection per kind, kept in server list order, plus the reverse
//! index from metering substream to owning entity. The session wraps the
//! whole store in a single mutex (the "modify lock"); every method here
//! assumes the caller holds it.

use std::collections::HashMap;

use pamix_types::{
    Entity, EntityData, EntityInfo, EntityKey, EntityKind, EntityUid, MonitorHandle,
    wrap_step,
};

use crate::transport::Request;

pub struct EntityStore {
    collections: [Vec<Entity>; 5],
    monitors: HashMap<MonitorHandle, EntityKey>,
    next_uid: u64,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            collections: Default::default(),
            monitors: HashMap::new(),
            next_uid: 1,
        }
    }

    /// Mark every entity of `kind` for removal.
    pub fn begin_refresh(&mut self, kind: EntityKind) {
        for entity in &mut self.collections[kind.slot()] {
            entity.marked_for_removal = true;
        }
    }

    /// Update the entity for `(info.kind, info.index)` in place, or insert a
    /// new one. Returns whether it was newly created.
    pub fn apply_info(&mut self, info: EntityInfo) -> bool {
        let collection = &mut self.collections[info.kind.slot()];
        if let Some(existing) = collection.iter_mut().find(|e| e.index == info.index) {
            existing.update_from(info);
            return false;
        }
        let uid = EntityUid::new(self.next_uid);
        self.next_uid += 1;
        collection.push(Entity::from_info(uid, info));
        true
    }

    /// Remove every entity of `kind` still marked for removal and drop their
    /// substream associations. The removed entities are returned so the
    /// caller can tear down their substreams before releasing the lock.
    pub fn end_refresh(&mut self, kind: EntityKind) -> Vec<Entity> {
        let collection = &mut self.collections[kind.slot()];
        let (removed, kept): (Vec<Entity>, Vec<Entity>) =
            collection.drain(..).partition(|e| e.marked_for_removal);
        *collection = kept;
        for entity in &removed {
            if let Some(handle) = entity.monitor {
                self.monitors.remove(&handle);
            }
        }
        removed
    }

    /// Drop everything. Returns the handles of every attached substream.
    pub fn clear(&mut self) -> Vec<MonitorHandle> {
        for collection in &mut self.collections {
            collection.clear();
        }
        self.monitors.drain().map(|(handle, _)| handle).collect()
    }

    pub fn get(&self, kind: EntityKind) -> &[Entity] {
        &self.collections[kind.slot()]
    }

    pub fn get_mut(&mut self, kind: EntityKind) -> &mut [Entity] {
        &mut self.collections[kind.slot()]
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.collections[kind.slot()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.iter().all(Vec::is_empty)
    }

    pub fn entity(&self, key: EntityKey) -> Option<&Entity> {
        self.collections[key.kind.slot()].iter().find(|e| e.index == key.index)
    }

    pub fn entity_mut(&mut self, key: EntityKey) -> Option<&mut Entity> {
        self.collections[key.kind.slot()]
            .iter_mut()
            .find(|e| e.index == key.index)
    }

    /// Entities of `kind` in display order: streams that are playing come
    /// before paused ones, otherwise server order. The store itself is not
    /// reordered.
    pub fn display_order(&self, kind: EntityKind) -> Vec<&Entity> {
        let mut view: Vec<&Entity> = self.collections[kind.slot()].iter().collect();
        if kind.is_stream() {
            view.sort_by_key(|e| e.corked);
        }
        view
    }

    // Substream associations

    /// Record `handle` as `key`'s substream. Returns the handle it replaced.
    pub fn attach_monitor(&mut self, key: EntityKey, handle: MonitorHandle) -> Option<MonitorHandle> {
        let entity = self.entity_mut(key)?;
        let previous = entity.monitor.replace(handle);
        if let Some(old) = previous {
            self.monitors.remove(&old);
        }
        self.monitors.insert(handle, key);
        previous
    }

    /// Forget `key`'s substream, returning it for teardown.
    pub fn detach_monitor(&mut self, key: EntityKey) -> Option<MonitorHandle> {
        let entity = self.entity_mut(key)?;
        let handle = entity.monitor.take()?;
        entity.peak = 0.0;
        self.monitors.remove(&handle);
        Some(handle)
    }

    /// A substream died on its own: clear it from its owner, if any, so the
    /// next refresh attaches a fresh one.
    pub fn release_monitor(&mut self, handle: MonitorHandle) -> Option<EntityKey> {
        let key = self.monitors.remove(&handle)?;
        if let Some(entity) = self.entity_mut(key) {
            if entity.monitor == Some(handle) {
                entity.monitor = None;
                entity.peak = 0.0;
            }
        }
        Some(key)
    }

    pub fn owner_of(&self, handle: MonitorHandle) -> Option<EntityKey> {
        self.monitors.get(&handle).copied()
    }

    /// Store a peak sample delivered by `handle` for `key`. Ignored unless
    /// `handle` is still that entity's current substream.
    pub fn set_peak(&mut self, key: EntityKey, handle: MonitorHandle, peak: f32) -> bool {
        match self.entity_mut(key) {
            Some(entity) if entity.monitor == Some(handle) => {
                entity.peak = pamix_types::clamp_peak(peak);
                true
            }
            _ => false,
        }
    }

    // Optimistic local mutations. Each returns the request that makes the
    // server agree, or `None` when there is nothing to send.

    /// `channel` may come from a selection made before the last refresh; a
    /// channel the entity no longer has is ignored.
    pub fn set_volume(&mut self, key: EntityKey, channel: Option<usize>, level: u32) -> Option<Request> {
        let entity = self.entity_mut(key)?;
        if !has_channel(entity, channel) {
            return None;
        }
        entity.volume.set(channel, level);
        Some(volume_request(entity))
    }

    pub fn add_volume_delta(&mut self, key: EntityKey, channel: Option<usize>, pct: f64) -> Option<Request> {
        let entity = self.entity_mut(key)?;
        if !has_channel(entity, channel) {
            return None;
        }
        entity.volume.apply_pct_delta(channel, pct);
        Some(volume_request(entity))
    }

    pub fn set_mute(&mut self, key: EntityKey, muted: bool) -> Option<Request> {
        let entity = self.entity_mut(key)?;
        if entity.kind == EntityKind::Card {
            return None;
        }
        entity.muted = muted;
        Some(Request::SetMute { kind: entity.kind, index: entity.index, muted })
    }

    /// Lock is local only; nothing is sent. Returns whether anything changed.
    pub fn set_lock(&mut self, key: EntityKey, locked: bool) -> bool {
        match self.entity_mut(key) {
            Some(entity) if entity.channels() > 0 && entity.volume_locked != locked => {
                entity.volume_locked = locked;
                true
            }
            _ => false,
        }
    }

    /// Step the active port (devices) or profile (cards) with wraparound.
    pub fn cycle_option(&mut self, key: EntityKey, forward: bool) -> Option<Request> {
        let entity = self.entity_mut(key)?;
        let (options, active) = entity.options()?;
        let next = wrap_step(options.len(), active?, forward)?;
        let name = options[next].name.clone();
        entity.set_active_option(next);
        Some(match entity.kind {
            EntityKind::Card => Request::SetProfile { index: entity.index, profile: name },
            kind => Request::SetPort { kind, index: entity.index, port: name },
        })
    }

    /// Point a stream at another device. The cached device name is dropped.
    pub fn move_to_device(&mut self, key: EntityKey, device: u32) -> Option<Request> {
        let entity = self.entity_mut(key)?;
        match &mut entity.data {
            EntityData::Stream { device: current, device_name } if *current != device => {
                *current = device;
                *device_name = None;
                Some(Request::Move { kind: entity.kind, index: entity.index, device })
            }
            _ => None,
        }
    }

    pub fn kill_request(&self, key: EntityKey) -> Option<Request> {
        self.entity(key)
            .filter(|e| e.kind.is_stream())
            .map(|e| Request::Kill { kind: e.kind, index: e.index })
    }

    // Stream device names

    /// Fill device names of `stream_kind` streams from the device collection.
    /// `refresh_all` re-resolves names that are already cached. Returns the
    /// streams whose device is not in the store.
    pub fn resolve_device_names(&mut self, stream_kind: EntityKind, refresh_all: bool) -> Vec<(EntityKey, u32)> {
        let Some(device_kind) = stream_kind.device_kind() else { return Vec::new() };
        let names: HashMap<u32, String> = self.collections[device_kind.slot()]
            .iter()
            .map(|d| (d.index, d.display_name.clone()))
            .collect();
        let mut unresolved = Vec::new();
        for stream in &mut self.collections[stream_kind.slot()] {
            let key = stream.key();
            if let EntityData::Stream { device, device_name } = &mut stream.data {
                if device_name.is_some() && !refresh_all {
                    continue;
                }
                match names.get(device) {
                    Some(name) => *device_name = Some(name.clone()),
                    None => {
                        *device_name = None;
                        unresolved.push((key, *device));
                    }
                }
            }
        }
        unresolved
    }

    /// Cache a device name looked up remotely, unless the stream has moved on.
    pub fn set_device_name(&mut self, key: EntityKey, device: u32, name: String) {
        if let Some(entity) = self.entity_mut(key) {
            if let EntityData::Stream { device: current, device_name } = &mut entity.data {
                if *current == device {
                    *device_name = Some(name);
                }
            }
        }
    }
}

fn has_channel(entity: &Entity, channel: Option<usize>) -> bool {
    let channels = entity.channels();
    channels > 0 && channel.map_or(true, |ch| ch < channels)
}

fn volume_request(entity: &Entity) -> Request {
    Request::SetVolume {
        kind: entity.kind,
        index: entity.index,
        levels: entity.volume.levels().to_vec(),
    }
}
