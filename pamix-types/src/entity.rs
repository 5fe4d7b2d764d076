use serde::{Deserialize, Serialize};

use crate::volume::ChannelVolumes;
use crate::{EntityKey, EntityKind, EntityUid, MonitorHandle};

/// A selectable option on a device or card (a port or a profile).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedOption {
    pub name: String,
    pub description: String,
}

impl NamedOption {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Kind-specific part of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityData {
    /// Sink or source.
    Device {
        ports: Vec<NamedOption>,
        active_port: Option<usize>,
        /// Source to record from for metering: the sink's monitor source,
        /// or the source itself.
        monitor_source: Option<String>,
    },
    /// Sink input or source output.
    Stream {
        device: u32,
        /// Cached display name of `device`, resolved lazily.
        device_name: Option<String>,
    },
    Card {
        profiles: Vec<NamedOption>,
        active_profile: Option<usize>,
    },
}

/// One server-side record as reported by a list or info query.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    pub kind: EntityKind,
    pub index: u32,
    pub name: String,
    pub description: String,
    pub volume: ChannelVolumes,
    pub muted: bool,
    pub corked: bool,
    pub data: EntityData,
}

impl EntityInfo {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.index)
    }
}

/// A tracked device, stream or card.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub uid: EntityUid,
    pub kind: EntityKind,
    pub index: u32,
    pub name: String,
    pub display_name: String,
    pub volume: ChannelVolumes,
    pub muted: bool,
    pub corked: bool,
    /// Last meter sample, in `[0, 1]`.
    pub peak: f32,
    pub volume_locked: bool,
    pub monitor: Option<MonitorHandle>,
    pub marked_for_removal: bool,
    pub data: EntityData,
}

impl Entity {
    pub fn from_info(uid: EntityUid, info: EntityInfo) -> Self {
        assert_active_in_range(&info.data);
        Self {
            uid,
            kind: info.kind,
            index: info.index,
            name: info.name,
            display_name: info.description,
            volume: info.volume,
            muted: info.muted,
            corked: info.corked,
            peak: 0.0,
            volume_locked: true,
            monitor: None,
            marked_for_removal: false,
            data: info.data,
        }
    }

    /// Overwrite server-owned fields in place.
    ///
    /// Identity, the attached monitor, the peak and the local lock survive.
    /// A cached device name survives only while the device index is unchanged.
    pub fn update_from(&mut self, info: EntityInfo) {
        assert_eq!(self.key(), info.key(), "update for a different entity");
        assert_active_in_range(&info.data);
        let cached_name = match (&self.data, &info.data) {
            (
                EntityData::Stream { device: old, device_name },
                EntityData::Stream { device: new, .. },
            ) if old == new => device_name.clone(),
            _ => None,
        };
        self.name = info.name;
        self.display_name = info.description;
        self.volume = info.volume;
        self.muted = info.muted;
        self.corked = info.corked;
        self.data = info.data;
        if let EntityData::Stream { device_name, .. } = &mut self.data {
            if device_name.is_none() {
                *device_name = cached_name;
            }
        }
        if self.corked {
            self.peak = 0.0;
        }
        self.marked_for_removal = false;
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.index)
    }

    pub fn channels(&self) -> usize {
        self.volume.channels()
    }

    /// Peak as it should be displayed: the floor when no substream is
    /// attached or the stream is paused.
    pub fn display_peak(&self) -> f32 {
        if self.monitor.is_none() || self.corked {
            0.0
        } else {
            self.peak
        }
    }

    /// Device index of a stream.
    pub fn device(&self) -> Option<u32> {
        match self.data {
            EntityData::Stream { device, .. } => Some(device),
            _ => None,
        }
    }

    /// Text shown at the right-hand end of the name row.
    pub fn detail_label(&self) -> Option<&str> {
        match &self.data {
            EntityData::Device { ports, active_port, .. } => {
                active_port.and_then(|i| ports.get(i)).map(|p| p.description.as_str())
            }
            EntityData::Stream { device_name, .. } => device_name.as_deref(),
            EntityData::Card { profiles, active_profile } => active_profile
                .and_then(|i| profiles.get(i))
                .map(|p| p.description.as_str()),
        }
    }

    /// Ports or profiles, whichever this entity cycles through.
    pub fn options(&self) -> Option<(&[NamedOption], Option<usize>)> {
        match &self.data {
            EntityData::Device { ports, active_port, .. } => Some((ports, *active_port)),
            EntityData::Card { profiles, active_profile } => Some((profiles, *active_profile)),
            EntityData::Stream { .. } => None,
        }
    }

    pub fn set_active_option(&mut self, index: usize) {
        match &mut self.data {
            EntityData::Device { ports, active_port, .. } => {
                assert!(index < ports.len());
                *active_port = Some(index);
            }
            EntityData::Card { profiles, active_profile } => {
                assert!(index < profiles.len());
                *active_profile = Some(index);
            }
            EntityData::Stream { .. } => {}
        }
    }
}

/// Step through `len` positions from `current` with wraparound.
///
/// `None` when there is nothing to step to: fewer than two positions, or
/// `current` is outside the range.
pub fn wrap_step(len: usize, current: usize, forward: bool) -> Option<usize> {
    if len < 2 || current >= len {
        return None;
    }
    Some(if forward {
        (current + 1) % len
    } else {
        (current + len - 1) % len
    })
}

fn assert_active_in_range(data: &EntityData) {
    match data {
        EntityData::Device { ports, active_port: Some(i), .. } => {
            assert!(*i < ports.len(), "active port {i} out of range");
        }
        EntityData::Card { profiles, active_profile: Some(i) } => {
            assert!(*i < profiles.len(), "active profile {i} out of range");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::VOLUME_NORM;

    fn stream_info(index: u32, device: u32) -> EntityInfo {
        EntityInfo {
            kind: EntityKind::SinkInput,
            index,
            name: "stream".into(),
            description: "Music".into(),
            volume: ChannelVolumes::uniform(2, VOLUME_NORM),
            muted: false,
            corked: false,
            data: EntityData::Stream { device, device_name: None },
        }
    }

    #[test]
    fn update_keeps_local_state() {
        let mut e = Entity::from_info(EntityUid::new(1), stream_info(3, 0));
        e.volume_locked = false;
        e.monitor = Some(MonitorHandle::new(9));
        e.peak = 0.5;
        e.marked_for_removal = true;

        let mut info = stream_info(3, 0);
        info.description = "Podcast".into();
        e.update_from(info);

        assert_eq!(e.uid, EntityUid::new(1));
        assert_eq!(e.display_name, "Podcast");
        assert!(!e.volume_locked);
        assert_eq!(e.monitor, Some(MonitorHandle::new(9)));
        assert_eq!(e.peak, 0.5);
        assert!(!e.marked_for_removal);
    }

    #[test]
    fn device_name_cache_survives_only_same_device() {
        let mut e = Entity::from_info(EntityUid::new(1), stream_info(3, 0));
        if let EntityData::Stream { device_name, .. } = &mut e.data {
            *device_name = Some("Speakers".into());
        }
        e.update_from(stream_info(3, 0));
        assert_eq!(e.detail_label(), Some("Speakers"));

        e.update_from(stream_info(3, 1));
        assert_eq!(e.detail_label(), None);
    }

    #[test]
    fn corked_stream_shows_floor_peak() {
        let mut e = Entity::from_info(EntityUid::new(1), stream_info(3, 0));
        e.monitor = Some(MonitorHandle::new(1));
        e.peak = 0.8;
        assert_eq!(e.display_peak(), 0.8);
        e.corked = true;
        assert_eq!(e.display_peak(), 0.0);
        e.corked = false;
        e.monitor = None;
        assert_eq!(e.display_peak(), 0.0);
    }

    #[test]
    fn wrap_step_cases() {
        assert_eq!(wrap_step(3, 1, true), Some(2));
        assert_eq!(wrap_step(3, 2, true), Some(0));
        assert_eq!(wrap_step(3, 0, false), Some(2));
        assert_eq!(wrap_step(1, 0, true), None);
        assert_eq!(wrap_step(3, 5, true), None);
    }

    #[test]
    #[should_panic]
    fn active_port_out_of_range_panics() {
        let info = EntityInfo {
            kind: EntityKind::Sink,
            index: 0,
            name: "sink".into(),
            description: "Sink".into(),
            volume: ChannelVolumes::uniform(2, VOLUME_NORM),
            muted: false,
            corked: false,
            data: EntityData::Device {
                ports: vec![NamedOption::new("a", "A")],
                active_port: Some(2),
                monitor_source: None,
            },
        };
        Entity::from_info(EntityUid::new(1), info);
    }
}
