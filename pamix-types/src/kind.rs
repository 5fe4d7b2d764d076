use serde::{Deserialize, Serialize};

/// The closed set of things the mixer tracks.
///
/// Declaration order is tab order: playback, recording, output devices,
/// input devices, cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    SinkInput,
    SourceOutput,
    Sink,
    Source,
    Card,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::SinkInput,
        EntityKind::SourceOutput,
        EntityKind::Sink,
        EntityKind::Source,
        EntityKind::Card,
    ];

    /// Dense index for per-kind tables.
    pub fn slot(self) -> usize {
        match self {
            EntityKind::SinkInput => 0,
            EntityKind::SourceOutput => 1,
            EntityKind::Sink => 2,
            EntityKind::Source => 3,
            EntityKind::Card => 4,
        }
    }

    /// Tab title shown in the header row.
    pub fn title(self) -> &'static str {
        match self {
            EntityKind::SinkInput => "Playback",
            EntityKind::SourceOutput => "Recording",
            EntityKind::Sink => "Output Devices",
            EntityKind::Source => "Input Devices",
            EntityKind::Card => "Cards",
        }
    }

    /// Name used by the server's command-line tools (`sink-input`, `card`, ...).
    pub fn wire_name(self) -> &'static str {
        match self {
            EntityKind::SinkInput => "sink-input",
            EntityKind::SourceOutput => "source-output",
            EntityKind::Sink => "sink",
            EntityKind::Source => "source",
            EntityKind::Card => "card",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.wire_name() == name)
    }

    pub fn is_stream(self) -> bool {
        matches!(self, EntityKind::SinkInput | EntityKind::SourceOutput)
    }

    pub fn is_device(self) -> bool {
        matches!(self, EntityKind::Sink | EntityKind::Source)
    }

    /// The device kind a stream of this kind is attached to.
    pub fn device_kind(self) -> Option<EntityKind> {
        match self {
            EntityKind::SinkInput => Some(EntityKind::Sink),
            EntityKind::SourceOutput => Some(EntityKind::Source),
            _ => None,
        }
    }

    /// The stream kind that attaches to a device of this kind.
    pub fn stream_kind(self) -> Option<EntityKind> {
        match self {
            EntityKind::Sink => Some(EntityKind::SinkInput),
            EntityKind::Source => Some(EntityKind::SourceOutput),
            _ => None,
        }
    }

    /// Parse a `select-tab` argument.
    ///
    /// Numbers follow the legacy numbering (0 output, 1 input, 2 playback,
    /// 3 recording, 4 cards); names are accepted as well.
    pub fn from_tab_arg(arg: &str) -> Option<Self> {
        match arg.trim() {
            "0" | "output" => Some(EntityKind::Sink),
            "1" | "input" => Some(EntityKind::Source),
            "2" | "playback" => Some(EntityKind::SinkInput),
            "3" | "recording" => Some(EntityKind::SourceOutput),
            "4" | "cards" => Some(EntityKind::Card),
            _ => None,
        }
    }

    pub fn next_tab(self) -> Self {
        Self::ALL[(self.slot() + 1) % Self::ALL.len()]
    }

    pub fn prev_tab(self) -> Self {
        Self::ALL[(self.slot() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}
