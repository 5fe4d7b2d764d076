//! Backend built on the server's command-line clients.
//!
//! Queries and changes go through `pactl` (JSON output for lists), events
//! through a long-running `pactl subscribe`, and meters through `parec`
//! recording raw float samples that are reduced to one peak per chunk.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};

use pamix_types::{
    ChannelPosition, ChannelVolumes, EntityData, EntityInfo, EntityKind, NamedOption,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::backend::{
    Backend, BackendError, BackendResult, EventSource, EventType, Facility, Interrupt,
    MeterSource, MeterTarget, Request, ServerInfo, SubscriptionEvent,
};
use super::lock;

/// Rate `parec` records at; each meter sample is the peak of one chunk.
const CAPTURE_RATE: u32 = 8000;

const EVENT_PATTERN: &str = r"^Event '([a-z]+)' on ([a-z-]+) #(\d+)$";

pub struct PactlBackend {
    pactl: PathBuf,
    parec: PathBuf,
}

impl Default for PactlBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PactlBackend {
    pub fn new() -> Self {
        Self {
            pactl: PathBuf::from("pactl"),
            parec: PathBuf::from("parec"),
        }
    }

    fn run(&self, args: &[&str]) -> BackendResult<String> {
        let output = Command::new(&self.pactl)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| BackendError::Disconnected(format!("cannot run pactl: {}", e)))?;
        if output.status.success() {
            return String::from_utf8(output.stdout)
                .map_err(|e| BackendError::Decode(e.to_string()));
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        log::debug!(target: "transport", "pactl {:?} failed: {}", args, stderr);
        if stderr.contains("Connection") {
            Err(BackendError::Disconnected(stderr))
        } else {
            Err(BackendError::Command(stderr))
        }
    }

    fn spawn_piped(program: &PathBuf, args: &[String]) -> BackendResult<(Arc<Mutex<Child>>, ChildStdout)> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Io("child has no stdout".into()))?;
        Ok((Arc::new(Mutex::new(child)), stdout))
    }
}

/// Whether a server socket is there to connect to without spawning one.
fn server_socket_available() -> bool {
    if std::env::var_os("PULSE_SERVER").is_some_and(|s| !s.is_empty()) {
        return true;
    }
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(|dir| PathBuf::from(dir).join("pulse").join("native").exists())
        .unwrap_or(false)
}

impl Backend for PactlBackend {
    fn connect(&self, autospawn: bool) -> BackendResult<ServerInfo> {
        if !autospawn && !server_socket_available() {
            return Err(BackendError::Disconnected(
                "no server socket and autospawn disabled".into(),
            ));
        }
        let text = self.run(&["info"]).map_err(|e| match e {
            BackendError::Disconnected(m) | BackendError::Command(m) => BackendError::Disconnected(m),
            other => other,
        })?;
        Ok(parse_server_info(&text))
    }

    fn list(&self, kind: EntityKind) -> BackendResult<Vec<EntityInfo>> {
        let what = match kind {
            EntityKind::Sink => "sinks",
            EntityKind::Source => "sources",
            EntityKind::SinkInput => "sink-inputs",
            EntityKind::SourceOutput => "source-outputs",
            EntityKind::Card => "cards",
        };
        let json = self.run(&["-f", "json", "list", what])?;
        decode_list(kind, &json)
    }

    fn execute(&self, request: &Request) -> BackendResult {
        let args = request_args(request)?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args).map(|_| ())
    }

    fn subscribe(&self) -> BackendResult<Box<dyn EventSource>> {
        let pattern = Regex::new(EVENT_PATTERN).map_err(|e| BackendError::Decode(e.to_string()))?;
        let (child, stdout) = Self::spawn_piped(&self.pactl, &["subscribe".to_string()])?;
        Ok(Box::new(PactlEvents {
            child,
            reader: BufReader::new(stdout),
            pattern,
        }))
    }

    fn open_meter(&self, target: &MeterTarget, rate: u32) -> BackendResult<Box<dyn MeterSource>> {
        let rate = rate.clamp(1, CAPTURE_RATE);
        let mut args = vec![
            "--raw".to_string(),
            "--format=float32le".to_string(),
            "--channels=1".to_string(),
            format!("--rate={}", CAPTURE_RATE),
            format!("--latency-msec={}", (1000 / rate).max(1)),
            "--client-name=pamix".to_string(),
            "--stream-name=PeakMonitor".to_string(),
        ];
        match target {
            MeterTarget::Source(source) => {
                args.push("-d".to_string());
                args.push(source.clone());
            }
            MeterTarget::SinkInput(index) => args.push(format!("--monitor-stream={}", index)),
        }
        let (child, stdout) = Self::spawn_piped(&self.parec, &args)?;
        let chunk_samples = (CAPTURE_RATE / rate).max(1) as usize;
        Ok(Box::new(PactlMeter {
            child,
            stdout,
            chunk: vec![0u8; chunk_samples * 4],
        }))
    }
}

fn request_args(request: &Request) -> BackendResult<Vec<String>> {
    let args = match request {
        Request::SetVolume { kind: EntityKind::Card, .. }
        | Request::SetMute { kind: EntityKind::Card, .. } => {
            return Err(BackendError::Command("cards have no volume".into()))
        }
        Request::SetVolume { kind, index, levels } => {
            let mut args = vec![format!("set-{}-volume", kind.wire_name()), index.to_string()];
            args.extend(levels.iter().map(u32::to_string));
            args
        }
        Request::SetMute { kind, index, muted } => vec![
            format!("set-{}-mute", kind.wire_name()),
            index.to_string(),
            if *muted { "1" } else { "0" }.to_string(),
        ],
        Request::SetPort { kind, index, port } if kind.is_device() => vec![
            format!("set-{}-port", kind.wire_name()),
            index.to_string(),
            port.clone(),
        ],
        Request::SetProfile { index, profile } => {
            vec!["set-card-profile".to_string(), index.to_string(), profile.clone()]
        }
        Request::Move { kind, index, device } if kind.is_stream() => vec![
            format!("move-{}", kind.wire_name()),
            index.to_string(),
            device.to_string(),
        ],
        Request::Kill { kind, index } if kind.is_stream() => {
            vec![format!("kill-{}", kind.wire_name()), index.to_string()]
        }
        other => return Err(BackendError::Command(format!("unsupported request {:?}", other))),
    };
    Ok(args)
}

fn parse_server_info(text: &str) -> ServerInfo {
    let mut info = ServerInfo::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        let value = value.trim().to_string();
        match key.trim() {
            "Server Name" => info.server_name = value,
            "Server Version" => info.server_version = value,
            "Default Sink" => info.default_sink = Some(value),
            "Default Source" => info.default_source = Some(value),
            _ => {}
        }
    }
    info
}

fn parse_event(pattern: &Regex, line: &str) -> Option<SubscriptionEvent> {
    let caps = pattern.captures(line.trim())?;
    Some(SubscriptionEvent {
        event_type: EventType::from_wire_name(&caps[1])?,
        facility: Facility::from_wire_name(&caps[2])?,
        index: caps[3].parse().ok()?,
    })
}

/// Peak absolute value of a buffer of little-endian `f32` samples.
fn chunk_peak(bytes: &[u8]) -> f32 {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]).abs())
        .fold(0.0f32, f32::max)
}

fn kill_interrupter(child: &Arc<Mutex<Child>>) -> Interrupt {
    let child = child.clone();
    Box::new(move || {
        let _ = lock(&child).kill();
    })
}

fn reap(child: &Arc<Mutex<Child>>) {
    let mut child = lock(child);
    let _ = child.kill();
    let _ = child.wait();
}

struct PactlEvents {
    child: Arc<Mutex<Child>>,
    reader: BufReader<ChildStdout>,
    pattern: Regex,
}

impl EventSource for PactlEvents {
    fn next_event(&mut self) -> Option<SubscriptionEvent> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) | Err(_) => return None,
                Ok(_) => {
                    if let Some(event) = parse_event(&self.pattern, &line) {
                        return Some(event);
                    }
                }
            }
        }
    }

    fn interrupter(&self) -> Interrupt {
        kill_interrupter(&self.child)
    }
}

impl Drop for PactlEvents {
    fn drop(&mut self) {
        reap(&self.child);
    }
}

struct PactlMeter {
    child: Arc<Mutex<Child>>,
    stdout: ChildStdout,
    chunk: Vec<u8>,
}

impl MeterSource for PactlMeter {
    fn read_batch(&mut self) -> BackendResult<Option<Vec<f32>>> {
        match self.stdout.read_exact(&mut self.chunk) {
            Ok(()) => Ok(Some(vec![chunk_peak(&self.chunk)])),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn interrupter(&self) -> Interrupt {
        kill_interrupter(&self.child)
    }
}

impl Drop for PactlMeter {
    fn drop(&mut self) {
        reap(&self.child);
    }
}

// JSON shapes of `pactl -f json list ...`. Unknown fields are ignored.

#[derive(Deserialize)]
struct RawPort {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct RawDevice {
    index: u32,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    mute: bool,
    #[serde(default)]
    volume: Map<String, Value>,
    #[serde(default)]
    monitor_source: Option<String>,
    #[serde(default)]
    ports: Vec<RawPort>,
    #[serde(default)]
    active_port: Option<String>,
}

#[derive(Deserialize)]
struct RawStream {
    index: u32,
    #[serde(default)]
    sink: Option<u32>,
    #[serde(default)]
    source: Option<u32>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    mute: bool,
    #[serde(default)]
    corked: bool,
    #[serde(default)]
    volume: Map<String, Value>,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawProfile {
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct RawCard {
    index: u32,
    name: String,
    #[serde(default)]
    properties: Map<String, Value>,
    #[serde(default)]
    profiles: Map<String, Value>,
    #[serde(default)]
    active_profile: Option<String>,
}

/// Decode the JSON array `pactl -f json list` prints for one kind.
pub fn decode_list(kind: EntityKind, json: &str) -> BackendResult<Vec<EntityInfo>> {
    let infos = match kind {
        EntityKind::Sink | EntityKind::Source => serde_json::from_str::<Vec<RawDevice>>(json)?
            .into_iter()
            .map(|raw| device_info(kind, raw))
            .collect(),
        EntityKind::SinkInput | EntityKind::SourceOutput => {
            serde_json::from_str::<Vec<RawStream>>(json)?
                .into_iter()
                .map(|raw| stream_info(kind, raw))
                .collect()
        }
        EntityKind::Card => serde_json::from_str::<Vec<RawCard>>(json)?
            .into_iter()
            .map(card_info)
            .collect(),
    };
    Ok(infos)
}

/// Channel positions come from the volume object's keys so the two always
/// line up.
fn decode_volume(volume: &Map<String, Value>) -> ChannelVolumes {
    let mut levels = Vec::with_capacity(volume.len());
    let mut positions = Vec::with_capacity(volume.len());
    for (position, entry) in volume {
        let level = entry
            .get("value")
            .and_then(Value::as_u64)
            .unwrap_or(0)
            .min(u32::MAX as u64) as u32;
        levels.push(level);
        positions.push(ChannelPosition::new(position.clone()));
    }
    ChannelVolumes::new(levels, positions)
}

fn property<'a>(properties: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    properties.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn device_info(kind: EntityKind, raw: RawDevice) -> EntityInfo {
    let active_port = raw
        .active_port
        .as_deref()
        .and_then(|name| raw.ports.iter().position(|p| p.name == name));
    let monitor_source = match kind {
        EntityKind::Sink => raw.monitor_source.clone().filter(|s| !s.is_empty()),
        _ => Some(raw.name.clone()),
    };
    let description = if raw.description.is_empty() {
        raw.name.clone()
    } else {
        raw.description
    };
    EntityInfo {
        kind,
        index: raw.index,
        volume: decode_volume(&raw.volume),
        name: raw.name,
        description,
        muted: raw.mute,
        corked: false,
        data: EntityData::Device {
            ports: raw
                .ports
                .into_iter()
                .map(|p| {
                    let description = if p.description.is_empty() { p.name.clone() } else { p.description };
                    NamedOption::new(p.name, description)
                })
                .collect(),
            active_port,
            monitor_source,
        },
    }
}

fn stream_info(kind: EntityKind, raw: RawStream) -> EntityInfo {
    let device = match kind {
        EntityKind::SinkInput => raw.sink,
        _ => raw.source,
    }
    .unwrap_or(u32::MAX);
    let name = raw
        .name
        .clone()
        .or_else(|| property(&raw.properties, "media.name").map(str::to_string))
        .unwrap_or_else(|| format!("{} #{}", kind.wire_name(), raw.index));
    let description = property(&raw.properties, "application.name")
        .map(str::to_string)
        .unwrap_or_else(|| name.clone());
    EntityInfo {
        kind,
        index: raw.index,
        name,
        description,
        volume: decode_volume(&raw.volume),
        muted: raw.mute,
        corked: raw.corked,
        data: EntityData::Stream { device, device_name: None },
    }
}

fn card_info(raw: RawCard) -> EntityInfo {
    let profiles: Vec<NamedOption> = raw
        .profiles
        .iter()
        .map(|(name, value)| {
            let description = serde_json::from_value::<RawProfile>(value.clone())
                .map(|p| p.description)
                .unwrap_or_default();
            let description = if description.is_empty() { name.clone() } else { description };
            NamedOption::new(name.clone(), description)
        })
        .collect();
    let active_profile = raw
        .active_profile
        .as_deref()
        .and_then(|name| profiles.iter().position(|p| p.name == name));
    let description = property(&raw.properties, "device.description")
        .map(str::to_string)
        .unwrap_or_else(|| raw.name.clone());
    EntityInfo {
        kind: EntityKind::Card,
        index: raw.index,
        name: raw.name,
        description,
        volume: ChannelVolumes::empty(),
        muted: false,
        corked: false,
        data: EntityData::Card { profiles, active_profile },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pamix_types::VOLUME_NORM;

    const SINKS: &str = r#"[{"index":0,"state":"RUNNING","name":"alsa_output.analog-stereo",
        "description":"Built-in Audio Analog Stereo","channel_map":"front-left,front-right",
        "mute":false,
        "volume":{"front-left":{"value":65536,"value_percent":"100%","db":"0.00 dB"},
                  "front-right":{"value":32768,"value_percent":"50%","db":"-18.06 dB"}},
        "monitor_source":"alsa_output.analog-stereo.monitor",
        "ports":[{"name":"analog-output-speaker","description":"Speakers"},
                 {"name":"analog-output-headphones","description":"Headphones"}],
        "active_port":"analog-output-headphones"}]"#;

    const SINK_INPUTS: &str = r#"[{"index":42,"sink":0,"corked":true,"mute":true,
        "volume":{"mono":{"value":65536}},
        "properties":{"application.name":"Firefox","media.name":"Video"}}]"#;

    const CARDS: &str = r#"[{"index":3,"name":"alsa_card.pci",
        "properties":{"device.description":"Built-in Audio"},
        "profiles":{"output:analog-stereo":{"description":"Analog Stereo Output"},
                    "off":{"description":"Off"}},
        "active_profile":"off"}]"#;

    #[test]
    fn decodes_sinks() {
        let infos = decode_list(EntityKind::Sink, SINKS).unwrap();
        assert_eq!(infos.len(), 1);
        let sink = &infos[0];
        assert_eq!(sink.index, 0);
        assert_eq!(sink.description, "Built-in Audio Analog Stereo");
        assert_eq!(sink.volume.levels(), &[VOLUME_NORM, VOLUME_NORM / 2]);
        assert_eq!(sink.volume.positions()[1].name(), "front-right");
        match &sink.data {
            EntityData::Device { ports, active_port, monitor_source } => {
                assert_eq!(ports.len(), 2);
                assert_eq!(*active_port, Some(1));
                assert_eq!(monitor_source.as_deref(), Some("alsa_output.analog-stereo.monitor"));
            }
            other => panic!("unexpected data {:?}", other),
        }
    }

    #[test]
    fn decodes_sink_inputs() {
        let infos = decode_list(EntityKind::SinkInput, SINK_INPUTS).unwrap();
        let stream = &infos[0];
        assert_eq!(stream.description, "Firefox");
        assert_eq!(stream.name, "Video");
        assert!(stream.corked);
        assert!(stream.muted);
        assert_eq!(stream.volume.channels(), 1);
        assert_eq!(stream.data, EntityData::Stream { device: 0, device_name: None });
    }

    #[test]
    fn decodes_cards_in_profile_order() {
        let infos = decode_list(EntityKind::Card, CARDS).unwrap();
        let card = &infos[0];
        assert_eq!(card.description, "Built-in Audio");
        assert!(card.volume.is_empty());
        match &card.data {
            EntityData::Card { profiles, active_profile } => {
                assert_eq!(profiles[0].name, "output:analog-stereo");
                assert_eq!(profiles[1].description, "Off");
                assert_eq!(*active_profile, Some(1));
            }
            other => panic!("unexpected data {:?}", other),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            decode_list(EntityKind::Sink, "not json"),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn parses_subscribe_lines() {
        let re = Regex::new(EVENT_PATTERN).unwrap();
        assert_eq!(
            parse_event(&re, "Event 'change' on sink-input #42\n"),
            Some(SubscriptionEvent {
                facility: Facility::SinkInput,
                event_type: EventType::Change,
                index: 42,
            })
        );
        assert_eq!(
            parse_event(&re, "Event 'remove' on card #3").map(|e| e.event_type),
            Some(EventType::Remove)
        );
        assert_eq!(parse_event(&re, "Event 'change' on widget #1"), None);
        assert_eq!(parse_event(&re, "garbage"), None);
    }

    #[test]
    fn builds_command_lines() {
        let args = request_args(&Request::SetVolume {
            kind: EntityKind::SinkInput,
            index: 7,
            levels: vec![100, 200],
        })
        .unwrap();
        assert_eq!(args, ["set-sink-input-volume", "7", "100", "200"]);

        let args = request_args(&Request::Move {
            kind: EntityKind::SourceOutput,
            index: 2,
            device: 5,
        })
        .unwrap();
        assert_eq!(args, ["move-source-output", "2", "5"]);

        assert!(request_args(&Request::Kill { kind: EntityKind::Sink, index: 1 }).is_err());
        assert!(request_args(&Request::SetMute {
            kind: EntityKind::Card,
            index: 1,
            muted: true
        })
        .is_err());
    }

    #[test]
    fn server_info_lines() {
        let info = parse_server_info(
            "Server String: /run/user/1000/pulse/native\nServer Name: pulseaudio\nServer Version: 16.1\nDefault Sink: speakers\n",
        );
        assert_eq!(info.server_name, "pulseaudio");
        assert_eq!(info.server_version, "16.1");
        assert_eq!(info.default_sink.as_deref(), Some("speakers"));
        assert_eq!(info.default_source, None);
    }

    #[test]
    fn chunk_peak_takes_absolute_maximum() {
        let mut bytes = Vec::new();
        for s in [0.1f32, -0.7, 0.3] {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        assert!((chunk_peak(&bytes) - 0.7).abs() < 1e-6);
        assert_eq!(chunk_peak(&[]), 0.0);
    }
}
