//! Screen layout as a list of draw operations.
//!
//! Nothing here touches the terminal. The UI rasterizes [`DrawOp`]s into
//! whatever surface it owns.

use pamix_types::{to_db, to_fraction, Entity, EntityKey, EntityKind, VOLUME_MUTED};

use crate::dispatch::Selection;
use crate::store::EntityStore;

pub const WAITING_TEXT: &str = "Waiting for audio server connection...";

const HEADER_TITLE_COL: usize = 10;
const VOLUME_BAR_COL: usize = 32;
const LABEL_WIDTH: usize = 15;
/// Fill of a volume bar at 150% of normal.
const VOLUME_BAR_MAX: f64 = 1.5;
const SELECTED_MARKER: &str = "> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Normal,
    /// Selected entity name.
    Highlight,
    /// Muted entity.
    Dim,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text { row: u16, col: u16, text: String, style: Style },
    /// `fill` is the filled fraction of `width`, in `[0, 1]`.
    Bar { row: u16, col: u16, width: u16, fill: f64, style: Style },
}

/// Where a peak bar went in the last full layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterSlot {
    pub key: EntityKey,
    pub row: u16,
    pub col: u16,
    pub width: u16,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub ops: Vec<DrawOp>,
    pub meters: Vec<MeterSlot>,
}

/// Lays out the selected tab. Keeps the scroll offset between frames.
#[derive(Debug, Default)]
pub struct Projection {
    skip: usize,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scroll_offset(&self) -> usize {
        self.skip
    }

    /// Full relayout of `selection.kind` into a `width` x `height` screen.
    pub fn layout(&mut self, selection: &Selection, store: &EntityStore, width: u16, height: u16) -> Frame {
        let width = width as usize;
        let height = height as usize;
        let entries = store.display_order(selection.kind);
        let mut frame = Frame::default();

        let position = if entries.is_empty() { 0 } else { selection.entry + 1 };
        frame.ops.push(text(0, 1, format!("{}/{}", position, entries.len()), Style::Normal));
        frame.ops.push(text(0, HEADER_TITLE_COL, selection.kind.title().to_string(), Style::Normal));

        let heights: Vec<usize> = entries.iter().map(|e| entry_rows(e) + 1).collect();
        self.adjust_scroll(&heights, selection.entry, height.saturating_sub(1));

        let mut row = 1;
        for (index, entity) in entries.iter().enumerate().skip(self.skip) {
            if row + heights[index] > height {
                break;
            }
            row += 1;
            let selected = index == selection.entry;
            row = self.draw_entry(&mut frame, entity, selected.then_some(selection.channel), row, width);
        }
        frame
    }

    /// Keep the selected entry on screen, moving the first shown entry as
    /// little as possible.
    fn adjust_scroll(&mut self, heights: &[usize], selected: usize, available: usize) {
        if heights.is_empty() {
            self.skip = 0;
            return;
        }
        let selected = selected.min(heights.len() - 1);
        self.skip = self.skip.min(heights.len() - 1);
        if selected < self.skip {
            self.skip = selected;
        }
        while self.skip < selected && heights[self.skip..=selected].iter().sum::<usize>() > available {
            self.skip += 1;
        }
    }

    /// Draw one entity starting at `row`; returns the row after it.
    /// `selected_channel` is set when this entity is selected.
    fn draw_entry(&self, frame: &mut Frame, entity: &Entity, selected_channel: Option<usize>, mut row: usize, width: usize) -> usize {
        let bar_width = width.saturating_sub(VOLUME_BAR_COL + 1);
        let style = if entity.muted { Style::Dim } else { Style::Normal };

        if entity.channels() > 0 {
            if entity.volume_locked {
                let level = entity.volume.avg();
                let label = channel_label("All", level, selected_channel.is_some());
                frame.ops.push(text(row, 1, label, style));
                frame.ops.push(bar(row, VOLUME_BAR_COL, bar_width, volume_fill(level), style));
                row += 1;
            } else {
                let positions = entity.volume.positions();
                for (channel, &level) in entity.volume.levels().iter().enumerate() {
                    let name = positions[channel].pretty();
                    let marked = selected_channel == Some(channel);
                    frame.ops.push(text(row, 1, channel_label(&name, level, marked), style));
                    frame.ops.push(bar(row, VOLUME_BAR_COL, bar_width, volume_fill(level), style));
                    row += 1;
                }
            }
        }

        if entity.kind != EntityKind::Card {
            let slot = MeterSlot {
                key: entity.key(),
                row: to_u16(row),
                col: 1,
                width: to_u16(width.saturating_sub(2)),
            };
            frame.ops.push(meter_op(&slot, entity.display_peak()));
            frame.meters.push(slot);
            row += 1;
        }

        let name = truncate(&entity.display_name, width * 2 / 5);
        let name_style = if selected_channel.is_some() { Style::Highlight } else { Style::Normal };
        let mut col = 1 + name.chars().count();
        frame.ops.push(text(row, 1, name, name_style));

        let flags = flags(entity);
        if !flags.is_empty() {
            let len = flags.chars().count();
            frame.ops.push(text(row, col, flags, Style::Normal));
            col += len;
        }

        if let Some(label) = entity.detail_label() {
            let room = width.saturating_sub(col + 3);
            if room > 2 {
                let label = truncate(label, room);
                let label_col = width.saturating_sub(label.chars().count() + 2);
                frame.ops.push(text(row, label_col, label, Style::Normal));
            }
        }
        row + 1
    }
}

/// Peak bars only, at the positions of `frame`, from current store peaks.
pub fn meter_ops(frame: &Frame, store: &EntityStore) -> Vec<DrawOp> {
    frame
        .meters
        .iter()
        .map(|slot| {
            let peak = store.entity(slot.key).map(Entity::display_peak).unwrap_or(0.0);
            meter_op(slot, peak)
        })
        .collect()
}

/// Placeholder shown while no server connection exists.
pub fn waiting_frame() -> Frame {
    Frame {
        ops: vec![text(0, 1, WAITING_TEXT.to_string(), Style::Normal)],
        meters: Vec::new(),
    }
}

/// Rows one entity occupies, not counting the blank separator.
fn entry_rows(entity: &Entity) -> usize {
    let channel_rows = match entity.channels() {
        0 => 0,
        _ if entity.volume_locked => 1,
        n => n,
    };
    let peak_row = usize::from(entity.kind != EntityKind::Card);
    channel_rows + peak_row + 1
}

fn channel_label(name: &str, level: u32, selected: bool) -> String {
    let (marker, width) = if selected {
        (SELECTED_MARKER, LABEL_WIDTH - SELECTED_MARKER.len())
    } else {
        ("", LABEL_WIDTH)
    };
    let name: String = name.chars().take(width).collect();
    format!(
        "{marker}{name:<width$} {:.2}dB ({:.2})",
        to_db(level),
        to_fraction(level)
    )
}

fn flags(entity: &Entity) -> String {
    let mut flags = String::new();
    if entity.muted || (entity.channels() > 0 && entity.volume.avg() == VOLUME_MUTED) {
        flags.push_str(" M");
    }
    if entity.volume_locked && entity.channels() > 0 {
        flags.push_str(" L");
    }
    if entity.corked {
        flags.push_str(" P");
    }
    flags
}

fn volume_fill(level: u32) -> f64 {
    (to_fraction(level) / VOLUME_BAR_MAX).clamp(0.0, 1.0)
}

fn meter_op(slot: &MeterSlot, peak: f32) -> DrawOp {
    DrawOp::Bar {
        row: slot.row,
        col: slot.col,
        width: slot.width,
        fill: f64::from(peak).clamp(0.0, 1.0),
        style: Style::Normal,
    }
}

/// Cut `s` to `max` characters, marking the cut with `..`.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(2)).collect();
    out.push_str("..");
    out
}

fn text(row: usize, col: usize, text: String, style: Style) -> DrawOp {
    DrawOp::Text { row: to_u16(row), col: to_u16(col), text, style }
}

fn bar(row: usize, col: usize, width: usize, fill: f64, style: Style) -> DrawOp {
    DrawOp::Bar { row: to_u16(row), col: to_u16(col), width: to_u16(width), fill, style }
}

fn to_u16(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}
