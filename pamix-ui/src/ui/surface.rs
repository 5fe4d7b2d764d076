//! Rasterizes layout draw operations into a ratatui buffer.

use pamix_core::projection::{DrawOp, Style};
use ratatui::buffer::Buffer;
use ratatui::style::{Color, Modifier, Style as RatatuiStyle};

const BAR_FILLED: char = '|';
const BAR_EMPTY: char = ' ';

pub fn rasterize(ops: &[DrawOp], buf: &mut Buffer) {
    for op in ops {
        match op {
            DrawOp::Text { row, col, text, style } => put_text(buf, *row, *col, text, text_style(*style)),
            DrawOp::Bar { row, col, width, fill, style } => put_bar(buf, *row, *col, *width, *fill, *style),
        }
    }
}

fn text_style(style: Style) -> RatatuiStyle {
    match style {
        Style::Normal => RatatuiStyle::default().fg(Color::White),
        Style::Highlight => RatatuiStyle::default()
            .fg(Color::White)
            .add_modifier(Modifier::REVERSED),
        Style::Dim => RatatuiStyle::default().fg(Color::DarkGray),
    }
}

/// Green, yellow and red by thirds of the bar.
fn segment_color(index: u16, inner: u16) -> Color {
    let third = u32::from(index) * 3 / u32::from(inner.max(1));
    match third {
        0 => Color::Green,
        1 => Color::Yellow,
        _ => Color::Red,
    }
}

fn put_char(buf: &mut Buffer, x: u16, y: u16, ch: char, style: RatatuiStyle) {
    if let Some(cell) = buf.cell_mut((x, y)) {
        cell.set_char(ch);
        cell.set_style(style);
    }
}

fn put_text(buf: &mut Buffer, row: u16, col: u16, text: &str, style: RatatuiStyle) {
    for (i, ch) in text.chars().enumerate() {
        let Ok(offset) = u16::try_from(i) else { break };
        let Some(x) = col.checked_add(offset) else { break };
        if x >= buf.area.width {
            break;
        }
        put_char(buf, x, row, ch, style);
    }
}

/// `[`, the filled and empty segments, then `]`. Needs at least 3 columns.
fn put_bar(buf: &mut Buffer, row: u16, col: u16, width: u16, fill: f64, style: Style) {
    if width < 3 {
        return;
    }
    let frame_style = text_style(Style::Normal);
    let inner = width - 2;
    let filled = (fill.clamp(0.0, 1.0) * f64::from(inner)).round() as u16;

    put_char(buf, col, row, '[', frame_style);
    for i in 0..inner {
        let x = col.saturating_add(1 + i);
        if i < filled {
            let color = match style {
                Style::Dim => Color::DarkGray,
                _ => segment_color(i, inner),
            };
            put_char(buf, x, row, BAR_FILLED, RatatuiStyle::default().fg(color));
        } else {
            put_char(buf, x, row, BAR_EMPTY, frame_style);
        }
    }
    put_char(buf, col.saturating_add(width - 1), row, ']', frame_style);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::layout::Rect;

    fn row_text(buf: &Buffer, row: u16) -> String {
        (0..buf.area.width)
            .map(|x| buf.cell((x, row)).map(|c| c.symbol().to_string()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn text_lands_at_row_and_column() {
        let mut buf = Buffer::empty(Rect::new(0, 0, 20, 3));
        rasterize(
            &[DrawOp::Text { row: 1, col: 2, text: "Speakers".into(), style: Style::Normal }],
            &mut buf,
        );
        assert_eq!(row_text(&buf, 1), "  Speakers          ");
        assert_eq!(row_text(&buf, 0).trim(), "");
    }

    #[test]
    fn text_is_clipped_at_the_right_edge() {
        let mut buf = Buffer::empty(Rect::new(0, 0, 6, 1));
        rasterize(
            &[DrawOp::Text { row: 0, col: 3, text: "abcdef".into(), style: Style::Normal }],
            &mut buf,
        );
        assert_eq!(row_text(&buf, 0), "   abc");
    }

    #[test]
    fn highlight_is_reversed_and_dim_is_gray() {
        let mut buf = Buffer::empty(Rect::new(0, 0, 10, 2));
        rasterize(
            &[
                DrawOp::Text { row: 0, col: 0, text: "a".into(), style: Style::Highlight },
                DrawOp::Text { row: 1, col: 0, text: "b".into(), style: Style::Dim },
            ],
            &mut buf,
        );
        assert!(buf[(0, 0)].modifier.contains(Modifier::REVERSED));
        assert_eq!(buf[(0, 1)].fg, Color::DarkGray);
    }

    #[test]
    fn bar_fill_and_thirds() {
        let mut buf = Buffer::empty(Rect::new(0, 0, 11, 1));
        rasterize(
            &[DrawOp::Bar { row: 0, col: 0, width: 11, fill: 1.0, style: Style::Normal }],
            &mut buf,
        );
        assert_eq!(row_text(&buf, 0), "[|||||||||]");
        assert_eq!(buf[(1, 0)].fg, Color::Green);
        assert_eq!(buf[(5, 0)].fg, Color::Yellow);
        assert_eq!(buf[(9, 0)].fg, Color::Red);

        rasterize(
            &[DrawOp::Bar { row: 0, col: 0, width: 11, fill: 1.0 / 3.0, style: Style::Normal }],
            &mut buf,
        );
        assert_eq!(row_text(&buf, 0), "[|||      ]");
    }

    #[test]
    fn out_of_range_ops_are_ignored() {
        let mut buf = Buffer::empty(Rect::new(0, 0, 4, 1));
        rasterize(
            &[
                DrawOp::Text { row: 5, col: 0, text: "x".into(), style: Style::Normal },
                DrawOp::Bar { row: 0, col: 0, width: 2, fill: 1.0, style: Style::Normal },
            ],
            &mut buf,
        );
        assert_eq!(row_text(&buf, 0), "    ");
    }
}
