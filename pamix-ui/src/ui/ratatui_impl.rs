use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
    Terminal,
};

use super::input::{key_name, AppEvent, InputSource};

/// Ratatui-based terminal backend. Only the draw thread owns one.
pub struct RatatuiBackend {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl RatatuiBackend {
    /// Create a new ratatui backend (does not start terminal mode)
    pub fn new() -> io::Result<Self> {
        let backend = CrosstermBackend::new(io::stdout());
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }

    /// Enter raw mode and the alternate screen
    pub fn start(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        self.terminal.hide_cursor()?;
        self.terminal.clear()?;
        Ok(())
    }

    /// Leave raw mode and the alternate screen
    pub fn stop(&mut self) -> io::Result<()> {
        let _ = self.terminal.show_cursor();
        disable_raw_mode()?;
        execute!(io::stdout(), LeaveAlternateScreen)?;
        Ok(())
    }

    /// Begin a new frame on a blank background
    pub fn begin_frame(&self) -> io::Result<RatatuiFrame> {
        let size = self.terminal.size()?;
        let area = Rect::new(0, 0, size.width, size.height);
        let mut buffer = Buffer::empty(area);
        buffer.set_style(area, Style::default().bg(Color::Reset));
        Ok(RatatuiFrame { buffer })
    }

    /// Render `frame` to the screen. Only changed cells are written.
    pub fn end_frame(&mut self, frame: &RatatuiFrame) -> io::Result<()> {
        self.terminal.draw(|f| {
            let area = f.area();
            f.render_widget(BufferWidget(&frame.buffer), area);
        })?;
        Ok(())
    }

    /// Current terminal size as (columns, rows)
    pub fn size(&self) -> io::Result<(u16, u16)> {
        let size = self.terminal.size()?;
        Ok((size.width, size.height))
    }
}

/// A frame for drawing operations
#[derive(Clone)]
pub struct RatatuiFrame {
    buffer: Buffer,
}

impl RatatuiFrame {
    /// Get mutable access to the underlying buffer
    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    pub fn area(&self) -> Rect {
        self.buffer.area
    }
}

/// Keyboard and resize events from the controlling terminal.
///
/// Reads crossterm's global event queue, so it can live on a different
/// thread than the [`RatatuiBackend`].
#[derive(Debug, Default)]
pub struct TerminalInput;

impl InputSource for TerminalInput {
    fn poll_event(&mut self, timeout: Duration) -> Option<AppEvent> {
        let mut t = timeout;
        loop {
            if !event::poll(t).ok()? {
                return None;
            }
            match event::read().ok()? {
                Event::Key(key_event) => {
                    if key_event.kind == KeyEventKind::Release {
                        t = Duration::ZERO;
                        continue;
                    }
                    match key_name(&key_event) {
                        Some(name) => return Some(AppEvent::Key(name)),
                        None => t = Duration::ZERO,
                    }
                }
                Event::Resize(w, h) => return Some(AppEvent::Resize(w, h)),
                _ => {
                    // Discarded event (FocusGained, paste, etc.): drain with zero timeout
                    t = Duration::ZERO;
                }
            }
        }
    }
}

/// Widget that copies a pre-built buffer
struct BufferWidget<'a>(&'a Buffer);

impl Widget for BufferWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for y in area.y..area.y.saturating_add(area.height) {
            for x in area.x..area.x.saturating_add(area.width) {
                if let (Some(src), Some(dst)) = (self.0.cell((x, y)), buf.cell_mut((x, y))) {
                    *dst = src.clone();
                }
            }
        }
    }
}
