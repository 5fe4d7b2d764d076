//! Rendering: full relayouts and meters-only repaints.

use std::io;
use std::sync::PoisonError;

use pamix_core::projection::{meter_ops, waiting_frame};

use super::AppRuntime;
use crate::ui::{rasterize, RatatuiBackend};

impl AppRuntime {
    /// Draw one update. Falls back to a full relayout when there is no
    /// previous frame or the terminal changed size.
    pub(crate) fn render(&mut self, backend: &mut RatatuiBackend, full_redraw: bool) -> io::Result<()> {
        let (width, height) = backend.size()?;
        let reusable = self
            .last_frame
            .as_ref()
            .is_some_and(|(_, screen)| screen.area().width == width && screen.area().height == height);

        if full_redraw || !reusable {
            return self.render_full(backend);
        }

        let Some((layout, screen)) = self.last_frame.as_ref() else {
            return Ok(());
        };
        let mut screen = screen.clone();
        {
            let store = self.session.store().lock().unwrap_or_else(PoisonError::into_inner);
            rasterize(&meter_ops(layout, &store), screen.buffer_mut());
        }
        backend.end_frame(&screen)?;
        Ok(())
    }

    fn render_full(&mut self, backend: &mut RatatuiBackend) -> io::Result<()> {
        let mut screen = backend.begin_frame()?;
        let area = screen.area();

        let layout = if self.session.is_connected() {
            let projection = &mut self.projection;
            self.dispatcher
                .with_view(|selection, store| projection.layout(selection, store, area.width, area.height))
        } else {
            waiting_frame()
        };

        rasterize(&layout.ops, screen.buffer_mut());
        backend.end_frame(&screen)?;
        self.last_frame = Some((layout, screen));
        Ok(())
    }
}
