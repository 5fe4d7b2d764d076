pub mod input;
pub mod ratatui_impl;
pub mod surface;

pub use input::{AppEvent, InputSource};
pub use ratatui_impl::{RatatuiBackend, RatatuiFrame, TerminalInput};
pub use surface::rasterize;
