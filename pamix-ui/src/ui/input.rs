use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Top-level input event: a key by its curses name, or a resize
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Key(String),
    Resize(u16, u16),
}

/// Anything that can be polled for input events.
pub trait InputSource {
    /// Wait up to `timeout` for the next event.
    fn poll_event(&mut self, timeout: Duration) -> Option<AppEvent>;
}

/// Curses name of a key, as used in `bind` lines.
///
/// Returns `None` for keys with no curses name (media keys, bare modifiers).
pub fn key_name(event: &KeyEvent) -> Option<String> {
    let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);
    let name = match event.code {
        KeyCode::Char(c) if ctrl => {
            if !c.is_ascii_alphabetic() {
                return None;
            }
            format!("^{}", c.to_ascii_uppercase())
        }
        KeyCode::Char(' ') => "SPACE".to_string(),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Tab => "^I".to_string(),
        KeyCode::BackTab => "KEY_BTAB".to_string(),
        KeyCode::Enter => "KEY_ENTER".to_string(),
        KeyCode::Esc => "ESC".to_string(),
        KeyCode::Backspace => "KEY_BACKSPACE".to_string(),
        KeyCode::Delete => "KEY_DC".to_string(),
        KeyCode::Insert => "KEY_IC".to_string(),
        KeyCode::Up => "KEY_UP".to_string(),
        KeyCode::Down => "KEY_DOWN".to_string(),
        KeyCode::Left => "KEY_LEFT".to_string(),
        KeyCode::Right => "KEY_RIGHT".to_string(),
        KeyCode::Home => "KEY_HOME".to_string(),
        KeyCode::End => "KEY_END".to_string(),
        KeyCode::PageUp => "KEY_PPAGE".to_string(),
        KeyCode::PageDown => "KEY_NPAGE".to_string(),
        KeyCode::F(n) => format!("KEY_F({})", n),
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(code: KeyCode, modifiers: KeyModifiers) -> Option<String> {
        key_name(&KeyEvent::new(code, modifiers))
    }

    #[test]
    fn printable_keys_keep_their_case() {
        assert_eq!(name(KeyCode::Char('j'), KeyModifiers::NONE).as_deref(), Some("j"));
        assert_eq!(name(KeyCode::Char('J'), KeyModifiers::SHIFT).as_deref(), Some("J"));
        assert_eq!(name(KeyCode::Char('0'), KeyModifiers::NONE).as_deref(), Some("0"));
        assert_eq!(name(KeyCode::Char(' '), KeyModifiers::NONE).as_deref(), Some("SPACE"));
    }

    #[test]
    fn control_keys_use_caret_names() {
        assert_eq!(name(KeyCode::Char('l'), KeyModifiers::CONTROL).as_deref(), Some("^L"));
        assert_eq!(name(KeyCode::Tab, KeyModifiers::NONE).as_deref(), Some("^I"));
        assert_eq!(name(KeyCode::Char('1'), KeyModifiers::CONTROL), None);
    }

    #[test]
    fn special_keys_use_curses_names() {
        assert_eq!(name(KeyCode::F(3), KeyModifiers::NONE).as_deref(), Some("KEY_F(3)"));
        assert_eq!(name(KeyCode::BackTab, KeyModifiers::SHIFT).as_deref(), Some("KEY_BTAB"));
        assert_eq!(name(KeyCode::PageUp, KeyModifiers::NONE).as_deref(), Some("KEY_PPAGE"));
        assert_eq!(name(KeyCode::PageDown, KeyModifiers::NONE).as_deref(), Some("KEY_NPAGE"));
        assert_eq!(name(KeyCode::Delete, KeyModifiers::NONE).as_deref(), Some("KEY_DC"));
        assert_eq!(name(KeyCode::Esc, KeyModifiers::NONE).as_deref(), Some("ESC"));
        assert_eq!(name(KeyCode::CapsLock, KeyModifiers::NONE), None);
    }
}
