use serde::{Deserialize, Serialize};

use crate::EntityKind;

/// Abstract user command. Key bindings resolve to these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Quit,
    SelectTab(EntityKind),
    CycleTab { forward: bool },
    /// Move the selection down; `channel` steps through channels of an
    /// unlocked entity before moving to the next entity.
    SelectNext { channel: bool },
    SelectPrev { channel: bool },
    /// Absolute volume as a fraction of normal.
    SetVolume(f64),
    /// Relative volume change as a fraction of normal.
    AddVolume(f64),
    /// Next/previous port, profile or device depending on the entity.
    Cycle { forward: bool },
    ToggleMute,
    SetMute(bool),
    ToggleLock,
    SetLock(bool),
    Kill,
}

impl Action {
    /// Build an action from a config command name and its argument string.
    pub fn parse(command: &str, args: &str) -> Result<Action, String> {
        let args = args.trim();
        let action = match command {
            "quit" => Action::Quit,
            "select-tab" => Action::SelectTab(
                EntityKind::from_tab_arg(args).ok_or_else(|| format!("unknown tab '{args}'"))?,
            ),
            "cycle-tab-next" => Action::CycleTab { forward: true },
            "cycle-tab-prev" => Action::CycleTab { forward: false },
            "select-next" => Action::SelectNext { channel: parse_channel_flag(args)? },
            "select-prev" => Action::SelectPrev { channel: parse_channel_flag(args)? },
            "set-volume" => Action::SetVolume(parse_float(args)?),
            "add-volume" => Action::AddVolume(parse_float(args)?),
            "cycle-next" => Action::Cycle { forward: true },
            "cycle-prev" => Action::Cycle { forward: false },
            "toggle-mute" => Action::ToggleMute,
            "set-mute" => Action::SetMute(parse_bool(args)?),
            "toggle-lock" => Action::ToggleLock,
            "set-lock" => Action::SetLock(parse_bool(args)?),
            "kill" => Action::Kill,
            other => return Err(format!("unknown action '{other}'")),
        };
        Ok(action)
    }
}

fn parse_channel_flag(args: &str) -> Result<bool, String> {
    match args {
        "" => Ok(false),
        "channel" => Ok(true),
        other => Err(format!("expected 'channel', got '{other}'")),
    }
}

fn parse_float(args: &str) -> Result<f64, String> {
    args.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("expected a number, got '{args}'"))
}

/// Boolean the way config variables spell it: `1`/`0`, `true`/`false`, `yes`/`no`.
pub fn parse_bool(args: &str) -> Result<bool, String> {
    match args.trim() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{other}'")),
    }
}
