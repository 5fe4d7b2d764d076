use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pamix_types::{parse_bool, Action};
use regex::Regex;

const DEFAULT_CONFIG: &str = include_str!("../pamix.conf");
const FILE_NAME: &str = "pamix.conf";

pub const AUTOSPAWN_VAR: &str = "pulseaudio_autospawn";
pub const METER_RATE_VAR: &str = "meter_rate";
const DEFAULT_METER_RATE: u32 = 25;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Line { line: usize, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            ConfigError::Line { line, message } => write!(f, "line {}: {}", line, message),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Line { .. } => None,
        }
    }
}

/// Variables and key bindings.
///
/// Keys use curses names (`j`, `^I`, `KEY_F(1)`, `KEY_UP`, ...). A key can
/// carry several actions; they run in the order they were bound.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    variables: HashMap<String, String>,
    bindings: HashMap<String, Vec<Action>>,
}

impl Configuration {
    /// The table compiled into the binary.
    pub fn builtin() -> Self {
        let (config, errors) = Self::parse(DEFAULT_CONFIG);
        debug_assert!(errors.is_empty(), "built-in config has errors: {errors:?}");
        config
    }

    /// First readable file on the search path, else the built-in table.
    pub fn load() -> Self {
        Self::load_from(&search_paths())
    }

    pub fn load_from(paths: &[PathBuf]) -> Self {
        for path in paths {
            if !path.is_file() {
                continue;
            }
            match Self::read_file(path) {
                Ok(mut config) => {
                    log::info!(target: "config", "loaded {}", path.display());
                    if !config.has_bindings() {
                        log::warn!(target: "config", "{} binds no keys, using defaults", path.display());
                        config.bindings = Self::builtin().bindings;
                    }
                    return config;
                }
                Err(e) => log::warn!(target: "config", "skipping config: {}", e),
            }
        }
        Self::builtin()
    }

    /// Read one file. Malformed lines are logged and skipped.
    pub fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let (config, errors) = Self::parse(&text);
        for error in errors {
            log::warn!(target: "config", "{}: {}", path.display(), error);
        }
        Ok(config)
    }

    /// Parse config text, returning what was understood plus one error per
    /// skipped line.
    pub fn parse(text: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Self::default();
        let mut errors = Vec::new();
        for (number, line) in text.lines().enumerate() {
            if let Err(message) = config.apply_line(line) {
                errors.push(ConfigError::Line { line: number + 1, message });
            }
        }
        (config, errors)
    }

    pub fn apply_line(&mut self, line: &str) -> Result<(), String> {
        let line = match line.find(';') {
            Some(pos) => &line[..pos],
            None => line,
        }
        .trim();
        if line.is_empty() {
            return Ok(());
        }

        let (command, rest) = split_word(line);
        match command {
            "set" => {
                let (name, value) = rest
                    .split_once('=')
                    .ok_or_else(|| format!("expected name=value, got '{rest}'"))?;
                self.set(name.trim(), value.trim());
            }
            "bind" => {
                let (key, rest) = split_word(rest);
                let (command, args) = split_word(rest);
                if key.is_empty() || command.is_empty() {
                    return Err("expected: bind <key> <action> [argument]".into());
                }
                check_key_name(key)?;
                let action = Action::parse(command, args)?;
                self.bind(key, action);
            }
            "unbind" => {
                check_key_name(rest)?;
                self.unbind(rest);
            }
            "unbind-all" => self.unbind_all(),
            other => return Err(format!("unknown command '{other}'")),
        }
        Ok(())
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.variables.insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        let value = self.get(name)?;
        match parse_bool(value) {
            Ok(b) => Some(b),
            Err(e) => {
                log::warn!(target: "config", "{}: {}", name, e);
                None
            }
        }
    }

    pub fn get_u32(&self, name: &str) -> Option<u32> {
        let value = self.get(name)?;
        match value.parse() {
            Ok(n) => Some(n),
            Err(_) => {
                log::warn!(target: "config", "{}: '{}' is not a number", name, value);
                None
            }
        }
    }

    pub fn autospawn(&self) -> bool {
        self.get_bool(AUTOSPAWN_VAR).unwrap_or(false)
    }

    pub fn meter_rate(&self) -> u32 {
        self.get_u32(METER_RATE_VAR)
            .filter(|rate| *rate > 0)
            .unwrap_or(DEFAULT_METER_RATE)
    }

    pub fn bind(&mut self, key: &str, action: Action) {
        self.bindings.entry(key.to_string()).or_default().push(action);
    }

    pub fn unbind(&mut self, key: &str) {
        self.bindings.remove(key);
    }

    pub fn unbind_all(&mut self) {
        self.bindings.clear();
    }

    pub fn has_bindings(&self) -> bool {
        !self.bindings.is_empty()
    }

    /// Actions bound to `key`, in binding order.
    pub fn actions_for(&self, key: &str) -> &[Action] {
        self.bindings.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim()),
        None => (s, ""),
    }
}

fn key_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:[!-:<-~]|\^[@-_?]|KEY_F\([1-9][0-9]?\)|KEY_(?:UP|DOWN|LEFT|RIGHT|HOME|END|PPAGE|NPAGE|BTAB|DC|IC|BACKSPACE|ENTER)|ESC|SPACE)$",
        )
        .expect("key name pattern")
    })
}

pub fn is_key_name(name: &str) -> bool {
    key_name_pattern().is_match(name)
}

fn check_key_name(name: &str) -> Result<(), String> {
    if is_key_name(name) {
        Ok(())
    } else {
        Err(format!("invalid key name '{name}'"))
    }
}

/// Candidate config files, most specific first.
pub fn search_paths() -> Vec<PathBuf> {
    search_paths_from(
        std::env::var_os("XDG_CONFIG_HOME"),
        dirs::home_dir(),
        std::env::var_os("XDG_CONFIG_DIRS"),
    )
}

pub fn search_paths_from(
    config_home: Option<OsString>,
    home: Option<PathBuf>,
    config_dirs: Option<OsString>,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    match config_home.filter(|v| !v.is_empty()) {
        Some(dir) => paths.push(PathBuf::from(dir).join(FILE_NAME)),
        None => {
            if let Some(home) = home {
                paths.push(home.join(".config").join(FILE_NAME));
            }
        }
    }

    let dirs = config_dirs
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| OsString::from("/etc/xdg"));
    for dir in std::env::split_paths(&dirs) {
        if !dir.as_os_str().is_empty() {
            paths.push(dir.join(FILE_NAME));
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use pamix_types::EntityKind;
    use std::fs;

    #[test]
    fn builtin_table_matches_documented_keys() {
        let config = Configuration::builtin();
        assert_eq!(config.actions_for("q"), &[Action::Quit]);
        assert_eq!(config.actions_for("KEY_F(1)"), &[Action::SelectTab(EntityKind::SinkInput)]);
        assert_eq!(config.actions_for("KEY_F(3)"), &[Action::SelectTab(EntityKind::Sink)]);
        assert_eq!(config.actions_for("KEY_F(5)"), &[Action::SelectTab(EntityKind::Card)]);
        assert_eq!(config.actions_for("0"), &[Action::SetVolume(1.0)]);
        assert_eq!(config.actions_for("H"), &[Action::AddVolume(-0.15)]);
        assert_eq!(config.actions_for("J"), &[Action::SelectNext { channel: false }]);
        assert_eq!(config.actions_for("j"), &[Action::SelectNext { channel: true }]);
        assert_eq!(config.actions_for("^I"), &[Action::CycleTab { forward: true }]);
        assert_eq!(config.actions_for("x"), &[Action::Kill]);
        assert!(config.actions_for("z").is_empty());
        assert!(!config.autospawn());
        assert_eq!(config.meter_rate(), 25);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let text = "\
set meter_rate=10 ; trailing comment
bind q quit
bind KEY_NOPE quit
bind w fly-away
set novalue
frobnicate
bind m toggle-mute
";
        let (config, errors) = Configuration::parse(text);
        assert_eq!(config.meter_rate(), 10);
        assert_eq!(config.actions_for("m"), &[Action::ToggleMute]);
        let lines: Vec<usize> = errors
            .iter()
            .map(|e| match e {
                ConfigError::Line { line, .. } => *line,
                other => panic!("unexpected {other}"),
            })
            .collect();
        assert_eq!(lines, vec![3, 4, 5, 6]);
    }

    #[test]
    fn repeated_binds_accumulate_until_unbound() {
        let (mut config, errors) = Configuration::parse(
            "bind a set-mute 1\nbind a select-next channel\nbind b quit\n",
        );
        assert!(errors.is_empty());
        assert_eq!(
            config.actions_for("a"),
            &[Action::SetMute(true), Action::SelectNext { channel: true }]
        );
        config.apply_line("unbind a").unwrap();
        assert!(config.actions_for("a").is_empty());
        config.apply_line("unbind-all").unwrap();
        assert!(!config.has_bindings());
    }

    #[test]
    fn key_names() {
        for good in ["j", "J", "0", ":", "<", "^L", "^I", "KEY_F(12)", "KEY_BTAB", "ESC", "SPACE"] {
            assert!(is_key_name(good), "{good}");
        }
        for bad in ["", "jj", ";", "KEY_F(0)", "KEY_FOO", "^a", "space"] {
            assert!(!is_key_name(bad), "{bad}");
        }
    }

    #[test]
    fn semicolon_starts_a_comment_not_a_key() {
        let mut config = Configuration::builtin();
        assert!(config.apply_line("bind ; quit").is_err());
        assert!(config.apply_line("unbind ;").is_err());
        assert!(config.apply_line("bind z quit ; leave").is_ok());
        assert_eq!(config.actions_for("z"), &[Action::Quit]);
    }

    #[test]
    fn search_path_order() {
        let paths = search_paths_from(
            Some("/cfg".into()),
            Some("/home/u".into()),
            Some("/a:/b".into()),
        );
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/cfg/pamix.conf"),
                PathBuf::from("/a/pamix.conf"),
                PathBuf::from("/b/pamix.conf"),
            ]
        );

        let paths = search_paths_from(Some("".into()), Some("/home/u".into()), None);
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/home/u/.config/pamix.conf"),
                PathBuf::from("/etc/xdg/pamix.conf"),
            ]
        );
    }

    #[test]
    fn first_existing_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.conf");
        let system = dir.path().join("system.conf");
        fs::write(&user, "bind z quit\n").unwrap();
        fs::write(&system, "bind y quit\n").unwrap();

        let config = Configuration::load_from(&[dir.path().join("missing.conf"), user, system]);
        assert_eq!(config.actions_for("z"), &[Action::Quit]);
        assert!(config.actions_for("y").is_empty());
    }

    #[test]
    fn file_without_bindings_keeps_variables_and_default_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pamix.conf");
        fs::write(&path, "set pulseaudio_autospawn=yes\nset meter_rate=40\n").unwrap();

        let config = Configuration::load_from(&[path]);
        assert!(config.autospawn());
        assert_eq!(config.meter_rate(), 40);
        assert_eq!(config.actions_for("q"), &[Action::Quit]);
    }

    #[test]
    fn nothing_found_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration::load_from(&[dir.path().join("nope.conf")]);
        assert_eq!(config.actions_for("m"), &[Action::ToggleMute]);
    }
}
