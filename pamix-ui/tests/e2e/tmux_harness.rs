use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

const WIDTH: u32 = 100;
const HEIGHT: u32 = 30;

pub struct TmuxHarness {
    session_name: String,
}

impl TmuxHarness {
    pub fn new(test_name: &str) -> Self {
        let session_name = format!(
            "pamix-{}-{}",
            test_name,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_millis()
        );
        Self { session_name }
    }

    /// Start the app in a new tmux session with no reachable audio server.
    ///
    /// Env vars go on the command line: the tmux server spawns children in
    /// its own environment.
    pub fn start(&self, command: &str, home: &Path) -> Result<(), String> {
        let wrapped = format!(
            "PULSE_SERVER=unix:/nonexistent HOME={home} XDG_CONFIG_HOME={home}/.config XDG_CONFIG_DIRS={home}/xdg {command}",
            home = home.display(),
        );
        let status = Command::new("tmux")
            .args([
                "new-session",
                "-d",
                "-s",
                &self.session_name,
                "-x",
                &WIDTH.to_string(),
                "-y",
                &HEIGHT.to_string(),
                &wrapped,
            ])
            .env_remove("TMUX")
            .status()
            .map_err(|e| format!("Failed to start tmux: {}", e))?;

        if !status.success() {
            return Err("tmux new-session failed".to_string());
        }

        thread::sleep(Duration::from_millis(1000));
        Ok(())
    }

    /// Send a single key, by tmux key name
    pub fn send_key(&self, key: &str) -> Result<(), String> {
        let status = Command::new("tmux")
            .args(["send-keys", "-t", &self.session_name, key])
            .env_remove("TMUX")
            .status()
            .map_err(|e| format!("Failed to send keys: {}", e))?;

        if !status.success() {
            return Err(format!("tmux send-keys failed for key: {}", key));
        }
        thread::sleep(Duration::from_millis(150));
        Ok(())
    }

    /// Capture the visible pane, one line per row
    pub fn capture_screen(&self) -> Result<String, String> {
        let output = Command::new("tmux")
            .args(["capture-pane", "-t", &self.session_name, "-p"])
            .env_remove("TMUX")
            .output()
            .map_err(|e| format!("Failed to capture screen: {}", e))?;

        if !output.status.success() {
            return Err("tmux capture-pane failed".to_string());
        }

        String::from_utf8(output.stdout)
            .map_err(|e| format!("Invalid UTF-8 in screen capture: {}", e))
    }

    /// Assert the pane currently shows `text`
    pub fn assert_screen_contains(&self, text: &str) -> Result<(), String> {
        let screen = self.capture_screen()?;
        if screen.contains(text) {
            Ok(())
        } else {
            Err(format!(
                "Expected screen to contain: '{}'\nActual screen:\n{}",
                text, screen
            ))
        }
    }

    /// Check if the tmux session is still alive
    pub fn is_running(&self) -> bool {
        Command::new("tmux")
            .args(["has-session", "-t", &self.session_name])
            .env_remove("TMUX")
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Wait for the session to exit (with timeout)
    pub fn wait_for_exit(&self, timeout: Duration) -> Result<(), String> {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if !self.is_running() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(100));
        }
        Err("Timeout waiting for session to exit".to_string())
    }

    /// Kill the tmux session, ignoring errors
    pub fn kill(&self) {
        let _ = Command::new("tmux")
            .args(["kill-session", "-t", &self.session_name])
            .env_remove("TMUX")
            .status();
    }
}

impl Drop for TmuxHarness {
    fn drop(&mut self) {
        self.kill();
    }
}
