mod e2e;

use e2e::TmuxHarness;
use std::time::Duration;

fn binary_path() -> &'static str {
    env!("CARGO_BIN_EXE_pamix")
}

/// Check if tmux is available, skip test if not
fn require_tmux() -> bool {
    std::process::Command::new("tmux")
        .arg("-V")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn wait_render() {
    std::thread::sleep(Duration::from_millis(300));
}

// ---------------------------------------------------------------------------
// Tests (need tmux; ignored by default)
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn test_shows_waiting_text_without_server() {
    if !require_tmux() {
        eprintln!("tmux not found, skipping test");
        return;
    }
    let home = tempfile::tempdir().expect("temp dir");

    let harness = TmuxHarness::new("waiting");
    harness.start(binary_path(), home.path()).expect("Failed to start app");
    wait_render();

    harness
        .assert_screen_contains("Waiting for audio server connection...")
        .expect("Should show the disconnected placeholder");
    assert!(harness.is_running(), "App should keep running while disconnected");
}

#[test]
#[ignore]
fn test_quit_key_exits() {
    if !require_tmux() {
        eprintln!("tmux not found, skipping test");
        return;
    }
    let home = tempfile::tempdir().expect("temp dir");

    let harness = TmuxHarness::new("quit");
    harness.start(binary_path(), home.path()).expect("Failed to start app");
    wait_render();

    harness.send_key("q").expect("Failed to send q");
    harness
        .wait_for_exit(Duration::from_secs(5))
        .expect("App should exit on q");
}

#[test]
#[ignore]
fn test_user_config_rebinds_quit() {
    if !require_tmux() {
        eprintln!("tmux not found, skipping test");
        return;
    }
    let home = tempfile::tempdir().expect("temp dir");
    let config_dir = home.path().join(".config");
    std::fs::create_dir_all(&config_dir).expect("config dir");
    std::fs::write(config_dir.join("pamix.conf"), "bind Q quit\n").expect("write config");

    let harness = TmuxHarness::new("rebind");
    harness.start(binary_path(), home.path()).expect("Failed to start app");
    wait_render();

    harness.send_key("q").expect("Failed to send q");
    wait_render();
    assert!(harness.is_running(), "q is unbound by the user config");

    harness.send_key("Q").expect("Failed to send Q");
    harness
        .wait_for_exit(Duration::from_secs(5))
        .expect("App should exit on Q");
}
