mod tmux_harness;

pub use tmux_harness::TmuxHarness;
