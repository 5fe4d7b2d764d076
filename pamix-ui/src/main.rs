mod runtime;
mod ui;

use std::fs::File;
use std::path::PathBuf;

use runtime::AppRuntime;
use ui::RatatuiBackend;

const USAGE: &str = "\
Usage: pamix [OPTIONS]

Options:
  -v, --verbose   Log at debug level
  -V, --version   Print version and exit
  -h, --help      Print this help and exit

Key bindings are read from $XDG_CONFIG_HOME/pamix.conf, then
$XDG_CONFIG_DIRS/pamix.conf, falling back to the built-in table.";

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pamix")
        .join("pamix.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path).or_else(|_| File::create("/tmp/pamix.log")) {
        Ok(file) => file,
        Err(_) => return,
    };

    if WriteLogger::init(log_level, Config::default(), log_file).is_ok() {
        log::info!("pamix starting (log level: {:?})", log_level);
    }
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("pamix {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let mut app = AppRuntime::new()?;

    let mut backend = RatatuiBackend::new()?;
    backend.start()?;

    let result = app.run(&mut backend);

    backend.stop()?;
    result
}
