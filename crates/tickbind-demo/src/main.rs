#![forbid(unsafe_code)]

//! tickbind demo binary entry point.

use std::time::Duration;

use tickbind_demo::app::TickTockApp;
use tickbind_demo::cli;
use tickbind_demo::jsonl::JsonlSink;
use tickbind_demo::logging;
use tickbind_runtime::program::{Program, ProgramConfig};

fn main() {
    let opts = cli::Opts::parse();
    logging::init();

    let mut app = TickTockApp::new(Duration::from_millis(opts.tick_ms))
        .with_max_fires(opts.ticks)
        .with_key_mode(opts.keys);
    if let Some(path) = opts.jsonl.as_deref() {
        match JsonlSink::open(path) {
            Ok(sink) => app = app.with_jsonl(sink),
            Err(e) => {
                eprintln!("Failed to open {path}: {e}");
                std::process::exit(1);
            }
        }
    }

    let mut config = ProgramConfig::default().with_screen_mode(opts.screen_mode);
    if opts.exit_after_ms > 0 {
        config = config.with_exit_after(Duration::from_millis(opts.exit_after_ms));
    }

    let mut program = Program::with_config(app, config);
    if let Err(e) = program.run() {
        eprintln!("Runtime error: {e}");
        std::process::exit(1);
    }
}
