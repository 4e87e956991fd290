pub mod cli;
pub mod commands;

use chrono::Local;
use clap::Parser;
use cli::Keyflow;
use commands::handle_command;
use std::env;
use std::io::Write;
use std::process;

/// Environment variable selecting the log filter; `RUST_LOG` is the fallback.
pub const LOG_ENV: &str = "KEYFLOW_LOG";

/// Install the global logger. Safe to call more than once.
pub fn init_logging() {
    let filter = env::var(LOG_ENV)
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    let _ = env_logger::Builder::new()
        .parse_filters(&filter)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();
}

/// Run the keyflow CLI application
pub fn run_main() {
    init_logging();
    log::debug!("keyflow {}", env!("CARGO_PKG_VERSION"));

    // Special hidden flag for daemon worker process
    if env::args().any(|arg| arg == "--daemon-worker") {
        if let Err(e) = keyflow_daemon::daemon_worker_entry() {
            eprintln!("Daemon worker failed: {}", e);
            process::exit(1);
        }
        return;
    }

    let args = Keyflow::parse();
    if let Err(e) = handle_command(args.commands) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
