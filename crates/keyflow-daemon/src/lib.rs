mod daemon_manager;
mod engine_host;
mod process;

// Re-export the main functionality
pub use daemon_manager::{
    daemon_status, daemon_worker_entry, run_daemon_worker, start_daemon, stop_daemon,
};
pub use engine_host::{
    load_snapshot, log_status, run_engine, ExpansionStats, ProfileWatcher, RELOAD_INTERVAL,
};
pub use process::verify_process_running;
