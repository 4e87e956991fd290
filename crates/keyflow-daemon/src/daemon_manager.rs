use crate::engine_host::run_engine;
use crate::process::{terminate_process, verify_process_running};
use keyflow_core::config::{
    ensure_config_dir, get_pid_file_path, load_config, DAEMON_LOG_FILENAME, HOOK_BACKEND_ENV,
};
use keyflow_core::storage::JsonProfileStore;
use keyflow_core::{get_config_dir, is_daemon_running, BackendKind, KeyflowError, Result};
use log::{error, info};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::process::{self, Command};
use std::thread;
use std::time::Duration;

fn daemon_log_file() -> PathBuf {
    get_config_dir().join(DAEMON_LOG_FILENAME)
}

/// Remove a PID file whose process is gone. Returns the PID of a live daemon.
fn live_daemon_pid() -> Result<Option<u32>> {
    match is_daemon_running()? {
        Some(pid) if verify_process_running(pid) => Ok(Some(pid)),
        Some(_) => {
            println!("Found stale PID file. Cleaning up...");
            let _ = fs::remove_file(get_pid_file_path());
            Ok(None)
        }
        None => Ok(None),
    }
}

#[cfg(unix)]
fn spawn_worker(backend: Option<BackendKind>) -> Result<()> {
    let current_exe = std::env::current_exe()?;
    let cmd = format!(
        "nohup \"{}\" daemon-worker > \"{}\" 2>&1 &",
        current_exe.to_string_lossy(),
        daemon_log_file().to_string_lossy()
    );

    let mut command = Command::new("sh");
    command.arg("-c").arg(&cmd);
    if let Some(backend) = backend {
        command.env(HOOK_BACKEND_ENV, backend.as_str());
    }
    command.status()?;
    Ok(())
}

#[cfg(windows)]
fn spawn_worker(backend: Option<BackendKind>) -> Result<()> {
    let current_exe = std::env::current_exe()?;
    let cmd = format!(
        "START /B \"keyflow Daemon\" \"{}\" daemon-worker > \"{}\" 2>&1",
        current_exe.to_string_lossy(),
        daemon_log_file().to_string_lossy()
    );

    let mut command = Command::new("cmd");
    command.arg("/C").arg(&cmd);
    if let Some(backend) = backend {
        command.env(HOOK_BACKEND_ENV, backend.as_str());
    }
    command.status()?;
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn spawn_worker(_backend: Option<BackendKind>) -> Result<()> {
    Err(KeyflowError::Other(
        "Running in the background is not supported on this platform; use --foreground".to_string(),
    ))
}

/// Start the daemon, either detached or in the current process.
pub fn start_daemon(foreground: bool, backend: Option<BackendKind>) -> Result<()> {
    if let Some(pid) = live_daemon_pid()? {
        return Err(KeyflowError::DaemonAlreadyRunning(pid));
    }
    ensure_config_dir()?;

    if foreground {
        if let Some(backend) = backend {
            std::env::set_var(HOOK_BACKEND_ENV, backend.as_str());
        }
        println!("Running keyflow in the foreground. Press Ctrl+C to stop.");
        return daemon_worker_entry();
    }

    println!("Starting keyflow daemon...");
    spawn_worker(backend)?;

    // Wait for the worker to install its hook and write the PID file
    for _ in 0..20 {
        thread::sleep(Duration::from_millis(100));
        if is_daemon_running()?.is_some() {
            break;
        }
    }
    // A worker whose hook failed exits right after writing its PID file
    thread::sleep(Duration::from_millis(300));

    match is_daemon_running()? {
        Some(pid) if verify_process_running(pid) => {
            println!("Daemon started successfully with PID {}.", pid);
            Ok(())
        }
        _ => Err(KeyflowError::Other(format!(
            "Daemon failed to start. Check logs at {}",
            daemon_log_file().display()
        ))),
    }
}

/// Stop the daemon if it's running
pub fn stop_daemon() -> Result<()> {
    let pid_file = get_pid_file_path();
    if !pid_file.exists() {
        return Err(KeyflowError::DaemonNotRunning);
    }

    let pid = match fs::read_to_string(&pid_file)
        .ok()
        .and_then(|content| content.trim().parse::<u32>().ok())
    {
        Some(pid) => pid,
        None => {
            let _ = fs::remove_file(&pid_file);
            return Err(KeyflowError::InvalidPid);
        }
    };

    if !verify_process_running(pid) {
        println!("Process with PID {} is not running.", pid);
        let _ = fs::remove_file(&pid_file);
        return Ok(());
    }

    println!("Stopping daemon with PID {}...", pid);
    terminate_process(pid, false);
    thread::sleep(Duration::from_millis(500));

    if verify_process_running(pid) {
        println!("Daemon didn't terminate gracefully, using force kill...");
        terminate_process(pid, true);
        thread::sleep(Duration::from_millis(200));
    }

    let _ = fs::remove_file(&pid_file);
    if verify_process_running(pid) {
        println!("WARNING: Failed to stop daemon process. PID file removed anyway.");
    } else {
        println!("Daemon stopped successfully.");
    }
    Ok(())
}

/// Print daemon status
pub fn daemon_status() -> Result<()> {
    match is_daemon_running()? {
        Some(pid) if verify_process_running(pid) => {
            println!("keyflow daemon is running with PID {}", pid);
            println!("Logs: {}", daemon_log_file().display());
        }
        Some(pid) => {
            println!("PID file exists but process {} is not running", pid);
            println!("Recommend running 'keyflow stop' followed by 'keyflow start'");
        }
        None => println!("keyflow daemon is not running"),
    }
    Ok(())
}

/// Host the engine in this process until the hook is lost or the process is killed.
pub fn run_daemon_worker() -> Result<()> {
    let config = load_config()?;
    let store = JsonProfileStore::open_default()?;
    run_engine(config, store)
}

/// Entry point of the detached worker process: owns the PID file for its lifetime.
pub fn daemon_worker_entry() -> Result<()> {
    let pid_file = get_pid_file_path();
    let mut file = File::create(&pid_file)?;
    write!(file, "{}", process::id())?;
    info!("keyflow daemon started with PID {}", process::id());

    let result = run_daemon_worker();
    if let Err(err) = &result {
        error!("keyflow daemon exiting: {}", err);
    }

    let _ = fs::remove_file(&pid_file);
    result
}
