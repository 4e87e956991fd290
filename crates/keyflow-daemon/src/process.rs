use std::process::Command;

/// Check whether a process with the given PID exists
#[cfg(unix)]
pub fn verify_process_running(pid: u32) -> bool {
    // kill -0 probes without delivering a signal
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(windows)]
pub fn verify_process_running(pid: u32) -> bool {
    Command::new("tasklist")
        .args(["/FI", &format!("PID eq {}", pid), "/NH"])
        .output()
        .map(|output| String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

#[cfg(not(any(unix, windows)))]
pub fn verify_process_running(_pid: u32) -> bool {
    false
}

/// Ask the process to terminate, escalating to a forced kill.
#[cfg(unix)]
pub fn terminate_process(pid: u32, force: bool) -> bool {
    let mut cmd = Command::new("kill");
    if force {
        cmd.arg("-9");
    }
    cmd.arg(pid.to_string())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(windows)]
pub fn terminate_process(pid: u32, force: bool) -> bool {
    let mut cmd = Command::new("taskkill");
    if force {
        // /T takes child processes down too
        cmd.args(["/F", "/T"]);
    }
    cmd.args(["/PID", &pid.to_string()])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(not(any(unix, windows)))]
pub fn terminate_process(_pid: u32, _force: bool) -> bool {
    false
}
