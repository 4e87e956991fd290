use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyflowError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The OS keyboard hook could not be installed or was never acknowledged.
    #[error("Keyboard hook unavailable: {0}")]
    HookUnavailable(String),

    /// A profile contains a pattern that is a prefix of another pattern.
    #[error("Ambiguous triggers in profile '{profile}': '{prefix}' is a prefix of '{pattern}'")]
    AmbiguousTriggers {
        profile: String,
        prefix: String,
        pattern: String,
    },

    #[error("Injection failed: {0}")]
    InjectionFailed(String),

    #[error("Trigger pattern must not be empty")]
    EmptyPattern,

    #[error("Trigger '{0}' contains characters that cannot be typed")]
    UnprintablePattern(String),

    #[error("Trigger '{0}' already exists")]
    DuplicatePattern(String),

    #[error("Profile '{0}' not found")]
    ProfileNotFound(String),

    #[error("Trigger '{0}' not found")]
    TriggerNotFound(String),

    #[error("Cannot {operation} while engine is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Invalid hotkey: {0}")]
    InvalidHotkey(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Daemon already running with PID {0}")]
    DaemonAlreadyRunning(u32),

    #[error("Daemon is not running")]
    DaemonNotRunning,

    #[error("Invalid PID in daemon file")]
    InvalidPid,

    #[error("Error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, KeyflowError>;
