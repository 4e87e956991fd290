use crate::error::{KeyflowError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const PID_FILENAME: &str = "keyflow-daemon.pid";
pub const PROFILES_FILENAME: &str = "profiles.json";
pub const CONFIG_FILENAME: &str = "config.json";
pub const DAEMON_LOG_FILENAME: &str = "daemon_log.txt";

/// Environment variable that overrides the configured hook backend.
pub const HOOK_BACKEND_ENV: &str = "KEYFLOW_HOOK_BACKEND";

/// Get the keyflow configuration directory
pub fn get_config_dir() -> PathBuf {
    env::var("HOME")
        .map(|home| PathBuf::from(home).join(".keyflow"))
        .unwrap_or_else(|_| PathBuf::from(".keyflow"))
}

/// Ensure the configuration directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let config_dir = get_config_dir();
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }
    Ok(config_dir)
}

/// Get the path to the PID file
pub fn get_pid_file_path() -> PathBuf {
    get_config_dir().join(PID_FILENAME)
}

/// Get the path to the profiles database
pub fn get_profiles_file_path() -> PathBuf {
    get_config_dir().join(PROFILES_FILENAME)
}

/// Get the path to the engine configuration file
pub fn get_config_file_path() -> PathBuf {
    get_config_dir().join(CONFIG_FILENAME)
}

/// Check if daemon is running
pub fn is_daemon_running() -> Result<Option<u32>> {
    let pid_file = get_pid_file_path();

    if !pid_file.exists() {
        return Ok(None);
    }

    match fs::read_to_string(&pid_file) {
        Ok(contents) => match contents.trim().parse::<u32>() {
            Ok(pid) => Ok(Some(pid)),
            Err(_) => {
                // Invalid PID, treat as not running and clean up
                let _ = fs::remove_file(&pid_file);
                Ok(None)
            }
        },
        Err(_) => {
            let _ = fs::remove_file(&pid_file);
            Ok(None)
        }
    }
}

/// Which OS hook implementation to use on platforms offering more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Passive global listener.
    #[default]
    Default,
    /// Exclusive grab; can swallow chord keys.
    Alternate,
}

impl BackendKind {
    /// Resolve the backend, letting `KEYFLOW_HOOK_BACKEND` override the configured value.
    pub fn resolve(configured: BackendKind) -> Result<BackendKind> {
        match env::var(HOOK_BACKEND_ENV) {
            Ok(value) if !value.trim().is_empty() => value.parse(),
            _ => Ok(configured),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Default => "default",
            BackendKind::Alternate => "alternate",
        }
    }
}

impl FromStr for BackendKind {
    type Err = KeyflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "default" | "listen" => Ok(BackendKind::Default),
            "alternate" | "grab" => Ok(BackendKind::Alternate),
            other => Err(KeyflowError::InvalidConfig(format!(
                "unknown hook backend '{}'",
                other
            ))),
        }
    }
}

/// How the replacement text is delivered to the focused application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionMode {
    /// Synthesize one key event per character.
    #[default]
    Typed,
    /// Put the text on the clipboard and paste it, restoring the clipboard afterwards.
    Paste,
}

/// Runtime settings for the expansion engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub hotkey_modifier: String,
    pub quick_add_key: String,
    pub profile_switch_key: String,
    pub toggle_key: String,
    pub backend: BackendKind,
    pub injection: InjectionMode,
    pub cooldown_ms: u64,
    pub key_delay_ms: u64,
    pub paste_delay_ms: u64,
    pub echo_settle_ms: u64,
    pub install_timeout_ms: u64,
    pub reset_on_modifiers: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            hotkey_modifier: "ctrl".to_string(),
            quick_add_key: "f10".to_string(),
            profile_switch_key: "f11".to_string(),
            toggle_key: "f12".to_string(),
            backend: BackendKind::Default,
            injection: InjectionMode::Typed,
            cooldown_ms: 300,
            key_delay_ms: 2,
            paste_delay_ms: 50,
            echo_settle_ms: 30,
            install_timeout_ms: 500,
            reset_on_modifiers: false,
        }
    }
}

impl EngineConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn key_delay(&self) -> Duration {
        Duration::from_millis(self.key_delay_ms)
    }

    pub fn paste_delay(&self) -> Duration {
        Duration::from_millis(self.paste_delay_ms)
    }

    pub fn echo_settle(&self) -> Duration {
        Duration::from_millis(self.echo_settle_ms)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_millis(self.install_timeout_ms)
    }

    /// Load the configuration at `path`, falling back to defaults when the file is absent.
    pub fn load_from(path: &Path) -> Result<EngineConfig> {
        if !path.exists() {
            return Ok(EngineConfig::default());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(EngineConfig::default());
        }

        serde_json::from_str(&content).map_err(|e| e.into())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }
}

/// Load the engine configuration from the keyflow config directory
pub fn load_config() -> Result<EngineConfig> {
    EngineConfig::load_from(&get_config_file_path())
}
