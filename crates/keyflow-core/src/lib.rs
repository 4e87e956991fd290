pub mod backend;
pub mod clipboard;
pub mod config;
pub mod engine;
pub mod error;
pub mod expansion;
pub mod hotkey;
pub mod index;
pub mod keyboard;
pub mod matcher;
pub mod models;
pub mod storage;

// Re-export common items for convenience
pub use backend::{select_platform, KeySink, Platform};
pub use clipboard::{SelectionSource, SystemClipboard};
pub use config::{get_config_dir, is_daemon_running, load_config, BackendKind, EngineConfig, InjectionMode};
pub use engine::{EngineController, EnginePhase, StatusEvent};
pub use error::{KeyflowError, Result};
pub use expansion::Injector;
pub use index::{validate_profile, TriggerIndex};
pub use keyboard::{Key, KeyEvent, KeyKind};
pub use models::{Profile, ProfileId, Trigger, DEFAULT_PROFILE_NAME};
pub use storage::{JsonProfileStore, ProfileDocument, ProfileStore};
