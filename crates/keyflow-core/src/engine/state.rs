use crate::models::ProfileId;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lifecycle of the engine controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Stopped,
    Starting,
    Running,
    Paused,
    Stopping,
}

impl EnginePhase {
    pub fn is_active(self) -> bool {
        matches!(self, EnginePhase::Running | EnginePhase::Paused)
    }
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnginePhase::Stopped => "stopped",
            EnginePhase::Starting => "starting",
            EnginePhase::Running => "running",
            EnginePhase::Paused => "paused",
            EnginePhase::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Notifications for the tray, the daemon log or any other observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Paused,
    Resumed,
    ProfileSwitched(ProfileId),
    /// Carries the trigger pattern, never the surrounding typed text.
    ExpansionFired(String),
    InjectionFailed(String),
    HookLost(String),
    /// Quick-add chord pressed; payload is the clipboard or selection text.
    QuickAddRequested(Option<String>),
    ProfileSwitchRejected {
        id: ProfileId,
        reason: String,
    },
    InvariantViolated(String),
}

/// Phase shared between the controller and the engine thread.
#[derive(Debug, Clone)]
pub(crate) struct SharedPhase(Arc<Mutex<EnginePhase>>);

impl SharedPhase {
    pub(crate) fn new(phase: EnginePhase) -> Self {
        SharedPhase(Arc::new(Mutex::new(phase)))
    }

    fn lock(&self) -> MutexGuard<'_, EnginePhase> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn get(&self) -> EnginePhase {
        *self.lock()
    }

    pub(crate) fn set(&self, phase: EnginePhase) {
        *self.lock() = phase;
    }

    /// Move between Running and Paused only; a stopping engine stays stopping.
    pub(crate) fn set_paused(&self, paused: bool) {
        let mut phase = self.lock();
        if phase.is_active() {
            *phase = if paused {
                EnginePhase::Paused
            } else {
                EnginePhase::Running
            };
        }
    }
}
