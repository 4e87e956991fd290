//! The expansion runtime: one engine thread consuming hook events and
//! controller commands from a single queue.

mod controller;
mod session;
mod state;

pub use controller::EngineController;
pub use state::{EnginePhase, StatusEvent};

use crate::index::TriggerIndex;
use crate::keyboard::KeyEvent;
use std::sync::Arc;

/// Requests applied by the engine thread between key events.
#[derive(Debug)]
pub(crate) enum Command {
    Pause,
    Resume,
    SwitchProfile(Arc<TriggerIndex>),
    SetProfiles {
        ring: Vec<Arc<TriggerIndex>>,
        active: Arc<TriggerIndex>,
    },
}

/// Everything the engine thread receives, in arrival order.
#[derive(Debug)]
pub(crate) enum Envelope {
    Key(KeyEvent),
    Command(Command),
    HookLost(String),
    Shutdown,
}
