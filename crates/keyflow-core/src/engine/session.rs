use super::state::{SharedPhase, StatusEvent};
use super::{Command, Envelope};
use crate::clipboard::SelectionSource;
use crate::expansion::Injector;
use crate::hotkey::{Dispatch, HotkeyAction, HotkeyDispatcher};
use crate::index::TriggerIndex;
use crate::keyboard::{Key, KeyEvent, KeyKind};
use crate::matcher::{Completion, MatchStateMachine, Step};
use log::{debug, info, warn};
use std::ops::ControlFlow;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

/// Tunables the session reads from the engine configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionOptions {
    pub cooldown: Duration,
    pub reset_on_modifiers: bool,
}

/// State owned by the engine thread: the active index, the candidate and the
/// chord tracker. Nothing here is shared.
pub(crate) struct Session {
    index: Arc<TriggerIndex>,
    ring: Vec<Arc<TriggerIndex>>,
    matcher: MatchStateMachine,
    hotkeys: HotkeyDispatcher,
    injector: Box<dyn Injector>,
    selection: Arc<dyn SelectionSource>,
    status: Sender<StatusEvent>,
    phase: SharedPhase,
    options: SessionOptions,
    paused: bool,
    last_fire: Option<SystemTime>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        index: Arc<TriggerIndex>,
        ring: Vec<Arc<TriggerIndex>>,
        hotkeys: HotkeyDispatcher,
        injector: Box<dyn Injector>,
        selection: Arc<dyn SelectionSource>,
        status: Sender<StatusEvent>,
        phase: SharedPhase,
        options: SessionOptions,
    ) -> Self {
        Session {
            index,
            ring,
            matcher: MatchStateMachine::new(),
            hotkeys,
            injector,
            selection,
            status,
            phase,
            options,
            paused: false,
            last_fire: None,
        }
    }

    /// Consume envelopes until shutdown.
    pub(crate) fn run(mut self, rx: Receiver<Envelope>) {
        info!("Engine thread started with profile '{}'", self.index.profile());
        while let Ok(envelope) = rx.recv() {
            if self.handle(envelope).is_break() {
                break;
            }
        }

        let dropped = rx.try_iter().count();
        if dropped > 0 {
            debug!("Discarded {} queued events on shutdown", dropped);
        }
        info!("Engine thread stopped");
    }

    pub(crate) fn handle(&mut self, envelope: Envelope) -> ControlFlow<()> {
        match envelope {
            Envelope::Key(event) => self.on_key(event),
            Envelope::Command(command) => self.apply(command),
            Envelope::HookLost(reason) => {
                warn!("Keyboard hook lost: {}", reason);
                self.matcher.reset();
                self.emit(StatusEvent::HookLost(reason));
            }
            Envelope::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn on_key(&mut self, event: KeyEvent) {
        match self.hotkeys.dispatch(&event) {
            Dispatch::Fire(action) => return self.on_hotkey(action),
            Dispatch::Swallow => return,
            Dispatch::Pass => {}
        }

        if event.kind == KeyKind::Up {
            return;
        }
        if self.paused || !self.index.is_enabled() {
            return;
        }

        if event.key.is_modifier() {
            if self.options.reset_on_modifiers {
                self.matcher.reset();
            } else {
                self.matcher.note_keystroke();
            }
            return;
        }

        // Shortcuts like ctrl+v or alt+tab move the caret or edit text
        // behind our back.
        if self.hotkeys.modifiers().command_held() {
            self.matcher.reset();
            return;
        }

        let step = match (event.character, event.key) {
            (Some(c), _) => self.matcher.feed(&self.index, c),
            (None, Key::Backspace) => self.matcher.retract(&self.index),
            (None, _) => {
                self.matcher.reset();
                return;
            }
        };

        match step {
            Step::Completed(completion) => self.expand(completion, event.timestamp),
            Step::Violation(reason) => {
                warn!("Trigger index invariant violated: {}", reason);
                self.emit(StatusEvent::InvariantViolated(reason));
            }
            Step::Advanced | Step::Reset => {}
        }
    }

    fn expand(&mut self, completion: Completion, at: SystemTime) {
        if let Some(last) = self.last_fire {
            let within = at
                .duration_since(last)
                .map_or(true, |gap| gap < self.options.cooldown);
            if !self.options.cooldown.is_zero() && within {
                debug!("Skipping '{}' inside the cooldown window", completion.pattern);
                return;
            }
        }
        self.last_fire = Some(at);

        debug!(
            "Expanding '{}' ({} keystrokes, deleting {})",
            completion.pattern, completion.keystrokes, completion.delete_count
        );
        match self
            .injector
            .inject(completion.delete_count, &completion.output)
        {
            Ok(()) => self.emit(StatusEvent::ExpansionFired(completion.pattern)),
            Err(err) => {
                warn!("Expansion of '{}' failed: {}", completion.pattern, err);
                self.emit(StatusEvent::InjectionFailed(err.to_string()));
            }
        }
    }

    fn on_hotkey(&mut self, action: HotkeyAction) {
        debug!("Hotkey {:?}", action);
        match action {
            HotkeyAction::ToggleEnabled => {
                if self.paused {
                    self.resume();
                } else {
                    self.pause();
                }
            }
            HotkeyAction::QuickAdd => {
                self.matcher.reset();
                self.request_quick_add();
            }
            HotkeyAction::SwitchProfile => self.cycle_profile(),
        }
    }

    /// Clipboard access can block, so it runs off the engine thread.
    fn request_quick_add(&self) {
        let selection = Arc::clone(&self.selection);
        let status = self.status.clone();
        let spawned = thread::Builder::new()
            .name("keyflow-quick-add".to_string())
            .spawn(move || {
                let text = selection.read_current_selection_or_clipboard();
                let _ = status.send(StatusEvent::QuickAddRequested(text));
            });
        if let Err(err) = spawned {
            warn!("Failed to capture quick-add text: {}", err);
            self.emit(StatusEvent::QuickAddRequested(None));
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::SwitchProfile(index) => {
                match self
                    .ring
                    .iter_mut()
                    .find(|entry| entry.profile() == index.profile())
                {
                    Some(entry) => *entry = Arc::clone(&index),
                    None => self.ring.push(Arc::clone(&index)),
                }
                self.switch_to(index);
            }
            Command::SetProfiles { ring, active } => {
                self.ring = ring;
                self.switch_to(active);
            }
        }
    }

    fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        self.matcher.reset();
        self.phase.set_paused(true);
        info!("Expansion paused");
        self.emit(StatusEvent::Paused);
    }

    fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        self.matcher.reset();
        self.phase.set_paused(false);
        info!("Expansion resumed");
        self.emit(StatusEvent::Resumed);
    }

    /// Replace the index and candidate together.
    fn switch_to(&mut self, index: Arc<TriggerIndex>) {
        self.index = index;
        self.matcher.reset();
        info!(
            "Active profile is now '{}' ({} triggers)",
            self.index.profile(),
            self.index.len()
        );
        self.emit(StatusEvent::ProfileSwitched(self.index.profile().clone()));
    }

    fn cycle_profile(&mut self) {
        let current = self
            .ring
            .iter()
            .position(|entry| entry.profile() == self.index.profile());
        let start = current.map_or(0, |pos| pos + 1);
        let len = self.ring.len();

        let next = (0..len)
            .map(|offset| &self.ring[(start + offset) % len])
            .find(|entry| entry.is_enabled() && entry.profile() != self.index.profile())
            .cloned();

        match next {
            Some(index) => self.switch_to(index),
            None => debug!("No other enabled profile to switch to"),
        }
    }

    fn emit(&self, event: StatusEvent) {
        // Nobody listening is fine.
        let _ = self.status.send(event);
    }

    #[cfg(test)]
    fn candidate(&self) -> String {
        self.matcher.candidate(&self.index)
    }
}
