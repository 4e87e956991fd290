#![allow(dead_code)]

use keyflow_core::backend::{EchoGuard, GuardedInjector};
use keyflow_core::expansion::Injector;
use keyflow_core::keyboard::{Key, KeyEvent, Modifier, Side};
use keyflow_core::{
    EngineConfig, EngineController, KeyflowError, KeySink, Platform, Result, SelectionSource,
    StatusEvent,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

/// Handle tests use to play keystrokes into an installed fake hook.
#[derive(Clone, Default)]
pub struct Keyboard {
    sink: Arc<Mutex<Option<KeySink>>>,
    guard: Arc<EchoGuard>,
}

impl Keyboard {
    pub fn is_installed(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    /// Deliver an event. Returns false when no hook is installed. Key
    /// presses made while an injection is running are dropped like a real
    /// hook drops them.
    pub fn send(&self, event: KeyEvent) -> bool {
        if !self.guard.admits(&event) {
            return true;
        }
        match self.sink.lock().unwrap().as_ref() {
            Some(sink) => sink.send(event),
            None => false,
        }
    }

    pub fn type_text(&self, text: &str) {
        for c in text.chars() {
            self.send(KeyEvent::typed(c));
            self.send(KeyEvent::up(Key::for_char(c)));
        }
    }

    pub fn press(&self, key: Key) {
        self.send(KeyEvent::down(key, None));
        self.send(KeyEvent::up(key));
    }

    pub fn chord(&self, key: Key) {
        let ctrl = Key::Modifier(Modifier::Control, Side::Left);
        self.send(KeyEvent::down(ctrl, None));
        self.press(key);
        self.send(KeyEvent::up(ctrl));
    }

    pub fn lose_hook(&self, reason: &str) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            sink.hook_lost(reason);
        }
    }
}

/// Shared record of what the engine asked to inject.
#[derive(Clone, Default)]
pub struct Injections {
    log: Arc<Mutex<Vec<(usize, String)>>>,
    fail: Arc<AtomicBool>,
    echo: Arc<AtomicBool>,
}

impl Injections {
    pub fn all(&self) -> Vec<(usize, String)> {
        self.log.lock().unwrap().clone()
    }

    /// Make every following injection fail like a read-only field would.
    pub fn fail_from_now(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Feed every injected text back through the hook, as an OS hook sees
    /// synthetic input.
    pub fn echo_from_now(&self) {
        self.echo.store(true, Ordering::SeqCst);
    }
}

struct RecordingInjector {
    injections: Injections,
    keyboard: Keyboard,
}

impl Injector for RecordingInjector {
    fn inject(&mut self, delete_count: usize, text: &str) -> Result<()> {
        if self.injections.fail.load(Ordering::SeqCst) {
            return Err(KeyflowError::InjectionFailed("target is read-only".to_string()));
        }
        self.injections
            .log
            .lock()
            .unwrap()
            .push((delete_count, text.to_string()));
        if self.injections.echo.load(Ordering::SeqCst) {
            for _ in 0..delete_count {
                self.keyboard.press(Key::Backspace);
            }
            self.keyboard.type_text(text);
        }
        Ok(())
    }
}

/// Scripted backend: no OS hook, events come from a [`Keyboard`].
pub struct FakePlatform {
    keyboard: Keyboard,
    injections: Injections,
    install_error: Option<String>,
}

impl Platform for FakePlatform {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn install(&mut self, sink: KeySink, _timeout: Duration) -> Result<()> {
        if let Some(reason) = &self.install_error {
            return Err(KeyflowError::HookUnavailable(reason.clone()));
        }
        *self.keyboard.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn uninstall(&mut self) {
        self.keyboard.sink.lock().unwrap().take();
    }

    fn injector(&self) -> Box<dyn Injector> {
        let recording = RecordingInjector {
            injections: self.injections.clone(),
            keyboard: self.keyboard.clone(),
        };
        Box::new(GuardedInjector::new(
            Box::new(recording),
            Arc::clone(&self.keyboard.guard),
            Duration::ZERO,
        ))
    }
}

pub struct NoSelection;

impl SelectionSource for NoSelection {
    fn read_current_selection_or_clipboard(&self) -> Option<String> {
        None
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        cooldown_ms: 0,
        ..EngineConfig::default()
    }
}

pub struct Rig {
    pub controller: EngineController,
    pub keyboard: Keyboard,
    pub injections: Injections,
    pub status: Receiver<StatusEvent>,
}

pub fn rig() -> Rig {
    rig_with(None)
}

pub fn rig_with(install_error: Option<&str>) -> Rig {
    let keyboard = Keyboard::default();
    let injections = Injections::default();
    let platform = FakePlatform {
        keyboard: keyboard.clone(),
        injections: injections.clone(),
        install_error: install_error.map(str::to_string),
    };
    let mut controller =
        EngineController::with_platform(test_config(), Box::new(platform), Arc::new(NoSelection));
    let status = controller.take_status_receiver().unwrap();
    Rig {
        controller,
        keyboard,
        injections,
        status,
    }
}

impl Rig {
    /// Wait until every event queued so far has been processed, returning the
    /// status events produced on the way. Pause/resume acts as the barrier.
    pub fn settle(&mut self) -> Vec<StatusEvent> {
        self.controller.pause().unwrap();
        self.controller.resume().unwrap();
        let mut seen = Vec::new();
        loop {
            let event = self.status.recv_timeout(WAIT).unwrap();
            if event == StatusEvent::Resumed {
                break;
            }
            if event != StatusEvent::Paused {
                seen.push(event);
            }
        }
        seen
    }
}
