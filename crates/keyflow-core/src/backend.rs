//! OS keyboard hook backends.
//!
//! A [`Platform`] installs a global hook that pushes normalized key events into
//! a [`KeySink`], and hands out the [`Injector`] used to deliver expansions.
//! The engine depends only on this trait.

use crate::config::{BackendKind, EngineConfig};
use crate::engine::Envelope;
use crate::error::{KeyflowError, Result};
use crate::expansion::{EnigoInjector, Injector};
#[cfg(feature = "grab")]
use crate::hotkey::ChordSet;
use crate::hotkey::{Dispatch, HotkeyDispatcher};
use crate::keyboard::{Key, KeyEvent, Normalizer};
use log::{debug, info};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

/// Receiving end of a hook: forwards events to the engine thread.
#[derive(Debug, Clone)]
pub struct KeySink {
    tx: Sender<Envelope>,
}

impl KeySink {
    pub(crate) fn new(tx: Sender<Envelope>) -> Self {
        KeySink { tx }
    }

    /// Forward an event. Returns false once the engine has gone away.
    pub fn send(&self, event: KeyEvent) -> bool {
        self.tx.send(Envelope::Key(event)).is_ok()
    }

    /// Report that the hook died after it had been installed.
    pub fn hook_lost(&self, reason: impl Into<String>) {
        let _ = self.tx.send(Envelope::HookLost(reason.into()));
    }
}

/// Capability interface implemented once per hooking mechanism.
pub trait Platform: Send {
    fn name(&self) -> &'static str;

    /// Install the hook and start delivering events into `sink`.
    ///
    /// Fails with [`KeyflowError::HookUnavailable`] if the hook cannot be
    /// installed within `timeout`.
    fn install(&mut self, sink: KeySink, timeout: Duration) -> Result<()>;

    /// Detach the sink. No event reaches it after this returns.
    fn uninstall(&mut self);

    fn injector(&self) -> Box<dyn Injector>;
}

/// Pick the hook implementation for `config`, honouring `KEYFLOW_HOOK_BACKEND`.
pub fn select_platform(config: &EngineConfig) -> Result<Box<dyn Platform>> {
    match BackendKind::resolve(config.backend)? {
        BackendKind::Default => Ok(Box::new(ListenPlatform::new(config))),
        BackendKind::Alternate => alternate_platform(config),
    }
}

#[cfg(feature = "grab")]
fn alternate_platform(config: &EngineConfig) -> Result<Box<dyn Platform>> {
    Ok(Box::new(GrabPlatform::new(config)?))
}

#[cfg(not(feature = "grab"))]
fn alternate_platform(_config: &EngineConfig) -> Result<Box<dyn Platform>> {
    Err(KeyflowError::HookUnavailable(
        "the alternate (grab) backend was not compiled in; rebuild with the `grab` feature"
            .to_string(),
    ))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mutes the hook while our own synthetic input is in flight.
#[derive(Debug, Default)]
pub struct EchoGuard {
    state: Mutex<EchoState>,
}

#[derive(Debug, Default)]
struct EchoState {
    injecting: bool,
    until: Option<Instant>,
}

impl EchoGuard {
    pub fn begin(&self) {
        lock(&self.state).injecting = true;
    }

    /// End the injection; events keep being dropped for `settle` afterwards.
    pub fn end(&self, settle: Duration) {
        let mut state = lock(&self.state);
        state.injecting = false;
        state.until = Some(Instant::now() + settle);
    }

    pub fn is_muted(&self) -> bool {
        let state = lock(&self.state);
        state.injecting || state.until.is_some_and(|until| Instant::now() < until)
    }

    /// Whether `event` may reach the engine. While muted only key presses
    /// are dropped; modifiers, releases and clicks always pass so the
    /// engine's view of held keys matches the keyboard.
    pub fn admits(&self, event: &KeyEvent) -> bool {
        !event.is_down()
            || event.key.is_modifier()
            || event.key == Key::Pointer
            || !self.is_muted()
    }
}

/// Wraps an injector so the hook ignores the events it produces.
pub struct GuardedInjector {
    inner: Box<dyn Injector>,
    guard: Arc<EchoGuard>,
    settle: Duration,
}

impl GuardedInjector {
    pub fn new(inner: Box<dyn Injector>, guard: Arc<EchoGuard>, settle: Duration) -> Self {
        GuardedInjector {
            inner,
            guard,
            settle,
        }
    }
}

impl Injector for GuardedInjector {
    fn inject(&mut self, delete_count: usize, text: &str) -> Result<()> {
        self.guard.begin();
        let result = self.inner.inject(delete_count, text);
        self.guard.end(self.settle);
        result
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HookThread {
    NotStarted,
    Running,
    Failed(String),
}

/// State shared between a process-wide hook thread and the platform handles.
///
/// `rdev` hooks cannot be torn down once started, so each hook thread lives
/// for the rest of the process and installs only swap the attached sink.
struct HookShared {
    thread: Mutex<HookThread>,
    sink: Mutex<Option<KeySink>>,
    normalizer: Mutex<Normalizer>,
    chords: Mutex<Option<HotkeyDispatcher>>,
    guard: Arc<EchoGuard>,
}

impl HookShared {
    fn new() -> Self {
        HookShared {
            thread: Mutex::new(HookThread::NotStarted),
            sink: Mutex::new(None),
            normalizer: Mutex::new(Normalizer::new()),
            chords: Mutex::new(None),
            guard: Arc::new(EchoGuard::default()),
        }
    }

    /// Normalize and forward one raw event. Returns true if the event should
    /// be swallowed (only honoured by grabbing hooks).
    fn forward(&self, event: &rdev::Event) -> bool {
        let Some(key_event) = lock(&self.normalizer).normalize(event) else {
            return false;
        };
        if !self.guard.admits(&key_event) {
            return false;
        }

        let swallow = match lock(&self.chords).as_mut() {
            Some(dispatcher) => dispatcher.dispatch(&key_event) != Dispatch::Pass,
            None => false,
        };

        let mut sink = lock(&self.sink);
        if let Some(active) = sink.as_ref() {
            if !active.send(key_event) {
                debug!("Engine receiver dropped; detaching hook sink");
                *sink = None;
            }
        }
        swallow
    }

    fn attach(
        self: &Arc<Self>,
        sink: KeySink,
        timeout: Duration,
        run: fn(Arc<HookShared>) -> std::result::Result<(), String>,
    ) -> Result<()> {
        let mut thread_state = lock(&self.thread);
        match &*thread_state {
            HookThread::Failed(reason) => {
                return Err(KeyflowError::HookUnavailable(reason.clone()));
            }
            HookThread::Running => {
                *lock(&self.sink) = Some(sink);
                return Ok(());
            }
            HookThread::NotStarted => {}
        }

        *lock(&self.sink) = Some(sink);

        let (ready_tx, ready_rx) = mpsc::channel::<String>();
        let hook = Arc::clone(self);
        thread::Builder::new()
            .name("keyflow-hook".to_string())
            .spawn(move || {
                let reason = match run(Arc::clone(&hook)) {
                    Ok(()) => "keyboard hook returned unexpectedly".to_string(),
                    Err(reason) => reason,
                };
                // Wake a pending install before touching shared state.
                let _ = ready_tx.send(reason.clone());
                if let Some(sink) = lock(&hook.sink).take() {
                    sink.hook_lost(reason.clone());
                }
                *lock(&hook.thread) = HookThread::Failed(reason);
            })?;

        // The hook gives no positive acknowledgement: an install that has not
        // failed within the window is considered live.
        match ready_rx.recv_timeout(timeout) {
            Ok(reason) => {
                lock(&self.sink).take();
                *thread_state = HookThread::Failed(reason.clone());
                Err(KeyflowError::HookUnavailable(reason))
            }
            Err(RecvTimeoutError::Timeout) => {
                *thread_state = HookThread::Running;
                Ok(())
            }
            Err(RecvTimeoutError::Disconnected) => {
                lock(&self.sink).take();
                Err(KeyflowError::HookUnavailable(
                    "keyboard hook thread exited".to_string(),
                ))
            }
        }
    }

    fn detach(&self) {
        lock(&self.sink).take();
    }
}

fn run_listen(hook: Arc<HookShared>) -> std::result::Result<(), String> {
    rdev::listen(move |event| {
        hook.forward(&event);
    })
    .map_err(|err| format!("failed to listen for keyboard events: {:?}", err))
}

/// Passive global listener (`rdev::listen`). Observes keys without consuming them.
pub struct ListenPlatform {
    hook: Arc<HookShared>,
    config: EngineConfig,
}

impl ListenPlatform {
    pub fn new(config: &EngineConfig) -> Self {
        static LISTEN_HOOK: OnceLock<Arc<HookShared>> = OnceLock::new();
        ListenPlatform {
            hook: Arc::clone(LISTEN_HOOK.get_or_init(|| Arc::new(HookShared::new()))),
            config: config.clone(),
        }
    }
}

impl Platform for ListenPlatform {
    fn name(&self) -> &'static str {
        "listen"
    }

    fn install(&mut self, sink: KeySink, timeout: Duration) -> Result<()> {
        self.hook.attach(sink, timeout, run_listen)?;
        info!("Global keyboard listener attached");
        Ok(())
    }

    fn uninstall(&mut self) {
        self.hook.detach();
        info!("Global keyboard listener detached");
    }

    fn injector(&self) -> Box<dyn Injector> {
        Box::new(GuardedInjector::new(
            Box::new(EnigoInjector::new(&self.config)),
            Arc::clone(&self.hook.guard),
            self.config.echo_settle(),
        ))
    }
}

#[cfg(feature = "grab")]
fn run_grab(hook: Arc<HookShared>) -> std::result::Result<(), String> {
    rdev::grab(move |event| {
        if hook.forward(&event) {
            None
        } else {
            Some(event)
        }
    })
    .map_err(|err| format!("failed to grab the keyboard: {:?}", err))
}

/// Exclusive grab (`rdev::grab`). Chord keys are swallowed before they reach
/// the focused application.
#[cfg(feature = "grab")]
pub struct GrabPlatform {
    hook: Arc<HookShared>,
    config: EngineConfig,
    chords: ChordSet,
}

#[cfg(feature = "grab")]
impl GrabPlatform {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        static GRAB_HOOK: OnceLock<Arc<HookShared>> = OnceLock::new();
        Ok(GrabPlatform {
            hook: Arc::clone(GRAB_HOOK.get_or_init(|| Arc::new(HookShared::new()))),
            config: config.clone(),
            chords: ChordSet::from_config(config)?,
        })
    }
}

#[cfg(feature = "grab")]
impl Platform for GrabPlatform {
    fn name(&self) -> &'static str {
        "grab"
    }

    fn install(&mut self, sink: KeySink, timeout: Duration) -> Result<()> {
        *lock(&self.hook.chords) = Some(HotkeyDispatcher::new(self.chords.clone()));
        if let Err(err) = self.hook.attach(sink, timeout, run_grab) {
            lock(&self.hook.chords).take();
            return Err(err);
        }
        info!("Exclusive keyboard grab attached");
        Ok(())
    }

    fn uninstall(&mut self) {
        self.hook.detach();
        // Stop swallowing chords once nobody acts on them.
        lock(&self.hook.chords).take();
        info!("Exclusive keyboard grab detached");
    }

    fn injector(&self) -> Box<dyn Injector> {
        Box::new(GuardedInjector::new(
            Box::new(EnigoInjector::new(&self.config)),
            Arc::clone(&self.hook.guard),
            self.config.echo_settle(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recording(Arc<Mutex<Vec<bool>>>, Arc<EchoGuard>);

    impl Injector for Recording {
        fn inject(&mut self, _delete_count: usize, _text: &str) -> Result<()> {
            lock(&self.0).push(self.1.is_muted());
            Ok(())
        }
    }

    #[test]
    fn guard_mutes_during_and_shortly_after_injection() {
        let guard = Arc::new(EchoGuard::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut injector = GuardedInjector::new(
            Box::new(Recording(Arc::clone(&seen), Arc::clone(&guard))),
            Arc::clone(&guard),
            Duration::from_secs(60),
        );

        assert!(!guard.is_muted());
        injector.inject(3, "abc").unwrap();
        assert_eq!(*lock(&seen), vec![true]);
        assert!(guard.is_muted());

        guard.end(Duration::ZERO);
        assert!(!guard.is_muted());
    }

    #[test]
    fn modifier_release_reaches_engine_while_muted() {
        use crate::hotkey::ChordSet;

        fn event(event_type: rdev::EventType, name: Option<&str>) -> rdev::Event {
            rdev::Event {
                time: std::time::SystemTime::now(),
                name: name.map(str::to_string),
                event_type,
            }
        }

        let hook = HookShared::new();
        let (tx, rx) = mpsc::channel();
        *lock(&hook.sink) = Some(KeySink::new(tx));

        hook.forward(&event(rdev::EventType::KeyPress(rdev::Key::ControlLeft), None));
        hook.guard.begin();
        hook.forward(&event(rdev::EventType::KeyRelease(rdev::Key::ControlLeft), None));
        hook.forward(&event(rdev::EventType::KeyPress(rdev::Key::KeyX), Some("x")));
        hook.guard.end(Duration::ZERO);
        hook.forward(&event(rdev::EventType::KeyPress(rdev::Key::KeyA), Some("a")));

        let mut dispatcher = HotkeyDispatcher::new(ChordSet::new());
        let mut typed = Vec::new();
        for envelope in rx.try_iter() {
            if let Envelope::Key(key_event) = envelope {
                dispatcher.dispatch(&key_event);
                typed.extend(key_event.character);
            }
        }
        assert!(!dispatcher.modifiers().command_held());
        assert_eq!(typed, vec!['a']);
    }

    #[test]
    fn hook_failure_is_reported_as_unavailable() {
        fn failing(_: Arc<HookShared>) -> std::result::Result<(), String> {
            Err("accessibility not granted".to_string())
        }

        let hook = Arc::new(HookShared::new());
        let (tx, _rx) = mpsc::channel();
        let err = hook
            .attach(KeySink::new(tx.clone()), Duration::from_secs(5), failing)
            .unwrap_err();
        assert!(matches!(err, KeyflowError::HookUnavailable(ref r) if r.contains("accessibility")));

        // A failed hook stays failed.
        let err = hook
            .attach(KeySink::new(tx), Duration::from_secs(5), failing)
            .unwrap_err();
        assert!(matches!(err, KeyflowError::HookUnavailable(_)));
    }

    #[test]
    fn live_hook_forwards_until_detached() {
        fn blocking(_: Arc<HookShared>) -> std::result::Result<(), String> {
            thread::sleep(Duration::from_secs(3600));
            Ok(())
        }

        let hook = Arc::new(HookShared::new());
        let (tx, rx) = mpsc::channel();
        hook.attach(KeySink::new(tx), Duration::from_millis(20), blocking)
            .unwrap();

        let press = rdev::Event {
            time: std::time::SystemTime::now(),
            name: Some("a".to_string()),
            event_type: rdev::EventType::KeyPress(rdev::Key::KeyA),
        };
        assert!(!hook.forward(&press));
        assert!(matches!(rx.try_recv(), Ok(Envelope::Key(ev)) if ev.character == Some('a')));

        hook.detach();
        hook.forward(&press);
        assert!(rx.try_recv().is_err());
    }
}
