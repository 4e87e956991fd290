use super::session::{Session, SessionOptions};
use super::state::{EnginePhase, SharedPhase, StatusEvent};
use super::{Command, Envelope};
use crate::backend::{self, KeySink, Platform};
use crate::clipboard::{SelectionSource, SystemClipboard};
use crate::config::EngineConfig;
use crate::error::{KeyflowError, Result};
use crate::hotkey::{ChordSet, HotkeyDispatcher};
use crate::index::TriggerIndex;
use crate::models::{Profile, ProfileId};
use log::{info, warn};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Owns the engine thread and the installed hook.
///
/// Every public operation is serialized through `&mut self`; operations that
/// change what the engine thread sees are queued and applied between key
/// events.
pub struct EngineController {
    config: EngineConfig,
    phase: SharedPhase,
    platform: Option<Box<dyn Platform>>,
    selection: Arc<dyn SelectionSource>,
    status_tx: Sender<StatusEvent>,
    status_rx: Option<Receiver<StatusEvent>>,
    commands: Option<Sender<Envelope>>,
    worker: Option<JoinHandle<()>>,
}

/// Indexes built for a profile set, plus the profiles that were rejected.
struct Ring {
    entries: Vec<Arc<TriggerIndex>>,
    active: Arc<TriggerIndex>,
    rejected: Vec<(ProfileId, KeyflowError)>,
}

impl Ring {
    fn build(profiles: &[Profile], active: &ProfileId) -> Result<Ring> {
        let active_profile = profiles
            .iter()
            .find(|p| &p.id == active)
            .ok_or_else(|| KeyflowError::ProfileNotFound(active.to_string()))?;
        let active_index = Arc::new(TriggerIndex::build(active_profile)?);

        let mut entries = Vec::with_capacity(profiles.len());
        let mut rejected = Vec::new();
        for profile in profiles {
            if &profile.id == active {
                entries.push(Arc::clone(&active_index));
                continue;
            }
            match TriggerIndex::build(profile) {
                Ok(index) => entries.push(Arc::new(index)),
                Err(err) => rejected.push((profile.id.clone(), err)),
            }
        }

        Ok(Ring {
            entries,
            active: active_index,
            rejected,
        })
    }
}

impl EngineController {
    /// A controller using the system hook selected by `config` and the system clipboard.
    pub fn new(config: EngineConfig) -> Self {
        Self::build(config, None, Arc::new(SystemClipboard))
    }

    /// A controller over an explicit backend.
    pub fn with_platform(
        config: EngineConfig,
        platform: Box<dyn Platform>,
        selection: Arc<dyn SelectionSource>,
    ) -> Self {
        Self::build(config, Some(platform), selection)
    }

    fn build(
        config: EngineConfig,
        platform: Option<Box<dyn Platform>>,
        selection: Arc<dyn SelectionSource>,
    ) -> Self {
        let (status_tx, status_rx) = mpsc::channel();
        EngineController {
            config,
            phase: SharedPhase::new(EnginePhase::Stopped),
            platform,
            selection,
            status_tx,
            status_rx: Some(status_rx),
            commands: None,
            worker: None,
        }
    }

    /// Take the status stream. Only the first call returns it.
    pub fn take_status_receiver(&mut self) -> Option<Receiver<StatusEvent>> {
        self.status_rx.take()
    }

    pub fn state(&self) -> EnginePhase {
        self.phase.get()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Install the hook and start expanding with `initial` as the only profile.
    pub fn start(&mut self, initial: Profile) -> Result<()> {
        let active = initial.id.clone();
        self.start_with_profiles(std::slice::from_ref(&initial), &active)
    }

    /// Start with a full profile ring; `active` must be one of `profiles`.
    pub fn start_with_profiles(&mut self, profiles: &[Profile], active: &ProfileId) -> Result<()> {
        self.expect_phase("start", |phase| phase == EnginePhase::Stopped)?;
        let ring = Ring::build(profiles, active)?;

        self.phase.set(EnginePhase::Starting);
        match self.launch(ring) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.phase.set(EnginePhase::Stopped);
                warn!("Engine failed to start: {}", err);
                Err(err)
            }
        }
    }

    fn launch(&mut self, ring: Ring) -> Result<()> {
        let chords = ChordSet::from_config(&self.config)?;
        let mut platform = match self.platform.take() {
            Some(platform) => platform,
            None => backend::select_platform(&self.config)?,
        };

        let (tx, rx) = mpsc::channel();
        if let Err(err) = platform.install(KeySink::new(tx.clone()), self.config.install_timeout()) {
            self.platform = Some(platform);
            return Err(err);
        }

        let profile = ring.active.profile().clone();
        let session = Session::new(
            ring.active,
            ring.entries,
            HotkeyDispatcher::new(chords),
            platform.injector(),
            Arc::clone(&self.selection),
            self.status_tx.clone(),
            self.phase.clone(),
            SessionOptions {
                cooldown: self.config.cooldown(),
                reset_on_modifiers: self.config.reset_on_modifiers,
            },
        );

        self.phase.set(EnginePhase::Running);
        let spawned = thread::Builder::new()
            .name("keyflow-engine".to_string())
            .spawn(move || session.run(rx));
        let worker = match spawned {
            Ok(worker) => worker,
            Err(err) => {
                platform.uninstall();
                self.platform = Some(platform);
                return Err(err.into());
            }
        };

        info!(
            "Engine running on the {} backend with profile '{}'",
            platform.name(),
            profile
        );
        self.platform = Some(platform);
        self.commands = Some(tx);
        self.worker = Some(worker);
        self.report_rejected(ring.rejected);
        Ok(())
    }

    /// Uninstall the hook and join the engine thread. No event is processed
    /// after this returns. Stopping a stopped engine is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        if self.phase.get() == EnginePhase::Stopped {
            return Ok(());
        }
        self.phase.set(EnginePhase::Stopping);

        if let Some(platform) = self.platform.as_mut() {
            platform.uninstall();
        }
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Envelope::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Engine thread panicked");
            }
        }

        self.phase.set(EnginePhase::Stopped);
        info!("Engine stopped");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.expect_phase("pause", EnginePhase::is_active)?;
        self.send(Command::Pause)
    }

    pub fn resume(&mut self) -> Result<()> {
        self.expect_phase("resume", EnginePhase::is_active)?;
        self.send(Command::Resume)
    }

    /// Replace the active index. The index is built here, so an ambiguous
    /// profile is rejected before the engine thread ever sees it.
    pub fn switch_profile(&mut self, profile: &Profile) -> Result<()> {
        self.expect_phase("switch profile", EnginePhase::is_active)?;
        let index = TriggerIndex::build(profile)?;
        self.send(Command::SwitchProfile(Arc::new(index)))
    }

    /// Replace the whole profile ring. Fails without changing anything if the
    /// active profile is missing or ambiguous; other bad profiles are left out
    /// and reported as [`StatusEvent::ProfileSwitchRejected`].
    pub fn set_profiles(&mut self, profiles: &[Profile], active: &ProfileId) -> Result<()> {
        self.expect_phase("set profiles", EnginePhase::is_active)?;
        let ring = Ring::build(profiles, active)?;
        self.send(Command::SetProfiles {
            ring: ring.entries,
            active: ring.active,
        })?;
        self.report_rejected(ring.rejected);
        Ok(())
    }

    fn report_rejected(&self, rejected: Vec<(ProfileId, KeyflowError)>) {
        for (id, err) in rejected {
            warn!("Profile '{}' left out of rotation: {}", id, err);
            let _ = self.status_tx.send(StatusEvent::ProfileSwitchRejected {
                id,
                reason: err.to_string(),
            });
        }
    }

    fn expect_phase(&self, operation: &'static str, allowed: impl Fn(EnginePhase) -> bool) -> Result<()> {
        let phase = self.phase.get();
        if allowed(phase) {
            Ok(())
        } else {
            Err(KeyflowError::InvalidState {
                operation,
                state: phase.to_string(),
            })
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        let commands = self.commands.as_ref().ok_or_else(|| KeyflowError::InvalidState {
            operation: "send command",
            state: self.phase.get().to_string(),
        })?;
        commands
            .send(Envelope::Command(command))
            .map_err(|_| KeyflowError::Other("engine thread is gone".to_string()))
    }
}

impl Drop for EngineController {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
