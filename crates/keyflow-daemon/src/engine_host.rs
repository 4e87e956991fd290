//! Runs the expansion engine inside the daemon process and keeps it in sync
//! with `profiles.json`.

use keyflow_core::storage::{JsonProfileStore, ProfileStore};
use keyflow_core::{EngineConfig, EngineController, KeyflowError, Profile, ProfileId, Result, StatusEvent};
use log::{debug, error, info, warn};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant, SystemTime};

/// How often the profile file is checked for changes.
pub const RELOAD_INTERVAL: Duration = Duration::from_secs(1);

/// Detects edits to the profile file by its modification time.
pub struct ProfileWatcher {
    store: JsonProfileStore,
    last_modified: Option<SystemTime>,
}

impl ProfileWatcher {
    pub fn new(store: JsonProfileStore) -> Self {
        let last_modified = store.modified();
        ProfileWatcher {
            store,
            last_modified,
        }
    }

    pub fn store(&self) -> &JsonProfileStore {
        &self.store
    }

    /// True once per change of the file's modification time.
    pub fn poll(&mut self) -> bool {
        let current = self.store.modified();
        if current.is_some() && current != self.last_modified {
            self.last_modified = current;
            true
        } else {
            false
        }
    }
}

/// Running totals of what the engine did since the daemon started.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExpansionStats {
    pub fired: usize,
    pub failed: usize,
}

impl ExpansionStats {
    pub fn record(&mut self, event: &StatusEvent) {
        match event {
            StatusEvent::ExpansionFired(_) => self.fired += 1,
            StatusEvent::InjectionFailed(_) => self.failed += 1,
            _ => {}
        }
    }

    fn log_summary(&self) {
        info!(
            "Engine stopped after {} expansions ({} failed)",
            self.fired, self.failed
        );
    }
}

/// Profiles and the active id, read together.
pub fn load_snapshot(store: &impl ProfileStore) -> Result<(Vec<Profile>, ProfileId)> {
    let profiles = store.load_profiles()?;
    let active = store.load_active_profile_id()?;
    Ok((profiles, active))
}

/// Write a status event to the daemon log.
pub fn log_status(event: &StatusEvent) {
    match event {
        StatusEvent::Paused => info!("Expansion paused"),
        StatusEvent::Resumed => info!("Expansion resumed"),
        StatusEvent::ProfileSwitched(id) => info!("Switched to profile '{}'", id),
        StatusEvent::ExpansionFired(pattern) => debug!("Expanded '{}'", pattern),
        StatusEvent::InjectionFailed(reason) => warn!("Could not insert expansion: {}", reason),
        StatusEvent::HookLost(reason) => error!("Keyboard hook lost: {}", reason),
        StatusEvent::QuickAddRequested(text) => match text {
            Some(text) => info!(
                "Quick-add requested with {} characters of clipboard text; use `keyflow add` to save it",
                text.chars().count()
            ),
            None => info!("Quick-add requested; use `keyflow add` to save a trigger"),
        },
        StatusEvent::ProfileSwitchRejected { id, reason } => {
            warn!("Profile '{}' is not usable: {}", id, reason)
        }
        StatusEvent::InvariantViolated(reason) => error!("Internal matcher error: {}", reason),
    }
}

fn reload(controller: &mut EngineController, store: &JsonProfileStore) {
    match load_snapshot(store) {
        Ok((profiles, active)) => match controller.set_profiles(&profiles, &active) {
            Ok(()) => info!("Reloaded {} profiles from {}", profiles.len(), store.path().display()),
            Err(err) => warn!("Keeping previous profiles: {}", err),
        },
        Err(err) => warn!("Failed to read {}: {}", store.path().display(), err),
    }
}

/// Start the engine and serve until the keyboard hook is lost.
pub fn run_engine(config: EngineConfig, store: JsonProfileStore) -> Result<()> {
    let (profiles, active) = load_snapshot(&store)?;
    let mut controller = EngineController::new(config);
    let status = controller
        .take_status_receiver()
        .ok_or_else(|| KeyflowError::Other("status stream already taken".to_string()))?;

    controller.start_with_profiles(&profiles, &active)?;
    info!(
        "Watching {} ({} profiles, active '{}')",
        store.path().display(),
        profiles.len(),
        active
    );

    let mut watcher = ProfileWatcher::new(store);
    let mut stats = ExpansionStats::default();
    let mut last_check = Instant::now();
    loop {
        match status.recv_timeout(RELOAD_INTERVAL) {
            Ok(event) => {
                log_status(&event);
                stats.record(&event);
                if let StatusEvent::HookLost(reason) = event {
                    controller.stop()?;
                    stats.log_summary();
                    return Err(KeyflowError::HookUnavailable(reason));
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_check.elapsed() >= RELOAD_INTERVAL {
            last_check = Instant::now();
            if watcher.poll() {
                reload(&mut controller, watcher.store());
            }
        }
    }

    controller.stop()?;
    stats.log_summary();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn watcher_reports_each_change_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        let store = JsonProfileStore::new(&path);
        let mut watcher = ProfileWatcher::new(store.clone());
        assert!(!watcher.poll());

        store
            .add_trigger(&ProfileId::default(), "-em", "me@example.com")
            .unwrap();
        assert!(watcher.poll());
        assert!(!watcher.poll());

        // Make sure the next write lands on a different mtime.
        thread::sleep(Duration::from_millis(1100));
        store.set_active_profile(&ProfileId::from("work")).unwrap();
        assert!(watcher.poll());
    }

    #[test]
    fn stats_count_fired_and_failed_expansions() {
        let mut stats = ExpansionStats::default();
        for event in [
            StatusEvent::ExpansionFired("-em".to_string()),
            StatusEvent::Paused,
            StatusEvent::ExpansionFired("-sig".to_string()),
            StatusEvent::InjectionFailed("read-only".to_string()),
        ] {
            stats.record(&event);
        }
        assert_eq!(stats, ExpansionStats { fired: 2, failed: 1 });
    }

    #[test]
    fn snapshot_reads_profiles_and_active_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        fs::write(
            &path,
            r#"{"current_profile": "work", "profiles": {"work": {"-sig": "Regards"}}}"#,
        )
        .unwrap();

        let (profiles, active) = load_snapshot(&JsonProfileStore::new(&path)).unwrap();
        assert_eq!(active, ProfileId::from("work"));
        assert_eq!(profiles, vec![Profile::new("work").with_trigger("-sig", "Regards")]);
    }
}
