//! Profile persistence.
//!
//! The engine only needs [`ProfileStore`]; [`JsonProfileStore`] adds the
//! editing helpers used by the command line.

use crate::config::{ensure_config_dir, get_profiles_file_path};
use crate::error::{KeyflowError, Result};
use crate::index::validate_profile;
use crate::models::{Profile, ProfileId, Trigger};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;

/// Read side of profile storage.
pub trait ProfileStore {
    /// All profiles, in a stable order.
    fn load_profiles(&self) -> Result<Vec<Profile>>;
    fn load_active_profile_id(&self) -> Result<ProfileId>;
}

/// On-disk layout of `profiles.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDocument {
    #[serde(default)]
    pub current_profile: ProfileId,
    #[serde(default)]
    pub profiles: BTreeMap<ProfileId, BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled: Vec<ProfileId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Default for ProfileDocument {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(ProfileId::default(), BTreeMap::new());
        ProfileDocument {
            current_profile: ProfileId::default(),
            profiles,
            disabled: Vec::new(),
            updated_at: None,
        }
    }
}

impl ProfileDocument {
    pub fn profile(&self, id: &ProfileId) -> Option<Profile> {
        self.profiles.get(id).map(|map| {
            let mut profile = Profile::from_map(id.clone(), map);
            profile.enabled = !self.disabled.contains(id);
            profile
        })
    }

    pub fn to_profiles(&self) -> Vec<Profile> {
        self.profiles
            .keys()
            .filter_map(|id| self.profile(id))
            .collect()
    }

    fn triggers_mut(&mut self, id: &ProfileId) -> Result<&mut BTreeMap<String, String>> {
        self.profiles
            .get_mut(id)
            .ok_or_else(|| KeyflowError::ProfileNotFound(id.to_string()))
    }
}

/// `ProfileStore` backed by a JSON document.
#[derive(Debug, Clone)]
pub struct JsonProfileStore {
    path: PathBuf,
}

impl JsonProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonProfileStore { path: path.into() }
    }

    /// The store in the keyflow config directory.
    pub fn open_default() -> Result<Self> {
        ensure_config_dir()?;
        Ok(JsonProfileStore::new(get_profiles_file_path()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time of the backing file, if it exists.
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    /// Load the document; a missing or empty file yields a single empty `main` profile.
    pub fn load(&self) -> Result<ProfileDocument> {
        if !self.path.exists() {
            return Ok(ProfileDocument::default());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(ProfileDocument::default());
        }

        let mut document: ProfileDocument = serde_json::from_str(&content)?;
        if document.profiles.is_empty() {
            document
                .profiles
                .insert(document.current_profile.clone(), BTreeMap::new());
        }
        Ok(document)
    }

    /// Write the document atomically: a temp file in the same directory is
    /// renamed over the target.
    pub fn save(&self, document: &mut ProfileDocument) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        document.updated_at = Some(Local::now().to_rfc3339());
        let serialized = serde_json::to_string_pretty(document)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(serialized.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| KeyflowError::Io(e.error))?;
        Ok(())
    }

    fn modify<T>(&self, edit: impl FnOnce(&mut ProfileDocument) -> Result<T>) -> Result<T> {
        let mut document = self.load()?;
        let value = edit(&mut document)?;
        self.save(&mut document)?;
        Ok(value)
    }

    /// Add a trigger to `profile` (created if missing). Rejected if the
    /// pattern already exists or would make the profile ambiguous.
    pub fn add_trigger(&self, profile: &ProfileId, pattern: &str, output: &str) -> Result<()> {
        if pattern.is_empty() {
            return Err(KeyflowError::EmptyPattern);
        }
        self.modify(|doc| {
            let triggers = doc.profiles.entry(profile.clone()).or_default();
            if triggers.contains_key(pattern) {
                return Err(KeyflowError::DuplicatePattern(pattern.to_string()));
            }
            triggers.insert(pattern.to_string(), output.to_string());
            validate_profile(&Profile::from_map(profile.clone(), triggers))
        })
    }

    pub fn update_trigger(&self, profile: &ProfileId, pattern: &str, output: &str) -> Result<()> {
        self.modify(|doc| {
            let triggers = doc.triggers_mut(profile)?;
            match triggers.get_mut(pattern) {
                Some(existing) => {
                    *existing = output.to_string();
                    Ok(())
                }
                None => Err(KeyflowError::TriggerNotFound(pattern.to_string())),
            }
        })
    }

    pub fn delete_trigger(&self, profile: &ProfileId, pattern: &str) -> Result<()> {
        self.modify(|doc| {
            doc.triggers_mut(profile)?
                .remove(pattern)
                .map(|_| ())
                .ok_or_else(|| KeyflowError::TriggerNotFound(pattern.to_string()))
        })
    }

    pub fn list_triggers(&self, profile: &ProfileId) -> Result<Vec<Trigger>> {
        let document = self.load()?;
        document
            .profile(profile)
            .map(|p| p.triggers)
            .ok_or_else(|| KeyflowError::ProfileNotFound(profile.to_string()))
    }

    pub fn list_profiles(&self) -> Result<Vec<ProfileId>> {
        Ok(self.load()?.profiles.keys().cloned().collect())
    }

    /// Make `profile` the active one, creating it empty if needed.
    pub fn set_active_profile(&self, profile: &ProfileId) -> Result<()> {
        self.modify(|doc| {
            doc.profiles.entry(profile.clone()).or_default();
            doc.current_profile = profile.clone();
            Ok(())
        })
    }

    pub fn set_profile_enabled(&self, profile: &ProfileId, enabled: bool) -> Result<()> {
        self.modify(|doc| {
            doc.triggers_mut(profile)?;
            doc.disabled.retain(|id| id != profile);
            if !enabled {
                doc.disabled.push(profile.clone());
            }
            Ok(())
        })
    }
}

impl ProfileStore for JsonProfileStore {
    fn load_profiles(&self) -> Result<Vec<Profile>> {
        Ok(self.load()?.to_profiles())
    }

    fn load_active_profile_id(&self) -> Result<ProfileId> {
        Ok(self.load()?.current_profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, JsonProfileStore) {
        let dir = tempdir().unwrap();
        let store = JsonProfileStore::new(dir.path().join("profiles.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_yields_empty_main_profile() {
        let (_dir, store) = store();
        let profiles = store.load_profiles().unwrap();
        assert_eq!(profiles, vec![Profile::new("main")]);
        assert_eq!(store.load_active_profile_id().unwrap(), ProfileId::from("main"));
    }

    #[test]
    fn reads_the_documented_format() {
        let (_dir, store) = store();
        fs::write(
            store.path(),
            r#"{
                "current_profile": "work",
                "profiles": {
                    "main": {"-em": "me@example.com"},
                    "work": {"-sig": "Regards"}
                },
                "disabled": ["main"]
            }"#,
        )
        .unwrap();

        let profiles = store.load_profiles().unwrap();
        assert_eq!(profiles.len(), 2);
        assert!(!profiles[0].enabled);
        assert_eq!(profiles[1].find("-sig").unwrap().output, "Regards");
        assert_eq!(store.load_active_profile_id().unwrap(), ProfileId::from("work"));
    }

    #[test]
    fn add_update_delete_round_trip() {
        let (_dir, store) = store();
        let main = ProfileId::default();

        store.add_trigger(&main, "-em", "a@example.com").unwrap();
        store.update_trigger(&main, "-em", "b@example.com").unwrap();
        assert_eq!(
            store.list_triggers(&main).unwrap(),
            vec![Trigger::new("-em", "b@example.com")]
        );

        store.delete_trigger(&main, "-em").unwrap();
        assert!(store.list_triggers(&main).unwrap().is_empty());
        assert!(matches!(
            store.delete_trigger(&main, "-em"),
            Err(KeyflowError::TriggerNotFound(_))
        ));
    }

    #[test]
    fn ambiguous_or_duplicate_triggers_are_not_saved() {
        let (_dir, store) = store();
        let main = ProfileId::default();
        store.add_trigger(&main, "-em", "x").unwrap();

        assert!(matches!(
            store.add_trigger(&main, "-email", "y"),
            Err(KeyflowError::AmbiguousTriggers { .. })
        ));
        assert!(matches!(
            store.add_trigger(&main, "-em", "z"),
            Err(KeyflowError::DuplicatePattern(_))
        ));
        assert!(matches!(
            store.add_trigger(&main, "", "z"),
            Err(KeyflowError::EmptyPattern)
        ));
        assert!(matches!(
            store.add_trigger(&main, "-x\n", "z"),
            Err(KeyflowError::UnprintablePattern(_))
        ));
        assert_eq!(store.list_triggers(&main).unwrap().len(), 1);
    }

    #[test]
    fn switching_profiles_persists() {
        let (_dir, store) = store();
        let work = ProfileId::from("work");
        store.set_active_profile(&work).unwrap();
        store.set_profile_enabled(&ProfileId::default(), false).unwrap();

        let reopened = JsonProfileStore::new(store.path());
        assert_eq!(reopened.load_active_profile_id().unwrap(), work);
        assert_eq!(
            reopened.list_profiles().unwrap(),
            vec![ProfileId::from("main"), work]
        );
        assert!(reopened.load().unwrap().updated_at.is_some());
    }
}
