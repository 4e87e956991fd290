use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the profile created when no profile exists yet.
pub const DEFAULT_PROFILE_NAME: &str = "main";

/// Identifies a profile. Profile names are unique within a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn new(name: impl Into<String>) -> Self {
        ProfileId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(name: &str) -> Self {
        ProfileId::new(name)
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        ProfileId::new(DEFAULT_PROFILE_NAME)
    }
}

/// A user-defined shortcut and the text it expands to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub pattern: String,
    pub output: String,
}

impl Trigger {
    pub fn new(pattern: impl Into<String>, output: impl Into<String>) -> Self {
        Trigger {
            pattern: pattern.into(),
            output: output.into(),
        }
    }

    /// Number of characters the user typed for this pattern.
    pub fn typed_len(&self) -> usize {
        self.pattern.chars().count()
    }
}

/// A named set of triggers that is switched as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: ProfileId,
    pub triggers: Vec<Trigger>,
    pub enabled: bool,
}

impl Profile {
    pub fn new(id: impl Into<ProfileId>) -> Self {
        Profile {
            id: id.into(),
            triggers: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_trigger(mut self, pattern: impl Into<String>, output: impl Into<String>) -> Self {
        self.triggers.push(Trigger::new(pattern, output));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Build a profile from a pattern -> output map.
    pub fn from_map(id: impl Into<ProfileId>, map: &BTreeMap<String, String>) -> Self {
        let mut profile = Profile::new(id);
        profile.triggers = map
            .iter()
            .map(|(pattern, output)| Trigger::new(pattern.clone(), output.clone()))
            .collect();
        profile
    }

    pub fn find(&self, pattern: &str) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.pattern == pattern)
    }
}

impl From<String> for ProfileId {
    fn from(name: String) -> Self {
        ProfileId(name)
    }
}
