//! Trie over the trigger patterns of one profile.
//!
//! Every node carries a failure link (the longest proper suffix of its path
//! that is also a path in the trie) and an output link (the nearest terminal
//! node along the failure chain). Together they let the matcher keep the
//! longest typed suffix that is still a pattern prefix in amortized O(1)
//! per character.

use crate::error::{KeyflowError, Result};
use crate::models::{Profile, ProfileId, Trigger};
use std::collections::{HashMap, VecDeque};

pub type NodeId = usize;

pub const ROOT: NodeId = 0;

#[derive(Debug, Default)]
struct Node {
    children: HashMap<char, NodeId>,
    depth: usize,
    fail: NodeId,
    output: Option<NodeId>,
    terminal: Option<usize>,
}

#[derive(Debug)]
pub struct TriggerIndex {
    profile: ProfileId,
    enabled: bool,
    nodes: Vec<Node>,
    triggers: Vec<Trigger>,
    longest: usize,
}

impl TriggerIndex {
    /// Build the index for `profile`.
    ///
    /// Fails with [`KeyflowError::AmbiguousTriggers`] when one pattern is a
    /// prefix of another, and with [`KeyflowError::EmptyPattern`],
    /// [`KeyflowError::UnprintablePattern`] or
    /// [`KeyflowError::DuplicatePattern`] for malformed input.
    pub fn build(profile: &Profile) -> Result<TriggerIndex> {
        let mut index = TriggerIndex::empty(profile.id.clone());
        index.enabled = profile.enabled;

        let mut triggers: Vec<&Trigger> = profile.triggers.iter().collect();
        // Shorter patterns first so the offending prefix is always reported as `prefix`.
        triggers.sort_by(|a, b| {
            a.typed_len()
                .cmp(&b.typed_len())
                .then_with(|| a.pattern.cmp(&b.pattern))
        });

        for trigger in triggers {
            index.insert(trigger)?;
        }
        index.link();
        Ok(index)
    }

    /// An index that matches nothing.
    pub fn empty(profile: ProfileId) -> TriggerIndex {
        TriggerIndex {
            profile,
            enabled: true,
            nodes: vec![Node::default()],
            triggers: Vec::new(),
            longest: 0,
        }
    }

    fn insert(&mut self, trigger: &Trigger) -> Result<()> {
        if trigger.pattern.is_empty() {
            return Err(KeyflowError::EmptyPattern);
        }
        // Return, Tab and friends never decode to a character.
        if trigger.pattern.chars().any(char::is_control) {
            return Err(KeyflowError::UnprintablePattern(
                trigger.pattern.escape_default().to_string(),
            ));
        }

        let mut node = ROOT;
        for c in trigger.pattern.chars() {
            if let Some(existing) = self.nodes[node].terminal {
                return Err(self.ambiguity(existing, trigger));
            }
            node = match self.nodes[node].children.get(&c) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(Node {
                        depth: self.nodes[node].depth + 1,
                        ..Node::default()
                    });
                    self.nodes[node].children.insert(c, child);
                    child
                }
            };
        }

        if let Some(existing) = self.nodes[node].terminal {
            if self.triggers[existing].pattern == trigger.pattern {
                return Err(KeyflowError::DuplicatePattern(trigger.pattern.clone()));
            }
        }
        if !self.nodes[node].children.is_empty() {
            // Only reachable if a longer pattern was inserted first.
            return Err(KeyflowError::AmbiguousTriggers {
                profile: self.profile.to_string(),
                prefix: trigger.pattern.clone(),
                pattern: self.any_pattern_below(node),
            });
        }

        self.nodes[node].terminal = Some(self.triggers.len());
        self.longest = self.longest.max(trigger.typed_len());
        self.triggers.push(trigger.clone());
        Ok(())
    }

    fn ambiguity(&self, existing: usize, trigger: &Trigger) -> KeyflowError {
        KeyflowError::AmbiguousTriggers {
            profile: self.profile.to_string(),
            prefix: self.triggers[existing].pattern.clone(),
            pattern: trigger.pattern.clone(),
        }
    }

    fn any_pattern_below(&self, mut node: NodeId) -> String {
        loop {
            if let Some(t) = self.nodes[node].terminal {
                return self.triggers[t].pattern.clone();
            }
            match self.nodes[node].children.values().next() {
                Some(&child) => node = child,
                None => return String::new(),
            }
        }
    }

    /// Compute failure and output links breadth-first.
    fn link(&mut self) {
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        let root_children: Vec<NodeId> = self.nodes[ROOT].children.values().copied().collect();
        for child in root_children {
            self.nodes[child].fail = ROOT;
            queue.push_back(child);
        }

        while let Some(node) = queue.pop_front() {
            let children: Vec<(char, NodeId)> = self.nodes[node]
                .children
                .iter()
                .map(|(&c, &n)| (c, n))
                .collect();
            for (c, child) in children {
                let mut fallback = self.nodes[node].fail;
                let fail = loop {
                    if let Some(&next) = self.nodes[fallback].children.get(&c) {
                        break next;
                    }
                    if fallback == ROOT {
                        break ROOT;
                    }
                    fallback = self.nodes[fallback].fail;
                };
                self.nodes[child].fail = fail;
                self.nodes[child].output = if self.nodes[fail].terminal.is_some() {
                    Some(fail)
                } else {
                    self.nodes[fail].output
                };
                queue.push_back(child);
            }
        }
    }

    /// Advance from `node` by `c`, following failure links on mismatch.
    /// Returns [`ROOT`] when no suffix of the extended path is a pattern prefix.
    pub fn step(&self, mut node: NodeId, c: char) -> NodeId {
        loop {
            if let Some(&next) = self.nodes[node].children.get(&c) {
                return next;
            }
            if node == ROOT {
                return ROOT;
            }
            node = self.nodes[node].fail;
        }
    }

    pub fn depth(&self, node: NodeId) -> usize {
        self.nodes[node].depth
    }

    pub fn has_extensions(&self, node: NodeId) -> bool {
        !self.nodes[node].children.is_empty()
    }

    /// The trigger whose pattern ends exactly at `node`.
    pub fn terminal(&self, node: NodeId) -> Option<&Trigger> {
        self.nodes[node].terminal.map(|t| &self.triggers[t])
    }

    /// The longest trigger that is a proper suffix of the path to `node`.
    pub fn suffix_match(&self, node: NodeId) -> Option<&Trigger> {
        self.nodes[node].output.and_then(|n| self.terminal(n))
    }

    fn walk(&self, text: &str) -> Option<NodeId> {
        text.chars()
            .try_fold(ROOT, |node, c| self.nodes[node].children.get(&c).copied())
    }

    /// Is `text` a prefix of some pattern? The empty string is.
    pub fn is_prefix(&self, text: &str) -> bool {
        self.walk(text).is_some()
    }

    /// The trigger whose pattern equals `text` exactly.
    pub fn exact(&self, text: &str) -> Option<&Trigger> {
        self.walk(text).and_then(|node| self.terminal(node))
    }

    pub fn profile(&self) -> &ProfileId {
        &self.profile
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Length in characters of the longest pattern.
    pub fn longest_pattern(&self) -> usize {
        self.longest
    }
}

/// Check a profile against the prefix invariant without keeping the index.
pub fn validate_profile(profile: &Profile) -> Result<()> {
    TriggerIndex::build(profile).map(|_| ())
}
