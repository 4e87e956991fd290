//! Incremental trigger matching over the typed character stream.

use crate::index::{NodeId, TriggerIndex, ROOT};

/// A trigger that has just been fully typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub pattern: String,
    pub output: String,
    /// Characters to erase before inserting `output`.
    pub delete_count: usize,
    /// Raw key presses that went into the candidate, including modifiers and corrections.
    pub keystrokes: usize,
}

/// Outcome of feeding one input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The candidate grew or shrank and is still a pattern prefix.
    Advanced,
    /// Nothing matches any more; the candidate is back at the root.
    Reset,
    Completed(Completion),
    /// A terminal node with extensions was reached. The candidate was reset.
    Violation(String),
}

/// The current match candidate: a cursor into the trie plus the most recent
/// typed characters, at most as many as the longest pattern.
///
/// The history can be longer than the path to the cursor. Backspace re-walks
/// it, so a suffix dropped by a failure link comes back once the character
/// that forced the drop is erased.
#[derive(Debug, Default)]
pub struct MatchStateMachine {
    cursor: NodeId,
    history: Vec<char>,
    keystrokes: usize,
}

impl MatchStateMachine {
    pub fn new() -> Self {
        MatchStateMachine::default()
    }

    /// Feed one decoded printable character.
    pub fn feed(&mut self, index: &TriggerIndex, c: char) -> Step {
        self.remember(index, c);

        let depth = index.depth(self.cursor);
        let next = index.step(self.cursor, c);
        self.cursor = next;
        if next == ROOT {
            self.keystrokes = 0;
            return Step::Reset;
        }

        self.keystrokes += 1;
        let kept = index.depth(next);
        if kept <= depth {
            // Only the keystrokes of the kept suffix still count.
            self.keystrokes = self.keystrokes.min(kept);
        }

        if let Some(trigger) = index.terminal(next) {
            if index.has_extensions(next) {
                let reason = format!(
                    "pattern '{}' in profile '{}' is terminal but has extensions",
                    trigger.pattern,
                    index.profile()
                );
                self.reset();
                return Step::Violation(reason);
            }
            let completion = self.complete(trigger.pattern.clone(), trigger.output.clone());
            return Step::Completed(completion);
        }

        if let Some(trigger) = index.suffix_match(next) {
            let completion = self.complete(trigger.pattern.clone(), trigger.output.clone());
            return Step::Completed(completion);
        }

        Step::Advanced
    }

    /// Undo the most recent character after the user pressed backspace.
    pub fn retract(&mut self, index: &TriggerIndex) -> Step {
        if self.history.pop().is_none() {
            self.reset();
            return Step::Reset;
        }

        self.cursor = self
            .history
            .iter()
            .fold(ROOT, |node, &c| index.step(node, c));
        if self.cursor == ROOT {
            self.keystrokes = 0;
            return Step::Reset;
        }
        self.keystrokes += 1;
        Step::Advanced
    }

    fn remember(&mut self, index: &TriggerIndex, c: char) {
        self.history.push(c);
        let limit = index.longest_pattern();
        if self.history.len() > limit {
            self.history.drain(..self.history.len() - limit);
        }
    }

    /// Count a key press that does not change the candidate (e.g. Shift).
    pub fn note_keystroke(&mut self) {
        if self.cursor != ROOT {
            self.keystrokes += 1;
        }
    }

    pub fn reset(&mut self) {
        self.cursor = ROOT;
        self.history.clear();
        self.keystrokes = 0;
    }

    fn complete(&mut self, pattern: String, output: String) -> Completion {
        let completion = Completion {
            delete_count: pattern.chars().count(),
            pattern,
            output,
            keystrokes: self.keystrokes,
        };
        self.reset();
        completion
    }

    pub fn is_at_root(&self) -> bool {
        self.cursor == ROOT
    }

    /// The characters currently held as candidate.
    pub fn candidate(&self, index: &TriggerIndex) -> String {
        let depth = index.depth(self.cursor).min(self.history.len());
        self.history[self.history.len() - depth..].iter().collect()
    }
}
