//! Global chord recognition (toggle, quick-add, profile switch).
//!
//! Chords are matched on modifier + key state tracked here, independently of
//! the trigger matcher. A recognised chord consumes both its key-down and the
//! matching key-up; auto-repeat while the chord key is held fires only once.

use crate::config::EngineConfig;
use crate::error::{KeyflowError, Result};
use crate::keyboard::{Key, KeyEvent, KeyKind, ModifierState};
use std::fmt;

/// Represents a parsed hotkey with key and modifier flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chord {
    pub key: Key,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl Chord {
    /// Parse a hotkey string like "ctrl+f12" or "CTRL SHIFT K"
    pub fn parse(hotkey: &str) -> Result<Chord> {
        let parts: Vec<String> = hotkey
            .split(|c| c == '+' || c == ' ')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            return Err(KeyflowError::InvalidHotkey("empty hotkey".to_string()));
        }

        let mut chord = Chord {
            key: Key::Unknown(0),
            ctrl: false,
            alt: false,
            shift: false,
            meta: false,
        };
        let mut key = None;

        for part in parts {
            match part.as_str() {
                "ctrl" | "control" => chord.ctrl = true,
                "alt" | "option" => chord.alt = true,
                "shift" => chord.shift = true,
                "meta" | "cmd" | "command" | "win" | "super" => chord.meta = true,
                other => {
                    if key.is_some() {
                        return Err(KeyflowError::InvalidHotkey(format!(
                            "multiple keys in '{}'",
                            hotkey
                        )));
                    }
                    key = Some(parse_key(other)?);
                }
            }
        }

        chord.key = key.ok_or_else(|| {
            KeyflowError::InvalidHotkey(format!("no key specified in '{}'", hotkey))
        })?;
        Ok(chord)
    }

    /// Combine the shared modifier with a per-action key. An empty key disables the chord.
    pub fn compose(modifier: &str, key: &str) -> Result<Option<Chord>> {
        if key.trim().is_empty() {
            return Ok(None);
        }
        Chord::parse(&format!("{}+{}", modifier, key)).map(Some)
    }

    fn matches(&self, key: Key, modifiers: &ModifierState) -> bool {
        self.key == key
            && self.ctrl == modifiers.ctrl()
            && self.alt == modifiers.alt()
            && self.shift == modifiers.shift()
            && self.meta == modifiers.meta()
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            write!(f, "ctrl+")?;
        }
        if self.alt {
            write!(f, "alt+")?;
        }
        if self.shift {
            write!(f, "shift+")?;
        }
        if self.meta {
            write!(f, "meta+")?;
        }
        match self.key {
            Key::Function(n) => write!(f, "f{}", n),
            Key::Letter(c) => write!(f, "{}", c.to_ascii_lowercase()),
            Key::Digit(d) => write!(f, "{}", d),
            other => write!(f, "{:?}", other),
        }
    }
}

fn parse_key(name: &str) -> Result<Key> {
    let key = match name {
        "space" => Key::Space,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "escape" | "esc" => Key::Escape,
        "insert" | "ins" => Key::Insert,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        "up" => Key::Up,
        "down" => Key::Down,
        "left" => Key::Left,
        "right" => Key::Right,
        s if s.len() > 1 && s.starts_with('f') => {
            let n: u8 = s[1..]
                .parse()
                .map_err(|_| KeyflowError::InvalidHotkey(format!("unknown key '{}'", s)))?;
            if !(1..=24).contains(&n) {
                return Err(KeyflowError::InvalidHotkey(format!("unknown key '{}'", s)));
            }
            Key::Function(n)
        }
        s if s.chars().count() == 1 => match s.chars().next() {
            Some(c) if c.is_ascii_alphanumeric() || c.is_ascii_punctuation() => Key::for_char(c),
            _ => return Err(KeyflowError::InvalidHotkey(format!("unknown key '{}'", s))),
        },
        other => {
            return Err(KeyflowError::InvalidHotkey(format!(
                "unknown key '{}'",
                other
            )))
        }
    };
    Ok(key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    ToggleEnabled,
    QuickAdd,
    SwitchProfile,
}

/// The configured chords.
#[derive(Debug, Clone, Default)]
pub struct ChordSet {
    bindings: Vec<(Chord, HotkeyAction)>,
}

impl ChordSet {
    pub fn new() -> Self {
        ChordSet::default()
    }

    pub fn bind(mut self, chord: Chord, action: HotkeyAction) -> Self {
        self.bindings.retain(|(c, _)| *c != chord);
        self.bindings.push((chord, action));
        self
    }

    pub fn from_config(config: &EngineConfig) -> Result<ChordSet> {
        let modifier = config.hotkey_modifier.as_str();
        let mut set = ChordSet::new();
        for (key, action) in [
            (&config.toggle_key, HotkeyAction::ToggleEnabled),
            (&config.quick_add_key, HotkeyAction::QuickAdd),
            (&config.profile_switch_key, HotkeyAction::SwitchProfile),
        ] {
            if let Some(chord) = Chord::compose(modifier, key)? {
                if set.bindings.iter().any(|(c, _)| *c == chord) {
                    return Err(KeyflowError::InvalidConfig(format!(
                        "hotkey {} is bound twice",
                        chord
                    )));
                }
                set = set.bind(chord, action);
            }
        }
        Ok(set)
    }

    fn lookup(&self, key: Key, modifiers: &ModifierState) -> Option<HotkeyAction> {
        self.bindings
            .iter()
            .find(|(chord, _)| chord.matches(key, modifiers))
            .map(|(_, action)| *action)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// What the dispatcher decided for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A chord fired; the event must not reach the matcher.
    Fire(HotkeyAction),
    /// Part of an already-fired chord (repeat or release); drop it.
    Swallow,
    /// Not a chord; hand the event on.
    Pass,
}

#[derive(Debug, Default)]
pub struct HotkeyDispatcher {
    chords: ChordSet,
    modifiers: ModifierState,
    held: Vec<Key>,
}

impl HotkeyDispatcher {
    pub fn new(chords: ChordSet) -> Self {
        HotkeyDispatcher {
            chords,
            modifiers: ModifierState::default(),
            held: Vec::new(),
        }
    }

    pub fn dispatch(&mut self, event: &KeyEvent) -> Dispatch {
        if self.modifiers.apply(event) {
            return Dispatch::Pass;
        }

        match event.kind {
            KeyKind::Down => {
                if self.held.contains(&event.key) {
                    return Dispatch::Swallow;
                }
                match self.chords.lookup(event.key, &self.modifiers) {
                    Some(action) => {
                        self.held.push(event.key);
                        Dispatch::Fire(action)
                    }
                    None => Dispatch::Pass,
                }
            }
            KeyKind::Up => {
                let before = self.held.len();
                self.held.retain(|k| *k != event.key);
                if self.held.len() != before {
                    Dispatch::Swallow
                } else {
                    Dispatch::Pass
                }
            }
        }
    }

    pub fn modifiers(&self) -> &ModifierState {
        &self.modifiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::{Modifier, Side};

    fn ctrl_down() -> KeyEvent {
        KeyEvent::down(Key::Modifier(Modifier::Control, Side::Left), None)
    }

    fn ctrl_up() -> KeyEvent {
        KeyEvent::up(Key::Modifier(Modifier::Control, Side::Left))
    }

    #[test]
    fn parses_modifiers_and_keys() {
        let chord = Chord::parse("CTRL+SHIFT+K").unwrap();
        assert!(chord.ctrl && chord.shift && !chord.alt && !chord.meta);
        assert_eq!(chord.key, Key::Letter('K'));

        let chord = Chord::parse("cmd f12").unwrap();
        assert!(chord.meta);
        assert_eq!(chord.key, Key::Function(12));
        assert_eq!(chord.to_string(), "meta+f12");
    }

    #[test]
    fn rejects_bad_hotkeys() {
        assert!(Chord::parse("").is_err());
        assert!(Chord::parse("ctrl").is_err());
        assert!(Chord::parse("ctrl+a+b").is_err());
        assert!(Chord::parse("ctrl+f99").is_err());
        assert!(Chord::parse("ctrl+banana").is_err());
    }

    #[test]
    fn empty_key_disables_chord() {
        assert_eq!(Chord::compose("ctrl", "").unwrap(), None);
        let config = EngineConfig {
            quick_add_key: String::new(),
            ..EngineConfig::default()
        };
        let set = ChordSet::from_config(&config).unwrap();
        assert_eq!(set.bindings.len(), 2);
    }

    #[test]
    fn duplicate_bindings_are_rejected() {
        let config = EngineConfig {
            quick_add_key: "f12".to_string(),
            ..EngineConfig::default()
        };
        assert!(ChordSet::from_config(&config).is_err());
    }

    #[test]
    fn chord_fires_once_and_swallows_release() {
        let set = ChordSet::from_config(&EngineConfig::default()).unwrap();
        let mut dispatcher = HotkeyDispatcher::new(set);

        assert_eq!(dispatcher.dispatch(&ctrl_down()), Dispatch::Pass);
        let f12 = KeyEvent::down(Key::Function(12), None);
        assert_eq!(
            dispatcher.dispatch(&f12),
            Dispatch::Fire(HotkeyAction::ToggleEnabled)
        );
        // auto-repeat
        assert_eq!(dispatcher.dispatch(&f12), Dispatch::Swallow);
        assert_eq!(
            dispatcher.dispatch(&KeyEvent::up(Key::Function(12))),
            Dispatch::Swallow
        );
        assert_eq!(dispatcher.dispatch(&ctrl_up()), Dispatch::Pass);
    }

    #[test]
    fn modifiers_must_match_exactly() {
        let set = ChordSet::from_config(&EngineConfig::default()).unwrap();
        let mut dispatcher = HotkeyDispatcher::new(set);
        let f10 = KeyEvent::down(Key::Function(10), None);

        assert_eq!(dispatcher.dispatch(&f10), Dispatch::Pass);

        dispatcher.dispatch(&ctrl_down());
        dispatcher.dispatch(&KeyEvent::down(
            Key::Modifier(Modifier::Shift, Side::Left),
            None,
        ));
        assert_eq!(dispatcher.dispatch(&f10), Dispatch::Pass);

        dispatcher.dispatch(&KeyEvent::up(Key::Modifier(Modifier::Shift, Side::Left)));
        assert_eq!(
            dispatcher.dispatch(&f10),
            Dispatch::Fire(HotkeyAction::QuickAdd)
        );
    }

    #[test]
    fn plain_typing_passes_through() {
        let set = ChordSet::from_config(&EngineConfig::default()).unwrap();
        let mut dispatcher = HotkeyDispatcher::new(set);
        assert_eq!(dispatcher.dispatch(&KeyEvent::typed('a')), Dispatch::Pass);
        assert_eq!(
            dispatcher.dispatch(&KeyEvent::up(Key::Letter('A'))),
            Dispatch::Pass
        );
    }
}
