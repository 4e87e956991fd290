//! Normalized key events and the translation from raw `rdev` events.

use rdev::{self, EventType, Key as RdevKey};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Shift,
    Control,
    Alt,
    /// Right Alt on layouts where it composes characters.
    AltGr,
    Meta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// Logical key identifier, independent of the hook backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Modifier(Modifier, Side),
    CapsLock,
    NumLock,
    Backspace,
    Delete,
    Return,
    Tab,
    Space,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Function(u8),
    /// Letter key, stored as uppercase ASCII.
    Letter(char),
    Digit(u8),
    /// Punctuation key, stored as its unshifted US-layout character.
    Symbol(char),
    Keypad(char),
    /// Any mouse button; moves the caret so it invalidates typing state.
    Pointer,
    Unknown(u32),
}

impl Key {
    pub fn is_modifier(&self) -> bool {
        matches!(self, Key::Modifier(..) | Key::CapsLock | Key::NumLock)
    }

    /// Keys that normally produce a character when typed.
    pub fn is_character_key(&self) -> bool {
        matches!(
            self,
            Key::Letter(_) | Key::Digit(_) | Key::Symbol(_) | Key::Keypad(_) | Key::Space
        )
    }

    /// Best-effort logical key for a typed character (US layout).
    pub fn for_char(c: char) -> Key {
        match c {
            'a'..='z' | 'A'..='Z' => Key::Letter(c.to_ascii_uppercase()),
            '0'..='9' => Key::Digit(c as u8 - b'0'),
            ' ' => Key::Space,
            '\n' => Key::Return,
            '\t' => Key::Tab,
            other => Key::Symbol(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Down,
    Up,
}

/// A key event after platform quirks have been coalesced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: KeyKind,
    pub key: Key,
    /// Decoded printable character, if the key produced one.
    pub character: Option<char>,
    pub timestamp: SystemTime,
}

impl KeyEvent {
    pub fn down(key: Key, character: Option<char>) -> Self {
        KeyEvent {
            kind: KeyKind::Down,
            key,
            character,
            timestamp: SystemTime::now(),
        }
    }

    pub fn up(key: Key) -> Self {
        KeyEvent {
            kind: KeyKind::Up,
            key,
            character: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Key-down for a printable character.
    pub fn typed(c: char) -> Self {
        KeyEvent::down(Key::for_char(c), Some(c))
    }

    pub fn at(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_down(&self) -> bool {
        self.kind == KeyKind::Down
    }
}

/// Tracks which modifier keys are currently held.
#[derive(Debug, Default, Clone)]
pub struct ModifierState {
    held: Vec<(Modifier, Side)>,
}

impl ModifierState {
    /// Update from an event. Returns true if the event was a modifier key.
    pub fn apply(&mut self, event: &KeyEvent) -> bool {
        let Key::Modifier(modifier, side) = event.key else {
            return false;
        };
        let entry = (modifier, side);
        match event.kind {
            KeyKind::Down => {
                if !self.held.contains(&entry) {
                    self.held.push(entry);
                }
            }
            KeyKind::Up => self.held.retain(|held| *held != entry),
        }
        true
    }

    pub fn is_held(&self, modifier: Modifier) -> bool {
        self.held.iter().any(|(m, _)| *m == modifier)
    }

    pub fn ctrl(&self) -> bool {
        self.is_held(Modifier::Control)
    }

    pub fn alt(&self) -> bool {
        self.is_held(Modifier::Alt)
    }

    pub fn shift(&self) -> bool {
        self.is_held(Modifier::Shift)
    }

    pub fn meta(&self) -> bool {
        self.is_held(Modifier::Meta)
    }

    /// Ctrl, Alt or Meta held: keys are shortcuts rather than text.
    pub fn command_held(&self) -> bool {
        self.ctrl() || self.alt() || self.meta()
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }
}

/// Converts raw `rdev` events into [`KeyEvent`]s.
///
/// Dead keys and IME composition steps (a character key that decodes to
/// nothing while no command modifier is held) produce no event at all.
#[derive(Debug, Default)]
pub struct Normalizer {
    modifiers: ModifierState,
}

impl Normalizer {
    pub fn new() -> Self {
        Normalizer::default()
    }

    pub fn normalize(&mut self, event: &rdev::Event) -> Option<KeyEvent> {
        let normalized = match event.event_type {
            EventType::KeyPress(key) => {
                let key = map_rdev_key(key);
                let decoded = decode_name(event.name.as_deref());
                let character = if self.modifiers.command_held() {
                    None
                } else {
                    decoded
                };
                if key.is_character_key() && character.is_none() && !self.modifiers.command_held()
                {
                    return None;
                }
                KeyEvent {
                    kind: KeyKind::Down,
                    key,
                    character,
                    timestamp: event.time,
                }
            }
            EventType::KeyRelease(key) => KeyEvent {
                kind: KeyKind::Up,
                key: map_rdev_key(key),
                character: None,
                timestamp: event.time,
            },
            EventType::ButtonPress(_) => KeyEvent {
                kind: KeyKind::Down,
                key: Key::Pointer,
                character: None,
                timestamp: event.time,
            },
            _ => return None,
        };

        self.modifiers.apply(&normalized);
        Some(normalized)
    }
}

/// Decode the OS-provided name of a key press into a printable character.
fn decode_name(name: Option<&str>) -> Option<char> {
    let name = name?;
    let mut chars = name.chars();
    let c = chars.next()?;
    if chars.next().is_some() || c.is_control() {
        return None;
    }
    Some(c)
}

/// Convert rdev::Key to a logical key
pub fn map_rdev_key(key: RdevKey) -> Key {
    use Modifier::*;
    match key {
        RdevKey::ShiftLeft => Key::Modifier(Shift, Side::Left),
        RdevKey::ShiftRight => Key::Modifier(Shift, Side::Right),
        RdevKey::ControlLeft => Key::Modifier(Control, Side::Left),
        RdevKey::ControlRight => Key::Modifier(Control, Side::Right),
        RdevKey::Alt => Key::Modifier(Alt, Side::Left),
        RdevKey::AltGr => Key::Modifier(AltGr, Side::Right),
        RdevKey::MetaLeft => Key::Modifier(Meta, Side::Left),
        RdevKey::MetaRight => Key::Modifier(Meta, Side::Right),
        RdevKey::CapsLock => Key::CapsLock,
        RdevKey::NumLock => Key::NumLock,
        RdevKey::Backspace => Key::Backspace,
        RdevKey::Delete | RdevKey::KpDelete => Key::Delete,
        RdevKey::Return | RdevKey::KpReturn => Key::Return,
        RdevKey::Tab => Key::Tab,
        RdevKey::Space => Key::Space,
        RdevKey::Escape => Key::Escape,
        RdevKey::UpArrow => Key::Up,
        RdevKey::DownArrow => Key::Down,
        RdevKey::LeftArrow => Key::Left,
        RdevKey::RightArrow => Key::Right,
        RdevKey::Home => Key::Home,
        RdevKey::End => Key::End,
        RdevKey::PageUp => Key::PageUp,
        RdevKey::PageDown => Key::PageDown,
        RdevKey::Insert => Key::Insert,
        RdevKey::F1 => Key::Function(1),
        RdevKey::F2 => Key::Function(2),
        RdevKey::F3 => Key::Function(3),
        RdevKey::F4 => Key::Function(4),
        RdevKey::F5 => Key::Function(5),
        RdevKey::F6 => Key::Function(6),
        RdevKey::F7 => Key::Function(7),
        RdevKey::F8 => Key::Function(8),
        RdevKey::F9 => Key::Function(9),
        RdevKey::F10 => Key::Function(10),
        RdevKey::F11 => Key::Function(11),
        RdevKey::F12 => Key::Function(12),
        RdevKey::KeyA => Key::Letter('A'),
        RdevKey::KeyB => Key::Letter('B'),
        RdevKey::KeyC => Key::Letter('C'),
        RdevKey::KeyD => Key::Letter('D'),
        RdevKey::KeyE => Key::Letter('E'),
        RdevKey::KeyF => Key::Letter('F'),
        RdevKey::KeyG => Key::Letter('G'),
        RdevKey::KeyH => Key::Letter('H'),
        RdevKey::KeyI => Key::Letter('I'),
        RdevKey::KeyJ => Key::Letter('J'),
        RdevKey::KeyK => Key::Letter('K'),
        RdevKey::KeyL => Key::Letter('L'),
        RdevKey::KeyM => Key::Letter('M'),
        RdevKey::KeyN => Key::Letter('N'),
        RdevKey::KeyO => Key::Letter('O'),
        RdevKey::KeyP => Key::Letter('P'),
        RdevKey::KeyQ => Key::Letter('Q'),
        RdevKey::KeyR => Key::Letter('R'),
        RdevKey::KeyS => Key::Letter('S'),
        RdevKey::KeyT => Key::Letter('T'),
        RdevKey::KeyU => Key::Letter('U'),
        RdevKey::KeyV => Key::Letter('V'),
        RdevKey::KeyW => Key::Letter('W'),
        RdevKey::KeyX => Key::Letter('X'),
        RdevKey::KeyY => Key::Letter('Y'),
        RdevKey::KeyZ => Key::Letter('Z'),
        RdevKey::Num0 => Key::Digit(0),
        RdevKey::Num1 => Key::Digit(1),
        RdevKey::Num2 => Key::Digit(2),
        RdevKey::Num3 => Key::Digit(3),
        RdevKey::Num4 => Key::Digit(4),
        RdevKey::Num5 => Key::Digit(5),
        RdevKey::Num6 => Key::Digit(6),
        RdevKey::Num7 => Key::Digit(7),
        RdevKey::Num8 => Key::Digit(8),
        RdevKey::Num9 => Key::Digit(9),
        RdevKey::BackQuote => Key::Symbol('`'),
        RdevKey::Minus => Key::Symbol('-'),
        RdevKey::Equal => Key::Symbol('='),
        RdevKey::LeftBracket => Key::Symbol('['),
        RdevKey::RightBracket => Key::Symbol(']'),
        RdevKey::SemiColon => Key::Symbol(';'),
        RdevKey::Quote => Key::Symbol('\''),
        RdevKey::BackSlash | RdevKey::IntlBackslash => Key::Symbol('\\'),
        RdevKey::Comma => Key::Symbol(','),
        RdevKey::Dot => Key::Symbol('.'),
        RdevKey::Slash => Key::Symbol('/'),
        RdevKey::Kp0 => Key::Keypad('0'),
        RdevKey::Kp1 => Key::Keypad('1'),
        RdevKey::Kp2 => Key::Keypad('2'),
        RdevKey::Kp3 => Key::Keypad('3'),
        RdevKey::Kp4 => Key::Keypad('4'),
        RdevKey::Kp5 => Key::Keypad('5'),
        RdevKey::Kp6 => Key::Keypad('6'),
        RdevKey::Kp7 => Key::Keypad('7'),
        RdevKey::Kp8 => Key::Keypad('8'),
        RdevKey::Kp9 => Key::Keypad('9'),
        RdevKey::KpMinus => Key::Keypad('-'),
        RdevKey::KpPlus => Key::Keypad('+'),
        RdevKey::KpMultiply => Key::Keypad('*'),
        RdevKey::KpDivide => Key::Keypad('/'),
        RdevKey::Unknown(code) => Key::Unknown(code),
        _ => Key::Unknown(0),
    }
}
