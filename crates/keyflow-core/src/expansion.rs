use crate::clipboard::{get_clipboard_text, set_clipboard_text};
use crate::config::{EngineConfig, InjectionMode};
use crate::error::{KeyflowError, Result};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use log::{debug, warn};
use std::thread;
use std::time::Duration;

/// Delivers a replacement into the focused application.
///
/// `inject` erases `delete_count` characters before the caret and then
/// inserts `text`, leaving the caret after it. Implementations must not retry
/// a partially applied edit.
pub trait Injector: Send {
    fn inject(&mut self, delete_count: usize, text: &str) -> Result<()>;
}

/// Create a keyboard controller
pub fn create_keyboard_controller() -> Result<Enigo> {
    Enigo::new(&Settings::default()).map_err(|err| {
        KeyflowError::InjectionFailed(format!("failed to create keyboard controller: {}", err))
    })
}

/// Send backspace key presses
pub fn send_backspace(keyboard: &mut impl Keyboard, count: usize, delay: Duration) -> Result<()> {
    for _ in 0..count {
        keyboard
            .key(Key::Backspace, Direction::Click)
            .map_err(|err| {
                KeyflowError::InjectionFailed(format!("failed to send backspace: {}", err))
            })?;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
    Ok(())
}

pub fn type_text_with_formatting(keyboard: &mut impl Keyboard, text: &str) -> Result<()> {
    // Keep individual text() calls small enough for every platform's input buffer
    const CHUNK_SIZE: usize = 512;

    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            keyboard.key(Key::Return, Direction::Click).map_err(|err| {
                KeyflowError::InjectionFailed(format!("failed to type newline: {}", err))
            })?;
            thread::sleep(Duration::from_millis(15));
        }

        let chars: Vec<char> = line.chars().collect();
        for chunk in chars.chunks(CHUNK_SIZE) {
            let chunk: String = chunk.iter().collect();
            keyboard.text(&chunk).map_err(|err| {
                KeyflowError::InjectionFailed(format!("failed to type text: {}", err))
            })?;
            if chars.len() > CHUNK_SIZE {
                thread::sleep(Duration::from_millis(20));
            }
        }
    }

    Ok(())
}

/// Press the platform paste shortcut.
fn send_paste(keyboard: &mut impl Keyboard) -> Result<()> {
    #[cfg(target_os = "macos")]
    let modifier = Key::Meta;
    #[cfg(not(target_os = "macos"))]
    let modifier = Key::Control;

    let to_err =
        |err: enigo::InputError| KeyflowError::InjectionFailed(format!("failed to paste: {}", err));
    keyboard.key(modifier, Direction::Press).map_err(to_err)?;
    let clicked = keyboard.key(Key::Unicode('v'), Direction::Click);
    // Always release the modifier, even if the click failed
    keyboard.key(modifier, Direction::Release).map_err(to_err)?;
    clicked.map_err(to_err)
}

/// `Injector` backed by `enigo`.
///
/// A fresh controller is created per injection so the injector itself holds
/// no platform handles and can move to the engine thread.
#[derive(Debug, Clone)]
pub struct EnigoInjector {
    mode: InjectionMode,
    key_delay: Duration,
    paste_delay: Duration,
}

impl EnigoInjector {
    pub fn new(config: &EngineConfig) -> Self {
        EnigoInjector {
            mode: config.injection,
            key_delay: config.key_delay(),
            paste_delay: config.paste_delay(),
        }
    }

    fn paste(&self, keyboard: &mut Enigo, text: &str) -> Result<()> {
        let previous = match get_clipboard_text() {
            Ok(previous) => Some(previous),
            Err(err) => {
                warn!("Clipboard read failed; falling back to typing: {}", err);
                return type_text_with_formatting(keyboard, text);
            }
        };

        let pasted = set_clipboard_text(text).and_then(|_| {
            thread::sleep(self.paste_delay);
            match get_clipboard_text() {
                Ok(current) if current == text => Ok(()),
                _ => Err(KeyflowError::Clipboard("clipboard content mismatch".to_string())),
            }
        });

        let result = match pasted {
            Ok(()) => {
                let sent = send_paste(keyboard);
                thread::sleep(self.paste_delay);
                sent
            }
            Err(err) => {
                warn!("Clipboard paste failed; falling back to typing: {}", err);
                type_text_with_formatting(keyboard, text)
            }
        };

        if let Some(previous) = previous {
            if let Err(err) = set_clipboard_text(&previous) {
                debug!("Failed to restore clipboard: {}", err);
            }
        }
        result
    }
}

impl Injector for EnigoInjector {
    fn inject(&mut self, delete_count: usize, text: &str) -> Result<()> {
        let mut keyboard = create_keyboard_controller()?;

        send_backspace(&mut keyboard, delete_count, self.key_delay)?;

        if text.is_empty() {
            return Ok(());
        }

        // Small delay before typing the replacement
        thread::sleep(Duration::from_millis(10));

        match self.mode {
            InjectionMode::Typed => type_text_with_formatting(&mut keyboard, text),
            InjectionMode::Paste => self.paste(&mut keyboard, text),
        }
    }
}
