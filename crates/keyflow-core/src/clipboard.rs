use crate::error::{KeyflowError, Result};
use arboard::Clipboard;

/// Get the current clipboard content as text
pub fn get_clipboard_text() -> Result<String> {
    let mut clipboard = Clipboard::new().map_err(|e| KeyflowError::Clipboard(e.to_string()))?;
    clipboard
        .get_text()
        .map_err(|e| KeyflowError::Clipboard(e.to_string()))
}

/// Set the clipboard content as text
pub fn set_clipboard_text(text: &str) -> Result<()> {
    let mut clipboard = Clipboard::new().map_err(|e| KeyflowError::Clipboard(e.to_string()))?;
    clipboard
        .set_text(text)
        .map_err(|e| KeyflowError::Clipboard(e.to_string()))
}

/// Source of the text captured when quick-add is invoked.
pub trait SelectionSource: Send + Sync {
    fn read_current_selection_or_clipboard(&self) -> Option<String>;
}

/// Reads the system clipboard through `arboard`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl SelectionSource for SystemClipboard {
    fn read_current_selection_or_clipboard(&self) -> Option<String> {
        get_clipboard_text()
            .ok()
            .filter(|text| !text.trim().is_empty())
    }
}
