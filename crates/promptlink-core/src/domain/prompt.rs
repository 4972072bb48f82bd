//! Prompt text validation.

use thiserror::Error;

/// Maximum prompt length, counted in Unicode scalar values after trimming.
pub const MAX_PROMPT_CHARS: usize = 1000;

/// Why a prompt was rejected.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("prompt is empty")]
    Empty,
    #[error("prompt exceeds {MAX_PROMPT_CHARS} characters ({0})")]
    TooLong(usize),
}

/// Trims `raw` and checks it is between 1 and [`MAX_PROMPT_CHARS`] characters.
///
/// Returns the trimmed text, which is what gets relayed.
pub fn validate_prompt(raw: &str) -> Result<&str, PromptError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PromptError::Empty);
    }
    let chars = trimmed.chars().count();
    if chars > MAX_PROMPT_CHARS {
        return Err(PromptError::TooLong(chars));
    }
    Ok(trimmed)
}
