//! Direct-message body rules.
//!
//! A `MESG` body is free-form text bounded at [`MAX_BODY_LEN`] characters.
//! Before any rule applies, the raw body is trimmed and embedded carriage
//! returns and newlines are normalized to single spaces, so the length cap
//! always measures what the recipient will actually see on its one line.

use std::fmt;

/// Maximum message body length, in characters, after normalization.
pub const MAX_BODY_LEN: usize = 256;

/// A validated, normalized message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body(String);

/// Why a message body was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BodyError {
    /// Nothing left after trimming.
    #[error("empty message body")]
    Empty,

    /// More than [`MAX_BODY_LEN`] characters after normalization.
    #[error("message body of {0} characters exceeds the {MAX_BODY_LEN} limit")]
    TooLarge(usize),
}

impl Body {
    /// Normalize and validate a raw message body.
    ///
    /// Trims, replaces every `\r` and `\n` with a space, then enforces the
    /// [`MAX_BODY_LEN`] cap on the result.
    ///
    /// # Errors
    ///
    /// Returns [`BodyError::Empty`] if nothing remains after trimming, or
    /// [`BodyError::TooLarge`] if the normalized body exceeds the cap.
    pub fn parse(raw: &str) -> Result<Self, BodyError> {
        let normalized: String =
            raw.trim().chars().map(|c| if c == '\r' || c == '\n' { ' ' } else { c }).collect();

        if normalized.is_empty() {
            return Err(BodyError::Empty);
        }

        let len = normalized.chars().count();
        if len > MAX_BODY_LEN {
            return Err(BodyError::TooLarge(len));
        }

        Ok(Self(normalized))
    }

    /// The normalized body text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
