//! Client identifiers.
//!
//! An identifier is the 8-character handle a client picks during
//! authorization. It is opaque and case-sensitive: `Alice123` and `alice123`
//! are two different peers. The length rule is enforced here, at
//! construction, so the rest of the server never sees an invalid identifier.

use std::fmt;

/// Required identifier length, in characters.
pub const IDENTIFIER_LEN: usize = 8;

/// A validated 8-character client identifier.
///
/// Construct via [`Identifier::parse`]; the inner string is guaranteed to be
/// exactly [`IDENTIFIER_LEN`] characters with no surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

/// Why a candidate identifier was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    /// The candidate was not exactly [`IDENTIFIER_LEN`] characters long.
    #[error("identifier must be exactly {IDENTIFIER_LEN} characters, got {0}")]
    WrongLength(usize),
}

impl Identifier {
    /// Validate a raw token as an identifier.
    ///
    /// The token is trimmed before the length check, matching how `NAME`
    /// arguments arrive off the wire.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::WrongLength`] if the trimmed token is not
    /// exactly [`IDENTIFIER_LEN`] characters.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let trimmed = raw.trim();
        let len = trimmed.chars().count();
        if len != IDENTIFIER_LEN {
            return Err(IdentifierError::WrongLength(len));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
