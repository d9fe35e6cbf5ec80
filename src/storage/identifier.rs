//! Identifier validation
//!
//! Identifiers become file name stems, so only a conservative character set
//! is accepted. Nothing is percent-decoded: `%` is outside the allow-list.

use std::fmt;
use thiserror::Error;

/// Longest identifier accepted, in bytes
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Reasons an identifier is refused
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier exceeds {max} bytes", max = MAX_IDENTIFIER_LEN)]
    TooLong,
    #[error("identifier contains invalid character '{0}'")]
    InvalidChar(char),
    #[error("identifier '{0}' is reserved")]
    Reserved(String),
}

/// A validated record identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        if raw.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if raw.len() > MAX_IDENTIFIER_LEN {
            return Err(IdentifierError::TooLong);
        }
        if let Some(c) = raw.chars().find(|c| !is_allowed(*c)) {
            return Err(IdentifierError::InvalidChar(c));
        }
        if raw == "." || raw == ".." {
            return Err(IdentifierError::Reserved(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name the record is stored under
    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}
