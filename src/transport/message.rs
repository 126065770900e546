//! Raw frames exchanged with a transport.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{from_slice, from_str, to_string};

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Longest text prefix shown when a frame is logged.
const LOG_PREVIEW_CHARS: usize = 256;

// ============================================================================
// RawMessage
// ============================================================================

/// An opaque frame. The session never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl RawMessage {
    /// Creates a text frame.
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Creates a binary frame.
    #[inline]
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::Binary(data.into())
    }

    /// Serializes `value` into a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Text(to_string(value)?))
    }

    /// Parses the frame body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the body is not valid
    /// JSON for `T`.
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T> {
        let value = match self {
            Self::Text(text) => from_str(text)?,
            Self::Binary(data) => from_slice(data)?,
        };
        Ok(value)
    }

    /// Returns the text body, if this is a text frame.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Returns the body length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Returns `true` if the body is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => match text.char_indices().nth(LOG_PREVIEW_CHARS) {
                Some((cut, _)) => write!(f, "{}… ({} bytes)", &text[..cut], text.len()),
                None => f.write_str(text),
            },
            Self::Binary(data) => write!(f, "<{} bytes>", data.len()),
        }
    }
}

impl From<String> for RawMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RawMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for RawMessage {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}

// ============================================================================
// Tests
// ============================================================================
