use std::borrow::Cow;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A wrapper around `bytes::Bytes` providing utility methods for common operations
/// on request bodies.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct HttpStubBytes(pub Bytes);

impl HttpStubBytes {
    /// Converts the bytes to a `Vec<u8>`.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Cheaply clones the bytes into a new `Bytes` instance.
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    /// Checks if the byte slice is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks if the byte slice contains the specified substring.
    pub fn contains_str(&self, substring: &str) -> bool {
        if substring.is_empty() {
            return true;
        }

        self.0
            .as_ref()
            .windows(substring.as_bytes().len())
            .any(|window| window == substring.as_bytes())
    }

    /// Converts the bytes to a UTF-8 string, potentially lossy.
    /// Tries to parse input as a UTF-8 string first to avoid copying and creating an
    /// owned instance. If the bytes are not valid UTF-8, it creates a lossy string by
    /// replacing invalid characters with the Unicode replacement character.
    pub fn to_maybe_lossy_str(&self) -> Cow<str> {
        match std::str::from_utf8(&self.0) {
            Ok(valid_str) => Cow::Borrowed(valid_str),
            Err(_) => Cow::Owned(String::from_utf8_lossy(&self.0).to_string()),
        }
    }
}

impl From<Bytes> for HttpStubBytes {
    fn from(value: Bytes) -> Self {
        HttpStubBytes(value)
    }
}

impl From<Vec<u8>> for HttpStubBytes {
    fn from(value: Vec<u8>) -> Self {
        HttpStubBytes(Bytes::from(value))
    }
}

impl From<String> for HttpStubBytes {
    fn from(value: String) -> Self {
        HttpStubBytes(Bytes::from(value))
    }
}

impl From<&str> for HttpStubBytes {
    fn from(value: &str) -> Self {
        HttpStubBytes(Bytes::from(value.to_string()))
    }
}

impl PartialEq for HttpStubBytes {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl AsRef<[u8]> for HttpStubBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl std::fmt::Display for HttpStubBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_maybe_lossy_str())
    }
}
