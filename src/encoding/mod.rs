//! Input fragments and text encodings.
//!
//! Upload inputs may yield raw bytes or text. Text fragments are converted to
//! bytes with the scheduler's configured [`TextEncoding`] as they arrive.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

use crate::error::{Result, TransferError};

/// Encoding applied to text input fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextEncoding {
    /// UTF-8 (the string's own bytes).
    #[default]
    Utf8,
    /// 7-bit ASCII; code points above `0x7F` are rejected.
    Ascii,
    /// ISO-8859-1; code points above `0xFF` are rejected.
    Latin1,
    /// UTF-16, little endian, no byte order mark.
    Utf16Le,
    /// Standard base64 alphabet with padding.
    Base64,
    /// Hexadecimal pairs.
    Hex,
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Latin1 => "latin1",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Base64 => "base64",
            TextEncoding::Hex => "hex",
        };
        f.write_str(name)
    }
}

impl TextEncoding {
    /// Converts `text` to bytes.
    pub fn encode(self, text: &str) -> Result<Bytes> {
        match self {
            TextEncoding::Utf8 => Ok(Bytes::copy_from_slice(text.as_bytes())),
            TextEncoding::Ascii => self.narrow(text, 0x7F),
            TextEncoding::Latin1 => self.narrow(text, 0xFF),
            TextEncoding::Utf16Le => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
                Ok(Bytes::from(out))
            }
            TextEncoding::Base64 => STANDARD
                .decode(text)
                .map(Bytes::from)
                .map_err(|e| self.error(e.to_string())),
            TextEncoding::Hex => hex::decode(text)
                .map(Bytes::from)
                .map_err(|e| self.error(e.to_string())),
        }
    }

    fn narrow(self, text: &str, max: u32) -> Result<Bytes> {
        let mut out = Vec::with_capacity(text.len());
        for c in text.chars() {
            let code = c as u32;
            if code > max {
                return Err(self.error(format!("character {c:?} (U+{code:04X}) is out of range")));
            }
            out.push(code as u8);
        }
        Ok(Bytes::from(out))
    }

    fn error(self, reason: String) -> TransferError {
        TransferError::Encoding {
            encoding: self,
            reason,
        }
    }
}

/// One piece of input delivered by an upload source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Raw bytes, used as-is.
    Bytes(Bytes),
    /// Text, converted with the configured [`TextEncoding`].
    Text(String),
}

impl Fragment {
    /// Converts the fragment to bytes.
    pub fn into_bytes(self, encoding: TextEncoding) -> Result<Bytes> {
        match self {
            Fragment::Bytes(b) => Ok(b),
            Fragment::Text(s) => encoding.encode(&s),
        }
    }
}

impl From<Bytes> for Fragment {
    fn from(b: Bytes) -> Self {
        Fragment::Bytes(b)
    }
}

impl From<bytes::BytesMut> for Fragment {
    fn from(b: bytes::BytesMut) -> Self {
        Fragment::Bytes(b.freeze())
    }
}

impl From<Vec<u8>> for Fragment {
    fn from(v: Vec<u8>) -> Self {
        Fragment::Bytes(Bytes::from(v))
    }
}

impl From<&'static [u8]> for Fragment {
    fn from(s: &'static [u8]) -> Self {
        Fragment::Bytes(Bytes::from_static(s))
    }
}

impl From<String> for Fragment {
    fn from(s: String) -> Self {
        Fragment::Text(s)
    }
}

impl From<&str> for Fragment {
    fn from(s: &str) -> Self {
        Fragment::Text(s.to_owned())
    }
}
