use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{SecurityError, SecurityResult};

/// Text encoding applied to envelopes and tokens on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Hex,
    Base64,
    #[serde(alias = "base64-url")]
    Base64Url,
    #[serde(alias = "utf-8")]
    Utf8,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Hex => "hex",
            Encoding::Base64 => "base64",
            Encoding::Base64Url => "base64url",
            Encoding::Utf8 => "utf8",
        }
    }

    /// Render raw bytes as text. `Utf8` only accepts bytes that already are UTF-8.
    pub fn encode(&self, bytes: &[u8]) -> SecurityResult<String> {
        match self {
            Encoding::Hex => Ok(hex::encode(bytes)),
            Encoding::Base64 => Ok(STANDARD.encode(bytes)),
            Encoding::Base64Url => Ok(URL_SAFE_NO_PAD.encode(bytes)),
            Encoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|_| SecurityError::InvalidParameter("data is not valid utf8".into())),
        }
    }

    pub fn decode(&self, text: &str) -> SecurityResult<Vec<u8>> {
        let invalid = || SecurityError::InvalidParameter(format!("invalid {self} data"));
        match self {
            Encoding::Hex => hex::decode(text).map_err(|_| invalid()),
            Encoding::Base64 => STANDARD.decode(text).map_err(|_| invalid()),
            Encoding::Base64Url => URL_SAFE_NO_PAD.decode(text).map_err(|_| invalid()),
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(Encoding::Hex),
            "base64" => Ok(Encoding::Base64),
            "base64url" | "base64-url" => Ok(Encoding::Base64Url),
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            _ => Err(SecurityError::InvalidParameter(format!(
                "unknown encoding: {s}"
            ))),
        }
    }
}

/// AES key size. Only the three standard widths exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CipherSize {
    Aes128,
    Aes192,
    #[default]
    Aes256,
}

impl CipherSize {
    pub fn bits(&self) -> u32 {
        match self {
            CipherSize::Aes128 => 128,
            CipherSize::Aes192 => 192,
            CipherSize::Aes256 => 256,
        }
    }

    /// Derived key length: `key_length / (256 / bits)`.
    pub fn derived_key_len(&self, key_length: usize) -> usize {
        key_length * self.bits() as usize / 256
    }
}

impl TryFrom<u32> for CipherSize {
    type Error = SecurityError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            128 => Ok(CipherSize::Aes128),
            192 => Ok(CipherSize::Aes192),
            256 => Ok(CipherSize::Aes256),
            other => Err(SecurityError::invalid_size(other)),
        }
    }
}

impl fmt::Display for CipherSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AES-{}-CBC", self.bits())
    }
}
