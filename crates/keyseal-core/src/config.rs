use serde::{Deserialize, Serialize};

use crate::types::Encoding;

/// Top-level configuration (loaded from keyseal.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysealConfig {
    pub envelope: EnvelopeParams,
    pub token: TokenParams,
    pub gate: GateSettings,
    pub log: LogConfig,
}

/// Envelope wire-format tunables.
///
/// Both the sealing and the opening party must hold identical values; any
/// change here breaks compatibility with envelopes produced under the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeParams {
    /// PBKDF2 iteration count (default: 100000)
    pub iterations: u32,
    /// Salt field width in hex characters (default: 512)
    pub salt_length: usize,
    /// IV field width in hex characters (default: 32)
    pub iv_length: usize,
    /// HMAC field width in hex characters (default: 64)
    pub hmac_length: usize,
    /// Derived key length in bytes for AES-256; smaller ciphers scale it down (default: 32)
    pub key_length: usize,
    /// Emit debug events describing each envelope's fields
    pub debug: bool,
}

impl EnvelopeParams {
    /// Length of the fixed-width header preceding the ciphertext.
    pub fn header_len(&self) -> usize {
        self.hmac_length + self.salt_length + self.iv_length
    }
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            iterations: 100_000,
            salt_length: 512,
            iv_length: 32,
            hmac_length: 64,
            key_length: 32,
            debug: false,
        }
    }
}

/// Session token tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenParams {
    /// `iss` claim written and required on redeem
    pub issuer: String,
    /// `sub` claim (default: "apikey")
    pub subject: String,
    /// PBKDF2 iterations for the per-token signing secret (default: 100)
    pub kdf_iterations: u32,
    /// Per-token signing secret length in bytes (default: 16)
    pub secret_length: usize,
}

impl Default for TokenParams {
    fn default() -> Self {
        Self {
            issuer: "https://security.appcelerator.com".into(),
            subject: "apikey".into(),
            kdf_iterations: 100,
            secret_length: 16,
        }
    }
}

/// Request gate settings that can live in a config file.
///
/// The master secret and the handler callbacks are supplied in code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Header carrying the `APIKey <mac> <token>` value (default: authorization)
    pub header: String,
    /// Only paths matching this regex are gated
    pub url_pattern: Option<String>,
    /// Browser callers are redirected here on rejection
    pub redirect: Option<String>,
    /// Query parameter carrying the original URL on redirect (default: redirect)
    pub redirect_url_param: String,
    /// Encoding the token was issued with (default: utf8)
    pub encoding: Encoding,
    /// Reject requests without a valid header (default: true)
    pub required: bool,
    /// Value written into the caller's session after a successful check
    pub use_session: Option<String>,
    /// Session key for `use_session` (default: the header name)
    pub session_key: Option<String>,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            header: "authorization".into(),
            url_pattern: None,
            redirect: None,
            redirect_url_param: "redirect".into(),
            encoding: Encoding::Utf8,
            required: true,
            use_session: None,
            session_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
