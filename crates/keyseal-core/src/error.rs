use chrono::{DateTime, Utc};
use thiserror::Error;

pub type SecurityResult<T> = Result<T, SecurityError>;

/// Every failure surfaced by keyseal.
///
/// Lower-level primitive errors (cipher, KDF, codec) are never carried inside
/// these variants; they are collapsed into one of the coarse kinds below so a
/// message cannot reveal which internal step failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("{0}")]
    InvalidParameter(String),

    #[error("invalid encrypted data")]
    InvalidEnvelope,

    #[error("encrypted data has been tampered with")]
    TamperedData,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("{message}")]
    InvalidToken {
        message: String,
        /// Set when the token was well formed and correctly signed but past its expiry.
        expired_at: Option<DateTime<Utc>>,
    },

    #[error("{0}")]
    Unauthorized(String),
}

impl SecurityError {
    pub fn invalid_size(bits: u32) -> Self {
        Self::InvalidParameter(format!("invalid algorithm size: {bits}"))
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
            expired_at: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn expired_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::InvalidToken { expired_at, .. } => *expired_at,
            _ => None,
        }
    }

    /// HTTP status a server should answer with for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidToken { .. } | Self::Unauthorized(_) => 401,
            Self::InvalidParameter(_) | Self::InvalidEnvelope | Self::TamperedData => 400,
            Self::EncryptionFailed | Self::DecryptionFailed => 500,
        }
    }
}
