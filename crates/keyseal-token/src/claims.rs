use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller-supplied metadata carried in a token's `headers` claim.
pub type Metadata = Map<String, Value>;

/// Claim name of the bound key secret inside `headers`.
pub const KEY_SECRET_CLAIM: &str = "$ks";

/// The `headers` claim: the bound key secret plus caller metadata.
///
/// `$ks` is always present once a token is minted; it is the per-caller
/// secret behind both the token's signing secret and the request MAC.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimHeaders {
    #[serde(rename = "$ks")]
    pub key_secret: String,
    #[serde(flatten)]
    pub metadata: Metadata,
}

impl std::fmt::Debug for ClaimHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimHeaders")
            .field("key_secret", &"[REDACTED]")
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Verified session token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub apikey: String,
    pub headers: ClaimHeaders,
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn key_secret(&self) -> &str {
        &self.headers.key_secret
    }

    /// Look up one metadata entry by name.
    pub fn metadata(&self, name: &str) -> Option<&Value> {
        self.headers.metadata.get(name)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}
