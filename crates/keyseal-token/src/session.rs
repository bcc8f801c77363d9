//! Session token issuance and redemption

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use keyseal_core::config::TokenParams;
use keyseal_core::{Encoding, SecurityError, SecurityResult};
use keyseal_crypto::{hash_hex, pbkdf2_sha1};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::claims::{Claims, Metadata, KEY_SECRET_CLAIM};
use crate::jws::{self, JwsError, SignOptions, VerifyOptions};

impl From<JwsError> for SecurityError {
    fn from(e: JwsError) -> Self {
        let message = e.to_string().replace("jwt", "token");
        let expired_at = match e {
            JwsError::Expired { expired_at } => Some(expired_at),
            _ => None,
        };
        SecurityError::InvalidToken {
            message,
            expired_at,
        }
    }
}

/// Issues and redeems session tokens under one master secret.
#[derive(Debug)]
pub struct SessionTokens {
    master_secret: SecretString,
    params: TokenParams,
}

impl SessionTokens {
    pub fn new(master_secret: SecretString, params: TokenParams) -> Self {
        Self {
            master_secret,
            params,
        }
    }

    pub fn params(&self) -> &TokenParams {
        &self.params
    }

    /// Mint a token for `apikey` that expires `ttl_ms` from now.
    ///
    /// `metadata` is carried in the `headers` claim next to `$ks`; a caller
    /// supplied `$ks` entry is overwritten by `key_secret`.
    pub fn issue(
        &self,
        apikey: &str,
        key_secret: &str,
        ttl_ms: u64,
        metadata: Metadata,
        encoding: Encoding,
    ) -> SecurityResult<String> {
        self.issue_at(apikey, key_secret, ttl_ms, metadata, encoding, Utc::now())
    }

    pub fn issue_at(
        &self,
        apikey: &str,
        key_secret: &str,
        ttl_ms: u64,
        mut metadata: Metadata,
        encoding: Encoding,
        now: DateTime<Utc>,
    ) -> SecurityResult<String> {
        metadata.insert(KEY_SECRET_CLAIM.into(), key_secret.into());

        let mut payload = Map::new();
        payload.insert("apikey".into(), apikey.into());
        payload.insert("headers".into(), Value::Object(metadata));

        let secret = self.token_secret(apikey, key_secret);
        let token = jws::sign(
            payload,
            secret.as_bytes(),
            &SignOptions {
                issuer: &self.params.issuer,
                subject: &self.params.subject,
                expires_in_ms: ttl_ms,
                now,
            },
        )
        .map_err(|e| SecurityError::InvalidParameter(e.to_string()))?;

        tracing::debug!(apikey, ttl_ms, %encoding, "issued session token");
        encoding.encode(token.as_bytes())
    }

    /// Verify a token and return its claims.
    ///
    /// The unverified claims are read first to learn `apikey` and `$ks`, which
    /// together with the master secret recreate the signing secret.
    pub fn redeem(&self, token: &str, encoding: Encoding) -> SecurityResult<Claims> {
        self.redeem_at(token, encoding, Utc::now())
    }

    pub fn redeem_at(
        &self,
        token: &str,
        encoding: Encoding,
        now: DateTime<Utc>,
    ) -> SecurityResult<Claims> {
        self.verify_token(token, encoding, now)
            .inspect(|claims| tracing::debug!(apikey = %claims.apikey, "session token redeemed"))
            .inspect_err(|e| tracing::warn!(error = %e, "session token rejected"))
    }

    fn verify_token(
        &self,
        token: &str,
        encoding: Encoding,
        now: DateTime<Utc>,
    ) -> SecurityResult<Claims> {
        let malformed = || SecurityError::from(JwsError::Malformed);

        let text = encoding
            .decode(token)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(malformed)?;

        let unverified = jws::decode(&text)?;
        let apikey = unverified
            .get("apikey")
            .and_then(Value::as_str)
            .ok_or_else(malformed)?;
        let key_secret = unverified
            .get("headers")
            .and_then(|headers| headers.get(KEY_SECRET_CLAIM))
            .and_then(Value::as_str)
            .ok_or_else(malformed)?;

        let secret = self.token_secret(apikey, key_secret);
        let verified = jws::verify(
            &text,
            secret.as_bytes(),
            &VerifyOptions {
                issuer: &self.params.issuer,
                now,
            },
        )?;

        serde_json::from_value(Value::Object(verified)).map_err(|_| malformed())
    }

    /// `base64(PBKDF2-HMAC-SHA1(apikey, SHA1_hex(apikey || key_secret || master), n, len))`
    fn token_secret(&self, apikey: &str, key_secret: &str) -> Zeroizing<String> {
        let salt_input = Zeroizing::new(format!(
            "{apikey}{key_secret}{}",
            self.master_secret.expose_secret()
        ));
        let derived = pbkdf2_sha1(
            apikey.as_bytes(),
            hash_hex(salt_input.as_bytes()).as_bytes(),
            self.params.kdf_iterations,
            self.params.secret_length,
        );
        Zeroizing::new(STANDARD.encode(derived.as_slice()))
    }
}
