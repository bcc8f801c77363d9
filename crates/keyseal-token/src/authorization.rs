//! The `APIKey <mac> <token>` authorization header

use std::sync::LazyLock;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use keyseal_core::{Encoding, SecurityError, SecurityResult};
use keyseal_crypto::{constant_time_compare, hmac_sha256_hex};
use regex::Regex;
use serde_json::Value;

use crate::claims::{Claims, KEY_SECRET_CLAIM};
use crate::jws::{self, JwsError};
use crate::session::SessionTokens;

pub const DEFAULT_HEADER: &str = "authorization";
pub const SCHEME: &str = "APIKey";

static AUTHORIZATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^APIKey\s([A-Za-z0-9_]+)\s([A-Za-z0-9_.=-]+)$").expect("authorization regex")
});

/// Render the header value for `token`.
///
/// The MAC is keyed with the `$ks` claim read from the token without
/// verifying it; the server recomputes it after redeeming the token.
pub fn build_authorization_header(token: &str) -> SecurityResult<String> {
    let claims = jws::decode(token)?;
    let key_secret = claims
        .get("headers")
        .and_then(|headers| headers.get(KEY_SECRET_CLAIM))
        .and_then(Value::as_str)
        .ok_or(JwsError::Malformed)?;

    let mac = hmac_sha256_hex(key_secret.as_bytes(), &[token.as_bytes()])?;
    Ok(format!("{SCHEME} {mac} {token}"))
}

/// Build the header value for `token` and set it on `headers` under `name`.
pub fn apply_authorization_header(
    headers: &mut HeaderMap,
    name: &str,
    token: &str,
) -> SecurityResult<String> {
    let value = build_authorization_header(token)?;
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| SecurityError::InvalidParameter(format!("invalid header name: {name}")))?;
    let header_value = HeaderValue::from_str(&value)
        .map_err(|_| SecurityError::InvalidParameter("invalid header value".into()))?;
    headers.insert(name, header_value);
    Ok(value)
}

/// Parse a header value, redeem its token and check the MAC against `$ks`.
pub fn validate_authorization_header(
    tokens: &SessionTokens,
    value: Option<&str>,
    encoding: Encoding,
) -> SecurityResult<Claims> {
    let value = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SecurityError::unauthorized("missing authorization"))?;
    let captures = AUTHORIZATION
        .captures(value)
        .ok_or_else(|| SecurityError::unauthorized("invalid authorization"))?;
    let (presented, token) = (&captures[1], &captures[2]);

    let claims = tokens.redeem(token, encoding)?;

    let expected = hmac_sha256_hex(claims.key_secret().as_bytes(), &[token.as_bytes()])?;
    if !constant_time_compare(presented, &expected) {
        tracing::warn!(apikey = %claims.apikey, "authorization mac mismatch");
        return Err(SecurityError::unauthorized("invalid authorization"));
    }
    Ok(claims)
}
