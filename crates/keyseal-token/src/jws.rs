//! Compact HS256 JSON Web Signatures
//!
//! ```text
//! base64url(header) . base64url(payload) . base64url(HMAC-SHA256(secret, header.payload))
//! ```
//! `iat`/`exp` are whole seconds since the Unix epoch.
//!
//! Only the compact serialization with `alg: HS256` is supported. [`verify`]
//! checks the signature, `exp` and `iss`; other registered claims such as
//! `nbf` and `aud` are carried through unchecked.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "HS256";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JwsError {
    #[error("jwt malformed")]
    Malformed,

    #[error("invalid algorithm")]
    InvalidAlgorithm,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("jwt expired")]
    Expired { expired_at: DateTime<Utc> },

    #[error("jwt issuer invalid. expected: {expected}")]
    InvalidIssuer { expected: String },

    #[error("secret or public key must be provided")]
    InvalidSecret,
}

#[derive(Debug, Clone)]
pub struct SignOptions<'a> {
    pub issuer: &'a str,
    pub subject: &'a str,
    pub expires_in_ms: u64,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VerifyOptions<'a> {
    pub issuer: &'a str,
    pub now: DateTime<Utc>,
}

/// Sign `payload`, stamping `iat`, `exp`, `iss` and `sub` over whatever it carries.
pub fn sign(
    mut payload: Map<String, Value>,
    secret: &[u8],
    options: &SignOptions<'_>,
) -> Result<String, JwsError> {
    let iat = options.now.timestamp();
    let exp = iat.saturating_add((options.expires_in_ms / 1000) as i64);
    payload.insert("iat".into(), iat.into());
    payload.insert("exp".into(), exp.into());
    payload.insert("iss".into(), options.issuer.into());
    payload.insert("sub".into(), options.subject.into());

    let header = json!({ "alg": ALGORITHM, "typ": "JWT" });
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(Value::Object(payload).to_string())
    );
    let signature = URL_SAFE_NO_PAD.encode(mac(secret, &signing_input)?.finalize().into_bytes());
    Ok(format!("{signing_input}.{signature}"))
}

/// Parse the payload without checking the signature.
pub fn decode(token: &str) -> Result<Map<String, Value>, JwsError> {
    let (_, payload, _) = split(token)?;
    decode_object(payload)
}

/// Check structure, algorithm, signature, expiry and issuer, in that order.
pub fn verify(
    token: &str,
    secret: &[u8],
    options: &VerifyOptions<'_>,
) -> Result<Map<String, Value>, JwsError> {
    let (header, payload, signature) = split(token)?;

    let alg = decode_object(header)?
        .get("alg")
        .and_then(Value::as_str)
        .map(str::to_owned);
    if alg.as_deref() != Some(ALGORITHM) {
        return Err(JwsError::InvalidAlgorithm);
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| JwsError::InvalidSignature)?;
    let signing_input = &token[..header.len() + 1 + payload.len()];
    mac(secret, signing_input)?
        .verify_slice(&signature)
        .map_err(|_| JwsError::InvalidSignature)?;

    let claims = decode_object(payload)?;

    if let Some(exp) = claims.get("exp") {
        let exp = exp.as_i64().ok_or(JwsError::Malformed)?;
        if options.now.timestamp() >= exp {
            let expired_at = DateTime::from_timestamp(exp, 0).ok_or(JwsError::Malformed)?;
            return Err(JwsError::Expired { expired_at });
        }
    }

    if claims.get("iss").and_then(Value::as_str) != Some(options.issuer) {
        return Err(JwsError::InvalidIssuer {
            expected: options.issuer.to_string(),
        });
    }

    Ok(claims)
}

fn mac(secret: &[u8], signing_input: &str) -> Result<HmacSha256, JwsError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| JwsError::InvalidSecret)?;
    mac.update(signing_input.as_bytes());
    Ok(mac)
}

fn split(token: &str) -> Result<(&str, &str, &str), JwsError> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() => Ok((h, p, s)),
        _ => Err(JwsError::Malformed),
    }
}

fn decode_object(segment: &str) -> Result<Map<String, Value>, JwsError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| JwsError::Malformed)?;
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(JwsError::Malformed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const ISSUER: &str = "https://issuer.example.com";

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn options(expires_in_ms: u64) -> SignOptions<'static> {
        SignOptions {
            issuer: ISSUER,
            subject: "apikey",
            expires_in_ms,
            now: now(),
        }
    }

    fn verify_at(when: DateTime<Utc>) -> VerifyOptions<'static> {
        VerifyOptions {
            issuer: ISSUER,
            now: when,
        }
    }

    fn payload() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("apikey".into(), "123".into());
        map
    }

    #[test]
    fn test_sign_verify() {
        let token = sign(payload(), b"secret", &options(10_000)).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = verify(&token, b"secret", &verify_at(now())).unwrap();
        assert_eq!(claims["apikey"], "123");
        assert_eq!(claims["iss"], ISSUER);
        assert_eq!(claims["sub"], "apikey");
        assert_eq!(claims["iat"], 1_700_000_000i64);
        assert_eq!(claims["exp"], 1_700_000_010i64);
    }

    #[test]
    fn test_nbf_and_aud_are_not_enforced() {
        let mut map = payload();
        map.insert("nbf".into(), (now().timestamp() + 3600).into());
        map.insert("aud".into(), "someone-else".into());
        let token = sign(map, b"secret", &options(10_000)).unwrap();

        let claims = verify(&token, b"secret", &verify_at(now())).unwrap();
        assert_eq!(claims["aud"], "someone-else");
        assert_eq!(claims["nbf"], now().timestamp() + 3600);
    }

    #[test]
    fn test_exp_floors_milliseconds() {
        let token = sign(payload(), b"secret", &options(1_999)).unwrap();
        assert_eq!(decode(&token).unwrap()["exp"], 1_700_000_001i64);
    }

    #[test]
    fn test_header_is_hs256() {
        let token = sign(payload(), b"secret", &options(1000)).unwrap();
        let header = decode_object(token.split('.').next().unwrap()).unwrap();
        assert_eq!(header["alg"], "HS256");
        assert_eq!(header["typ"], "JWT");
    }

    #[test]
    fn test_wrong_secret() {
        let token = sign(payload(), b"secret", &options(10_000)).unwrap();
        let err = verify(&token, b"other", &verify_at(now())).unwrap_err();
        assert_eq!(err, JwsError::InvalidSignature);
        assert_eq!(err.to_string(), "invalid signature");
    }

    #[test]
    fn test_tampered_payload() {
        let token = sign(payload(), b"secret", &options(10_000)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let mut forged = payload();
        forged.insert("apikey".into(), "999".into());
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            URL_SAFE_NO_PAD.encode(Value::Object(forged).to_string()),
            parts[2]
        );
        assert_eq!(
            verify(&forged, b"secret", &verify_at(now())).unwrap_err(),
            JwsError::InvalidSignature
        );
    }

    #[test]
    fn test_expired() {
        let token = sign(payload(), b"secret", &options(10_000)).unwrap();
        let later = now() + Duration::seconds(10);
        match verify(&token, b"secret", &verify_at(later)).unwrap_err() {
            JwsError::Expired { expired_at } => {
                assert_eq!(expired_at.timestamp(), 1_700_000_010);
            }
            other => panic!("expected expiry, got {other:?}"),
        }
        assert!(verify(&token, b"secret", &verify_at(later - Duration::seconds(1))).is_ok());
    }

    #[test]
    fn test_wrong_issuer() {
        let token = sign(payload(), b"secret", &options(10_000)).unwrap();
        let opts = VerifyOptions {
            issuer: "https://elsewhere.example.com",
            now: now(),
        };
        let err = verify(&token, b"secret", &opts).unwrap_err();
        assert_eq!(
            err.to_string(),
            "jwt issuer invalid. expected: https://elsewhere.example.com"
        );
    }

    #[test]
    fn test_unsupported_algorithm() {
        let token = sign(payload(), b"secret", &options(10_000)).unwrap();
        let rest = token.split_once('.').unwrap().1;
        let none = format!(
            "{}.{rest}",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#)
        );
        assert_eq!(
            verify(&none, b"secret", &verify_at(now())).unwrap_err(),
            JwsError::InvalidAlgorithm
        );
    }

    #[test]
    fn test_malformed() {
        for bad in ["", "abc", "a.b", "a.b.c.d", "!!.??.xx", ".."] {
            assert_eq!(
                verify(bad, b"secret", &verify_at(now())).unwrap_err(),
                JwsError::Malformed,
                "{bad:?}"
            );
            assert_eq!(decode(bad).unwrap_err(), JwsError::Malformed, "{bad:?}");
        }
    }
}
