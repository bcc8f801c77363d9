//! keyseal-token: API-key session tokens
//!
//! A session token is a compact HS256 JWS whose signing secret is bound to
//! the triple (apikey, key secret, master secret):
//! ```text
//! tokenSecret = base64(PBKDF2-HMAC-SHA1(apikey, SHA1_hex(apikey || keySecret || masterSecret), 100, 16))
//! ```
//! The key secret rides inside the claims as `headers.$ks`, so the server only
//! needs the master secret to verify. Callers then present the token as
//! `Authorization: APIKey <HMAC-SHA256($ks, token)> <token>`.

pub mod authorization;
pub mod claims;
pub mod jws;
pub mod session;

pub use authorization::{
    apply_authorization_header, build_authorization_header, validate_authorization_header,
    DEFAULT_HEADER,
};
pub use claims::{ClaimHeaders, Claims, Metadata};
pub use session::SessionTokens;
