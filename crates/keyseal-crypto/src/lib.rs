//! keyseal-crypto: password-derived authenticated envelopes
//!
//! Envelope layout (hex text, optionally re-encoded as a whole):
//! ```text
//! HMAC (64) || SALT (512) || IV (32) || CIPHERTEXT (variable)
//!
//! saltAndPepper = SHA1_hex(salt || pepper)
//! derivedKey    = PBKDF2-HMAC-SHA1(key, saltAndPepper, 100000, 32 * bits / 256)
//! ciphertext    = AES-<bits>-CBC(derivedKey, iv, plaintext)
//! hmac          = HMAC-SHA256(hmacKey, ciphertext || saltAndPepper || iv)
//! ```
//!
//! The HMAC is verified in constant time before the cipher is ever invoked.

pub mod envelope;
pub mod util;

pub use envelope::{open, seal, DerivedKey, EnvelopeKeys, Sealed};
pub use util::{
    check_size, constant_time_compare, hash_hex, hmac_sha256_hex, pbkdf2_sha1, random_value,
};

/// Default number of random bytes drawn by [`random_value`] (512 hex chars).
pub const DEFAULT_RANDOM_SIZE: usize = 256;

/// Default cipher width in bits.
pub const DEFAULT_SIZE: u32 = 256;
