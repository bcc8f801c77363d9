//! Leaf primitives shared by the envelope codec and the token protocol

use hmac::{Hmac, Mac};
use keyseal_core::{CipherSize, Encoding, SecurityError, SecurityResult};
use rand::RngCore;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// SHA-1 hex digest. Only used to mix salts, never for integrity.
pub fn hash_hex(value: impl AsRef<[u8]>) -> String {
    hex::encode(Sha1::digest(value.as_ref()))
}

/// Compare two strings without an early exit on the first differing byte.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// `size` CSPRNG bytes rendered in `encoding`.
pub fn random_value(size: usize, encoding: Encoding) -> SecurityResult<String> {
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    encoding.encode(&bytes)
}

/// Accept exactly 128, 192 or 256.
pub fn check_size(bits: u32) -> SecurityResult<CipherSize> {
    CipherSize::try_from(bits)
}

/// HMAC-SHA256 over the concatenation of `parts`, hex encoded.
pub fn hmac_sha256_hex(key: &[u8], parts: &[&[u8]]) -> SecurityResult<String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|_| SecurityError::InvalidParameter("invalid hmac key".into()))?;
    for part in parts {
        mac.update(part);
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// PBKDF2-HMAC-SHA1 producing `len` bytes. The buffer is wiped on drop.
pub fn pbkdf2_sha1(password: &[u8], salt: &[u8], rounds: u32, len: usize) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(vec![0u8; len]);
    pbkdf2::pbkdf2_hmac::<Sha1>(password, salt, rounds, &mut out);
    out
}
