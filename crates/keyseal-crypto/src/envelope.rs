//! Sealed envelopes: PBKDF2-SHA1 key derivation, AES-CBC, HMAC-SHA256
//!
//! Every failure after parameter validation collapses into a single coarse
//! error (`encryption failed` / `decryption failed`) so callers cannot tell
//! which step broke. `InvalidEnvelope` and `TamperedData` are classified
//! before the cipher runs and pass through untouched.

use anyhow::Context;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use keyseal_core::config::EnvelopeParams;
use keyseal_core::{CipherSize, Encoding, SecurityError, SecurityResult};
use rand::RngCore;
use zeroize::Zeroize;

use crate::util::{check_size, constant_time_compare, hash_hex, hmac_sha256_hex, pbkdf2_sha1};

/// The three shared secrets both parties hold.
#[derive(Clone, Copy)]
pub struct EnvelopeKeys<'a> {
    /// PBKDF2 password
    pub key: &'a str,
    /// Mixed into the salt hash
    pub pepper: &'a str,
    /// HMAC-SHA256 key over ciphertext, saltAndPepper and IV
    pub hmac_key: &'a str,
}

impl<'a> EnvelopeKeys<'a> {
    pub fn new(key: &'a str, pepper: &'a str, hmac_key: &'a str) -> Self {
        Self {
            key,
            pepper,
            hmac_key,
        }
    }
}

impl std::fmt::Debug for EnvelopeKeys<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeKeys")
            .field("key", &"[REDACTED]")
            .field("pepper", &"[REDACTED]")
            .field("hmac_key", &"[REDACTED]")
            .finish()
    }
}

/// AES key derived for a single envelope. Zeroized on drop.
#[derive(Clone)]
pub struct DerivedKey {
    bytes: Vec<u8>,
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Result of [`seal`]. `value` is the envelope; the rest is exposed for
/// callers that want to reuse or inspect the material, and is sensitive.
#[derive(Clone)]
pub struct Sealed {
    pub value: String,
    pub derived_key: DerivedKey,
    pub salt_and_pepper: String,
    /// Hex salt as embedded in the envelope
    pub salt: String,
    /// Hex IV as embedded in the envelope
    pub iv: String,
}

impl std::fmt::Debug for Sealed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sealed")
            .field("value", &self.value)
            .field("derived_key", &self.derived_key)
            .field("salt_and_pepper", &"[REDACTED]")
            .field("salt", &self.salt)
            .field("iv", &self.iv)
            .finish()
    }
}

/// Encrypt `plaintext` into an envelope.
///
/// `size` must be 128, 192 or 256. The envelope is hex unless `encoding` says
/// otherwise, in which case the hex bytes are re-encoded as a whole.
pub fn seal(
    plaintext: &str,
    keys: &EnvelopeKeys<'_>,
    size: u32,
    encoding: Encoding,
    params: &EnvelopeParams,
) -> SecurityResult<Sealed> {
    let size = check_size(size)?;
    seal_envelope(plaintext, keys, size, encoding, params).map_err(|e| {
        tracing::debug!(error = %e, cipher = %size, "seal failed");
        SecurityError::EncryptionFailed
    })
}

fn seal_envelope(
    plaintext: &str,
    keys: &EnvelopeKeys<'_>,
    size: CipherSize,
    encoding: Encoding,
    params: &EnvelopeParams,
) -> anyhow::Result<Sealed> {
    let mut rng = rand::thread_rng();

    let mut iv = vec![0u8; params.iv_length / 2];
    rng.fill_bytes(&mut iv);
    let iv_hex = hex::encode(&iv);

    let mut salt = vec![0u8; params.salt_length / 2];
    rng.fill_bytes(&mut salt);
    let salt = hex::encode(&salt);

    let salt_and_pepper = hash_hex(format!("{salt}{}", keys.pepper));
    let derived = pbkdf2_sha1(
        keys.key.as_bytes(),
        salt_and_pepper.as_bytes(),
        params.iterations,
        size.derived_key_len(params.key_length),
    );

    let ciphertext = hex::encode(encrypt_cbc(size, &derived, &iv, plaintext.as_bytes())?);

    let hmac = hmac_sha256_hex(
        keys.hmac_key.as_bytes(),
        &[
            ciphertext.as_bytes(),
            salt_and_pepper.as_bytes(),
            iv_hex.as_bytes(),
        ],
    )?;

    if params.debug {
        tracing::debug!(
            cipher = %size,
            hmac = %hmac,
            salt_len = salt.len(),
            iv = %iv_hex,
            ciphertext_len = ciphertext.len(),
            salt_and_pepper = %salt_and_pepper,
            "sealed envelope"
        );
    }

    let text = format!("{hmac}{salt}{iv_hex}{ciphertext}");
    let value = match encoding {
        Encoding::Hex => text,
        other => other.encode(&hex::decode(&text)?)?,
    };

    Ok(Sealed {
        value,
        derived_key: DerivedKey {
            bytes: derived.to_vec(),
        },
        salt_and_pepper,
        salt,
        iv: iv_hex,
    })
}

/// Verify and decrypt an envelope produced by [`seal`].
///
/// The HMAC is recomputed and compared in constant time before any key
/// derivation or decryption happens.
pub fn open(
    envelope: &str,
    keys: &EnvelopeKeys<'_>,
    size: u32,
    encoding: Encoding,
    params: &EnvelopeParams,
) -> SecurityResult<String> {
    let size = check_size(size)?;

    let text = match encoding {
        Encoding::Hex => envelope.to_string(),
        other => hex::encode(
            other
                .decode(envelope)
                .map_err(|_| SecurityError::InvalidEnvelope)?,
        ),
    };

    if text.len() <= params.header_len() || !text.is_ascii() {
        return Err(SecurityError::InvalidEnvelope);
    }

    open_envelope(&text, keys, size, params).map_err(|e| match e.downcast::<SecurityError>() {
        Ok(classified) => classified,
        Err(other) => {
            tracing::debug!(error = %other, cipher = %size, "open failed");
            SecurityError::DecryptionFailed
        }
    })
}

fn open_envelope(
    text: &str,
    keys: &EnvelopeKeys<'_>,
    size: CipherSize,
    params: &EnvelopeParams,
) -> anyhow::Result<String> {
    let (hmac_value, rest) = text.split_at(params.hmac_length);
    let (salt, rest) = rest.split_at(params.salt_length);
    let (iv, ciphertext) = rest.split_at(params.iv_length);

    let salt_and_pepper = hash_hex(format!("{salt}{}", keys.pepper));
    let hmac = hmac_sha256_hex(
        keys.hmac_key.as_bytes(),
        &[
            ciphertext.as_bytes(),
            salt_and_pepper.as_bytes(),
            iv.as_bytes(),
        ],
    )?;

    if params.debug {
        tracing::debug!(
            cipher = %size,
            hmac = %hmac_value,
            computed = %hmac,
            iv = %iv,
            ciphertext_len = ciphertext.len(),
            salt_and_pepper = %salt_and_pepper,
            "opening envelope"
        );
    }

    if !constant_time_compare(&hmac, hmac_value) {
        tracing::warn!(cipher = %size, "envelope hmac mismatch");
        return Err(SecurityError::TamperedData.into());
    }

    let derived = pbkdf2_sha1(
        keys.key.as_bytes(),
        salt_and_pepper.as_bytes(),
        params.iterations,
        size.derived_key_len(params.key_length),
    );
    let iv = hex::decode(iv).context("decoding iv")?;
    let ciphertext = hex::decode(ciphertext).context("decoding ciphertext")?;

    let plaintext = decrypt_cbc(size, &derived, &iv, &ciphertext)?;
    String::from_utf8(plaintext).context("plaintext is not utf-8")
}

fn encrypt_cbc(size: CipherSize, key: &[u8], iv: &[u8], data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let init = |e: cbc::cipher::InvalidLength| anyhow::anyhow!("{size} init: {e}");
    Ok(match size {
        CipherSize::Aes128 => cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
            .map_err(init)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        CipherSize::Aes192 => cbc::Encryptor::<aes::Aes192>::new_from_slices(key, iv)
            .map_err(init)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        CipherSize::Aes256 => cbc::Encryptor::<aes::Aes256>::new_from_slices(key, iv)
            .map_err(init)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
    })
}

fn decrypt_cbc(size: CipherSize, key: &[u8], iv: &[u8], data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let init = |e: cbc::cipher::InvalidLength| anyhow::anyhow!("{size} init: {e}");
    let unpad = |_: cbc::cipher::block_padding::UnpadError| anyhow::anyhow!("{size}: bad padding");
    match size {
        CipherSize::Aes128 => cbc::Decryptor::<aes::Aes128>::new_from_slices(key, iv)
            .map_err(init)?
            .decrypt_padded_vec_mut::<Pkcs7>(data)
            .map_err(unpad),
        CipherSize::Aes192 => cbc::Decryptor::<aes::Aes192>::new_from_slices(key, iv)
            .map_err(init)?
            .decrypt_padded_vec_mut::<Pkcs7>(data)
            .map_err(unpad),
        CipherSize::Aes256 => cbc::Decryptor::<aes::Aes256>::new_from_slices(key, iv)
            .map_err(init)?
            .decrypt_padded_vec_mut::<Pkcs7>(data)
            .map_err(unpad),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::random_value;
    use crate::DEFAULT_RANDOM_SIZE;
    use proptest::prelude::*;

    // Fast KDF for everything that isn't checking the default parameters.
    fn fast() -> EnvelopeParams {
        EnvelopeParams {
            iterations: 10,
            ..EnvelopeParams::default()
        }
    }

    fn random_secret() -> String {
        random_value(DEFAULT_RANDOM_SIZE, Encoding::Hex).unwrap()
    }

    fn flip_hex(c: char) -> char {
        if c == '0' {
            '1'
        } else {
            '0'
        }
    }

    #[test]
    fn test_seal_open_default_params_base64() {
        let params = EnvelopeParams::default();
        let keys = EnvelopeKeys::new("key", "pepper", "hmacKey");

        let sealed = seal("ABC", &keys, 256, Encoding::Base64, &params).unwrap();
        assert!(sealed.value.ends_with('='));

        let opened = open(&sealed.value, &keys, 256, Encoding::Base64, &params).unwrap();
        assert_eq!(opened, "ABC");
    }

    #[test]
    fn test_sealed_fields() {
        let (key, pepper, hmac_key) = (random_secret(), random_secret(), random_secret());
        let keys = EnvelopeKeys::new(&key, &pepper, &hmac_key);
        let sealed = seal("ABC", &keys, 256, Encoding::Hex, &fast()).unwrap();

        assert_eq!(sealed.salt.len(), 512);
        assert_eq!(sealed.iv.len(), 32);
        assert_eq!(sealed.salt_and_pepper.len(), 40);
        assert_eq!(sealed.derived_key.len(), 32);
        assert_eq!(&sealed.value[64..576], sealed.salt);
        assert_eq!(&sealed.value[576..608], sealed.iv);
        // one AES block of ciphertext for a 3-byte plaintext
        assert_eq!(sealed.value.len(), 608 + 32);
        let debug = format!("{:?}", sealed.derived_key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(&hex::encode(sealed.derived_key.as_bytes())));
    }

    #[test]
    fn test_sealed_debug_redacts_key_material() {
        let keys = EnvelopeKeys::new("key", "pepper", "hmacKey");
        let sealed = seal("ABC", &keys, 256, Encoding::Hex, &fast()).unwrap();

        let debug = format!("{sealed:?}");
        assert!(debug.contains(&sealed.value));
        assert!(!debug.contains(&sealed.salt_and_pepper));
        assert!(!debug.contains(&hex::encode(sealed.derived_key.as_bytes())));
    }

    #[test]
    fn test_hex_is_default_wire_format() {
        let keys = EnvelopeKeys::new("123", "123", "123");
        let sealed = seal("ABC", &keys, 256, Encoding::Hex, &fast()).unwrap();
        assert!(sealed.value.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(open(&sealed.value, &keys, 256, Encoding::Hex, &fast()).unwrap(), "ABC");
    }

    #[test]
    fn test_every_cipher_size_roundtrips() {
        let (key, pepper, hmac_key) = (random_secret(), random_secret(), random_secret());
        let keys = EnvelopeKeys::new(&key, &pepper, &hmac_key);
        for size in [128, 192, 256] {
            let sealed = seal("ABC", &keys, size, Encoding::Base64, &fast()).unwrap();
            assert_eq!(sealed.derived_key.len(), size as usize / 8);
            let opened = open(&sealed.value, &keys, size, Encoding::Base64, &fast()).unwrap();
            assert_eq!(opened, "ABC");
        }
    }

    #[test]
    fn test_size_mismatch_fails_to_decrypt() {
        let keys = EnvelopeKeys::new("key", "pepper", "hmacKey");
        let sealed = seal("a secret message", &keys, 128, Encoding::Hex, &fast()).unwrap();
        let err = open(&sealed.value, &keys, 256, Encoding::Hex, &fast()).unwrap_err();
        assert_eq!(err, SecurityError::DecryptionFailed);
    }

    #[test]
    fn test_invalid_size() {
        let keys = EnvelopeKeys::new("key", "pepper", "hmacKey");
        for size in [64, 674] {
            let err = seal("ABC", &keys, size, Encoding::Hex, &fast()).unwrap_err();
            assert_eq!(err.to_string(), format!("invalid algorithm size: {size}"));
            let err = open("ABC", &keys, size, Encoding::Hex, &fast()).unwrap_err();
            assert!(matches!(err, SecurityError::InvalidParameter(_)));
        }
    }

    #[test]
    fn test_short_secrets_are_fine() {
        let keys = EnvelopeKeys::new("123", "123", "123");
        assert!(seal("ABC", &keys, 256, Encoding::Hex, &fast()).is_ok());
    }

    #[test]
    fn test_unrepresentable_output_encoding() {
        let keys = EnvelopeKeys::new("key", "pepper", "hmacKey");
        let err = seal("ABC", &keys, 256, Encoding::Utf8, &fast()).unwrap_err();
        assert_eq!(err, SecurityError::EncryptionFailed);
        assert_eq!(err.to_string(), "encryption failed");
    }

    #[test]
    fn test_cipher_failure_is_opaque() {
        let keys = EnvelopeKeys::new("key", "pepper", "hmacKey");
        let params = EnvelopeParams {
            iv_length: 30,
            ..fast()
        };
        let err = seal("ABC", &keys, 256, Encoding::Hex, &params).unwrap_err();
        assert_eq!(err, SecurityError::EncryptionFailed);
    }

    #[test]
    fn test_short_envelope_rejected_before_kdf() {
        // Would never finish if the KDF ran.
        let params = EnvelopeParams {
            iterations: u32::MAX,
            ..EnvelopeParams::default()
        };
        let keys = EnvelopeKeys::new("key", "pepper", "hmacKey");
        let err = open("123", &keys, 256, Encoding::Hex, &params).unwrap_err();
        assert_eq!(err, SecurityError::InvalidEnvelope);
        assert_eq!(err.to_string(), "invalid encrypted data");

        let header_only = "0".repeat(params.header_len());
        let err = open(&header_only, &keys, 256, Encoding::Hex, &params).unwrap_err();
        assert_eq!(err, SecurityError::InvalidEnvelope);
    }

    #[test]
    fn test_undecodable_input_is_invalid_envelope() {
        let keys = EnvelopeKeys::new("key", "pepper", "hmacKey");
        let err = open("!!not base64!!", &keys, 256, Encoding::Base64, &fast()).unwrap_err();
        assert_eq!(err, SecurityError::InvalidEnvelope);
    }

    #[test]
    fn test_wrong_key() {
        let (key, pepper, hmac_key) = (random_secret(), random_secret(), random_secret());
        let sealed = seal(
            "ABC",
            &EnvelopeKeys::new(&key, &pepper, &hmac_key),
            256,
            Encoding::Hex,
            &fast(),
        )
        .unwrap();

        let wrong = EnvelopeKeys::new("123", &pepper, &hmac_key);
        let err = open(&sealed.value, &wrong, 256, Encoding::Hex, &fast()).unwrap_err();
        assert_eq!(err, SecurityError::DecryptionFailed);
        assert_eq!(err.to_string(), "decryption failed");
    }

    #[test]
    fn test_wrong_pepper() {
        let (key, pepper, hmac_key) = (random_secret(), random_secret(), random_secret());
        let sealed = seal(
            "ABC",
            &EnvelopeKeys::new(&key, &pepper, &hmac_key),
            256,
            Encoding::Hex,
            &fast(),
        )
        .unwrap();

        let wrong = EnvelopeKeys::new(&key, "123", &hmac_key);
        let err = open(&sealed.value, &wrong, 256, Encoding::Hex, &fast()).unwrap_err();
        assert_eq!(err, SecurityError::TamperedData);
    }

    #[test]
    fn test_wrong_hmac_key() {
        let (key, pepper, hmac_key) = (random_secret(), random_secret(), random_secret());
        let sealed = seal(
            "ABC",
            &EnvelopeKeys::new(&key, &pepper, &hmac_key),
            256,
            Encoding::Hex,
            &fast(),
        )
        .unwrap();

        let wrong = EnvelopeKeys::new(&key, &pepper, "123");
        let err = open(&sealed.value, &wrong, 256, Encoding::Hex, &fast()).unwrap_err();
        assert_eq!(err, SecurityError::TamperedData);
        assert_eq!(err.to_string(), "encrypted data has been tampered with");
    }

    #[test]
    fn test_appended_ciphertext_is_tampering() {
        let keys = EnvelopeKeys::new("key", "pepper", "hmacKey");
        let sealed = seal("ABC", &keys, 256, Encoding::Hex, &fast()).unwrap();
        let err = open(&format!("{}1", sealed.value), &keys, 256, Encoding::Hex, &fast())
            .unwrap_err();
        assert_eq!(err, SecurityError::TamperedData);
    }

    #[test]
    fn test_shifted_hmac_is_tampering() {
        let keys = EnvelopeKeys::new("key", "pepper", "hmacKey");
        let sealed = seal("ABC", &keys, 256, Encoding::Hex, &fast()).unwrap();
        let (hmac, remainder) = sealed.value.split_at(64);

        let truncated = format!("{}{remainder}", &hmac[..62]);
        let err = open(&truncated, &keys, 256, Encoding::Hex, &fast()).unwrap_err();
        assert_eq!(err, SecurityError::TamperedData);

        let padded = format!("{hmac}abc{remainder}");
        let err = open(&padded, &keys, 256, Encoding::Hex, &fast()).unwrap_err();
        assert_eq!(err, SecurityError::TamperedData);
    }

    #[test]
    fn test_non_ascii_envelope_rejected() {
        let keys = EnvelopeKeys::new("key", "pepper", "hmacKey");
        let sealed = seal("ABC", &keys, 256, Encoding::Hex, &fast()).unwrap();
        let garbled = format!("é{}", &sealed.value[2..]);
        let err = open(&garbled, &keys, 256, Encoding::Hex, &fast()).unwrap_err();
        assert_eq!(err, SecurityError::InvalidEnvelope);
    }

    #[test]
    fn test_every_hmac_position_detects_tampering() {
        let keys = EnvelopeKeys::new("key", "pepper", "hmacKey");
        let sealed = seal("ABC", &keys, 256, Encoding::Hex, &fast()).unwrap();

        for i in 0..64 {
            let mut chars: Vec<char> = sealed.value.chars().collect();
            chars[i] = flip_hex(chars[i]);
            let tampered: String = chars.into_iter().collect();
            let err = open(&tampered, &keys, 256, Encoding::Hex, &fast()).unwrap_err();
            assert_eq!(err, SecurityError::TamperedData, "position {i}");
        }
    }

    #[test]
    fn test_ciphertext_is_fresh_per_seal() {
        let keys = EnvelopeKeys::new("key", "pepper", "hmacKey");
        let a = seal("ABC", &keys, 256, Encoding::Hex, &fast()).unwrap();
        let b = seal("ABC", &keys, 256, Encoding::Hex, &fast()).unwrap();
        assert_ne!(a.value, b.value);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn roundtrip_any_plaintext(plaintext in any::<String>(), size in prop_oneof![Just(128u32), Just(192u32), Just(256u32)]) {
            let keys = EnvelopeKeys::new("key", "pepper", "hmacKey");
            let sealed = seal(&plaintext, &keys, size, Encoding::Base64Url, &fast()).unwrap();
            let opened = open(&sealed.value, &keys, size, Encoding::Base64Url, &fast()).unwrap();
            prop_assert_eq!(opened, plaintext);
        }
    }
}
