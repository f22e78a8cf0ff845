//! Symmetric key generation and validation
//!
//! A key is 32 raw bytes, split in two halves:
//! - signing key: bytes 0..16, used for HMAC-SHA256
//! - encryption key: bytes 16..32, used for AES-128-CBC
//!
//! The text form is url-safe base64. Generated keys are written with `=`
//! padding; validation accepts both padded and unpadded input.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use rand::TryRng;
use rand::rngs::SysRng;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{EntropySourceFailure, KeyError};
use crate::token::LENIENT_URL_SAFE;

/// Length of the raw key in bytes
pub const KEY_LEN: usize = 32;

/// Length of each of the signing and encryption halves
const SUBKEY_LEN: usize = KEY_LEN / 2;

/// Key material, wiped from memory on drop.
#[derive(Clone)]
pub struct Key {
    signing: Zeroizing<[u8; SUBKEY_LEN]>,
    encryption: Zeroizing<[u8; SUBKEY_LEN]>,
}

impl Key {
    /// Generate a fresh key from the operating system's secure random source.
    pub fn generate() -> Result<Self, EntropySourceFailure> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        SysRng
            .try_fill_bytes(bytes.as_mut_slice())
            .map_err(EntropySourceFailure)?;
        Ok(Self::from_bytes(*bytes))
    }

    /// Build a key from raw bytes. The argument is wiped once copied.
    pub fn from_bytes(mut bytes: [u8; KEY_LEN]) -> Self {
        let mut signing = Zeroizing::new([0u8; SUBKEY_LEN]);
        let mut encryption = Zeroizing::new([0u8; SUBKEY_LEN]);
        signing.copy_from_slice(&bytes[..SUBKEY_LEN]);
        encryption.copy_from_slice(&bytes[SUBKEY_LEN..]);
        bytes.zeroize();
        Self {
            signing,
            encryption,
        }
    }

    /// Decode and validate a key from its url-safe base64 text form.
    ///
    /// Surrounding ASCII whitespace (such as the trailing newline of a key
    /// file) is ignored.
    pub fn from_encoded(candidate: &[u8]) -> Result<Self, KeyError> {
        let mut raw = Zeroizing::new(Vec::with_capacity(KEY_LEN + 3));
        LENIENT_URL_SAFE
            .decode_vec(candidate.trim_ascii(), &mut raw)
            .map_err(|_| KeyError::Malformed)?;

        let bytes: [u8; KEY_LEN] = raw.as_slice().try_into().map_err(|_| KeyError::Malformed)?;
        Ok(Self::from_bytes(bytes))
    }

    /// The padded url-safe base64 text form of this key.
    pub fn to_encoded(&self) -> Zeroizing<String> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        bytes[..SUBKEY_LEN].copy_from_slice(self.signing.as_slice());
        bytes[SUBKEY_LEN..].copy_from_slice(self.encryption.as_slice());
        Zeroizing::new(URL_SAFE.encode(bytes.as_slice()))
    }

    pub(crate) fn signing_key(&self) -> &[u8; SUBKEY_LEN] {
        &self.signing
    }

    pub(crate) fn encryption_key(&self) -> &[u8; SUBKEY_LEN] {
        &self.encryption
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(<redacted>)")
    }
}

/// Generate a fresh random key.
pub fn generate_key() -> Result<Key, EntropySourceFailure> {
    Key::generate()
}

/// Validate encoded key bytes as they arrive from a terminal, file or other source.
pub fn validate_key(candidate: &[u8]) -> Result<Key, KeyError> {
    Key::from_encoded(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_encodes_to_44_chars() {
        let key = generate_key().unwrap();
        let encoded = key.to_encoded();
        assert_eq!(encoded.len(), 44);
        assert!(encoded.ends_with('='));
    }

    #[test]
    fn test_generated_keys_differ() {
        let k1 = generate_key().unwrap();
        let k2 = generate_key().unwrap();
        assert_ne!(*k1.to_encoded(), *k2.to_encoded());
    }

    #[test]
    fn test_generated_key_validates() {
        let key = generate_key().unwrap();
        let encoded = key.to_encoded();
        let validated = validate_key(encoded.as_bytes()).unwrap();
        assert_eq!(*validated.to_encoded(), *encoded);
    }

    #[test]
    fn test_known_encoding() {
        let bytes: [u8; KEY_LEN] = core::array::from_fn(|i| i as u8);
        let key = Key::from_bytes(bytes);
        assert_eq!(
            key.to_encoded().as_str(),
            "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8="
        );
    }

    #[test]
    fn test_url_safe_alphabet() {
        let key = Key::from_bytes([0xFF; KEY_LEN]);
        assert_eq!(
            key.to_encoded().as_str(),
            "__________________________________________8="
        );
    }

    #[test]
    fn test_subkey_split() {
        let key = validate_key(b"cw_0x689RpI-jtRR7oE8h_eQsKImvJapLeSbXpwF4e4=").unwrap();
        assert_eq!(
            key.signing_key(),
            &[
                0x73, 0x0f, 0xf4, 0xc7, 0xaf, 0x3d, 0x46, 0x92, 0x3e, 0x8e, 0xd4, 0x51, 0xee,
                0x81, 0x3c, 0x87
            ]
        );
        assert_eq!(
            key.encryption_key(),
            &[
                0xf7, 0x90, 0xb0, 0xa2, 0x26, 0xbc, 0x96, 0xa9, 0x2d, 0xe4, 0x9b, 0x5e, 0x9c,
                0x05, 0xe1, 0xee
            ]
        );
    }

    #[test]
    fn test_accepts_unpadded() {
        let key = validate_key(b"AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8").unwrap();
        assert_eq!(key.signing_key()[0], 0);
        assert_eq!(key.encryption_key()[15], 31);
    }

    #[test]
    fn test_accepts_trailing_newline() {
        assert!(validate_key(b"AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=\n").is_ok());
    }

    #[test]
    fn test_rejects_short_key() {
        let encoded = URL_SAFE.encode([7u8; KEY_LEN - 1]);
        assert_eq!(
            validate_key(encoded.as_bytes()).unwrap_err(),
            KeyError::Malformed
        );
    }

    #[test]
    fn test_rejects_long_key() {
        let encoded = URL_SAFE.encode([7u8; KEY_LEN + 1]);
        assert_eq!(
            validate_key(encoded.as_bytes()).unwrap_err(),
            KeyError::Malformed
        );
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(validate_key(b"").unwrap_err(), KeyError::Malformed);
    }

    #[test]
    fn test_rejects_raw_bytes() {
        // 32 raw bytes are not the text form.
        assert_eq!(
            validate_key(&[0x41u8; KEY_LEN]).unwrap_err(),
            KeyError::Malformed
        );
    }

    #[test]
    fn test_rejects_standard_alphabet() {
        let result = validate_key(b"+/////////////////////////////////////////8=");
        assert_eq!(result.unwrap_err(), KeyError::Malformed);
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = Key::from_bytes([0x42; KEY_LEN]);
        let rendered = format!("{:?}", key);
        assert_eq!(rendered, "Key(<redacted>)");
    }
}
