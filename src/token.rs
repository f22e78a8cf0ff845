//! Authenticated encryption of byte payloads into url-safe tokens
//!
//! This module implements the token scheme using:
//! - AES-128-CBC with PKCS#7 padding under the key's encryption half
//! - HMAC-SHA256 under the key's signing half, over everything before the tag
//!
//! The binary format is:
//! - version: 1 byte (0x80)
//! - timestamp: 8 bytes (big-endian u64, seconds since the Unix epoch)
//! - iv: 16 bytes
//! - ciphertext: variable length (a positive multiple of 16 bytes)
//! - tag: 32 bytes
//!
//! The whole structure is encoded as url-safe base64 without padding. This
//! layout is the one used by Fernet, so tokens from other Fernet
//! implementations (which pad their base64) decrypt as well.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aes::Aes128;
use base64::Engine;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::digest::Key as MacKey;
use hmac::{Hmac, Mac};
use rand::TryRng;
use rand::rngs::SysRng;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{EntropySourceFailure, TokenError};
use crate::key::Key;

type HmacSha256 = Hmac<Sha256>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Version marker in the first byte of every token
const VERSION: u8 = 0x80;

/// Length of the big-endian timestamp in bytes
const TIMESTAMP_LEN: usize = 8;

/// Length of the CBC initialization vector in bytes
pub const IV_LEN: usize = 16;

/// AES block size in bytes
const BLOCK_LEN: usize = 16;

/// Length of the HMAC-SHA256 tag in bytes
const TAG_LEN: usize = 32;

/// version + timestamp + iv
const HEADER_LEN: usize = 1 + TIMESTAMP_LEN + IV_LEN;

/// Default tolerance for tokens stamped slightly in the future.
pub const DEFAULT_MAX_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Url-safe base64 that accepts input with or without `=` padding.
pub(crate) const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Age policy applied when decrypting.
///
/// Without a `max_age` no timestamp checks happen at all. With one, a token
/// is rejected as [`TokenError::Expired`] when it is older than `max_age`, or
/// stamped more than `max_clock_skew` in the future. Both limits have whole
/// second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub max_age: Option<Duration>,
    pub max_clock_skew: Duration,
}

impl Freshness {
    /// Accept tokens of any age.
    pub const fn none() -> Self {
        Self {
            max_age: None,
            max_clock_skew: DEFAULT_MAX_CLOCK_SKEW,
        }
    }

    /// Reject tokens older than `max_age`.
    pub const fn max_age(max_age: Duration) -> Self {
        Self {
            max_age: Some(max_age),
            max_clock_skew: DEFAULT_MAX_CLOCK_SKEW,
        }
    }

    pub const fn with_max_clock_skew(self, max_clock_skew: Duration) -> Self {
        Self {
            max_age: self.max_age,
            max_clock_skew,
        }
    }

    fn check(&self, timestamp: u64, now: u64) -> Result<(), TokenError> {
        let Some(max_age) = self.max_age else {
            return Ok(());
        };
        if timestamp.saturating_add(max_age.as_secs()) < now {
            return Err(TokenError::Expired);
        }
        if now.saturating_add(self.max_clock_skew.as_secs()) < timestamp {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}

impl Default for Freshness {
    fn default() -> Self {
        Self::none()
    }
}

/// Encrypt a payload under `key`, stamped with the current time and a random IV.
pub fn encrypt(key: &Key, payload: &[u8]) -> Result<String, EntropySourceFailure> {
    let mut iv = [0u8; IV_LEN];
    SysRng
        .try_fill_bytes(&mut iv)
        .map_err(EntropySourceFailure)?;

    Ok(encrypt_at_time(key, payload, unix_now(), &iv))
}

/// Encrypt a payload with a caller-provided timestamp and IV.
///
/// Exists to produce deterministic output for tests and interop vectors.
/// Reusing an IV under the same key leaks whether payloads share a prefix;
/// use [`encrypt`] for anything real.
pub fn encrypt_at_time(key: &Key, payload: &[u8], timestamp: u64, iv: &[u8; IV_LEN]) -> String {
    let ciphertext = Aes128CbcEnc::new(key.encryption_key().into(), iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(payload);

    let mut body = Vec::with_capacity(HEADER_LEN + ciphertext.len() + TAG_LEN);
    body.push(VERSION);
    body.extend_from_slice(&timestamp.to_be_bytes());
    body.extend_from_slice(iv);
    body.extend_from_slice(&ciphertext);

    let mut mac = signer(key);
    mac.update(&body);
    body.extend_from_slice(&mac.finalize().into_bytes());

    URL_SAFE_NO_PAD.encode(body)
}

/// Verify and decrypt a token produced by [`encrypt`].
///
/// Nothing is decrypted unless the tag verifies. A wrong key and a tampered
/// token both yield [`TokenError::InvalidSignature`].
pub fn decrypt(
    key: &Key,
    token: impl AsRef<[u8]>,
    freshness: &Freshness,
) -> Result<Vec<u8>, TokenError> {
    decrypt_at_time(key, token, freshness, unix_now())
}

/// Like [`decrypt`], judging freshness against `now` (seconds since the epoch).
pub fn decrypt_at_time(
    key: &Key,
    token: impl AsRef<[u8]>,
    freshness: &Freshness,
    now: u64,
) -> Result<Vec<u8>, TokenError> {
    let data = decode(token.as_ref())?;
    let parts = Parts::parse(&data)?;
    parts.verify(key)?;
    freshness.check(parts.timestamp, now)?;

    // Padding errors after a valid tag are reported like a bad tag so the
    // two cannot be told apart.
    Aes128CbcDec::new(key.encryption_key().into(), parts.iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(parts.ciphertext)
        .map_err(|_| TokenError::InvalidSignature)
}

/// Timestamp embedded in a token, after verifying its signature.
pub fn extract_timestamp(key: &Key, token: impl AsRef<[u8]>) -> Result<u64, TokenError> {
    let data = decode(token.as_ref())?;
    let parts = Parts::parse(&data)?;
    parts.verify(key)?;
    Ok(parts.timestamp)
}

struct Parts<'a> {
    timestamp: u64,
    iv: &'a [u8; IV_LEN],
    ciphertext: &'a [u8],
    signed: &'a [u8],
    tag: &'a [u8],
}

impl<'a> Parts<'a> {
    fn parse(data: &'a [u8]) -> Result<Self, TokenError> {
        let Some((&version, rest)) = data.split_first() else {
            return Err(TokenError::Malformed);
        };
        if version != VERSION {
            return Err(TokenError::Malformed);
        }

        // Smallest valid ciphertext is one block of padding.
        if data.len() < HEADER_LEN + BLOCK_LEN + TAG_LEN {
            return Err(TokenError::Malformed);
        }

        let (timestamp, rest) = rest.split_at(TIMESTAMP_LEN);
        let timestamp: [u8; TIMESTAMP_LEN] =
            timestamp.try_into().map_err(|_| TokenError::Malformed)?;
        let timestamp = u64::from_be_bytes(timestamp);

        let (iv, rest) = rest.split_at(IV_LEN);
        let iv: &[u8; IV_LEN] = iv.try_into().map_err(|_| TokenError::Malformed)?;

        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(TokenError::Malformed);
        }

        Ok(Self {
            timestamp,
            iv,
            ciphertext,
            signed: &data[..data.len() - TAG_LEN],
            tag,
        })
    }

    fn verify(&self, key: &Key) -> Result<(), TokenError> {
        let mut mac = signer(key);
        mac.update(self.signed);
        // verify_slice compares in constant time.
        mac.verify_slice(self.tag).map_err(|_| TokenError::InvalidSignature)
    }
}

fn decode(token: &[u8]) -> Result<Vec<u8>, TokenError> {
    LENIENT_URL_SAFE
        .decode(token)
        .map_err(|_| TokenError::Malformed)
}

/// HMAC-SHA256 keyed with the signing half of `key`.
fn signer(key: &Key) -> HmacSha256 {
    // HMAC zero-pads keys shorter than the hash block size, so padding the
    // 16-byte signing key up front gives the same MAC through the infallible
    // constructor.
    let mut block = MacKey::<HmacSha256>::default();
    block[..key.signing_key().len()].copy_from_slice(key.signing_key());
    let mac = <HmacSha256 as Mac>::new(&block);
    block.as_mut_slice().zeroize();
    mac
}

fn unix_now() -> u64 {
    // A clock set before 1970 stamps tokens with zero rather than failing.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
