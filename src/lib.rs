//! Sealdoc - Authenticated symmetric encryption of YAML documents
//!
//! Documents are serialized to YAML and sealed into URL-safe tokens
//! (AES-128-CBC with an HMAC-SHA256 tag) under a 32-byte shared key.

#![forbid(unsafe_code)]

pub mod document;
pub mod error;
pub mod file_ops;
pub mod key;
pub mod keysource;
pub mod token;

pub use document::{decrypt_document, encrypt_document};
pub use error::{EntropySourceFailure, KeyError, Result, SealdocError, TokenError};
pub use key::{KEY_LEN, Key, generate_key, validate_key};
pub use token::{Freshness, decrypt, encrypt};
