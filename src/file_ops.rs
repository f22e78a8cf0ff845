//! Token and document file operations
//!
//! This module persists tokens to files (one token per file, followed by a
//! newline), converts YAML files to token files and back, and rewrites token
//! files in place.

use crate::document;
use crate::error::{ErrorCategory, ErrorKind, Result, SealdocError};
use crate::key::Key;
use crate::token::{self, Freshness};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Write a token to `path`, followed by a newline.
///
/// The file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn write_token_file(path: &Path, token: &str) -> Result<()> {
    let mut contents = String::with_capacity(token.len() + 1);
    contents.push_str(token);
    contents.push('\n');
    write_file_secure(path, contents.as_bytes(), false)?;
    tracing::debug!(path = %path.display(), "wrote token file");
    Ok(())
}

/// Read a token from `path`, without its trailing newline.
pub fn read_token_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| read_error(path, e))?;
    let contents = String::from_utf8(bytes).map_err(|e| {
        SealdocError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::TokenMalformed,
            format!("token file {} is not valid UTF-8", path.display()),
            e,
        )
    })?;
    tracing::debug!(path = %path.display(), "read token file");
    Ok(contents.trim_end_matches(['\n', '\r']).to_string())
}

/// Encrypt a document and write the token to `encrypted_path`.
pub fn document_to_encrypted_file<T: Serialize + ?Sized>(
    key: &Key,
    encrypted_path: &Path,
    document: &T,
) -> Result<()> {
    let token = document::encrypt_document(key, document)
        .map_err(|e| e.with_context("encryption failed"))?;
    write_token_file(encrypted_path, &token)
        .map_err(|e| e.with_context(format!("failed to write to {}", encrypted_path.display())))
}

/// Encrypt the YAML document in `yaml_path` into a token file at `encrypted_path`.
///
/// The input must parse as YAML; the token carries the re-serialized document.
pub fn yaml_file_to_encrypted_file(
    key: &Key,
    yaml_path: &Path,
    encrypted_path: &Path,
) -> Result<()> {
    let document = read_yaml_file(yaml_path)?;
    document_to_encrypted_file(key, encrypted_path, &document)
}

/// Read the token in `encrypted_path` and decrypt it to a document.
pub fn encrypted_file_to_document<T: DeserializeOwned>(
    key: &Key,
    encrypted_path: &Path,
    freshness: &Freshness,
) -> Result<T> {
    let token = read_token_file(encrypted_path)?;
    document::decrypt_document(key, &token, freshness)
        .map_err(|e| e.with_context("failed to decrypt"))
}

/// Decrypt the token file at `encrypted_path` into a YAML file at `yaml_path`.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn encrypted_file_to_yaml_file(
    key: &Key,
    encrypted_path: &Path,
    yaml_path: &Path,
    freshness: &Freshness,
) -> Result<()> {
    let document: serde_yaml::Value = encrypted_file_to_document(key, encrypted_path, freshness)?;
    let yaml = document::to_payload(&document)?;
    write_file_secure(yaml_path, &yaml, false)
        .map_err(|e| e.with_context(format!("failed to write to {}", yaml_path.display())))?;
    tracing::debug!(path = %yaml_path.display(), "wrote decrypted document");
    Ok(())
}

/// Replace the token file at `encrypted_path` with the encrypted contents of `yaml_path`
///
/// This function:
/// 1. Decrypts the existing token to validate the key
/// 2. Reads the new YAML document from `yaml_path`
/// 3. Encrypts it under the validated key
/// 4. Atomically writes to `encrypted_path` (tempfile + fsync + rename)
///
/// The atomic write ensures that either the old file or the new file exists,
/// never a partial/corrupted file.
///
/// The key validation prevents accidentally re-encrypting under a different key.
pub fn update_encrypted_file(key: &Key, yaml_path: &Path, encrypted_path: &Path) -> Result<()> {
    let existing = read_token_file(encrypted_path)?;

    // Validate key by decrypting existing file (discard plaintext)
    token::decrypt(key, &existing, &Freshness::none())
        .map_err(|e| SealdocError::from(e).with_context("failed to decrypt"))?;

    let document = read_yaml_file(yaml_path)?;
    let new_token = document::encrypt_document(key, &document)
        .map_err(|e| e.with_context("failed to encrypt"))?;

    // Great, let's re-write it (atomically).
    let encrypted_dir = match encrypted_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        Some(_) => Path::new("."),
        None => {
            return Err(SealdocError::with_kind(
                ErrorCategory::User,
                ErrorKind::Io,
                "encrypted_path has no parent directory",
            ));
        }
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(encrypted_dir)
        .map_err(|e| io_error("failed to create tempfile", e))?;

    temp_file
        .write_all(new_token.as_bytes())
        .and_then(|()| temp_file.write_all(b"\n"))
        .map_err(|e| io_error("failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| io_error("failed to flush tempfile", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| io_error("failed to sync file prior to rename", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| io_error("failed to set tempfile permissions", e))?;
    }
    temp_file.persist(encrypted_path).map_err(|e| {
        SealdocError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", encrypted_path.display()),
            e,
        )
    })?;
    tracing::debug!(path = %encrypted_path.display(), "replaced token file");
    Ok(())
}

/// Write an encoded key to a new key file, creating parent directories.
///
/// Refuses to overwrite an existing file. The file is created with mode
/// 0o600 on Unix systems.
pub fn write_key_file(path: &Path, key: &Key) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| {
            SealdocError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to create {}", dir.display()),
                e,
            )
        })?;
    }

    let mut contents = key.to_encoded();
    contents.push('\n');
    write_file_secure(path, contents.as_bytes(), true)?;
    tracing::debug!(path = %path.display(), "wrote key file");
    Ok(())
}

fn read_yaml_file(path: &Path) -> Result<serde_yaml::Value> {
    let bytes = fs::read(path).map_err(|e| read_error(path, e))?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "read yaml file");
    document::from_payload(&bytes)
        .map_err(|e| e.with_context(format!("failed to parse {}", path.display())))
}

/// Write file with secure permissions (0o600 on Unix)
///
/// With `create_new`, fails if the file already exists.
fn write_file_secure(path: &Path, contents: &[u8], create_new: bool) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    if create_new {
        options.create_new(true);
    } else {
        options.create(true).truncate(true);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| {
        SealdocError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("failed to open {}", path.display()),
            e,
        )
    })?;

    file.write_all(contents).map_err(|e| {
        SealdocError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to write {}", path.display()),
            e,
        )
    })
}

fn io_error(msg: &str, err: io::Error) -> SealdocError {
    SealdocError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::Io, msg, err)
}

fn read_error(path: &Path, err: io::Error) -> SealdocError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    SealdocError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}
