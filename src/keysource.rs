//! Key acquisition from terminals, readers and key files

use crate::error::{ErrorCategory, ErrorKind, Result, SealdocError};
use crate::key::{Key, validate_key};
use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Location of the key file relative to the home directory.
const DEFAULT_KEY_PATH: &str = ".config/sealdoc/key";

/// Trait for obtaining a key from various sources
pub trait KeySource {
    /// Read encoded key material and validate it.
    fn read_key(&mut self) -> Result<Key>;
}

/// Returns a fixed key (for testing)
pub struct ConstantKeySource {
    encoded: Zeroizing<Vec<u8>>,
}

impl ConstantKeySource {
    pub fn new(encoded: Vec<u8>) -> Self {
        Self {
            encoded: Zeroizing::new(encoded),
        }
    }
}

impl KeySource for ConstantKeySource {
    fn read_key(&mut self) -> Result<Key> {
        Ok(validate_key(&self.encoded)?)
    }
}

/// Reads the encoded key from any io::Read source
pub struct ReaderKeySource {
    reader: Box<dyn Read>,
}

impl ReaderKeySource {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl KeySource for ReaderKeySource {
    fn read_key(&mut self) -> Result<Key> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            SealdocError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("error reading key: {}", e),
                e,
            )
        })?;
        tracing::debug!(bytes = data.len(), "read key from reader");
        Ok(validate_key(&data)?)
    }
}

/// Reads the key from terminal with no echo
pub struct TerminalKeySource {
    prompt: String,
}

impl TerminalKeySource {
    pub fn new() -> Self {
        Self {
            prompt: "enter key: ".to_string(),
        }
    }

    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

impl Default for TerminalKeySource {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySource for TerminalKeySource {
    fn read_key(&mut self) -> Result<Key> {
        if !io::stdin().is_terminal() {
            return Err(SealdocError::with_kind(
                ErrorCategory::User,
                ErrorKind::KeyUnavailable,
                "cannot read key from terminal - stdin is not a terminal",
            ));
        }

        io::stderr()
            .write_all(self.prompt.as_bytes())
            .and_then(|()| io::stderr().flush())
            .map_err(|e| {
                SealdocError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    format!("failed to write prompt: {}", e),
                    e,
                )
            })?;

        // Read key *without echo*
        let encoded = rpassword::read_password().map_err(|e| {
            SealdocError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::KeyUnavailable,
                format!("failure reading key: {}", e),
                e,
            )
        })?;
        let encoded = Zeroizing::new(encoded);

        Ok(validate_key(encoded.as_bytes())?)
    }
}

/// Reads the key from a key file, one encoded key optionally followed by a newline.
pub struct FileKeySource {
    path: PathBuf,
}

impl FileKeySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Key file at `~/.config/sealdoc/key`.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(default_key_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeySource for FileKeySource {
    fn read_key(&mut self) -> Result<Key> {
        let contents = fs::read(&self.path).map_err(|e| {
            let category = if e.kind() == io::ErrorKind::NotFound {
                ErrorCategory::User
            } else {
                ErrorCategory::Internal
            };
            SealdocError::with_kind_and_source(
                category,
                ErrorKind::KeyUnavailable,
                format!("failed to read key file {}", self.path.display()),
                e,
            )
        })?;
        let contents = Zeroizing::new(contents);
        tracing::debug!(path = %self.path.display(), "read key file");

        #[cfg(unix)]
        warn_if_readable_by_others(&self.path);

        validate_key(&contents).map_err(|e| {
            SealdocError::from(e).with_context(format!("invalid key in {}", self.path.display()))
        })
    }
}

#[cfg(unix)]
fn warn_if_readable_by_others(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(metadata) = fs::metadata(path) {
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            tracing::warn!(
                path = %path.display(),
                mode = %format_args!("{:o}", mode & 0o777),
                "key file is accessible by other users"
            );
        }
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => Ok(home_dir()?.join(rest)),
        Err(_) => Ok(path.to_path_buf()),
    }
}

/// `~/.config/sealdoc/key`, resolved against `$HOME`.
pub fn default_key_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(DEFAULT_KEY_PATH))
}

fn home_dir() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| {
            SealdocError::with_kind(
                ErrorCategory::User,
                ErrorKind::KeyUnavailable,
                "cannot locate home directory - HOME is not set",
            )
        })
}

/// Wraps another KeySource and caches the result
///
/// Provides "at most once" semantics - the upstream source is called
/// only on the first invocation, and subsequent calls return the cached key.
pub struct CachingKeySource {
    upstream: Box<dyn KeySource>,
    cached: Option<Key>,
}

impl CachingKeySource {
    pub fn new(upstream: Box<dyn KeySource>) -> Self {
        Self {
            upstream,
            cached: None,
        }
    }
}

impl KeySource for CachingKeySource {
    fn read_key(&mut self) -> Result<Key> {
        if let Some(key) = &self.cached {
            return Ok(key.clone());
        }
        let key = self.upstream.read_key()?;
        self.cached = Some(key.clone());
        Ok(key)
    }
}
