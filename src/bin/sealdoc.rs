//! Sealdoc CLI - Encrypted YAML documents
//!
//! Command-line interface for sealing YAML files into URL-safe tokens
//! (AES-128-CBC + HMAC-SHA256) under a shared 32-byte key, and back.

use clap::{Parser, Subcommand};
use std::error::Error as _;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use sealdoc::error::{ErrorCategory, ErrorKind, Result, SealdocError};
use sealdoc::file_ops;
use sealdoc::keysource::{self, FileKeySource, KeySource, ReaderKeySource, TerminalKeySource};
use sealdoc::{Freshness, Key};

#[derive(Parser)]
#[command(name = "sealdoc")]
#[command(version)]
#[command(about = "Authenticated encryption of YAML documents.", long_about = None)]
struct Cli {
    /// Read the key from stdin instead of from terminal
    #[arg(long, global = true, conflicts_with = "key_file")]
    key_stdin: bool,

    /// Read the key from a key file (~/.config/sealdoc/key when no path is given)
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        num_args = 0..=1,
        require_equals = true
    )]
    key_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new random key
    #[command(alias = "g")]
    GenerateKey {
        /// Path to a new key file to write the key to, instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Encrypt a YAML file
    #[command(alias = "e")]
    Encrypt {
        /// Path to the YAML file to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the file to write the token to
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Decrypt a token file into YAML
    #[command(alias = "d")]
    Decrypt {
        /// Path to the file containing the token
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the file to write the YAML document to
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Reject tokens issued more than this many seconds ago
        #[arg(long, value_name = "SECONDS")]
        max_age: Option<u64>,
    },

    /// Update a token file with a new YAML document, while validating
    /// that the key is not accidentally changed.
    #[command(alias = "u")]
    Update {
        /// Path to the YAML file to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the existing token file to replace
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = match &cli.command {
        Commands::GenerateKey { output } => generate_key(output.as_deref()),
        Commands::Encrypt { input, output } => read_key(&cli)
            .and_then(|key| file_ops::yaml_file_to_encrypted_file(&key, input, output)),
        Commands::Decrypt {
            input,
            output,
            max_age,
        } => {
            let freshness = match max_age {
                Some(secs) => Freshness::max_age(Duration::from_secs(*secs)),
                None => Freshness::none(),
            };
            read_key(&cli).and_then(|key| {
                file_ops::encrypted_file_to_yaml_file(&key, input, output, &freshness)
            })
        }
        Commands::Update { input, output } => read_key(&cli)
            .and_then(|key| file_ops::update_encrypted_file(&key, input, output)),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", report(&e));
        process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal());

    tracing_subscriber::registry().with(layer).with(filter).init();
}

fn generate_key(output: Option<&std::path::Path>) -> Result<()> {
    let key = Key::generate()?;
    match output {
        Some(path) => {
            let path = keysource::expand_home(path)?;
            file_ops::write_key_file(&path, &key)
        }
        None => {
            let mut encoded = key.to_encoded();
            encoded.push('\n');
            io::stdout().write_all(encoded.as_bytes()).map_err(|e| {
                SealdocError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to write key to stdout",
                    e,
                )
            })
        }
    }
}

fn read_key(cli: &Cli) -> Result<Key> {
    let mut source = key_source(cli)?;
    source.read_key()
}

fn key_source(cli: &Cli) -> Result<Box<dyn KeySource>> {
    if cli.key_stdin {
        tracing::debug!("reading key from stdin");
        return Ok(Box::new(ReaderKeySource::new(Box::new(io::stdin()))));
    }

    match &cli.key_file {
        Some(Some(path)) => {
            let path = keysource::expand_home(path)?;
            tracing::debug!(path = %path.display(), "reading key from file");
            Ok(Box::new(FileKeySource::new(path)))
        }
        Some(None) => {
            let source = FileKeySource::default_location()?;
            tracing::debug!(path = %source.path().display(), "reading key from default file");
            Ok(Box::new(source))
        }
        None => {
            tracing::debug!("reading key from terminal");
            Ok(Box::new(TerminalKeySource::new()))
        }
    }
}

/// The error message followed by each cause not already part of it.
fn report(err: &SealdocError) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !msg.contains(&cause_msg) {
            msg.push_str(": ");
            msg.push_str(&cause_msg);
        }
        source = cause.source();
    }
    msg
}
