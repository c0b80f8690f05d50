//! Burrow CLI — `burrow` command.
//!
//! Inspect and edit a store root from the shell: read and write records,
//! list keys under a prefix, migrate plaintext data to encrypted envelopes,
//! and dump lock diagnostics.
//!
//! Keys are given slash-separated: `burrow get sessions/abc`.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use burrow::{StorageKey, Store, StoreConfig};

// ── Directory helpers ─────────────────────────────────────────────────────────

/// Default store root: `$BURROW_DIR`, else `~/.burrow`.
fn default_root() -> PathBuf {
    if let Ok(dir) = std::env::var("BURROW_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").expect("HOME not set");
    PathBuf::from(home).join(".burrow")
}

/// Parse a slash-separated key argument into a validated `StorageKey`.
fn parse_key(raw: &str) -> Result<StorageKey> {
    StorageKey::new(raw.split('/'))
        .with_context(|| format!("invalid key {raw:?}"))
}

/// Parse a slash-separated prefix (may be empty) into segments.
fn parse_prefix(raw: Option<&str>) -> Vec<String> {
    match raw {
        None | Some("") => Vec::new(),
        Some(raw) => raw.split('/').map(ToString::to_string).collect(),
    }
}

// ── CLI structure ─────────────────────────────────────────────────────────────

/// Burrow — transactional, tamper-evident record store.
#[derive(Parser)]
#[command(name = "burrow", version, about)]
struct Cli {
    /// Store root directory (defaults to $BURROW_DIR, then ~/.burrow).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the record at a key.
    Get {
        /// Slash-separated key, e.g. sessions/abc.
        key: String,
    },
    /// Write a record at a key.
    Set {
        /// Slash-separated key, e.g. sessions/abc.
        key: String,
        /// JSON value; reads stdin when omitted.
        value: Option<String>,
    },
    /// Remove the record at a key (succeeds if already absent).
    Rm {
        /// Slash-separated key, e.g. sessions/abc.
        key: String,
    },
    /// List keys under a prefix.
    List {
        /// Slash-separated prefix; lists everything when omitted.
        prefix: Option<String>,
    },
    /// Re-encrypt all plaintext records (requires a master key).
    Migrate,
    /// Show lock diagnostics for contended resources.
    Locks,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let root = cli.root.unwrap_or_else(default_root);
    let store = Store::open(StoreConfig::new(&root))
        .with_context(|| format!("failed to open store at {}", root.display()))?;

    match cli.command {
        Command::Get { key } => {
            let key = parse_key(&key)?;
            match store.read::<serde_json::Value>(&key)? {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => return Err(anyhow!("not found: {key}")),
            }
        }
        Command::Set { key, value } => {
            let key = parse_key(&key)?;
            let raw = match value {
                Some(raw) => raw,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read value from stdin")?;
                    buf
                }
            };
            let value: serde_json::Value =
                serde_json::from_str(raw.trim()).context("value is not valid JSON")?;
            store.write(&key, &value)?;
            log::info!("wrote {key}");
        }
        Command::Rm { key } => {
            let key = parse_key(&key)?;
            store.remove(&key)?;
        }
        Command::List { prefix } => {
            let prefix = parse_prefix(prefix.as_deref());
            for key in store.list(prefix)? {
                println!("{}", key?);
            }
        }
        Command::Migrate => {
            let migrated = store.migrate_to_encrypted()?;
            println!("migrated {migrated} record(s)");
        }
        Command::Locks => {
            let snapshot = store.lock_diagnostics();
            if snapshot.is_empty() {
                println!(
                    "no contended resources at {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
                );
            }
            for diag in snapshot {
                println!("{diag}");
            }
        }
    }

    Ok(())
}
