// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 TapHub

//! Persisted session state.
//!
//! Three records survive a restart: the last-known user, the last-used
//! connection string, and the last-selected network. They live as plain
//! files under one directory; writes go through a temp file and an atomic
//! rename so a crash never leaves a half-written record.
//!
//! ```text
//! <root>/
//!   taphub_user.json          # WalletUser
//!   taphub_nwc_credentials    # raw connection string
//!   taphub_network            # network name
//! ```

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::models::WalletUser;
use crate::network::NetworkName;

const USER_FILE: &str = "taphub_user.json";
const CREDENTIALS_FILE: &str = "taphub_nwc_credentials";
const NETWORK_FILE: &str = "taphub_network";

/// Error type for session storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// File-backed store for the session's persisted records.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Open (and create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== User ==========

    /// Last-known user identity, if any. A corrupt record reads as absent.
    pub fn load_user(&self) -> Option<WalletUser> {
        self.read_json(USER_FILE)
    }

    pub fn save_user(&self, user: &WalletUser) -> StorageResult<()> {
        self.write_json(USER_FILE, user)
    }

    // ========== Credentials ==========

    /// Last-used connection string, if any.
    pub fn load_credentials(&self) -> Option<String> {
        match fs::read_to_string(self.root.join(CREDENTIALS_FILE)) {
            Ok(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    pub fn save_credentials(&self, credentials: &str) -> StorageResult<()> {
        self.write_atomic(CREDENTIALS_FILE, credentials.as_bytes())
    }

    // ========== Network ==========

    /// Last-selected network; regtest when never set.
    pub fn load_network(&self) -> NetworkName {
        match fs::read_to_string(self.root.join(NETWORK_FILE)) {
            Ok(s) => NetworkName::parse_or_default(s.trim()),
            Err(_) => NetworkName::Regtest,
        }
    }

    pub fn save_network(&self, network: NetworkName) -> StorageResult<()> {
        self.write_atomic(NETWORK_FILE, network.as_str().as_bytes())
    }

    // ========== Logout ==========

    /// Erase user and credentials. The network preference stays so the
    /// picker survives a re-login.
    pub fn clear_session(&self) -> StorageResult<()> {
        for name in [USER_FILE, CREDENTIALS_FILE] {
            match fs::remove_file(self.root.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let file = File::open(self.root.join(name)).ok()?;
        match serde_json::from_reader(BufReader::new(file)) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(file = name, error = %e, "Discarding corrupt session record");
                None
            }
        }
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_atomic(name, &bytes)
    }

    /// Write to a temp file first, then rename for atomicity.
    fn write_atomic(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.root.join(name);
        let temp_path = path.with_extension("tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(data)?;
            writer.flush()?;
        }
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}
