// Credential storage
// In-memory source of truth with optional SQLite write-through

use anyhow::{Context, Result};
use dashmap::DashMap;
use rusqlite::OptionalExtension;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::types::CredentialPair;

/// Durable key/value holder for the current credential pair
///
/// The only place tokens are read or written. The pair lives under a single
/// map slot so replacement and removal are atomic; the SQLite file, when
/// configured, is updated in one transaction per write.
pub struct CredentialStore {
    pair: Arc<DashMap<(), CredentialPair>>,
    storage_file: Option<PathBuf>,
    access_key: String,
    refresh_key: String,
}

impl CredentialStore {
    /// Open the store, loading a persisted pair if one exists
    pub fn open(
        storage_file: Option<PathBuf>,
        access_key: &str,
        refresh_key: &str,
    ) -> Result<Self> {
        let pair = Arc::new(DashMap::new());

        if let Some(path) = &storage_file {
            if path.exists() {
                tracing::debug!("Loading credentials from {}", path.display());
                if let Some(loaded) = load_pair(path, access_key, refresh_key)? {
                    pair.insert((), loaded);
                }
            }
        }

        Ok(Self {
            pair,
            storage_file,
            access_key: access_key.to_string(),
            refresh_key: refresh_key.to_string(),
        })
    }

    pub fn access_token(&self) -> Option<String> {
        self.pair.get(&()).map(|entry| entry.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.pair
            .get(&())
            .and_then(|entry| entry.refresh_token.clone())
    }

    pub fn pair(&self) -> Option<CredentialPair> {
        self.pair.get(&()).map(|entry| entry.clone())
    }

    pub fn has_credentials(&self) -> bool {
        self.pair.contains_key(&())
    }

    /// Replace the stored pair, both tokens together
    ///
    /// The in-memory slot is the session's source of truth; a failed
    /// write-through is logged and never blocks the update.
    pub fn replace(&self, new_pair: CredentialPair) {
        self.pair.insert((), new_pair.clone());
        if let Some(path) = &self.storage_file {
            if let Err(e) = persist_pair(path, &self.access_key, &self.refresh_key, &new_pair) {
                tracing::warn!("Failed to persist credentials to {}: {}", path.display(), e);
            }
        }
    }

    /// Remove both tokens; clearing an already-empty store is a no-op
    pub fn clear(&self) {
        self.pair.remove(&());
        if let Some(path) = &self.storage_file {
            if let Err(e) = clear_persisted(path, &self.access_key, &self.refresh_key) {
                tracing::warn!("Failed to clear persisted credentials: {}", e);
            }
        }
    }
}

impl Clone for CredentialStore {
    fn clone(&self) -> Self {
        Self {
            pair: Arc::clone(&self.pair),
            storage_file: self.storage_file.clone(),
            access_key: self.access_key.clone(),
            refresh_key: self.refresh_key.clone(),
        }
    }
}

fn open_kv(path: &Path) -> Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)
        .with_context(|| format!("Failed to open credential storage: {}", path.display()))?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )
    .context("Failed to initialize credential storage schema")?;
    Ok(conn)
}

fn load_pair(path: &Path, access_key: &str, refresh_key: &str) -> Result<Option<CredentialPair>> {
    let conn = open_kv(path)?;

    let get = |key: &str| -> Result<Option<String>> {
        conn.query_row("SELECT value FROM auth_kv WHERE key = ?", [key], |row| {
            row.get(0)
        })
        .optional()
        .context("Failed to read credential storage")
    };

    match get(access_key)? {
        Some(access_token) => Ok(Some(CredentialPair {
            access_token,
            refresh_token: get(refresh_key)?,
        })),
        None => Ok(None),
    }
}

fn persist_pair(
    path: &Path,
    access_key: &str,
    refresh_key: &str,
    pair: &CredentialPair,
) -> Result<()> {
    let mut conn = open_kv(path)?;
    let tx = conn
        .transaction()
        .context("Failed to start credential storage transaction")?;

    tx.execute(
        "INSERT INTO auth_kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![access_key, pair.access_token],
    )
    .context("Failed to persist access token")?;

    match &pair.refresh_token {
        Some(refresh_token) => tx
            .execute(
                "INSERT INTO auth_kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![refresh_key, refresh_token],
            )
            .context("Failed to persist refresh token")?,
        None => tx
            .execute("DELETE FROM auth_kv WHERE key = ?", [refresh_key])
            .context("Failed to remove stale refresh token")?,
    };

    tx.commit()
        .context("Failed to commit credential storage transaction")
}

fn clear_persisted(path: &Path, access_key: &str, refresh_key: &str) -> Result<()> {
    let mut conn = open_kv(path)?;
    let tx = conn
        .transaction()
        .context("Failed to start credential storage transaction")?;
    tx.execute("DELETE FROM auth_kv WHERE key = ?", [access_key])
        .context("Failed to clear access token")?;
    tx.execute("DELETE FROM auth_kv WHERE key = ?", [refresh_key])
        .context("Failed to clear refresh token")?;
    tx.commit()
        .context("Failed to commit credential storage transaction")
}
