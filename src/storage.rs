//! Session persistence backends
//!
//! The session store treats persistence as an opaque key→JSON blob
//! contract (`SessionBackend` in the `session` module). Two backends
//! ship: an in-memory map for tests and persistence-off deployments, and
//! a sqlite file in the user's data directory.

use crate::error::{ChatRelayError, Result};
use crate::session::{Session, SessionBackend};
use anyhow::Context;
use chrono::Utc;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// In-memory session backend
///
/// Holds blobs for the process lifetime only. This is the default when
/// `session.persist` is off, and the backend tests use.
#[derive(Default)]
pub struct MemoryBackend {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    /// Create an empty in-memory backend
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<Session>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| ChatRelayError::Storage("memory backend poisoned".to_string()))?;

        match blobs.get(key) {
            Some(blob) => {
                let session = serde_json::from_str(blob)
                    .map_err(|e| ChatRelayError::Storage(format!("corrupt session blob: {}", e)))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    fn store(&self, session: &Session) -> Result<()> {
        let blob = serde_json::to_string(session).map_err(ChatRelayError::Serialization)?;
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| ChatRelayError::Storage("memory backend poisoned".to_string()))?;
        blobs.insert(session.key.as_str().to_string(), blob);
        Ok(())
    }
}

/// Sqlite-backed session persistence
///
/// One row per conversation key holding the serialized session. The
/// database lives in the platform data directory unless overridden.
pub struct SqliteSessionBackend {
    db_path: PathBuf,
}

impl SqliteSessionBackend {
    /// Create a new sqlite backend
    ///
    /// Initializes the database file in the user's data directory. The
    /// `CHATRELAY_SESSION_DB` environment variable overrides the path,
    /// which makes it easy to point the binary at a test DB or alternate
    /// file without changing the user's application data dir.
    pub fn new() -> Result<Self> {
        if let Ok(override_path) = std::env::var("CHATRELAY_SESSION_DB") {
            return Self::new_with_path(override_path);
        }

        let proj_dirs = ProjectDirs::from("com", "xbcsmith", "chatrelay")
            .ok_or_else(|| ChatRelayError::Storage("Could not determine data directory".into()))?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .context("Failed to create data directory")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        let db_path = data_dir.join("sessions.db");
        let backend = Self { db_path };
        backend.init()?;
        Ok(backend)
    }

    /// Create a new sqlite backend that uses the specified database path
    ///
    /// This is primarily useful for tests where the default application
    /// data directory is not desirable (for example, a temporary
    /// directory).
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::storage::SqliteSessionBackend;
    ///
    /// let backend = SqliteSessionBackend::new_with_path("/tmp/test_sessions.db").unwrap();
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| ChatRelayError::Storage(e.to_string()))?;
        }

        let backend = Self { db_path };
        backend.init()?;
        Ok(backend)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                key TEXT PRIMARY KEY,
                session JSON NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create tables")
        .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        Ok(())
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| ChatRelayError::Storage(e.to_string()).into())
    }
}

impl SessionBackend for SqliteSessionBackend {
    fn load(&self, key: &str) -> Result<Option<Session>> {
        let conn = self.open()?;

        let blob: Option<String> = conn
            .query_row(
                "SELECT session FROM sessions WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query session")
            .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        match blob {
            Some(blob) => {
                let session = serde_json::from_str(&blob)
                    .map_err(|e| ChatRelayError::Storage(format!("corrupt session blob: {}", e)))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    fn store(&self, session: &Session) -> Result<()> {
        let conn = self.open()?;

        let blob = serde_json::to_string(session).map_err(ChatRelayError::Serialization)?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO sessions (key, session, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET session = excluded.session,
                                            updated_at = excluded.updated_at",
            params![session.key.as_str(), blob, now],
        )
        .context("Failed to upsert session")
        .map_err(|e| ChatRelayError::Storage(e.to_string()))?;

        Ok(())
    }
}
