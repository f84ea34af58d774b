//! Remembered grid preferences using SQLite
//!
//! Stores the last selected view per table and the column widths per view,
//! so a page reopens the way the user left it.

use anyhow::{Context, Result};
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::PathBuf;
use std::sync::Arc;
use tabula_core::RecordId;
use tabula_grid::RememberedPreferences;

/// Handle for database connections - either owned or shared
enum ConnectionHandle {
    Owned(Connection),
    Shared(Arc<Mutex<Connection>>),
}

impl ConnectionHandle {
    fn with_conn<T, F: FnOnce(&Connection) -> Result<T>>(&self, f: F) -> Result<T> {
        match self {
            ConnectionHandle::Owned(conn) => f(conn),
            ConnectionHandle::Shared(shared) => f(&shared.lock()),
        }
    }
}

/// Storage for remembered preferences using SQLite
pub struct PreferenceStorage {
    db_path: PathBuf,
    /// Holds the connection for in-memory databases (where each open creates a new db)
    memory_conn: Option<Arc<Mutex<Connection>>>,
}

impl std::fmt::Debug for PreferenceStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceStorage")
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl PreferenceStorage {
    /// Open or create storage at the given path
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let storage = Self {
            db_path,
            memory_conn: None,
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    /// Create an in-memory storage for testing
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().with_context(|| "Failed to create in-memory database")?;
        let storage = Self {
            db_path: PathBuf::from(":memory:"),
            memory_conn: Some(Arc::new(Mutex::new(conn))),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn connect(&self) -> Result<ConnectionHandle> {
        if let Some(ref conn) = self.memory_conn {
            Ok(ConnectionHandle::Shared(conn.clone()))
        } else {
            let conn = Connection::open(&self.db_path)
                .with_context(|| format!("Failed to open database at {:?}", self.db_path))?;
            Ok(ConnectionHandle::Owned(conn))
        }
    }

    fn initialize_schema(&self) -> Result<()> {
        let handle = self.connect()?;
        handle.with_conn(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS selected_views (
                    table_name TEXT PRIMARY KEY,
                    view_id TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                [],
            )?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS column_widths (
                    view_id TEXT PRIMARY KEY,
                    widths_json TEXT NOT NULL DEFAULT '{}',
                    updated_at TEXT NOT NULL
                )",
                [],
            )?;
            Ok(())
        })
    }

    /// Remember `view_id` as the selected view of `table_name`
    pub fn remember_view(&self, table_name: &str, view_id: &str) -> Result<()> {
        let handle = self.connect()?;
        let now = Utc::now().to_rfc3339();
        handle.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO selected_views (table_name, view_id, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![table_name, view_id, now],
            )?;
            Ok(())
        })
    }

    pub fn selected_view(&self, table_name: &str) -> Result<Option<RecordId>> {
        let handle = self.connect()?;
        handle.with_conn(|conn| {
            let view_id = conn
                .query_row(
                    "SELECT view_id FROM selected_views WHERE table_name = ?1",
                    params![table_name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(view_id)
        })
    }

    /// Replace the remembered widths of `view_id`
    pub fn save_widths(&self, view_id: &str, widths: &IndexMap<String, f64>) -> Result<()> {
        let handle = self.connect()?;
        let now = Utc::now().to_rfc3339();
        let widths_json = serde_json::to_string(widths)?;
        handle.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO column_widths (view_id, widths_json, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![view_id, widths_json, now],
            )?;
            Ok(())
        })
    }

    pub fn widths(&self, view_id: &str) -> Result<Option<IndexMap<String, f64>>> {
        let handle = self.connect()?;
        let stored: Option<String> = handle.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT widths_json FROM column_widths WHERE view_id = ?1",
                    params![view_id],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        stored
            .map(|json| {
                serde_json::from_str(&json)
                    .with_context(|| format!("Corrupt widths for view {}", view_id))
            })
            .transpose()
    }

    /// Everything remembered, for seeding a page
    pub fn load(&self) -> Result<RememberedPreferences> {
        let handle = self.connect()?;
        let (views, widths) = handle.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT table_name, view_id FROM selected_views")?;
            let views = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut stmt = conn.prepare("SELECT view_id, widths_json FROM column_widths")?;
            let widths = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((views, widths))
        })?;

        let mut remembered = RememberedPreferences {
            selected_views: views.into_iter().collect(),
            ..Default::default()
        };
        for (view_id, json) in widths {
            match serde_json::from_str(&json) {
                Ok(parsed) => {
                    remembered.widths.insert(view_id, parsed);
                }
                Err(e) => tracing::warn!(view_id = %view_id, error = %e, "skipping corrupt widths"),
            }
        }
        Ok(remembered)
    }

    /// Forget the widths of `view_id`
    pub fn clear_widths(&self, view_id: &str) -> Result<()> {
        let handle = self.connect()?;
        handle.with_conn(|conn| {
            conn.execute(
                "DELETE FROM column_widths WHERE view_id = ?1",
                params![view_id],
            )?;
            Ok(())
        })
    }
}
