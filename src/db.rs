pub mod health;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::{AppError, AppResult};

/// Code surfaced when a mutating command is refused because health checks failed.
pub const DB_UNHEALTHY_CODE: &str = "DB_UNHEALTHY";
pub const DB_UNHEALTHY_EXIT_CODE: i32 = 2;
pub const DB_UNHEALTHY_CLI_HINT: &str = "Run `releve db status` for details.";

const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

struct Migration {
    version: &'static str,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001",
        name: "initial",
        sql: include_str!("db/migrations/001_initial.sql"),
    },
    Migration {
        version: "002",
        name: "reading_attachments",
        sql: include_str!("db/migrations/002_reading_attachments.sql"),
    },
];

/// Synchronous handle over a single SQLite connection.
///
/// Every operation runs to completion on the caller's thread. There is no
/// pooling and no background work; callers that need a consistent view issue
/// their reads back to back.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "create_database_dir")
                    .with_context("path", parent.display().to_string())
            })?;
        }

        let conn = Connection::open(path).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "open_database")
                .with_context("path", path.display().to_string())
        })?;
        apply_pragmas(&conn).map_err(|err| err.with_context("path", path.display().to_string()))?;

        debug!(target: "releve", event = "db_opened", path = %path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|err| AppError::from(err).with_context("operation", "open_memory"))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|err| AppError::from(err).with_context("operation", "busy_timeout"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// File path backing this database, absent for in-memory connections.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with the connection held for the duration of the call.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> AppResult<T>) -> AppResult<T> {
        let conn = self.conn.lock().expect("database lock poisoned");
        f(&conn)
    }

    /// Apply pending schema migrations. Additive only; existing tables and
    /// columns are never dropped or rewritten.
    pub fn migrate(&self) -> AppResult<()> {
        self.with_conn(run_migrations)
    }

    pub fn vacuum(&self) -> AppResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch("VACUUM;")
                .map_err(|err| AppError::from(err).with_context("operation", "vacuum"))
        })
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            path: self.path.clone(),
        }
    }
}

fn apply_pragmas(conn: &Connection) -> AppResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|err| AppError::from(err).with_context("operation", "pragma_journal_mode"))?;
    conn.pragma_update(None, "synchronous", "FULL")
        .map_err(|err| AppError::from(err).with_context("operation", "pragma_synchronous"))?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|err| AppError::from(err).with_context("operation", "pragma_foreign_keys"))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|err| AppError::from(err).with_context("operation", "busy_timeout"))?;
    Ok(())
}

fn run_migrations(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .map_err(|err| AppError::from(err).with_context("operation", "create_migrations_table"))?;

    // Databases created before version tracking get the initial schema
    // recorded as already applied.
    if needs_baseline(conn)? {
        mark_migration_applied(conn, "001", "initial")?;
        info!(
            target: "releve",
            event = "migration_baseline",
            "existing database detected, marked migration 001 as applied"
        );
    }

    let applied = applied_versions(conn)?;
    for migration in MIGRATIONS {
        if !applied.iter().any(|version| version == migration.version) {
            apply_migration(conn, migration)?;
        }
    }

    Ok(())
}

fn needs_baseline(conn: &Connection) -> AppResult<bool> {
    let tracked: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .map_err(|err| AppError::from(err).with_context("operation", "count_migrations"))?;
    if tracked > 0 {
        return Ok(false);
    }

    let tables_exist: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'readings'",
            [],
            |row| row.get(0),
        )
        .map_err(|err| AppError::from(err).with_context("operation", "probe_schema"))?;
    Ok(tables_exist > 0)
}

fn applied_versions(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT version FROM schema_migrations ORDER BY version")
        .map_err(AppError::from)?;
    let versions = stmt
        .query_map([], |row| row.get(0))
        .map_err(AppError::from)?
        .collect::<Result<Vec<String>, _>>()
        .map_err(|err| AppError::from(err).with_context("operation", "list_migrations"))?;
    Ok(versions)
}

fn mark_migration_applied(conn: &Connection, version: &str, name: &str) -> AppResult<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
        (version, name, Utc::now().to_rfc3339()),
    )
    .map_err(|err| {
        AppError::from(err)
            .with_context("operation", "mark_migration")
            .with_context("version", version.to_string())
    })?;
    Ok(())
}

fn apply_migration(conn: &Connection, migration: &Migration) -> AppResult<()> {
    info!(
        target: "releve",
        event = "migration_apply",
        version = migration.version,
        name = migration.name,
    );

    conn.execute_batch(&format!("BEGIN; {} COMMIT;", migration.sql))
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "apply_migration")
                .with_context("version", migration.version.to_string())
                .with_context("name", migration.name.to_string())
        })?;

    mark_migration_applied(conn, migration.version, migration.name)
}
