use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::db::Database;
use crate::AppResult;

const EXPECTED_JOURNAL_MODE: &str = "wal";
const EXPECTED_PAGE_SIZE: i64 = 4096;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DbHealthStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbHealthCheck {
    pub name: String,
    pub passed: bool,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbHealthOffender {
    pub table: String,
    pub rowid: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbHealthReport {
    pub status: DbHealthStatus,
    pub checks: Vec<DbHealthCheck>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub offenders: Vec<DbHealthOffender>,
    pub schema_hash: String,
    pub app_version: String,
    pub generated_at: String,
}

pub fn run_health_checks(db: &Database) -> AppResult<DbHealthReport> {
    db.with_conn(|conn| {
        let mut checks: Vec<DbHealthCheck> = Vec::new();
        let mut offenders: Vec<DbHealthOffender> = Vec::new();
        let mut overall_ok = true;

        let quick_check = run_quick_check(conn);
        overall_ok &= quick_check.passed;
        checks.push(quick_check);

        let integrity_check = run_integrity_check(conn);
        overall_ok &= integrity_check.passed;
        checks.push(integrity_check);

        let fk_result = run_foreign_key_check(conn);
        overall_ok &= fk_result.check.passed;
        offenders.extend(fk_result.offenders);
        checks.push(fk_result.check);

        let storage_check = run_storage_sanity(conn);
        overall_ok &= storage_check.passed;
        checks.push(storage_check);

        let schema_hash = compute_schema_hash(conn).unwrap_or_default();

        let status = if overall_ok {
            DbHealthStatus::Ok
        } else {
            DbHealthStatus::Error
        };

        Ok(DbHealthReport {
            status,
            checks,
            offenders,
            schema_hash,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    })
}

struct ForeignKeyCheckResult {
    check: DbHealthCheck,
    offenders: Vec<DbHealthOffender>,
}

fn run_quick_check(conn: &Connection) -> DbHealthCheck {
    let start = Instant::now();
    let mut check = DbHealthCheck {
        name: "quick_check".to_string(),
        passed: true,
        duration_ms: 0,
        details: None,
    };

    match conn.query_row("PRAGMA quick_check;", [], |row| row.get::<_, String>(0)) {
        Ok(result) => {
            if !result.eq_ignore_ascii_case("ok") {
                check.passed = false;
                check.details = Some(result);
            }
        }
        Err(err) => {
            check.passed = false;
            check.details = Some(format!("quick_check failed: {err}"));
        }
    }

    check.duration_ms = start.elapsed().as_millis() as u64;
    check
}

fn run_integrity_check(conn: &Connection) -> DbHealthCheck {
    let start = Instant::now();
    let mut check = DbHealthCheck {
        name: "integrity_check".to_string(),
        passed: true,
        duration_ms: 0,
        details: None,
    };

    match conn.query_row("PRAGMA integrity_check(1);", [], |row| {
        row.get::<_, String>(0)
    }) {
        Ok(result) => {
            if !result.eq_ignore_ascii_case("ok") {
                check.passed = false;
                check.details = Some(result);
            }
        }
        Err(err) => {
            check.passed = false;
            check.details = Some(format!("integrity_check failed: {err}"));
        }
    }

    check.duration_ms = start.elapsed().as_millis() as u64;
    check
}

fn run_foreign_key_check(conn: &Connection) -> ForeignKeyCheckResult {
    let start = Instant::now();
    let mut check = DbHealthCheck {
        name: "foreign_key_check".to_string(),
        passed: true,
        duration_ms: 0,
        details: None,
    };

    let mut offenders = Vec::new();
    let result = conn
        .prepare("PRAGMA foreign_key_check;")
        .and_then(|mut stmt| {
            let rows = stmt.query_map([], |row| {
                let table: String = row.get(0)?;
                let rowid: i64 = row.get(1)?;
                let parent: Option<String> = row.get(2)?;
                let fkid: Option<i64> = row.get(3)?;
                Ok((table, rowid, parent, fkid))
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        });

    match result {
        Ok(rows) => {
            for (table, rowid, parent, fkid) in rows {
                offenders.push(offender_from_parts(table, rowid, parent, fkid));
            }
            if !offenders.is_empty() {
                check.passed = false;
                check.details = Some(format!("{} foreign key violation(s)", offenders.len()));
            }
        }
        Err(err) => {
            check.passed = false;
            check.details = Some(format!("foreign_key_check failed: {err}"));
        }
    }

    check.duration_ms = start.elapsed().as_millis() as u64;
    ForeignKeyCheckResult { check, offenders }
}

fn offender_from_parts(
    table: String,
    rowid: i64,
    parent: Option<String>,
    fkid: Option<i64>,
) -> DbHealthOffender {
    let mut message = String::new();
    if let Some(parent) = parent {
        message.push_str(&format!("missing parent '{parent}'"));
    }
    if let Some(fkid) = fkid {
        if !message.is_empty() {
            message.push_str(", ");
        }
        message.push_str(&format!("constraint #{fkid}"));
    }
    if message.is_empty() {
        message.push_str("foreign key violation");
    }

    DbHealthOffender {
        table,
        rowid,
        message,
    }
}

fn run_storage_sanity(conn: &Connection) -> DbHealthCheck {
    let start = Instant::now();
    let mut check = DbHealthCheck {
        name: "storage_sanity".to_string(),
        passed: true,
        duration_ms: 0,
        details: None,
    };

    let mut messages: Vec<String> = Vec::new();

    match conn.query_row("PRAGMA journal_mode;", [], |row| row.get::<_, String>(0)) {
        Ok(mode) => {
            if !mode.eq_ignore_ascii_case(EXPECTED_JOURNAL_MODE) {
                check.passed = false;
                messages.push(format!(
                    "journal_mode mismatch: expected {EXPECTED_JOURNAL_MODE}, got {mode}"
                ));
            } else {
                messages.push(format!("journal_mode={mode}"));
            }
        }
        Err(err) => {
            check.passed = false;
            messages.push(format!("journal_mode query failed: {err}"));
        }
    }

    match conn.query_row("PRAGMA page_size;", [], |row| row.get::<_, i64>(0)) {
        Ok(size) => {
            if size != EXPECTED_PAGE_SIZE {
                check.passed = false;
                messages.push(format!(
                    "page_size mismatch: expected {EXPECTED_PAGE_SIZE}, got {size}"
                ));
            } else {
                messages.push(format!("page_size={size}"));
            }
        }
        Err(err) => {
            check.passed = false;
            messages.push(format!("page_size query failed: {err}"));
        }
    }

    check.duration_ms = start.elapsed().as_millis() as u64;
    if !messages.is_empty() {
        check.details = Some(messages.join("; "));
    }
    check
}

fn compute_schema_hash(conn: &Connection) -> AppResult<String> {
    let mut stmt = conn
        .prepare(
            "SELECT type, name, tbl_name, sql FROM sqlite_master
             WHERE type IN ('table','index','trigger','view')
             ORDER BY type, name",
        )
        .map_err(crate::AppError::from)?;

    let rows = stmt
        .query_map([], |row| {
            let ty: String = row.get(0)?;
            let name: String = row.get(1)?;
            let tbl: String = row.get(2)?;
            let sql: Option<String> = row.get(3)?;
            Ok((ty, name, tbl, sql))
        })
        .map_err(crate::AppError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(crate::AppError::from)?;

    let mut hasher = Sha256::new();
    for (ty, name, tbl, sql) in rows {
        hasher.update(ty.as_bytes());
        hasher.update([0]);
        hasher.update(name.as_bytes());
        hasher.update([0]);
        hasher.update(tbl.as_bytes());
        hasher.update([0]);
        if let Some(sql) = sql {
            hasher.update(sql.as_bytes());
        }
        hasher.update([0]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
