use chrono::NaiveDate;
use rusqlite::{OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::db::Database;
use crate::id::new_uuid_v7;
use crate::{AppError, AppResult};

const READING_NOT_FOUND_CODE: &str = "READING/NOT_FOUND";
const READING_INVALID_VALUE_CODE: &str = "READING/INVALID_VALUE";
const READING_INVALID_DATE_CODE: &str = "READING/INVALID_DATE";

const SELECT_COLUMNS: &str =
    "id, meter_id, parameter_id, date, value, note, attachment_path";

/// One recorded value. May reference a meter or parameter that has since
/// been removed; such orphans stay in storage and are skipped downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub id: String,
    pub meter_id: String,
    pub parameter_id: String,
    /// Zero-padded `YYYY-MM-DD`.
    pub date: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_path: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReadingInput {
    pub meter_id: String,
    pub parameter_id: String,
    pub date: String,
    pub value: f64,
    pub note: Option<String>,
    pub attachment_path: Option<String>,
}

impl Reading {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            meter_id: row.get("meter_id")?,
            parameter_id: row.get("parameter_id")?,
            date: row.get("date")?,
            value: row.get("value")?,
            note: row.get("note")?,
            attachment_path: row.get("attachment_path")?,
        })
    }
}

/// List readings, optionally restricted to one meter and/or an inclusive
/// date range. Range bounds compare lexicographically, so they must be
/// zero-padded ISO dates.
///
/// A row that fails to decode (a non-numeric value smuggled into storage)
/// is skipped with a warning instead of failing the whole listing.
pub fn list_readings(
    db: &Database,
    meter_id: Option<&str>,
    date_range: Option<(&str, &str)>,
) -> AppResult<Vec<Reading>> {
    let mut sql = format!("SELECT {SELECT_COLUMNS} FROM readings");
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<&dyn ToSql> = Vec::new();

    if let Some(meter_id) = meter_id.as_ref() {
        clauses.push(format!("meter_id = ?{}", params.len() + 1));
        params.push(meter_id);
    }
    if let Some((from, to)) = date_range.as_ref() {
        clauses.push(format!("date >= ?{}", params.len() + 1));
        params.push(from);
        clauses.push(format!("date <= ?{}", params.len() + 1));
        params.push(to);
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY date, id");

    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&sql).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "list")
                .with_context("table", "readings")
        })?;
        let mut rows = stmt.query(params.as_slice()).map_err(AppError::from)?;

        let mut readings = Vec::new();
        while let Some(row) = rows.next().map_err(AppError::from)? {
            match Reading::from_row(row) {
                Ok(reading) => readings.push(reading),
                Err(err) => {
                    warn!(
                        target: "releve",
                        event = "reading_decode_skipped",
                        error = %err,
                        "skipping undecodable reading row"
                    );
                }
            }
        }
        Ok(readings)
    })
}

pub fn get_reading(db: &Database, id: &str) -> AppResult<Option<Reading>> {
    db.with_conn(|conn| {
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM readings WHERE id = ?1"),
            [id],
            Reading::from_row,
        )
        .optional()
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "get")
                .with_context("table", "readings")
                .with_context("id", id.to_string())
        })
    })
}

pub fn create_reading(db: &Database, input: ReadingInput) -> AppResult<Reading> {
    validate_input(&input)?;
    let reading = Reading {
        id: new_uuid_v7(),
        meter_id: input.meter_id,
        parameter_id: input.parameter_id,
        date: input.date,
        value: input.value,
        note: input.note,
        attachment_path: input.attachment_path,
    };
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO readings (id, meter_id, parameter_id, date, value, note, attachment_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            (
                &reading.id,
                &reading.meter_id,
                &reading.parameter_id,
                &reading.date,
                &reading.value,
                &reading.note,
                &reading.attachment_path,
            ),
        )
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "create")
                .with_context("table", "readings")
        })?;
        Ok(())
    })?;
    Ok(reading)
}

pub fn update_reading(db: &Database, id: &str, input: ReadingInput) -> AppResult<Reading> {
    validate_input(&input)?;
    let changed = db.with_conn(|conn| {
        conn.execute(
            "UPDATE readings SET meter_id = ?1, parameter_id = ?2, date = ?3, value = ?4,
             note = ?5, attachment_path = ?6 WHERE id = ?7",
            (
                &input.meter_id,
                &input.parameter_id,
                &input.date,
                &input.value,
                &input.note,
                &input.attachment_path,
                id,
            ),
        )
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "update")
                .with_context("table", "readings")
                .with_context("id", id.to_string())
        })
    })?;
    if changed == 0 {
        return Err(AppError::new(READING_NOT_FOUND_CODE, "Reading not found")
            .with_context("id", id.to_string()));
    }
    Ok(Reading {
        id: id.to_string(),
        meter_id: input.meter_id,
        parameter_id: input.parameter_id,
        date: input.date,
        value: input.value,
        note: input.note,
        attachment_path: input.attachment_path,
    })
}

pub fn delete_reading(db: &Database, id: &str) -> AppResult<bool> {
    db.with_conn(|conn| {
        let deleted = conn
            .execute("DELETE FROM readings WHERE id = ?1", [id])
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "delete")
                    .with_context("table", "readings")
                    .with_context("id", id.to_string())
            })?;
        Ok(deleted > 0)
    })
}

fn validate_input(input: &ReadingInput) -> AppResult<()> {
    if !input.value.is_finite() {
        return Err(AppError::new(
            READING_INVALID_VALUE_CODE,
            "Reading value must be a finite number",
        )
        .with_context("value", input.value.to_string()));
    }
    if NaiveDate::parse_from_str(&input.date, "%Y-%m-%d").is_err() || input.date.len() != 10 {
        return Err(AppError::new(
            READING_INVALID_DATE_CODE,
            "Reading date must be zero-padded YYYY-MM-DD",
        )
        .with_context("date", input.date.clone()));
    }
    Ok(())
}
