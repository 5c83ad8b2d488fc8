use rusqlite::{OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::id::new_uuid_v7;
use crate::{AppError, AppResult};

const METER_NOT_FOUND_CODE: &str = "METER/NOT_FOUND";

/// A physical or logical meter. Belongs to at most one category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Meter {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MeterInput {
    pub name: String,
    pub category_id: Option<String>,
}

impl Meter {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            category_id: row.get("category_id")?,
        })
    }
}

pub fn list_meters(db: &Database) -> AppResult<Vec<Meter>> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT id, name, category_id FROM meters ORDER BY name, id")
            .map_err(AppError::from)?;
        let result = stmt
            .query_map([], Meter::from_row)
            .map_err(AppError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "list")
                    .with_context("table", "meters")
            });
        result
    })
}

pub fn get_meter(db: &Database, id: &str) -> AppResult<Option<Meter>> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT id, name, category_id FROM meters WHERE id = ?1",
            [id],
            Meter::from_row,
        )
        .optional()
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "get")
                .with_context("table", "meters")
                .with_context("id", id.to_string())
        })
    })
}

pub fn create_meter(db: &Database, input: MeterInput) -> AppResult<Meter> {
    let meter = Meter {
        id: new_uuid_v7(),
        name: input.name,
        category_id: input.category_id,
    };
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO meters (id, name, category_id) VALUES (?1, ?2, ?3)",
            (&meter.id, &meter.name, &meter.category_id),
        )
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "create")
                .with_context("table", "meters")
        })?;
        Ok(())
    })?;
    Ok(meter)
}

pub fn update_meter(db: &Database, id: &str, input: MeterInput) -> AppResult<Meter> {
    let changed = db.with_conn(|conn| {
        conn.execute(
            "UPDATE meters SET name = ?1, category_id = ?2 WHERE id = ?3",
            (&input.name, &input.category_id, id),
        )
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "update")
                .with_context("table", "meters")
                .with_context("id", id.to_string())
        })
    })?;
    if changed == 0 {
        return Err(
            AppError::new(METER_NOT_FOUND_CODE, "Meter not found").with_context("id", id.to_string())
        );
    }
    Ok(Meter {
        id: id.to_string(),
        name: input.name,
        category_id: input.category_id,
    })
}

pub fn delete_meter(db: &Database, id: &str) -> AppResult<bool> {
    db.with_conn(|conn| {
        let deleted = conn
            .execute("DELETE FROM meters WHERE id = ?1", [id])
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "delete")
                    .with_context("table", "meters")
                    .with_context("id", id.to_string())
            })?;
        Ok(deleted > 0)
    })
}
