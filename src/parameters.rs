use rusqlite::{OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::id::new_uuid_v7;
use crate::{AppError, AppResult};

const PARAMETER_NOT_FOUND_CODE: &str = "PARAMETER/NOT_FOUND";

/// A metered quantity on one meter, with optional bounds and unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    pub id: String,
    pub meter_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParameterInput {
    pub meter_id: String,
    pub name: String,
    pub target: Option<f64>,
    pub max_value: Option<f64>,
    pub unit: Option<String>,
}

impl Parameter {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            meter_id: row.get("meter_id")?,
            name: row.get("name")?,
            target: row.get("target")?,
            max_value: row.get("max_value")?,
            unit: row.get("unit")?,
        })
    }
}

pub fn list_parameters(db: &Database, meter_id: Option<&str>) -> AppResult<Vec<Parameter>> {
    db.with_conn(|conn| {
        let sql = match meter_id {
            Some(_) => {
                "SELECT id, meter_id, name, target, max_value, unit FROM parameters
                 WHERE meter_id = ?1 ORDER BY name, id"
            }
            None => {
                "SELECT id, meter_id, name, target, max_value, unit FROM parameters
                 ORDER BY name, id"
            }
        };
        let mut stmt = conn.prepare(sql).map_err(AppError::from)?;
        let rows = match meter_id {
            Some(meter_id) => stmt.query_map([meter_id], Parameter::from_row),
            None => stmt.query_map([], Parameter::from_row),
        };
        let result = rows
            .map_err(AppError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "list")
                    .with_context("table", "parameters")
            });
        result
    })
}

pub fn get_parameter(db: &Database, id: &str) -> AppResult<Option<Parameter>> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT id, meter_id, name, target, max_value, unit FROM parameters WHERE id = ?1",
            [id],
            Parameter::from_row,
        )
        .optional()
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "get")
                .with_context("table", "parameters")
                .with_context("id", id.to_string())
        })
    })
}

pub fn create_parameter(db: &Database, input: ParameterInput) -> AppResult<Parameter> {
    let parameter = Parameter {
        id: new_uuid_v7(),
        meter_id: input.meter_id,
        name: input.name,
        target: input.target,
        max_value: input.max_value,
        unit: input.unit,
    };
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO parameters (id, meter_id, name, target, max_value, unit)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                &parameter.id,
                &parameter.meter_id,
                &parameter.name,
                &parameter.target,
                &parameter.max_value,
                &parameter.unit,
            ),
        )
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "create")
                .with_context("table", "parameters")
        })?;
        Ok(())
    })?;
    Ok(parameter)
}

pub fn update_parameter(db: &Database, id: &str, input: ParameterInput) -> AppResult<Parameter> {
    let changed = db.with_conn(|conn| {
        conn.execute(
            "UPDATE parameters SET meter_id = ?1, name = ?2, target = ?3, max_value = ?4,
             unit = ?5 WHERE id = ?6",
            (
                &input.meter_id,
                &input.name,
                &input.target,
                &input.max_value,
                &input.unit,
                id,
            ),
        )
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "update")
                .with_context("table", "parameters")
                .with_context("id", id.to_string())
        })
    })?;
    if changed == 0 {
        return Err(AppError::new(PARAMETER_NOT_FOUND_CODE, "Parameter not found")
            .with_context("id", id.to_string()));
    }
    Ok(Parameter {
        id: id.to_string(),
        meter_id: input.meter_id,
        name: input.name,
        target: input.target,
        max_value: input.max_value,
        unit: input.unit,
    })
}

pub fn delete_parameter(db: &Database, id: &str) -> AppResult<bool> {
    db.with_conn(|conn| {
        let deleted = conn
            .execute("DELETE FROM parameters WHERE id = ?1", [id])
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "delete")
                    .with_context("table", "parameters")
                    .with_context("id", id.to_string())
            })?;
        Ok(deleted > 0)
    })
}
