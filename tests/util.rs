#![allow(dead_code)]

use anyhow::Result;

use releve_lib::categories::{create_category, Category, CategoryInput};
use releve_lib::db::Database;
use releve_lib::meters::{create_meter, Meter, MeterInput};
use releve_lib::parameters::{create_parameter, Parameter, ParameterInput};
use releve_lib::readings::{create_reading, Reading, ReadingInput};

pub fn open_db() -> Result<Database> {
    let db = Database::open_memory()?;
    db.migrate()?;
    Ok(db)
}

/// Ids for the standard fixture: categories A, A > B, A > B > C plus an
/// uncategorized meter, with readings in Jan-Mar 2024 and Jan-Mar 2025.
pub struct Fixture {
    pub cat_a: Category,
    pub cat_b: Category,
    pub cat_c: Category,
    pub meter_a: Meter,
    pub meter_b: Meter,
    pub meter_c: Meter,
    pub meter_loose: Meter,
    pub param_a: Parameter,
    pub param_b: Parameter,
    pub param_c: Parameter,
    pub param_loose: Parameter,
}

pub fn seed_fixture(db: &Database) -> Result<Fixture> {
    let cat_a = create_category(
        db,
        CategoryInput {
            name: "A".to_string(),
            parent_id: None,
        },
    )?;
    let cat_b = create_category(
        db,
        CategoryInput {
            name: "B".to_string(),
            parent_id: Some(cat_a.id.clone()),
        },
    )?;
    let cat_c = create_category(
        db,
        CategoryInput {
            name: "C".to_string(),
            parent_id: Some(cat_b.id.clone()),
        },
    )?;

    let meter_a = create_meter(
        db,
        MeterInput {
            name: "Compteur A".to_string(),
            category_id: Some(cat_a.id.clone()),
        },
    )?;
    let meter_b = create_meter(
        db,
        MeterInput {
            name: "Compteur B".to_string(),
            category_id: Some(cat_b.id.clone()),
        },
    )?;
    let meter_c = create_meter(
        db,
        MeterInput {
            name: "Compteur C".to_string(),
            category_id: Some(cat_c.id.clone()),
        },
    )?;
    let meter_loose = create_meter(
        db,
        MeterInput {
            name: "Compteur libre".to_string(),
            category_id: None,
        },
    )?;

    let param_a = create_parameter(
        db,
        ParameterInput {
            meter_id: meter_a.id.clone(),
            name: "Index jour".to_string(),
            target: Some(80.0),
            max_value: Some(100.0),
            unit: Some("kWh".to_string()),
        },
    )?;
    let param_b = create_parameter(
        db,
        ParameterInput {
            meter_id: meter_b.id.clone(),
            name: "Index nuit".to_string(),
            target: Some(50.0),
            max_value: None,
            unit: Some("kWh".to_string()),
        },
    )?;
    let param_c = create_parameter(
        db,
        ParameterInput {
            meter_id: meter_c.id.clone(),
            name: "Index secours".to_string(),
            target: None,
            max_value: None,
            unit: None,
        },
    )?;
    let param_loose = create_parameter(
        db,
        ParameterInput {
            meter_id: meter_loose.id.clone(),
            name: "Index libre".to_string(),
            target: None,
            max_value: None,
            unit: None,
        },
    )?;

    // One reading per meter per month, same day, both years.
    let plan = [
        (&meter_a, &param_a, 90.0),
        (&meter_b, &param_b, 40.0),
        (&meter_c, &param_c, 10.0),
        (&meter_loose, &param_loose, 5.0),
    ];
    for year in [2024, 2025] {
        for month in 1..=3 {
            for (meter, parameter, base) in &plan {
                add_reading(
                    db,
                    meter,
                    parameter,
                    &format!("{year}-{month:02}-15"),
                    base + f64::from(month),
                )?;
            }
        }
    }

    Ok(Fixture {
        cat_a,
        cat_b,
        cat_c,
        meter_a,
        meter_b,
        meter_c,
        meter_loose,
        param_a,
        param_b,
        param_c,
        param_loose,
    })
}

pub fn add_reading(
    db: &Database,
    meter: &Meter,
    parameter: &Parameter,
    date: &str,
    value: f64,
) -> Result<Reading> {
    let reading = create_reading(
        db,
        ReadingInput {
            meter_id: meter.id.clone(),
            parameter_id: parameter.id.clone(),
            date: date.to_string(),
            value,
            note: None,
            attachment_path: None,
        },
    )?;
    Ok(reading)
}
