use std::path::PathBuf;

use anyhow::{Context, Result};

use releve_lib::categories::{create_category, CategoryInput};
use releve_lib::db::Database;
use releve_lib::meters::{create_meter, MeterInput};
use releve_lib::parameters::{create_parameter, ParameterInput};
use releve_lib::readings::{create_reading, ReadingInput};

/// Seed a small demo hierarchy so the CLI has something to compare:
/// two root categories, a nested branch, bounded parameters, and readings
/// across the same three months of 2024 and 2025.
fn main() -> Result<()> {
    releve_lib::init_logging();

    let db_path = default_db_path().context("determine database path")?;
    let db =
        Database::open(&db_path).with_context(|| format!("open {}", db_path.display()))?;
    db.migrate().context("apply schema migrations")?;

    let energie = create_category(
        &db,
        CategoryInput {
            name: "Energie".to_string(),
            parent_id: None,
        },
    )?;
    let electricite = create_category(
        &db,
        CategoryInput {
            name: "Electricite".to_string(),
            parent_id: Some(energie.id.clone()),
        },
    )?;
    let eclairage = create_category(
        &db,
        CategoryInput {
            name: "Eclairage".to_string(),
            parent_id: Some(electricite.id.clone()),
        },
    )?;
    let eau = create_category(
        &db,
        CategoryInput {
            name: "Eau".to_string(),
            parent_id: None,
        },
    )?;

    let compteur_general = create_meter(
        &db,
        MeterInput {
            name: "Compteur general".to_string(),
            category_id: Some(electricite.id.clone()),
        },
    )?;
    let compteur_eclairage = create_meter(
        &db,
        MeterInput {
            name: "Compteur eclairage".to_string(),
            category_id: Some(eclairage.id.clone()),
        },
    )?;
    let compteur_eau = create_meter(
        &db,
        MeterInput {
            name: "Compteur eau".to_string(),
            category_id: Some(eau.id.clone()),
        },
    )?;

    let index_jour = create_parameter(
        &db,
        ParameterInput {
            meter_id: compteur_general.id.clone(),
            name: "Index jour".to_string(),
            target: Some(80.0),
            max_value: Some(100.0),
            unit: Some("kWh".to_string()),
        },
    )?;
    let index_eclairage = create_parameter(
        &db,
        ParameterInput {
            meter_id: compteur_eclairage.id.clone(),
            name: "Index eclairage".to_string(),
            target: Some(30.0),
            max_value: None,
            unit: Some("kWh".to_string()),
        },
    )?;
    let volume = create_parameter(
        &db,
        ParameterInput {
            meter_id: compteur_eau.id.clone(),
            name: "Volume".to_string(),
            target: None,
            max_value: None,
            unit: Some("m3".to_string()),
        },
    )?;

    let mut count = 0;
    let series = [
        (&compteur_general, &index_jour, [92.0, 85.0, 120.0, 78.0, 81.0, 95.0]),
        (&compteur_eclairage, &index_eclairage, [28.0, 35.0, 31.0, 25.0, 29.0, 33.0]),
        (&compteur_eau, &volume, [12.5, 11.0, 13.2, 10.8, 12.1, 11.9]),
    ];
    for (meter, parameter, values) in series {
        for (offset, value) in values.into_iter().enumerate() {
            let (year, month) = if offset < 3 {
                (2024, offset + 1)
            } else {
                (2025, offset - 2)
            };
            create_reading(
                &db,
                ReadingInput {
                    meter_id: meter.id.clone(),
                    parameter_id: parameter.id.clone(),
                    date: format!("{year}-{month:02}-15"),
                    value,
                    note: None,
                    attachment_path: None,
                },
            )?;
            count += 1;
        }
    }

    println!("Seeded 4 categories, 3 meters, 3 parameters, {count} readings.");
    println!("Database: {}", db_path.display());
    println!("Try: releve compare --period1 2024-01:2024-03 --period2 2025-01:2025-03");
    Ok(())
}

fn default_db_path() -> Result<PathBuf> {
    if let Ok(fake) = std::env::var("RELEVE_FAKE_APPDATA") {
        return Ok(PathBuf::from(fake).join("releve.sqlite3"));
    }

    let base = dirs::data_dir()
        .or_else(|| std::env::current_dir().ok())
        .ok_or_else(|| anyhow::anyhow!("failed to resolve application data directory"))?;
    Ok(base.join("releve").join("releve.sqlite3"))
}
