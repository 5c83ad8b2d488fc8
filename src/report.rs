use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::compare::ComparisonRow;
use crate::{AppError, AppResult};

/// Export/display column order. The semicolon export writes exactly these
/// headers on its first line.
pub const EXPORT_HEADERS: [&str; 12] = [
    "id",
    "date",
    "category",
    "meter",
    "parameter",
    "value",
    "unit",
    "target",
    "max",
    "difference",
    "status",
    "note",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Id,
    Date,
    Category,
    Meter,
    Parameter,
    Value,
    Unit,
    Target,
    Max,
    Difference,
    Status,
    Note,
}

impl SortColumn {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "id" => Some(SortColumn::Id),
            "date" => Some(SortColumn::Date),
            "category" => Some(SortColumn::Category),
            "meter" => Some(SortColumn::Meter),
            "parameter" => Some(SortColumn::Parameter),
            "value" => Some(SortColumn::Value),
            "unit" => Some(SortColumn::Unit),
            "target" => Some(SortColumn::Target),
            "max" => Some(SortColumn::Max),
            "difference" => Some(SortColumn::Difference),
            "status" => Some(SortColumn::Status),
            "note" => Some(SortColumn::Note),
            _ => None,
        }
    }

    fn is_numeric(self) -> bool {
        matches!(
            self,
            SortColumn::Value | SortColumn::Target | SortColumn::Max | SortColumn::Difference
        )
    }
}

/// Sortable view over comparison rows.
///
/// The table remembers the last sorted column: asking for the same column
/// again flips the direction, asking for a different column starts over in
/// the requested direction.
#[derive(Debug, Clone)]
pub struct ReportTable {
    rows: Vec<ComparisonRow>,
    last_sort: Option<(SortColumn, bool)>,
}

impl ReportTable {
    pub fn new(rows: Vec<ComparisonRow>) -> Self {
        Self {
            rows,
            last_sort: None,
        }
    }

    pub fn rows(&self) -> &[ComparisonRow] {
        &self.rows
    }

    pub fn sort(&mut self, column: SortColumn, ascending: bool) -> &[ComparisonRow] {
        let effective = match self.last_sort {
            Some((previous, was_ascending)) if previous == column => !was_ascending,
            _ => ascending,
        };

        if column.is_numeric() {
            self.rows.sort_by(|a, b| {
                let ordering = numeric_key(a, column)
                    .partial_cmp(&numeric_key(b, column))
                    .unwrap_or(Ordering::Equal);
                direct(ordering, effective)
            });
        } else {
            self.rows.sort_by(|a, b| {
                let ordering = text_key(a, column).cmp(&text_key(b, column));
                direct(ordering, effective)
            });
        }

        self.last_sort = Some((column, effective));
        &self.rows
    }
}

fn direct(ordering: Ordering, ascending: bool) -> Ordering {
    if ascending {
        ordering
    } else {
        ordering.reverse()
    }
}

// Unset bounds sort as negative infinity so they come first ascending.
fn numeric_key(row: &ComparisonRow, column: SortColumn) -> f64 {
    let value = match column {
        SortColumn::Value => Some(row.value),
        SortColumn::Target => row.target,
        SortColumn::Max => row.max_value,
        SortColumn::Difference => row.difference,
        _ => None,
    };
    value.unwrap_or(f64::NEG_INFINITY)
}

fn text_key(row: &ComparisonRow, column: SortColumn) -> String {
    cell(row, column).to_lowercase()
}

/// Render one display cell. Unset values are the literal `-`.
pub fn cell(row: &ComparisonRow, column: SortColumn) -> String {
    match column {
        SortColumn::Id => row.id.clone(),
        SortColumn::Date => row.date.clone(),
        SortColumn::Category => row.category_path.clone(),
        SortColumn::Meter => row.meter_name.clone(),
        SortColumn::Parameter => row.parameter_name.clone(),
        SortColumn::Value => format_number(row.value),
        SortColumn::Unit => row.unit.clone().unwrap_or_else(|| "-".to_string()),
        SortColumn::Target => format_bound(row.target),
        SortColumn::Max => format_bound(row.max_value),
        SortColumn::Difference => format_bound(row.difference),
        SortColumn::Status => row.status.as_str().to_string(),
        SortColumn::Note => row.note.clone().unwrap_or_else(|| "-".to_string()),
    }
}

/// Plain decimal rendering, no exponent, no trailing `.0` on whole numbers.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

pub fn format_bound(value: Option<f64>) -> String {
    match value {
        Some(value) => format_number(value),
        None => "-".to_string(),
    }
}

const COLUMNS: [SortColumn; 12] = [
    SortColumn::Id,
    SortColumn::Date,
    SortColumn::Category,
    SortColumn::Meter,
    SortColumn::Parameter,
    SortColumn::Value,
    SortColumn::Unit,
    SortColumn::Target,
    SortColumn::Max,
    SortColumn::Difference,
    SortColumn::Status,
    SortColumn::Note,
];

/// Render rows as the semicolon-delimited export text: one header line in
/// display order, one line per row, unset bounds as `-`.
pub fn export_rows(rows: &[ComparisonRow]) -> AppResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(Vec::new());

    writer.write_record(EXPORT_HEADERS).map_err(AppError::from)?;
    for row in rows {
        let record: Vec<String> = COLUMNS.iter().map(|&column| cell(row, column)).collect();
        writer.write_record(&record).map_err(AppError::from)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| AppError::new("CSV/FLUSH", err.to_string()))?;
    String::from_utf8(bytes)
        .map_err(|err| AppError::new("CSV/UTF8", err.to_string()))
}
