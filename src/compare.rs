use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{sum_for_bucket, Filters, JoinedReading};
use crate::categories;
use crate::db::Database;
use crate::hierarchy::{Bucket, CategoryIndex};
use crate::meters;
use crate::parameters;
use crate::readings;
use crate::thresholds::{classify, BreachStatus};
use crate::{AppError, AppResult};

pub const PERIOD_PARSE_CODE: &str = "PERIOD/PARSE";
pub const PERIOD_ORDER_CODE: &str = "PERIOD/ORDER";

/// One calendar month, zero-padded in all textual forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    /// Parse a strict `YYYY-MM` month.
    pub fn parse(text: &str) -> AppResult<Self> {
        let parse_err = || {
            AppError::new(PERIOD_PARSE_CODE, "Expected a month as YYYY-MM")
                .with_context("input", text.to_string())
        };

        let (year, month) = text.split_once('-').ok_or_else(parse_err)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(parse_err());
        }
        let year: i32 = year.parse().map_err(|_| parse_err())?;
        let month: u32 = month.parse().map_err(|_| parse_err())?;
        if !(1..=12).contains(&month) {
            return Err(parse_err());
        }
        Ok(Self { year, month })
    }

    fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Zero-padded `YYYY-MM-` prefix shared by every date in this month.
    pub fn date_prefix(&self) -> String {
        format!("{:04}-{:02}-", self.year, self.month)
    }

    pub fn first_day(&self) -> String {
        format!("{:04}-{:02}-01", self.year, self.month)
    }

    pub fn last_day(&self) -> String {
        let next = self.next();
        match NaiveDate::from_ymd_opt(next.year, next.month, 1).and_then(|d| d.pred_opt()) {
            Some(last) => last.format("%Y-%m-%d").to_string(),
            // Unreachable for in-range months; 28 is a safe floor.
            None => format!("{:04}-{:02}-28", self.year, self.month),
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Inclusive month range describing one comparison period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthSpan {
    pub start: Month,
    pub end: Month,
}

impl MonthSpan {
    pub fn new(start: Month, end: Month) -> AppResult<Self> {
        if end < start {
            return Err(AppError::new(PERIOD_ORDER_CODE, "Period end precedes its start")
                .with_context("start", start.to_string())
                .with_context("end", end.to_string()));
        }
        Ok(Self { start, end })
    }

    /// Parse `YYYY-MM:YYYY-MM`.
    pub fn parse(text: &str) -> AppResult<Self> {
        let (start, end) = text.split_once(':').ok_or_else(|| {
            AppError::new(PERIOD_PARSE_CODE, "Expected a period as YYYY-MM:YYYY-MM")
                .with_context("input", text.to_string())
        })?;
        Self::new(Month::parse(start)?, Month::parse(end)?)
    }

    pub fn months(&self) -> Vec<Month> {
        let mut months = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            months.push(current);
            current = current.next();
        }
        months
    }

    /// Inclusive zero-padded date range covered by this span. Comparison is
    /// lexicographic; callers feeding dates from elsewhere must zero-pad.
    pub fn date_range(&self) -> (String, String) {
        (self.start.first_day(), self.end.last_day())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    Monthly,
    Cumulative,
}

/// Which of the two compared periods a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodSlot {
    Period1,
    Period2,
}

impl PeriodSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodSlot::Period1 => "period1",
            PeriodSlot::Period2 => "period2",
        }
    }
}

/// Immutable description of one comparison request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareRequest {
    pub period1: MonthSpan,
    pub period2: MonthSpan,
    pub mode: CompareMode,
    #[serde(default)]
    pub filters: Filters,
}

/// Point-in-time view of storage with readings joined to their path and
/// bounds. Orphaned or undecodable readings are dropped here, once, so every
/// downstream computation works from the same clean view.
pub struct Snapshot {
    rows: Vec<JoinedReading>,
    pub skipped_orphans: usize,
    pub skipped_invalid: usize,
}

impl Snapshot {
    pub fn load(db: &Database) -> AppResult<Self> {
        let categories = categories::list_categories(db)?;
        let meters = meters::list_meters(db)?;
        let parameters = parameters::list_parameters(db, None)?;
        let readings = readings::list_readings(db, None, None)?;

        let index = CategoryIndex::new(&categories);
        let meters_by_id: HashMap<&str, &meters::Meter> =
            meters.iter().map(|m| (m.id.as_str(), m)).collect();
        let parameters_by_id: HashMap<&str, &parameters::Parameter> =
            parameters.iter().map(|p| (p.id.as_str(), p)).collect();

        let mut rows = Vec::with_capacity(readings.len());
        let mut skipped_orphans = 0;
        let mut skipped_invalid = 0;
        for reading in &readings {
            let (Some(meter), Some(parameter)) = (
                meters_by_id.get(reading.meter_id.as_str()),
                parameters_by_id.get(reading.parameter_id.as_str()),
            ) else {
                skipped_orphans += 1;
                continue;
            };
            if !reading.value.is_finite() {
                skipped_invalid += 1;
                continue;
            }
            let resolved = index.resolve(meter.category_id.as_deref());
            rows.push(JoinedReading {
                id: reading.id.clone(),
                date: reading.date.clone(),
                value: reading.value,
                category_path: resolved.path,
                depth: resolved.depth,
                meter_name: meter.name.clone(),
                parameter_name: parameter.name.clone(),
                target: parameter.target,
                max_value: parameter.max_value,
                unit: parameter.unit.clone(),
                note: reading.note.clone(),
            });
        }

        debug!(
            target: "releve",
            event = "snapshot_loaded",
            readings = rows.len(),
            skipped_orphans,
            skipped_invalid,
        );

        Ok(Self {
            rows,
            skipped_orphans,
            skipped_invalid,
        })
    }

    pub fn rows(&self) -> &[JoinedReading] {
        &self.rows
    }

    /// Build a snapshot from an already-joined set of rows. Callers that do
    /// not go through SQLite (tests, alternative stores) start here.
    pub fn from_rows(rows: Vec<JoinedReading>) -> Self {
        Self {
            rows,
            skipped_orphans: 0,
            skipped_invalid: 0,
        }
    }
}

/// Per-bucket totals for the two compared windows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketTotals {
    pub bucket: Bucket,
    pub period1: std::collections::BTreeMap<String, f64>,
    pub period2: std::collections::BTreeMap<String, f64>,
}

/// One aligned month-pair with its three bucket partitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthPair {
    pub period1: Month,
    pub period2: Month,
    pub buckets: Vec<BucketTotals>,
}

/// Aggregated comparator output consumed by the chart builder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BucketedData {
    Monthly { pairs: Vec<MonthPair> },
    Cumulative { buckets: Vec<BucketTotals> },
}

/// Build the per-bucket totals for a request.
///
/// Monthly mode pairs months by relative offset: the first month of period1
/// with the first of period2, and so on. A longer period's surplus months
/// have no partner and are dropped.
pub fn bucketed(snapshot: &Snapshot, request: &CompareRequest) -> AppResult<BucketedData> {
    match request.mode {
        CompareMode::Monthly => {
            let months1 = request.period1.months();
            let months2 = request.period2.months();
            let pairs = months1
                .into_iter()
                .zip(months2)
                .map(|(m1, m2)| {
                    let rows1: Vec<&JoinedReading> = snapshot
                        .rows
                        .iter()
                        .filter(|row| row.date.starts_with(&m1.date_prefix()))
                        .collect();
                    let rows2: Vec<&JoinedReading> = snapshot
                        .rows
                        .iter()
                        .filter(|row| row.date.starts_with(&m2.date_prefix()))
                        .collect();
                    MonthPair {
                        period1: m1,
                        period2: m2,
                        buckets: bucket_totals(&rows1, &rows2, &request.filters),
                    }
                })
                .collect();
            Ok(BucketedData::Monthly { pairs })
        }
        CompareMode::Cumulative => {
            let (from1, to1) = request.period1.date_range();
            let (from2, to2) = request.period2.date_range();
            let rows1: Vec<&JoinedReading> = snapshot
                .rows
                .iter()
                .filter(|row| in_range(&row.date, &from1, &to1))
                .collect();
            let rows2: Vec<&JoinedReading> = snapshot
                .rows
                .iter()
                .filter(|row| in_range(&row.date, &from2, &to2))
                .collect();
            Ok(BucketedData::Cumulative {
                buckets: bucket_totals(&rows1, &rows2, &request.filters),
            })
        }
    }
}

fn bucket_totals(
    rows1: &[&JoinedReading],
    rows2: &[&JoinedReading],
    filters: &Filters,
) -> Vec<BucketTotals> {
    Bucket::ALL
        .iter()
        .map(|&bucket| BucketTotals {
            bucket,
            period1: sum_for_bucket(rows1.iter().copied(), bucket, filters),
            period2: sum_for_bucket(rows2.iter().copied(), bucket, filters),
        })
        .collect()
}

fn in_range(date: &str, from: &str, to: &str) -> bool {
    date >= from && date <= to
}

/// One flat row of the comparison report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub period: PeriodSlot,
    pub id: String,
    pub date: String,
    pub category_path: String,
    pub meter_name: String,
    pub parameter_name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<f64>,
    pub status: BreachStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Produce the flat comparison rows for a request.
///
/// Pure with respect to the snapshot: identical inputs yield identical rows,
/// in a deterministic order (period, date, path, meter, parameter, id).
pub fn compare(snapshot: &Snapshot, request: &CompareRequest) -> AppResult<Vec<ComparisonRow>> {
    let mut rows = Vec::new();
    for (slot, span) in [
        (PeriodSlot::Period1, &request.period1),
        (PeriodSlot::Period2, &request.period2),
    ] {
        let (from, to) = span.date_range();
        for joined in &snapshot.rows {
            if !in_range(&joined.date, &from, &to) {
                continue;
            }
            if !request
                .filters
                .matches(&joined.meter_name, &joined.category_path, &joined.parameter_name)
            {
                continue;
            }
            let classification = classify(joined.value, joined.target, joined.max_value);
            rows.push(ComparisonRow {
                period: slot,
                id: joined.id.clone(),
                date: joined.date.clone(),
                category_path: joined.category_path.clone(),
                meter_name: joined.meter_name.clone(),
                parameter_name: joined.parameter_name.clone(),
                value: joined.value,
                unit: joined.unit.clone(),
                target: joined.target,
                max_value: joined.max_value,
                difference: classification.difference,
                status: classification.status,
                note: joined.note.clone(),
            });
        }
    }

    rows.sort_by(|a, b| {
        (
            a.period,
            &a.date,
            &a.category_path,
            &a.meter_name,
            &a.parameter_name,
            &a.id,
        )
            .cmp(&(
                b.period,
                &b.date,
                &b.category_path,
                &b.meter_name,
                &b.parameter_name,
                &b.id,
            ))
    });

    debug!(
        target: "releve",
        event = "compare_done",
        mode = ?request.mode,
        rows = rows.len(),
    );
    Ok(rows)
}

/// Convenience entry point used by the CLI: load a fresh snapshot and
/// compare in one call.
pub fn compare_from_db(db: &Database, request: &CompareRequest) -> AppResult<Vec<ComparisonRow>> {
    let snapshot = Snapshot::load(db)?;
    compare(&snapshot, request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_parse_requires_zero_padding() {
        assert!(Month::parse("2024-01").is_ok());
        assert!(Month::parse("2024-1").is_err());
        assert!(Month::parse("24-01").is_err());
        assert!(Month::parse("2024-13").is_err());
        assert!(Month::parse("2024").is_err());
    }

    #[test]
    fn month_span_rejects_reversed_order() {
        let err = MonthSpan::parse("2024-03:2024-01").unwrap_err();
        assert_eq!(err.code(), PERIOD_ORDER_CODE);
    }

    #[test]
    fn month_span_enumerates_inclusive_months() {
        let span = MonthSpan::parse("2023-11:2024-02").unwrap();
        let months: Vec<String> = span.months().iter().map(Month::to_string).collect();
        assert_eq!(months, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);
    }

    #[test]
    fn span_date_range_covers_month_ends() {
        let span = MonthSpan::parse("2024-01:2024-02").unwrap();
        assert_eq!(span.date_range(), ("2024-01-01".to_string(), "2024-02-29".to_string()));
        let span = MonthSpan::parse("2023-12:2023-12").unwrap();
        assert_eq!(span.date_range(), ("2023-12-01".to_string(), "2023-12-31".to_string()));
    }

    #[test]
    fn monthly_pairs_align_by_relative_offset() {
        let request = CompareRequest {
            period1: MonthSpan::parse("2024-01:2024-03").unwrap(),
            period2: MonthSpan::parse("2025-01:2025-03").unwrap(),
            mode: CompareMode::Monthly,
            filters: Filters::default(),
        };
        let snapshot = Snapshot::from_rows(Vec::new());
        let BucketedData::Monthly { pairs } = bucketed(&snapshot, &request).unwrap() else {
            panic!("expected monthly data");
        };
        let aligned: Vec<(String, String)> = pairs
            .iter()
            .map(|p| (p.period1.to_string(), p.period2.to_string()))
            .collect();
        assert_eq!(
            aligned,
            vec![
                ("2024-01".to_string(), "2025-01".to_string()),
                ("2024-02".to_string(), "2025-02".to_string()),
                ("2024-03".to_string(), "2025-03".to_string()),
            ]
        );
    }

    #[test]
    fn unequal_spans_drop_surplus_months() {
        let request = CompareRequest {
            period1: MonthSpan::parse("2024-01:2024-05").unwrap(),
            period2: MonthSpan::parse("2025-01:2025-02").unwrap(),
            mode: CompareMode::Monthly,
            filters: Filters::default(),
        };
        let snapshot = Snapshot::from_rows(Vec::new());
        let BucketedData::Monthly { pairs } = bucketed(&snapshot, &request).unwrap() else {
            panic!("expected monthly data");
        };
        assert_eq!(pairs.len(), 2);
    }
}
