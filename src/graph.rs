use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::aggregate::contains_ci;
use crate::compare::{BucketTotals, BucketedData, PeriodSlot};
use crate::hierarchy::{bucket_for_level, path_depth, Bucket};
use crate::{AppError, AppResult};

/// Headroom applied above the largest rendered value on each scale.
const SCALE_HEADROOM: f64 = 1.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Bar,
    Line,
}

impl SeriesKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Bar => "bar",
            SeriesKind::Line => "line",
        }
    }

    fn flipped(self) -> Self {
        match self {
            SeriesKind::Bar => SeriesKind::Line,
            SeriesKind::Line => SeriesKind::Bar,
        }
    }
}

/// Sparse per-series rendering overrides keyed by the structured pair
/// (category path, period slot). Anything not present renders as a bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesOverrides {
    map: HashMap<(String, PeriodSlot), SeriesKind>,
}

impl SeriesOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind_for(&self, category: &str, period: PeriodSlot) -> SeriesKind {
        self.map
            .get(&(category.to_string(), period))
            .copied()
            .unwrap_or(SeriesKind::Bar)
    }

    pub fn set(&mut self, category: impl Into<String>, period: PeriodSlot, kind: SeriesKind) {
        self.map.insert((category.into(), period), kind);
    }

    /// Flip one series between bar and line. Only the named entry changes;
    /// the caller rebuilds the chart to pick up the new state.
    pub fn toggle(&mut self, category: &str, period: PeriodSlot) -> SeriesKind {
        let key = (category.to_string(), period);
        let next = self
            .map
            .get(&key)
            .copied()
            .unwrap_or(SeriesKind::Bar)
            .flipped();
        self.map.insert(key, next);
        next
    }
}

/// Everything the chart builder needs beyond the bucketed data itself.
#[derive(Debug, Clone, Default)]
pub struct GraphRequest {
    pub level: u8,
    /// Case-insensitive substring filter on the category path.
    pub filter: Option<String>,
    pub show_labels: bool,
    pub overrides: SeriesOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub x: usize,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub category: String,
    pub period: PeriodSlot,
    pub kind: SeriesKind,
    pub points: Vec<SeriesPoint>,
}

/// Chart-ready model: one x axis, two series per category, two value scales.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartModel {
    pub x_labels: Vec<String>,
    pub series: Vec<ChartSeries>,
    /// Upper bound of the axis shared by every bar series.
    pub bar_scale: f64,
    /// Upper bound of the axis shared by every line series.
    pub line_scale: f64,
    pub show_labels: bool,
}

/// Reshape bucketed comparator output into a chart model.
///
/// Monthly data puts the aligned month-pairs on the x axis; cumulative data
/// puts the sorted qualifying categories there. Rebuilding with the same
/// override state yields the same model.
pub fn build_chart(data: &BucketedData, request: &GraphRequest) -> AppResult<ChartModel> {
    let bucket = bucket_for_level(request.level).ok_or_else(|| {
        AppError::new("LEVEL/OUT_OF_RANGE", "Display level must be 1-5")
            .with_context("level", request.level.to_string())
    })?;

    let model = match data {
        BucketedData::Monthly { pairs } => build_monthly(pairs, bucket, request),
        BucketedData::Cumulative { buckets } => build_cumulative(buckets, bucket, request),
    };
    Ok(model)
}

fn build_monthly(
    pairs: &[crate::compare::MonthPair],
    bucket: Bucket,
    request: &GraphRequest,
) -> ChartModel {
    let x_labels: Vec<String> = pairs
        .iter()
        .map(|pair| format!("{}/{}", pair.period1, pair.period2))
        .collect();

    // Union of qualifying categories across every month-pair, sorted.
    let mut categories: BTreeSet<&str> = BTreeSet::new();
    for pair in pairs {
        if let Some(totals) = select_bucket(&pair.buckets, bucket) {
            for path in totals.period1.keys().chain(totals.period2.keys()) {
                if qualifies(path, request) {
                    categories.insert(path);
                }
            }
        }
    }

    let mut series = Vec::new();
    for category in &categories {
        for slot in [PeriodSlot::Period1, PeriodSlot::Period2] {
            let points = pairs
                .iter()
                .enumerate()
                .map(|(x, pair)| {
                    let y = select_bucket(&pair.buckets, bucket)
                        .and_then(|totals| slot_totals(totals, slot).get(*category))
                        .copied()
                        .unwrap_or(0.0);
                    SeriesPoint { x, y }
                })
                .collect();
            series.push(ChartSeries {
                category: (*category).to_string(),
                period: slot,
                kind: request.overrides.kind_for(category, slot),
                points,
            });
        }
    }

    finish(x_labels, series, request.show_labels)
}

fn build_cumulative(
    buckets: &[BucketTotals],
    bucket: Bucket,
    request: &GraphRequest,
) -> ChartModel {
    let mut categories: BTreeSet<&str> = BTreeSet::new();
    if let Some(totals) = select_bucket(buckets, bucket) {
        for path in totals.period1.keys().chain(totals.period2.keys()) {
            if qualifies(path, request) {
                categories.insert(path);
            }
        }
    }
    let x_labels: Vec<String> = categories.iter().map(|c| (*c).to_string()).collect();

    let mut series = Vec::new();
    for (x, category) in categories.iter().enumerate() {
        for slot in [PeriodSlot::Period1, PeriodSlot::Period2] {
            let y = select_bucket(buckets, bucket)
                .and_then(|totals| slot_totals(totals, slot).get(*category))
                .copied()
                .unwrap_or(0.0);
            series.push(ChartSeries {
                category: (*category).to_string(),
                period: slot,
                kind: request.overrides.kind_for(category, slot),
                points: vec![SeriesPoint { x, y }],
            });
        }
    }

    finish(x_labels, series, request.show_labels)
}

fn qualifies(path: &str, request: &GraphRequest) -> bool {
    if request.level < 5 && path_depth(path) != usize::from(request.level) {
        return false;
    }
    match request.filter.as_deref() {
        Some(filter) => contains_ci(path, filter),
        None => true,
    }
}

fn select_bucket(buckets: &[BucketTotals], bucket: Bucket) -> Option<&BucketTotals> {
    buckets.iter().find(|totals| totals.bucket == bucket)
}

fn slot_totals(totals: &BucketTotals, slot: PeriodSlot) -> &std::collections::BTreeMap<String, f64> {
    match slot {
        PeriodSlot::Period1 => &totals.period1,
        PeriodSlot::Period2 => &totals.period2,
    }
}

fn finish(x_labels: Vec<String>, series: Vec<ChartSeries>, show_labels: bool) -> ChartModel {
    let bar_scale = scale_for(&series, SeriesKind::Bar);
    let line_scale = scale_for(&series, SeriesKind::Line);
    ChartModel {
        x_labels,
        series,
        bar_scale,
        line_scale,
        show_labels,
    }
}

fn scale_for(series: &[ChartSeries], kind: SeriesKind) -> f64 {
    let max = series
        .iter()
        .filter(|s| s.kind == kind)
        .flat_map(|s| s.points.iter().map(|p| p.y))
        .fold(f64::NEG_INFINITY, f64::max);
    if max.is_finite() && max > 0.0 {
        max * SCALE_HEADROOM
    } else {
        1.0
    }
}
