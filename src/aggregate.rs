use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hierarchy::Bucket;
use crate::{AppError, AppResult};

/// Text filters applied to readings before any summation.
///
/// Each filter is a case-insensitive substring match; an unset filter
/// matches everything. Filtering before summation keeps per-category totals
/// consistent with the rows shown in the report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

impl Filters {
    pub fn matches(&self, meter_name: &str, category_path: &str, parameter_name: &str) -> bool {
        matches_opt(self.meter.as_deref(), meter_name)
            && matches_opt(self.category.as_deref(), category_path)
            && matches_opt(self.parameter.as_deref(), parameter_name)
    }
}

fn matches_opt(needle: Option<&str>, haystack: &str) -> bool {
    match needle {
        Some(needle) => contains_ci(haystack, needle),
        None => true,
    }
}

pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// One reading joined to its resolved path, names, and bounds.
///
/// Built once per snapshot by the comparator; orphaned readings never make
/// it into this view.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedReading {
    pub id: String,
    pub date: String,
    pub value: f64,
    pub category_path: String,
    pub depth: usize,
    pub meter_name: String,
    pub parameter_name: String,
    pub target: Option<f64>,
    pub max_value: Option<f64>,
    pub unit: Option<String>,
    pub note: Option<String>,
}

impl JoinedReading {
    fn passes(&self, filters: &Filters) -> bool {
        filters.matches(&self.meter_name, &self.category_path, &self.parameter_name)
    }
}

/// Sum matching readings per category for one bucket.
///
/// Every category whose depth falls in the bucket's range contributes; the
/// exact-level cut happens later at display time.
pub fn sum_for_bucket<'a>(
    rows: impl IntoIterator<Item = &'a JoinedReading>,
    bucket: Bucket,
    filters: &Filters,
) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for row in rows {
        if !bucket.admits(row.depth) || !row.passes(filters) {
            continue;
        }
        *totals.entry(row.category_path.clone()).or_insert(0.0) += row.value;
    }
    totals
}

/// Sum matching readings per category at one display level.
///
/// Levels 1-4 include only categories whose resolved depth equals the level
/// exactly; level 5 includes every category.
pub fn sum_at_level<'a>(
    rows: impl IntoIterator<Item = &'a JoinedReading>,
    level: u8,
    filters: &Filters,
) -> AppResult<BTreeMap<String, f64>> {
    if !(1..=5).contains(&level) {
        return Err(AppError::new("LEVEL/OUT_OF_RANGE", "Display level must be 1-5")
            .with_context("level", level.to_string()));
    }

    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for row in rows {
        if level < 5 && row.depth != usize::from(level) {
            continue;
        }
        if !row.passes(filters) {
            continue;
        }
        *totals.entry(row.category_path.clone()).or_insert(0.0) += row.value;
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(path: &str, depth: usize, meter: &str, parameter: &str, value: f64) -> JoinedReading {
        JoinedReading {
            id: format!("r-{path}-{value}"),
            date: "2024-01-15".to_string(),
            value,
            category_path: path.to_string(),
            depth,
            meter_name: meter.to_string(),
            parameter_name: parameter.to_string(),
            target: None,
            max_value: None,
            unit: None,
            note: None,
        }
    }

    fn fixture() -> Vec<JoinedReading> {
        vec![
            row("A", 1, "Compteur principal", "Index jour", 10.0),
            row("A > B", 2, "Compteur principal", "Index nuit", 20.0),
            row("A > B > C", 3, "Compteur annexe", "Index jour", 30.0),
            row("A > B", 2, "Compteur annexe", "Index jour", 5.0),
        ]
    }

    #[test]
    fn level_selects_exact_depth() {
        let rows = fixture();
        let totals = sum_at_level(&rows, 2, &Filters::default()).unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals["A > B"], 25.0);
    }

    #[test]
    fn level_five_includes_every_depth() {
        let rows = fixture();
        let totals = sum_at_level(&rows, 5, &Filters::default()).unwrap();
        assert_eq!(totals.len(), 3);
        assert_eq!(totals["A"], 10.0);
        assert_eq!(totals["A > B"], 25.0);
        assert_eq!(totals["A > B > C"], 30.0);
    }

    #[test]
    fn out_of_range_level_is_rejected() {
        let rows = fixture();
        assert!(sum_at_level(&rows, 0, &Filters::default()).is_err());
        assert!(sum_at_level(&rows, 6, &Filters::default()).is_err());
    }

    #[test]
    fn filters_apply_before_summation() {
        let rows = fixture();
        let filters = Filters {
            meter: Some("principal".to_string()),
            ..Filters::default()
        };
        let totals = sum_at_level(&rows, 2, &filters).unwrap();
        // Only the matching meter's reading counts toward the total.
        assert_eq!(totals["A > B"], 20.0);
    }

    #[test]
    fn filter_match_is_case_insensitive_substring() {
        let rows = fixture();
        let filters = Filters {
            parameter: Some("INDEX JOUR".to_string()),
            ..Filters::default()
        };
        let totals = sum_at_level(&rows, 5, &filters).unwrap();
        assert_eq!(totals.get("A"), Some(&10.0));
        assert_eq!(totals.get("A > B"), Some(&5.0));
        assert_eq!(totals.get("A > B > C"), Some(&30.0));
    }

    #[test]
    fn bucket_sums_keep_both_depths() {
        let rows = fixture();
        let totals = sum_for_bucket(&rows, crate::hierarchy::Bucket::Depth12, &Filters::default());
        assert_eq!(totals.len(), 2);
        assert_eq!(totals["A"], 10.0);
        assert_eq!(totals["A > B"], 25.0);
    }
}
