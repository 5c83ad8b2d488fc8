use serde::{Deserialize, Serialize};

/// Outcome of checking one reading against its parameter's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachStatus {
    Ok,
    Exceed,
    Below,
    Unset,
}

impl BreachStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreachStatus::Ok => "ok",
            BreachStatus::Exceed => "exceed",
            BreachStatus::Below => "below",
            BreachStatus::Unset => "unset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub status: BreachStatus,
    /// Signed distance to the violated bound; absent when no bound is
    /// violated (rendered as `-`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<f64>,
}

/// Classify a value against its optional target and max bounds.
///
/// Precedence is fixed: a defined max dominates the target, so a value over
/// both reports its distance to max, not to target. A value on a bound, or a
/// value with no bounds at all, is Ok (not Unset) to match report semantics.
pub fn classify(value: f64, target: Option<f64>, max_value: Option<f64>) -> Classification {
    if let Some(max) = max_value {
        if value > max {
            return Classification {
                status: BreachStatus::Exceed,
                difference: Some(value - max),
            };
        }
    }
    if let Some(target) = target {
        if value > target {
            return Classification {
                status: BreachStatus::Exceed,
                difference: Some(value - target),
            };
        }
        if value < target {
            return Classification {
                status: BreachStatus::Below,
                difference: Some(value - target),
            };
        }
    }
    Classification {
        status: BreachStatus::Ok,
        difference: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_dominates_target() {
        let c = classify(120.0, Some(80.0), Some(100.0));
        assert_eq!(c.status, BreachStatus::Exceed);
        assert_eq!(c.difference, Some(20.0));
    }

    #[test]
    fn target_alone_flags_exceed() {
        let c = classify(90.0, Some(80.0), None);
        assert_eq!(c.status, BreachStatus::Exceed);
        assert_eq!(c.difference, Some(10.0));
    }

    #[test]
    fn below_target_is_negative_difference() {
        let c = classify(70.0, Some(80.0), None);
        assert_eq!(c.status, BreachStatus::Below);
        assert_eq!(c.difference, Some(-10.0));
    }

    #[test]
    fn on_target_is_ok_with_no_difference() {
        let c = classify(80.0, Some(80.0), None);
        assert_eq!(c.status, BreachStatus::Ok);
        assert_eq!(c.difference, None);
    }

    #[test]
    fn no_bounds_is_ok_not_unset() {
        let c = classify(42.0, None, None);
        assert_eq!(c.status, BreachStatus::Ok);
        assert_eq!(c.difference, None);
    }

    #[test]
    fn under_max_falls_through_to_target() {
        // 95 is under max=100 but over target=80: rule 2 applies.
        let c = classify(95.0, Some(80.0), Some(100.0));
        assert_eq!(c.status, BreachStatus::Exceed);
        assert_eq!(c.difference, Some(15.0));
    }
}
