//! Median-based price anomaly detection
//!
//! Pure evaluation of a candidate price against a listing's recorded price
//! history. The median of the history (or of the listing's current price when
//! no history exists yet) forms the baseline; a tolerance band around it
//! decides whether the candidate is anomalous and in which direction.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::models::fraud::PriceDirection;

/// Candidates above `median * UPPER_TOLERANCE` are anomalous.
pub const UPPER_TOLERANCE: Decimal = dec!(1.1);

/// Candidates below `median * LOWER_TOLERANCE` are anomalous. Wider than the
/// upper side: markdowns are a normal part of marketplace pricing.
pub const LOWER_TOLERANCE: Decimal = dec!(0.5);

/// Outcome of evaluating one candidate price
#[derive(Debug, Clone, PartialEq)]
pub enum PriceEvaluation {
    /// Median baseline is zero; no deviation can be computed. A normal
    /// outcome for unpriced listings, not an error.
    NotEvaluable,
    /// Candidate sits inside the inclusive tolerance band
    Normal { median: Decimal },
    Anomalous(PriceAnomaly),
}

/// An out-of-band candidate price
#[derive(Debug, Clone, PartialEq)]
pub struct PriceAnomaly {
    /// Median baseline the candidate was judged against
    pub median: Decimal,
    pub direction: PriceDirection,
    /// Exact deviation from the median, in percent
    pub deviation_percent: Decimal,
}

impl PriceAnomaly {
    /// Integer percentage as persisted on alerts
    pub fn rounded_percent(&self) -> i32 {
        self.deviation_percent
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i32()
            .unwrap_or(i32::MAX)
    }
}

/// Median of a sample: middle element for odd lengths, mean of the two middle
/// elements for even lengths. `None` for an empty sample.
pub fn median(sample: &[Decimal]) -> Option<Decimal> {
    if sample.is_empty() {
        return None;
    }
    let mut sorted = sample.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / dec!(2))
    }
}

/// Evaluate a candidate price against recorded history.
///
/// Falls back to a single-element sample of `current_price` when the listing
/// has no history yet. Both band bounds are inclusive: a candidate exactly at
/// `median * 1.1` or `median * 0.5` is not anomalous.
pub fn evaluate_candidate(
    history: &[Decimal],
    current_price: Decimal,
    candidate: Decimal,
) -> PriceEvaluation {
    let median = if history.is_empty() {
        current_price
    } else {
        match median(history) {
            Some(m) => m,
            None => return PriceEvaluation::NotEvaluable,
        }
    };

    if median.is_zero() {
        return PriceEvaluation::NotEvaluable;
    }

    let upper_limit = median * UPPER_TOLERANCE;
    let lower_limit = median * LOWER_TOLERANCE;

    if candidate >= lower_limit && candidate <= upper_limit {
        return PriceEvaluation::Normal { median };
    }

    // Deviation is measured from the median, not from the violated bound
    let deviation_percent = (candidate - median).abs() / median * dec!(100);
    let direction = if candidate > upper_limit {
        PriceDirection::Above
    } else {
        PriceDirection::Below
    };

    PriceEvaluation::Anomalous(PriceAnomaly {
        median,
        direction,
        deviation_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(values: &[i64]) -> Vec<Decimal> {
        values.iter().map(|v| Decimal::from(*v)).collect()
    }

    #[test]
    fn test_median_odd_length() {
        assert_eq!(median(&prices(&[30, 10, 20])), Some(dec!(20)));
        assert_eq!(median(&prices(&[5])), Some(dec!(5)));
    }

    #[test]
    fn test_median_even_length() {
        assert_eq!(median(&prices(&[100, 200])), Some(dec!(150)));
        assert_eq!(median(&prices(&[40, 10, 20, 30])), Some(dec!(25)));
    }

    #[test]
    fn test_median_empty() {
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_zero_median_not_evaluable() {
        let result = evaluate_candidate(&[], dec!(0), dec!(50));
        assert_eq!(result, PriceEvaluation::NotEvaluable);

        let result = evaluate_candidate(&prices(&[0, 0, 0]), dec!(10), dec!(50));
        assert_eq!(result, PriceEvaluation::NotEvaluable);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        // Candidate exactly on either bound is not anomalous
        let history = prices(&[100, 100, 100]);
        assert_eq!(
            evaluate_candidate(&history, dec!(100), dec!(110)),
            PriceEvaluation::Normal { median: dec!(100) }
        );
        assert_eq!(
            evaluate_candidate(&history, dec!(100), dec!(50)),
            PriceEvaluation::Normal { median: dec!(100) }
        );
    }

    #[test]
    fn test_deviation_measured_from_median_not_bound() {
        // 1% past the upper bound: deviation reported against the median
        let history = prices(&[100, 100, 100]);
        match evaluate_candidate(&history, dec!(100), dec!(111.1)) {
            PriceEvaluation::Anomalous(anomaly) => {
                assert_eq!(anomaly.direction, PriceDirection::Above);
                assert_eq!(anomaly.deviation_percent, dec!(11.1));
                assert_eq!(anomaly.rounded_percent(), 11);
            }
            other => panic!("expected anomaly, got {:?}", other),
        }
    }

    #[test]
    fn test_overpriced_candidate() {
        // history [100, 100, 100], candidate 200: ABOVE at 100%
        let history = prices(&[100, 100, 100]);
        match evaluate_candidate(&history, dec!(100), dec!(200)) {
            PriceEvaluation::Anomalous(anomaly) => {
                assert_eq!(anomaly.median, dec!(100));
                assert_eq!(anomaly.direction, PriceDirection::Above);
                assert_eq!(anomaly.rounded_percent(), 100);
            }
            other => panic!("expected anomaly, got {:?}", other),
        }
    }

    #[test]
    fn test_underpriced_candidate() {
        // history [100, 100, 100], candidate 40: BELOW at 60%
        let history = prices(&[100, 100, 100]);
        match evaluate_candidate(&history, dec!(100), dec!(40)) {
            PriceEvaluation::Anomalous(anomaly) => {
                assert_eq!(anomaly.direction, PriceDirection::Below);
                assert_eq!(anomaly.rounded_percent(), 60);
            }
            other => panic!("expected anomaly, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_history_falls_back_to_current_price() {
        // current price 100, candidate 60 is inside [50, 110]
        let result = evaluate_candidate(&[], dec!(100), dec!(60));
        assert_eq!(result, PriceEvaluation::Normal { median: dec!(100) });
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        let anomaly = PriceAnomaly {
            median: dec!(100),
            direction: PriceDirection::Above,
            deviation_percent: dec!(10.5),
        };
        assert_eq!(anomaly.rounded_percent(), 11);

        let anomaly = PriceAnomaly {
            deviation_percent: dec!(10.4),
            ..anomaly
        };
        assert_eq!(anomaly.rounded_percent(), 10);
    }

    #[test]
    fn test_unsorted_history() {
        let history = prices(&[120, 80, 100, 90, 110]);
        match evaluate_candidate(&history, dec!(100), dec!(300)) {
            PriceEvaluation::Anomalous(anomaly) => {
                assert_eq!(anomaly.median, dec!(100));
                assert_eq!(anomaly.rounded_percent(), 200);
            }
            other => panic!("expected anomaly, got {:?}", other),
        }
    }
}
