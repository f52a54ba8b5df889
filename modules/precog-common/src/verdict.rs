use crate::error::PrecogError;
use crate::types::Verdict;
use crate::{INTERVENE_THRESHOLD, WATCHLIST_THRESHOLD};

/// Ordered verdict thresholds. Invariant: 0 <= watchlist < intervene <= 1.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub watchlist: f64,
    pub intervene: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            watchlist: WATCHLIST_THRESHOLD,
            intervene: INTERVENE_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn new(watchlist: f64, intervene: f64) -> Result<Self, PrecogError> {
        if !(0.0..=1.0).contains(&watchlist)
            || !(0.0..=1.0).contains(&intervene)
            || watchlist >= intervene
        {
            return Err(PrecogError::Config(format!(
                "thresholds must satisfy 0 <= watchlist < intervene <= 1, got {watchlist} / {intervene}"
            )));
        }
        Ok(Self { watchlist, intervene })
    }
}

/// Map a probability to a verdict tier. Boundaries are inclusive toward the
/// higher tier: classify(watchlist) is already WATCHLIST.
pub fn classify(probability: f64, thresholds: Thresholds) -> Verdict {
    if probability >= thresholds.intervene {
        Verdict::Intervene
    } else if probability >= thresholds.watchlist {
        Verdict::Watchlist
    } else {
        Verdict::Safe
    }
}

/// Confidence as distance from the decision midpoint, scaled to [0,1].
/// A property of the inference contract, independent of the backend.
pub fn confidence(probability: f64) -> f64 {
    (probability - 0.5).abs() * 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> Thresholds {
        Thresholds::default()
    }

    #[test]
    fn zero_probability_is_safe() {
        assert_eq!(classify(0.0, t()), Verdict::Safe);
    }

    #[test]
    fn watchlist_boundary_is_inclusive_upward() {
        assert_eq!(classify(0.60, t()), Verdict::Watchlist);
        assert_eq!(classify(0.5999, t()), Verdict::Safe);
    }

    #[test]
    fn intervene_boundary_is_inclusive_upward() {
        assert_eq!(classify(0.85, t()), Verdict::Intervene);
        assert_eq!(classify(0.8499, t()), Verdict::Watchlist);
    }

    #[test]
    fn certainty_classifies_intervene() {
        assert_eq!(classify(1.0, t()), Verdict::Intervene);
    }

    #[test]
    fn confidence_at_midpoint_is_zero() {
        assert_eq!(confidence(0.5), 0.0);
    }

    #[test]
    fn confidence_at_extremes_is_one() {
        assert_eq!(confidence(0.0), 1.0);
        assert_eq!(confidence(1.0), 1.0);
    }

    #[test]
    fn confidence_is_monotonic_in_distance_from_midpoint() {
        let mut last = -1.0;
        for p in [0.5, 0.55, 0.6, 0.7, 0.8, 0.9, 1.0] {
            let c = confidence(p);
            assert!(c > last, "confidence({p}) = {c} not > {last}");
            last = c;
        }
    }

    #[test]
    fn inverted_thresholds_rejected() {
        assert!(Thresholds::new(0.9, 0.5).is_err());
        assert!(Thresholds::new(0.5, 0.5).is_err());
        assert!(Thresholds::new(-0.1, 0.5).is_err());
        assert!(Thresholds::new(0.5, 1.1).is_err());
        assert!(Thresholds::new(0.0, 1.0).is_ok());
    }
}
