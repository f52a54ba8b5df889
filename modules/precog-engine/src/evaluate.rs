//! Offline evaluation: distribution of structural scores over the whole
//! population, and the INTERVENE-precision backtest against crimes that
//! actually followed. The structural score and the supervised label are
//! reported side by side, never combined.

use tracing::info;

use precog_common::PrecogError;
use precog_graph::{BacktestReport, FeatureHydrator, GraphClient, PredictionAuditor};
use precog_model::LearnedScorer;

/// Distribution summary of one score vector.
#[derive(Debug, Clone, Copy)]
pub struct ScoreStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

pub fn score_stats(scores: &[f64]) -> ScoreStats {
    if scores.is_empty() {
        return ScoreStats { count: 0, mean: 0.0, std: 0.0, min: 0.0, max: 0.0 };
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    ScoreStats { count: scores.len(), mean, std: var.sqrt(), min, max }
}

#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub scores: ScoreStats,
    /// Mean structural score among labeled offenders vs the rest, reported
    /// separately as a sanity signal.
    pub offender_mean: Option<f64>,
    pub clean_mean: Option<f64>,
    pub backtest: BacktestReport,
}

/// Runs the offline evaluation pass over a live graph.
pub struct Evaluator {
    hydrator: FeatureHydrator,
    auditor: PredictionAuditor,
}

impl Evaluator {
    pub fn new(client: GraphClient, current_year: i32) -> Self {
        Self {
            hydrator: FeatureHydrator::new(client.clone(), current_year),
            auditor: PredictionAuditor::new(client),
        }
    }

    pub async fn evaluate(
        &self,
        scorer: &LearnedScorer,
        backtest_window_days: i64,
    ) -> Result<EvaluationReport, PrecogError> {
        let hydrated = self.hydrator.hydrate().await?;
        let scores = scorer.score_all(&hydrated.tensors)?;

        let mut offenders = Vec::new();
        let mut clean = Vec::new();
        for (i, &score) in scores.iter().enumerate() {
            if hydrated.tensors.labels[i] > 0 {
                offenders.push(score);
            } else {
                clean.push(score);
            }
        }
        let offender_mean = mean(&offenders);
        let clean_mean = mean(&clean);

        let backtest = self
            .auditor
            .backtest(backtest_window_days)
            .await
            .map_err(PrecogError::database)?;

        let stats = score_stats(&scores);
        info!(
            scored = stats.count,
            mean = stats.mean,
            std = stats.std,
            backtest_precision = ?backtest.precision(),
            "evaluation complete"
        );
        Ok(EvaluationReport { scores: stats, offender_mean, clean_mean, backtest })
    }
}

fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        None
    } else {
        Some(xs.iter().sum::<f64>() / xs.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scores_yield_zeroed_stats() {
        let s = score_stats(&[]);
        assert_eq!(s.count, 0);
        assert_eq!(s.mean, 0.0);
        assert_eq!(s.std, 0.0);
    }

    #[test]
    fn stats_match_hand_computation() {
        let s = score_stats(&[0.2, 0.4, 0.6, 0.8]);
        assert_eq!(s.count, 4);
        assert!((s.mean - 0.5).abs() < 1e-12);
        assert!((s.min - 0.2).abs() < 1e-12);
        assert!((s.max - 0.8).abs() < 1e-12);
        // population std of {0.2,0.4,0.6,0.8}
        assert!((s.std - 0.223606797).abs() < 1e-6);
    }

    #[test]
    fn single_score_has_zero_spread() {
        let s = score_stats(&[0.7]);
        assert_eq!(s.std, 0.0);
        assert_eq!(s.min, s.max);
    }
}
