//! Inference surface. A scan asks one question: how likely is this subject
//! to offend. The learned path answers it with the trained scorer; when no
//! checkpoint is loadable or the features are unusable, the heuristic path
//! answers from the subject's stored risk and criminal neighborhood, and
//! the outcome records which path spoke.

use std::path::Path;

use tracing::warn;

use precog_common::{verdict, PrecogError, ScoreMethod, SubjectProfile};

use crate::checkpoint::Checkpoint;
use crate::net::{Adjacency, Mat, Scorer};
use crate::tensor::GraphTensors;

/// Flat confidence for heuristic answers; the rule has no notion of margin.
pub const HEURISTIC_CONFIDENCE: f64 = 0.6;

const DEGREE_WEIGHT: f64 = 0.1;
const DEGREE_CAP: f64 = 0.4;

/// Fallback rule: stored risk plus a capped bump per criminal acquaintance.
pub fn heuristic_probability(base_risk: f64, criminal_degree: i64) -> f64 {
    let bump = (criminal_degree as f64 * DEGREE_WEIGHT).min(DEGREE_CAP);
    (base_risk + bump).min(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreOutcome {
    pub probability: f64,
    pub confidence: f64,
    pub method: ScoreMethod,
}

/// Trained scorer wrapped for single-subject and whole-graph inference.
pub struct LearnedScorer {
    scorer: Scorer,
}

impl LearnedScorer {
    pub fn new(scorer: Scorer) -> Self {
        Self { scorer }
    }

    pub fn from_checkpoint(path: impl AsRef<Path>) -> Result<Self, PrecogError> {
        let (_, scorer) = Checkpoint::load(path)?.into_models()?;
        Ok(Self { scorer })
    }

    pub fn feature_dim(&self) -> usize {
        self.scorer.in_dim()
    }

    /// Score one subject from its feature row. The subject is treated as an
    /// isolated node; its neighborhood is already folded into the features.
    pub fn score_features(&self, features: &[f32]) -> Result<f64, PrecogError> {
        if features.len() != self.scorer.in_dim() {
            return Err(PrecogError::Model(format!(
                "feature row has {} entries, scorer expects {}",
                features.len(),
                self.scorer.in_dim()
            )));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(PrecogError::Model("feature row contains non-finite values".into()));
        }
        let x = Mat::from_vec(1, features.len(), features.to_vec());
        let probs = self.scorer.score(&x, &Adjacency::isolated(1));
        Ok(probs[0] as f64)
    }

    /// Score every row of a hydrated bundle with the full edge structure.
    pub fn score_all(&self, tensors: &GraphTensors) -> Result<Vec<f64>, PrecogError> {
        if tensors.feature_dim != self.scorer.in_dim() {
            return Err(PrecogError::Model(format!(
                "bundle feature_dim {} does not match scorer input {}",
                tensors.feature_dim,
                self.scorer.in_dim()
            )));
        }
        let x = Mat::from_vec(tensors.num_nodes, tensors.feature_dim, tensors.features.clone());
        let adj = Adjacency::from_tensors(tensors);
        Ok(self.scorer.score(&x, &adj).iter().map(|&p| p as f64).collect())
    }
}

/// Which engine answers scans. Built once at startup; a missing or corrupt
/// checkpoint downgrades the whole backend to heuristic rather than failing
/// the service.
pub enum ScoringBackend {
    Learned(LearnedScorer),
    Heuristic,
}

impl ScoringBackend {
    /// Prefer the checkpoint at `path`, fall back to the heuristic when it
    /// cannot be loaded.
    pub fn from_checkpoint_or_heuristic(path: impl AsRef<Path>) -> Self {
        match LearnedScorer::from_checkpoint(&path) {
            Ok(scorer) => Self::Learned(scorer),
            Err(e) => {
                warn!(path = ?path.as_ref(), error = %e, "checkpoint unavailable, using heuristic scoring");
                Self::Heuristic
            }
        }
    }

    pub fn method(&self) -> ScoreMethod {
        match self {
            Self::Learned(_) => ScoreMethod::Learned,
            Self::Heuristic => ScoreMethod::Heuristic,
        }
    }

    /// Score a subject. A learned backend that rejects this particular
    /// feature row recovers into the heuristic for this scan only, and the
    /// outcome's method says so.
    pub fn score_subject(&self, profile: &SubjectProfile, features: &[f32]) -> ScoreOutcome {
        match self {
            Self::Learned(scorer) => match scorer.score_features(features) {
                Ok(p) => ScoreOutcome {
                    probability: p,
                    confidence: verdict::confidence(p),
                    method: ScoreMethod::Learned,
                },
                Err(e) => {
                    warn!(citizen_id = profile.id, error = %e, "learned scoring failed, falling back");
                    heuristic_outcome(profile)
                }
            },
            Self::Heuristic => heuristic_outcome(profile),
        }
    }
}

fn heuristic_outcome(profile: &SubjectProfile) -> ScoreOutcome {
    ScoreOutcome {
        probability: heuristic_probability(profile.risk_seed, profile.criminal_degree),
        confidence: HEURISTIC_CONFIDENCE,
        method: ScoreMethod::Heuristic,
    }
}
