//! Trained-weight persistence. One JSON artifact holds both networks so a
//! scan process can come up without retraining; loading validates every
//! dimension before any weight is trusted.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use precog_common::PrecogError;

use crate::net::{GraphConv, Mat, Proposer, Scorer};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvWeights {
    pub in_dim: usize,
    pub out_dim: usize,
    pub w_self: Vec<f32>,
    pub w_neigh: Vec<f32>,
    pub bias: Vec<f32>,
}

impl ConvWeights {
    fn from_conv(conv: &GraphConv) -> Self {
        Self {
            in_dim: conv.in_dim(),
            out_dim: conv.out_dim(),
            w_self: conv.w_self.data.clone(),
            w_neigh: conv.w_neigh.data.clone(),
            bias: conv.bias.clone(),
        }
    }

    fn into_conv(self, name: &str) -> Result<GraphConv, PrecogError> {
        let expected = self.in_dim * self.out_dim;
        if self.w_self.len() != expected || self.w_neigh.len() != expected {
            return Err(PrecogError::Model(format!(
                "{name}: weight blocks of {} / {} entries do not match {} x {}",
                self.w_self.len(),
                self.w_neigh.len(),
                self.in_dim,
                self.out_dim
            )));
        }
        if self.bias.len() != self.out_dim {
            return Err(PrecogError::Model(format!(
                "{name}: bias has {} entries for out_dim {}",
                self.bias.len(),
                self.out_dim
            )));
        }
        Ok(GraphConv {
            w_self: Mat::from_vec(self.in_dim, self.out_dim, self.w_self),
            w_neigh: Mat::from_vec(self.in_dim, self.out_dim, self.w_neigh),
            bias: self.bias,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetWeights {
    pub conv1: ConvWeights,
    pub conv2: ConvWeights,
}

/// Snapshot of a trained adversarial pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub feature_dim: usize,
    pub hidden_dim: usize,
    pub proposer: NetWeights,
    pub scorer: NetWeights,
}

impl Checkpoint {
    pub fn from_models(proposer: &Proposer, scorer: &Scorer) -> Self {
        Self {
            feature_dim: scorer.conv1.in_dim(),
            hidden_dim: scorer.conv1.out_dim(),
            proposer: NetWeights {
                conv1: ConvWeights::from_conv(&proposer.conv1),
                conv2: ConvWeights::from_conv(&proposer.conv2),
            },
            scorer: NetWeights {
                conv1: ConvWeights::from_conv(&scorer.conv1),
                conv2: ConvWeights::from_conv(&scorer.conv2),
            },
        }
    }

    /// Rebuild the pair, rejecting any artifact whose layer shapes do not
    /// line up with its own header or with each other.
    pub fn into_models(self) -> Result<(Proposer, Scorer), PrecogError> {
        if self.scorer.conv1.in_dim != self.feature_dim {
            return Err(PrecogError::Model(format!(
                "scorer expects {} input features, checkpoint header says {}",
                self.scorer.conv1.in_dim, self.feature_dim
            )));
        }
        if self.scorer.conv1.out_dim != self.hidden_dim {
            return Err(PrecogError::Model(format!(
                "scorer hidden layer is width {}, checkpoint header says {}",
                self.scorer.conv1.out_dim, self.hidden_dim
            )));
        }
        if self.scorer.conv2.out_dim != 1 {
            return Err(PrecogError::Model(format!(
                "scorer output layer must be width 1, found {}",
                self.scorer.conv2.out_dim
            )));
        }
        if self.proposer.conv1.out_dim != self.proposer.conv2.in_dim
            || self.scorer.conv1.out_dim != self.scorer.conv2.in_dim
        {
            return Err(PrecogError::Model(
                "hidden layer widths disagree between conv1 and conv2".into(),
            ));
        }
        let proposer = Proposer {
            conv1: self.proposer.conv1.into_conv("proposer conv1")?,
            conv2: self.proposer.conv2.into_conv("proposer conv2")?,
        };
        let scorer = Scorer {
            conv1: self.scorer.conv1.into_conv("scorer conv1")?,
            conv2: self.scorer.conv2.into_conv("scorer conv2")?,
        };
        Ok((proposer, scorer))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PrecogError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PrecogError::Model(format!("create {parent:?}: {e}")))?;
        }
        let json = serde_json::to_string(self)
            .map_err(|e| PrecogError::Model(format!("serialize checkpoint: {e}")))?;
        std::fs::write(&path, json)
            .map_err(|e| PrecogError::Model(format!("write {:?}: {e}", path.as_ref())))?;
        info!(path = ?path.as_ref(), "checkpoint saved");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PrecogError> {
        let json = std::fs::read_to_string(&path)
            .map_err(|e| PrecogError::Model(format!("read {:?}: {e}", path.as_ref())))?;
        serde_json::from_str(&json)
            .map_err(|e| PrecogError::Model(format!("parse checkpoint: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pair() -> (Proposer, Scorer) {
        let mut rng = StdRng::seed_from_u64(11);
        (Proposer::new(5, 8, 5, &mut rng), Scorer::new(5, 8, &mut rng))
    }

    #[test]
    fn round_trip_preserves_weights() {
        let (p, s) = pair();
        let dir = std::env::temp_dir().join("precog-checkpoint-test");
        let path = dir.join("models.json");

        Checkpoint::from_models(&p, &s).save(&path).unwrap();
        let (p2, s2) = Checkpoint::load(&path).unwrap().into_models().unwrap();

        assert_eq!(p.conv1.w_self.data, p2.conv1.w_self.data);
        assert_eq!(s.conv2.bias, s2.conv2.bias);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn header_dim_mismatch_is_rejected() {
        let (p, s) = pair();
        let mut checkpoint = Checkpoint::from_models(&p, &s);
        checkpoint.feature_dim = 9;
        assert!(checkpoint.into_models().is_err());
    }

    #[test]
    fn header_hidden_width_mismatch_is_rejected() {
        let (p, s) = pair();
        let mut checkpoint = Checkpoint::from_models(&p, &s);
        checkpoint.hidden_dim = 16;
        assert!(checkpoint.into_models().is_err());
    }

    #[test]
    fn truncated_weight_block_is_rejected() {
        let (p, s) = pair();
        let mut checkpoint = Checkpoint::from_models(&p, &s);
        checkpoint.scorer.conv1.w_self.pop();
        assert!(checkpoint.into_models().is_err());
    }

    #[test]
    fn scorer_must_end_in_a_single_output() {
        let (p, s) = pair();
        let mut checkpoint = Checkpoint::from_models(&p, &s);
        checkpoint.scorer.conv2.out_dim = 2;
        assert!(checkpoint.into_models().is_err());
    }
}
