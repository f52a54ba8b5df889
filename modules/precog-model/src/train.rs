//! Adversarial training loop. The proposer learns to emit embeddings that
//! look like genuine criminal structure; the scorer learns to tell them
//! apart from the hydrated features. The scorer is the artifact that
//! matters at inference time.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use precog_common::PrecogError;

use crate::net::{Adjacency, Mat, Proposer, Scorer};
use crate::tensor::GraphTensors;

const EPSILON: f32 = 1e-9;
const LOG_EVERY: u32 = 10;

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub epochs: u32,
    pub hidden_dim: usize,
    pub lr_proposer: f32,
    pub lr_scorer: f32,
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            hidden_dim: 64,
            lr_proposer: 0.01,
            lr_scorer: 0.01,
            seed: None,
        }
    }
}

/// What a run produced, for logging and for regression checks.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub epochs: u32,
    pub first_scorer_loss: f32,
    pub final_scorer_loss: f32,
    pub final_proposer_loss: f32,
    /// Fraction of validation rows the trained scorer rates above 0.5,
    /// scored on real features. Diagnostic only.
    pub val_real_rate: f32,
}

/// Run the two-player loop over the training rows of `tensors` and return
/// the trained pair. Falls back to treating every row as training when the
/// bundle was never split.
///
/// Not safe to run concurrently against the same checkpoint path; callers
/// serialize training runs.
pub fn train_adversarial(
    tensors: &GraphTensors,
    config: &TrainConfig,
) -> Result<(Proposer, Scorer, TrainReport), PrecogError> {
    if tensors.num_nodes == 0 {
        return Err(PrecogError::Model("cannot train on an empty graph".into()));
    }
    if config.epochs == 0 {
        return Err(PrecogError::Model("epochs must be at least 1".into()));
    }

    let mut rng = match config.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    };

    let dim = tensors.feature_dim;
    let mut proposer = Proposer::new(dim, config.hidden_dim, dim, &mut rng);
    let mut scorer = Scorer::new(dim, config.hidden_dim, &mut rng);

    let adj = Adjacency::from_tensors(tensors);
    let x = Mat::from_vec(tensors.num_nodes, dim, tensors.features.clone());

    let has_split = tensors.train_mask.iter().any(|&m| m);
    let train_rows: Vec<usize> = (0..tensors.num_nodes)
        .filter(|&i| !has_split || tensors.train_mask[i])
        .collect();
    if train_rows.is_empty() {
        return Err(PrecogError::Model("split left no training rows".into()));
    }
    let n = train_rows.len() as f32;

    let mut first_scorer_loss = 0.0;
    let mut scorer_loss = 0.0;
    let mut proposer_loss = 0.0;

    for epoch in 0..config.epochs {
        // Scorer step: push real rows toward 1, proposed rows toward 0.
        let (fake, _) = proposer.forward(&x, &adj);
        let real_eval = scorer.forward(&x, &adj);
        let fake_eval = scorer.forward(&fake, &adj);

        scorer_loss = 0.0;
        let mut d_real = vec![0.0f32; tensors.num_nodes];
        let mut d_fake = vec![0.0f32; tensors.num_nodes];
        for &i in &train_rows {
            let pr = real_eval.probs[i];
            let pf = fake_eval.probs[i];
            scorer_loss -= ((pr + EPSILON).ln() + (1.0 - pf + EPSILON).ln()) / n;
            d_real[i] = -1.0 / (pr + EPSILON) / n;
            d_fake[i] = 1.0 / (1.0 - pf + EPSILON) / n;
        }
        let (mut s_grads, _) = scorer.backward(&real_eval, &d_real, &adj);
        let (fake_grads, _) = scorer.backward(&fake_eval, &d_fake, &adj);
        s_grads.accumulate(fake_grads);
        scorer.apply(&s_grads, config.lr_scorer);

        // Proposer step: make proposals the updated scorer rates as real.
        let (fake, trace) = proposer.forward(&x, &adj);
        let fake_eval = scorer.forward(&fake, &adj);

        proposer_loss = 0.0;
        let mut d_probs = vec![0.0f32; tensors.num_nodes];
        for &i in &train_rows {
            let pf = fake_eval.probs[i];
            proposer_loss -= (pf + EPSILON).ln() / n;
            d_probs[i] = -1.0 / (pf + EPSILON) / n;
        }
        let (_, d_fake_input) = scorer.backward(&fake_eval, &d_probs, &adj);
        let p_grads = proposer.backward(&trace, &d_fake_input, &adj);
        proposer.apply(&p_grads, config.lr_proposer);

        if epoch == 0 {
            first_scorer_loss = scorer_loss;
        }
        if epoch % LOG_EVERY == 0 {
            info!(epoch, scorer_loss, proposer_loss, "adversarial round");
        }
    }

    let val_real_rate = validation_real_rate(&scorer, &x, &adj, tensors);
    let report = TrainReport {
        epochs: config.epochs,
        first_scorer_loss,
        final_scorer_loss: scorer_loss,
        final_proposer_loss: proposer_loss,
        val_real_rate,
    };
    info!(
        epochs = report.epochs,
        final_scorer_loss = report.final_scorer_loss,
        val_real_rate = report.val_real_rate,
        "training finished"
    );
    Ok((proposer, scorer, report))
}

fn validation_real_rate(scorer: &Scorer, x: &Mat, adj: &Adjacency, tensors: &GraphTensors) -> f32 {
    let val_rows: Vec<usize> = (0..tensors.num_nodes)
        .filter(|&i| tensors.val_mask[i])
        .collect();
    if val_rows.is_empty() {
        return 0.0;
    }
    let probs = scorer.score(x, adj);
    let above = val_rows.iter().filter(|&&i| probs[i] > 0.5).count();
    above as f32 / val_rows.len() as f32
}
