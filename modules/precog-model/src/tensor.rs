use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use precog_common::PrecogError;

/// Train/val/test proportions. Test takes whatever remains.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self { train: 0.70, val: 0.15 }
    }
}

/// Per-column summary used to sanity-check normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStats {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

/// Model-ready view of one hydration pass: feature matrix, edge index,
/// label vector, and split masks, all sharing a single row order. Row `i`
/// refers to the same citizen in every field; `node_ids[i]` maps back to
/// the graph id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphTensors {
    pub num_nodes: usize,
    pub feature_dim: usize,
    /// Row-major, `num_nodes * feature_dim` entries.
    pub features: Vec<f32>,
    /// Edge index as two parallel rows; empty graph yields two empty rows.
    pub edge_sources: Vec<u32>,
    pub edge_targets: Vec<u32>,
    /// Supervised crime label per row. Offline/synthetic path only.
    pub labels: Vec<u8>,
    pub train_mask: Vec<bool>,
    pub val_mask: Vec<bool>,
    pub test_mask: Vec<bool>,
    pub node_ids: Vec<i64>,
}

impl GraphTensors {
    pub fn new(
        node_ids: Vec<i64>,
        feature_dim: usize,
        features: Vec<f32>,
        edge_sources: Vec<u32>,
        edge_targets: Vec<u32>,
        labels: Vec<u8>,
    ) -> Result<Self, PrecogError> {
        let num_nodes = node_ids.len();
        if features.len() != num_nodes * feature_dim {
            return Err(PrecogError::Hydration(format!(
                "feature matrix has {} entries, expected {num_nodes} x {feature_dim}",
                features.len()
            )));
        }
        if labels.len() != num_nodes {
            return Err(PrecogError::Hydration(format!(
                "label vector has {} entries for {num_nodes} nodes",
                labels.len()
            )));
        }
        if edge_sources.len() != edge_targets.len() {
            return Err(PrecogError::Hydration(format!(
                "ragged edge index: {} sources vs {} targets",
                edge_sources.len(),
                edge_targets.len()
            )));
        }
        if let Some(&bad) = edge_sources
            .iter()
            .chain(edge_targets.iter())
            .find(|&&e| e as usize >= num_nodes)
        {
            return Err(PrecogError::Hydration(format!(
                "edge endpoint {bad} outside node range 0..{num_nodes}"
            )));
        }
        Ok(Self {
            num_nodes,
            feature_dim,
            features,
            edge_sources,
            edge_targets,
            labels,
            train_mask: vec![false; num_nodes],
            val_mask: vec![false; num_nodes],
            test_mask: vec![false; num_nodes],
            node_ids,
        })
    }

    pub fn edge_count(&self) -> usize {
        self.edge_sources.len()
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.features[i * self.feature_dim..(i + 1) * self.feature_dim]
    }

    /// Assign split masks from a random permutation of row indices. Masking
    /// only: nodes, edges, and labels are untouched.
    pub fn split(&mut self, ratios: SplitRatios, seed: Option<u64>) {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        let mut indices: Vec<usize> = (0..self.num_nodes).collect();
        indices.shuffle(&mut rng);

        let train_size = (ratios.train * self.num_nodes as f64) as usize;
        let val_size = (ratios.val * self.num_nodes as f64) as usize;

        self.train_mask = vec![false; self.num_nodes];
        self.val_mask = vec![false; self.num_nodes];
        self.test_mask = vec![false; self.num_nodes];
        for (pos, &i) in indices.iter().enumerate() {
            if pos < train_size {
                self.train_mask[i] = true;
            } else if pos < train_size + val_size {
                self.val_mask[i] = true;
            } else {
                self.test_mask[i] = true;
            }
        }
    }

    /// Column-wise mean/std/min/max over the feature matrix.
    pub fn column_stats(&self) -> ColumnStats {
        let d = self.feature_dim;
        let n = self.num_nodes.max(1) as f32;
        let mut mean = vec![0.0f32; d];
        let mut min = vec![f32::INFINITY; d];
        let mut max = vec![f32::NEG_INFINITY; d];

        for i in 0..self.num_nodes {
            for (j, &v) in self.row(i).iter().enumerate() {
                mean[j] += v;
                min[j] = min[j].min(v);
                max[j] = max[j].max(v);
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut std = vec![0.0f32; d];
        for i in 0..self.num_nodes {
            for (j, &v) in self.row(i).iter().enumerate() {
                std[j] += (v - mean[j]).powi(2);
            }
        }
        for s in std.iter_mut() {
            *s = (*s / n).sqrt();
        }

        if self.num_nodes == 0 {
            min = vec![0.0; d];
            max = vec![0.0; d];
        }
        ColumnStats { mean, std, min, max }
    }

    /// Serialize the bundle so training runs do not need a live graph.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PrecogError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PrecogError::Hydration(format!("create {parent:?}: {e}")))?;
        }
        let json = serde_json::to_string(self)
            .map_err(|e| PrecogError::Hydration(format!("serialize tensors: {e}")))?;
        std::fs::write(&path, json)
            .map_err(|e| PrecogError::Hydration(format!("write {:?}: {e}", path.as_ref())))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PrecogError> {
        let json = std::fs::read_to_string(&path)
            .map_err(|e| PrecogError::Hydration(format!("read {:?}: {e}", path.as_ref())))?;
        serde_json::from_str(&json)
            .map_err(|e| PrecogError::Hydration(format!("parse tensor bundle: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy(num_nodes: usize) -> GraphTensors {
        let features = (0..num_nodes * 2).map(|v| v as f32).collect();
        GraphTensors::new(
            (0..num_nodes as i64).collect(),
            2,
            features,
            vec![],
            vec![],
            vec![0; num_nodes],
        )
        .unwrap()
    }

    #[test]
    fn empty_graph_has_empty_edge_rows() {
        let t = toy(4);
        assert_eq!(t.edge_count(), 0);
        assert!(t.edge_sources.is_empty() && t.edge_targets.is_empty());
    }

    #[test]
    fn out_of_range_edge_rejected() {
        let r = GraphTensors::new(vec![0, 1], 1, vec![0.0, 1.0], vec![0], vec![5], vec![0, 0]);
        assert!(r.is_err());
    }

    #[test]
    fn ragged_edge_index_rejected() {
        let r = GraphTensors::new(vec![0, 1], 1, vec![0.0, 1.0], vec![0, 1], vec![1], vec![0, 0]);
        assert!(r.is_err());
    }

    #[test]
    fn split_masks_are_disjoint_and_exhaustive() {
        let mut t = toy(100);
        t.split(SplitRatios::default(), Some(1));

        let train = t.train_mask.iter().filter(|&&m| m).count();
        let val = t.val_mask.iter().filter(|&&m| m).count();
        let test = t.test_mask.iter().filter(|&&m| m).count();
        assert_eq!(train, 70);
        assert_eq!(val, 15);
        assert_eq!(test, 15);

        for i in 0..100 {
            let assigned =
                t.train_mask[i] as u8 + t.val_mask[i] as u8 + t.test_mask[i] as u8;
            assert_eq!(assigned, 1, "row {i} must land in exactly one split");
        }
    }

    #[test]
    fn split_is_masking_only() {
        let mut t = toy(50);
        let features_before = t.features.clone();
        let labels_before = t.labels.clone();
        t.split(SplitRatios::default(), Some(2));
        assert_eq!(t.features, features_before);
        assert_eq!(t.labels, labels_before);
    }

    #[test]
    fn column_stats_match_hand_computation() {
        let t = GraphTensors::new(
            vec![0, 1],
            2,
            vec![0.0, 10.0, 4.0, 20.0],
            vec![],
            vec![],
            vec![0, 1],
        )
        .unwrap();
        let s = t.column_stats();
        assert_eq!(s.mean, vec![2.0, 15.0]);
        assert_eq!(s.min, vec![0.0, 10.0]);
        assert_eq!(s.max, vec![4.0, 20.0]);
        assert!((s.std[0] - 2.0).abs() < 1e-6);
        assert!((s.std[1] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn artifact_round_trip_preserves_bundle() {
        let dir = std::env::temp_dir().join("precog-tensor-test");
        let path = dir.join("bundle.json");
        let mut t = GraphTensors::new(
            vec![3, 7, 9],
            1,
            vec![0.5, 0.25, 1.0],
            vec![0, 1],
            vec![1, 2],
            vec![1, 0, 0],
        )
        .unwrap();
        t.split(SplitRatios::default(), Some(5));
        t.save(&path).unwrap();

        let back = GraphTensors::load(&path).unwrap();
        assert_eq!(back.node_ids, t.node_ids);
        assert_eq!(back.features, t.features);
        assert_eq!(back.edge_sources, t.edge_sources);
        assert_eq!(back.edge_targets, t.edge_targets);
        assert_eq!(back.labels, t.labels);
        assert_eq!(back.train_mask, t.train_mask);
        std::fs::remove_dir_all(dir).ok();
    }
}
