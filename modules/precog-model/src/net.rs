//! The adversarial pair: an embedding proposer and a plausibility scorer,
//! both built from mean-aggregation graph convolutions with hand-written
//! gradients. The aggregator choice is an implementation detail of the
//! `score` contract; everything outside this module sees probabilities.

use rand::rngs::StdRng;
use rand::Rng;

use crate::tensor::GraphTensors;

/// Dense row-major matrix. Small enough graphs that naive loops are fine.
#[derive(Debug, Clone)]
pub struct Mat {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Mat {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0.0; rows * cols] }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), rows * cols);
        Self { rows, cols, data }
    }

    /// Glorot-uniform init.
    pub fn xavier(rows: usize, cols: usize, rng: &mut StdRng) -> Self {
        let scale = (6.0 / (rows + cols) as f32).sqrt();
        let data = (0..rows * cols)
            .map(|_| rng.random_range(-scale..scale))
            .collect();
        Self { rows, cols, data }
    }

    #[inline]
    pub fn at(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }

    #[inline]
    fn at_mut(&mut self, r: usize, c: usize) -> &mut f32 {
        &mut self.data[r * self.cols + c]
    }

    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// self (n×k) · other (k×m) → (n×m)
    pub fn matmul(&self, other: &Mat) -> Mat {
        assert_eq!(self.cols, other.rows);
        let mut out = Mat::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self.at(i, k);
                if a == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    *out.at_mut(i, j) += a * other.at(k, j);
                }
            }
        }
        out
    }

    /// selfᵀ (k×n) · other (n×m) → (k×m)
    pub fn t_matmul(&self, other: &Mat) -> Mat {
        assert_eq!(self.rows, other.rows);
        let mut out = Mat::zeros(self.cols, other.cols);
        for n in 0..self.rows {
            for k in 0..self.cols {
                let a = self.at(n, k);
                if a == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    *out.at_mut(k, j) += a * other.at(n, j);
                }
            }
        }
        out
    }

    /// self (n×k) · otherᵀ (m×k) → (n×m)
    pub fn matmul_t(&self, other: &Mat) -> Mat {
        assert_eq!(self.cols, other.cols);
        let mut out = Mat::zeros(self.rows, other.rows);
        for i in 0..self.rows {
            for j in 0..other.rows {
                let mut acc = 0.0;
                for k in 0..self.cols {
                    acc += self.at(i, k) * other.at(j, k);
                }
                *out.at_mut(i, j) = acc;
            }
        }
        out
    }

    pub fn add_scaled(&mut self, other: &Mat, scale: f32) {
        assert_eq!(self.data.len(), other.data.len());
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b * scale;
        }
    }

    pub fn col_sums(&self) -> Vec<f32> {
        let mut sums = vec![0.0; self.cols];
        for r in 0..self.rows {
            for c in 0..self.cols {
                sums[c] += self.at(r, c);
            }
        }
        sums
    }
}

/// In-neighbor lists for mean aggregation, precomputed from the edge index.
pub struct Adjacency {
    pub num_nodes: usize,
    in_neighbors: Vec<Vec<u32>>,
}

impl Adjacency {
    pub fn from_edges(num_nodes: usize, sources: &[u32], targets: &[u32]) -> Self {
        let mut in_neighbors = vec![Vec::new(); num_nodes];
        for (&s, &t) in sources.iter().zip(targets.iter()) {
            if (s as usize) < num_nodes && (t as usize) < num_nodes {
                in_neighbors[t as usize].push(s);
            }
        }
        Self { num_nodes, in_neighbors }
    }

    pub fn from_tensors(tensors: &GraphTensors) -> Self {
        Self::from_edges(tensors.num_nodes, &tensors.edge_sources, &tensors.edge_targets)
    }

    /// A graph with no edges at all: aggregation contributes nothing and
    /// each conv degenerates to a per-node linear layer.
    pub fn isolated(num_nodes: usize) -> Self {
        Self { num_nodes, in_neighbors: vec![Vec::new(); num_nodes] }
    }

    /// nx[i] = mean over in-neighbors j of x[j]; zero row when isolated.
    fn mean_gather(&self, x: &Mat) -> Mat {
        let mut out = Mat::zeros(x.rows, x.cols);
        for (i, neigh) in self.in_neighbors.iter().enumerate() {
            if neigh.is_empty() {
                continue;
            }
            let inv = 1.0 / neigh.len() as f32;
            for &j in neigh {
                for c in 0..x.cols {
                    *out.at_mut(i, c) += x.at(j as usize, c) * inv;
                }
            }
        }
        out
    }

    /// Transpose of mean_gather: routes each aggregated gradient back to the
    /// neighbors it was averaged from.
    fn mean_scatter(&self, d: &Mat) -> Mat {
        let mut out = Mat::zeros(d.rows, d.cols);
        for (i, neigh) in self.in_neighbors.iter().enumerate() {
            if neigh.is_empty() {
                continue;
            }
            let inv = 1.0 / neigh.len() as f32;
            for &j in neigh {
                for c in 0..d.cols {
                    *out.at_mut(j as usize, c) += d.at(i, c) * inv;
                }
            }
        }
        out
    }
}

/// y = x·W_self + mean_neigh(x)·W_neigh + b
pub struct GraphConv {
    pub w_self: Mat,
    pub w_neigh: Mat,
    pub bias: Vec<f32>,
}

pub struct ConvGrads {
    pub w_self: Mat,
    pub w_neigh: Mat,
    pub bias: Vec<f32>,
}

impl GraphConv {
    pub fn new(in_dim: usize, out_dim: usize, rng: &mut StdRng) -> Self {
        Self {
            w_self: Mat::xavier(in_dim, out_dim, rng),
            w_neigh: Mat::xavier(in_dim, out_dim, rng),
            bias: vec![0.0; out_dim],
        }
    }

    pub fn in_dim(&self) -> usize {
        self.w_self.rows
    }

    pub fn out_dim(&self) -> usize {
        self.w_self.cols
    }

    /// Returns (output, aggregated input); the latter is cached for backward.
    fn forward(&self, x: &Mat, adj: &Adjacency) -> (Mat, Mat) {
        let nx = adj.mean_gather(x);
        let mut y = x.matmul(&self.w_self);
        y.add_scaled(&nx.matmul(&self.w_neigh), 1.0);
        for r in 0..y.rows {
            for c in 0..y.cols {
                *y.at_mut(r, c) += self.bias[c];
            }
        }
        (y, nx)
    }

    /// Given dL/dy plus the cached forward inputs, produce parameter
    /// gradients and dL/dx.
    fn backward(&self, x: &Mat, nx: &Mat, dy: &Mat, adj: &Adjacency) -> (ConvGrads, Mat) {
        let grads = ConvGrads {
            w_self: x.t_matmul(dy),
            w_neigh: nx.t_matmul(dy),
            bias: dy.col_sums(),
        };
        let mut dx = dy.matmul_t(&self.w_self);
        let d_nx = dy.matmul_t(&self.w_neigh);
        dx.add_scaled(&adj.mean_scatter(&d_nx), 1.0);
        (grads, dx)
    }

    fn apply(&mut self, grads: &ConvGrads, lr: f32) {
        self.w_self.add_scaled(&grads.w_self, -lr);
        self.w_neigh.add_scaled(&grads.w_neigh, -lr);
        for (b, g) in self.bias.iter_mut().zip(grads.bias.iter()) {
            *b -= g * lr;
        }
    }
}

fn relu(m: &Mat) -> Mat {
    Mat::from_vec(m.rows, m.cols, m.data.iter().map(|v| v.max(0.0)).collect())
}

fn relu_backward(pre: &Mat, d: &Mat) -> Mat {
    Mat::from_vec(
        d.rows,
        d.cols,
        pre.data
            .iter()
            .zip(d.data.iter())
            .map(|(p, g)| if *p > 0.0 { *g } else { 0.0 })
            .collect(),
    )
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

/// Two-layer cache shared by both networks.
pub struct Trace {
    x: Mat,
    nx1: Mat,
    h_pre: Mat,
    h: Mat,
    nx2: Mat,
}

/// The proposer maps (features, edges) to a latent embedding with the same
/// width as its input, so the scorer accepts raw features and proposed
/// embeddings interchangeably.
pub struct Proposer {
    pub conv1: GraphConv,
    pub conv2: GraphConv,
}

pub struct ProposerGrads {
    conv1: ConvGrads,
    conv2: ConvGrads,
}

impl Proposer {
    pub fn new(in_dim: usize, hidden_dim: usize, out_dim: usize, rng: &mut StdRng) -> Self {
        Self {
            conv1: GraphConv::new(in_dim, hidden_dim, rng),
            conv2: GraphConv::new(hidden_dim, out_dim, rng),
        }
    }

    pub fn forward(&self, x: &Mat, adj: &Adjacency) -> (Mat, Trace) {
        let (h_pre, nx1) = self.conv1.forward(x, adj);
        let h = relu(&h_pre);
        let (out, nx2) = self.conv2.forward(&h, adj);
        (out, Trace { x: x.clone(), nx1, h_pre, h, nx2 })
    }

    pub fn backward(&self, trace: &Trace, d_out: &Mat, adj: &Adjacency) -> ProposerGrads {
        let (g2, dh) = self.conv2.backward(&trace.h, &trace.nx2, d_out, adj);
        let dh_pre = relu_backward(&trace.h_pre, &dh);
        let (g1, _) = self.conv1.backward(&trace.x, &trace.nx1, &dh_pre, adj);
        ProposerGrads { conv1: g1, conv2: g2 }
    }

    pub fn apply(&mut self, grads: &ProposerGrads, lr: f32) {
        self.conv1.apply(&grads.conv1, lr);
        self.conv2.apply(&grads.conv2, lr);
    }
}

/// The scorer maps (embedding-or-features, edges) to one probability per
/// node: how plausibly the input reflects genuine criminal structure.
pub struct Scorer {
    pub conv1: GraphConv,
    pub conv2: GraphConv,
}

pub struct ScorerGrads {
    conv1: ConvGrads,
    conv2: ConvGrads,
}

impl ScorerGrads {
    /// Sum another gradient set into this one. The adversarial step scores
    /// real and proposed inputs separately and applies one combined update.
    pub(crate) fn accumulate(&mut self, other: ScorerGrads) {
        self.conv1.w_self.add_scaled(&other.conv1.w_self, 1.0);
        self.conv1.w_neigh.add_scaled(&other.conv1.w_neigh, 1.0);
        for (a, b) in self.conv1.bias.iter_mut().zip(other.conv1.bias) {
            *a += b;
        }
        self.conv2.w_self.add_scaled(&other.conv2.w_self, 1.0);
        self.conv2.w_neigh.add_scaled(&other.conv2.w_neigh, 1.0);
        for (a, b) in self.conv2.bias.iter_mut().zip(other.conv2.bias) {
            *a += b;
        }
    }
}

/// Scorer output plus everything backward needs.
pub struct ScorerEval {
    pub probs: Vec<f32>,
    trace: Trace,
    z: Mat,
}

impl Scorer {
    pub fn new(in_dim: usize, hidden_dim: usize, rng: &mut StdRng) -> Self {
        Self {
            conv1: GraphConv::new(in_dim, hidden_dim, rng),
            conv2: GraphConv::new(hidden_dim, 1, rng),
        }
    }

    pub fn in_dim(&self) -> usize {
        self.conv1.in_dim()
    }

    pub fn forward(&self, x: &Mat, adj: &Adjacency) -> ScorerEval {
        let (h_pre, nx1) = self.conv1.forward(x, adj);
        let h = relu(&h_pre);
        let (z, nx2) = self.conv2.forward(&h, adj);
        let probs = z.data.iter().map(|&v| sigmoid(v)).collect();
        ScorerEval {
            probs,
            trace: Trace { x: x.clone(), nx1, h_pre, h, nx2 },
            z,
        }
    }

    /// Probabilities only, for inference paths.
    pub fn score(&self, x: &Mat, adj: &Adjacency) -> Vec<f32> {
        self.forward(x, adj).probs
    }

    /// Backpropagate dL/dp through the sigmoid and both convolutions.
    /// Returns parameter gradients and dL/dx (the latter feeds the proposer
    /// step).
    pub fn backward(&self, eval: &ScorerEval, d_probs: &[f32], adj: &Adjacency) -> (ScorerGrads, Mat) {
        let dz = Mat::from_vec(
            eval.z.rows,
            1,
            eval.probs
                .iter()
                .zip(d_probs.iter())
                .map(|(&p, &dp)| dp * p * (1.0 - p))
                .collect(),
        );
        let (g2, dh) = self.conv2.backward(&eval.trace.h, &eval.trace.nx2, &dz, adj);
        let dh_pre = relu_backward(&eval.trace.h_pre, &dh);
        let (g1, dx) = self.conv1.backward(&eval.trace.x, &eval.trace.nx1, &dh_pre, adj);
        (ScorerGrads { conv1: g1, conv2: g2 }, dx)
    }

    pub fn apply(&mut self, grads: &ScorerGrads, lr: f32) {
        self.conv1.apply(&grads.conv1, lr);
        self.conv2.apply(&grads.conv2, lr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn matmul_matches_hand_result() {
        let a = Mat::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let b = Mat::from_vec(2, 2, vec![5.0, 6.0, 7.0, 8.0]);
        let c = a.matmul(&b);
        assert_eq!(c.data, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn transpose_products_agree_with_explicit_transpose() {
        let a = Mat::from_vec(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Mat::from_vec(3, 2, vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        // aᵀ·b
        let tm = a.t_matmul(&b);
        assert_eq!(tm.rows, 2);
        assert_eq!(tm.cols, 2);
        assert_eq!(tm.data, vec![1.0 + 5.0, 3.0 + 5.0, 2.0 + 6.0, 4.0 + 6.0]);
        // a·bᵀ where b is (3×2): needs matching cols
        let mt = a.matmul_t(&b);
        assert_eq!(mt.rows, 3);
        assert_eq!(mt.cols, 3);
        assert_eq!(mt.at(0, 2), 1.0 + 2.0);
    }

    #[test]
    fn mean_gather_averages_in_neighbors() {
        // 0 → 2, 1 → 2
        let adj = Adjacency::from_edges(3, &[0, 1], &[2, 2]);
        let x = Mat::from_vec(3, 1, vec![2.0, 4.0, 100.0]);
        let nx = adj.mean_gather(&x);
        assert_eq!(nx.at(0, 0), 0.0);
        assert_eq!(nx.at(1, 0), 0.0);
        assert_eq!(nx.at(2, 0), 3.0);
    }

    #[test]
    fn scatter_is_transpose_of_gather() {
        // <d, gather(x)> must equal <scatter(d), x> for the pair to be
        // adjoint, which is what backprop relies on.
        let adj = Adjacency::from_edges(4, &[0, 1, 1, 3], &[2, 2, 0, 1]);
        let mut rng = StdRng::seed_from_u64(4);
        let x = Mat::xavier(4, 3, &mut rng);
        let d = Mat::xavier(4, 3, &mut rng);

        let lhs: f32 = d
            .data
            .iter()
            .zip(adj.mean_gather(&x).data.iter())
            .map(|(a, b)| a * b)
            .sum();
        let rhs: f32 = adj
            .mean_scatter(&d)
            .data
            .iter()
            .zip(x.data.iter())
            .map(|(a, b)| a * b)
            .sum();
        assert!((lhs - rhs).abs() < 1e-4, "{lhs} vs {rhs}");
    }

    #[test]
    fn scorer_outputs_probabilities() {
        let mut rng = StdRng::seed_from_u64(1);
        let scorer = Scorer::new(3, 8, &mut rng);
        let adj = Adjacency::from_edges(5, &[0, 1, 2], &[1, 2, 3]);
        let x = Mat::xavier(5, 3, &mut rng);
        let probs = scorer.score(&x, &adj);
        assert_eq!(probs.len(), 5);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn proposer_preserves_feature_width() {
        let mut rng = StdRng::seed_from_u64(2);
        let proposer = Proposer::new(4, 8, 4, &mut rng);
        let adj = Adjacency::isolated(6);
        let x = Mat::xavier(6, 4, &mut rng);
        let (out, _) = proposer.forward(&x, &adj);
        assert_eq!(out.rows, 6);
        assert_eq!(out.cols, 4);
    }

    #[test]
    fn scorer_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut scorer = Scorer::new(2, 4, &mut rng);
        let adj = Adjacency::from_edges(3, &[0, 2], &[1, 1]);
        let x = Mat::xavier(3, 2, &mut rng);

        // L = mean(p): dL/dp = 1/n
        let loss = |s: &Scorer| -> f32 {
            let p = s.score(&x, &adj);
            p.iter().sum::<f32>() / p.len() as f32
        };

        let eval = scorer.forward(&x, &adj);
        let n = eval.probs.len() as f32;
        let d_probs = vec![1.0 / n; eval.probs.len()];
        let (grads, _) = scorer.backward(&eval, &d_probs, &adj);

        let analytic = grads.conv1.w_self.at(0, 0);
        let epsilon = 1e-3;
        let original = scorer.conv1.w_self.at(0, 0);
        scorer.conv1.w_self.data[0] = original + epsilon;
        let up = loss(&scorer);
        scorer.conv1.w_self.data[0] = original - epsilon;
        let down = loss(&scorer);
        let numeric = (up - down) / (2.0 * epsilon);

        assert!(
            (analytic - numeric).abs() < 1e-2,
            "analytic {analytic} vs numeric {numeric}"
        );
    }
}
