pub mod checkpoint;
pub mod net;
pub mod score;
pub mod tensor;
pub mod train;

pub use checkpoint::Checkpoint;
pub use net::{Adjacency, Proposer, Scorer};
pub use score::{heuristic_probability, LearnedScorer, ScoreOutcome, ScoringBackend};
pub use tensor::{ColumnStats, GraphTensors, SplitRatios};
pub use train::{train_adversarial, TrainConfig, TrainReport};
