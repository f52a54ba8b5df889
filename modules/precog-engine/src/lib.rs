pub mod evaluate;
pub mod scan;

pub use evaluate::{score_stats, EvaluationReport, Evaluator, ScoreStats};
pub use scan::{ScanEngine, SubjectDossier};
