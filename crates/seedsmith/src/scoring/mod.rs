//! Coverage and quality scoring.

mod quality;
mod rank;
mod signature;

pub use quality::{combined_score, QualityBlock, QualityReport, ScoreWarning, Scorer};
pub use rank::{compare, rank, ScoredSequence};
pub use signature::{branch_signature, classify_literal, ArgShape};
