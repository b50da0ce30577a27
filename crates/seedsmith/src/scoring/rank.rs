//! Ranking of scored candidates for one combination.

use super::quality::QualityReport;
use crate::lifecycle::RepairAction;
use crate::sequence::ValidatedSequence;
use std::cmp::Ordering;

/// A validated candidate with its quality report.
#[derive(Debug, Clone)]
pub struct ScoredSequence {
    /// Variant label the candidate came from
    pub variant: String,
    pub sequence: ValidatedSequence,
    pub quality: QualityReport,
    pub repairs: Vec<RepairAction>,
}

impl ScoredSequence {
    pub fn was_repaired(&self) -> bool {
        !self.repairs.is_empty()
    }
}

/// Higher density first, then fewer insertions, then fewer call sites.
pub fn compare(a: &ScoredSequence, b: &ScoredSequence) -> Ordering {
    b.quality
        .density
        .total_cmp(&a.quality.density)
        .then(a.quality.bridging.cmp(&b.quality.bridging))
        .then(a.sequence.len().cmp(&b.sequence.len()))
}

/// Stable sort, best first.
pub fn rank(candidates: &mut [ScoredSequence]) {
    candidates.sort_by(compare);
}
