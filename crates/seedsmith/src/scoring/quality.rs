//! Quality report and scorer.

use super::signature::branch_signature;
use crate::lifecycle::replay;
use crate::sequence::{CallSiteId, Origin, ValidatedSequence};
use crate::surface::{Role, SurfaceModel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::warn;

/// Scoring gap, reported but never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum ScoreWarning {
    #[error("No branch-signature rule for '{function}' (call #{call})")]
    MissingSignatureRule { call: CallSiteId, function: String },
}

/// The `<Quality>` JSON block of a seed header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityBlock {
    pub density: f64,
    pub unique_branches: BTreeMap<String, u32>,
    pub library_calls: Vec<String>,
    pub critical_calls: Vec<String>,
    pub visited: usize,
}

/// Quality attributes of one validated sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    /// Distinct credited signatures over requested call sites, repeated
    /// requested functions and inserted call sites
    pub density: f64,
    /// Credited branch signature -> hit count
    pub unique_branches: BTreeMap<String, u32>,
    /// Every invoked function, in position order
    pub library_calls: Vec<String>,
    /// Destructors and memory-sensitive functions, first-invocation order
    pub critical_calls: Vec<String>,
    /// Distinct `(kind, from, to)` transitions exercised
    pub visited: usize,
    pub nr_unique_branch: usize,
    /// Bridging and repair insertions
    pub bridging: usize,
    pub score: f64,
    pub warnings: Vec<ScoreWarning>,
}

impl QualityReport {
    /// Header block view.
    pub fn block(&self) -> QualityBlock {
        QualityBlock {
            density: self.density,
            unique_branches: self.unique_branches.clone(),
            library_calls: self.library_calls.clone(),
            critical_calls: self.critical_calls.clone(),
            visited: self.visited,
        }
    }

    /// Single-line JSON for the `<Quality>` header line.
    pub fn quality_json(&self) -> String {
        serde_json::to_string(&self.block()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// `100 × density + nr_unique_branch + visited`.
pub fn combined_score(density: f64, nr_unique_branch: usize, visited: usize) -> f64 {
    100.0f64.mul_add(density, (nr_unique_branch + visited) as f64)
}

/// Computes quality reports against one surface.
#[derive(Debug, Clone, Copy)]
pub struct Scorer<'a> {
    surface: &'a SurfaceModel,
}

impl<'a> Scorer<'a> {
    pub const fn new(surface: &'a SurfaceModel) -> Self {
        Self { surface }
    }

    /// Score a validated sequence. Pure function of the sequence.
    pub fn score(&self, seq: &ValidatedSequence) -> QualityReport {
        let mut unique_branches: BTreeMap<String, u32> = BTreeMap::new();
        let mut warnings = Vec::new();
        let mut requested = 0usize;
        let mut functions = BTreeSet::new();

        for call in seq.call_sites() {
            if call.origin != Origin::Requested {
                continue;
            }
            match branch_signature(self.surface, call) {
                Some(sig) => {
                    requested += 1;
                    functions.insert(call.function.as_str());
                    *unique_branches.entry(sig).or_default() += 1;
                }
                None => {
                    warn!(function = %call.function, call = call.id, "no signature rule, not credited");
                    warnings.push(ScoreWarning::MissingSignatureRule {
                        call: call.id,
                        function: call.function.clone(),
                    });
                }
            }
        }

        // a repeated function keeps density below 1 even with distinct shapes
        let repeats = requested - functions.len();
        let bridging = seq.insertions();
        let denominator = requested + repeats + bridging;
        let density = if denominator == 0 {
            0.0
        } else {
            unique_branches.len() as f64 / denominator as f64
        };

        let mut seen = HashSet::new();
        let critical_calls = seq
            .call_sites()
            .iter()
            .filter(|c| {
                self.surface
                    .function(&c.function)
                    .is_some_and(|f| f.role == Role::Destructor || f.memory_sensitive)
            })
            .filter(|c| seen.insert(c.function.as_str()))
            .map(|c| c.function.clone())
            .collect();

        let transitions: BTreeSet<_> = replay(self.surface, seq).transitions;
        let visited = transitions.len();
        let nr_unique_branch = unique_branches.len();

        QualityReport {
            density,
            score: combined_score(density, nr_unique_branch, visited),
            unique_branches,
            library_calls: seq.library_calls(),
            critical_calls,
            visited,
            nr_unique_branch,
            bridging,
            warnings,
        }
    }
}
