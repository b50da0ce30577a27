//! Sequence synthesis: turn a requested combination into phased call sites.

mod binder;
mod synthesizer;
mod variants;

pub use binder::Strategy;
pub(crate) use binder::fill_plain_args;
pub use synthesizer::{Candidate, CombinationRequest, Synthesizer};
pub use variants::{Variant, VariantClass, VariantGenerator};

use crate::sequence::Sequence;

/// Reasons a combination cannot be synthesized.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthError {
    #[error("Combination is empty")]
    EmptyCombination,

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{0}' is banned")]
    BannedFunction(String),

    #[error("Cannot place '{function}': no constructor for resource kind '{missing}'")]
    UnsatisfiableCombination {
        function: String,
        missing: String,
        partial: Box<Sequence>,
    },

    #[error("Cannot place '{function}': bridging to '{kind}' needs more than {depth} levels")]
    BridgingTooDeep {
        function: String,
        kind: String,
        depth: usize,
    },

    #[error("Step budget of {budget} exhausted while placing '{function}'")]
    BudgetExceeded { function: String, budget: usize },
}
