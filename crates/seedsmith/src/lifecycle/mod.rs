//! Resource lifecycle tracking: replay, violations and repair.

mod repair;
mod replay;
mod tracker;

pub use repair::RepairAction;
pub use replay::{replay, replay_prefix, ReplayTrace};
pub use tracker::{LifecycleTracker, ValidationOutcome, Violation};
