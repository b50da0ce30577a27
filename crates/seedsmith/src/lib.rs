//! Seedsmith: API-sequence seed synthesizer for C library fuzzing
//!
//! Reads a per-library API surface (functions, resource kinds and their
//! state machines), synthesizes phased call sequences for requested
//! combinations of functions, validates and repairs them against the
//! resource lifecycles, scores them by branch-signature density and emits
//! one C seed program per accepted sequence.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────┐   ┌─────────┐
//! │ SurfaceModel │──►│ Synthesizer  │──►│ Lifecycle    │──►│ Scorer   │──►│ Emitter │
//! │ (YAML)       │   │ (bridging)   │   │ (repair)     │   │ (rank)   │   │ (.cc)   │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────┘   └─────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use seedsmith::{CombinationRequest, Pipeline, RunContext, SynthConfig};
//! use std::path::Path;
//!
//! let mut ctx = RunContext::new(SynthConfig::default());
//! ctx.load_dir(Path::new("surfaces"))?;
//! let request = CombinationRequest::parse("cjson", "cJSON_Parse,cJSON_GetObjectItem,cJSON_Delete");
//! let summary = Pipeline::new(&ctx).run(&[request], 1, Path::new("out"))?;
//! println!("{} seeds", summary.emitted());
//! # Ok::<(), seedsmith::SeedsmithError>(())
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod config;
pub mod context;
pub mod corpus;
pub mod emit;
pub mod lifecycle;
pub mod pipeline;
mod result;
mod rng;
pub mod scoring;
pub mod sequence;
pub mod surface;
pub mod synth;

#[cfg(test)]
mod fixtures;

pub use config::{ExploreConfig, SynthConfig};
pub use context::RunContext;
pub use corpus::{
    api_triples, apply_minimization, load_corpus, minimize_by_triples, ApiTriple, CorpusSeed,
    Minimization, Schedule, TripleSet,
};
pub use emit::{parse_seed_header, render_seed, SeedHeader, SeedMeta, SeedStore};
pub use lifecycle::{LifecycleTracker, RepairAction, ValidationOutcome, Violation};
pub use pipeline::{
    CombinationOutcome, Evaluation, ExploreSummary, Pipeline, RoundReport, RunSummary,
};
pub use result::{SeedsmithError, SeedsmithResult};
pub use rng::Seed;
pub use scoring::{QualityReport, ScoreWarning, ScoredSequence, Scorer};
pub use sequence::{
    ArgValue, CallSite, CallSiteId, Origin, Phase, ResourceId, Sequence, ValidatedSequence,
};
pub use surface::{ApiFunction, ResourceKind, Role, SurfaceError, SurfaceModel, SurfaceSpec};
pub use synth::{CombinationRequest, SynthError, Synthesizer};
