//! End-to-end runs: synthesize, validate, score and emit.
//!
//! Combinations are evaluated in parallel on a rayon pool, one task per
//! request with its own sequence graph and step budget. Emission runs
//! afterwards on the calling thread in request order, so seed ids are
//! monotonic and reproducible.

use crate::context::RunContext;
use crate::corpus::{load_corpus, Schedule};
use crate::emit::{SeedMeta, SeedStore};
use crate::lifecycle::LifecycleTracker;
use crate::result::{SeedsmithError, SeedsmithResult};
use crate::scoring::{rank, ScoredSequence, Scorer};
use crate::surface::SurfaceModel;
use crate::synth::{CombinationRequest, Synthesizer};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of evaluating one combination, before emission.
#[derive(Debug, Clone)]
pub enum Evaluation {
    /// Clean candidates, best first
    Ranked(Vec<ScoredSequence>),
    /// Every candidate kept residual violations
    Rejected(Vec<String>),
    /// Synthesis or lookup failed
    Failed(String),
}

/// Per-combination entry of a run summary.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CombinationOutcome {
    Accepted {
        combination: String,
        seeds: Vec<SeedMeta>,
        repaired: bool,
        density: f64,
        score: f64,
    },
    Rejected {
        combination: String,
        reasons: Vec<String>,
    },
    Failed {
        combination: String,
        error: String,
    },
}

impl CombinationOutcome {
    pub fn combination(&self) -> &str {
        match self {
            Self::Accepted { combination, .. }
            | Self::Rejected { combination, .. }
            | Self::Failed { combination, .. } => combination,
        }
    }

    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Summary of a `generate` run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub outcomes: Vec<CombinationOutcome>,
}

impl RunSummary {
    pub fn accepted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_accepted()).count()
    }

    pub fn repaired(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CombinationOutcome::Accepted { repaired: true, .. }))
            .count()
    }

    pub fn rejected(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CombinationOutcome::Rejected { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CombinationOutcome::Failed { .. }))
            .count()
    }

    /// Seeds written across all combinations.
    pub fn emitted(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                CombinationOutcome::Accepted { seeds, .. } => seeds.len(),
                _ => 0,
            })
            .sum()
    }
}

/// Progress of one exploration round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub round: usize,
    pub new_triples: usize,
    pub discovered: usize,
    pub emitted: usize,
    pub quiet_rounds: usize,
}

/// Summary of an `explore` run.
#[derive(Debug, Clone, Serialize)]
pub struct ExploreSummary {
    pub run_id: Uuid,
    pub library: String,
    pub rounds: usize,
    pub discovered: usize,
    pub converged: bool,
    pub seeds: Vec<SeedMeta>,
    /// Failure and rejection counts keyed by reason
    pub skipped: BTreeMap<String, usize>,
}

/// Drives combinations through the whole pipeline.
#[derive(Debug)]
pub struct Pipeline<'c> {
    context: &'c RunContext,
    jobs: usize,
}

impl<'c> Pipeline<'c> {
    pub const fn new(context: &'c RunContext) -> Self {
        Self { context, jobs: 0 }
    }

    /// Worker threads; 0 lets rayon decide.
    pub const fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    fn pool(&self) -> SeedsmithResult<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|i| format!("seedsmith-worker-{i}"))
            .build()
            .map_err(|e| SeedsmithError::WorkerPool {
                message: e.to_string(),
            })
    }

    /// Synthesize candidates, validate and repair them, score and rank.
    pub fn evaluate(&self, request: &CombinationRequest) -> Evaluation {
        let surface = match self.context.surface(&request.library) {
            Ok(surface) => surface,
            Err(e) => return Evaluation::Failed(e.to_string()),
        };
        evaluate_with(&surface, self.context, request)
    }

    /// Evaluate every request in parallel, then emit up to `count` seeds per
    /// accepted combination under `out`.
    pub fn run(
        &self,
        requests: &[CombinationRequest],
        count: usize,
        out: &Path,
    ) -> SeedsmithResult<RunSummary> {
        let pool = self.pool()?;
        let evaluations: Vec<Evaluation> =
            pool.install(|| requests.par_iter().map(|r| self.evaluate(r)).collect());

        let mut stores: BTreeMap<String, SeedStore> = BTreeMap::new();
        let mut outcomes = Vec::with_capacity(requests.len());
        for (request, evaluation) in requests.iter().zip(evaluations) {
            let combination = request.label();
            let outcome = match evaluation {
                Evaluation::Ranked(ranked) => {
                    let surface = self.context.surface(&request.library)?;
                    let store = match stores.entry(request.library.clone()) {
                        std::collections::btree_map::Entry::Occupied(e) => e.into_mut(),
                        std::collections::btree_map::Entry::Vacant(e) => {
                            e.insert(SeedStore::open(out, &request.library)?)
                        }
                    };
                    let mut seeds = Vec::new();
                    for scored in ranked.iter().take(count.max(1)) {
                        seeds.push(store.emit(&surface, scored, self.context.config().sentinel)?);
                    }
                    let best = &ranked[0];
                    info!(%combination, seeds = seeds.len(), density = best.quality.density, "accepted");
                    CombinationOutcome::Accepted {
                        combination,
                        seeds,
                        repaired: best.was_repaired(),
                        density: best.quality.density,
                        score: best.quality.score,
                    }
                }
                Evaluation::Rejected(reasons) => {
                    info!(%combination, reasons = reasons.len(), "rejected");
                    CombinationOutcome::Rejected {
                        combination,
                        reasons,
                    }
                }
                Evaluation::Failed(error) => {
                    info!(%combination, %error, "failed");
                    CombinationOutcome::Failed { combination, error }
                }
            };
            outcomes.push(outcome);
        }

        Ok(RunSummary {
            run_id: self.context.run_id(),
            outcomes,
        })
    }

    /// Energy-scheduled exploration of one library. The best candidate of a
    /// combination is emitted only when it discovers a new API triple.
    /// Seeds already under `out` count as discovered, so a run resumes
    /// where the previous one stopped.
    pub fn explore(
        &self,
        library: &str,
        out: &Path,
        mut on_round: impl FnMut(&RoundReport),
    ) -> SeedsmithResult<ExploreSummary> {
        let surface = self.context.surface(library)?;
        let config = self.context.config();
        let mut store = SeedStore::open(out, library)?;
        let mut schedule = Schedule::new(
            surface.functions().map(|f| f.name.clone()),
            &config.explore,
        );
        for seed in load_corpus(store.dir())? {
            schedule.observe(&seed.library_calls);
        }
        debug!(library, resumed = schedule.discovered(), "exploration starts");

        let pool = self.pool()?;
        let mut seeds = Vec::new();
        let mut skipped: BTreeMap<String, usize> = BTreeMap::new();

        while !schedule.is_converged() {
            let requests: Vec<CombinationRequest> = schedule
                .next_batch()
                .into_iter()
                .map(|functions| CombinationRequest::new(library, functions))
                .collect();
            let evaluations: Vec<Evaluation> = pool.install(|| {
                requests
                    .par_iter()
                    .map(|r| evaluate_with(&surface, self.context, r))
                    .collect()
            });

            let mut new_triples = 0;
            let mut emitted = 0;
            for evaluation in evaluations {
                match evaluation {
                    Evaluation::Ranked(ranked) => {
                        let best = &ranked[0];
                        let fresh = schedule.observe(&best.quality.library_calls);
                        if !fresh.is_empty() {
                            new_triples += fresh.len();
                            seeds.push(store.emit(&surface, best, config.sentinel)?);
                            emitted += 1;
                        }
                    }
                    Evaluation::Rejected(_) => {
                        *skipped.entry("rejected".to_string()).or_default() += 1;
                    }
                    Evaluation::Failed(error) => {
                        let reason = error.split(':').next().unwrap_or("failed").to_string();
                        *skipped.entry(reason).or_default() += 1;
                    }
                }
            }
            schedule.end_round(new_triples);

            let report = RoundReport {
                round: schedule.round(),
                new_triples,
                discovered: schedule.discovered(),
                emitted,
                quiet_rounds: schedule.quiet_rounds(),
            };
            debug!(round = report.round, new_triples, emitted, "round finished");
            on_round(&report);
        }

        let converged = schedule.quiet_rounds() >= config.explore.quiet_rounds;
        if !converged {
            warn!(library, rounds = schedule.round(), "round cap reached before convergence");
        }
        Ok(ExploreSummary {
            run_id: self.context.run_id(),
            library: library.to_string(),
            rounds: schedule.round(),
            discovered: schedule.discovered(),
            converged,
            seeds,
            skipped,
        })
    }
}

fn evaluate_with(
    surface: &SurfaceModel,
    context: &RunContext,
    request: &CombinationRequest,
) -> Evaluation {
    let config = context.config();
    let candidates = match Synthesizer::new(surface, config).candidates(request) {
        Ok(candidates) => candidates,
        Err(e) => {
            debug!(combination = %request.label(), error = %e, "synthesis failed");
            return Evaluation::Failed(e.to_string());
        }
    };

    let tracker = LifecycleTracker::new(surface, config);
    let scorer = Scorer::new(surface);
    let mut clean = Vec::new();
    let mut reasons = Vec::new();
    for candidate in candidates {
        let outcome = tracker.validate_and_repair(candidate.sequence);
        if outcome.is_clean() {
            let quality = scorer.score(&outcome.sequence);
            clean.push(ScoredSequence {
                variant: candidate.variant,
                sequence: outcome.sequence,
                quality,
                repairs: outcome.repairs,
            });
        } else {
            reasons.extend(
                outcome
                    .residual
                    .iter()
                    .map(|v| format!("{}: {v}", candidate.variant)),
            );
        }
    }

    if clean.is_empty() {
        return Evaluation::Rejected(reasons);
    }
    rank(&mut clean);
    Evaluation::Ranked(clean)
}
