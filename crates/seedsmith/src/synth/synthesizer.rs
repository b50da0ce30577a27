//! Phased placement of requested functions with bridging and cleanup.

use super::binder::{fill_plain_args, Strategy};
use super::variants::VariantGenerator;
use super::SynthError;
use crate::config::SynthConfig;
use crate::sequence::{ArgValue, CallSite, CallSiteId, Origin, Phase, ResourceId, Sequence};
use crate::surface::{ApiFunction, ParamKind, Role, Storage, SurfaceModel};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One combination to synthesize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinationRequest {
    /// Target library
    pub library: String,
    /// Requested function names, in request order
    pub functions: Vec<String>,
    /// Keep the literal request order instead of phase order
    #[serde(default)]
    pub ordered: bool,
    /// Skip automatic finalizers and leak checks
    #[serde(default)]
    pub intentional_leak: bool,
    /// Free text recorded in the seed header
    #[serde(default)]
    pub prompt: String,
}

impl CombinationRequest {
    pub fn new(library: impl Into<String>, functions: Vec<String>) -> Self {
        Self {
            library: library.into(),
            functions,
            ordered: false,
            intentional_leak: false,
            prompt: String::new(),
        }
    }

    /// Build from a comma-separated function list.
    pub fn parse(library: impl Into<String>, combination: &str) -> Self {
        let functions = combination
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
        Self::new(library, functions)
    }

    pub const fn ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    pub const fn with_intentional_leak(mut self, leak: bool) -> Self {
        self.intentional_leak = leak;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Comma-separated function list.
    pub fn label(&self) -> String {
        self.functions.join(", ")
    }
}

/// A synthesized, not yet validated candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Variant label (`base`, `V1-1`, ...)
    pub variant: String,
    pub sequence: Sequence,
}

/// Sequence synthesizer for one surface.
#[derive(Debug)]
pub struct Synthesizer<'a> {
    surface: &'a SurfaceModel,
    config: &'a SynthConfig,
}

impl<'a> Synthesizer<'a> {
    pub fn new(surface: &'a SurfaceModel, config: &'a SynthConfig) -> Self {
        Self { surface, config }
    }

    /// Synthesize with the base strategy.
    pub fn synthesize(&self, request: &CombinationRequest) -> Result<Sequence, SynthError> {
        self.synthesize_with(request, &Strategy::default())
    }

    /// Synthesize with an explicit strategy.
    pub fn synthesize_with(
        &self,
        request: &CombinationRequest,
        strategy: &Strategy,
    ) -> Result<Sequence, SynthError> {
        let functions = self.resolve(request)?;
        let destructors = functions
            .iter()
            .filter(|f| f.role == Role::Destructor)
            .count();

        // Requested destructors left without a live subject at cleanup get
        // their subject bridged in `init` on the next pass.
        let mut subjects = Vec::new();
        loop {
            let mut build = Build {
                surface: self.surface,
                strategy,
                ordered: request.ordered,
                leak: request.intentional_leak,
                max_depth: self.config.max_bridging_depth,
                budget: self.config.step_budget,
                steps: 0,
                seq: Sequence::new(&request.library, request.functions.clone())
                    .with_prompt(request.prompt.clone())
                    .with_intentional_leak(request.intentional_leak),
                states: HashMap::new(),
                occurrences: HashMap::new(),
                subjects: subjects.clone(),
                unmatched: Vec::new(),
            };

            if let Err((function, stuck)) = build.run(&functions) {
                return Err(self.stuck_error(function, stuck, build.seq));
            }
            if build.unmatched.is_empty() || subjects.len() >= destructors {
                return Ok(build.seq);
            }
            debug!(unmatched = build.unmatched.len(), "bridging destructor subjects in init");
            subjects.append(&mut build.unmatched);
        }
    }

    fn stuck_error(&self, function: String, stuck: Stuck, partial: Sequence) -> SynthError {
        match stuck {
            Stuck::Missing { kind } => SynthError::UnsatisfiableCombination {
                function,
                missing: kind,
                partial: Box::new(partial),
            },
            Stuck::TooDeep { kind } => SynthError::BridgingTooDeep {
                function,
                kind,
                depth: self.config.max_bridging_depth,
            },
            Stuck::Budget => SynthError::BudgetExceeded {
                function,
                budget: self.config.step_budget,
            },
        }
    }

    /// Synthesize every variant of the request, dropping duplicates.
    ///
    /// A failure of the base variant is the failure of the request; failing
    /// variants are skipped.
    pub fn candidates(&self, request: &CombinationRequest) -> Result<Vec<Candidate>, SynthError> {
        let variants =
            VariantGenerator::new(self.surface, request).generate_all(self.config.candidates);
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for variant in variants {
            match self.synthesize_with(request, &variant.strategy) {
                Ok(sequence) => {
                    if seen.insert(sequence.fingerprint()) {
                        out.push(Candidate {
                            variant: variant.label,
                            sequence,
                        });
                    }
                }
                Err(e) if variant.class.is_none() => return Err(e),
                Err(e) => debug!(variant = %variant.label, error = %e, "variant skipped"),
            }
        }
        Ok(out)
    }

    fn resolve(&self, request: &CombinationRequest) -> Result<Vec<&'a ApiFunction>, SynthError> {
        if request.functions.is_empty() {
            return Err(SynthError::EmptyCombination);
        }
        request
            .functions
            .iter()
            .map(|name| {
                if self.surface.is_banned(name) {
                    return Err(SynthError::BannedFunction(name.clone()));
                }
                self.surface
                    .function(name)
                    .ok_or_else(|| SynthError::UnknownFunction(name.clone()))
            })
            .collect()
    }
}

/// Why a placement could not complete.
#[derive(Debug)]
enum Stuck {
    Missing { kind: String },
    TooDeep { kind: String },
    Budget,
}

/// What a bound resource must satisfy.
#[derive(Debug, Clone, Copy)]
enum Need<'f> {
    Live,
    Accepts(&'f ApiFunction),
}

/// Mutable state of one synthesis run.
struct Build<'s> {
    surface: &'s SurfaceModel,
    strategy: &'s Strategy,
    ordered: bool,
    leak: bool,
    max_depth: usize,
    budget: usize,
    steps: usize,
    seq: Sequence,
    states: HashMap<ResourceId, String>,
    occurrences: HashMap<String, usize>,
    /// Destructors whose subject is bridged at the end of `init`
    subjects: Vec<&'s ApiFunction>,
    /// Requested destructors that found no live subject during cleanup
    unmatched: Vec<&'s ApiFunction>,
}

impl<'s> Build<'s> {
    fn run(&mut self, functions: &[&'s ApiFunction]) -> Result<(), (String, Stuck)> {
        let mut destructors = Vec::new();
        if self.ordered {
            for f in functions {
                self.place(f, Origin::Requested, f.role.phase(), 0, None)
                    .map_err(|e| (f.name.clone(), e))?;
            }
        } else {
            for phase in [Phase::Init, Phase::Configure, Phase::Operate, Phase::Validate] {
                for f in functions.iter().filter(|f| f.role.phase() == phase) {
                    self.place(f, Origin::Requested, phase, 0, None)
                        .map_err(|e| (f.name.clone(), e))?;
                }
                if phase == Phase::Init {
                    self.bridge_subjects()?;
                }
            }
            destructors = functions
                .iter()
                .filter(|f| f.role == Role::Destructor)
                .copied()
                .collect();
        }
        self.cleanup(destructors)
    }

    fn bridge_subjects(&mut self) -> Result<(), (String, Stuck)> {
        for d in self.subjects.clone() {
            let Some(kind) = d.subject_kind() else {
                continue;
            };
            self.construct(kind, Need::Accepts(d), Phase::Init, 0)
                .map_err(|e| (d.name.clone(), e))?;
        }
        Ok(())
    }

    /// Place one call, binding or bridging its handle params first.
    fn place(
        &mut self,
        f: &'s ApiFunction,
        origin: Origin,
        phase: Phase,
        depth: usize,
        pinned: Option<ResourceId>,
    ) -> Result<CallSiteId, Stuck> {
        self.steps += 1;
        if self.steps > self.budget {
            return Err(Stuck::Budget);
        }

        let subject = f.subject_index();
        let mut bound: Vec<Option<ArgValue>> = vec![None; f.params.len()];
        for (i, param) in f.params.iter().enumerate() {
            match &param.kind {
                ParamKind::HandleIn {
                    resource, by_ref, ..
                } => {
                    let id = match pinned.filter(|_| subject == Some(i)) {
                        Some(r) => r,
                        None => {
                            let need = if subject == Some(i) {
                                Need::Accepts(f)
                            } else {
                                Need::Live
                            };
                            self.acquire(resource, need, phase, depth)?
                        }
                    };
                    bound[i] = Some(ArgValue::Resource {
                        id,
                        by_ref: *by_ref || self.storage(id) == Storage::Value,
                    });
                }
                ParamKind::Buffer {
                    resource: Some(kind),
                    ..
                } => {
                    let id = self.acquire(kind, Need::Live, phase, depth)?;
                    bound[i] = Some(ArgValue::Resource { id, by_ref: false });
                }
                _ => {}
            }
        }

        let id = self.seq.reserve_call_id();
        let produces = f.produced_kind().map(|kind| self.seq.new_resource(kind, id));
        if let Some(r) = produces {
            for (slot, param) in bound.iter_mut().zip(&f.params) {
                if matches!(param.kind, ParamKind::HandleOut { .. }) {
                    *slot = Some(ArgValue::Output { id: r });
                }
            }
        }

        let occurrence = self.occurrences.entry(f.name.clone()).or_default();
        let seen = *occurrence;
        *occurrence += 1;
        let args = fill_plain_args(&mut self.seq, f, self.strategy, seen, bound);
        self.apply(f, &args, produces);

        debug!(function = %f.name, ?origin, ?phase, depth, "placed call");
        self.seq.push(CallSite {
            id,
            function: f.name.clone(),
            args,
            phase,
            origin,
            produces,
        });
        Ok(id)
    }

    /// Track the state effects of a placed call.
    fn apply(&mut self, f: &ApiFunction, args: &[ArgValue], produces: Option<ResourceId>) {
        if let Some(r) = produces {
            let state = self
                .kind_of(r)
                .and_then(|kind| self.surface.constructed_state(kind))
                .unwrap_or_default()
                .to_string();
            self.states.insert(r, state);
        }

        let subject = f.subject_index();
        for (i, (param, arg)) in f.params.iter().zip(args).enumerate() {
            let (ParamKind::HandleIn { transfer, .. }, ArgValue::Resource { id, .. }) =
                (&param.kind, arg)
            else {
                continue;
            };
            let Some(kind) = self.kind_of(*id) else {
                continue;
            };
            let next = if subject == Some(i) {
                self.states
                    .get(id)
                    .and_then(|state| self.surface.accepts(f, kind, state))
                    .map(ToString::to_string)
            } else if *transfer {
                self.surface.kind(kind).ok().map(|k| k.finalized.clone())
            } else {
                None
            };
            if let Some(next) = next {
                self.states.insert(*id, next);
            }
        }
    }

    /// Find or create a resource of `kind` that satisfies `need`.
    fn acquire(
        &mut self,
        kind: &str,
        need: Need<'s>,
        phase: Phase,
        depth: usize,
    ) -> Result<ResourceId, Stuck> {
        if let Some(r) = self.latest(kind) {
            if self.satisfies(r, need) {
                return Ok(r);
            }
            if self.is_live(r) {
                if self.advance(r, need, phase, depth)? {
                    return Ok(r);
                }
            } else if self.ordered {
                // last-writer-wins, even across a finalizer
                return Ok(r);
            }
        }
        self.construct(kind, need, phase, depth)
    }

    /// Insert bridging calls moving `r` into a state satisfying `need`.
    fn advance(
        &mut self,
        r: ResourceId,
        need: Need<'s>,
        phase: Phase,
        depth: usize,
    ) -> Result<bool, Stuck> {
        let (Some(kind), Some(state)) = (self.kind_of(r), self.states.get(&r)) else {
            return Ok(false);
        };
        let surface = self.surface;
        let path = surface.path_to_state(
            kind,
            state,
            |s| Self::need_met(surface, kind, s, need),
            self.max_depth,
        );
        let Some(path) = path else {
            return Ok(false);
        };
        for g in path {
            self.place(g, Origin::Bridging, phase, depth + 1, Some(r))?;
        }
        Ok(true)
    }

    fn construct(
        &mut self,
        kind: &str,
        need: Need<'s>,
        phase: Phase,
        depth: usize,
    ) -> Result<ResourceId, Stuck> {
        if depth >= self.max_depth {
            return Err(Stuck::TooDeep {
                kind: kind.to_string(),
            });
        }
        let missing = || Stuck::Missing {
            kind: kind.to_string(),
        };

        let mut producers = self.surface.functions_producing(kind).map_err(|_| missing())?;
        if producers.is_empty() {
            // fall back to kinds declared convertible into the wanted one
            let convertible: Vec<String> = self
                .surface
                .kinds()
                .filter(|k| k.converts_to.iter().any(|c| c == kind))
                .map(|k| k.id.clone())
                .collect();
            for other in convertible {
                producers.extend(self.surface.functions_producing(&other).unwrap_or_default());
            }
        }
        if producers.is_empty() {
            return Err(missing());
        }

        let chosen = producers[self.strategy.constructor_choice % producers.len()];
        let call = self.place(chosen, Origin::Bridging, phase, depth + 1, None)?;
        let r = self
            .seq
            .call(call)
            .and_then(|c| c.produces)
            .ok_or_else(missing)?;
        if self.satisfies(r, need) || self.advance(r, need, phase, depth)? {
            Ok(r)
        } else {
            Err(missing())
        }
    }

    /// Finalize live resources in reverse creation order, binding requested
    /// destructors first.
    fn cleanup(&mut self, mut pending: Vec<&'s ApiFunction>) -> Result<(), (String, Stuck)> {
        for r in self.live_by_recency() {
            if !self.is_live(r) {
                continue;
            }
            let (kind, state) = match (self.kind_of(r), self.states.get(&r)) {
                (Some(kind), Some(state)) => (kind.to_string(), state.clone()),
                _ => continue,
            };
            let surface = self.surface;
            let matching = pending.iter().position(|d| {
                d.subject_kind()
                    .is_some_and(|subject| surface.compatible(&kind, subject))
                    && surface.accepts(d, &kind, &state).is_some()
            });
            if let Some(pos) = matching {
                let d = pending.remove(pos);
                self.place(d, Origin::Requested, Phase::Cleanup, 0, Some(r))
                    .map_err(|e| (d.name.clone(), e))?;
            } else if !self.leak {
                self.finalize(r).map_err(|e| (format!("cleanup of {kind}"), e))?;
            }
        }

        for d in pending {
            self.unmatched.push(d);
            self.place(d, Origin::Requested, Phase::Cleanup, 0, None)
                .map_err(|e| (d.name.clone(), e))?;
        }

        if !self.leak {
            // leftovers created while placing unmatched destructors
            for r in self.live_by_recency() {
                if self.is_live(r) {
                    let kind = self.kind_of(r).unwrap_or_default().to_string();
                    self.finalize(r)
                        .map_err(|e| (format!("cleanup of {kind}"), e))?;
                }
            }
        }
        Ok(())
    }

    fn finalize(&mut self, r: ResourceId) -> Result<(), Stuck> {
        let surface = self.surface;
        let (Some(kind), Some(state)) = (self.kind_of(r), self.states.get(&r)) else {
            return Ok(());
        };
        let kind = kind.to_string();
        let state = state.clone();
        let finalizers = surface.finalizers_for(&kind).unwrap_or_default();
        if finalizers.is_empty() {
            return Ok(());
        }

        let direct = finalizers
            .iter()
            .copied()
            .find(|d| surface.accepts(d, &kind, &state).is_some());
        let chosen = match direct {
            Some(d) => d,
            None => {
                let path = surface.path_to_state(
                    &kind,
                    &state,
                    |s| finalizers.iter().any(|d| surface.accepts(d, &kind, s).is_some()),
                    self.max_depth,
                );
                let Some(path) = path else {
                    debug!(%kind, %state, "no finalizer reachable, resource will leak");
                    return Ok(());
                };
                for g in path {
                    self.place(g, Origin::Cleanup, Phase::Cleanup, 0, Some(r))?;
                }
                let reached = self.states.get(&r).cloned().unwrap_or_default();
                match finalizers
                    .iter()
                    .copied()
                    .find(|d| surface.accepts(d, &kind, &reached).is_some())
                {
                    Some(d) => d,
                    None => return Ok(()),
                }
            }
        };
        self.place(chosen, Origin::Cleanup, Phase::Cleanup, 0, Some(r))?;
        Ok(())
    }

    /// Live resources, most recently produced first.
    fn live_by_recency(&self) -> Vec<ResourceId> {
        let mut live: Vec<(usize, ResourceId)> = self
            .seq
            .resources()
            .iter()
            .filter(|r| self.is_live(r.id))
            .filter_map(|r| self.seq.producer_position(r.id).map(|p| (p, r.id)))
            .collect();
        live.sort_by(|a, b| b.cmp(a));
        live.into_iter().map(|(_, r)| r).collect()
    }

    /// Most recently produced bindable resource compatible with `kind`.
    fn latest(&self, kind: &str) -> Option<ResourceId> {
        self.seq
            .resources()
            .iter()
            .rev()
            .filter(|r| self.states.contains_key(&r.id))
            .find(|r| {
                self.surface.compatible(&r.kind, kind) && (self.ordered || self.is_live(r.id))
            })
            .map(|r| r.id)
    }

    fn satisfies(&self, r: ResourceId, need: Need<'_>) -> bool {
        match (self.kind_of(r), self.states.get(&r)) {
            (Some(kind), Some(state)) => Self::need_met(self.surface, kind, state, need),
            _ => false,
        }
    }

    fn need_met(surface: &SurfaceModel, kind: &str, state: &str, need: Need<'_>) -> bool {
        match need {
            Need::Live => surface.is_live(kind, state),
            Need::Accepts(f) => surface.is_live(kind, state) && surface.accepts(f, kind, state).is_some(),
        }
    }

    fn is_live(&self, r: ResourceId) -> bool {
        match (self.kind_of(r), self.states.get(&r)) {
            (Some(kind), Some(state)) => self.surface.is_live(kind, state),
            _ => false,
        }
    }

    fn kind_of(&self, r: ResourceId) -> Option<&str> {
        self.seq.resource(r).map(|res| res.kind.as_str())
    }

    fn storage(&self, r: ResourceId) -> Storage {
        self.kind_of(r)
            .and_then(|kind| self.surface.kind(kind).ok())
            .map(|k| k.storage)
            .unwrap_or_default()
    }
}
