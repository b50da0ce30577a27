//! Lifecycle and scoring properties over a small synthetic library.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use proptest::prelude::*;
use seedsmith::{
    ArgValue, CombinationOutcome, CombinationRequest, Evaluation, LifecycleTracker, Phase, Pipeline,
    RepairAction, ResourceId, Role, RunContext, Scorer, Sequence, SurfaceModel, SynthConfig,
    SynthError, Synthesizer,
};
use std::collections::HashMap;

const VAULT: &str = r#"
version: "1.0"
library: vault
headers: ["vault.h"]
resources:
  conn:
    c_type: vault_conn
    states: [unallocated, open, ready, finalized]
    transitions:
      - { from: unallocated, to: open, role: constructor }
      - { from: open, to: ready, role: configurator }
      - { from: ready, to: ready, role: configurator }
      - { from: ready, to: ready, role: mutator }
      - { from: open, to: open, role: accessor }
      - { from: ready, to: ready, role: accessor }
      - { from: open, to: finalized, role: destructor }
      - { from: ready, to: finalized, role: destructor }
  cursor:
    c_type: vault_cursor
    states: [unallocated, live, finalized]
    transitions:
      - { from: unallocated, to: live, role: constructor }
      - { from: live, to: live, role: mutator }
      - { from: live, to: live, role: accessor }
      - { from: live, to: finalized, role: destructor }
  text:
    c_type: char
    states: [unallocated, valid, finalized]
    transitions:
      - { from: unallocated, to: valid, role: constructor }
      - { from: valid, to: finalized, role: destructor }
  engine:
    c_type: vault_engine
    states: [unallocated, allocated, configured, active, finalized]
    transitions:
      - { from: unallocated, to: allocated, role: constructor }
      - { from: allocated, to: configured, role: configurator }
      - { from: configured, to: active, role: mutator }
      - { from: active, to: active, role: mutator }
      - { from: allocated, to: finalized, role: destructor }
      - { from: configured, to: finalized, role: destructor }
      - { from: active, to: finalized, role: destructor }
  token:
    c_type: vault_token
    states: [unallocated, held, finalized]
    transitions:
      - { from: unallocated, to: held, role: constructor }
      - { from: held, to: held, role: accessor }
functions:
  - name: conn_open
    role: constructor
    params:
      - { name: flags, kind: primitive, c_type: int, values: ["0", "1"] }
    returns: { kind: handle, resource: conn }
  - name: conn_config
    role: configurator
    params:
      - { name: c, kind: handle_in, resource: conn }
      - { name: level, kind: primitive, c_type: int, values: ["3", "-1"] }
    returns: { kind: status, c_type: int }
  - name: conn_exec
    role: mutator
    params:
      - { name: c, kind: handle_in, resource: conn }
      - { name: sql, kind: primitive, c_type: "const char *", values: ['"select 1"', '""'] }
    returns: { kind: status, c_type: int }
  - name: conn_status
    role: accessor
    params:
      - { name: c, kind: handle_in, resource: conn }
    returns: { kind: value, c_type: int }
  - name: cursor_open
    role: constructor
    params:
      - { name: c, kind: handle_in, resource: conn }
    returns: { kind: handle, resource: cursor }
  - name: cursor_next
    role: mutator
    params:
      - { name: cur, kind: handle_in, resource: cursor }
    returns: { kind: status, c_type: int }
  - name: cursor_peek
    role: accessor
    params:
      - { name: cur, kind: handle_in, resource: cursor }
      - { name: out, kind: buffer, c_type: char, size: 32 }
      - { name: n, kind: length, of: out }
    returns: { kind: value, c_type: int }
  - name: conn_describe
    role: constructor
    params:
      - { name: c, kind: handle_in, resource: conn }
    returns: { kind: handle, resource: text }
  - name: engine_create
    role: constructor
    returns: { kind: handle, resource: engine }
  - name: engine_configure
    role: configurator
    params:
      - { name: e, kind: handle_in, resource: engine }
  - name: engine_operate
    role: mutator
    params:
      - { name: e, kind: handle_in, resource: engine }
  - name: engine_cleanup
    role: destructor
    params:
      - { name: e, kind: handle_in, resource: engine }
  - name: token_peek
    role: accessor
    params:
      - { name: t, kind: handle_in, resource: token }
  - name: text_free
    role: destructor
    params:
      - { name: s, kind: handle_in, resource: text }
  - name: cursor_close
    role: destructor
    params:
      - { name: cur, kind: handle_in, resource: cursor }
  - name: conn_close
    role: destructor
    params:
      - { name: c, kind: handle_in, resource: conn }
"#;

const PLACEABLE: &[&str] = &[
    "conn_open",
    "conn_config",
    "conn_exec",
    "conn_status",
    "cursor_open",
    "cursor_next",
    "cursor_peek",
    "conn_describe",
    "engine_create",
    "engine_configure",
    "engine_operate",
    "engine_cleanup",
    "text_free",
    "cursor_close",
    "conn_close",
];

fn vault() -> SurfaceModel {
    SurfaceModel::from_yaml(VAULT).expect("vault surface loads")
}

fn request(functions: &[&str]) -> CombinationRequest {
    CombinationRequest::new("vault", functions.iter().map(|s| (*s).to_string()).collect())
}

fn vault_context() -> RunContext {
    let mut context = RunContext::new(SynthConfig::default());
    context.register(vault()).expect("registers");
    context
}

/// Subject resource of a call, per the surface.
fn subject(surface: &SurfaceModel, seq: &Sequence, position: usize) -> Option<ResourceId> {
    let call = &seq.call_sites()[position];
    let index = surface.function(&call.function)?.subject_index()?;
    match call.args.get(index) {
        Some(ArgValue::Resource { id, .. }) => Some(*id),
        _ => None,
    }
}

fn is_destructor(surface: &SurfaceModel, name: &str) -> bool {
    surface
        .function(name)
        .is_some_and(|f| f.role == Role::Destructor)
}

fn all_distinct(picks: &[&str]) -> bool {
    let mut sorted = picks.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len() == picks.len()
}

/// Nothing reads a finalized resource, every managed resource is finalized
/// exactly once in `cleanup`, and finalizers run newest resource first.
fn assert_stack_discipline(surface: &SurfaceModel, seq: &Sequence) -> Result<(), TestCaseError> {
    let mut finalized_at: HashMap<ResourceId, usize> = HashMap::new();
    let mut finalizer_order = Vec::new();
    for (position, call) in seq.call_sites().iter().enumerate() {
        for input in call.inputs() {
            prop_assert!(
                !finalized_at.contains_key(&input),
                "{} reads a finalized resource", call.function
            );
        }
        if is_destructor(surface, &call.function) {
            let r = subject(surface, seq, position).expect("destructor has a subject");
            prop_assert_eq!(call.phase, Phase::Cleanup);
            prop_assert!(finalized_at.insert(r, position).is_none(), "finalized twice");
            finalizer_order.push(r);
        }
    }

    for res in seq.resources() {
        let managed = surface.finalizers_for(&res.kind).map(|f| !f.is_empty()).unwrap_or(false);
        if managed {
            prop_assert!(finalized_at.contains_key(&res.id), "{} leaks", res.kind);
        }
    }
    let producers: Vec<usize> = finalizer_order
        .iter()
        .map(|r| seq.producer_position(*r).expect("produced"))
        .collect();
    prop_assert!(
        producers.windows(2).all(|w| w[0] > w[1]),
        "finalizer order {:?} in {:?}", producers, seq.library_calls()
    );
    Ok(())
}

/// Every ranked candidate of the request keeps stack discipline and the
/// density bounds.
fn check_ranked(picks: &[&str], ordered: bool) -> Result<(), TestCaseError> {
    let surface = vault();
    let context = vault_context();
    let req = request(picks).ordered(ordered);
    let Evaluation::Ranked(ranked) = Pipeline::new(&context).evaluate(&req) else {
        return Ok(());
    };
    prop_assert!(!ranked.is_empty());
    for candidate in &ranked {
        assert_stack_discipline(&surface, &candidate.sequence)?;
        let density = candidate.quality.density;
        prop_assert!((0.0..=1.0).contains(&density));
        if density == 1.0 {
            prop_assert!(all_distinct(picks), "{}: {:?}", candidate.variant, picks);
            prop_assert_eq!(candidate.quality.bridging, 0);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_stack_discipline_and_no_dangling_use(
        picks in prop::collection::vec(prop::sample::select(PLACEABLE), 1..6)
    ) {
        let surface = vault();
        let config = SynthConfig::default();
        let Ok(seq) = Synthesizer::new(&surface, &config).synthesize(&request(&picks)) else {
            return Ok(());
        };
        let outcome = LifecycleTracker::new(&surface, &config).validate_and_repair(seq);
        // rejected sequences are never emitted
        if !outcome.is_clean() {
            return Ok(());
        }
        assert_stack_discipline(&surface, &outcome.sequence)?;
    }

    #[test]
    fn prop_ranked_candidates_keep_stack_discipline(
        picks in prop::collection::vec(prop::sample::select(PLACEABLE), 1..5)
    ) {
        check_ranked(&picks, false)?;
    }

    #[test]
    fn prop_ordered_requests_keep_stack_discipline(
        picks in prop::collection::vec(prop::sample::select(PLACEABLE), 1..5)
    ) {
        check_ranked(&picks, true)?;
    }

    #[test]
    fn prop_density_is_deterministic_and_bounded(
        picks in prop::collection::vec(prop::sample::select(PLACEABLE), 1..6)
    ) {
        let surface = vault();
        let config = SynthConfig::default();
        let synthesizer = Synthesizer::new(&surface, &config);
        let tracker = LifecycleTracker::new(&surface, &config);
        let scorer = Scorer::new(&surface);
        let req = request(&picks);

        let (Ok(first), Ok(second)) = (synthesizer.synthesize(&req), synthesizer.synthesize(&req)) else {
            return Ok(());
        };
        prop_assert_eq!(first.fingerprint(), second.fingerprint());

        let a = scorer.score(&tracker.validate_and_repair(first).sequence);
        let b = scorer.score(&tracker.validate_and_repair(second).sequence);
        prop_assert_eq!(a.density, b.density);
        prop_assert!((0.0..=1.0).contains(&a.density));

        let all_single = a.unique_branches.values().all(|n| *n == 1);
        let once = all_distinct(&picks);
        if a.density == 1.0 {
            prop_assert_eq!(a.bridging, 0);
            prop_assert!(all_single && once);
        }
        if a.bridging == 0 && all_single && once && !a.unique_branches.is_empty() {
            prop_assert_eq!(a.density, 1.0);
        }
    }
}

#[test]
fn round_trip_create_configure_operate_twice_cleanup() {
    let surface = vault();
    let config = SynthConfig::default();
    let seq = Synthesizer::new(&surface, &config)
        .synthesize(&request(&[
            "engine_create",
            "engine_configure",
            "engine_operate",
            "engine_operate",
            "engine_cleanup",
        ]))
        .expect("synthesizes");

    assert_eq!(seq.len(), 5);
    let tracker = LifecycleTracker::new(&surface, &config);
    assert!(tracker.validate(&seq).is_empty());

    let outcome = tracker.validate_and_repair(seq);
    assert!(outcome.is_clean());
    assert!(!outcome.was_repaired());
    let quality = Scorer::new(&surface).score(&outcome.sequence);

    assert_eq!(
        quality.library_calls,
        vec![
            "engine_create",
            "engine_configure",
            "engine_operate",
            "engine_operate",
            "engine_cleanup"
        ]
    );
    let mut distinct = quality.library_calls.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), 4);
    assert_eq!(quality.unique_branches.len(), 4);
    assert_eq!(quality.unique_branches.get("engine_operate(handle)"), Some(&2));
    assert_eq!(quality.bridging, 0);
}

#[test]
fn rejection_leaves_independent_request_untouched() {
    let surface = vault();
    let config = SynthConfig::default();
    let err = Synthesizer::new(&surface, &config)
        .synthesize(&request(&["token_peek"]))
        .expect_err("token has no constructor");
    assert!(
        matches!(&err, SynthError::UnsatisfiableCombination { missing, .. } if missing == "token")
    );

    let mut context = RunContext::new(config);
    context.register(surface).unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let summary = Pipeline::new(&context)
        .with_jobs(2)
        .run(
            &[request(&["token_peek"]), request(&["conn_open", "conn_exec"])],
            1,
            tmp.path(),
        )
        .unwrap();

    assert!(matches!(summary.outcomes[0], CombinationOutcome::Failed { .. }));
    assert!(summary.outcomes[1].is_accepted());
    assert_eq!(summary.emitted(), 1);

    let files: Vec<_> = std::fs::read_dir(tmp.path().join("vault"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|x| x == "cc"))
        .collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn repair_moves_finalizer_after_its_consumer() {
    let surface = vault();
    let config = SynthConfig::default();
    let seq = Synthesizer::new(&surface, &config)
        .synthesize(&request(&["conn_open", "conn_close", "conn_status"]).ordered(true))
        .expect("ordered request synthesizes");
    assert_eq!(seq.library_calls(), vec!["conn_open", "conn_close", "conn_status"]);

    let tracker = LifecycleTracker::new(&surface, &config);
    assert!(!tracker.validate(&seq).is_empty());

    let outcome = tracker.validate_and_repair(seq);
    assert!(outcome.is_clean(), "residual: {:?}", outcome.residual);
    assert!(matches!(
        outcome.repairs.first(),
        Some(RepairAction::MovedFinalizer { function, .. }) if function == "conn_close"
    ));
    assert_eq!(
        outcome.sequence.library_calls(),
        vec!["conn_open", "conn_status", "conn_close"]
    );
}
