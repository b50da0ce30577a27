//! Replay of a sequence against the resource state machines.

use super::tracker::Violation;
use crate::sequence::{ArgValue, CallSite, CallSiteId, ResourceId, Sequence};
use crate::surface::{ApiFunction, ParamKind, Role, SurfaceModel};
use std::collections::{BTreeMap, BTreeSet};

/// Everything observed while replaying call sites in position order.
#[derive(Debug, Clone, Default)]
pub struct ReplayTrace {
    /// State of every resource after the replayed prefix
    pub states: BTreeMap<ResourceId, String>,
    /// Call that moved a resource into its finalized state
    pub finalized_by: BTreeMap<ResourceId, CallSiteId>,
    /// Resources handed over to another handle
    pub transferred: BTreeSet<ResourceId>,
    /// Distinct `(kind, from, to)` transitions exercised
    pub transitions: BTreeSet<(String, String, String)>,
    /// Lifecycle violations in position order
    pub violations: Vec<Violation>,
    /// Called functions absent from the surface
    pub unknown_functions: Vec<String>,
}

impl ReplayTrace {
    /// Most recently produced live resource compatible with `kind` whose
    /// producer sits before `position`.
    pub fn latest_live(
        &self,
        surface: &SurfaceModel,
        seq: &Sequence,
        kind: &str,
        position: usize,
    ) -> Option<ResourceId> {
        seq.resources()
            .iter()
            .filter(|r| surface.compatible(&r.kind, kind))
            .filter(|r| {
                self.states
                    .get(&r.id)
                    .is_some_and(|s| surface.is_live(&r.kind, s))
            })
            .filter_map(|r| seq.producer_position(r.id).map(|p| (p, r.id)))
            .filter(|(p, _)| *p < position)
            .max()
            .map(|(_, id)| id)
    }
}

/// Replay the whole sequence, including the finalizer order and
/// end-of-sequence leak checks.
pub fn replay(surface: &SurfaceModel, seq: &Sequence) -> ReplayTrace {
    let mut trace = replay_prefix(surface, seq, seq.len());
    check_finalizer_order(seq, &mut trace);
    if seq.intentional_leak() {
        return trace;
    }
    for res in seq.resources() {
        let Ok(kind) = surface.kind(&res.kind) else {
            continue;
        };
        let live = trace
            .states
            .get(&res.id)
            .is_some_and(|state| kind.is_live(state));
        let managed = surface
            .finalizers_for(&res.kind)
            .is_ok_and(|f| !f.is_empty());
        if live && managed {
            trace.violations.push(Violation::Leak {
                resource: res.id,
                var: res.var.clone(),
                kind: res.kind.clone(),
            });
        }
    }
    trace
}

/// Finalizers must run in reverse creation order: an older resource is
/// finalized only after every younger one. Transferred resources are owned
/// by their new holder and take no part.
fn check_finalizer_order(seq: &Sequence, trace: &mut ReplayTrace) {
    let mut finalized: Vec<(usize, usize, ResourceId, CallSiteId)> = trace
        .finalized_by
        .iter()
        .filter(|(r, _)| !trace.transferred.contains(r))
        .filter_map(|(r, call)| {
            Some((seq.producer_position(*r)?, seq.position(*call)?, *r, *call))
        })
        .collect();
    finalized.sort_unstable();

    for (i, &(_, at, resource, call)) in finalized.iter().enumerate() {
        let younger = finalized[i + 1..]
            .iter()
            .filter(|(_, other_at, _, _)| *other_at > at)
            .max_by_key(|(_, other_at, _, _)| *other_at);
        let Some(&(_, _, younger, _)) = younger else {
            continue;
        };
        let var = |r: ResourceId| seq.resource(r).map(|res| res.var.clone()).unwrap_or_default();
        let function = seq.call(call).map(|c| c.function.clone()).unwrap_or_default();
        trace.violations.push(Violation::FinalizeOutOfOrder {
            call,
            function,
            resource,
            var: var(resource),
            younger: var(younger),
        });
    }
}

/// Replay the first `upto` call sites.
pub fn replay_prefix(surface: &SurfaceModel, seq: &Sequence, upto: usize) -> ReplayTrace {
    let mut trace = ReplayTrace::default();
    for res in seq.resources() {
        if let Ok(kind) = surface.kind(&res.kind) {
            trace.states.insert(res.id, kind.initial.clone());
        }
    }

    for call in seq.call_sites().iter().take(upto) {
        let Some(function) = surface.function(&call.function) else {
            trace.unknown_functions.push(call.function.clone());
            continue;
        };
        step(surface, seq, call, function, &mut trace);
    }
    trace
}

fn step(
    surface: &SurfaceModel,
    seq: &Sequence,
    call: &CallSite,
    function: &ApiFunction,
    trace: &mut ReplayTrace,
) {
    let subject = function.subject_index();
    let mut updates: Vec<(ResourceId, String)> = Vec::new();

    for (i, (param, arg)) in function.params.iter().zip(&call.args).enumerate() {
        let (want, transfer) = match (&param.kind, arg) {
            (ParamKind::HandleIn { resource, transfer, .. }, ArgValue::Resource { .. }) => {
                (resource, *transfer)
            }
            (
                ParamKind::Buffer {
                    resource: Some(resource),
                    ..
                },
                ArgValue::Resource { .. },
            ) => (resource, false),
            _ => continue,
        };
        let ArgValue::Resource { id, .. } = arg else {
            continue;
        };
        let Some(res) = seq.resource(*id) else {
            continue;
        };
        let Ok(kind) = surface.kind(&res.kind) else {
            continue;
        };

        if !surface.compatible(&res.kind, want) {
            trace.violations.push(Violation::IncompatibleBinding {
                call: call.id,
                function: call.function.clone(),
                resource: *id,
                expected: want.clone(),
                found: res.kind.clone(),
            });
            continue;
        }

        let state = trace.states.get(id).cloned().unwrap_or_default();
        let is_subject = subject == Some(i);
        if state == kind.initial {
            trace.violations.push(Violation::UseBeforeInit {
                call: call.id,
                function: call.function.clone(),
                resource: *id,
                var: res.var.clone(),
            });
        } else if state == kind.finalized {
            let finalized_by = trace.finalized_by.get(id).copied();
            let (call_id, name, var) = (call.id, call.function.clone(), res.var.clone());
            trace.violations.push(if is_subject && function.role == Role::Destructor {
                Violation::DoubleFinalize {
                    call: call_id,
                    function: name,
                    resource: *id,
                    var,
                    finalized_by,
                }
            } else if is_subject {
                Violation::UseAfterFinalize {
                    call: call_id,
                    function: name,
                    resource: *id,
                    var,
                    finalized_by,
                }
            } else {
                Violation::DanglingAliasAfterFinalize {
                    call: call_id,
                    function: name,
                    resource: *id,
                    var,
                    finalized_by,
                }
            });
        } else if is_subject {
            if let Some(next) = surface.accepts(function, &res.kind, &state) {
                trace
                    .transitions
                    .insert((res.kind.clone(), state.clone(), next.to_string()));
                updates.push((*id, next.to_string()));
            } else {
                trace.violations.push(Violation::StateMismatch {
                    call: call.id,
                    function: call.function.clone(),
                    resource: *id,
                    var: res.var.clone(),
                    state,
                });
            }
        } else if transfer {
            trace.transferred.insert(*id);
            updates.push((*id, kind.finalized.clone()));
        }
    }

    if let Some(r) = call.produces {
        if let Some(res) = seq.resource(r) {
            if let Some(to) = surface.constructed_state(&res.kind) {
                let from = trace.states.get(&r).cloned().unwrap_or_default();
                trace
                    .transitions
                    .insert((res.kind.clone(), from, to.to_string()));
                updates.push((r, to.to_string()));
            }
        }
    }

    for (id, state) in updates {
        let finalized = seq
            .resource(id)
            .and_then(|res| surface.kind(&res.kind).ok())
            .is_some_and(|k| k.finalized == state);
        if finalized {
            trace.finalized_by.insert(id, call.id);
        }
        trace.states.insert(id, state);
    }
}
