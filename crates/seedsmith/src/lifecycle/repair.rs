//! Local repairs for lifecycle violations.
//!
//! Every repair keeps requested call sites in the sequence; only inserted
//! call sites may be dropped.

use super::replay::{replay, replay_prefix, ReplayTrace};
use super::tracker::{LifecycleTracker, Violation};
use crate::sequence::{ArgValue, CallSite, CallSiteId, Origin, Phase, ResourceId, Sequence};
use crate::surface::{ApiFunction, ParamKind, Role, Storage};
use crate::synth::{fill_plain_args, Strategy};
use serde::Serialize;

/// A repair applied to a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairAction {
    /// Finalizer moved to the cleanup slot after the resource's last consumer
    MovedFinalizer {
        call: CallSiteId,
        function: String,
        resource: ResourceId,
        position: usize,
    },
    /// Inserted call site removed
    DroppedCall { call: CallSiteId, function: String },
    /// Call site re-bound to a freshly allocated resource
    Rebound {
        call: CallSiteId,
        from: ResourceId,
        to: ResourceId,
    },
    /// State-advancing calls inserted before a call site
    AdvancedState {
        call: CallSiteId,
        inserted: Vec<String>,
    },
    /// Cleanup finalizer inserted for a leaked resource
    InsertedFinalizer {
        resource: ResourceId,
        function: String,
    },
}

impl std::fmt::Display for RepairAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MovedFinalizer {
                function, position, ..
            } => write!(f, "moved {function} to position {position}"),
            Self::DroppedCall { function, .. } => write!(f, "dropped inserted {function}"),
            Self::Rebound { call, from, to } => {
                write!(f, "re-bound #{call} from resource {from} to fresh resource {to}")
            }
            Self::AdvancedState { call, inserted } => {
                write!(f, "inserted {} before #{call}", inserted.join(", "))
            }
            Self::InsertedFinalizer { function, .. } => write!(f, "inserted finalizer {function}"),
        }
    }
}

impl LifecycleTracker<'_> {
    /// Try a local fix for one violation. Returns `None` and leaves the
    /// sequence untouched when no fix applies.
    pub fn repair(&self, seq: &mut Sequence, violation: &Violation) -> Option<RepairAction> {
        match violation {
            Violation::UseAfterFinalize {
                call,
                resource,
                finalized_by,
                ..
            }
            | Violation::DanglingAliasAfterFinalize {
                call,
                resource,
                finalized_by,
                ..
            } => finalized_by
                .and_then(|fin| self.move_finalizer(seq, fin, *resource))
                .or_else(|| self.replace_stale(seq, *call, *resource)),
            Violation::DoubleFinalize { call, resource, .. } => {
                self.replace_stale(seq, *call, *resource)
            }
            Violation::UseBeforeInit { call, resource, .. }
            | Violation::IncompatibleBinding { call, resource, .. } => {
                self.rebind_fresh(seq, *call, *resource)
            }
            Violation::StateMismatch {
                call,
                resource,
                state,
                ..
            } => self
                .advance_state(seq, *call, *resource, state)
                .or_else(|| self.rebind_fresh(seq, *call, *resource)),
            Violation::FinalizeOutOfOrder { call, resource, .. } => {
                self.move_finalizer(seq, *call, *resource)
            }
            Violation::Leak { resource, .. } => self.insert_finalizer(seq, *resource),
        }
    }

    /// Move the destructor `fin` of `resource` after its last consumer and
    /// after the finalizers of every younger resource.
    fn move_finalizer(
        &self,
        seq: &mut Sequence,
        fin: CallSiteId,
        resource: ResourceId,
    ) -> Option<RepairAction> {
        let site = seq.call(fin)?;
        let function = self.surface.function(&site.function)?;
        if function.role != Role::Destructor {
            return None;
        }
        let subject = function.subject_index()?;
        if site.args.get(subject).and_then(ArgValue::resource) != Some(resource) {
            return None;
        }

        let mut site = seq.remove(fin)?;
        let created = seq.producer_position(resource).unwrap_or(0);
        let calls = seq.call_sites();
        let last_use = calls
            .iter()
            .rposition(|c| c.reads(resource) || c.produces == Some(resource))
            .map_or(0, |p| p + 1);
        let last_younger = calls
            .iter()
            .rposition(|c| {
                self.finalized_subject(c)
                    .and_then(|other| seq.producer_position(other))
                    .is_some_and(|other_created| other_created > created)
            })
            .map_or(0, |p| p + 1);
        let position = self.cleanup_slot(seq, resource, last_use.max(last_younger));
        site.phase = Phase::Cleanup;
        let name = site.function.clone();
        seq.insert(position, site);
        Some(RepairAction::MovedFinalizer {
            call: fin,
            function: name,
            resource,
            position,
        })
    }

    /// Drop an inserted call site, or re-bind a requested one.
    fn replace_stale(
        &self,
        seq: &mut Sequence,
        call: CallSiteId,
        resource: ResourceId,
    ) -> Option<RepairAction> {
        if seq.call(call)?.origin == Origin::Requested {
            return self.rebind_fresh(seq, call, resource);
        }
        let removed = seq.remove(call)?;
        Some(RepairAction::DroppedCall {
            call,
            function: removed.function,
        })
    }

    /// Allocate a fresh resource before `call` and bind it instead of `stale`.
    fn rebind_fresh(
        &self,
        seq: &mut Sequence,
        call: CallSiteId,
        stale: ResourceId,
    ) -> Option<RepairAction> {
        let site = seq.call(call)?;
        let function = self.surface.function(&site.function)?;
        let index = site
            .args
            .iter()
            .position(|a| matches!(a, ArgValue::Resource { id, .. } if *id == stale))?;
        let want = function.params.get(index)?.kind.resource()?.to_string();
        let subject_of = (function.subject_index() == Some(index)).then_some(function);

        let fresh = self.fresh_allocation(seq, &want, call, subject_of)?;
        seq.rebind(call, stale, fresh);
        Some(RepairAction::Rebound {
            call,
            from: stale,
            to: fresh,
        })
    }

    /// Insert a constructor (and any state-advancing calls `subject_of`
    /// needs) right before `before`.
    fn fresh_allocation(
        &self,
        seq: &mut Sequence,
        kind: &str,
        before: CallSiteId,
        subject_of: Option<&ApiFunction>,
    ) -> Option<ResourceId> {
        let producers = self.surface.functions_producing(kind).ok()?;
        let ctor = producers
            .iter()
            .copied()
            .find(|p| p.handle_arity() == 0)
            .or_else(|| producers.first().copied())?;

        let constructed = self.surface.constructed_state(kind)?;
        let path = match subject_of {
            Some(f) if self.surface.accepts(f, kind, constructed).is_none() => {
                self.surface.path_to_state(
                    kind,
                    constructed,
                    |s| self.surface.accepts(f, kind, s).is_some(),
                    self.config.max_bridging_depth,
                )?
            }
            _ => Vec::new(),
        };

        let position = seq.position(before)?;
        let phase = seq.call(before)?.phase;
        let trace = replay_prefix(self.surface, seq, position);
        let operands = self.bind_operands(seq, ctor, None, &trace, position)?;

        let id = seq.reserve_call_id();
        let fresh = seq.new_resource(kind, id);
        let site = self.build_call(seq, ctor, id, operands, Some(fresh), phase, Origin::Repair);
        seq.insert(position, site);

        for g in path {
            let position = seq.position(before)?;
            let trace = replay_prefix(self.surface, seq, position);
            let operands = self.bind_operands(seq, g, Some(fresh), &trace, position)?;
            let id = seq.reserve_call_id();
            let site = self.build_call(seq, g, id, operands, None, phase, Origin::Repair);
            seq.insert(position, site);
        }
        Some(fresh)
    }

    /// Insert the calls moving `resource` from `state` into a state `call` accepts.
    fn advance_state(
        &self,
        seq: &mut Sequence,
        call: CallSiteId,
        resource: ResourceId,
        state: &str,
    ) -> Option<RepairAction> {
        let site = seq.call(call)?;
        let function = self.surface.function(&site.function)?;
        let phase = site.phase;
        let kind = seq.resource(resource)?.kind.clone();
        let path = self.surface.path_to_state(
            &kind,
            state,
            |s| self.surface.accepts(function, &kind, s).is_some(),
            self.config.max_bridging_depth,
        )?;
        if path.is_empty() {
            return None;
        }

        let mut inserted = Vec::new();
        for g in path {
            let position = seq.position(call)?;
            let trace = replay_prefix(self.surface, seq, position);
            let operands = self.bind_operands(seq, g, Some(resource), &trace, position)?;
            let id = seq.reserve_call_id();
            let site = self.build_call(seq, g, id, operands, None, phase, Origin::Repair);
            seq.insert(position, site);
            inserted.push(g.name.clone());
        }
        Some(RepairAction::AdvancedState { call, inserted })
    }

    /// Insert a finalizer for a leaked resource at its cleanup slot.
    fn insert_finalizer(&self, seq: &mut Sequence, resource: ResourceId) -> Option<RepairAction> {
        let kind = seq.resource(resource)?.kind.clone();
        let trace = replay(self.surface, seq);
        let state = trace.states.get(&resource)?.clone();
        let finalizer = self
            .surface
            .finalizers_for(&kind)
            .ok()?
            .into_iter()
            .find(|d| self.surface.accepts(d, &kind, &state).is_some())?;

        let after = seq
            .call_sites()
            .iter()
            .rposition(|c| c.reads(resource) || c.produces == Some(resource))
            .map_or(0, |p| p + 1);
        let position = self.cleanup_slot(seq, resource, after);
        let trace = replay_prefix(self.surface, seq, position);
        let operands = self.bind_operands(seq, finalizer, Some(resource), &trace, position)?;
        let id = seq.reserve_call_id();
        let site = self.build_call(
            seq,
            finalizer,
            id,
            operands,
            None,
            Phase::Cleanup,
            Origin::Cleanup,
        );
        seq.insert(position, site);
        Some(RepairAction::InsertedFinalizer {
            resource,
            function: finalizer.name.clone(),
        })
    }

    /// First position at or after `after` that keeps finalizers in reverse
    /// creation order: after every finalizer of a younger resource, before
    /// the first finalizer of an older one.
    fn cleanup_slot(&self, seq: &Sequence, resource: ResourceId, after: usize) -> usize {
        let created = seq.producer_position(resource).unwrap_or(0);
        let calls = seq.call_sites();
        (after..calls.len())
            .find(|&p| {
                self.finalized_subject(&calls[p])
                    .and_then(|other| seq.producer_position(other))
                    .is_some_and(|other_created| other_created < created)
            })
            .unwrap_or(calls.len())
    }

    /// Subject of a destructor call.
    fn finalized_subject(&self, call: &CallSite) -> Option<ResourceId> {
        let function = self.surface.function(&call.function)?;
        if function.role != Role::Destructor {
            return None;
        }
        call.args.get(function.subject_index()?)?.resource()
    }

    /// Resolve every handle param of `function`: the subject to `subject`,
    /// operands to the latest live compatible resource before `position`.
    fn bind_operands(
        &self,
        seq: &Sequence,
        function: &ApiFunction,
        subject: Option<ResourceId>,
        trace: &ReplayTrace,
        position: usize,
    ) -> Option<Vec<Option<ArgValue>>> {
        let subject_index = function.subject_index();
        let mut bound = vec![None; function.params.len()];
        for (i, param) in function.params.iter().enumerate() {
            let (kind, by_ref) = match &param.kind {
                ParamKind::HandleIn {
                    resource, by_ref, ..
                } => (resource, *by_ref),
                ParamKind::Buffer {
                    resource: Some(resource),
                    ..
                } => (resource, false),
                _ => continue,
            };
            let id = match subject.filter(|_| subject_index == Some(i)) {
                Some(r) => r,
                None => trace.latest_live(self.surface, seq, kind, position)?,
            };
            let by_ref = by_ref
                || (matches!(param.kind, ParamKind::HandleIn { .. })
                    && seq
                        .resource(id)
                        .and_then(|r| self.surface.kind(&r.kind).ok())
                        .is_some_and(|k| k.storage == Storage::Value));
            bound[i] = Some(ArgValue::Resource { id, by_ref });
        }
        Some(bound)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_call(
        &self,
        seq: &mut Sequence,
        function: &ApiFunction,
        id: CallSiteId,
        mut bound: Vec<Option<ArgValue>>,
        produces: Option<ResourceId>,
        phase: Phase,
        origin: Origin,
    ) -> CallSite {
        if let Some(r) = produces {
            for (slot, param) in bound.iter_mut().zip(&function.params) {
                if matches!(param.kind, ParamKind::HandleOut { .. }) {
                    *slot = Some(ArgValue::Output { id: r });
                }
            }
        }
        let args = fill_plain_args(seq, function, &Strategy::default(), 0, bound);
        CallSite {
            id,
            function: function.name.clone(),
            args,
            phase,
            origin,
            produces,
        }
    }
}
