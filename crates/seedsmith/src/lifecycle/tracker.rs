//! Lifecycle validation and the repair loop.

use super::repair::RepairAction;
use super::replay::replay;
use crate::config::SynthConfig;
use crate::sequence::{CallSiteId, ResourceId, Sequence, ValidatedSequence};
use crate::surface::SurfaceModel;
use tracing::debug;

/// Lifecycle rule broken by a call site.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("#{call} {function}: `{var}` used before initialization")]
    UseBeforeInit {
        call: CallSiteId,
        function: String,
        resource: ResourceId,
        var: String,
    },

    #[error("#{call} {function}: `{var}` used after it was finalized")]
    UseAfterFinalize {
        call: CallSiteId,
        function: String,
        resource: ResourceId,
        var: String,
        finalized_by: Option<CallSiteId>,
    },

    #[error("#{call} {function}: `{var}` finalized twice")]
    DoubleFinalize {
        call: CallSiteId,
        function: String,
        resource: ResourceId,
        var: String,
        finalized_by: Option<CallSiteId>,
    },

    #[error("#{call} {function}: `{var}` passed along after it was finalized")]
    DanglingAliasAfterFinalize {
        call: CallSiteId,
        function: String,
        resource: ResourceId,
        var: String,
        finalized_by: Option<CallSiteId>,
    },

    #[error("#{call} {function}: `{var}` is '{state}', which the call does not accept")]
    StateMismatch {
        call: CallSiteId,
        function: String,
        resource: ResourceId,
        var: String,
        state: String,
    },

    #[error("#{call} {function}: expected a '{expected}' handle, got '{found}'")]
    IncompatibleBinding {
        call: CallSiteId,
        function: String,
        resource: ResourceId,
        expected: String,
        found: String,
    },

    #[error("#{call} {function}: `{var}` finalized before the younger `{younger}`")]
    FinalizeOutOfOrder {
        call: CallSiteId,
        function: String,
        resource: ResourceId,
        var: String,
        younger: String,
    },

    #[error("`{var}` ({kind}) is never finalized")]
    Leak {
        resource: ResourceId,
        var: String,
        kind: String,
    },
}

impl Violation {
    /// Short name, used in summaries.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::UseBeforeInit { .. } => "UseBeforeInit",
            Self::UseAfterFinalize { .. } => "UseAfterFinalize",
            Self::DoubleFinalize { .. } => "DoubleFinalize",
            Self::DanglingAliasAfterFinalize { .. } => "DanglingAliasAfterFinalize",
            Self::StateMismatch { .. } => "StateMismatch",
            Self::IncompatibleBinding { .. } => "IncompatibleBinding",
            Self::FinalizeOutOfOrder { .. } => "FinalizeOutOfOrder",
            Self::Leak { .. } => "Leak",
        }
    }

    /// Offending call site, if the violation is tied to one.
    pub const fn call(&self) -> Option<CallSiteId> {
        match self {
            Self::UseBeforeInit { call, .. }
            | Self::UseAfterFinalize { call, .. }
            | Self::DoubleFinalize { call, .. }
            | Self::DanglingAliasAfterFinalize { call, .. }
            | Self::StateMismatch { call, .. }
            | Self::IncompatibleBinding { call, .. }
            | Self::FinalizeOutOfOrder { call, .. } => Some(*call),
            Self::Leak { .. } => None,
        }
    }

    /// Resource involved.
    pub const fn resource(&self) -> ResourceId {
        match self {
            Self::UseBeforeInit { resource, .. }
            | Self::UseAfterFinalize { resource, .. }
            | Self::DoubleFinalize { resource, .. }
            | Self::DanglingAliasAfterFinalize { resource, .. }
            | Self::StateMismatch { resource, .. }
            | Self::IncompatibleBinding { resource, .. }
            | Self::FinalizeOutOfOrder { resource, .. }
            | Self::Leak { resource, .. } => *resource,
        }
    }
}

/// Outcome of validation with repair.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub sequence: ValidatedSequence,
    /// Repairs applied, in order
    pub repairs: Vec<RepairAction>,
    /// Violations left after the repair budget; non-empty means reject
    pub residual: Vec<Violation>,
}

impl ValidationOutcome {
    pub fn is_clean(&self) -> bool {
        self.residual.is_empty()
    }

    pub fn was_repaired(&self) -> bool {
        !self.repairs.is_empty()
    }
}

/// Resource lifecycle tracker for one surface.
#[derive(Debug)]
pub struct LifecycleTracker<'a> {
    pub(super) surface: &'a SurfaceModel,
    pub(super) config: &'a SynthConfig,
}

impl<'a> LifecycleTracker<'a> {
    pub fn new(surface: &'a SurfaceModel, config: &'a SynthConfig) -> Self {
        Self { surface, config }
    }

    /// Replay the sequence and report every violation in position order.
    pub fn validate(&self, seq: &Sequence) -> Vec<Violation> {
        replay(self.surface, seq).violations
    }

    /// Validate, repairing one violation at a time until the sequence is
    /// clean, no repair applies, or `max_repairs` is spent.
    pub fn validate_and_repair(&self, seq: Sequence) -> ValidationOutcome {
        let mut seq = seq;
        let mut repairs = Vec::new();
        let mut violations = self.validate(&seq);

        while !violations.is_empty() && repairs.len() < self.config.max_repairs {
            let Some(action) = violations.iter().find_map(|v| self.repair(&mut seq, v)) else {
                debug!(residual = violations.len(), "no repair applies");
                break;
            };
            debug!(%action, "repair applied");
            repairs.push(action);
            violations = self.validate(&seq);
        }

        ValidationOutcome {
            sequence: ValidatedSequence::new(seq),
            repairs,
            residual: violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{names, widget_surface};
    use crate::sequence::{ArgValue, CallSite, Origin, Phase};
    use crate::synth::{CombinationRequest, Synthesizer};

    fn push(
        seq: &mut Sequence,
        function: &str,
        args: Vec<ArgValue>,
        phase: Phase,
        produces: Option<&str>,
    ) -> (CallSiteId, Option<ResourceId>) {
        let id = seq.reserve_call_id();
        let produced = produces.map(|kind| seq.new_resource(kind, id));
        seq.push(CallSite {
            id,
            function: function.to_string(),
            args,
            phase,
            origin: Origin::Requested,
            produces: produced,
        });
        (id, produced)
    }

    fn handle(id: ResourceId) -> ArgValue {
        ArgValue::Resource { id, by_ref: false }
    }

    #[test]
    fn test_synthesized_sequences_are_clean() {
        let surface = widget_surface();
        let config = SynthConfig::default();
        let synth = Synthesizer::new(&surface, &config);
        let tracker = LifecycleTracker::new(&surface, &config);
        for combo in [
            vec!["widget_new", "widget_set_name", "widget_run", "widget_free"],
            vec!["widget_count"],
            vec!["widget_new", "widget_export", "widget_copy_into"],
            vec!["child_new", "widget_attach", "widget_feed"],
        ] {
            let request = CombinationRequest::new("widget", names(&combo));
            let seq = synth.synthesize(&request).expect("synthesizes");
            assert!(tracker.validate(&seq).is_empty(), "{combo:?}");
        }
    }

    #[test]
    fn test_detect_use_after_finalize_and_leak_free() {
        let surface = widget_surface();
        let config = SynthConfig::default();
        let tracker = LifecycleTracker::new(&surface, &config);
        let mut seq = Sequence::new("widget", vec![]);
        let lit = ArgValue::Literal { text: "0".into() };
        let (_, w) = push(&mut seq, "widget_new", vec![lit], Phase::Init, Some("widget"));
        let w = w.expect("produced");
        let (free, _) = push(&mut seq, "widget_free", vec![handle(w)], Phase::Cleanup, None);
        let (set, _) = push(
            &mut seq,
            "widget_set_name",
            vec![handle(w), ArgValue::Literal { text: "\"a\"".into() }],
            Phase::Configure,
            None,
        );

        let violations = tracker.validate(&seq);
        assert_eq!(
            violations,
            vec![Violation::UseAfterFinalize {
                call: set,
                function: "widget_set_name".into(),
                resource: w,
                var: "widget_1".into(),
                finalized_by: Some(free),
            }]
        );
    }

    #[test]
    fn test_detect_double_finalize() {
        let surface = widget_surface();
        let config = SynthConfig::default();
        let tracker = LifecycleTracker::new(&surface, &config);
        let mut seq = Sequence::new("widget", vec![]);
        let (_, w) = push(&mut seq, "widget_new", vec![], Phase::Init, Some("widget"));
        let w = w.expect("produced");
        push(&mut seq, "widget_free", vec![handle(w)], Phase::Cleanup, None);
        push(&mut seq, "widget_free", vec![handle(w)], Phase::Cleanup, None);
        let violations = tracker.validate(&seq);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].name(), "DoubleFinalize");
    }

    #[test]
    fn test_detect_dangling_operand() {
        let surface = widget_surface();
        let config = SynthConfig::default();
        let tracker = LifecycleTracker::new(&surface, &config);
        let mut seq = Sequence::new("widget", vec![]);
        let (_, w) = push(&mut seq, "widget_new", vec![], Phase::Init, Some("widget"));
        let w = w.expect("produced");
        push(&mut seq, "widget_free", vec![handle(w)], Phase::Cleanup, None);
        push(&mut seq, "widget_export", vec![handle(w)], Phase::Init, Some("blob"));
        let violations = tracker.validate(&seq);
        assert_eq!(violations[0].name(), "DanglingAliasAfterFinalize");
        // the exported blob is never freed
        assert_eq!(violations[1].name(), "Leak");
    }

    #[test]
    fn test_detect_use_before_init_and_state_mismatch() {
        let surface = widget_surface();
        let config = SynthConfig::default();
        let tracker = LifecycleTracker::new(&surface, &config);
        let mut seq = Sequence::new("widget", vec![]);
        let early = seq.reserve_call_id();
        let w = seq.new_resource("widget", 99);
        seq.push(CallSite {
            id: early,
            function: "widget_run".into(),
            args: vec![handle(w)],
            phase: Phase::Operate,
            origin: Origin::Requested,
            produces: None,
        });
        let violations = tracker.validate(&seq);
        assert_eq!(violations[0].name(), "UseBeforeInit");

        let mut seq = Sequence::new("widget", vec![]);
        let (_, w) = push(&mut seq, "widget_new", vec![], Phase::Init, Some("widget"));
        let w = w.expect("produced");
        push(&mut seq, "widget_count", vec![handle(w)], Phase::Validate, None);
        push(&mut seq, "widget_free", vec![handle(w)], Phase::Cleanup, None);
        let violations = tracker.validate(&seq);
        assert!(matches!(
            &violations[..],
            [Violation::StateMismatch { state, .. }] if state == "created"
        ));
    }

    #[test]
    fn test_detect_incompatible_binding() {
        let surface = widget_surface();
        let config = SynthConfig::default();
        let tracker = LifecycleTracker::new(&surface, &config);
        let mut seq = Sequence::new("widget", vec![]);
        let (_, c) = push(&mut seq, "child_new", vec![], Phase::Init, Some("child"));
        let c = c.expect("produced");
        push(&mut seq, "widget_run", vec![handle(c)], Phase::Operate, None);
        push(&mut seq, "child_free", vec![handle(c)], Phase::Cleanup, None);
        let violations = tracker.validate(&seq);
        assert!(matches!(
            &violations[..],
            [Violation::IncompatibleBinding { expected, found, .. }]
                if expected == "widget" && found == "child"
        ));
    }

    #[test]
    fn test_detect_parent_finalized_before_child() {
        let surface = widget_surface();
        let config = SynthConfig::default();
        let tracker = LifecycleTracker::new(&surface, &config);
        let mut seq = Sequence::new("widget", vec![]);
        let (_, w) = push(&mut seq, "widget_new", vec![], Phase::Init, Some("widget"));
        let w = w.expect("produced");
        let (_, b) = push(&mut seq, "widget_export", vec![handle(w)], Phase::Init, Some("blob"));
        let b = b.expect("produced");
        let (free, _) = push(&mut seq, "widget_free", vec![handle(w)], Phase::Cleanup, None);
        push(&mut seq, "blob_free", vec![handle(b)], Phase::Cleanup, None);

        assert_eq!(
            tracker.validate(&seq),
            vec![Violation::FinalizeOutOfOrder {
                call: free,
                function: "widget_free".into(),
                resource: w,
                var: "widget_1".into(),
                younger: "blob_1".into(),
            }]
        );
    }

    #[test]
    fn test_transferred_resource_ignored_by_finalizer_order() {
        let surface = widget_surface();
        let config = SynthConfig::default();
        let tracker = LifecycleTracker::new(&surface, &config);
        let mut seq = Sequence::new("widget", vec![]);
        let (_, c) = push(&mut seq, "child_new", vec![], Phase::Init, Some("child"));
        let c = c.expect("produced");
        let (_, w) = push(&mut seq, "widget_new", vec![], Phase::Init, Some("widget"));
        let w = w.expect("produced");
        push(
            &mut seq,
            "widget_attach",
            vec![handle(w), handle(c)],
            Phase::Configure,
            None,
        );
        push(&mut seq, "widget_free", vec![handle(w)], Phase::Cleanup, None);
        assert!(tracker.validate(&seq).is_empty());
    }

    #[test]
    fn test_leak_suppressed_when_intentional() {
        let surface = widget_surface();
        let config = SynthConfig::default();
        let tracker = LifecycleTracker::new(&surface, &config);
        let mut seq = Sequence::new("widget", vec![]);
        push(&mut seq, "widget_new", vec![], Phase::Init, Some("widget"));
        assert_eq!(tracker.validate(&seq)[0].name(), "Leak");
        let seq = seq.with_intentional_leak(true);
        assert!(tracker.validate(&seq).is_empty());
    }

    #[test]
    fn test_violation_accessors_and_display() {
        let v = Violation::Leak {
            resource: 3,
            var: "widget_2".into(),
            kind: "widget".into(),
        };
        assert_eq!(v.call(), None);
        assert_eq!(v.resource(), 3);
        assert_eq!(v.to_string(), "`widget_2` (widget) is never finalized");
    }
}
