//! Resource state machine analysis.
//!
//! Each resource kind carries a small finite state machine whose edges are
//! labeled by function roles. Before synthesis the machines are checked for
//! unreachable states, states that can never be released, and ambiguous
//! role edges.

use super::schema::{ResourceKind, Role, SurfaceSpec};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Result of analysing one resource state machine.
#[derive(Debug, Clone)]
pub struct MachineReport {
    /// Resource kind ID
    pub kind: String,
    /// Whether no error-severity issue was found
    pub is_valid: bool,
    /// Detected issues
    pub issues: Vec<MachineIssue>,
    /// Reachability information
    pub reachability: ReachabilityInfo,
}

impl MachineReport {
    /// Issues of the given severity.
    pub fn issues_with(&self, severity: IssueSeverity) -> impl Iterator<Item = &MachineIssue> {
        self.issues.iter().filter(move |i| i.severity() == severity)
    }
}

/// Information about state reachability.
#[derive(Debug, Clone, Default)]
pub struct ReachabilityInfo {
    /// States reachable from the initial state
    pub reachable_states: BTreeSet<String>,
    /// Declared states that cannot be reached
    pub orphaned_states: BTreeSet<String>,
    /// Whether the finalized state is reachable
    pub can_finalize: bool,
}

/// Issues found in a resource state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineIssue {
    /// Initial state has no constructor edge
    MissingConstructor,
    /// State is not reachable from the initial state
    OrphanedState { state: String },
    /// Live state with no outgoing edge
    DeadEndState { state: String },
    /// Live state from which the finalized state cannot be reached
    NoPathToFinalized { state: String },
    /// Two edges leave the same state under the same role
    NonDeterministic { state: String, role: Role },
    /// Destructor edge that does not leave its state
    DestructorSelfLoop { state: String },
    /// Edge leaving the finalized state
    ResurrectingTransition { role: Role, to: String },
}

impl MachineIssue {
    /// Get the severity of this issue.
    pub fn severity(&self) -> IssueSeverity {
        match self {
            Self::MissingConstructor | Self::OrphanedState { .. } | Self::DeadEndState { .. } => {
                IssueSeverity::Error
            }
            Self::NoPathToFinalized { .. }
            | Self::NonDeterministic { .. }
            | Self::DestructorSelfLoop { .. }
            | Self::ResurrectingTransition { .. } => IssueSeverity::Warning,
        }
    }
}

impl std::fmt::Display for MachineIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingConstructor => write!(f, "initial state has no constructor edge"),
            Self::OrphanedState { state } => write!(f, "state '{state}' is unreachable"),
            Self::DeadEndState { state } => write!(f, "state '{state}' has no outgoing edge"),
            Self::NoPathToFinalized { state } => {
                write!(f, "state '{state}' can never be finalized")
            }
            Self::NonDeterministic { state, role } => {
                write!(f, "state '{state}' has several {role} edges")
            }
            Self::DestructorSelfLoop { state } => {
                write!(f, "destructor edge loops on '{state}'")
            }
            Self::ResurrectingTransition { role, to } => {
                write!(f, "{role} edge leaves the finalized state towards '{to}'")
            }
        }
    }
}

/// Severity levels for machine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

/// Resource state machine validator.
#[derive(Debug)]
pub struct ResourceMachineValidator<'a> {
    kind: &'a ResourceKind,
}

impl<'a> ResourceMachineValidator<'a> {
    /// Create a new validator for the given kind.
    pub fn new(kind: &'a ResourceKind) -> Self {
        Self { kind }
    }

    /// Perform full validation of the state machine.
    pub fn validate(&self) -> MachineReport {
        let mut issues = Vec::new();
        let managed = self.kind.is_managed();

        if self
            .kind
            .next_state(&self.kind.initial, Role::Constructor)
            .is_none()
        {
            issues.push(MachineIssue::MissingConstructor);
        }

        let reachability = self.compute_reachability();
        for state in &reachability.orphaned_states {
            // unmanaged kinds never reach their finalized state
            if !managed && *state == self.kind.finalized {
                continue;
            }
            issues.push(MachineIssue::OrphanedState {
                state: state.clone(),
            });
        }

        if managed {
            self.check_dead_ends(&reachability, &mut issues);
            self.check_finalizable(&reachability, &mut issues);
        }
        self.check_determinism(&mut issues);
        self.check_finalized_edges(&mut issues);

        let has_errors = issues
            .iter()
            .any(|i| i.severity() == IssueSeverity::Error);

        MachineReport {
            kind: self.kind.id.clone(),
            is_valid: !has_errors,
            issues,
            reachability,
        }
    }

    /// BFS from the initial state.
    fn compute_reachability(&self) -> ReachabilityInfo {
        let mut reachable = BTreeSet::new();
        let mut queue = VecDeque::new();
        reachable.insert(self.kind.initial.clone());
        queue.push_back(self.kind.initial.clone());

        while let Some(current) = queue.pop_front() {
            for transition in &self.kind.transitions {
                if transition.from == current && !reachable.contains(&transition.to) {
                    reachable.insert(transition.to.clone());
                    queue.push_back(transition.to.clone());
                }
            }
        }

        let orphaned = self
            .kind
            .states
            .iter()
            .filter(|s| !reachable.contains(*s))
            .cloned()
            .collect();

        ReachabilityInfo {
            can_finalize: reachable.contains(&self.kind.finalized),
            reachable_states: reachable,
            orphaned_states: orphaned,
        }
    }

    fn check_dead_ends(&self, reachability: &ReachabilityInfo, issues: &mut Vec<MachineIssue>) {
        for state in &reachability.reachable_states {
            if !self.kind.is_live(state) {
                continue;
            }
            if !self.kind.transitions.iter().any(|t| &t.from == state) {
                issues.push(MachineIssue::DeadEndState {
                    state: state.clone(),
                });
            }
        }
    }

    /// Reverse reachability from the finalized state.
    fn check_finalizable(&self, reachability: &ReachabilityInfo, issues: &mut Vec<MachineIssue>) {
        let mut can_finalize = BTreeSet::new();
        can_finalize.insert(self.kind.finalized.clone());
        let mut changed = true;
        while changed {
            changed = false;
            for transition in &self.kind.transitions {
                if can_finalize.contains(&transition.to) && !can_finalize.contains(&transition.from)
                {
                    can_finalize.insert(transition.from.clone());
                    changed = true;
                }
            }
        }

        for state in &reachability.reachable_states {
            if self.kind.is_live(state) && !can_finalize.contains(state) {
                issues.push(MachineIssue::NoPathToFinalized {
                    state: state.clone(),
                });
            }
        }
    }

    fn check_determinism(&self, issues: &mut Vec<MachineIssue>) {
        let mut edges: HashMap<(&str, Role), usize> = HashMap::new();
        for transition in &self.kind.transitions {
            *edges
                .entry((transition.from.as_str(), transition.role))
                .or_default() += 1;
            if transition.role == Role::Destructor && transition.from == transition.to {
                issues.push(MachineIssue::DestructorSelfLoop {
                    state: transition.from.clone(),
                });
            }
        }
        let mut ambiguous: Vec<_> = edges.into_iter().filter(|(_, n)| *n > 1).collect();
        ambiguous.sort();
        for ((state, role), _) in ambiguous {
            issues.push(MachineIssue::NonDeterministic {
                state: state.to_string(),
                role,
            });
        }
    }

    fn check_finalized_edges(&self, issues: &mut Vec<MachineIssue>) {
        for transition in &self.kind.transitions {
            if transition.from == self.kind.finalized {
                issues.push(MachineIssue::ResurrectingTransition {
                    role: transition.role,
                    to: transition.to.clone(),
                });
            }
        }
    }
}

/// Generate a DOT diagram of every resource state machine of a surface.
pub fn to_dot(spec: &SurfaceSpec) -> String {
    let mut dot = String::new();
    dot.push_str(&format!("digraph \"{}\" {{\n", spec.library));
    dot.push_str("  rankdir=LR;\n");
    dot.push_str("  node [shape=ellipse];\n");

    for (id, kind) in &spec.resources {
        let node = |state: &str| format!("{id}/{state}");
        dot.push_str(&format!(
            "  subgraph \"cluster_{id}\" {{\n    label=\"{id} ({})\";\n",
            kind.c_type
        ));
        dot.push_str(&format!(
            "    \"{id}/__start\" [shape=point];\n    \"{id}/__start\" -> \"{}\";\n",
            node(&kind.initial)
        ));
        for state in &kind.states {
            let shape = if *state == kind.finalized {
                "doublecircle"
            } else {
                "ellipse"
            };
            dot.push_str(&format!(
                "    \"{}\" [label=\"{state}\", shape={shape}];\n",
                node(state)
            ));
        }
        for transition in &kind.transitions {
            dot.push_str(&format!(
                "    \"{}\" -> \"{}\" [label=\"{}\"];\n",
                node(&transition.from),
                node(&transition.to),
                transition.role
            ));
        }
        dot.push_str("  }\n");
    }

    dot.push_str("}\n");
    dot
}
