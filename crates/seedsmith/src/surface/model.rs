//! Loaded, validated surface with lifecycle queries.

use super::machine::{IssueSeverity, ResourceMachineValidator};
use super::schema::{ApiFunction, ParamKind, ResourceKind, Role, SurfaceError, SurfaceSpec};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;
use tracing::{debug, warn};

/// Read-only view of one library's API surface.
///
/// Built once per run and shared across workers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SurfaceModel {
    spec: SurfaceSpec,
    index: HashMap<String, usize>,
    banned: BTreeSet<String>,
}

impl SurfaceModel {
    /// Parse and validate a surface from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, SurfaceError> {
        Self::from_spec(SurfaceSpec::from_yaml(yaml)?)
    }

    /// Load a surface file.
    pub fn from_path(path: &Path) -> Result<Self, SurfaceError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| SurfaceError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&yaml)
    }

    /// Build the model from an already-parsed spec, running the state
    /// machine analysis on every resource kind.
    pub fn from_spec(spec: SurfaceSpec) -> Result<Self, SurfaceError> {
        for kind in spec.resources.values() {
            let report = ResourceMachineValidator::new(kind).validate();
            for issue in report.issues_with(IssueSeverity::Warning) {
                warn!(library = %spec.library, kind = %kind.id, "{issue}");
            }
            if !report.is_valid {
                let issues = report
                    .issues_with(IssueSeverity::Error)
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(SurfaceError::InvalidStateMachine {
                    kind: kind.id.clone(),
                    issues,
                });
            }
        }

        let index = spec
            .functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect::<HashMap<_, _>>();
        let banned: BTreeSet<String> = spec.ban.iter().cloned().collect();
        for name in &banned {
            if !index.contains_key(name) {
                warn!(library = %spec.library, function = %name, "banned function is not declared");
            }
        }

        debug!(
            library = %spec.library,
            functions = spec.functions.len(),
            kinds = spec.resources.len(),
            "surface loaded"
        );
        Ok(Self {
            spec,
            index,
            banned,
        })
    }

    /// Library name.
    pub fn library(&self) -> &str {
        &self.spec.library
    }

    /// Headers included by emitted seeds.
    pub fn headers(&self) -> &[String] {
        &self.spec.headers
    }

    /// Underlying parsed spec.
    pub fn spec(&self) -> &SurfaceSpec {
        &self.spec
    }

    /// Whether the function is on the ban list.
    pub fn is_banned(&self, name: &str) -> bool {
        self.banned.contains(name)
    }

    /// Whether the function is declared, banned or not.
    pub fn is_declared(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Look up a non-banned function.
    pub fn function(&self, name: &str) -> Option<&ApiFunction> {
        if self.is_banned(name) {
            return None;
        }
        self.index.get(name).map(|&i| &self.spec.functions[i])
    }

    /// All non-banned functions in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = &ApiFunction> {
        self.spec
            .functions
            .iter()
            .filter(|f| !self.banned.contains(&f.name))
    }

    /// Look up a resource kind.
    pub fn kind(&self, id: &str) -> Result<&ResourceKind, SurfaceError> {
        self.spec
            .resources
            .get(id)
            .ok_or_else(|| SurfaceError::UnregisteredKind(id.to_string()))
    }

    /// All resource kinds.
    pub fn kinds(&self) -> impl Iterator<Item = &ResourceKind> {
        self.spec.resources.values()
    }

    /// Whether a handle of kind `have` may be bound where `want` is expected.
    pub fn compatible(&self, have: &str, want: &str) -> bool {
        have == want
            || self
                .spec
                .resources
                .get(have)
                .is_some_and(|k| k.converts_to.iter().any(|c| c == want))
    }

    /// Target state of the `role` edge out of `state`.
    pub fn next_state(&self, kind: &str, state: &str, role: Role) -> Option<&str> {
        self.spec.resources.get(kind)?.next_state(state, role)
    }

    /// State a freshly produced handle of `kind` starts in.
    pub fn constructed_state(&self, kind: &str) -> Option<&str> {
        let k = self.spec.resources.get(kind)?;
        k.next_state(&k.initial, Role::Constructor)
    }

    /// Whether the state is neither initial nor finalized.
    pub fn is_live(&self, kind: &str, state: &str) -> bool {
        self.spec
            .resources
            .get(kind)
            .is_some_and(|k| k.is_live(state))
    }

    /// State reached when `function` is invoked on a subject of `kind` in
    /// `state`, or `None` when the call is not allowed there.
    pub fn accepts(&self, function: &ApiFunction, kind: &str, state: &str) -> Option<&str> {
        if !function.allows(state) {
            return None;
        }
        self.next_state(kind, state, function.role)
    }

    /// Constructors producing `kind`.
    pub fn functions_producing(&self, kind: &str) -> Result<Vec<&ApiFunction>, SurfaceError> {
        self.kind(kind)?;
        Ok(self
            .functions()
            .filter(|f| f.role == Role::Constructor && f.produced_kind() == Some(kind))
            .collect())
    }

    /// Functions whose subject is of `kind` (or convertible to it) and whose
    /// role has an edge out of `state`.
    pub fn functions_consuming(
        &self,
        kind: &str,
        state: &str,
    ) -> Result<Vec<&ApiFunction>, SurfaceError> {
        self.kind(kind)?;
        Ok(self
            .functions()
            .filter(|f| {
                f.subject_kind()
                    .is_some_and(|subject| self.compatible(kind, subject))
                    && self.accepts(f, kind, state).is_some()
            })
            .collect())
    }

    /// Functions that move `kind` into its finalized state from some state.
    pub fn finalizers_for(&self, kind: &str) -> Result<Vec<&ApiFunction>, SurfaceError> {
        let k = self.kind(kind)?;
        Ok(self
            .functions()
            .filter(|f| {
                f.role == Role::Destructor
                    && f.subject_kind()
                        .is_some_and(|subject| self.compatible(kind, subject))
                    && k.transitions.iter().any(|t| {
                        t.role == Role::Destructor && t.to == k.finalized && f.allows(&t.from)
                    })
            })
            .collect())
    }

    /// Shortest chain of state-advancing calls taking a `kind` subject from
    /// `from` to a state satisfying `target`.
    ///
    /// Only configurators, mutators and accessors are used, and only those
    /// whose handles other than the subject are of different kinds, so the
    /// chain never needs a second instance of the same kind. Returns an
    /// empty chain when `from` already satisfies `target`.
    pub fn path_to_state(
        &self,
        kind: &str,
        from: &str,
        target: impl Fn(&str) -> bool,
        max_depth: usize,
    ) -> Option<Vec<&ApiFunction>> {
        if target(from) {
            return Some(Vec::new());
        }
        let steppers: Vec<&ApiFunction> = self
            .functions()
            .filter(|f| {
                matches!(f.role, Role::Configurator | Role::Mutator | Role::Accessor)
                    && f.subject_kind()
                        .is_some_and(|subject| self.compatible(kind, subject))
                    && self.operands_avoid(f, kind)
            })
            .collect();

        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, Vec<&ApiFunction>)> = VecDeque::new();
        seen.insert(from.to_string());
        queue.push_back((from.to_string(), Vec::new()));

        while let Some((state, path)) = queue.pop_front() {
            if path.len() >= max_depth {
                continue;
            }
            for f in &steppers {
                let Some(next) = self.accepts(f, kind, &state) else {
                    continue;
                };
                if !self.is_live(kind, next) || seen.contains(next) {
                    continue;
                }
                let mut extended = path.clone();
                extended.push(*f);
                if target(next) {
                    return Some(extended);
                }
                seen.insert(next.to_string());
                queue.push_back((next.to_string(), extended));
            }
        }
        None
    }

    fn operands_avoid(&self, function: &ApiFunction, kind: &str) -> bool {
        let subject = function.subject_index();
        function.params.iter().enumerate().all(|(i, p)| {
            Some(i) == subject
                || !matches!(&p.kind, ParamKind::HandleIn { resource, .. } if self.compatible(kind, resource))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM_SURFACE: &str = r#"
version: "1.0"
library: streamlib
headers: ["stream.h"]
ban: [stream_debug_dump]
resources:
  stream:
    c_type: stream_t
    storage: value
    states: [unallocated, allocated, configured, active, finalized]
    transitions:
      - { from: unallocated, to: allocated, role: constructor }
      - { from: allocated, to: configured, role: configurator }
      - { from: configured, to: configured, role: configurator }
      - { from: configured, to: active, role: mutator }
      - { from: active, to: active, role: mutator }
      - { from: active, to: active, role: accessor }
      - { from: allocated, to: finalized, role: destructor }
      - { from: configured, to: finalized, role: destructor }
      - { from: active, to: finalized, role: destructor }
  sub-stream:
    c_type: stream_t
    storage: value
    converts_to: [stream]
    states: [unallocated, allocated, finalized]
    transitions:
      - { from: unallocated, to: allocated, role: constructor }
      - { from: allocated, to: finalized, role: destructor }
functions:
  - name: stream_init
    role: constructor
    params:
      - { name: s, kind: handle_out, resource: stream }
    returns: { kind: status, c_type: int }
  - name: stream_set_level
    role: configurator
    params:
      - { name: s, kind: handle_in, resource: stream, by_ref: true }
      - { name: level, kind: primitive, c_type: int, values: ["1", "9"] }
  - name: stream_pump
    role: mutator
    params:
      - { name: s, kind: handle_in, resource: stream, by_ref: true }
  - name: stream_bound
    role: accessor
    requires: [active]
    params:
      - { name: s, kind: handle_in, resource: stream, by_ref: true }
    returns: { kind: value, c_type: long }
  - name: stream_end
    role: destructor
    params:
      - { name: s, kind: handle_in, resource: stream, by_ref: true }
  - name: stream_debug_dump
    role: accessor
    params:
      - { name: s, kind: handle_in, resource: stream, by_ref: true }
"#;

    fn model() -> SurfaceModel {
        SurfaceModel::from_yaml(STREAM_SURFACE).expect("surface loads")
    }

    #[test]
    fn test_banned_function_hidden() {
        let m = model();
        assert!(m.is_banned("stream_debug_dump"));
        assert!(m.is_declared("stream_debug_dump"));
        assert!(m.function("stream_debug_dump").is_none());
        assert!(m.functions().all(|f| f.name != "stream_debug_dump"));
    }

    #[test]
    fn test_functions_producing() {
        let m = model();
        let names: Vec<_> = m
            .functions_producing("stream")
            .expect("known kind")
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["stream_init"]);
        assert!(m.functions_producing("sub-stream").expect("known").is_empty());
        assert!(matches!(
            m.functions_producing("ghost"),
            Err(SurfaceError::UnregisteredKind(_))
        ));
    }

    #[test]
    fn test_functions_consuming_respects_requires() {
        let m = model();
        let names = |state: &str| -> Vec<String> {
            m.functions_consuming("stream", state)
                .expect("known")
                .iter()
                .map(|f| f.name.clone())
                .collect()
        };
        assert_eq!(names("allocated"), vec!["stream_set_level", "stream_end"]);
        assert_eq!(
            names("active"),
            vec!["stream_pump", "stream_bound", "stream_end"]
        );
        assert!(names("finalized").is_empty());
    }

    #[test]
    fn test_conversion_compatibility() {
        let m = model();
        assert!(m.compatible("sub-stream", "stream"));
        assert!(!m.compatible("stream", "sub-stream"));
        let consumers = m.functions_consuming("sub-stream", "allocated").expect("known");
        assert!(consumers.iter().any(|f| f.name == "stream_end"));
    }

    #[test]
    fn test_finalizers_for() {
        let m = model();
        let finalizers = m.finalizers_for("stream").expect("known");
        assert_eq!(finalizers.len(), 1);
        assert_eq!(finalizers[0].name, "stream_end");
    }

    #[test]
    fn test_path_to_state() {
        let m = model();
        let bound = m.function("stream_bound").expect("declared");
        let path = m
            .path_to_state("stream", "allocated", |s| bound.allows(s), 4)
            .expect("reachable");
        let names: Vec<_> = path.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["stream_set_level", "stream_pump"]);

        let direct = m
            .path_to_state("stream", "active", |s| bound.allows(s), 4)
            .expect("already there");
        assert!(direct.is_empty());
        assert!(m
            .path_to_state("stream", "allocated", |s| bound.allows(s), 1)
            .is_none());
    }

    #[test]
    fn test_constructed_state_and_accepts() {
        let m = model();
        assert_eq!(m.constructed_state("stream"), Some("allocated"));
        let pump = m.function("stream_pump").expect("declared");
        assert_eq!(m.accepts(pump, "stream", "allocated"), None);
        assert_eq!(m.accepts(pump, "stream", "configured"), Some("active"));
    }

    #[test]
    fn test_reject_broken_machine() {
        let yaml = STREAM_SURFACE.replace(
            "      - { from: unallocated, to: allocated, role: constructor }\n      - { from: allocated, to: configured, role: configurator }",
            "      - { from: allocated, to: configured, role: configurator }",
        );
        let result = SurfaceModel::from_yaml(&yaml);
        assert!(matches!(
            result,
            Err(SurfaceError::InvalidStateMachine { ref kind, .. }) if kind == "stream"
        ));
    }

    #[test]
    fn test_from_path_missing_file() {
        let result = SurfaceModel::from_path(Path::new("/nonexistent/surface.yaml"));
        assert!(matches!(result, Err(SurfaceError::Io { .. })));
    }
}
