//! Surface YAML schema types.
//!
//! A surface describes one target library: its functions, the resource
//! kinds those functions pass around, and one state machine per kind whose
//! transitions are labeled by the role of the function that fires them.

use crate::sequence::Phase;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Root surface description for one target library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceSpec {
    /// Schema version (must be "1.0")
    pub version: String,
    /// Library name, used in seed paths and the test function name
    pub library: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Headers included by emitted seeds
    #[serde(default)]
    pub headers: Vec<String>,
    /// Functions never to be synthesized
    #[serde(default)]
    pub ban: Vec<String>,
    /// Resource kinds keyed by ID
    pub resources: BTreeMap<String, ResourceKind>,
    /// API functions
    pub functions: Vec<ApiFunction>,
}

/// Storage class of a resource variable in emitted code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    /// `T *var = NULL;`, passed as `var`
    #[default]
    Pointer,
    /// `T var;` zero-initialized, passed as `&var`
    Value,
}

/// A resource kind and its lifecycle state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceKind {
    /// Kind identifier (filled from the map key when omitted)
    #[serde(default)]
    pub id: String,
    /// C type of the handle
    pub c_type: String,
    /// How the handle variable is declared
    #[serde(default)]
    pub storage: Storage,
    /// Declared states
    pub states: Vec<String>,
    /// State before any constructor ran
    #[serde(default = "default_initial")]
    pub initial: String,
    /// State after a destructor ran
    #[serde(default = "default_finalized")]
    pub finalized: String,
    /// Role-labeled transitions
    #[serde(default)]
    pub transitions: Vec<StateTransition>,
    /// Kinds a handle of this kind may be bound as
    #[serde(default)]
    pub converts_to: Vec<String>,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
}

fn default_initial() -> String {
    "unallocated".to_string()
}

fn default_finalized() -> String {
    "finalized".to_string()
}

impl ResourceKind {
    /// Whether any destructor transition exists, i.e. the kind must be cleaned up.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.transitions.iter().any(|t| t.role == Role::Destructor)
    }

    /// Whether the state is neither initial nor finalized.
    #[must_use]
    pub fn is_live(&self, state: &str) -> bool {
        state != self.initial && state != self.finalized
    }

    /// Target state of the transition labeled `role` out of `state`.
    #[must_use]
    pub fn next_state(&self, state: &str, role: Role) -> Option<&str> {
        self.transitions
            .iter()
            .find(|t| t.from == state && t.role == role)
            .map(|t| t.to.as_str())
    }
}

/// State transition labeled by the role of the firing function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    /// Source state
    pub from: String,
    /// Target state
    pub to: String,
    /// Role that fires the transition
    pub role: Role,
}

/// Lifecycle role of an API function with respect to its subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Allocates a new handle
    Constructor,
    /// Sets options on a live handle
    Configurator,
    /// Reads from a live handle
    Accessor,
    /// Drives the handle's main operation
    Mutator,
    /// Releases the handle
    Destructor,
}

impl Role {
    /// Phase a function with this role is placed in.
    #[must_use]
    pub const fn phase(self) -> Phase {
        match self {
            Self::Constructor => Phase::Init,
            Self::Configurator => Phase::Configure,
            Self::Mutator => Phase::Operate,
            Self::Accessor => Phase::Validate,
            Self::Destructor => Phase::Cleanup,
        }
    }

    /// Lowercase name as written in surface files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Constructor => "constructor",
            Self::Configurator => "configurator",
            Self::Accessor => "accessor",
            Self::Mutator => "mutator",
            Self::Destructor => "destructor",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One API function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiFunction {
    /// C symbol name
    pub name: String,
    /// Lifecycle role
    pub role: Role,
    /// Ordered parameters
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// Return value
    #[serde(default)]
    pub returns: ReturnSpec,
    /// Subject states this function accepts (empty = any with a role transition)
    #[serde(default)]
    pub requires: Vec<String>,
    /// Counted among critical calls when invoked
    #[serde(default)]
    pub memory_sensitive: bool,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
}

impl ApiFunction {
    /// Index of the subject parameter.
    ///
    /// The subject is the `handle_in` marked `subject: true`, else the first
    /// `handle_in`. Constructors have no subject.
    #[must_use]
    pub fn subject_index(&self) -> Option<usize> {
        if self.role == Role::Constructor {
            return None;
        }
        let handles = || {
            self.params
                .iter()
                .enumerate()
                .filter(|(_, p)| matches!(p.kind, ParamKind::HandleIn { .. }))
        };
        handles()
            .find(|(_, p)| matches!(p.kind, ParamKind::HandleIn { subject: true, .. }))
            .or_else(|| handles().next())
            .map(|(i, _)| i)
    }

    /// Resource kind of the subject.
    #[must_use]
    pub fn subject_kind(&self) -> Option<&str> {
        self.subject_index()
            .and_then(|i| self.params[i].kind.resource())
    }

    /// Resource kind produced through a `handle_out` param or a `handle` return.
    #[must_use]
    pub fn produced_kind(&self) -> Option<&str> {
        self.params
            .iter()
            .find_map(|p| match &p.kind {
                ParamKind::HandleOut { resource } => Some(resource.as_str()),
                _ => None,
            })
            .or(match &self.returns {
                ReturnSpec::Handle { resource } => Some(resource.as_str()),
                _ => None,
            })
    }

    /// Whether the subject state is accepted by the `requires` list.
    #[must_use]
    pub fn allows(&self, state: &str) -> bool {
        self.requires.is_empty() || self.requires.iter().any(|s| s == state)
    }

    /// Position of the parameter with the given name.
    #[must_use]
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Number of resource-bearing params (handles and resource buffers).
    #[must_use]
    pub fn handle_arity(&self) -> usize {
        self.params.iter().filter(|p| p.kind.resource().is_some()).count()
    }
}

/// One named parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name
    pub name: String,
    /// Parameter kind
    #[serde(flatten)]
    pub kind: ParamKind,
}

/// Parameter kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamKind {
    /// Scalar or string literal
    Primitive {
        /// C type
        c_type: String,
        /// Candidate literals, written as C expressions
        #[serde(default)]
        values: Vec<String>,
    },
    /// Existing handle consumed by the call
    HandleIn {
        /// Resource kind
        resource: String,
        /// Ownership passes to the callee or another handle
        #[serde(default)]
        transfer: bool,
        /// Marks the subject when it is not the first handle
        #[serde(default)]
        subject: bool,
        /// Pass the handle variable's address
        #[serde(default)]
        by_ref: bool,
    },
    /// Handle written by the call
    HandleOut {
        /// Resource kind
        resource: String,
    },
    /// Byte or element buffer
    Buffer {
        /// Element C type
        c_type: String,
        /// Stack buffer length
        #[serde(default = "default_buffer_size")]
        size: usize,
        /// `NULL` is an accepted value
        #[serde(default)]
        nullable: bool,
        /// Buffer is a tracked resource of this kind instead of a stack array
        #[serde(default)]
        resource: Option<String>,
    },
    /// Length of another buffer param
    Length {
        /// Name of the buffer param
        of: String,
    },
    /// Function pointer
    Callback {
        /// C signature, informational
        #[serde(default)]
        signature: String,
        /// `NULL` is an accepted value
        #[serde(default)]
        nullable: bool,
        /// Expression passed when not null
        #[serde(default)]
        stub: Option<String>,
    },
}

fn default_buffer_size() -> usize {
    256
}

impl ParamKind {
    /// Resource kind carried by this param, if any.
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::HandleIn { resource, .. } | Self::HandleOut { resource } => Some(resource),
            Self::Buffer { resource, .. } => resource.as_deref(),
            _ => None,
        }
    }
}

/// Return value description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReturnSpec {
    /// No return value
    #[default]
    Void,
    /// Status code
    Status {
        /// C type
        c_type: String,
    },
    /// Plain value
    Value {
        /// C type
        c_type: String,
    },
    /// Newly produced handle
    Handle {
        /// Resource kind
        resource: String,
    },
}

impl SurfaceSpec {
    /// Parse a surface from a YAML string.
    ///
    /// # Errors
    /// Returns error if YAML is invalid or schema validation fails.
    pub fn from_yaml(yaml: &str) -> Result<Self, SurfaceError> {
        let mut spec: SurfaceSpec =
            serde_yaml_ng::from_str(yaml).map_err(|e| SurfaceError::ParseError(e.to_string()))?;
        for (id, kind) in &mut spec.resources {
            if kind.id.is_empty() {
                kind.id.clone_from(id);
            }
        }
        spec.validate()?;
        Ok(spec)
    }

    /// Validate the surface structure.
    fn validate(&self) -> Result<(), SurfaceError> {
        if self.version != "1.0" {
            return Err(SurfaceError::InvalidVersion(self.version.clone()));
        }
        if self.functions.is_empty() {
            return Err(SurfaceError::EmptyFunctions);
        }

        for (id, kind) in &self.resources {
            if kind.id != *id {
                return Err(SurfaceError::KindIdMismatch {
                    key: id.clone(),
                    id: kind.id.clone(),
                });
            }
            let states: HashSet<&str> = kind.states.iter().map(String::as_str).collect();
            if !states.contains(kind.initial.as_str()) {
                return Err(SurfaceError::UndeclaredState {
                    kind: id.clone(),
                    state: kind.initial.clone(),
                });
            }
            if !states.contains(kind.finalized.as_str()) {
                return Err(SurfaceError::UndeclaredState {
                    kind: id.clone(),
                    state: kind.finalized.clone(),
                });
            }
            for transition in &kind.transitions {
                for state in [&transition.from, &transition.to] {
                    if !states.contains(state.as_str()) {
                        return Err(SurfaceError::UndeclaredState {
                            kind: id.clone(),
                            state: state.clone(),
                        });
                    }
                }
            }
            for target in &kind.converts_to {
                if !self.resources.contains_key(target) {
                    return Err(SurfaceError::UnknownConversion {
                        kind: id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        let mut seen = HashSet::new();
        for function in &self.functions {
            if !seen.insert(function.name.as_str()) {
                return Err(SurfaceError::DuplicateFunction(function.name.clone()));
            }
            self.validate_function(function)?;
        }

        Ok(())
    }

    fn validate_function(&self, function: &ApiFunction) -> Result<(), SurfaceError> {
        let unknown = |kind: &str| SurfaceError::UnknownResourceKind {
            function: function.name.clone(),
            kind: kind.to_string(),
        };

        for param in &function.params {
            if let Some(kind) = param.kind.resource() {
                if !self.resources.contains_key(kind) {
                    return Err(unknown(kind));
                }
            }
            if let ParamKind::Length { of } = &param.kind {
                let target = function.params.iter().find(|p| &p.name == of);
                if !matches!(target.map(|p| &p.kind), Some(ParamKind::Buffer { .. })) {
                    return Err(SurfaceError::InvalidLengthTarget {
                        function: function.name.clone(),
                        param: param.name.clone(),
                        of: of.clone(),
                    });
                }
            }
        }
        if let ReturnSpec::Handle { resource } = &function.returns {
            if !self.resources.contains_key(resource) {
                return Err(unknown(resource));
            }
        }

        match function.role {
            Role::Constructor if function.produced_kind().is_none() => Err(
                SurfaceError::ConstructorWithoutOutput(function.name.clone()),
            ),
            Role::Destructor if function.subject_index().is_none() => Err(
                SurfaceError::DestructorWithoutSubject(function.name.clone()),
            ),
            _ => Ok(()),
        }
    }
}

/// Errors that can occur during surface parsing and validation.
///
/// All of them are fatal to loading the surface.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SurfaceError {
    #[error("Failed to parse YAML: {0}")]
    ParseError(String),

    #[error("Failed to read surface '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Invalid version '{0}', expected '1.0'")]
    InvalidVersion(String),

    #[error("Functions cannot be empty")]
    EmptyFunctions,

    #[error("Duplicate function '{0}'")]
    DuplicateFunction(String),

    #[error("Resource key '{key}' does not match its id '{id}'")]
    KindIdMismatch { key: String, id: String },

    #[error("Resource kind '{kind}' references undeclared state '{state}'")]
    UndeclaredState { kind: String, state: String },

    #[error("Resource kind '{kind}' converts to unknown kind '{target}'")]
    UnknownConversion { kind: String, target: String },

    #[error("Function '{function}' references unknown resource kind '{kind}'")]
    UnknownResourceKind { function: String, kind: String },

    #[error("Unknown resource kind '{0}'")]
    UnregisteredKind(String),

    #[error("Param '{param}' of '{function}' is the length of '{of}', which is not a buffer param")]
    InvalidLengthTarget {
        function: String,
        param: String,
        of: String,
    },

    #[error("Constructor '{0}' produces no handle")]
    ConstructorWithoutOutput(String),

    #[error("Destructor '{0}' has no subject handle")]
    DestructorWithoutSubject(String),

    #[error("State machine of '{kind}' is invalid: {issues}")]
    InvalidStateMachine { kind: String, issues: String },

    #[error("Library '{0}' is loaded twice")]
    DuplicateLibrary(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_SURFACE: &str = r#"
version: "1.0"
library: toy
headers: ["toy.h"]
resources:
  toy-handle:
    c_type: toy_t
    states: [unallocated, ready, busy, finalized]
    transitions:
      - { from: unallocated, to: ready, role: constructor }
      - { from: ready, to: busy, role: mutator }
      - { from: busy, to: busy, role: mutator }
      - { from: busy, to: busy, role: accessor }
      - { from: ready, to: finalized, role: destructor }
      - { from: busy, to: finalized, role: destructor }
functions:
  - name: toy_open
    role: constructor
    params:
      - { name: flags, kind: primitive, c_type: int, values: ["0", "1"] }
    returns: { kind: handle, resource: toy-handle }
  - name: toy_write
    role: mutator
    params:
      - { name: h, kind: handle_in, resource: toy-handle }
      - { name: data, kind: buffer, c_type: "unsigned char", size: 64 }
      - { name: len, kind: length, of: data }
    returns: { kind: status, c_type: int }
  - name: toy_close
    role: destructor
    params:
      - { name: h, kind: handle_in, resource: toy-handle }
"#;

    #[test]
    fn test_parse_valid_surface() {
        let spec = SurfaceSpec::from_yaml(VALID_SURFACE).expect("Should parse valid surface");
        assert_eq!(spec.library, "toy");
        assert_eq!(spec.functions.len(), 3);
        let kind = &spec.resources["toy-handle"];
        assert_eq!(kind.id, "toy-handle");
        assert_eq!(kind.initial, "unallocated");
        assert_eq!(kind.finalized, "finalized");
        assert_eq!(kind.storage, Storage::Pointer);
        assert!(kind.is_managed());
    }

    #[test]
    fn test_param_kinds_parse() {
        let spec = SurfaceSpec::from_yaml(VALID_SURFACE).expect("parse");
        let write = &spec.functions[1];
        assert!(matches!(write.params[0].kind, ParamKind::HandleIn { transfer: false, .. }));
        assert!(matches!(
            write.params[1].kind,
            ParamKind::Buffer { size: 64, nullable: false, .. }
        ));
        assert_eq!(
            write.params[2].kind,
            ParamKind::Length { of: "data".to_string() }
        );
        assert_eq!(
            write.returns,
            ReturnSpec::Status { c_type: "int".to_string() }
        );
    }

    #[test]
    fn test_subject_and_produced_kind() {
        let spec = SurfaceSpec::from_yaml(VALID_SURFACE).expect("parse");
        assert_eq!(spec.functions[0].produced_kind(), Some("toy-handle"));
        assert_eq!(spec.functions[0].subject_index(), None);
        assert_eq!(spec.functions[1].subject_index(), Some(0));
        assert_eq!(spec.functions[2].subject_kind(), Some("toy-handle"));
    }

    #[test]
    fn test_explicit_subject_marker() {
        let mut spec = SurfaceSpec::from_yaml(VALID_SURFACE).expect("parse");
        let close = &mut spec.functions[2];
        close.params.insert(
            0,
            ParamSpec {
                name: "other".to_string(),
                kind: ParamKind::HandleIn {
                    resource: "toy-handle".to_string(),
                    transfer: false,
                    subject: false,
                    by_ref: false,
                },
            },
        );
        close.params[1].kind = ParamKind::HandleIn {
            resource: "toy-handle".to_string(),
            transfer: false,
            subject: true,
            by_ref: true,
        };
        assert_eq!(close.subject_index(), Some(1));
    }

    #[test]
    fn test_role_phase_mapping() {
        assert_eq!(Role::Constructor.phase(), Phase::Init);
        assert_eq!(Role::Configurator.phase(), Phase::Configure);
        assert_eq!(Role::Mutator.phase(), Phase::Operate);
        assert_eq!(Role::Accessor.phase(), Phase::Validate);
        assert_eq!(Role::Destructor.phase(), Phase::Cleanup);
        assert_eq!(Role::Mutator.to_string(), "mutator");
    }

    #[test]
    fn test_next_state_and_liveness() {
        let spec = SurfaceSpec::from_yaml(VALID_SURFACE).expect("parse");
        let kind = &spec.resources["toy-handle"];
        assert_eq!(kind.next_state("ready", Role::Mutator), Some("busy"));
        assert_eq!(kind.next_state("ready", Role::Accessor), None);
        assert!(kind.is_live("busy"));
        assert!(!kind.is_live("unallocated"));
        assert!(!kind.is_live("finalized"));
    }

    #[test]
    fn test_reject_invalid_version() {
        let yaml = VALID_SURFACE.replace("version: \"1.0\"", "version: \"2.0\"");
        let result = SurfaceSpec::from_yaml(&yaml);
        assert!(matches!(result, Err(SurfaceError::InvalidVersion(_))));
    }

    #[test]
    fn test_reject_unknown_resource_kind() {
        let yaml = VALID_SURFACE.replace(
            "returns: { kind: handle, resource: toy-handle }",
            "returns: { kind: handle, resource: ghost }",
        );
        let result = SurfaceSpec::from_yaml(&yaml);
        assert!(matches!(
            result,
            Err(SurfaceError::UnknownResourceKind { ref kind, .. }) if kind == "ghost"
        ));
    }

    #[test]
    fn test_reject_undeclared_transition_state() {
        let yaml = VALID_SURFACE.replace(
            "{ from: ready, to: busy, role: mutator }",
            "{ from: ready, to: spinning, role: mutator }",
        );
        let result = SurfaceSpec::from_yaml(&yaml);
        assert!(matches!(
            result,
            Err(SurfaceError::UndeclaredState { ref state, .. }) if state == "spinning"
        ));
    }

    #[test]
    fn test_reject_missing_initial_state() {
        let yaml = VALID_SURFACE.replace(
            "states: [unallocated, ready, busy, finalized]",
            "states: [ready, busy, finalized]",
        );
        let result = SurfaceSpec::from_yaml(&yaml);
        assert!(matches!(result, Err(SurfaceError::UndeclaredState { .. })));
    }

    #[test]
    fn test_reject_duplicate_function() {
        let yaml = VALID_SURFACE.replace("name: toy_close", "name: toy_write");
        let result = SurfaceSpec::from_yaml(&yaml);
        assert!(matches!(result, Err(SurfaceError::DuplicateFunction(_))));
    }

    #[test]
    fn test_reject_bad_length_target() {
        let yaml = VALID_SURFACE.replace("of: data", "of: h");
        let result = SurfaceSpec::from_yaml(&yaml);
        assert!(matches!(result, Err(SurfaceError::InvalidLengthTarget { .. })));
    }

    #[test]
    fn test_reject_constructor_without_output() {
        let yaml = VALID_SURFACE.replace(
            "returns: { kind: handle, resource: toy-handle }",
            "returns: { kind: status, c_type: int }",
        );
        let result = SurfaceSpec::from_yaml(&yaml);
        assert!(matches!(result, Err(SurfaceError::ConstructorWithoutOutput(_))));
    }

    #[test]
    fn test_reject_empty_functions() {
        let yaml = r#"
version: "1.0"
library: empty
resources: {}
functions: []
"#;
        let result = SurfaceSpec::from_yaml(yaml);
        assert!(matches!(result, Err(SurfaceError::EmptyFunctions)));
    }

    #[test]
    fn test_parse_error_invalid_yaml() {
        let result = SurfaceSpec::from_yaml("version: [unterminated");
        assert!(matches!(result, Err(SurfaceError::ParseError(_))));
    }

    #[test]
    fn test_reject_unknown_param_kind() {
        let yaml = VALID_SURFACE.replace("kind: length, of: data", "kind: bitfield, of: data");
        let result = SurfaceSpec::from_yaml(&yaml);
        assert!(matches!(result, Err(SurfaceError::ParseError(_))));
    }

    #[test]
    fn test_surface_error_display() {
        let err = SurfaceError::InvalidVersion("2.0".to_string());
        assert_eq!(err.to_string(), "Invalid version '2.0', expected '1.0'");
        let err = SurfaceError::UnknownResourceKind {
            function: "f".to_string(),
            kind: "k".to_string(),
        };
        assert!(err.to_string().contains("unknown resource kind 'k'"));
    }
}
