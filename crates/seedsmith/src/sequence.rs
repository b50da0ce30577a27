//! Call sequences: call sites, resource instances and their bindings.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Stable identifier of a call site within one sequence.
pub type CallSiteId = u32;

/// Identifier of a resource instance within one sequence.
pub type ResourceId = u32;

/// Fixed five-phase seed template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Init,
    Configure,
    Operate,
    Validate,
    Cleanup,
}

impl Phase {
    /// All phases in template order.
    pub const ALL: [Self; 5] = [
        Self::Init,
        Self::Configure,
        Self::Operate,
        Self::Validate,
        Self::Cleanup,
    ];

    /// Comment label used in emitted seeds.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Init => "Initialize/Setup",
            Self::Configure => "Configure",
            Self::Operate => "Operate",
            Self::Validate => "Validate",
            Self::Cleanup => "Cleanup",
        }
    }

    /// 1-based step number in the template.
    #[must_use]
    pub const fn step(self) -> usize {
        self as usize + 1
    }
}

/// Why a call site is in the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Named by the combination; the only origin earning coverage credit
    Requested,
    /// Inserted to satisfy a dependency
    Bridging,
    /// Automatic finalizer
    Cleanup,
    /// Inserted while repairing a lifecycle violation
    Repair,
}

impl Origin {
    /// Whether the call site counts as an insertion against density.
    #[must_use]
    pub const fn is_insertion(self) -> bool {
        matches!(self, Self::Bridging | Self::Repair)
    }
}

/// One bound argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArgValue {
    /// Reference to a live resource
    Resource { id: ResourceId, by_ref: bool },
    /// Handle written by the call
    Output { id: ResourceId },
    /// C expression literal
    Literal { text: String },
    /// Stack array declared at the top of the seed
    StackBuffer { var: String },
    /// `NULL`
    Null,
    /// Length of a buffer argument
    Length { expr: String, zero: bool },
    /// Function pointer expression
    Callback { expr: String },
}

impl ArgValue {
    /// Resource referenced by this argument, if any.
    #[must_use]
    pub const fn resource(&self) -> Option<ResourceId> {
        match self {
            Self::Resource { id, .. } | Self::Output { id } => Some(*id),
            _ => None,
        }
    }
}

/// One invocation of an API function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Stable id, survives reordering
    pub id: CallSiteId,
    /// Function name
    pub function: String,
    /// Bound arguments, one per param
    pub args: Vec<ArgValue>,
    /// Phase tag
    pub phase: Phase,
    /// Why the call exists
    pub origin: Origin,
    /// Handle produced by the call
    pub produces: Option<ResourceId>,
}

impl CallSite {
    /// Resources read by the call (not the one it produces).
    pub fn inputs(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.args.iter().filter_map(|a| match a {
            ArgValue::Resource { id, .. } => Some(*id),
            _ => None,
        })
    }

    /// Whether the call reads the resource.
    #[must_use]
    pub fn reads(&self, resource: ResourceId) -> bool {
        self.inputs().any(|r| r == resource)
    }
}

/// One handle variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInstance {
    /// Instance id
    pub id: ResourceId,
    /// Resource kind
    pub kind: String,
    /// Call site that produces it
    pub producer: CallSiteId,
    /// C variable name
    pub var: String,
}

/// Directed producer → consumer edge for one resource instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBinding {
    pub resource: ResourceId,
    pub producer: CallSiteId,
    pub consumer: CallSiteId,
}

/// Stack array shared by every call passing the same element type and size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackBuffer {
    pub var: String,
    pub c_type: String,
    pub size: usize,
}

/// Ordered call sites of one candidate seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    library: String,
    combination: Vec<String>,
    prompt: String,
    intentional_leak: bool,
    call_sites: Vec<CallSite>,
    resources: Vec<ResourceInstance>,
    buffers: Vec<StackBuffer>,
    next_call: CallSiteId,
    var_counters: BTreeMap<String, u32>,
}

impl Sequence {
    /// Create an empty sequence.
    pub fn new(library: impl Into<String>, combination: Vec<String>) -> Self {
        Self {
            library: library.into(),
            combination,
            prompt: String::new(),
            intentional_leak: false,
            call_sites: Vec::new(),
            resources: Vec::new(),
            buffers: Vec::new(),
            next_call: 0,
            var_counters: BTreeMap::new(),
        }
    }

    /// Set the free-text prompt recorded in the seed header.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Mark the sequence as leaking on purpose.
    pub const fn with_intentional_leak(mut self, leak: bool) -> Self {
        self.intentional_leak = leak;
        self
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    pub fn combination(&self) -> &[String] {
        &self.combination
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub const fn intentional_leak(&self) -> bool {
        self.intentional_leak
    }

    /// Call sites in position order.
    pub fn call_sites(&self) -> &[CallSite] {
        &self.call_sites
    }

    pub fn resources(&self) -> &[ResourceInstance] {
        &self.resources
    }

    pub fn buffers(&self) -> &[StackBuffer] {
        &self.buffers
    }

    pub fn len(&self) -> usize {
        self.call_sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.call_sites.is_empty()
    }

    /// Allocate the id the next call site will get.
    pub fn reserve_call_id(&mut self) -> CallSiteId {
        let id = self.next_call;
        self.next_call += 1;
        id
    }

    /// Append a call site.
    pub fn push(&mut self, call: CallSite) {
        self.call_sites.push(call);
    }

    /// Insert a call site at a position, clamped to the end.
    pub fn insert(&mut self, position: usize, call: CallSite) {
        let position = position.min(self.call_sites.len());
        self.call_sites.insert(position, call);
    }

    /// Remove a call site, returning it.
    pub fn remove(&mut self, id: CallSiteId) -> Option<CallSite> {
        let position = self.position(id)?;
        Some(self.call_sites.remove(position))
    }

    pub fn position(&self, id: CallSiteId) -> Option<usize> {
        self.call_sites.iter().position(|c| c.id == id)
    }

    pub fn call(&self, id: CallSiteId) -> Option<&CallSite> {
        self.call_sites.iter().find(|c| c.id == id)
    }

    pub fn call_mut(&mut self, id: CallSiteId) -> Option<&mut CallSite> {
        self.call_sites.iter_mut().find(|c| c.id == id)
    }

    pub fn resource(&self, id: ResourceId) -> Option<&ResourceInstance> {
        self.resources.get(id as usize)
    }

    /// Register a new resource instance produced by `producer`.
    ///
    /// Variable names are `<kind>_<n>` with `n` counted per kind.
    pub fn new_resource(&mut self, kind: &str, producer: CallSiteId) -> ResourceId {
        let id = self.resources.len() as ResourceId;
        let counter = self.var_counters.entry(kind.to_string()).or_default();
        *counter += 1;
        let var = format!("{}_{}", c_identifier(kind), counter);
        self.resources.push(ResourceInstance {
            id,
            kind: kind.to_string(),
            producer,
            var,
        });
        id
    }

    /// Stack buffer for the element type and size, declared on first use.
    pub fn stack_buffer(&mut self, c_type: &str, size: usize) -> String {
        if let Some(existing) = self
            .buffers
            .iter()
            .find(|b| b.c_type == c_type && b.size == size)
        {
            return existing.var.clone();
        }
        let var = format!("buf_{}", self.buffers.len() + 1);
        self.buffers.push(StackBuffer {
            var: var.clone(),
            c_type: c_type.to_string(),
            size,
        });
        var
    }

    /// Replace every read of `old` by `new` in one call site.
    pub fn rebind(&mut self, call: CallSiteId, old: ResourceId, new: ResourceId) -> bool {
        let Some(site) = self.call_mut(call) else {
            return false;
        };
        let mut changed = false;
        for arg in &mut site.args {
            if let ArgValue::Resource { id, .. } = arg {
                if *id == old {
                    *id = new;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Position of the call producing the resource.
    pub fn producer_position(&self, resource: ResourceId) -> Option<usize> {
        self.resource(resource)
            .and_then(|r| self.position(r.producer))
    }

    /// Producer → consumer edges, recomputed from the call sites.
    pub fn bindings(&self) -> Vec<ResourceBinding> {
        self.call_sites
            .iter()
            .flat_map(|call| {
                call.inputs().filter_map(move |r| {
                    self.resource(r).map(|res| ResourceBinding {
                        resource: r,
                        producer: res.producer,
                        consumer: call.id,
                    })
                })
            })
            .collect()
    }

    /// Function names in position order.
    pub fn library_calls(&self) -> Vec<String> {
        self.call_sites.iter().map(|c| c.function.clone()).collect()
    }

    /// Number of call sites inserted by bridging or repair.
    pub fn insertions(&self) -> usize {
        self.call_sites
            .iter()
            .filter(|c| c.origin.is_insertion())
            .count()
    }

    /// SHA-256 over the call shape, used to drop duplicate candidates.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for call in &self.call_sites {
            hasher.update(call.function.as_bytes());
            hasher.update([0u8]);
            for arg in &call.args {
                let token = match arg {
                    ArgValue::Resource { id, .. } | ArgValue::Output { id } => format!("r{id}"),
                    ArgValue::Literal { text } => format!("l{text}"),
                    ArgValue::StackBuffer { var } => format!("b{var}"),
                    ArgValue::Null => "n".to_string(),
                    ArgValue::Length { expr, .. } => format!("z{expr}"),
                    ArgValue::Callback { expr } => format!("c{expr}"),
                };
                hasher.update(token.as_bytes());
                hasher.update([1u8]);
            }
            hasher.update([2u8]);
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Frozen sequence that went through lifecycle validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedSequence(Sequence);

impl ValidatedSequence {
    pub(crate) const fn new(sequence: Sequence) -> Self {
        Self(sequence)
    }

    /// Give up the frozen view.
    pub fn into_inner(self) -> Sequence {
        self.0
    }
}

impl std::ops::Deref for ValidatedSequence {
    type Target = Sequence;

    fn deref(&self) -> &Sequence {
        &self.0
    }
}

/// Turn a kind or library name into a C identifier.
pub fn c_identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}
