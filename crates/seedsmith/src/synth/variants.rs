//! Candidate variants of one combination.
//!
//! V1-V4 each tweak a single deterministic choice of the synthesizer so one
//! request yields several distinct seeds.

use super::binder::Strategy;
use super::synthesizer::CombinationRequest;
use crate::surface::{ApiFunction, ParamKind, SurfaceModel};
use std::collections::{BTreeSet, HashSet};

/// Variant classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantClass {
    /// V1: Literal rotation - pick alternate primitive literals
    LiteralRotation,
    /// V2: Duplicate spreading - repeated calls take successive literals
    DuplicateSpread,
    /// V3: Nullable probing - pass NULL for nullable buffers and callbacks
    NullableBuffers,
    /// V4: Alternate constructor - bridge through another constructor
    AlternateConstructor,
}

impl VariantClass {
    /// Get all variant classes.
    pub fn all() -> Vec<VariantClass> {
        vec![
            VariantClass::LiteralRotation,
            VariantClass::DuplicateSpread,
            VariantClass::NullableBuffers,
            VariantClass::AlternateConstructor,
        ]
    }

    /// Get the class identifier (V1-V4).
    pub fn id(&self) -> &'static str {
        match self {
            VariantClass::LiteralRotation => "V1",
            VariantClass::DuplicateSpread => "V2",
            VariantClass::NullableBuffers => "V3",
            VariantClass::AlternateConstructor => "V4",
        }
    }

    /// Get a description of the variant class.
    pub fn description(&self) -> &'static str {
        match self {
            VariantClass::LiteralRotation => "Rotate the literal list of every primitive param",
            VariantClass::DuplicateSpread => "Give repeated calls of a function distinct literals",
            VariantClass::NullableBuffers => "Pass NULL wherever a buffer or callback may be null",
            VariantClass::AlternateConstructor => "Bridge through a different constructor",
        }
    }
}

/// One strategy to synthesize with.
#[derive(Debug, Clone)]
pub struct Variant {
    /// `base` or `<class id>-<n>`
    pub label: String,
    /// `None` for the base variant
    pub class: Option<VariantClass>,
    pub strategy: Strategy,
}

/// Variant generator for one request.
#[derive(Debug)]
pub struct VariantGenerator<'a> {
    surface: &'a SurfaceModel,
    functions: Vec<&'a ApiFunction>,
    has_duplicates: bool,
}

impl<'a> VariantGenerator<'a> {
    /// Create a generator; unknown names are ignored here and reported by
    /// the synthesizer.
    pub fn new(surface: &'a SurfaceModel, request: &CombinationRequest) -> Self {
        let functions: Vec<&ApiFunction> = request
            .functions
            .iter()
            .filter_map(|name| surface.function(name))
            .collect();
        let mut seen = HashSet::new();
        let has_duplicates = !request.functions.iter().all(|name| seen.insert(name));
        Self {
            surface,
            functions,
            has_duplicates,
        }
    }

    /// Base variant followed by every class, truncated to `limit`.
    pub fn generate_all(&self, limit: usize) -> Vec<Variant> {
        let mut variants = vec![Variant {
            label: "base".to_string(),
            class: None,
            strategy: Strategy::default(),
        }];
        for class in VariantClass::all() {
            variants.extend(self.generate(class));
        }
        variants.truncate(limit.max(1));
        variants
    }

    /// Generate the variants of a specific class.
    pub fn generate(&self, class: VariantClass) -> Vec<Variant> {
        let strategies: Vec<Strategy> = match class {
            VariantClass::LiteralRotation => (1..self.max_literals())
                .map(|offset| Strategy {
                    literal_offset: offset,
                    ..Strategy::default()
                })
                .collect(),
            VariantClass::DuplicateSpread if self.has_duplicates => vec![Strategy {
                spread_duplicates: true,
                ..Strategy::default()
            }],
            VariantClass::NullableBuffers if self.has_nullable() => vec![Strategy {
                null_buffers: true,
                ..Strategy::default()
            }],
            VariantClass::AlternateConstructor => (1..self.max_constructors())
                .map(|choice| Strategy {
                    constructor_choice: choice,
                    ..Strategy::default()
                })
                .collect(),
            _ => Vec::new(),
        };
        strategies
            .into_iter()
            .enumerate()
            .map(|(i, strategy)| Variant {
                label: format!("{}-{}", class.id(), i + 1),
                class: Some(class),
                strategy,
            })
            .collect()
    }

    fn params(&self) -> impl Iterator<Item = &ParamKind> {
        self.functions
            .iter()
            .flat_map(|f| f.params.iter().map(|p| &p.kind))
    }

    fn max_literals(&self) -> usize {
        self.params()
            .filter_map(|kind| match kind {
                ParamKind::Primitive { values, .. } => Some(values.len()),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    fn has_nullable(&self) -> bool {
        self.params().any(|kind| {
            matches!(
                kind,
                ParamKind::Buffer { nullable: true, .. } | ParamKind::Callback { nullable: true, .. }
            )
        })
    }

    /// Largest constructor list among the kinds the request touches.
    fn max_constructors(&self) -> usize {
        let kinds: BTreeSet<&str> = self.params().filter_map(ParamKind::resource).collect();
        kinds
            .into_iter()
            .filter_map(|kind| self.surface.functions_producing(kind).ok())
            .map(|producers| producers.len())
            .max()
            .unwrap_or(0)
    }
}
