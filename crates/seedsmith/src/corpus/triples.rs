//! API triples: three consecutive library calls.

use serde::Serialize;
use std::collections::BTreeSet;

/// Three consecutive library calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ApiTriple(pub String, pub String, pub String);

impl ApiTriple {
    /// Functions taking part in the triple.
    pub fn functions(&self) -> [&str; 3] {
        [&self.0, &self.1, &self.2]
    }
}

impl std::fmt::Display for ApiTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {} -> {}", self.0, self.1, self.2)
    }
}

/// 3-grams over a call list, in order, duplicates kept.
pub fn api_triples(calls: &[String]) -> Vec<ApiTriple> {
    calls
        .windows(3)
        .map(|w| ApiTriple(w[0].clone(), w[1].clone(), w[2].clone()))
        .collect()
}

/// Triples discovered so far.
#[derive(Debug, Clone, Default)]
pub struct TripleSet {
    seen: BTreeSet<ApiTriple>,
}

impl TripleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the triples of a call list, returning the ones not seen before.
    pub fn observe(&mut self, calls: &[String]) -> Vec<ApiTriple> {
        api_triples(calls)
            .into_iter()
            .filter(|t| self.seen.insert(t.clone()))
            .collect()
    }

    pub fn contains(&self, triple: &ApiTriple) -> bool {
        self.seen.contains(triple)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
