//! Energy schedule for the exploration loop.

use super::triples::{ApiTriple, TripleSet};
use crate::config::ExploreConfig;
use crate::rng::{Seed, Xorshift64};
use std::collections::BTreeMap;

/// Energy never drops below this, so every function stays selectable.
const MIN_ENERGY: f64 = 0.05;

/// Per-function energy with weighted deterministic selection.
#[derive(Debug, Clone)]
pub struct Schedule {
    config: ExploreConfig,
    energy: BTreeMap<String, f64>,
    rng: Xorshift64,
    triples: TripleSet,
    round: usize,
    quiet: usize,
}

impl Schedule {
    /// All functions start with energy 1.
    pub fn new(functions: impl IntoIterator<Item = String>, config: &ExploreConfig) -> Self {
        Self {
            config: config.clone(),
            energy: functions.into_iter().map(|f| (f, 1.0)).collect(),
            rng: Xorshift64::new(Seed::from_u64(config.seed)),
            triples: TripleSet::new(),
            round: 0,
            quiet: 0,
        }
    }

    pub fn energy(&self, function: &str) -> Option<f64> {
        self.energy.get(function).copied()
    }

    pub const fn round(&self) -> usize {
        self.round
    }

    pub const fn quiet_rounds(&self) -> usize {
        self.quiet
    }

    pub fn discovered(&self) -> usize {
        self.triples.len()
    }

    /// Pick `comb_len` distinct functions, weighted by energy. Each pick
    /// decays the picked function's energy.
    pub fn pick_combination(&mut self) -> Vec<String> {
        let mut pool: Vec<String> = self.energy.keys().cloned().collect();
        let mut picked = Vec::new();
        while picked.len() < self.config.comb_len && !pool.is_empty() {
            let total: f64 = pool.iter().map(|f| self.energy[f]).sum();
            let mut target = self.rng.next_f64() * total;
            let mut index = pool.len() - 1;
            for (i, f) in pool.iter().enumerate() {
                target -= self.energy[f];
                if target < 0.0 {
                    index = i;
                    break;
                }
            }
            let function = pool.remove(index);
            if let Some(e) = self.energy.get_mut(&function) {
                *e = (*e * self.config.decay).max(MIN_ENERGY);
            }
            picked.push(function);
        }
        picked
    }

    /// One round's worth of combinations.
    pub fn next_batch(&mut self) -> Vec<Vec<String>> {
        (0..self.config.batch.max(1))
            .map(|_| self.pick_combination())
            .collect()
    }

    /// Record an accepted sequence's calls. Functions in new triples are
    /// rewarded.
    pub fn observe(&mut self, library_calls: &[String]) -> Vec<ApiTriple> {
        let fresh = self.triples.observe(library_calls);
        for triple in &fresh {
            for function in triple.functions() {
                if let Some(e) = self.energy.get_mut(function) {
                    *e += self.config.reward;
                }
            }
        }
        fresh
    }

    /// Close a round that discovered `new_triples`.
    pub fn end_round(&mut self, new_triples: usize) {
        self.round += 1;
        if new_triples < self.config.min_new_triples {
            self.quiet += 1;
        } else {
            self.quiet = 0;
        }
    }

    /// Quiet for `quiet_rounds` consecutive rounds, or out of rounds.
    pub fn is_converged(&self) -> bool {
        self.quiet >= self.config.quiet_rounds || self.round >= self.config.max_rounds
    }
}
