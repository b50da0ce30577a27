//! Synthesis configuration.

use crate::result::{SeedsmithError, SeedsmithResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Knobs for synthesis, repair, emission and exploration.
///
/// Every field has a default, so a YAML file only needs the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Placement steps a single candidate may spend before it is cancelled
    pub step_budget: usize,
    /// Repair iterations per candidate
    pub max_repairs: usize,
    /// Nesting depth of bridging insertions
    pub max_bridging_depth: usize,
    /// Candidate variants synthesized per combination
    pub candidates: usize,
    /// Value returned by the emitted test function
    pub sentinel: i32,
    /// Exploration loop settings
    pub explore: ExploreConfig,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            step_budget: 10_000,
            max_repairs: 16,
            max_bridging_depth: 4,
            candidates: 8,
            sentinel: 66,
            explore: ExploreConfig::default(),
        }
    }
}

impl SynthConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from YAML.
    pub fn from_yaml(yaml: &str) -> SeedsmithResult<Self> {
        serde_yaml_ng::from_str(yaml).map_err(|e| SeedsmithError::Config {
            message: e.to_string(),
        })
    }

    /// Load from a YAML file.
    pub fn from_path(path: &Path) -> SeedsmithResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    #[must_use]
    pub const fn with_step_budget(mut self, steps: usize) -> Self {
        self.step_budget = steps;
        self
    }

    #[must_use]
    pub const fn with_max_repairs(mut self, repairs: usize) -> Self {
        self.max_repairs = repairs;
        self
    }

    #[must_use]
    pub const fn with_max_bridging_depth(mut self, depth: usize) -> Self {
        self.max_bridging_depth = depth;
        self
    }

    #[must_use]
    pub const fn with_candidates(mut self, candidates: usize) -> Self {
        self.candidates = candidates;
        self
    }

    #[must_use]
    pub const fn with_sentinel(mut self, sentinel: i32) -> Self {
        self.sentinel = sentinel;
        self
    }

    #[must_use]
    pub fn with_explore(mut self, explore: ExploreConfig) -> Self {
        self.explore = explore;
        self
    }
}

/// Settings of the energy-scheduled exploration loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploreConfig {
    /// Hard cap on rounds
    pub max_rounds: usize,
    /// Functions per combination
    pub comb_len: usize,
    /// Combinations tried per round
    pub batch: usize,
    /// Consecutive quiet rounds before convergence
    pub quiet_rounds: usize,
    /// A round discovering fewer new triples than this is quiet
    pub min_new_triples: usize,
    /// RNG seed
    pub seed: u64,
    /// Energy multiplier applied to a function each time it is selected
    pub decay: f64,
    /// Energy added to a function taking part in a new triple
    pub reward: f64,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            max_rounds: 50,
            comb_len: 3,
            batch: 4,
            quiet_rounds: 5,
            min_new_triples: 1,
            seed: 0x5eed,
            decay: 0.8,
            reward: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SynthConfig::default();
        assert_eq!(config.step_budget, 10_000);
        assert_eq!(config.max_repairs, 16);
        assert_eq!(config.max_bridging_depth, 4);
        assert_eq!(config.candidates, 8);
        assert_eq!(config.sentinel, 66);
        assert_eq!(config.explore.comb_len, 3);
    }

    #[test]
    fn test_builders() {
        let config = SynthConfig::new()
            .with_step_budget(5)
            .with_max_repairs(2)
            .with_max_bridging_depth(1)
            .with_candidates(3)
            .with_sentinel(0);
        assert_eq!(config.step_budget, 5);
        assert_eq!(config.max_repairs, 2);
        assert_eq!(config.max_bridging_depth, 1);
        assert_eq!(config.candidates, 3);
        assert_eq!(config.sentinel, 0);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = SynthConfig::from_yaml("max_repairs: 3\nexplore:\n  seed: 7\n").expect("parse");
        assert_eq!(config.max_repairs, 3);
        assert_eq!(config.step_budget, 10_000);
        assert_eq!(config.explore.seed, 7);
        assert_eq!(config.explore.quiet_rounds, 5);
    }

    #[test]
    fn test_bad_yaml_is_config_error() {
        let result = SynthConfig::from_yaml("max_repairs: many");
        assert!(matches!(result, Err(SeedsmithError::Config { .. })));
    }
}
