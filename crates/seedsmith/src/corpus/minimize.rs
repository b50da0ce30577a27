//! Triple-based corpus minimization.

use super::triples::TripleSet;
use crate::emit::parse_seed_header;
use crate::result::SeedsmithResult;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory redundant seeds are moved into.
pub const REDUNDANT_DIR: &str = "redundant";

/// One seed file of a corpus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusSeed {
    pub path: PathBuf,
    pub id: u64,
    pub score: f64,
    pub library_calls: Vec<String>,
}

/// Result of a minimization pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Minimization {
    /// Seeds contributing at least one new triple, best score first
    pub kept: Vec<CorpusSeed>,
    pub redundant: Vec<CorpusSeed>,
    /// Distinct triples covered by the kept seeds
    pub triples: usize,
}

/// Read every `*.cc` seed directly inside `dir`. Files without a
/// parsable header are skipped with a warning.
pub fn load_corpus(dir: &Path) -> SeedsmithResult<Vec<CorpusSeed>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "cc"))
        .collect();
    paths.sort();

    let mut seeds = Vec::new();
    for path in paths {
        let text = std::fs::read_to_string(&path)?;
        match parse_seed_header(&text) {
            Ok(header) => seeds.push(CorpusSeed {
                path,
                id: header.id,
                score: header.score,
                library_calls: header.quality.library_calls,
            }),
            Err(e) => warn!(path = %path.display(), error = %e, "seed skipped"),
        }
    }
    Ok(seeds)
}

/// Greedy cover: visit seeds by score (descending, ties by id) and keep
/// those that add a triple no kept seed covers.
pub fn minimize_by_triples(seeds: &[CorpusSeed]) -> Minimization {
    let mut order: Vec<&CorpusSeed> = seeds.iter().collect();
    order.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));

    let mut covered = TripleSet::new();
    let mut result = Minimization::default();
    for seed in order {
        let fresh = covered.observe(&seed.library_calls);
        if fresh.is_empty() {
            debug!(id = seed.id, "no new triple");
            result.redundant.push(seed.clone());
        } else {
            result.kept.push(seed.clone());
        }
    }
    result.triples = covered.len();
    result
}

/// Move redundant seeds into `<dir>/redundant/`. Returns how many moved.
pub fn apply_minimization(dir: &Path, minimization: &Minimization) -> SeedsmithResult<usize> {
    if minimization.redundant.is_empty() {
        return Ok(0);
    }
    let target = dir.join(REDUNDANT_DIR);
    std::fs::create_dir_all(&target)?;
    let mut moved = 0;
    for seed in &minimization.redundant {
        let Some(name) = seed.path.file_name() else {
            continue;
        };
        std::fs::rename(&seed.path, target.join(name))?;
        moved += 1;
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::names;

    fn seed(id: u64, score: f64, calls: &[&str]) -> CorpusSeed {
        CorpusSeed {
            path: PathBuf::from(format!("id_{id:06}.cc")),
            id,
            score,
            library_calls: names(calls),
        }
    }

    #[test]
    fn test_greedy_cover_prefers_score() {
        let seeds = vec![
            seed(0, 50.0, &["a", "b", "c"]),
            seed(1, 90.0, &["a", "b", "c", "d"]),
            seed(2, 10.0, &["b", "c", "d"]),
            seed(3, 20.0, &["c", "d", "e"]),
        ];
        let min = minimize_by_triples(&seeds);
        let kept: Vec<u64> = min.kept.iter().map(|s| s.id).collect();
        let redundant: Vec<u64> = min.redundant.iter().map(|s| s.id).collect();
        assert_eq!(kept, vec![1, 3]);
        assert_eq!(redundant, vec![0, 2]);
        assert_eq!(min.triples, 3);
    }

    #[test]
    fn test_short_seeds_are_redundant() {
        let min = minimize_by_triples(&[seed(0, 1.0, &["a", "b"])]);
        assert!(min.kept.is_empty());
        assert_eq!(min.redundant.len(), 1);
    }

    #[test]
    fn test_apply_moves_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("id_000001.cc");
        std::fs::write(&path, "// seed").expect("write");
        let mut redundant = seed(1, 0.0, &[]);
        redundant.path = path.clone();
        let min = Minimization {
            kept: vec![],
            redundant: vec![redundant],
            triples: 0,
        };
        assert_eq!(apply_minimization(tmp.path(), &min).expect("moves"), 1);
        assert!(!path.exists());
        assert!(tmp.path().join(REDUNDANT_DIR).join("id_000001.cc").exists());
    }
}
