//! On-disk seed corpus: `<out>/<library>/id_NNNNNN.cc` plus `seed_meta.json`.

use super::render::render_seed;
use crate::result::SeedsmithResult;
use crate::scoring::ScoredSequence;
use crate::sequence::c_identifier;
use crate::surface::SurfaceModel;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the per-library seed index.
pub const SEED_INDEX: &str = "seed_meta.json";

/// Index entry for one emitted seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedMeta {
    pub id: u64,
    /// File name relative to the library directory
    pub path: String,
    pub library: String,
    pub combination: Vec<String>,
    pub variant: String,
    pub density: f64,
    pub score: f64,
    pub repaired: bool,
    pub fingerprint: String,
    pub emitted_at: DateTime<Utc>,
}

/// Seed file name for an id.
pub fn seed_file_name(id: u64) -> String {
    format!("id_{id:06}.cc")
}

/// Id encoded in a seed file name.
pub fn seed_id_from_name(name: &str) -> Option<u64> {
    let re = Regex::new(r"^id_(\d{6,})\.cc$").ok()?;
    re.captures(name)?.get(1)?.as_str().parse().ok()
}

/// Load a seed index, empty when the file does not exist.
pub fn load_index(dir: &Path) -> SeedsmithResult<Vec<SeedMeta>> {
    let path = dir.join(SEED_INDEX);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Writer for one library's seed directory.
#[derive(Debug)]
pub struct SeedStore {
    dir: PathBuf,
    library: String,
    next_id: u64,
    index: Vec<SeedMeta>,
}

impl SeedStore {
    /// Open (creating if needed) `<out>/<library>`. Ids continue after the
    /// highest id already present, so an interrupted run can be resumed.
    pub fn open(out: &Path, library: &str) -> SeedsmithResult<Self> {
        let dir = out.join(c_identifier(library));
        std::fs::create_dir_all(&dir)?;

        let index = load_index(&dir)?;
        let mut highest: Option<u64> = index.iter().map(|m| m.id).max();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(id) = entry.file_name().to_str().and_then(seed_id_from_name) {
                highest = highest.max(Some(id));
            }
        }
        let next_id = highest.map_or(0, |id| id + 1);
        debug!(dir = %dir.display(), next_id, "seed store opened");

        Ok(Self {
            dir,
            library: library.to_string(),
            next_id,
            index,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub const fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn index(&self) -> &[SeedMeta] {
        &self.index
    }

    /// Write one seed and record it in the index.
    pub fn emit(
        &mut self,
        surface: &SurfaceModel,
        scored: &ScoredSequence,
        sentinel: i32,
    ) -> SeedsmithResult<SeedMeta> {
        let id = self.next_id;
        let name = seed_file_name(id);
        let text = render_seed(surface, &scored.sequence, &scored.quality, id, sentinel);
        std::fs::write(self.dir.join(&name), text)?;
        self.next_id += 1;

        let meta = SeedMeta {
            id,
            path: name,
            library: self.library.clone(),
            combination: scored.sequence.combination().to_vec(),
            variant: scored.variant.clone(),
            density: scored.quality.density,
            score: scored.quality.score,
            repaired: scored.was_repaired(),
            fingerprint: scored.sequence.fingerprint(),
            emitted_at: Utc::now(),
        };
        self.index.push(meta.clone());
        self.save_index()?;
        info!(id, path = %meta.path, density = meta.density, "seed emitted");
        Ok(meta)
    }

    fn save_index(&self) -> SeedsmithResult<()> {
        let json = serde_json::to_string_pretty(&self.index)?;
        std::fs::write(self.dir.join(SEED_INDEX), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SynthConfig;
    use crate::emit::parse_seed_header;
    use crate::fixtures::{names, widget_surface};
    use crate::lifecycle::LifecycleTracker;
    use crate::scoring::Scorer;
    use crate::synth::{CombinationRequest, Synthesizer};

    fn scored(surface: &SurfaceModel) -> ScoredSequence {
        let config = SynthConfig::default();
        let request = CombinationRequest::new("widget", names(&["widget_new", "widget_free"]));
        let seq = Synthesizer::new(surface, &config)
            .synthesize(&request)
            .expect("synthesizes");
        let outcome = LifecycleTracker::new(surface, &config).validate_and_repair(seq);
        let quality = Scorer::new(surface).score(&outcome.sequence);
        ScoredSequence {
            variant: "base".into(),
            sequence: outcome.sequence,
            quality,
            repairs: outcome.repairs,
        }
    }

    #[test]
    fn test_file_names() {
        assert_eq!(seed_file_name(42), "id_000042.cc");
        assert_eq!(seed_id_from_name("id_000042.cc"), Some(42));
        assert_eq!(seed_id_from_name("id_1234567.cc"), Some(1_234_567));
        assert_eq!(seed_id_from_name("id_42.cc"), None);
        assert_eq!(seed_id_from_name("seed_meta.json"), None);
    }

    #[test]
    fn test_emit_writes_seed_and_index() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let surface = widget_surface();
        let mut store = SeedStore::open(tmp.path(), "widget").expect("opens");
        let meta = store.emit(&surface, &scored(&surface), 66).expect("emits");

        assert_eq!(meta.id, 0);
        let seed = tmp.path().join("widget").join("id_000000.cc");
        let text = std::fs::read_to_string(seed).expect("seed written");
        assert_eq!(parse_seed_header(&text).expect("header").id, 0);

        let index = load_index(store.dir()).expect("index");
        assert_eq!(index, vec![meta]);
    }

    #[test]
    fn test_ids_continue_after_existing_seeds() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("widget");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("id_000009.cc"), "// stale").expect("write");

        let surface = widget_surface();
        let mut store = SeedStore::open(tmp.path(), "widget").expect("opens");
        assert_eq!(store.next_id(), 10);
        let first = store.emit(&surface, &scored(&surface), 66).expect("emits");
        let second = store.emit(&surface, &scored(&surface), 66).expect("emits");
        assert_eq!((first.id, second.id), (10, 11));

        let reopened = SeedStore::open(tmp.path(), "widget").expect("reopens");
        assert_eq!(reopened.next_id(), 12);
        assert_eq!(reopened.index().len(), 2);
    }
}
