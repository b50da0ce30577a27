//! Per-run context: loaded surfaces and configuration.

use crate::config::SynthConfig;
use crate::result::{SeedsmithError, SeedsmithResult};
use crate::surface::{SurfaceError, SurfaceModel};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Everything a run shares across workers. Surfaces are loaded before any
/// worker starts and are read-only afterwards.
#[derive(Debug)]
pub struct RunContext {
    run_id: Uuid,
    config: SynthConfig,
    surfaces: BTreeMap<String, Arc<SurfaceModel>>,
}

impl RunContext {
    pub fn new(config: SynthConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            surfaces: BTreeMap::new(),
        }
    }

    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub const fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Register a loaded surface. Each library may be registered once.
    pub fn register(&mut self, surface: SurfaceModel) -> SeedsmithResult<Arc<SurfaceModel>> {
        let library = surface.library().to_string();
        if self.surfaces.contains_key(&library) {
            return Err(SurfaceError::DuplicateLibrary(library).into());
        }
        let surface = Arc::new(surface);
        self.surfaces.insert(library, Arc::clone(&surface));
        Ok(surface)
    }

    /// Load and register one surface file.
    pub fn load_path(&mut self, path: &Path) -> SeedsmithResult<Arc<SurfaceModel>> {
        let surface = SurfaceModel::from_path(path)?;
        info!(library = surface.library(), path = %path.display(), "surface loaded");
        self.register(surface)
    }

    /// Load every `*.yaml`/`*.yml` file in a directory, in name order.
    pub fn load_dir(&mut self, dir: &Path) -> SeedsmithResult<usize> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        paths.sort();
        for path in &paths {
            self.load_path(path)?;
        }
        Ok(paths.len())
    }

    pub fn surface(&self, library: &str) -> SeedsmithResult<Arc<SurfaceModel>> {
        self.surfaces
            .get(library)
            .cloned()
            .ok_or_else(|| SeedsmithError::UnknownLibrary(library.to_string()))
    }

    pub fn libraries(&self) -> impl Iterator<Item = &str> {
        self.surfaces.keys().map(String::as_str)
    }
}
