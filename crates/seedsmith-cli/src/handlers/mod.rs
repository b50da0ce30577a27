//! Command handlers, kept out of main.rs so they can be tested directly

pub mod explore;
pub mod generate;
pub mod minimize;
pub mod surface;

pub use explore::execute_explore;
pub use generate::{build_requests, execute_generate};
pub use minimize::{discover_seed_dirs, execute_minimize};
pub use surface::{execute_surface, lint_surface, SurfaceLint};

use crate::commands::SurfaceSource;
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::ProgressReporter;
use seedsmith::{RunContext, SynthConfig};
use tracing::debug;

/// Load every surface named by `source`. A single `--surface` file wins
/// over the surfaces directory.
pub fn load_context(synth: SynthConfig, source: &SurfaceSource) -> CliResult<RunContext> {
    let mut context = RunContext::new(synth);
    if let Some(path) = &source.surface {
        context.load_path(path)?;
    } else {
        context.load_dir(&source.surfaces)?;
    }
    debug!(libraries = ?context.libraries().collect::<Vec<_>>(), "surfaces loaded");
    Ok(context)
}

/// Reporter matching the configured color and verbosity.
#[must_use]
pub fn reporter(config: &CliConfig) -> ProgressReporter {
    ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
}
