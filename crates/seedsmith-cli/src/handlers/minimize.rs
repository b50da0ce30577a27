//! Minimize command handler

use super::reporter;
use crate::commands::MinimizeArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;
use seedsmith::{apply_minimization, load_corpus, minimize_by_triples, Minimization};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct DirReport {
    dir: PathBuf,
    #[serde(flatten)]
    minimization: Minimization,
    moved: usize,
}

/// Expand `dir` as a glob pattern (e.g. `seeds/*`) into seed directories.
/// A plain path matches itself.
pub fn discover_seed_dirs(pattern: &Path) -> CliResult<Vec<PathBuf>> {
    let pattern = pattern.to_string_lossy();
    let mut dirs: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| CliError::invalid_argument(format!("bad pattern '{pattern}': {e}")))?
        .filter_map(Result::ok)
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    if dirs.is_empty() {
        return Err(CliError::invalid_argument(format!(
            "no seed directory matches '{pattern}'"
        )));
    }
    Ok(dirs)
}

/// Execute the minimize command
pub fn execute_minimize(config: &CliConfig, args: &MinimizeArgs) -> CliResult<()> {
    let mut reports = Vec::new();
    for dir in discover_seed_dirs(&args.dir)? {
        let corpus = load_corpus(&dir)?;
        let minimization = minimize_by_triples(&corpus);
        let moved = if args.apply {
            apply_minimization(&dir, &minimization)?
        } else {
            0
        };
        reports.push(DirReport {
            dir,
            minimization,
            moved,
        });
    }

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&reports)
                .map_err(|e| CliError::invalid_argument(e.to_string()))?;
            println!("{json}");
        }
        OutputFormat::Text => {
            let reporter = reporter(config);
            for report in &reports {
                let m = &report.minimization;
                reporter.success(&format!(
                    "{}: keep {} of {} seeds covering {} triples",
                    report.dir.display(),
                    m.kept.len(),
                    m.kept.len() + m.redundant.len(),
                    m.triples
                ));
                if args.apply {
                    reporter.info(&format!("moved {} redundant seeds", report.moved));
                } else if config.verbosity.is_verbose() {
                    for seed in &m.redundant {
                        reporter.info(&format!("redundant: {}", seed.path.display()));
                    }
                }
            }
        }
    }
    Ok(())
}
