//! Surface command handler: lint surface files, export their state machines

use super::reporter;
use crate::commands::{DiagramFormat, SurfaceArgs};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;
use seedsmith::surface::{to_dot, IssueSeverity, ResourceMachineValidator};
use seedsmith::{SurfaceModel, SurfaceSpec};
use serde::Serialize;
use std::path::Path;

/// Lint result of one surface file
#[derive(Debug, Clone, Serialize)]
pub struct SurfaceLint {
    pub path: String,
    pub library: Option<String>,
    pub functions: usize,
    pub kinds: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip)]
    pub spec: Option<SurfaceSpec>,
}

impl SurfaceLint {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse a surface file, analyse every resource machine and run the full
/// model load. Load failures become lint errors rather than `Err`.
pub fn lint_surface(path: &Path) -> SurfaceLint {
    let mut lint = SurfaceLint {
        path: path.display().to_string(),
        library: None,
        functions: 0,
        kinds: 0,
        errors: Vec::new(),
        warnings: Vec::new(),
        spec: None,
    };

    let yaml = match std::fs::read_to_string(path) {
        Ok(yaml) => yaml,
        Err(e) => {
            lint.errors.push(e.to_string());
            return lint;
        }
    };
    let spec = match SurfaceSpec::from_yaml(&yaml) {
        Ok(spec) => spec,
        Err(e) => {
            lint.errors.push(e.to_string());
            return lint;
        }
    };

    lint.library = Some(spec.library.clone());
    lint.functions = spec.functions.len();
    lint.kinds = spec.resources.len();
    for kind in spec.resources.values() {
        let report = ResourceMachineValidator::new(kind).validate();
        for issue in &report.issues {
            let line = format!("{}: {issue}", report.kind);
            match issue.severity() {
                IssueSeverity::Error => lint.errors.push(line),
                IssueSeverity::Warning | IssueSeverity::Info => lint.warnings.push(line),
            }
        }
    }
    if lint.errors.is_empty() {
        if let Err(e) = SurfaceModel::from_spec(spec.clone()) {
            lint.errors.push(e.to_string());
        }
    }
    lint.spec = Some(spec);
    lint
}

/// Execute the surface command
pub fn execute_surface(config: &CliConfig, args: &SurfaceArgs) -> CliResult<()> {
    let lints: Vec<SurfaceLint> = args.files.iter().map(|f| lint_surface(f)).collect();

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&lints)
                .map_err(|e| CliError::surface_lint(e.to_string()))?;
            println!("{json}");
        }
        OutputFormat::Text => print_lints(config, &lints),
    }

    if let Some(DiagramFormat::Dot) = args.export {
        let dot: String = lints
            .iter()
            .filter(|l| l.is_valid())
            .filter_map(|l| l.spec.as_ref())
            .map(to_dot)
            .collect();
        match &args.export_output {
            Some(path) => std::fs::write(path, dot)?,
            None => print!("{dot}"),
        }
    }

    let invalid = lints.iter().filter(|l| !l.is_valid()).count();
    if invalid > 0 {
        return Err(CliError::surface_lint(format!(
            "{invalid} of {} files invalid",
            lints.len()
        )));
    }
    Ok(())
}

fn print_lints(config: &CliConfig, lints: &[SurfaceLint]) {
    let reporter = reporter(config);
    for lint in lints {
        let name = lint.library.as_deref().unwrap_or("?");
        if lint.is_valid() {
            reporter.success(&format!(
                "{} ({name}): {} functions, {} resource kinds",
                lint.path, lint.functions, lint.kinds
            ));
        } else {
            reporter.failure(&format!("{} ({name})", lint.path));
            for error in &lint.errors {
                eprintln!("    {error}");
            }
        }
        for warning in &lint.warnings {
            reporter.warning(warning);
        }
    }
}
