//! Generate command handler

use super::{load_context, reporter};
use crate::commands::GenerateArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;
use seedsmith::{CombinationOutcome, CombinationRequest, Pipeline, RunSummary};

/// Execute the generate command
pub fn execute_generate(config: &CliConfig, args: &GenerateArgs) -> CliResult<()> {
    if args.count == 0 {
        return Err(CliError::invalid_argument("--count must be at least 1"));
    }
    let requests = build_requests(args)?;
    let context = load_context(config.load_synth_config()?, &args.source)?;
    let summary = Pipeline::new(&context)
        .with_jobs(config.effective_jobs())
        .run(&requests, args.count, &args.output)?;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&summary)
                .map_err(|e| CliError::generation(e.to_string()))?;
            println!("{json}");
            let reporter = reporter(config);
            for line in problem_lines(&summary.outcomes) {
                reporter.failure(&line);
            }
        }
        OutputFormat::Text => print_summary(config, &summary),
    }

    if summary.emitted() == 0 {
        return Err(CliError::generation(format!(
            "0 of {} combinations accepted",
            summary.outcomes.len()
        )));
    }
    Ok(())
}

/// One request per `--combination`, each a comma-separated function list.
pub fn build_requests(args: &GenerateArgs) -> CliResult<Vec<CombinationRequest>> {
    args.combination
        .iter()
        .map(|combination| {
            let request = CombinationRequest::parse(&args.library, combination)
                .ordered(args.ordered)
                .with_intentional_leak(args.allow_leak)
                .with_prompt(args.prompt.clone());
            if request.functions.is_empty() {
                Err(CliError::invalid_argument(format!(
                    "empty combination '{combination}'"
                )))
            } else {
                Ok(request)
            }
        })
        .collect()
}

/// One stderr line per rejection reason or failure.
#[must_use]
pub fn problem_lines(outcomes: &[CombinationOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .flat_map(|outcome| match outcome {
            CombinationOutcome::Accepted { .. } => Vec::new(),
            CombinationOutcome::Rejected {
                combination,
                reasons,
            } if reasons.is_empty() => vec![format!("{combination}: rejected")],
            CombinationOutcome::Rejected {
                combination,
                reasons,
            } => reasons
                .iter()
                .map(|reason| format!("{combination}: rejected: {reason}"))
                .collect(),
            CombinationOutcome::Failed { combination, error } => {
                vec![format!("{combination}: {error}")]
            }
        })
        .collect()
}

fn print_summary(config: &CliConfig, summary: &RunSummary) {
    let reporter = reporter(config);
    for outcome in &summary.outcomes {
        match outcome {
            CombinationOutcome::Accepted {
                combination,
                seeds,
                repaired,
                density,
                score,
            } => {
                let note = if *repaired { ", repaired" } else { "" };
                reporter.success(&format!(
                    "{combination}: {} seed(s), density {density:.2}, score {score:.2}{note}",
                    seeds.len()
                ));
                if config.verbosity.is_verbose() {
                    for seed in seeds {
                        reporter.info(&seed.path);
                    }
                }
            }
            CombinationOutcome::Rejected {
                combination,
                reasons,
            } => {
                reporter.failure(&format!("{combination}: rejected"));
                for reason in reasons {
                    eprintln!("    {reason}");
                }
            }
            CombinationOutcome::Failed { combination, error } => {
                reporter.failure(&format!("{combination}: {error}"));
            }
        }
    }
    reporter.header("Summary");
    reporter.summary(
        summary.accepted(),
        summary.repaired(),
        summary.rejected(),
        summary.failed(),
    );
}
