//! Explore command handler

use super::{load_context, reporter};
use crate::commands::ExploreArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::OutputFormat;
use seedsmith::{ExploreConfig, Pipeline};

/// Apply the command-line overrides on top of the configured settings.
#[must_use]
pub fn explore_overrides(mut explore: ExploreConfig, args: &ExploreArgs) -> ExploreConfig {
    if let Some(rounds) = args.rounds {
        explore.max_rounds = rounds;
    }
    if let Some(comb_len) = args.comb_len {
        explore.comb_len = comb_len;
    }
    if let Some(seed) = args.seed {
        explore.seed = seed;
    }
    explore
}

/// Execute the explore command
pub fn execute_explore(config: &CliConfig, args: &ExploreArgs) -> CliResult<()> {
    let synth = config.load_synth_config()?;
    let explore = explore_overrides(synth.explore.clone(), args);
    if explore.comb_len == 0 {
        return Err(CliError::invalid_argument("--comb-len must be at least 1"));
    }
    let context = load_context(synth.with_explore(explore.clone()), &args.source)?;

    let mut progress = reporter(config);
    progress.start_rounds(explore.max_rounds as u64, &args.library);
    let summary = Pipeline::new(&context)
        .with_jobs(config.effective_jobs())
        .explore(&args.library, &args.output, |round| {
            progress.advance(&format!(
                "{} triples, {} new seeds",
                round.discovered, round.emitted
            ));
        })?;
    progress.finish(if summary.converged {
        "converged"
    } else {
        "round cap reached"
    });

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&summary)
                .map_err(|e| CliError::generation(e.to_string()))?;
            println!("{json}");
        }
        OutputFormat::Text => {
            progress.success(&format!(
                "{}: {} seeds, {} triples after {} rounds",
                summary.library,
                summary.seeds.len(),
                summary.discovered,
                summary.rounds
            ));
            for (reason, count) in &summary.skipped {
                progress.warning(&format!("{count} combinations skipped: {reason}"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_overrides_only_touch_given_flags() {
        let cli = Cli::parse_from(["seedsmith", "explore", "-l", "zlib", "--rounds", "3"]);
        let Commands::Explore(args) = cli.command else {
            panic!("expected Explore command");
        };
        let base = ExploreConfig::default();
        let merged = explore_overrides(base.clone(), &args);
        assert_eq!(merged.max_rounds, 3);
        assert_eq!(merged.comb_len, base.comb_len);
        assert_eq!(merged.seed, base.seed);
    }
}
