//! Seedsmith CLI: synthesize API-sequence fuzz seeds
//!
//! ## Usage
//!
//! ```bash
//! seedsmith generate -l zlib -c deflateInit_,deflate,deflateEnd -n 2
//! seedsmith surface surfaces/zlib.yaml
//! seedsmith explore -l cjson
//! seedsmith minimize seeds/cjson --apply
//! ```

use clap::Parser;
use seedsmith_cli::{
    handlers, init_tracing, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(config.verbosity, config.color.should_color());

    match &cli.command {
        Commands::Generate(args) => handlers::execute_generate(&config, args),
        Commands::Surface(args) => handlers::execute_surface(&config, args),
        Commands::Minimize(args) => handlers::execute_minimize(&config, args),
        Commands::Explore(args) => handlers::execute_explore(&config, args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.clone().into();
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
        .with_jobs(cli.jobs)
        .with_synth_config(cli.config.clone())
}
