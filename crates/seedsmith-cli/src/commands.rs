//! CLI command definitions using clap

use crate::output::OutputFormat;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Seedsmith: synthesize lifecycle-correct API-sequence fuzz seeds
#[derive(Parser, Debug)]
#[command(name = "seedsmith")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Synthesis configuration file (YAML)
    #[arg(long, global = true, env = "SEEDSMITH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Worker threads (0 = one per core)
    #[arg(short = 'j', long, default_value = "0", global = true)]
    pub jobs: usize,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synthesize seeds for one or more combinations
    Generate(GenerateArgs),

    /// Load and lint surface descriptions
    Surface(SurfaceArgs),

    /// Drop seeds that add no new API triple
    Minimize(MinimizeArgs),

    /// Energy-scheduled exploration of a library's combinations
    Explore(ExploreArgs),
}

/// Where surfaces come from
#[derive(clap::Args, Debug, Clone)]
pub struct SurfaceSource {
    /// Single surface file
    #[arg(long)]
    pub surface: Option<PathBuf>,

    /// Directory of surface files (used when --surface is absent)
    #[arg(long, default_value = "surfaces")]
    pub surfaces: PathBuf,
}

/// Arguments for the generate command
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Target library
    #[arg(short, long)]
    pub library: String,

    /// Comma-separated function list; repeat for several combinations
    #[arg(short, long, required = true)]
    pub combination: Vec<String>,

    /// Seeds to emit per combination
    #[arg(short = 'n', long, default_value = "1")]
    pub count: usize,

    #[command(flatten)]
    pub source: SurfaceSource,

    /// Output directory for seeds
    #[arg(short, long, default_value = "seeds")]
    pub output: PathBuf,

    /// Keep the literal combination order instead of phase order
    #[arg(long)]
    pub ordered: bool,

    /// Do not finalize resources (intentional leak)
    #[arg(long)]
    pub allow_leak: bool,

    /// Text recorded in the seed's <Prompt> line
    #[arg(long, default_value = "")]
    pub prompt: String,

    /// Summary format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the surface command
#[derive(Parser, Debug)]
pub struct SurfaceArgs {
    /// Surface YAML file(s) to lint
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Export resource state machines
    #[arg(long, value_enum)]
    pub export: Option<DiagramFormat>,

    /// Output file for the export (stdout when absent)
    #[arg(long)]
    pub export_output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Diagram export format
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum DiagramFormat {
    /// DOT format (Graphviz)
    Dot,
}

/// Arguments for the minimize command
#[derive(Parser, Debug)]
pub struct MinimizeArgs {
    /// Seed directory of one library
    pub dir: PathBuf,

    /// Move redundant seeds into <dir>/redundant
    #[arg(long)]
    pub apply: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the explore command
#[derive(Parser, Debug)]
pub struct ExploreArgs {
    /// Target library
    #[arg(short, long)]
    pub library: String,

    #[command(flatten)]
    pub source: SurfaceSource,

    /// Round cap (overrides the configuration)
    #[arg(long)]
    pub rounds: Option<usize>,

    /// Functions per combination
    #[arg(long)]
    pub comb_len: Option<usize>,

    /// Scheduler seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output directory for seeds
    #[arg(short, long, default_value = "seeds")]
    pub output: PathBuf,

    /// Summary format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
