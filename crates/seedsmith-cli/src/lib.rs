//! Seedsmith CLI library
//!
//! Command-line front end for the seedsmith seed synthesizer.
//!
//! ```bash
//! seedsmith generate -l cjson -c cJSON_Parse,cJSON_GetObjectItem,cJSON_Delete
//! seedsmith surface surfaces/*.yaml --export dot
//! seedsmith explore -l zlib --rounds 20
//! seedsmith minimize 'seeds/*' --apply
//! ```

#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod logging;
mod output;

pub use commands::{
    Cli, ColorArg, Commands, DiagramFormat, ExploreArgs, GenerateArgs, MinimizeArgs,
    SurfaceArgs, SurfaceSource,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use logging::init_tracing;
pub use output::{OutputFormat, ProgressReporter};
