use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// The daemon's CLI surface: start, generate samples, or test a plugin
/// directly.
#[derive(Debug, Parser)]
#[command(author, version, about = "MQTT message-routing bridge", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Overrides RUST_LOG for every subcommand.
    #[arg(long, global = true, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the daemon: load configuration, connect to the broker, run
    /// until a shutdown signal arrives.
    Run {
        #[arg(short = 'c', long = "config-file", env = "CONFIG_FILE_PATH", default_value = "config.yaml")]
        config_file: PathBuf,
    },
    /// Print a sample configuration file to stdout, or to a file with -o.
    SampleConfig {
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Print a sample helper-functions source file to stdout, or to a file with -o.
    SampleHelpers {
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Invoke one configured service's plugin directly with a literal body,
    /// bypassing the broker and the pipeline, for interactive testing.
    TestService {
        #[arg(short = 'c', long = "config-file", env = "CONFIG_FILE_PATH", default_value = "config.yaml")]
        config_file: PathBuf,
        /// `service:target`, e.g. `log:info`.
        target: String,
        /// The literal Job body to deliver.
        body: String,
    },
}
