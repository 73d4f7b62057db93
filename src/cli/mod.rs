pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "datakit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Kubernetes object, metric and event collection agent", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run collection, event watching and autodiscovery until interrupted")]
    Run {
        #[arg(short, long, help = "Agent configuration file (YAML)")]
        config: PathBuf,
    },
    #[command(about = "Collect once and print the records")]
    Collect {
        #[arg(short, long, help = "Agent configuration file (YAML)")]
        config: PathBuf,

        #[arg(short, long, help = "Only run these collector kinds (repeatable)")]
        kind: Vec<String>,

        #[arg(long, help = "Print feed metrics in Prometheus text format afterwards")]
        stats: bool,
    },
    #[command(about = "List inputs that autodiscovery can start")]
    Inputs,
}
