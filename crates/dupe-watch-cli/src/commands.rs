use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dupe-watch")]
#[command(about = "Watch folders and catch duplicate files as they land", long_about = None)]
pub struct Cli {
    /// Configuration file name, extension optional (default: Config)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Watch the configured directories until Enter is pressed
    Watch {
        /// Index files in these directories before watching
        #[arg(long)]
        seed: Vec<PathBuf>,
    },
    /// Find duplicates in directories once, in parallel
    Scan {
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Print configuration values
    PrintConfig,
}
