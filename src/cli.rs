use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kiln", about = "Bake VM images on a remote VM cluster")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "kiln.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Provision a builder VM and save the result as a new image
    Build {
        /// Leave the builder VM in place after the run
        #[arg(long)]
        keep_vm: bool,

        /// Skip image creation at the end of the run
        #[arg(long)]
        no_image: bool,
    },

    /// Check the config file and print the resolved build plan
    Validate,

    /// Purge a leftover builder VM and its configuration
    Destroy,
}
