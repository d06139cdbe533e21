//! CLI argument structures
//!
//! This module defines the command-line interface of `nfmap`: the global
//! flags and one subcommand per operation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::extract::DependencyMode;
use crate::invoke::parse_bool;

/// Map a Python function over many inputs on a batch scheduler
#[derive(Parser)]
#[command(name = "nfmap")]
#[command(about = "nfmap - Map a Python function over many inputs on a batch scheduler", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Dispatch configuration file (YAML). Falls back to $NFMAP_CONFIG.
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract one function and its dependencies into a standalone script
    #[command(name = "extract")]
    Extract {
        /// Python source file
        #[arg(long, value_name = "PATH.py")]
        input: PathBuf,

        /// Name of the top-level function to extract
        #[arg(long = "func_name", alias = "func-name", value_name = "NAME")]
        func_name: String,

        /// Where to write the extracted script
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Which module-level statements to carry along
        #[arg(long, value_enum, default_value_t = DependencyMode::Referenced)]
        mode: DependencyMode,
    },

    /// Apply an extracted function to one element (run by the scheduler)
    #[command(name = "invoke")]
    Invoke {
        /// Script produced by `nfmap extract`
        #[arg(long = "func-script", value_name = "PATH")]
        func_script: PathBuf,

        /// Element artifact to apply the function to
        #[arg(long, value_name = "PATH")]
        element: PathBuf,

        /// Write a result artifact and print its path
        #[arg(
            long = "return-output",
            value_parser = parse_bool,
            action = clap::ArgAction::Set,
            required = true,
            value_name = "BOOL"
        )]
        return_output: bool,

        /// Python interpreter (defaults to the configured one)
        #[arg(long)]
        interpreter: Option<String>,
    },

    /// Dispatch a function over a JSON array of inputs
    #[command(name = "run")]
    Run {
        /// Python source file defining the function
        #[arg(long, value_name = "PATH.py")]
        source: PathBuf,

        /// Name of the function to run
        #[arg(long, value_name = "NAME")]
        function: String,

        /// JSON file holding an array of input elements
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Scheduler log file; each pool writes to a copy suffixed with its name
        #[arg(long, value_name = "PATH")]
        log: Option<PathBuf>,

        /// Resource pool; repeat to split the inputs across pools by weight
        #[arg(long = "pool", value_name = "NAME", default_value = "day")]
        pools: Vec<String>,

        /// Keep the scheduler work directory from previous runs
        #[arg(long)]
        no_clear: bool,

        /// Do not collect results
        #[arg(long)]
        no_results: bool,

        /// Which module-level statements to carry along
        #[arg(long, value_enum, default_value_t = DependencyMode::Referenced)]
        mode: DependencyMode,
    },

    /// Search for the batch size with the lowest cost
    #[command(name = "tune")]
    Tune {
        /// Smallest batch size to consider
        #[arg(long, default_value = "1")]
        min: usize,

        /// Largest batch size to consider
        #[arg(long)]
        max: usize,

        /// Relative improvement the smaller size needs to win (0 <= t < 1)
        #[arg(long, default_value = "0.05")]
        tolerance: f64,

        /// Iteration budget
        #[arg(long = "max-iterations", default_value = "10")]
        max_iterations: usize,

        /// Shell command to time; `{batch_size}` is replaced by the candidate
        #[arg(long)]
        command: String,
    },

    /// Clear the scheduler work directory
    #[command(name = "clear")]
    Clear,
}
