//! Command line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fpa_eng::Amount;

/// FP&A engine: driver-based cost allocation and budget variance reports
#[derive(Parser)]
#[command(name = "fpa-eng")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a total across the targets of a `target,value` driver file
    Allocate {
        /// Driver csv file
        drivers: PathBuf,

        /// Amount to allocate
        #[arg(allow_hyphen_values = true)]
        total: Amount,

        /// Split equally when every driver value is zero
        #[arg(long)]
        equal_split: bool,
    },

    /// Compare actuals to budget for an `account,kind,actual,budget,prior_year` file
    Variance {
        /// Variance csv file
        lines: PathBuf,

        /// Flag lines whose absolute variance percentage exceeds this value
        #[arg(long, default_value_t = 10.0)]
        threshold: f64,
    },
}
