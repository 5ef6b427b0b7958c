use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use fpa_eng::csv::{read_drivers, read_variance_lines, write_allocation, write_variance};
use fpa_eng::{Amount, RuleDraft, RuleKind, VarianceReport, ZeroDriverPolicy, allocation};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(
            "warn".parse().expect("static directive is valid"),
        ))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Allocate {
            drivers,
            total,
            equal_split,
        } => {
            let policy = if equal_split {
                ZeroDriverPolicy::EqualSplit
            } else {
                ZeroDriverPolicy::Reject
            };
            allocate(&drivers, total, policy)
        }
        Commands::Variance { lines, threshold } => variance(lines, threshold).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn check_extension(path: &Path) {
    if path.extension().is_none_or(|ext| ext != "csv") {
        warn!(path = %path.display(), "input file seems to not be a csv file");
    }
}

fn allocate(path: &Path, total: Amount, policy: ZeroDriverPolicy) -> Result<(), String> {
    check_extension(path);

    let mut targets = Vec::new();
    let mut drivers = HashMap::new();
    for result in read_drivers(path).map_err(|e| e.to_string())? {
        match result {
            Ok((target, value)) => {
                if drivers.insert(target.clone(), value).is_none() {
                    targets.push(target);
                } else {
                    warn!(account = %target, "duplicate driver row, keeping the last value");
                }
            }
            Err(e) => warn!("{e}"),
        }
    }

    let rule = RuleDraft::new(
        "cli",
        RuleKind::DriverBased {
            driver: "input".to_string(),
        },
        path.display().to_string(),
        targets,
    )
    .into_rule(0);

    let results =
        allocation::evaluate(&rule, total, &drivers, policy).map_err(|e| e.to_string())?;
    write_allocation(io::stdout().lock(), &results).map_err(|e| e.to_string())
}

async fn variance(path: PathBuf, threshold: f64) -> Result<(), String> {
    check_extension(&path);

    let lines = read_variance_lines(path).map_err(|e| e.to_string())?;
    let (line_sender, line_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in lines {
            match result {
                Ok(record) => {
                    if line_sender.send(record).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    let mut report = VarianceReport::new();
    report.run(ReceiverStream::new(line_receiver)).await;

    write_variance(io::stdout().lock(), report.review(threshold)).map_err(|e| e.to_string())
}
