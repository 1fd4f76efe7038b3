//! scp-send binary entry point.

use std::process::ExitCode;

use clap::Parser;
use scp_source::scp::{ScpErrorKind, SendSummary};
use tracing::{error, info};

use scp_send_lib::{init_logging, run, Cli};

fn print_summary(summary: &SendSummary) {
    for outcome in &summary.outcomes {
        match (outcome.success, &outcome.report, &outcome.error) {
            (true, Some(report), _) => println!(
                "sent    {} -> {} ({} bytes, {} ms)",
                outcome.local_path, outcome.remote_name, report.bytes_sent, report.duration_ms
            ),
            (_, _, Some(err)) => println!("failed  {}: {}", outcome.local_path, err),
            _ => println!("failed  {}", outcome.local_path),
        }
    }
    println!(
        "{} sent, {} failed, {} skipped, {} bytes in {} ms",
        summary.succeeded, summary.failed, summary.skipped, summary.total_bytes, summary.duration_ms
    );
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_file.as_deref(), cli.log_format.into()) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(2);
    }
    info!(version = env!("CARGO_PKG_VERSION"), "scp-send starting");

    let config = match cli.to_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    let summary = match run(&config) {
        Ok(summary) => summary,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            return if e.kind == ScpErrorKind::InvalidConfig {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            };
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("cannot serialise summary: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_summary(&summary);
    }

    if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
