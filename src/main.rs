//! CLI entry point for the pubarchiver tool.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use clap::Parser;
use pubarchiver_core::{Pipeline, ReportFormat, RunReport, preview_table, write_reports};
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, RunConfig};

/// Exit code for configuration errors and internal faults.
const EXIT_FATAL: i32 = 3;

#[tokio::main]
async fn main() {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let config = match args.into_config() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("pubarchiver: {error}");
            process::exit(EXIT_FATAL);
        }
    };

    process::exit(run(config).await);
}

async fn run(config: RunConfig) -> i32 {
    let pipeline = match Pipeline::from_options(&config.options) {
        Ok(pipeline) => pipeline,
        Err(error) => {
            eprintln!("pubarchiver: {error}");
            return error.exit_code();
        }
    };

    if config.get_index {
        return print_index(&pipeline, config.report_file.as_deref()).await;
    }
    if config.preview {
        return preview(&pipeline).await;
    }

    // Interrupt watcher: flips the cancellation flag so the pipeline stops
    // dispatching new articles and aborts with the interrupt exit code.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; stopping the run");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    info!(
        journal = pipeline.connector().name(),
        destination = %config.options.destination,
        "starting archive run"
    );

    match pipeline.run(&cancel).await {
        Ok(report) => finish(&config, &report),
        Err(error) => {
            eprintln!("pubarchiver: {error}");
            error.exit_code()
        }
    }
}

/// Writes (or prints) the report and maps the completed run to its exit
/// code. The report is complete before the process exits; that plus the
/// exit code is the whole contract with downstream notification scripts.
fn finish(config: &RunConfig, report: &RunReport) -> i32 {
    let title = config.report_title.clone().unwrap_or_else(|| {
        format!(
            "{} {} archive run",
            config.options.journal.tag(),
            config.options.destination
        )
    });

    match &config.report_file {
        Some(path) => {
            if let Err(error) = write_report_files(path, &config.report_formats, &title, report) {
                eprintln!("pubarchiver: {error:#}");
                return EXIT_FATAL;
            }
        }
        None => match report.render_csv() {
            Ok(csv) => print!("{csv}"),
            Err(error) => {
                eprintln!("pubarchiver: {error}");
                return EXIT_FATAL;
            }
        },
    }

    info!(
        articles = report.outcomes().len(),
        failures = report.failure_count(),
        exit_code = report.exit_code(),
        "run complete"
    );
    report.exit_code()
}

fn write_report_files(
    base: &std::path::Path,
    formats: &[ReportFormat],
    title: &str,
    report: &RunReport,
) -> anyhow::Result<Vec<PathBuf>> {
    let written = write_reports(base, formats, Some(title), report)
        .with_context(|| format!("could not write report at {}", base.display()))?;
    for path in &written {
        info!(report = %path.display(), "wrote report");
    }
    Ok(written)
}

/// Index pass-through mode: print the journal's raw article-list XML to
/// stdout, or write it to the report path when one is given.
async fn print_index(pipeline: &Pipeline, report_file: Option<&std::path::Path>) -> i32 {
    match pipeline.connector().article_index().await {
        Ok(xml) => match report_file {
            Some(path) => {
                if let Err(error) = std::fs::write(path, &xml) {
                    eprintln!("pubarchiver: could not write {}: {error}", path.display());
                    return EXIT_FATAL;
                }
                info!(index = %path.display(), "wrote article list");
                0
            }
            None => {
                println!("{xml}");
                0
            }
        },
        Err(error) => {
            eprintln!("pubarchiver: could not fetch the article list: {error}");
            EXIT_FATAL
        }
    }
}

/// Preview mode: enumerate and filter articles, print what would be
/// archived, and touch neither the registries nor the filesystem.
async fn preview(pipeline: &Pipeline) -> i32 {
    match pipeline.enumerate().await {
        Ok(articles) => {
            print!("{}", preview_table(&articles));
            0
        }
        Err(error) => {
            eprintln!("pubarchiver: {error}");
            error.exit_code()
        }
    }
}
