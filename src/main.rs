//! EEOC pipeline entrypoint
//!
//! Parses arguments, sets up logging, runs every stage and prints a short
//! summary. Any stage failure exits non-zero.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use eeoc_pipeline::{run_pipeline, Args, BitmapRenderer, FileStageLog, PipelineReport};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.to_config();
    let log = FileStageLog::new(&config.log_file);

    println!("=== EEOC Workforce Pipeline ===\n");
    let start_time = Instant::now();

    let report = run_pipeline(&config, &log, &BitmapRenderer)
        .with_context(|| format!("pipeline failed; see {}", log.path().display()))?;

    print_summary(&report);
    println!("\n=== Pipeline Complete ===");
    println!(
        "Total processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

fn print_summary(report: &PipelineReport) {
    let transform = &report.transform;
    println!("✓ Input: {}", report.input_file.display());
    println!(
        "✓ Rows: {} read, {} kept ({} duplicates, {} missing, {} out of range)",
        transform.input_rows,
        transform.output_rows,
        transform.dropped_duplicates,
        transform.dropped_missing,
        transform.dropped_out_of_range
    );

    println!("\n=== Cluster Statistics ===");
    let total = transform.output_rows.max(1) as f64;
    for (i, &size) in report.cluster_sizes.iter().enumerate() {
        let percentage = size as f64 / total * 100.0;
        println!("Cluster {}: {} employers ({:.1}%)", i, size, percentage);
    }
    println!("Within-cluster sum of squares: {:.2}", report.inertia);
    match report.silhouette {
        Some(score) => println!("Silhouette score: {:.3}", score),
        None => println!("Silhouette score: undefined (single cluster)"),
    }

    let regression = &report.regression;
    println!("\n=== Regression ===");
    println!(
        "{} ~ {} ({} rows)",
        regression.target,
        regression.predictor_names.join(" + "),
        regression.n_rows
    );
    match regression.r2 {
        Some(r2) => println!("R² score: {:.3}", r2),
        None => println!("R² score: undefined (constant target)"),
    }

    println!("\nOutputs:");
    for path in report
        .evaluation_files
        .iter()
        .chain(&report.analysis_files)
        .chain(&report.chart_files)
    {
        println!("  {}", path.display());
    }
}
