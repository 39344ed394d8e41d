//! Integration tests for the EEOC pipeline

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

use eeoc_pipeline::{
    read_metric, run_pipeline, BitmapRenderer, FileStageLog, MemoryStageLog, PipelineConfig,
    PipelineError, PipelineState, Stage, StageStatus,
};
use tempfile::tempdir;

const REGIONS: [&str; 4] = ["Midwest", "Northeast", "South", "West"];

/// 100 employers in three demographic profiles over four balanced features
fn write_synthetic_dataset(root: &Path) {
    let processed = root.join("processed");
    std::fs::create_dir_all(&processed).unwrap();

    let profiles = [
        [70.0, 10.0, 12.0, 8.0],
        [25.0, 45.0, 20.0, 10.0],
        [20.0, 10.0, 35.0, 35.0],
    ];
    let mut csv = String::from("Employer_ID,Region,Pct_White,Pct_Black,Pct_Hispanic,Pct_Asian\n");
    for i in 0..100 {
        let profile = profiles[i % 3];
        // Deterministic spread of up to +/-2 points per feature
        let jitter = |j: usize| (((i * 7 + j * 13) % 9) as f64 - 4.0) * 0.5;
        csv.push_str(&format!(
            "EMP{i:03},{},{:.2},{:.2},{:.2},{:.2}\n",
            REGIONS[i % 4],
            profile[0] + jitter(0),
            profile[1] + jitter(1),
            profile[2] + jitter(2),
            profile[3] + jitter(3),
        ));
    }
    std::fs::write(processed.join("transformed_eeoc_synthetic.csv"), csv).unwrap();
    // Not a candidate: wrong prefix
    std::fs::write(processed.join("missing_values_summary.csv"), "col,missing\n").unwrap();
}

fn test_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::rooted_at(root);
    config.render_charts = false;
    config
}

#[test]
fn test_end_to_end_pipeline() {
    let dir = tempdir().unwrap();
    write_synthetic_dataset(dir.path());
    let config = test_config(dir.path());
    let log = FileStageLog::new(&config.log_file);

    let report = run_pipeline(&config, &log, &BitmapRenderer).unwrap();

    assert_eq!(report.state.current(), PipelineState::Done);
    assert_eq!(report.transform.input_rows, 100);
    assert_eq!(report.transform.output_rows, 100);

    // Exactly three distinct labels covering 0..3
    let labels: BTreeSet<usize> = report.cluster_labels.iter().copied().collect();
    assert_eq!(labels, BTreeSet::from([0, 1, 2]));
    assert_eq!(report.cluster_sizes.iter().sum::<usize>(), 100);

    let silhouette = report.silhouette.unwrap();
    assert!((-1.0..=1.0).contains(&silhouette));

    // Both evaluation files present, non-empty and matching the report
    let silhouette_file = config.evaluation_dir.join("silhouette_score.txt");
    let r2_file = config.evaluation_dir.join("regression_r2.txt");
    for path in [&silhouette_file, &r2_file] {
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(!contents.trim().is_empty());
    }
    let read_back = read_metric(&silhouette_file).unwrap().unwrap();
    assert!((read_back - silhouette).abs() < 1e-9);
    let r2 = read_metric(&r2_file).unwrap().unwrap();
    assert!(r2 <= 1.0);
    assert!((r2 - report.regression.r2.unwrap()).abs() < 1e-9);

    // Clustered output keeps the original columns and adds the label
    let clustered =
        std::fs::read_to_string(config.analysis_dir.join("clustered_employers.csv")).unwrap();
    let mut lines = clustered.lines();
    assert_eq!(
        lines.next().unwrap(),
        "Employer_ID,Region,Pct_White,Pct_Black,Pct_Hispanic,Pct_Asian,Cluster"
    );
    assert_eq!(lines.count(), 100);

    let regional =
        std::fs::read_to_string(config.analysis_dir.join("comparative_region.csv")).unwrap();
    assert_eq!(regional.lines().count(), 1 + REGIONS.len());
    assert!(config.analysis_dir.join("cluster_region_comparison.csv").exists());
    assert!(config.analysis_dir.join("descriptive_stats.csv").exists());

    // One start and one success line per stage
    let log_contents = std::fs::read_to_string(&config.log_file).unwrap();
    assert_eq!(log_contents.lines().count(), 12);
    assert!(!log_contents.contains(" error "));
}

#[test]
fn test_empty_input_directory_fails_in_extract() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("processed")).unwrap();
    let config = test_config(dir.path());
    let log = FileStageLog::new(&config.log_file);

    let err = run_pipeline(&config, &log, &BitmapRenderer).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Extract));
    assert!(matches!(err.root(), PipelineError::NotFound(_)));

    let log_contents = std::fs::read_to_string(&config.log_file).unwrap();
    let fatal: Vec<&str> = log_contents
        .lines()
        .filter(|line| line.contains(" error "))
        .collect();
    assert_eq!(fatal.len(), 1);
    assert!(fatal[0].contains(" extract error "));
    assert!(!config.evaluation_dir.exists());
}

#[test]
fn test_binary_exits_non_zero_on_missing_input() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("processed");
    std::fs::create_dir_all(&input).unwrap();
    let log_file = dir.path().join("pipeline.log");

    let status = Command::new(env!("CARGO_BIN_EXE_eeoc-pipeline"))
        .arg("--input-dir")
        .arg(&input)
        .arg("--analysis-dir")
        .arg(dir.path().join("analysis"))
        .arg("--evaluation-dir")
        .arg(dir.path().join("evaluation"))
        .arg("--output-dir")
        .arg(dir.path().join("outputs"))
        .arg("--log-file")
        .arg(&log_file)
        .arg("--no-charts")
        .output()
        .unwrap()
        .status;

    assert!(!status.success());
    let log_contents = std::fs::read_to_string(&log_file).unwrap();
    assert_eq!(log_contents.lines().filter(|l| l.contains(" error ")).count(), 1);
}

#[test]
fn test_fixed_seed_reproduces_assignments() {
    let dir = tempdir().unwrap();
    write_synthetic_dataset(dir.path());
    let config = test_config(dir.path());

    let first = run_pipeline(&config, &MemoryStageLog::new(), &BitmapRenderer).unwrap();
    let second = run_pipeline(&config, &MemoryStageLog::new(), &BitmapRenderer).unwrap();

    assert_eq!(first.cluster_labels, second.cluster_labels);
    assert_eq!(first.silhouette, second.silhouette);
}

#[test]
fn test_single_cluster_reports_undefined_silhouette() {
    let dir = tempdir().unwrap();
    write_synthetic_dataset(dir.path());
    let mut config = test_config(dir.path());
    config.clustering.k = 1;

    let report = run_pipeline(&config, &MemoryStageLog::new(), &BitmapRenderer).unwrap();
    assert!(report.silhouette.is_none());

    let path = config.evaluation_dir.join("silhouette_score.txt");
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "silhouette_score: undefined\n"
    );
    assert_eq!(read_metric(&path).unwrap(), None);
}

#[test]
fn test_raw_headcounts_are_cleaned_and_counted() {
    let dir = tempdir().unwrap();
    let processed = dir.path().join("processed");
    std::fs::create_dir_all(&processed).unwrap();

    let mut csv = String::from("Region,TOTAL10,WHT10,BLKT10,HISPT10,ASIANT10\n");
    for i in 0..24 {
        let total = 100 + i;
        let white = if i % 2 == 0 { 80 } else { 20 };
        csv.push_str(&format!(
            "{},{total},{white},{},{},{}\n",
            REGIONS[i % 4],
            10,
            5,
            3
        ));
    }
    // Duplicate, missing total and a count above the total
    csv.push_str("Midwest,100,80,10,5,3\n");
    csv.push_str("West,,80,10,5,3\n");
    csv.push_str("South,50,80,10,5,3\n");
    std::fs::write(processed.join("transformed_raw.csv"), csv).unwrap();

    let mut config = test_config(dir.path());
    config.clustering.k = 2;
    let log = MemoryStageLog::new();

    let report = run_pipeline(&config, &log, &BitmapRenderer).unwrap();
    assert_eq!(report.transform.input_rows, 27);
    assert_eq!(report.transform.dropped_duplicates, 1);
    assert_eq!(report.transform.dropped_missing, 1);
    assert_eq!(report.transform.dropped_out_of_range, 1);
    assert_eq!(report.transform.output_rows, 24);
    assert_eq!(report.cluster_sizes, vec![12, 12]);

    let transform_success = log
        .events()
        .into_iter()
        .find(|e| e.stage == Stage::Transform && e.status == StageStatus::Success)
        .unwrap();
    assert!(transform_success.message.contains("before=27 after=24"));
}
