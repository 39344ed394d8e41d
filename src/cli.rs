//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ClusterParams, PipelineConfig, RegressionSpec};

/// EEOC workforce composition pipeline: extract, transform, cluster,
/// regress, evaluate and compare. Running without flags uses the default
/// `data/` layout.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory holding processed CSV files
    #[arg(long, default_value = "data/processed")]
    pub input_dir: PathBuf,

    /// Directory for the clustered, regional and comparison tables
    #[arg(long, default_value = "data/analysis")]
    pub analysis_dir: PathBuf,

    /// Directory for the silhouette and R² score files
    #[arg(long, default_value = "data/evaluation")]
    pub evaluation_dir: PathBuf,

    /// Directory for rendered charts
    #[arg(long, default_value = "data/outputs")]
    pub output_dir: PathBuf,

    /// Append-only stage log
    #[arg(long, default_value = "pipeline.log")]
    pub log_file: PathBuf,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long, default_value = "3")]
    pub clusters: usize,

    /// Seed for K-Means initialisation
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Rows sampled for the silhouette score (0 scores every row)
    #[arg(long, default_value = "10000")]
    pub silhouette_sample: usize,

    /// Regression target column
    #[arg(long, default_value = "Pct_White")]
    pub target: String,

    /// Comma-separated regression predictors; the region column expands
    /// into indicator variables
    #[arg(long, value_delimiter = ',', default_value = "Region")]
    pub predictors: Vec<String>,

    /// Static CSV of regional averages to compare clusters against
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Skip chart rendering
    #[arg(long)]
    pub no_charts: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Build the pipeline configuration these arguments describe
    pub fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            input_dir: self.input_dir.clone(),
            analysis_dir: self.analysis_dir.clone(),
            evaluation_dir: self.evaluation_dir.clone(),
            output_dir: self.output_dir.clone(),
            log_file: self.log_file.clone(),
            reference_file: self.reference.clone(),
            render_charts: !self.no_charts,
            clustering: ClusterParams {
                k: self.clusters,
                max_iterations: self.max_iters,
                tolerance: self.tolerance,
                seed: self.seed,
                silhouette_sample: (self.silhouette_sample > 0).then_some(self.silhouette_sample),
            },
            regression: RegressionSpec {
                target: self.target.clone(),
                predictors: self
                    .predictors
                    .iter()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
            },
            ..PipelineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_config_defaults() {
        let args = Args::parse_from(["eeoc-pipeline"]);
        let config = args.to_config();
        let defaults = PipelineConfig::default();

        assert_eq!(config.input_dir, defaults.input_dir);
        assert_eq!(config.evaluation_dir, defaults.evaluation_dir);
        assert_eq!(config.clustering, defaults.clustering);
        assert_eq!(config.regression, defaults.regression);
        assert!(config.render_charts);
        assert!(config.reference_file.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "eeoc-pipeline",
            "-k",
            "5",
            "--seed",
            "7",
            "--predictors",
            "Pct_Black, Pct_Asian",
            "--reference",
            "ref.csv",
            "--no-charts",
            "--silhouette-sample",
            "0",
        ]);
        let config = args.to_config();

        assert_eq!(config.clustering.k, 5);
        assert_eq!(config.clustering.seed, 7);
        assert_eq!(config.clustering.silhouette_sample, None);
        assert_eq!(config.regression.predictors, vec!["Pct_Black", "Pct_Asian"]);
        assert_eq!(config.reference_file, Some(PathBuf::from("ref.csv")));
        assert!(!config.render_charts);
    }
}
