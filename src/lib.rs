pub mod checkpoint;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod download;
pub mod features;
pub mod matrix;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod utils;

pub use checkpoint::{CheckpointStore, ClusteringSet, FeatureSet, ProgressState};
pub use config::Opts;
pub use pipeline::{ComparisonRow, Pipeline};
