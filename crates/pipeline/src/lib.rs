//! Reach-model ETL library.
//!
//! Turns gridded reach model output into published river-line layers.
//!
//! # Architecture
//!
//! Both stages run inside a [`RunContext`] built once per process:
//!
//! - Stage 1 ([`run_stage_one`]): NetCDF extraction, per-reach aggregation,
//!   sentinel cleaning, reference joins, and the threshold summary upload
//! - Stage 2 ([`run_stage_two`]): summary/lookup join, grouped reduction,
//!   and the final river-line layer
//!
//! Relational steps run as DataFusion SQL over arrow record batches
//! ([`SqlFrames`]). Containers are written with the `geopackage` crate and
//! published through the `publisher` crate's
//! [`FeatureHost`](publisher::FeatureHost).

pub mod config;
pub mod context;
pub mod extract;
pub mod frame;
pub mod join;
pub mod materialize;
pub mod reduce;
mod response;
pub mod stage_one;
pub mod stage_two;
pub mod transform;

// Re-exports
pub use config::PipelineConfig;
pub use context::{HostCredentials, RunContext, RunDir};
pub use extract::{build_tables, load_reach_tables, DatasetLoader, NetCdfLoader, ReachTables};
pub use frame::SqlFrames;
pub use join::{join, join_container_layers, join_reference, JoinKind, ReferenceJoin};
pub use materialize::{materialize, ReachRow};
pub use reduce::max_per_group;
pub use response::RunResponse;
pub use stage_one::run_stage_one;
pub use stage_two::run_stage_two;
pub use transform::{aggregate, clean, round_metric_columns, DEFAULT_SENTINELS};
