//! Publishing GeoPackages to a GIS hosting platform.
//!
//! The platform sits behind [`FeatureHost`]; [`RepublishTracker`] keeps one
//! live item per logical name across runs.

pub mod host;
pub mod layer;
pub mod memory;
pub mod poll;
pub mod tracker;

pub use host::{FeatureHost, HostedItem, ItemSpec, JobStatus, LoadJob};
pub use layer::{refresh_layer, LayerRefresh};
pub use memory::{LayerLoad, MemoryFeatureHost};
pub use poll::{wait_for_load, PollPolicy};
pub use tracker::RepublishTracker;
