//! Common types and utilities shared across the reach-publisher crates.

pub mod error;
pub mod geometry;
pub mod table;
pub mod time;
pub mod value;

pub use error::{EtlError, EtlResult};
pub use geometry::{Geometry, GeometryHeader, SpatialRef};
pub use table::{Column, Table};
pub use time::{decode_cf_times, parse_timestamp, CfTimeUnits};
pub use value::{ColumnType, Value};

/// Name every spatial table uses for its single geometry column.
pub const CANONICAL_GEOMETRY_COLUMN: &str = "SHAPE";
