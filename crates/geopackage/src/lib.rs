//! GeoPackage reading and writing.
//!
//! A GeoPackage is an SQLite file with a few metadata tables
//! (`gpkg_spatial_ref_sys`, `gpkg_contents`, `gpkg_geometry_columns`) and one
//! user table per layer. [`GeoPackage`] reads and writes raw layers;
//! [`write_layer`] normalizes a table to the single `SHAPE` geometry column
//! expected by downstream consumers before writing it.

mod container;
mod layer;
mod normalize;
pub mod schema;
mod writer;

pub use container::{GeoPackage, LayerInfo};
pub use layer::LayerRef;
pub use normalize::normalize_geometry;
pub use writer::{read_layer, remove_container, write_layer, WriteMode};
