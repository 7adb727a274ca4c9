//! Layer specifiers.

use std::fmt;
use std::str::FromStr;

use hydro_common::{EtlError, EtlResult};

/// Names a table inside a container, by name or by position in `gpkg_contents`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LayerRef {
    Name(String),
    Index(usize),
}

impl LayerRef {
    /// Parse a specifier: all-digit strings are indices, anything else a name.
    ///
    /// Blank specifiers are rejected with `InvalidJoinKey`.
    pub fn parse(spec: &str) -> EtlResult<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(EtlError::InvalidJoinKey(
                "empty layer specifier".to_string(),
            ));
        }
        if spec.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = spec.parse() {
                return Ok(LayerRef::Index(index));
            }
        }
        Ok(LayerRef::Name(spec.to_string()))
    }

    pub fn name(name: impl Into<String>) -> Self {
        LayerRef::Name(name.into())
    }
}

impl FromStr for LayerRef {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LayerRef::parse(s)
    }
}

impl From<&str> for LayerRef {
    fn from(name: &str) -> Self {
        LayerRef::Name(name.to_string())
    }
}

impl From<usize> for LayerRef {
    fn from(index: usize) -> Self {
        LayerRef::Index(index)
    }
}

impl fmt::Display for LayerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerRef::Name(name) => write!(f, "{}", name),
            LayerRef::Index(index) => write!(f, "#{}", index),
        }
    }
}
