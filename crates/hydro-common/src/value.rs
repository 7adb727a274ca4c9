//! Cell values and column types for the relational model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::Geometry;

/// A single cell of a [`Table`](crate::Table).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Blob(Vec<u8>),
    Geometry(Geometry),
}

impl Value {
    /// True for SQL null and for NaN reals.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Real(v) => v.is_nan(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Real(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&Geometry> {
        match self {
            Value::Geometry(g) => Some(g),
            _ => None,
        }
    }

    /// Numeric equality against a no-data sentinel. Non-numeric cells never match.
    pub fn equals_sentinel(&self, sentinel: f64) -> bool {
        match self {
            Value::Integer(v) => *v as f64 == sentinel,
            Value::Real(v) => *v == sentinel,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
            Value::Geometry(g) => write!(f, "<geometry srs={}>", g.srs_id().unwrap_or(-1)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Geometry> for Value {
    fn from(v: Geometry) -> Self {
        Value::Geometry(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Declared type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Timestamp,
    Blob,
    /// Geometry column; `type_name` is the GeoPackage geometry type (e.g. `POINT`).
    Geometry { type_name: String },
}

impl ColumnType {
    /// Infer a column type from a sample value. Nulls default to `Real`.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Null | Value::Real(_) => ColumnType::Real,
            Value::Integer(_) => ColumnType::Integer,
            Value::Text(_) => ColumnType::Text,
            Value::Timestamp(_) => ColumnType::Timestamp,
            Value::Blob(_) => ColumnType::Blob,
            Value::Geometry(g) => ColumnType::Geometry {
                type_name: g.geometry_type_name().unwrap_or("GEOMETRY").to_string(),
            },
        }
    }

    pub fn is_geometry(&self) -> bool {
        matches!(self, ColumnType::Geometry { .. })
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Real)
    }
}
