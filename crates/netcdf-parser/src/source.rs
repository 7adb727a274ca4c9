//! Read access to named variables of a multi-dimensional dataset.

use hydro_common::{EtlError, EtlResult};

use crate::error::NetCdfResult;

/// A variable's values flattened in row-major order, with its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableData {
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl VariableData {
    pub fn new(shape: Vec<usize>, values: Vec<f64>) -> Self {
        Self { shape, values }
    }

    /// One-dimensional variable.
    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }

    /// Length of `axis`, or 0 when the variable has fewer dimensions.
    pub fn axis_len(&self, axis: usize) -> usize {
        self.shape.get(axis).copied().unwrap_or(0)
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of values the shape calls for.
    pub fn expected_len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Reject data whose value count disagrees with its shape.
    pub fn validate(self, name: &str) -> EtlResult<Self> {
        let expected = self.expected_len();
        if self.values.len() != expected {
            return Err(EtlError::shape_mismatch(
                name,
                "values",
                expected,
                self.values.len(),
            ));
        }
        Ok(self)
    }

    /// Number of values spanned by one step along the leading axis.
    pub fn leading_stride(&self) -> usize {
        self.shape.iter().skip(1).product::<usize>().max(1)
    }
}

/// Backend-neutral dataset access.
///
/// Implemented by the native NetCDF reader and by [`MemoryDataset`](crate::MemoryDataset).
/// Missing variables and attributes are `Ok(None)`; errors are reserved for
/// variables that exist but cannot be read.
pub trait VariableSource {
    /// Read a whole variable as `f64`, with fill values mapped to NaN.
    fn read_variable(&self, name: &str) -> NetCdfResult<Option<VariableData>>;

    /// Read a text attribute of a variable.
    fn text_attribute(&self, variable: &str, name: &str) -> NetCdfResult<Option<String>>;

    /// Length of a named dimension.
    fn dimension_len(&self, name: &str) -> Option<usize>;
}
