//! Typed, shape-validated view of a river-reach model output file.
//!
//! The dataset carries per-timestep metric grids of shape `(time, nrch)`,
//! per-reach return-period thresholds of shape `(nrch,)`, and the reach
//! coordinates `rchid` / `streamorder`. [`ReachDataset::from_source`] rejects
//! malformed input up front so later stages can index without checks.

use chrono::{DateTime, Utc};
use hydro_common::{decode_cf_times, EtlError, EtlResult};
use tracing::{debug, info};

use crate::source::{VariableData, VariableSource};

pub const TIME_VARIABLE: &str = "time";
pub const REACH_ID_VARIABLE: &str = "rchid";
pub const STREAM_ORDER_VARIABLE: &str = "streamorder";
pub const REACH_DIMENSION: &str = "nrch";

/// Time-varying metric variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    AbsoluteValues,
    AbsoluteValues25th,
    AbsoluteValues5th,
    AbsoluteValues75th,
    AbsoluteValues95th,
    AbsoluteValuesMedian,
    RelativeValues,
    RelativeValues25th,
    RelativeValues5th,
    RelativeValues75th,
    RelativeValues95th,
    RelativeValuesMedian,
}

impl Metric {
    pub const ALL: [Metric; 12] = [
        Metric::AbsoluteValues,
        Metric::AbsoluteValues25th,
        Metric::AbsoluteValues5th,
        Metric::AbsoluteValues75th,
        Metric::AbsoluteValues95th,
        Metric::AbsoluteValuesMedian,
        Metric::RelativeValues,
        Metric::RelativeValues25th,
        Metric::RelativeValues5th,
        Metric::RelativeValues75th,
        Metric::RelativeValues95th,
        Metric::RelativeValuesMedian,
    ];

    /// Variable name in the NetCDF file.
    pub fn variable_name(&self) -> &'static str {
        match self {
            Metric::AbsoluteValues => "absoluteValues",
            Metric::AbsoluteValues25th => "absoluteValues25thPercentile",
            Metric::AbsoluteValues5th => "absoluteValues5thPercentile",
            Metric::AbsoluteValues75th => "absoluteValues75thPercentile",
            Metric::AbsoluteValues95th => "absoluteValues95thPercentile",
            Metric::AbsoluteValuesMedian => "absoluteValuesMedian",
            Metric::RelativeValues => "relativeValues",
            Metric::RelativeValues25th => "relativeValues25thPercentile",
            Metric::RelativeValues5th => "relativeValues5thPercentile",
            Metric::RelativeValues75th => "relativeValues75thPercentile",
            Metric::RelativeValues95th => "relativeValues95thPercentile",
            Metric::RelativeValuesMedian => "relativeValuesMedian",
        }
    }

    /// Column name in the materialized table (lower-cased variable name).
    pub fn column_name(&self) -> &'static str {
        match self {
            Metric::AbsoluteValues => "absolutevalues",
            Metric::AbsoluteValues25th => "absolutevalues25thpercentile",
            Metric::AbsoluteValues5th => "absolutevalues5thpercentile",
            Metric::AbsoluteValues75th => "absolutevalues75thpercentile",
            Metric::AbsoluteValues95th => "absolutevalues95thpercentile",
            Metric::AbsoluteValuesMedian => "absolutevaluesmedian",
            Metric::RelativeValues => "relativevalues",
            Metric::RelativeValues25th => "relativevalues25thpercentile",
            Metric::RelativeValues5th => "relativevalues5thpercentile",
            Metric::RelativeValues75th => "relativevalues75thpercentile",
            Metric::RelativeValues95th => "relativevalues95thpercentile",
            Metric::RelativeValuesMedian => "relativevaluesmedian",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Per-reach return-period thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Threshold {
    TenYear,
    TwentyYear,
    TwoYear,
    FiveYear,
}

impl Threshold {
    pub const ALL: [Threshold; 4] = [
        Threshold::TenYear,
        Threshold::TwentyYear,
        Threshold::TwoYear,
        Threshold::FiveYear,
    ];

    /// Variable name in the file; also the column name.
    pub fn variable_name(&self) -> &'static str {
        match self {
            Threshold::TenYear => "relative_thresholds_10yr",
            Threshold::TwentyYear => "relative_thresholds_20yr",
            Threshold::TwoYear => "relative_thresholds_2yr",
            Threshold::FiveYear => "relative_thresholds_5yr",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// How the `nrch` value of each row is sourced.
#[derive(Debug, Clone, PartialEq)]
pub enum ReachIndex {
    /// `nrch` coordinate variable: one value per reach.
    Values(Vec<i64>),
    /// Only the `nrch` dimension exists: its length is broadcast to every row.
    Count(usize),
}

impl ReachIndex {
    pub fn value_for(&self, reach: usize) -> i64 {
        match self {
            ReachIndex::Values(v) => v.get(reach).copied().unwrap_or(reach as i64),
            ReachIndex::Count(n) => *n as i64,
        }
    }
}

/// A `(time, nrch)` grid in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricGrid {
    timesteps: usize,
    reaches: usize,
    values: Vec<f64>,
}

impl MetricGrid {
    /// Values for every reach at one timestep.
    pub fn timestep(&self, t: usize) -> &[f64] {
        let start = t * self.reaches;
        &self.values[start..start + self.reaches]
    }

    pub fn get(&self, t: usize, reach: usize) -> f64 {
        self.values[t * self.reaches + reach]
    }

    pub fn timesteps(&self) -> usize {
        self.timesteps
    }
}

/// Shape-validated extraction result.
#[derive(Debug, Clone)]
pub struct ReachDataset {
    times: Vec<DateTime<Utc>>,
    reach_ids: Vec<i64>,
    stream_orders: Vec<i64>,
    nrch: ReachIndex,
    metrics: Vec<MetricGrid>,
    thresholds: Vec<Vec<f64>>,
}

impl ReachDataset {
    /// Extract and validate every required variable.
    ///
    /// Fails with `MissingVariable` for an absent variable and `ShapeMismatch`
    /// when a variable holds a different number of values than its shape
    /// declares, a metric's leading axis differs from the timestep count, or a
    /// threshold's leading axis differs from the reach count.
    pub fn from_source<S: VariableSource + ?Sized>(source: &S) -> EtlResult<Self> {
        let times = read_times(source)?;
        let timesteps = times.len();

        let reach_ids = as_integers(&require(source, REACH_ID_VARIABLE)?);
        let reaches = reach_ids.len();

        let stream_orders = as_integers(&require(source, STREAM_ORDER_VARIABLE)?);
        if stream_orders.len() != reaches {
            return Err(EtlError::shape_mismatch(
                STREAM_ORDER_VARIABLE,
                "reach",
                reaches,
                stream_orders.len(),
            ));
        }

        let nrch = match source.read_variable(REACH_DIMENSION)? {
            Some(data) => ReachIndex::Values(as_integers(&data.validate(REACH_DIMENSION)?)),
            None => ReachIndex::Count(
                source
                    .dimension_len(REACH_DIMENSION)
                    .ok_or_else(|| EtlError::MissingVariable(REACH_DIMENSION.to_string()))?,
            ),
        };

        let mut metrics = Vec::with_capacity(Metric::ALL.len());
        for metric in Metric::ALL {
            let name = metric.variable_name();
            let data = require(source, name)?;
            debug!(variable = name, shape = ?data.shape, "Read metric variable");

            if data.axis_len(0) != timesteps {
                return Err(EtlError::shape_mismatch(name, "time", timesteps, data.axis_len(0)));
            }
            if data.rank() != 2 || data.axis_len(1) != reaches {
                return Err(EtlError::shape_mismatch(name, "reach", reaches, data.axis_len(1)));
            }

            metrics.push(MetricGrid {
                timesteps,
                reaches,
                values: data.values,
            });
        }

        let mut thresholds = Vec::with_capacity(Threshold::ALL.len());
        for threshold in Threshold::ALL {
            let name = threshold.variable_name();
            let data = require(source, name)?;
            debug!(variable = name, shape = ?data.shape, "Read threshold variable");

            if data.axis_len(0) != reaches {
                return Err(EtlError::shape_mismatch(name, "reach", reaches, data.axis_len(0)));
            }

            let stride = data.leading_stride();
            thresholds.push((0..reaches).map(|j| data.values[j * stride]).collect());
        }

        info!(timesteps, reaches, "Extracted reach dataset");

        Ok(Self {
            times,
            reach_ids,
            stream_orders,
            nrch,
            metrics,
            thresholds,
        })
    }

    pub fn timestep_count(&self) -> usize {
        self.times.len()
    }

    pub fn reach_count(&self) -> usize {
        self.reach_ids.len()
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn reach_ids(&self) -> &[i64] {
        &self.reach_ids
    }

    pub fn stream_orders(&self) -> &[i64] {
        &self.stream_orders
    }

    pub fn nrch(&self) -> &ReachIndex {
        &self.nrch
    }

    pub fn metric(&self, metric: Metric) -> &MetricGrid {
        &self.metrics[metric.index()]
    }

    pub fn threshold(&self, threshold: Threshold) -> &[f64] {
        &self.thresholds[threshold.index()]
    }
}

fn read_times<S: VariableSource + ?Sized>(source: &S) -> EtlResult<Vec<DateTime<Utc>>> {
    let time = require(source, TIME_VARIABLE)?;
    let units = source
        .text_attribute(TIME_VARIABLE, "units")?
        .ok_or_else(|| EtlError::MissingVariable(format!("{}:units", TIME_VARIABLE)))?;
    decode_cf_times(&time.values, &units)
}

fn require<S: VariableSource + ?Sized>(source: &S, name: &str) -> EtlResult<VariableData> {
    source
        .read_variable(name)?
        .ok_or_else(|| EtlError::MissingVariable(name.to_string()))?
        .validate(name)
}

fn as_integers(data: &VariableData) -> Vec<i64> {
    let stride = data.leading_stride();
    (0..data.axis_len(0))
        .map(|i| data.values[i * stride] as i64)
        .collect()
}
