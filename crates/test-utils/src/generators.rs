//! Generators for synthetic reach-model data.
//!
//! These produce predictable values so tests can assert on exact cells
//! after extraction, materialization and aggregation.

/// Creates a `(timesteps, reaches)` metric grid in row-major order.
///
/// Each cell value is calculated as: `reach * 100 + timestep`
///
/// so the per-reach maximum over time is always the last timestep.
///
/// # Example
///
/// ```
/// use test_utils::create_metric_grid;
///
/// let grid = create_metric_grid(4, 3);
/// assert_eq!(grid.len(), 12);
/// assert_eq!(grid[0], 0.0);   // t=0, reach=0
/// assert_eq!(grid[1], 100.0); // t=0, reach=1
/// assert_eq!(grid[3], 1.0);   // t=1, reach=0
/// ```
pub fn create_metric_grid(timesteps: usize, reaches: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(timesteps * reaches);
    for t in 0..timesteps {
        for r in 0..reaches {
            data.push((r * 100 + t) as f64);
        }
    }
    data
}

/// Creates a metric grid with no-data sentinels at the given `(timestep, reach)` cells.
pub fn create_grid_with_sentinels(
    timesteps: usize,
    reaches: usize,
    sentinel: f64,
    cells: &[(usize, usize)],
) -> Vec<f64> {
    let mut data = create_metric_grid(timesteps, reaches);
    for &(t, r) in cells {
        if t < timesteps && r < reaches {
            data[t * reaches + r] = sentinel;
        }
    }
    data
}

/// Per-reach threshold values: `base + reach`.
pub fn create_threshold_values(reaches: usize, base: f64) -> Vec<f64> {
    (0..reaches).map(|r| base + r as f64).collect()
}

/// Reach identifiers `start, start + 1, ...` as stored in NetCDF (floating point).
pub fn create_reach_ids(reaches: usize, start: i64) -> Vec<f64> {
    (0..reaches as i64).map(|r| (start + r) as f64).collect()
}

/// Hourly offsets `0, 1, 2, ...` to pair with `"hours since ..."` units.
pub fn create_hourly_offsets(timesteps: usize) -> Vec<f64> {
    (0..timesteps).map(|t| t as f64).collect()
}

/// A `(thresholds, reaches, windows)` exceedance cube.
///
/// Each cell value is calculated as: `threshold * 1000 + reach * 10 + window`
pub fn create_summary_cube(thresholds: usize, reaches: usize, windows: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(thresholds * reaches * windows);
    for i in 0..thresholds {
        for j in 0..reaches {
            for w in 0..windows {
                data.push((i * 1000 + j * 10 + w) as f64);
            }
        }
    }
    data
}
