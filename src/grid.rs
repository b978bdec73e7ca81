use std::sync::Arc;

use ndarray::Array3;

use crate::{
    error::{IsosurfaceError, Result},
    tables::CORNER_OFFSETS,
    types::{CompiledFunction, Point, Value, Vector},
};

/// Axis-aligned physical extent of a [`ScalarGrid`].
///
/// The grid spans the box inclusively: sample `0` sits on `min` and sample `N - 1` on `max`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    /// Creates bounds, rejecting any axis where `max <= min` or either end is not finite.
    pub fn new(min: Point, max: Point) -> Result<Self> {
        for axis in 0..3 {
            let (lo, hi) = (min[axis], max[axis]);
            if !lo.is_finite() || !hi.is_finite() || hi <= lo {
                return Err(IsosurfaceError::InvalidBounds {
                    axis,
                    min: lo,
                    max: hi,
                });
            }
        }
        Ok(Self { min, max })
    }

    /// Returns the `[min, max]` bounds given a `center` point and box dimensions.
    pub fn centered(center: Point, dims: Vector) -> Result<Self> {
        Self::new(center - dims / 2.0, center + dims / 2.0)
    }

    /// Per-axis distance between neighbouring samples of a grid with `resolution` samples per axis.
    #[inline]
    pub fn step(&self, resolution: usize) -> Vector {
        (self.max - self.min) / (resolution - 1) as Value
    }

    /// Physical position of grid sample `(i, j, k)`.
    #[inline]
    pub fn position(&self, resolution: usize, i: usize, j: usize, k: usize) -> Point {
        let step = self.step(resolution);
        Point::new(
            self.min.x + i as Value * step.x,
            self.min.y + j as Value * step.y,
            self.min.z + k as Value * step.z,
        )
    }
}

/// A cubic grid of scalar samples with `resolution` points per axis.
///
/// Samples are indexed `values[[i, j, k]]` in row-major order with `i` slowest, so the
/// flat buffer index is `i*N*N + j*N + k`. `values` is wrapped in an [`Arc`] so worker
/// tasks (and both lobes of one orbital) can read the grid without copying it; the grid
/// is never mutated once built.
#[derive(Clone, Debug)]
pub struct ScalarGrid {
    /// Number of samples along each axis.
    pub resolution: usize,
    /// Physical extent covered by the samples.
    pub bounds: Bounds,
    /// Scalar field values, indexed `[i, j, k]`.
    pub values: Arc<Array3<Value>>,
}

impl ScalarGrid {
    /// Wraps a flat sample buffer of length `resolution³`.
    pub fn new(data: Vec<Value>, resolution: usize, bounds: Bounds) -> Result<Self> {
        if resolution < 2 {
            return Err(IsosurfaceError::ResolutionTooSmall(resolution));
        }
        let bounds = Bounds::new(bounds.min, bounds.max)?;

        // `from_shape_vec` is the only length check.
        let actual = data.len();
        let values = Array3::from_shape_vec((resolution, resolution, resolution), data).map_err(
            |_| IsosurfaceError::GridLength {
                resolution,
                expected: resolution.checked_pow(3).unwrap_or(usize::MAX),
                actual,
            },
        )?;
        Ok(Self {
            resolution,
            bounds,
            values: Arc::new(values),
        })
    }

    /// Samples `function` at the physical position of every grid point.
    pub fn from_fn(
        resolution: usize,
        bounds: Bounds,
        function: &CompiledFunction<'_>,
    ) -> Result<Self> {
        if resolution < 2 {
            return Err(IsosurfaceError::ResolutionTooSmall(resolution));
        }
        let bounds = Bounds::new(bounds.min, bounds.max)?;
        let values = Array3::from_shape_fn((resolution, resolution, resolution), |(i, j, k)| {
            function(bounds.position(resolution, i, j, k))
        });
        Ok(Self {
            resolution,
            bounds,
            values: Arc::new(values),
        })
    }

    /// Returns the scalar field value at sample `(i, j, k)`.
    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> Value {
        self.values[[i, j, k]]
    }

    /// Number of cells along each axis.
    #[inline]
    pub fn cells_per_axis(&self) -> usize {
        self.resolution - 1
    }

    /// Total number of cells, `(N - 1)³`.
    pub fn cell_count(&self) -> usize {
        self.cells_per_axis().pow(3)
    }

    /// Returns the 8 sample indices `[i, j, k]` of the cell at `(i, j, k)`.
    ///
    /// Corners follow the ordering of [`CORNER_OFFSETS`]:
    ///
    /// ```text
    ///  0 = (i,   j,   k  )    4 = (i,   j+1, k  )
    ///  1 = (i+1, j,   k  )    5 = (i+1, j+1, k  )
    ///  2 = (i+1, j,   k+1)    6 = (i+1, j+1, k+1)
    ///  3 = (i,   j,   k+1)    7 = (i,   j+1, k+1)
    /// ```
    #[inline]
    pub fn cell_corner_indices(&self, i: usize, j: usize, k: usize) -> [[usize; 3]; 8] {
        CORNER_OFFSETS.map(|[di, dj, dk]| [i + di, j + dj, k + dk])
    }

    /// Sample values at the 8 corners of cell `(i, j, k)`.
    #[inline]
    pub fn cell_corner_values(&self, i: usize, j: usize, k: usize) -> [Value; 8] {
        self.cell_corner_indices(i, j, k)
            .map(|[ci, cj, ck]| self.values[[ci, cj, ck]])
    }

    /// Physical positions of the 8 corners of cell `(i, j, k)`.
    #[inline]
    pub fn cell_corner_positions(&self, i: usize, j: usize, k: usize) -> [Point; 8] {
        self.cell_corner_indices(i, j, k)
            .map(|[ci, cj, ck]| self.bounds.position(self.resolution, ci, cj, ck))
    }

    /// Smallest and largest finite sample, or `None` when no sample is finite.
    pub fn value_range(&self) -> Option<(Value, Value)> {
        self.values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |range, v| match range {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_bounds() -> Bounds {
        Bounds::new(Point::origin(), Point::new(1.0, 1.0, 1.0)).unwrap()
    }

    #[test]
    fn flat_layout_has_i_slowest() {
        let data: Vec<Value> = (0..27).map(|v| v as Value).collect();
        let grid = ScalarGrid::new(data, 3, unit_bounds()).unwrap();
        assert_eq!(grid.get(1, 0, 0), 9.0);
        assert_eq!(grid.get(0, 1, 0), 3.0);
        assert_eq!(grid.get(0, 0, 1), 1.0);
        assert_eq!(grid.get(2, 1, 2), 23.0);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let err = ScalarGrid::new(vec![0.0; 26], 3, unit_bounds()).unwrap_err();
        assert!(matches!(
            err,
            IsosurfaceError::GridLength {
                resolution: 3,
                expected: 27,
                actual: 26
            }
        ));
    }

    #[test]
    fn oversized_buffer_is_rejected() {
        let err = ScalarGrid::new(vec![0.0; 9], 2, unit_bounds()).unwrap_err();
        assert!(matches!(
            err,
            IsosurfaceError::GridLength {
                resolution: 2,
                expected: 8,
                actual: 9
            }
        ));
    }

    #[test]
    fn from_fn_accepts_borrowing_closures() {
        // Coefficients owned by the caller, as when sampling an orbital expansion.
        let coefficients = vec![0.5, -2.0, 3.0];
        let field = |p: Point| {
            coefficients[0] * p.x + coefficients[1] * p.y + coefficients[2] * p.z
        };
        let grid = ScalarGrid::from_fn(2, unit_bounds(), &field).unwrap();
        assert_relative_eq!(grid.get(1, 1, 1), 1.5);
        assert_relative_eq!(grid.get(0, 1, 0), -2.0);
        assert_eq!(coefficients.len(), 3);
    }

    #[test]
    fn single_sample_grid_is_rejected() {
        let err = ScalarGrid::new(vec![0.0], 1, unit_bounds()).unwrap_err();
        assert!(matches!(err, IsosurfaceError::ResolutionTooSmall(1)));
    }

    #[test]
    fn inverted_or_flat_bounds_are_rejected() {
        let err = Bounds::new(Point::new(0.0, 1.0, 0.0), Point::new(1.0, 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, IsosurfaceError::InvalidBounds { axis: 1, .. }));

        let err = Bounds::new(Point::new(0.0, 0.0, 2.0), Point::new(1.0, 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, IsosurfaceError::InvalidBounds { axis: 2, .. }));

        let nan = Point::new(Value::NAN, 0.0, 0.0);
        let err = Bounds::new(nan, Point::new(1.0, 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, IsosurfaceError::InvalidBounds { axis: 0, .. }));
    }

    #[test]
    fn samples_span_the_box_inclusively() {
        let bounds = Bounds::new(Point::new(-3.0, -2.0, -1.0), Point::new(3.0, 2.0, 1.0)).unwrap();
        assert_eq!(bounds.position(5, 0, 0, 0), bounds.min);
        let last = bounds.position(5, 4, 4, 4);
        assert_relative_eq!(last, bounds.max, epsilon = 1e-6);
        let step = bounds.step(5);
        assert_relative_eq!(step, Vector::new(1.5, 1.0, 0.5));
    }

    #[test]
    fn from_fn_samples_physical_positions() {
        let bounds = Bounds::centered(Point::origin(), Vector::new(2.0, 2.0, 2.0)).unwrap();
        let grid = ScalarGrid::from_fn(3, bounds, &|p: Point| p.x + 10.0 * p.y + 100.0 * p.z).unwrap();
        assert_relative_eq!(grid.get(0, 0, 0), -111.0);
        assert_relative_eq!(grid.get(1, 1, 1), 0.0);
        assert_relative_eq!(grid.get(2, 0, 1), -9.0);
    }

    #[test]
    fn cell_corners_follow_table_order() {
        let data: Vec<Value> = (0..8).map(|v| v as Value).collect();
        let grid = ScalarGrid::new(data, 2, unit_bounds()).unwrap();
        // linear index = 4i + 2j + k
        assert_eq!(
            grid.cell_corner_values(0, 0, 0),
            [0.0, 4.0, 5.0, 1.0, 2.0, 6.0, 7.0, 3.0]
        );
        let positions = grid.cell_corner_positions(0, 0, 0);
        assert_eq!(positions[2], Point::new(1.0, 0.0, 1.0));
        assert_eq!(positions[7], Point::new(0.0, 1.0, 1.0));
    }

    #[test]
    fn value_range_ignores_nan() {
        let mut data = vec![0.5; 8];
        data[3] = Value::NAN;
        data[4] = -2.0;
        let grid = ScalarGrid::new(data, 2, unit_bounds()).unwrap();
        assert_eq!(grid.value_range(), Some((-2.0, 0.5)));
        assert_eq!(grid.cell_count(), 1);
    }
}
