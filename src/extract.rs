use std::time::Instant;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::debug;

use crate::{
    error::{IsosurfaceError, Result},
    grid::ScalarGrid,
    mesh::IsoMesh,
    types::Value,
    utils::{get_edge_points, get_state, is_empty_state, triangles_from_state},
};

/// Runs the marching cubes algorithm over `grid` at `isovalue`.
///
/// Cells are visited with `i` outermost, then `j`, then `k`. Work is parallelised over
/// `i` slabs using Rayon and the slabs are stitched back in `i` order, so the output is
/// identical to a sequential pass.
///
/// ```text
/// Per cell:
/// 1. cell_corner_values      →  8 scalar samples
/// 2. get_state               →  256-entry lookup key (0 and 255 skipped)
/// 3. cell_corner_positions   →  8 physical points
/// 4. get_edge_points         →  points on the edges flagged by EDGE_TABLE
/// 5. triangles_from_state    →  triangles from TRI_TABLE
/// 6. IsoMesh::push_triangle  →  positions + replicated face normal
/// ```
pub fn extract_isosurface(grid: &ScalarGrid, isovalue: Value) -> Result<IsoMesh> {
    validate(grid, isovalue)?;

    let started = Instant::now();
    let cells = grid.cells_per_axis();

    let slabs: Vec<IsoMesh> = (0..cells)
        .into_par_iter()
        .map(|i| -> Result<IsoMesh> {
            let mut local = IsoMesh::new_empty();
            for j in 0..cells {
                for k in 0..cells {
                    extract_cell(grid, i, j, k, isovalue, &mut local)?;
                }
            }
            Ok(local)
        })
        .collect::<Result<_>>()?;

    // Merge per-i slabs into a single buffer. Each slab is freed as soon as it is moved,
    // so the peak is the output plus the slabs not yet merged.
    let total: usize = slabs.iter().map(|s| s.vertices.len()).sum();
    let mut slabs = slabs.into_iter().filter(|s| !s.is_empty());
    let mut mesh = slabs.next().unwrap_or_default();
    let additional = total - mesh.vertices.len();
    mesh.vertices
        .try_reserve_exact(additional)
        .and_then(|_| mesh.normals.try_reserve_exact(additional))
        .map_err(|_| IsosurfaceError::OutOfMemory(total))?;
    for mut slab in slabs {
        mesh.append(&mut slab)?;
    }

    debug!(
        resolution = grid.resolution,
        isovalue,
        triangles = mesh.triangle_count(),
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "extracted isosurface"
    );

    Ok(mesh)
}

/// Triangulates the single cell `(i, j, k)` and appends its triangles to `mesh`.
///
/// Fails with [`IsosurfaceError::OutOfMemory`] if `mesh` cannot grow.
#[inline]
pub fn extract_cell(
    grid: &ScalarGrid,
    i: usize,
    j: usize,
    k: usize,
    isovalue: Value,
    mesh: &mut IsoMesh,
) -> Result<()> {
    let corner_values = grid.cell_corner_values(i, j, k);
    let state = get_state(&corner_values, isovalue);
    if is_empty_state(state) {
        return Ok(());
    }

    let corner_positions = grid.cell_corner_positions(i, j, k);
    let edge_points = get_edge_points(state, &corner_positions, &corner_values, isovalue);
    mesh.try_reserve_triangles(triangles_from_state(&edge_points, state).count())?;
    for triangle in triangles_from_state(&edge_points, state) {
        mesh.push_triangle(triangle);
    }
    Ok(())
}

/// Re-checks the grid invariants: its fields are public, so it may have been
/// assembled without going through [`ScalarGrid::new`].
fn validate(grid: &ScalarGrid, isovalue: Value) -> Result<()> {
    if !isovalue.is_finite() {
        return Err(IsosurfaceError::InvalidIsovalue(isovalue));
    }
    if grid.resolution < 2 {
        return Err(IsosurfaceError::ResolutionTooSmall(grid.resolution));
    }
    let n = grid.resolution;
    if grid.values.dim() != (n, n, n) {
        return Err(IsosurfaceError::GridLength {
            resolution: n,
            expected: n.saturating_pow(3),
            actual: grid.values.len(),
        });
    }
    crate::grid::Bounds::new(grid.bounds.min, grid.bounds.max)?;
    Ok(())
}
