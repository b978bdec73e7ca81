use crate::{
    interp::interpolate_edge,
    tables::{CORNER_OFFSETS, CORNER_POINT_INDICES, EDGE_TABLE, TRI_TABLE},
    types::{Point, Value},
};

/// Configurations with no surface crossing: every corner outside, or every corner inside.
pub const EMPTY_STATES: [u8; 2] = [0, 255];

/// Computes the marching cubes state bitmask for a cell.
///
/// Each of the 8 corners maps to one bit. A bit is set when the corner's value
/// is **strictly below** the threshold (i.e. "inside" the surface); a value equal to
/// the threshold counts as outside:
///
/// ```text
/// corner index:  7  6  5  4  3  2  1  0
/// state bits:   [_][_][_][_][_][_][_][_]
///                                      ^-- corner 0 inside?
/// ```
#[inline]
pub fn get_state(corner_values: &[Value; 8], threshold: Value) -> u8 {
    corner_values
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v < threshold)
        .fold(0, |state, (i, _)| state | (1 << i))
}

/// Returns `true` when `state` has no triangles and the cell can be skipped before any lookup.
#[inline]
pub fn is_empty_state(state: u8) -> bool {
    EMPTY_STATES.contains(&state)
}

/// Interpolates the crossing point along each edge of the cell that the surface intersects.
///
/// `EDGE_TABLE[state]` is a 12-bit field; only edges with a set bit are interpolated.
/// An edge whose crossing is degenerate (see [`interpolate_edge`]) stays `None`.
///
/// Every edge is interpolated from its corner nearest the grid origin, so the two or four
/// cells sharing an edge produce bit-identical points and the mesh has no cracks.
#[inline]
pub fn get_edge_points(
    state: u8,
    corner_positions: &[Point; 8],
    corner_values: &[Value; 8],
    threshold: Value,
) -> [Option<Point>; 12] {
    let edges_mask = EDGE_TABLE[state as usize];
    let mut edge_points: [Option<Point>; 12] = [None; 12];

    for (i, [a, b]) in CORNER_POINT_INDICES.iter().enumerate() {
        if (edges_mask & (1 << i)) == 0 {
            continue;
        }

        let (mut a, mut b) = (*a as usize, *b as usize);
        if CORNER_OFFSETS[a] > CORNER_OFFSETS[b] {
            std::mem::swap(&mut a, &mut b);
        }
        edge_points[i] = interpolate_edge(
            corner_positions[a],
            corner_positions[b],
            corner_values[a],
            corner_values[b],
            threshold,
        );
    }

    edge_points
}

/// Iterates the triangles of a configuration as edge-index triples.
///
/// `TRI_TABLE[state]` contains edge indices in groups of three, terminated by `-1`:
/// ```text
/// TRI_TABLE[state] = [e0, e1, e2,  e3, e4, e5,  -1, ...]
///                     \___tri0__/   \___tri1__/
/// ```
#[inline]
pub fn triangle_edges(state: u8) -> impl Iterator<Item = [usize; 3]> {
    TRI_TABLE[state as usize]
        .chunks_exact(3)
        .take_while(|tri| tri[0] != -1)
        .map(|tri| [tri[0] as usize, tri[1] as usize, tri[2] as usize])
}

/// Resolves the corners of each triangle of `state` from the interpolated `edge_points`.
///
/// A triangle that references an edge without a point is dropped.
#[inline]
pub fn triangles_from_state(
    edge_points: &[Option<Point>; 12],
    state: u8,
) -> impl Iterator<Item = [Point; 3]> + '_ {
    triangle_edges(state)
        .filter_map(|[a, b, c]| Some([edge_points[a]?, edge_points[b]?, edge_points[c]?]))
}
