use bevy::{
    asset::RenderAssetUsages,
    mesh::{Mesh, PrimitiveTopology},
};

use crate::{
    error::{IsosurfaceError, Result},
    types::{Point, Value, Vector},
};

/// Cross products shorter than this are treated as zero-area triangles.
pub const DEGENERATE_NORMAL_EPSILON: Value = 1e-12;

/// Flat triangle soup produced by an isosurface extraction.
///
/// Every group of 9 floats in `vertices` is one triangle; nothing is shared between
/// triangles. `normals` is aligned index-for-index with `vertices` and carries one face
/// normal per triangle, repeated for each of its 3 vertices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IsoMesh {
    /// Flat vertex positions: `[x0, y0, z0, x1, y1, z1, ...]`
    pub vertices: Vec<Value>,

    /// Flat per-vertex face normals: `[nx0, ny0, nz0, ...]`
    pub normals: Vec<Value>,
}

impl IsoMesh {
    /// Creates an empty mesh with no vertices or normals.
    pub fn new_empty() -> Self {
        Self::default()
    }

    /// Creates an empty mesh with room for `triangles` triangles.
    pub fn with_capacity(triangles: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(triangles * 9),
            normals: Vec::with_capacity(triangles * 9),
        }
    }

    /// Makes room for `triangles` more triangles without aborting on allocation failure.
    ///
    /// Returns [`IsosurfaceError::OutOfMemory`] with the requested float count if either
    /// buffer cannot grow.
    pub fn try_reserve_triangles(&mut self, triangles: usize) -> Result<()> {
        let floats = triangles
            .checked_mul(9)
            .ok_or(IsosurfaceError::OutOfMemory(usize::MAX))?;
        self.vertices
            .try_reserve(floats)
            .and_then(|_| self.normals.try_reserve(floats))
            .map_err(|_| IsosurfaceError::OutOfMemory(self.vertices.len().saturating_add(floats)))
    }

    /// Appends a triangle and its face normal (once per vertex).
    ///
    /// Grows the buffers infallibly; reserve with [`IsoMesh::try_reserve_triangles`] first.
    pub fn push_triangle(&mut self, corners: [Point; 3]) {
        let normal = tri_normal(&corners);
        for p in corners {
            self.vertices.extend_from_slice(&[p.x, p.y, p.z]);
            self.normals.extend_from_slice(&[normal.x, normal.y, normal.z]);
        }
    }

    /// Moves all triangles of `other` onto the end of this mesh.
    ///
    /// Returns [`IsosurfaceError::OutOfMemory`] if the buffers cannot grow.
    pub fn append(&mut self, other: &mut IsoMesh) -> Result<()> {
        let additional = other.vertices.len();
        self.vertices
            .try_reserve(additional)
            .and_then(|_| self.normals.try_reserve(additional))
            .map_err(|_| IsosurfaceError::OutOfMemory(self.vertices.len() + additional))?;

        self.vertices.append(&mut other.vertices);
        self.normals.append(&mut other.normals);
        Ok(())
    }

    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 9
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertex positions as `[x, y, z]` triples.
    pub fn positions(&self) -> Vec<[Value; 3]> {
        triples(&self.vertices)
    }

    /// Per-vertex normals as `[nx, ny, nz]` triples.
    pub fn normal_vectors(&self) -> Vec<[Value; 3]> {
        triples(&self.normals)
    }

    /// Builds a non-indexed Bevy triangle list with position and normal attributes.
    pub fn into_bevy_mesh(self) -> Mesh {
        let mut mesh = Mesh::new(
            PrimitiveTopology::TriangleList,
            RenderAssetUsages::RENDER_WORLD,
        );
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, self.positions());
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, self.normal_vectors());
        mesh
    }
}

fn triples(flat: &[Value]) -> Vec<[Value; 3]> {
    flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect()
}

/// Computes the unit face normal `normalize((b - a) × (c - a))`.
///
/// Returns the zero vector if the triangle is degenerate.
pub fn tri_normal([a, b, c]: &[Point; 3]) -> Vector {
    let cross = (b - a).cross(&(c - a));
    cross
        .try_normalize(DEGENERATE_NORMAL_EPSILON)
        .unwrap_or_else(Vector::zeros)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn normal_follows_winding() {
        let tri = [
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
        ];
        assert_relative_eq!(tri_normal(&tri), Vector::new(0.0, 0.0, 1.0));

        let flipped = [tri[0], tri[2], tri[1]];
        assert_relative_eq!(tri_normal(&flipped), Vector::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn normal_is_unit_length_for_large_triangles() {
        let tri = [
            Point::new(-40.0, 3.0, 7.0),
            Point::new(12.0, -9.0, 1.5),
            Point::new(0.25, 30.0, -22.0),
        ];
        assert_relative_eq!(tri_normal(&tri).norm(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn degenerate_triangle_gets_zero_normal() {
        let p = Point::new(1.0, 2.0, 3.0);
        assert_eq!(tri_normal(&[p, p, p]), Vector::zeros());

        let collinear = [p, Point::new(2.0, 2.0, 3.0), Point::new(3.0, 2.0, 3.0)];
        assert_eq!(tri_normal(&collinear), Vector::zeros());
    }

    #[test]
    fn push_triangle_replicates_normal() {
        let mut mesh = IsoMesh::new_empty();
        mesh.push_triangle([
            Point::new(0.0, 0.0, 0.0),
            Point::new(0.0, 0.0, 1.0),
            Point::new(1.0, 0.0, 0.0),
        ]);
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.vertices.len(), 9);
        assert_eq!(mesh.normals.len(), 9);
        for n in mesh.normal_vectors() {
            assert_eq!(n, [0.0, 1.0, 0.0]);
        }
        assert_eq!(mesh.positions()[1], [0.0, 0.0, 1.0]);
    }

    #[test]
    fn impossible_reservation_is_an_error_not_an_abort() {
        let mut mesh = IsoMesh::new_empty();
        assert!(matches!(
            mesh.try_reserve_triangles(usize::MAX / 4),
            Err(IsosurfaceError::OutOfMemory(_))
        ));
        assert!(matches!(
            mesh.try_reserve_triangles(usize::MAX / 32),
            Err(IsosurfaceError::OutOfMemory(_))
        ));
        assert!(mesh.is_empty());

        mesh.try_reserve_triangles(2).unwrap();
        assert!(mesh.vertices.capacity() >= 18);
        assert!(mesh.normals.capacity() >= 18);
    }

    #[test]
    fn append_moves_triangles() {
        let tri = [
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
        ];
        let mut a = IsoMesh::with_capacity(1);
        a.push_triangle(tri);
        let mut b = IsoMesh::new_empty();
        b.push_triangle(tri);
        b.push_triangle(tri);

        a.append(&mut b).unwrap();
        assert_eq!(a.triangle_count(), 3);
        assert!(b.is_empty());
    }
}
