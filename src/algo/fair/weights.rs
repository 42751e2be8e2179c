//! Weights of the discrete Laplacian used by fairing.
//!
//! The weighted Laplacian at a vertex `v` is
//!
//! ```text
//! L(v) = w_i(v) · Σ_j w_ij(h_j) · (p_v - p_j)
//! ```
//!
//! where `h_j` runs over the outgoing half-edges of `v` and `p_j` is the
//! vertex at their far end. A [`FairingWeights`] implementation provides
//! `w_i` and `w_ij`; the row assembler never computes weights itself.

use nalgebra::Point3;

use crate::mesh::{FairingMesh, HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

/// Per-vertex and per-half-edge weights of a discrete Laplacian.
///
/// Implementations must be deterministic. Weights must be finite for every
/// vertex and half-edge within the stencil of a free vertex; fairing reports
/// non-finite values as [`FairError::UndefinedWeight`](crate::error::FairError::UndefinedWeight).
pub trait FairingWeights<M: FairingMesh + ?Sized> {
    /// Normalization weight `w_i` of a vertex.
    fn vertex_weight(&self, mesh: &M, v: M::Vertex) -> f64;

    /// Coupling weight `w_ij` of an outgoing half-edge.
    fn edge_weight(&self, mesh: &M, he: M::HalfEdge) -> f64;
}

/// Umbrella operator: every edge weighs 1, vertices are normalized by their
/// valence, so `L(v)` is `p_v` minus the neighbor average.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformWeights;

impl<M: FairingMesh + ?Sized> FairingWeights<M> for UniformWeights {
    fn vertex_weight(&self, mesh: &M, v: M::Vertex) -> f64 {
        // Isolated vertices give 1/0, caught by the assembler
        1.0 / mesh.outgoing_halfedges(v).count() as f64
    }

    #[inline]
    fn edge_weight(&self, _mesh: &M, _he: M::HalfEdge) -> f64 {
        1.0
    }
}

/// Cotangent Laplacian with mixed Voronoi area normalization.
///
/// - `w_ij = (cot α + cot β) / 2`, with α and β the angles opposite the edge
///   (one-sided on boundary edges).
/// - `w_i = 1 / (2 A(v))`, with `A(v)` the mixed Voronoi area of Meyer et al.
///
/// The cotangent Laplacian reproduces linear functions, so fairing a planar
/// region leaves it in place regardless of triangle shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CotangentWeights;

impl<I: MeshIndex> FairingWeights<HalfEdgeMesh<I>> for CotangentWeights {
    fn vertex_weight(&self, mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> f64 {
        0.5 / mixed_voronoi_area(mesh, v)
    }

    fn edge_weight(&self, mesh: &HalfEdgeMesh<I>, he: HalfEdgeId<I>) -> f64 {
        cotangent_edge_weight(mesh, he)
    }
}

/// (cot α + cot β) / 2 for the edge of `he`.
pub(crate) fn cotangent_edge_weight<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, he: HalfEdgeId<I>) -> f64 {
    let p0 = mesh.position(mesh.origin(he));
    let p1 = mesh.position(mesh.dest(he));
    let mut weight = 0.0;

    if !mesh.is_boundary_halfedge(he) {
        let opp = mesh.position(mesh.dest(mesh.next(he)));
        weight += cotangent_angle(opp, p0, p1);
    }

    let twin = mesh.twin(he);
    if !mesh.is_boundary_halfedge(twin) {
        let opp = mesh.position(mesh.dest(mesh.next(twin)));
        weight += cotangent_angle(opp, p1, p0);
    }

    weight * 0.5
}

/// Cotangent of the angle at `a` in triangle (a, b, c).
fn cotangent_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let cross_norm = ab.cross(&ac).norm();
    if cross_norm < 1e-12 {
        return 0.0;
    }
    ab.dot(&ac) / cross_norm
}

/// Mixed Voronoi area around `v`: Voronoi region inside non-obtuse
/// triangles, half or quarter of the triangle otherwise.
pub(crate) fn mixed_voronoi_area<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> f64 {
    let mut area = 0.0;

    for f in mesh.vertex_faces(v) {
        let corners = mesh.face_triangle(f);
        let points = mesh.face_positions(f);
        let local = corners.iter().position(|&c| c == v).unwrap_or(0);

        let p = points[local];
        let q = points[(local + 1) % 3];
        let r = points[(local + 2) % 3];

        let dots = [
            (q - p).dot(&(r - p)),
            (p - q).dot(&(r - q)),
            (p - r).dot(&(q - r)),
        ];
        let tri_area = mesh.face_area(f);

        if dots.iter().all(|&d| d >= 0.0) {
            // (|pr|² cot q + |pq|² cot r) / 8
            area += 0.125
                * ((r - p).norm_squared() * cotangent_angle(&q, &p, &r)
                    + (q - p).norm_squared() * cotangent_angle(&r, &p, &q));
        } else if dots[0] < 0.0 {
            area += tri_area * 0.5;
        } else {
            area += tri_area * 0.25;
        }
    }

    area
}
