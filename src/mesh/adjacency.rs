//! Connectivity interface consumed by the fairing engine.
//!
//! [`FairingMesh`] is the minimal view of a polygon mesh that fairing needs:
//! circulating the outgoing half-edges of a vertex, stepping to the vertex at
//! the other end, and reading or writing positions. [`HalfEdgeMesh`]
//! implements it; other mesh containers can too.

use std::fmt::Debug;
use std::hash::Hash;

use nalgebra::Point3;

use super::halfedge::HalfEdgeMesh;
use super::index::{HalfEdgeId, MeshIndex, VertexId};

/// Mesh connectivity and geometry as seen by the fairing engine.
pub trait FairingMesh {
    /// Vertex handle. Ordering defines the deterministic row order of the
    /// fairing system.
    type Vertex: Copy + Eq + Ord + Hash + Debug + Send + Sync;

    /// Half-edge handle.
    type HalfEdge: Copy + Debug;

    /// Total number of vertices.
    fn vertex_count(&self) -> usize;

    /// Whether `v` names a vertex of this mesh.
    fn contains_vertex(&self, v: Self::Vertex) -> bool;

    /// One full turn of the outgoing half-edges around `v`.
    fn outgoing_halfedges(&self, v: Self::Vertex) -> impl Iterator<Item = Self::HalfEdge> + '_;

    /// The vertex at the far end of an outgoing half-edge.
    fn opposite_vertex(&self, he: Self::HalfEdge) -> Self::Vertex;

    /// Position of `v`.
    fn point(&self, v: Self::Vertex) -> Point3<f64>;

    /// Move `v` to `p`.
    fn set_point(&mut self, v: Self::Vertex, p: Point3<f64>);
}

impl<I: MeshIndex> FairingMesh for HalfEdgeMesh<I> {
    type Vertex = VertexId<I>;
    type HalfEdge = HalfEdgeId<I>;

    #[inline]
    fn vertex_count(&self) -> usize {
        self.num_vertices()
    }

    #[inline]
    fn contains_vertex(&self, v: VertexId<I>) -> bool {
        v.is_valid() && v.index() < self.num_vertices()
    }

    fn outgoing_halfedges(&self, v: VertexId<I>) -> impl Iterator<Item = HalfEdgeId<I>> + '_ {
        self.vertex_halfedges(v)
    }

    #[inline]
    fn opposite_vertex(&self, he: HalfEdgeId<I>) -> VertexId<I> {
        self.dest(he)
    }

    #[inline]
    fn point(&self, v: VertexId<I>) -> Point3<f64> {
        *self.position(v)
    }

    #[inline]
    fn set_point(&mut self, v: VertexId<I>, p: Point3<f64>) {
        self.set_position(v, p);
    }
}
