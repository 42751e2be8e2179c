//! Core mesh data structures.
//!
//! The primary type is [`HalfEdgeMesh`], a triangle mesh stored as a
//! half-edge (doubly-connected edge list) structure with O(1) adjacency
//! queries. The fairing engine does not depend on it directly: it talks to
//! meshes through the [`FairingMesh`] trait, which [`HalfEdgeMesh`]
//! implements.
//!
//! # Index Types
//!
//! Mesh elements are identified by type-safe index wrappers ([`VertexId`],
//! [`HalfEdgeId`], [`FaceId`]) generic over the storage integer
//! ([`MeshIndex`]).
//!
//! # Construction
//!
//! ```
//! use fairmesh::mesh::{HalfEdgeMesh, build_from_triangles};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2]];
//!
//! let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
//! ```

mod adjacency;
mod builder;
mod halfedge;
mod index;

pub use adjacency::FairingMesh;
pub use builder::{build_from_triangles, to_face_vertex};
pub use halfedge::{Face, HalfEdge, HalfEdgeMesh, Vertex, VertexHalfEdgeIter};
pub use index::{FaceId, HalfEdgeId, MeshIndex, VertexId};
