//! # Fairmesh
//!
//! Variational fairing of triangle mesh regions.
//!
//! Fairmesh moves a chosen set of vertices so that the surface over them
//! becomes as smooth as possible, holding every other vertex in place. The
//! smoothness criterion is a power of the weighted Laplacian: membrane
//! (continuity 0), thin plate (continuity 1) or curvature-continuous
//! (continuity 2).
//!
//! ## Features
//!
//! - **Half-edge data structure**: O(1) adjacency queries with type-safe indices
//! - **Pluggable weights**: uniform and cotangent Laplacians, or your own
//! - **Pluggable solvers**: sparse LU, dense LU and BiCGSTAB, or your own
//! - **All or nothing**: a failed call never moves a vertex
//!
//! ## Quick Start
//!
//! ```
//! use fairmesh::prelude::*;
//! use nalgebra::Point3;
//!
//! // A 5x5 grid with a spike in the middle
//! let n = 5;
//! let mut vertices = Vec::new();
//! for j in 0..n {
//!     for i in 0..n {
//!         let z = if (i, j) == (2, 2) { 3.0 } else { 0.0 };
//!         vertices.push(Point3::new(i as f64, j as f64, z));
//!     }
//! }
//! let mut faces = Vec::new();
//! for j in 0..n - 1 {
//!     for i in 0..n - 1 {
//!         let a = i + j * n;
//!         faces.push([a, a + 1, a + n + 1]);
//!         faces.push([a, a + n + 1, a + n]);
//!     }
//! }
//! let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
//!
//! // Fair the 3x3 interior as a thin plate
//! let region: Vec<VertexId> = [6, 7, 8, 11, 12, 13, 16, 17, 18]
//!     .into_iter()
//!     .map(VertexId::new)
//!     .collect();
//! let report = fair(&mut mesh, region, 1).unwrap();
//!
//! assert_eq!(report.free_vertices, 9);
//! assert!(mesh.position(VertexId::new(12)).z.abs() < 1e-9);
//! ```
//!
//! ## Choosing weights and solver
//!
//! ```
//! use fairmesh::prelude::*;
//! # use nalgebra::Point3;
//! # let vertices = vec![
//! #     Point3::new(0.0, 0.0, 0.2),
//! #     Point3::new(1.0, 0.0, 0.0),
//! #     Point3::new(0.0, 1.0, 0.0),
//! #     Point3::new(-1.0, 0.0, 0.0),
//! #     Point3::new(0.0, -1.0, 0.0),
//! # ];
//! # let faces = vec![[0, 1, 2], [0, 2, 3], [0, 3, 4], [0, 4, 1]];
//! # let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
//! let options = FairOptions::default().with_continuity(0).sequential();
//! let mut solver = BiCgStabSolver::new(1000, 1e-10).unwrap();
//!
//! fair_with(&mut mesh, [VertexId::new(0)], &CotangentWeights, &mut solver, &options).unwrap();
//! assert!(mesh.position(VertexId::new(0)).z.abs() < 1e-8);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod mesh;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use fairmesh::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::fair::{
        fair, fair_with, fair_with_progress, Axis, BiCgStabSolver, Continuity, CotangentWeights,
        DenseLuSolver, FairOptions, FairReport, FairStage, FairingWeights, LinearSolver,
        PruningPolicy, SparseLuSolver, UniformWeights,
    };
    pub use crate::algo::Progress;
    pub use crate::error::{FairError, Result};
    pub use crate::mesh::{
        build_from_triangles, to_face_vertex, FaceId, FairingMesh, HalfEdgeId, HalfEdgeMesh,
        MeshIndex, VertexId,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;
