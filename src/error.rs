//! Error types for fairmesh.
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

use crate::algo::fair::Axis;

/// Result type alias using [`FairError`].
pub type Result<T> = std::result::Result<T, FairError>;

/// Errors that can occur while building meshes or fairing them.
#[derive(Error, Debug)]
pub enum FairError {
    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face has duplicate vertex indices (degenerate triangle).
    #[error("face {face} is degenerate (has duplicate vertices)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// A directed edge is used by more than one face.
    #[error("edge ({v0}, {v1}) is shared by more than two faces or inconsistently oriented")]
    NonManifoldEdge {
        /// First vertex of the edge.
        v0: usize,
        /// Second vertex of the edge.
        v1: usize,
    },

    /// A vertex touches more than one boundary loop.
    #[error("vertex {vertex} is non-manifold (touches several boundary loops)")]
    NonManifoldVertex {
        /// The vertex index.
        vertex: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },

    /// The fairing region names a vertex the mesh does not contain.
    #[error("vertex {vertex} is not part of the mesh ({count} vertices)")]
    VertexOutOfRange {
        /// The offending vertex, formatted.
        vertex: String,
        /// Number of vertices in the mesh.
        count: usize,
    },

    /// Two free vertices were assigned the same system row.
    #[error("duplicate vertex {vertex} in fairing region")]
    DuplicateVertex {
        /// The duplicated vertex, formatted.
        vertex: String,
    },

    /// A weight inside the stencil of a free vertex is not finite.
    #[error("weight of {element} is undefined ({value})")]
    UndefinedWeight {
        /// The vertex or half-edge carrying the weight, formatted.
        element: String,
        /// The weight that was produced.
        value: f64,
    },

    /// The assembled system could not be factored.
    #[error("singular system: {reason}")]
    SingularSystem {
        /// What the factorization reported.
        reason: String,
    },

    /// Solving for one coordinate axis failed after factorization.
    #[error("solve for {axis} coordinates failed: {reason}")]
    SolveFailure {
        /// The axis whose right-hand side failed.
        axis: Axis,
        /// What the solver reported.
        reason: String,
    },

    /// Algorithm failed to converge.
    #[error("algorithm failed to converge after {iterations} iterations")]
    ConvergenceFailed {
        /// Number of iterations attempted.
        iterations: usize,
    },
}

impl FairError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        FairError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create a singular system error.
    pub fn singular<T: Into<String>>(reason: T) -> Self {
        FairError::SingularSystem {
            reason: reason.into(),
        }
    }

    /// Whether this error left the mesh untouched because of bad input
    /// rather than numerical trouble.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            FairError::InvalidParameter { .. }
                | FairError::VertexOutOfRange { .. }
                | FairError::DuplicateVertex { .. }
                | FairError::UndefinedWeight { .. }
        )
    }
}
