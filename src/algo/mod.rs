//! Mesh processing algorithms.
//!
//! - **Fairing**: smooth a vertex region by driving a power of the weighted
//!   Laplacian to zero, with the rest of the mesh as boundary condition
//! - **Progress**: stage callbacks for long-running calls

pub mod fair;
pub mod progress;

pub use progress::Progress;
