//! Assembly of the fairing system `A x = b`.
//!
//! Each free vertex contributes one row: the expansion of `L^d` at that
//! vertex, where `L` is the weighted Laplacian and `d` the recursion depth.
//! Expanding `L` once at `v` yields
//!
//! ```text
//! L(v) = w_i Σ_j w_ij · v  -  Σ_j w_i w_ij · n_j
//! ```
//!
//! and every term is expanded again until the depth runs out. Terms that
//! land on a free vertex become matrix coefficients; terms that land on a
//! fixed vertex are known and move to the right-hand side.
//!
//! The stencil grows with the depth (all vertices within `d` edges) and the
//! number of expansion paths grows as `(valence + 1)^d`, so depths stay
//! small. Paths revisit vertices; their contributions add up.

use nalgebra::{DVector, Vector3};
use rayon::prelude::*;
use tracing::warn;

use super::selection::VertexIdMap;
use super::sparse::SparseMatrix;
use super::weights::FairingWeights;
use super::Axis;
use crate::error::{FairError, Result};
use crate::mesh::FairingMesh;

/// One row of the fairing system, before it is merged into the matrix.
#[derive(Debug, Clone)]
pub struct RowAccumulator {
    /// Row index (the free vertex's id).
    pub row: usize,
    /// `(column, value)` contributions; repeated columns are summed later.
    pub coefficients: Vec<(usize, f64)>,
    /// Right-hand side contribution of fixed vertices, per axis.
    pub constant: Vector3<f64>,
}

impl RowAccumulator {
    /// Start an empty row.
    pub fn new(row: usize) -> Self {
        Self {
            row,
            coefficients: Vec::new(),
            constant: Vector3::zeros(),
        }
    }
}

/// Expands powers of the weighted Laplacian into matrix rows.
pub struct RowAssembler<'a, M: FairingMesh, W> {
    mesh: &'a M,
    weights: &'a W,
    ids: &'a VertexIdMap<M::Vertex>,
}

impl<'a, M, W> RowAssembler<'a, M, W>
where
    M: FairingMesh,
    W: FairingWeights<M>,
{
    /// Create an assembler over a fixed partition into free and fixed
    /// vertices.
    pub fn new(mesh: &'a M, weights: &'a W, ids: &'a VertexIdMap<M::Vertex>) -> Self {
        Self { mesh, weights, ids }
    }

    /// Expand `L^depth` at `v` into row `row`.
    pub fn assemble_row(&self, v: M::Vertex, row: usize, depth: usize) -> Result<RowAccumulator> {
        let mut acc = RowAccumulator::new(row);
        self.expand(v, 1.0, depth, &mut acc)?;
        Ok(acc)
    }

    fn expand(
        &self,
        v: M::Vertex,
        multiplier: f64,
        depth: usize,
        acc: &mut RowAccumulator,
    ) -> Result<()> {
        if depth == 0 {
            match self.ids.get(&v) {
                Some(col) => acc.coefficients.push((col, multiplier)),
                None => acc.constant -= multiplier * self.mesh.point(v).coords,
            }
            return Ok(());
        }

        let w_i = checked(self.weights.vertex_weight(self.mesh, v), &v)?;

        let mut w_sum = 0.0;
        for he in self.mesh.outgoing_halfedges(v) {
            let w_ij = checked(self.weights.edge_weight(self.mesh, he), &he)?;
            w_sum += w_ij;

            let nv = self.mesh.opposite_vertex(he);
            self.expand(nv, -w_i * w_ij * multiplier, depth - 1, acc)?;
        }

        // Self term
        self.expand(v, w_i * w_sum * multiplier, depth - 1, acc)
    }
}

fn checked<T: std::fmt::Debug>(weight: f64, element: &T) -> Result<f64> {
    if weight.is_finite() {
        Ok(weight)
    } else {
        warn!("undefined fairing weight {} at {:?}", weight, element);
        Err(FairError::UndefinedWeight {
            element: format!("{:?}", element),
            value: weight,
        })
    }
}

/// The assembled system: one matrix shared by three right-hand sides.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    /// The `n x n` system matrix.
    pub matrix: SparseMatrix,
    /// Right-hand sides for x, y and z.
    pub rhs: [DVector<f64>; 3],
}

impl LinearSystem {
    /// Right-hand side for one axis.
    pub fn rhs(&self, axis: Axis) -> &DVector<f64> {
        &self.rhs[axis.index()]
    }

    /// Number of unknowns per axis.
    pub fn dim(&self) -> usize {
        self.matrix.nrows()
    }
}

/// Collects rows into matrix triplets and right-hand sides.
#[derive(Debug, Clone)]
pub struct SystemBuilder {
    n: usize,
    triplets: Vec<(usize, usize, f64)>,
    rhs: [DVector<f64>; 3],
}

impl SystemBuilder {
    /// Builder for an `n x n` system.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            triplets: Vec::new(),
            rhs: [DVector::zeros(n), DVector::zeros(n), DVector::zeros(n)],
        }
    }

    /// Merge an assembled row.
    pub fn add_row(&mut self, acc: RowAccumulator) {
        let row = acc.row;
        self.triplets
            .extend(acc.coefficients.into_iter().map(|(col, v)| (row, col, v)));
        for axis in Axis::ALL {
            self.rhs[axis.index()][row] += acc.constant[axis.index()];
        }
    }

    /// Compress into a [`LinearSystem`].
    pub fn build(self) -> LinearSystem {
        LinearSystem {
            matrix: SparseMatrix::from_triplets(self.n, self.n, self.triplets),
            rhs: self.rhs,
        }
    }
}

/// Assemble the fairing system for every free vertex in `ids`.
///
/// Rows are independent, so with `parallel` they are expanded on the rayon
/// pool into separate accumulators and merged afterwards in row order.
pub fn assemble_system<M, W>(
    mesh: &M,
    weights: &W,
    ids: &VertexIdMap<M::Vertex>,
    depth: usize,
    parallel: bool,
) -> Result<LinearSystem>
where
    M: FairingMesh + Sync,
    W: FairingWeights<M> + Sync,
{
    let assembler = RowAssembler::new(mesh, weights, ids);
    let free = ids.vertices();

    let rows: Vec<RowAccumulator> = if parallel {
        free.par_iter()
            .enumerate()
            .map(|(row, &v)| assembler.assemble_row(v, row, depth))
            .collect::<Result<_>>()?
    } else {
        free.iter()
            .enumerate()
            .map(|(row, &v)| assembler.assemble_row(v, row, depth))
            .collect::<Result<_>>()?
    };

    let mut builder = SystemBuilder::new(ids.len());
    for row in rows {
        builder.add_row(row);
    }
    Ok(builder.build())
}
