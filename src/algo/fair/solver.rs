//! Linear solvers for fairing systems.
//!
//! A fairing call factors its matrix once and then solves three right-hand
//! sides, one per coordinate axis. [`LinearSolver`] captures that contract;
//! the fairing engine never looks inside the solver.
//!
//! - [`SparseLuSolver`]: sparse LU from faer. Memory and time follow the
//!   fill-in of the factors, not `n²`. The default.
//! - [`DenseLuSolver`]: partial-pivot LU from nalgebra on a dense copy of
//!   the matrix. Exact pivot control and a determinant, but `O(n²)` memory
//!   and `O(n³)` time; meant for systems of at most a few hundred unknowns.
//! - [`BiCgStabSolver`]: Jacobi-preconditioned BiCGSTAB. Matrix-free and
//!   suited to the non-symmetric rows produced by weighted Laplacian powers.

use faer::linalg::solvers::Solve;
use faer::sparse::linalg::solvers::Lu;
use faer::sparse::{SparseColMat, Triplet};
use faer::Mat;
use nalgebra::linalg::LU;
use nalgebra::{DVector, Dyn};

use super::sparse::SparseMatrix;
use crate::error::{FairError, Result};

/// Backward error a sparse LU solution may carry before it is rejected.
const RESIDUAL_TOLERANCE: f64 = 1e-8;

/// What a successful factorization reports back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Factorization {
    /// Determinant of the factored matrix, when the solver computes one.
    pub determinant: Option<f64>,
}

/// Factor once, solve many.
pub trait LinearSolver {
    /// Factor `matrix`, replacing any previous factorization.
    ///
    /// Fails with [`FairError::SingularSystem`] when the matrix cannot be
    /// factored.
    fn factor(&mut self, matrix: &SparseMatrix) -> Result<Factorization>;

    /// Solve `A x = rhs` with the current factorization.
    fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>>;
}

/// Reject matrices that cannot be non-singular: non-square, all zero, or
/// with an empty row or column.
fn check_structure(matrix: &SparseMatrix) -> Result<()> {
    if !matrix.is_square() {
        return Err(FairError::singular(format!(
            "matrix is {}x{}, not square",
            matrix.nrows(),
            matrix.ncols()
        )));
    }

    let scale = matrix.max_abs();
    if scale == 0.0 || !scale.is_finite() {
        return Err(FairError::singular(format!("matrix scale is {}", scale)));
    }

    if let Some(row) = matrix.first_zero_row() {
        return Err(FairError::singular(format!("row {} is empty", row)));
    }

    let mut column_used = vec![false; matrix.ncols()];
    for i in 0..matrix.nrows() {
        for (j, v) in matrix.row(i) {
            column_used[j] |= v != 0.0;
        }
    }
    if let Some(col) = column_used.iter().position(|&used| !used) {
        return Err(FairError::singular(format!("column {} is empty", col)));
    }

    Ok(())
}

fn check_rhs(rhs: &DVector<f64>, dim: usize) -> Result<()> {
    if rhs.len() != dim {
        return Err(FairError::invalid_param(
            "rhs",
            rhs.len(),
            "length does not match the factored matrix",
        ));
    }
    Ok(())
}

// ============================================================================
// Sparse LU
// ============================================================================

/// Sparse LU factorization (faer).
///
/// Factor rejects structurally hopeless matrices up front and maps faer's
/// errors to [`FairError::SingularSystem`]. Numerically singular matrices
/// can slip through the factorization, so every solution is checked: it
/// must be finite and its backward error
/// `‖b - A x‖ / (‖A‖ₘₐₓ ‖x‖ + ‖b‖)` must stay below `1e-8`.
#[derive(Default)]
pub struct SparseLuSolver {
    factored: Option<(SparseMatrix, Lu<usize, f64>)>,
}

impl SparseLuSolver {
    /// Create a solver with no factorization.
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for SparseLuSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseLuSolver")
            .field("factored", &self.factored.is_some())
            .finish()
    }
}

impl LinearSolver for SparseLuSolver {
    fn factor(&mut self, matrix: &SparseMatrix) -> Result<Factorization> {
        self.factored = None;
        check_structure(matrix)?;

        let n = matrix.nrows();
        let triplets: Vec<Triplet<usize, usize, f64>> = (0..n)
            .flat_map(|i| matrix.row(i).map(move |(j, v)| Triplet::new(i, j, v)))
            .collect();

        let a = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|e| FairError::singular(format!("cannot convert matrix: {:?}", e)))?;
        let lu = a
            .sp_lu()
            .map_err(|e| FairError::singular(format!("sparse LU failed: {:?}", e)))?;

        self.factored = Some((matrix.clone(), lu));
        Ok(Factorization { determinant: None })
    }

    fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let (matrix, lu) = self
            .factored
            .as_ref()
            .ok_or_else(|| FairError::singular("solve called before factor"))?;
        let n = matrix.nrows();
        check_rhs(rhs, n)?;

        let mut work = Mat::<f64>::from_fn(n, 1, |i, _| rhs[i]);
        lu.solve_in_place(work.as_mut());
        let x = DVector::from_fn(n, |i, _| work[(i, 0)]);

        if x.iter().any(|v| !v.is_finite()) {
            return Err(FairError::singular("solution is not finite"));
        }

        let residual = (rhs - matrix.mul_vec(&x)).norm();
        let bound = RESIDUAL_TOLERANCE * (matrix.max_abs() * x.norm() + rhs.norm());
        if residual > bound {
            return Err(FairError::singular(format!(
                "backward error too large: residual {:e} exceeds {:e}",
                residual, bound
            )));
        }
        Ok(x)
    }
}

// ============================================================================
// Dense LU
// ============================================================================

/// Dense LU factorization with partial pivoting.
///
/// Copies the matrix into a dense `n x n` buffer, so it only suits small
/// systems (a few hundred free vertices). In exchange it checks every pivot
/// against a relative tolerance and reports the determinant.
#[derive(Debug, Clone)]
pub struct DenseLuSolver {
    pivot_tolerance: f64,
    dim: usize,
    lu: Option<LU<f64, Dyn, Dyn>>,
}

impl Default for DenseLuSolver {
    fn default() -> Self {
        Self {
            pivot_tolerance: 1e-12,
            dim: 0,
            lu: None,
        }
    }
}

impl DenseLuSolver {
    /// Create a solver with the default relative pivot tolerance (1e-12).
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat pivots smaller than `tolerance` times the largest matrix entry
    /// as zero.
    pub fn with_pivot_tolerance(mut self, tolerance: f64) -> Self {
        self.pivot_tolerance = tolerance.max(0.0);
        self
    }
}

impl LinearSolver for DenseLuSolver {
    fn factor(&mut self, matrix: &SparseMatrix) -> Result<Factorization> {
        self.lu = None;

        if !matrix.is_square() {
            return Err(FairError::singular(format!(
                "matrix is {}x{}, not square",
                matrix.nrows(),
                matrix.ncols()
            )));
        }

        let dense = matrix.to_dense();
        let scale = dense.amax();
        if scale == 0.0 || !scale.is_finite() {
            return Err(FairError::singular(format!("matrix scale is {}", scale)));
        }

        let lu = dense.lu();
        let threshold = self.pivot_tolerance * scale;
        let u = lu.u();
        if let Some((i, pivot)) = u
            .diagonal()
            .iter()
            .enumerate()
            .find(|(_, p)| p.abs() <= threshold)
        {
            return Err(FairError::singular(format!(
                "pivot {} is {:e} (threshold {:e})",
                i, pivot, threshold
            )));
        }

        let determinant = lu.determinant();
        self.dim = matrix.nrows();
        self.lu = Some(lu);
        Ok(Factorization {
            determinant: Some(determinant),
        })
    }

    fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let lu = self
            .lu
            .as_ref()
            .ok_or_else(|| FairError::singular("solve called before factor"))?;
        check_rhs(rhs, self.dim)?;

        let x = lu
            .solve(rhs)
            .ok_or_else(|| FairError::singular("LU back-substitution failed"))?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(FairError::singular("solution is not finite"));
        }
        Ok(x)
    }
}

// ============================================================================
// BiCGSTAB
// ============================================================================

/// Jacobi-preconditioned BiCGSTAB.
///
/// Factor only validates and stores the matrix and its inverse diagonal.
/// Each solve iterates until `‖b - A x‖ / ‖b‖` drops below the tolerance.
#[derive(Debug, Clone)]
pub struct BiCgStabSolver {
    max_iterations: usize,
    tolerance: f64,
    matrix: Option<SparseMatrix>,
    inv_diagonal: DVector<f64>,
}

impl Default for BiCgStabSolver {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-10,
            matrix: None,
            inv_diagonal: DVector::zeros(0),
        }
    }
}

impl BiCgStabSolver {
    /// Create a solver with an iteration cap and a relative residual
    /// tolerance.
    pub fn new(max_iterations: usize, tolerance: f64) -> Result<Self> {
        if max_iterations == 0 {
            return Err(FairError::invalid_param(
                "max_iterations",
                max_iterations,
                "must be positive",
            ));
        }
        if !(tolerance > 0.0 && tolerance < 1.0) {
            return Err(FairError::invalid_param(
                "tolerance",
                tolerance,
                "must be in (0, 1)",
            ));
        }
        Ok(Self {
            max_iterations,
            tolerance,
            ..Self::default()
        })
    }
}

impl LinearSolver for BiCgStabSolver {
    fn factor(&mut self, matrix: &SparseMatrix) -> Result<Factorization> {
        self.matrix = None;
        check_structure(matrix)?;

        // Zero diagonal entries are left unscaled
        self.inv_diagonal = matrix.diagonal().map(|d| {
            if d != 0.0 && d.is_finite() {
                1.0 / d
            } else {
                1.0
            }
        });
        self.matrix = Some(matrix.clone());
        Ok(Factorization { determinant: None })
    }

    fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let a = self
            .matrix
            .as_ref()
            .ok_or_else(|| FairError::singular("solve called before factor"))?;
        check_rhs(rhs, a.nrows())?;

        bicgstab(
            a,
            &self.inv_diagonal,
            rhs,
            self.max_iterations,
            self.tolerance,
        )
    }
}

/// Right-preconditioned BiCGSTAB with preconditioner `diag(inv_diagonal)`.
fn bicgstab(
    a: &SparseMatrix,
    inv_diagonal: &DVector<f64>,
    b: &DVector<f64>,
    max_iter: usize,
    tolerance: f64,
) -> Result<DVector<f64>> {
    let n = b.len();
    let mut x = DVector::zeros(n);

    let b_norm = b.norm();
    if b_norm < 1e-300 {
        return Ok(x);
    }
    let threshold = tolerance * b_norm;

    let mut r = b.clone();
    let mut r_hat = r.clone();
    let mut p: DVector<f64> = DVector::zeros(n);
    let mut v: DVector<f64> = DVector::zeros(n);
    let (mut rho_prev, mut alpha, mut omega) = (1.0, 1.0, 1.0);

    for iteration in 1..=max_iter {
        let mut rho = r_hat.dot(&r);
        if rho.abs() <= f64::EPSILON * r_hat.norm() * r.norm() {
            // Shadow residual became orthogonal; restart from the current one
            r_hat.copy_from(&r);
            rho = r.dot(&r);
            p.copy_from(&r);
        } else {
            let beta = (rho / rho_prev) * (alpha / omega);
            p = &r + beta * (&p - omega * &v);
        }

        let p_hat = p.component_mul(inv_diagonal);
        v = a.mul_vec(&p_hat);
        let r_hat_v = r_hat.dot(&v);
        if r_hat_v == 0.0 || !r_hat_v.is_finite() {
            return Err(FairError::ConvergenceFailed {
                iterations: iteration,
            });
        }
        alpha = rho / r_hat_v;

        let s = &r - alpha * &v;
        if s.norm() <= threshold {
            x += alpha * &p_hat;
            return Ok(x);
        }

        let s_hat = s.component_mul(inv_diagonal);
        let t = a.mul_vec(&s_hat);
        let t_t = t.dot(&t);
        if t_t == 0.0 {
            return Err(FairError::ConvergenceFailed {
                iterations: iteration,
            });
        }
        omega = t.dot(&s) / t_t;

        x += alpha * &p_hat + omega * &s_hat;
        r = s - omega * &t;
        if r.norm() <= threshold {
            return Ok(x);
        }
        if omega == 0.0 {
            return Err(FairError::ConvergenceFailed {
                iterations: iteration,
            });
        }
        rho_prev = rho;
    }

    Err(FairError::ConvergenceFailed {
        iterations: max_iter,
    })
}
