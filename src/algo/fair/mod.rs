//! Variational fairing of mesh regions.
//!
//! Fairing moves a chosen set of *free* vertices so that the surface becomes
//! as smooth as possible while every other vertex stays where it is. The
//! smoothness energy is the squared magnitude of a power of the weighted
//! Laplacian, which leads to the linear condition
//!
//! ```text
//! L^d(p)(v) = 0    for every free vertex v
//! ```
//!
//! with `d = continuity + 1`:
//!
//! | continuity | depth | surface behaves like |
//! |-----------:|------:|----------------------|
//! | 0          | 1     | membrane             |
//! | 1          | 2     | thin plate           |
//! | 2          | 3     | curvature-continuous |
//!
//! # Pipeline
//!
//! One call runs `Selecting → Assembling → Factoring → Solving → WritingBack
//! → Done` and stops in `Failed` at the first error (see [`FairStage`]). The
//! matrix is factored once and reused for the x, y and z right-hand sides.
//! Positions are written only after all three solves succeed, so a failed
//! call leaves the mesh exactly as it was.
//!
//! # Collaborators
//!
//! The mesh ([`FairingMesh`]), the Laplacian weights ([`FairingWeights`])
//! and the linear solver ([`LinearSolver`]) are injected. [`fair`] uses
//! [`UniformWeights`] and [`SparseLuSolver`]; [`fair_with`] takes any
//! combination.
//!
//! # Example
//!
//! ```
//! use fairmesh::prelude::*;
//! use nalgebra::Point3;
//!
//! // A hexagon with a dented center
//! let mut vertices = vec![Point3::new(0.0, 0.0, -0.5)];
//! for k in 0..6 {
//!     let a = k as f64 * std::f64::consts::PI / 3.0;
//!     vertices.push(Point3::new(a.cos(), a.sin(), 0.0));
//! }
//! let faces: Vec<[usize; 3]> = (0..6).map(|k| [0, 1 + k, 1 + (k + 1) % 6]).collect();
//! let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
//!
//! let report = fair(&mut mesh, [VertexId::new(0)], 0).unwrap();
//! assert_eq!(report.stage, FairStage::Done);
//! assert!(mesh.position(VertexId::new(0)).z.abs() < 1e-12);
//! ```

pub mod assemble;
pub mod selection;
pub mod solver;
pub mod sparse;
pub mod weights;

use std::fmt;
use std::time::{Duration, Instant};

use nalgebra::{DVector, Point3};
use tracing::{debug, info, warn};

use crate::algo::Progress;
use crate::error::{FairError, Result};
use crate::mesh::FairingMesh;

pub use assemble::{assemble_system, LinearSystem, RowAccumulator, RowAssembler, SystemBuilder};
pub use selection::{select_free_vertices, PruningPolicy, VertexIdMap};
pub use solver::{BiCgStabSolver, DenseLuSolver, Factorization, LinearSolver, SparseLuSolver};
pub use sparse::SparseMatrix;
pub use weights::{CotangentWeights, FairingWeights, UniformWeights};

/// A coordinate axis; each gets its own right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// x coordinates.
    X,
    /// y coordinates.
    Y,
    /// z coordinates.
    Z,
}

impl Axis {
    /// All axes in storage order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index (0, 1, 2).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        })
    }
}

/// Which power of the Laplacian fairing drives to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// Order 0: minimize `|L|²`, a membrane.
    Membrane,
    /// Order 1: minimize `|L²|²`, a thin plate.
    ThinPlate,
    /// Order 2: minimize `|L³|²`.
    Curvature,
}

impl Continuity {
    /// Map a continuity order (0, 1 or 2).
    pub fn from_order(order: u32) -> Result<Self> {
        match order {
            0 => Ok(Continuity::Membrane),
            1 => Ok(Continuity::ThinPlate),
            2 => Ok(Continuity::Curvature),
            _ => Err(FairError::invalid_param(
                "continuity",
                order,
                "must be 0, 1 or 2",
            )),
        }
    }

    /// The continuity order.
    pub fn order(self) -> u32 {
        match self {
            Continuity::Membrane => 0,
            Continuity::ThinPlate => 1,
            Continuity::Curvature => 2,
        }
    }

    /// Recursion depth of the stencil expansion (order + 1).
    pub fn depth(self) -> usize {
        self.order() as usize + 1
    }
}

/// States of a fairing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FairStage {
    /// Not started.
    Idle,
    /// Validating parameters and choosing free vertices.
    Selecting,
    /// Building the matrix and right-hand sides.
    Assembling,
    /// Factoring the matrix.
    Factoring,
    /// Solving for x, y and z.
    Solving,
    /// Moving free vertices.
    WritingBack,
    /// Finished successfully.
    Done,
    /// Stopped on an error; the mesh is unchanged.
    Failed,
}

impl FairStage {
    /// Position in the pipeline, used for progress reporting.
    fn step(self) -> usize {
        match self {
            FairStage::Idle => 0,
            FairStage::Selecting => 1,
            FairStage::Assembling => 2,
            FairStage::Factoring => 3,
            FairStage::Solving => 4,
            FairStage::WritingBack => 5,
            FairStage::Done | FairStage::Failed => 6,
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, FairStage::Done | FairStage::Failed)
    }
}

impl fmt::Display for FairStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Options for [`fair_with`].
#[derive(Debug, Clone)]
pub struct FairOptions {
    /// Continuity order: 0, 1 or 2.
    pub continuity: u32,

    /// What to do when the whole mesh is selected.
    pub pruning: PruningPolicy,

    /// Assemble rows and solve axes on the rayon pool (default: true).
    pub parallel: bool,
}

impl Default for FairOptions {
    fn default() -> Self {
        Self {
            continuity: 1,
            pruning: PruningPolicy::default(),
            parallel: true,
        }
    }
}

impl FairOptions {
    /// Set the continuity order.
    pub fn with_continuity(mut self, continuity: u32) -> Self {
        self.continuity = continuity;
        self
    }

    /// Set the whole-mesh pruning policy.
    pub fn with_pruning(mut self, pruning: PruningPolicy) -> Self {
        self.pruning = pruning;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Time spent in the numerical stages.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTimings {
    /// Row assembly.
    pub assembly: Duration,
    /// Matrix factorization.
    pub factorization: Duration,
    /// All three solves.
    pub solve: Duration,
}

/// Summary of a successful fairing call.
#[derive(Debug, Clone, PartialEq)]
pub struct FairReport {
    /// Final stage; always [`FairStage::Done`] for a returned report.
    pub stage: FairStage,
    /// Distinct vertices the caller selected.
    pub requested: usize,
    /// Vertices actually solved for.
    pub free_vertices: usize,
    /// Whether whole-mesh pruning fixed some of the selection.
    pub pruned: bool,
    /// Stored entries in the system matrix.
    pub nnz: usize,
    /// Determinant reported by the solver, if any.
    pub determinant: Option<f64>,
    /// Per-stage durations.
    pub timings: StageTimings,
}

impl FairReport {
    fn empty() -> Self {
        Self {
            stage: FairStage::Idle,
            requested: 0,
            free_vertices: 0,
            pruned: false,
            nnz: 0,
            determinant: None,
            timings: StageTimings::default(),
        }
    }
}

/// Linear walk through [`FairStage`] with progress and failure logging.
struct Pipeline<'a> {
    stage: FairStage,
    progress: &'a Progress,
}

impl<'a> Pipeline<'a> {
    fn new(progress: &'a Progress) -> Self {
        Self {
            stage: FairStage::Idle,
            progress,
        }
    }

    fn advance(&mut self, next: FairStage) {
        debug_assert!(
            !self.stage.is_terminal() && next.step() > self.stage.step(),
            "illegal fairing transition {:?} -> {:?}",
            self.stage,
            next
        );
        self.stage = next;
        self.progress
            .report(next.step(), FairStage::Done.step(), &next.to_string());
    }

    fn fail(&mut self, err: FairError) -> FairError {
        warn!("fairing failed while {}: {}", self.stage, err);
        self.stage = FairStage::Failed;
        self.progress
            .report(FairStage::Failed.step(), FairStage::Done.step(), "Failed");
        err
    }
}

/// Fair `vertices` with uniform weights and a sparse LU solver.
///
/// `continuity` is 0 (membrane), 1 (thin plate) or 2. An empty selection is
/// a successful no-op. On error no vertex moves.
pub fn fair<M, It>(mesh: &mut M, vertices: It, continuity: u32) -> Result<FairReport>
where
    M: FairingMesh + Sync,
    It: IntoIterator<Item = M::Vertex>,
{
    let options = FairOptions::default().with_continuity(continuity);
    fair_with(mesh, vertices, &UniformWeights, &mut SparseLuSolver::new(), &options)
}

/// Fair `vertices` with injected weights and solver.
pub fn fair_with<M, W, S, It>(
    mesh: &mut M,
    vertices: It,
    weights: &W,
    solver: &mut S,
    options: &FairOptions,
) -> Result<FairReport>
where
    M: FairingMesh + Sync,
    W: FairingWeights<M> + Sync,
    S: LinearSolver + Sync,
    It: IntoIterator<Item = M::Vertex>,
{
    fair_with_progress(mesh, vertices, weights, solver, options, &Progress::none())
}

/// [`fair_with`], reporting every stage transition to `progress`.
pub fn fair_with_progress<M, W, S, It>(
    mesh: &mut M,
    vertices: It,
    weights: &W,
    solver: &mut S,
    options: &FairOptions,
    progress: &Progress,
) -> Result<FairReport>
where
    M: FairingMesh + Sync,
    W: FairingWeights<M> + Sync,
    S: LinearSolver + Sync,
    It: IntoIterator<Item = M::Vertex>,
{
    let mut pipeline = Pipeline::new(progress);
    let mut report = FairReport::empty();

    // ---- Selecting ----
    pipeline.advance(FairStage::Selecting);
    let continuity = Continuity::from_order(options.continuity).map_err(|e| pipeline.fail(e))?;
    let depth = continuity.depth();
    options.pruning.validate().map_err(|e| pipeline.fail(e))?;

    let region = selection::collect_region(&*mesh, vertices).map_err(|e| pipeline.fail(e))?;
    report.requested = region.len();
    if region.is_empty() {
        debug!("empty fairing region, nothing to do");
        pipeline.advance(FairStage::Done);
        report.stage = FairStage::Done;
        return Ok(report);
    }

    let (free, pruned) =
        select_free_vertices(&*mesh, region, options.pruning).map_err(|e| pipeline.fail(e))?;
    report.pruned = pruned;
    report.free_vertices = free.len();

    let ids = VertexIdMap::from_ordered(free.iter().copied()).map_err(|e| pipeline.fail(e))?;
    if ids.is_empty() {
        debug!("pruning left no free vertices, nothing to do");
        pipeline.advance(FairStage::Done);
        report.stage = FairStage::Done;
        return Ok(report);
    }
    debug!(
        "fairing {} vertices with {:?} (depth {})",
        ids.len(),
        continuity,
        depth
    );

    // ---- Assembling ----
    pipeline.advance(FairStage::Assembling);
    let timer = Instant::now();
    let system = assemble_system(&*mesh, weights, &ids, depth, options.parallel)
        .map_err(|e| pipeline.fail(e))?;
    report.timings.assembly = timer.elapsed();
    report.nnz = system.matrix.nnz();
    debug!(
        "assembled {}x{} system with {} entries in {:?}",
        system.dim(),
        system.dim(),
        report.nnz,
        report.timings.assembly
    );

    // ---- Factoring ----
    pipeline.advance(FairStage::Factoring);
    let timer = Instant::now();
    let factorization = solver.factor(&system.matrix).map_err(|e| pipeline.fail(e))?;
    report.timings.factorization = timer.elapsed();
    report.determinant = factorization.determinant;
    debug!(
        "factored in {:?} (determinant {:?})",
        report.timings.factorization, factorization.determinant
    );

    // ---- Solving ----
    pipeline.advance(FairStage::Solving);
    let timer = Instant::now();
    let [x, y, z] = solve_axes(&*solver, &system, options.parallel).map_err(|e| pipeline.fail(e))?;
    report.timings.solve = timer.elapsed();

    // ---- WritingBack ----
    pipeline.advance(FairStage::WritingBack);
    for (i, &v) in ids.vertices().iter().enumerate() {
        mesh.set_point(v, Point3::new(x[i], y[i], z[i]));
    }

    pipeline.advance(FairStage::Done);
    report.stage = FairStage::Done;
    info!(
        "faired {} vertices (continuity {}): assembly {:?}, factor {:?}, solve {:?}",
        report.free_vertices,
        continuity.order(),
        report.timings.assembly,
        report.timings.factorization,
        report.timings.solve
    );
    Ok(report)
}

/// Solve the three axes against one factorization.
fn solve_axes<S>(solver: &S, system: &LinearSystem, parallel: bool) -> Result<[DVector<f64>; 3]>
where
    S: LinearSolver + Sync,
{
    let solve = |axis: Axis| {
        solver
            .solve(system.rhs(axis))
            .map_err(|e| FairError::SolveFailure {
                axis,
                reason: e.to_string(),
            })
    };

    if parallel {
        let (x, (y, z)) = rayon::join(
            || solve(Axis::X),
            || rayon::join(|| solve(Axis::Y), || solve(Axis::Z)),
        );
        Ok([x?, y?, z?])
    } else {
        Ok([solve(Axis::X)?, solve(Axis::Y)?, solve(Axis::Z)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{build_from_triangles, HalfEdgeId, HalfEdgeMesh, VertexId};
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// `n x n` grid in the xy plane, each cell split along the (i, j) to
    /// (i + 1, j + 1) diagonal. Vertex `(i, j)` has index `i + j * n`.
    fn grid(n: usize, height: impl Fn(usize, usize) -> f64) -> HalfEdgeMesh {
        let mut vertices = Vec::with_capacity(n * n);
        for j in 0..n {
            for i in 0..n {
                vertices.push(Point3::new(i as f64, j as f64, height(i, j)));
            }
        }
        let mut faces = Vec::new();
        for j in 0..n - 1 {
            for i in 0..n - 1 {
                let a = i + j * n;
                let (b, c, d) = (a + 1, a + n + 1, a + n);
                faces.push([a, b, c]);
                faces.push([a, c, d]);
            }
        }
        build_from_triangles(&vertices, &faces).unwrap()
    }

    fn bumpy(i: usize, j: usize) -> f64 {
        ((i * 7 + j * 3) % 5) as f64 * 0.1
    }

    fn interior(n: usize, lo: usize, hi: usize) -> Vec<VertexId> {
        let mut ids = Vec::new();
        for j in lo..=hi {
            for i in lo..=hi {
                ids.push(VertexId::new(i + j * n));
            }
        }
        ids
    }

    fn cube() -> HalfEdgeMesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        let faces = [
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        build_from_triangles(&vertices, &faces).unwrap()
    }

    /// Hexagon fan around vertex 0 with a dented center.
    fn hexagon() -> HalfEdgeMesh {
        let mut vertices = vec![Point3::new(0.1, -0.2, -0.5)];
        for k in 0..6 {
            let a = k as f64 * std::f64::consts::PI / 3.0;
            vertices.push(Point3::new(a.cos(), a.sin(), (k % 2) as f64 * 0.3));
        }
        let faces: Vec<[usize; 3]> = (0..6).map(|k| [0, 1 + k, 1 + (k + 1) % 6]).collect();
        build_from_triangles(&vertices, &faces).unwrap()
    }

    /// Disk with center 0, inner ring 1..=6 and outer ring 7..=12. Inner
    /// vertices have valence 5; radii and heights are irregular.
    fn two_ring_disk() -> HalfEdgeMesh {
        let mut vertices = vec![Point3::new(0.05, -0.03, 0.4)];
        for (ring, base) in [(1.0, 0.0), (2.0, -0.5)] {
            for k in 0..6 {
                let a = (k as f64 + base) * std::f64::consts::PI / 3.0;
                let r = ring + 0.15 * (k % 3) as f64;
                let z = if ring < 1.5 { 0.3 * (k % 2) as f64 } else { -0.2 * (k % 3) as f64 };
                vertices.push(Point3::new(r * a.cos(), r * a.sin(), z));
            }
        }

        let inner = |k: usize| 1 + k % 6;
        let outer = |k: usize| 7 + k % 6;
        let mut faces = Vec::new();
        for k in 0..6 {
            faces.push([0, inner(k), inner(k + 1)]);
            faces.push([inner(k), outer(k), outer(k + 1)]);
            faces.push([inner(k), outer(k + 1), inner(k + 1)]);
        }
        build_from_triangles(&vertices, &faces).unwrap()
    }

    fn positions(mesh: &HalfEdgeMesh) -> Vec<Point3<f64>> {
        mesh.vertex_ids().map(|v| *mesh.position(v)).collect()
    }

    fn max_distance(a: &[Point3<f64>], b: &[Point3<f64>]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(p, q)| (p - q).norm())
            .fold(0.0, f64::max)
    }

    /// Every edge weighs zero.
    struct ZeroCoupling;

    impl FairingWeights<HalfEdgeMesh> for ZeroCoupling {
        fn vertex_weight(&self, _mesh: &HalfEdgeMesh, _v: VertexId) -> f64 {
            1.0
        }

        fn edge_weight(&self, _mesh: &HalfEdgeMesh, _he: HalfEdgeId) -> f64 {
            0.0
        }
    }

    /// Edges between two free vertices weigh zero, all others one.
    struct FreeDecoupled(Vec<VertexId>);

    impl FairingWeights<HalfEdgeMesh> for FreeDecoupled {
        fn vertex_weight(&self, _mesh: &HalfEdgeMesh, _v: VertexId) -> f64 {
            1.0
        }

        fn edge_weight(&self, mesh: &HalfEdgeMesh, he: HalfEdgeId) -> f64 {
            if self.0.contains(&mesh.origin(he)) && self.0.contains(&mesh.dest(he)) {
                0.0
            } else {
                1.0
            }
        }
    }

    /// LU solver that counts calls and can fail the n-th solve.
    struct CountingSolver {
        inner: DenseLuSolver,
        factors: usize,
        solves: AtomicUsize,
        fail_solve: Option<usize>,
    }

    impl CountingSolver {
        fn new(fail_solve: Option<usize>) -> Self {
            Self {
                inner: DenseLuSolver::new(),
                factors: 0,
                solves: AtomicUsize::new(0),
                fail_solve,
            }
        }
    }

    impl LinearSolver for CountingSolver {
        fn factor(&mut self, matrix: &SparseMatrix) -> Result<Factorization> {
            self.factors += 1;
            self.inner.factor(matrix)
        }

        fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>> {
            let call = self.solves.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_solve == Some(call) {
                return Err(FairError::singular("diverged"));
            }
            self.inner.solve(rhs)
        }
    }

    #[test]
    fn test_continuity_mapping() {
        assert_eq!(Continuity::from_order(0).unwrap().depth(), 1);
        assert_eq!(Continuity::from_order(1).unwrap(), Continuity::ThinPlate);
        assert_eq!(Continuity::from_order(2).unwrap().depth(), 3);
        assert!(Continuity::from_order(3).is_err());
    }

    #[test]
    fn test_axis_display() {
        let names: Vec<String> = Axis::ALL.iter().map(|a| a.to_string()).collect();
        assert_eq!(names, ["x", "y", "z"]);
        assert_eq!(Axis::Z.index(), 2);
    }

    #[test]
    fn test_whole_cube_membrane_collapses_to_fixed_vertex() {
        let mut mesh = cube();
        let all: Vec<VertexId> = mesh.vertex_ids().collect();

        let report = fair(&mut mesh, all, 0).unwrap();

        assert!(report.pruned);
        assert_eq!(report.requested, 8);
        assert_eq!(report.free_vertices, 7);
        // Fewer than ten vertices: the first one is fixed
        for v in mesh.vertex_ids() {
            assert!(mesh.position(v).coords.norm() < 1e-9, "{:?} did not converge", v);
        }
    }

    #[test]
    fn test_cube_corner_moves_to_neighbor_mean() {
        let mut mesh = cube();
        let corner = VertexId::new(6);
        let mean = mesh
            .vertex_neighbors(corner)
            .fold(Point3::origin(), |acc, v| acc + mesh.position(v).coords);
        let mean = mean / mesh.valence(corner) as f64;

        let report = fair(&mut mesh, [corner], 0).unwrap();

        assert!(!report.pruned);
        assert_eq!(report.free_vertices, 1);
        assert!((mesh.position(corner) - mean).norm() < 1e-9);
    }

    #[test]
    fn test_single_interior_vertex_membrane() {
        let mut mesh = hexagon();
        let ring = (1..=6).fold(Point3::origin(), |acc, k| {
            acc + mesh.position(VertexId::new(k)).coords / 6.0
        });

        fair(&mut mesh, [VertexId::new(0)], 0).unwrap();

        assert_relative_eq!(*mesh.position(VertexId::new(0)), ring, epsilon = 1e-12);
    }

    #[test]
    fn test_two_ring_disk_membrane_and_thin_plate_solutions() {
        let center = VertexId::new(0);
        let before = positions(&two_ring_disk());
        let inner = (1..=6).fold(Point3::origin(), |acc, k| acc + before[k].coords / 6.0);
        let outer = (7..=12).fold(Point3::origin(), |acc, k| acc + before[k].coords / 6.0);

        let mut membrane = two_ring_disk();
        fair(&mut membrane, [center], 0).unwrap();
        assert_relative_eq!(*membrane.position(center), inner, epsilon = 1e-12);

        // L²(p)(0) = 0 with valence-5 inner vertices gives c = (4A - B) / 3
        let mut plate = two_ring_disk();
        fair(&mut plate, [center], 1).unwrap();
        let expected = Point3::from((4.0 * inner.coords - outer.coords) / 3.0);
        assert_relative_eq!(*plate.position(center), expected, epsilon = 1e-12);

        assert!((membrane.position(center) - plate.position(center)).norm() > 1e-3);
    }

    #[test]
    fn test_membrane_and_thin_plate_differ() {
        let n = 9;
        let free = interior(n, 3, 5);
        let mut membrane = grid(n, bumpy);
        let mut plate = grid(n, bumpy);
        let before = positions(&membrane);

        fair(&mut membrane, free.iter().copied(), 0).unwrap();
        fair(&mut plate, free.iter().copied(), 1).unwrap();

        assert!(max_distance(&positions(&membrane), &positions(&plate)) > 1e-6);

        // Fixed vertices never move
        for v in membrane.vertex_ids().filter(|v| !free.contains(v)) {
            assert_eq!(membrane.position(v), &before[v.index()]);
            assert_eq!(plate.position(v), &before[v.index()]);
        }
    }

    #[test]
    fn test_planar_region_is_fixed_point() {
        let n = 9;
        let plane = |i: usize, j: usize| 0.3 * i as f64 - 0.2 * j as f64 + 1.0;
        let free = interior(n, 3, 5);

        for continuity in 0..=2 {
            let mut mesh = grid(n, plane);
            let before = positions(&mesh);
            fair(&mut mesh, free.iter().copied(), continuity).unwrap();
            assert!(
                max_distance(&positions(&mesh), &before) < 1e-9,
                "continuity {} moved a planar region",
                continuity
            );
        }
    }

    #[test]
    fn test_planar_region_fixed_with_cotangent_weights() {
        let n = 9;
        let free = interior(n, 3, 5);
        let mut mesh = grid(n, |i, j| 0.5 * i as f64 + 0.25 * j as f64);
        let before = positions(&mesh);

        let options = FairOptions::default().with_continuity(1);
        fair_with(&mut mesh, free, &CotangentWeights, &mut DenseLuSolver::new(), &options).unwrap();

        assert!(max_distance(&positions(&mesh), &before) < 1e-9);
    }

    #[test]
    fn test_zero_weights_are_singular_and_leave_mesh_untouched() {
        let mut mesh = hexagon();
        let before = positions(&mesh);

        let result = fair_with(
            &mut mesh,
            [VertexId::new(0), VertexId::new(1)],
            &ZeroCoupling,
            &mut DenseLuSolver::new(),
            &FairOptions::default().with_continuity(0),
        );

        assert!(matches!(result, Err(FairError::SingularSystem { .. })));
        assert_eq!(positions(&mesh), before);
    }

    #[test]
    fn test_free_vertices_decoupled_move_to_fixed_average() {
        let mut mesh = hexagon();
        let before = positions(&mesh);
        let free = vec![VertexId::new(0), VertexId::new(1)];

        fair_with(
            &mut mesh,
            free.clone(),
            &FreeDecoupled(free),
            &mut DenseLuSolver::new(),
            &FairOptions::default().with_continuity(0),
        )
        .unwrap();

        let center = before[2..=6].iter().fold(Point3::origin(), |acc, p| acc + p.coords / 5.0);
        let ring = Point3::from((before[2].coords + before[6].coords) / 2.0);
        assert_relative_eq!(*mesh.position(VertexId::new(0)), center, epsilon = 1e-12);
        assert_relative_eq!(*mesh.position(VertexId::new(1)), ring, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_region_is_noop() {
        let mut mesh = hexagon();
        let before = positions(&mesh);

        let report = fair(&mut mesh, Vec::<VertexId>::new(), 1).unwrap();

        assert_eq!(report.stage, FairStage::Done);
        assert_eq!(report.free_vertices, 0);
        assert_eq!(positions(&mesh), before);
    }

    #[test]
    fn test_invalid_continuity_fails_fast() {
        let mut mesh = hexagon();
        let before = positions(&mesh);

        let err = fair(&mut mesh, [VertexId::new(0)], 3).unwrap_err();

        assert!(matches!(err, FairError::InvalidParameter { name: "continuity", .. }));
        assert!(err.is_precondition());
        assert_eq!(positions(&mesh), before);
    }

    #[test]
    fn test_unknown_vertex_rejected() {
        let mut mesh = hexagon();
        let before = positions(&mesh);

        let result = fair(&mut mesh, [VertexId::new(0), VertexId::new(42)], 1);

        assert!(matches!(result, Err(FairError::VertexOutOfRange { count: 7, .. })));
        assert_eq!(positions(&mesh), before);
    }

    #[test]
    fn test_whole_grid_prunes_every_tenth_vertex() {
        let mut mesh = grid(4, bumpy);
        let all: Vec<VertexId> = mesh.vertex_ids().collect();
        let anchor = *mesh.position(VertexId::new(9));

        let report = fair(&mut mesh, all, 0).unwrap();

        assert!(report.pruned);
        assert_eq!(report.requested, 16);
        assert_eq!(report.free_vertices, 15);
        assert_eq!(mesh.position(VertexId::new(9)), &anchor);
        for v in mesh.vertex_ids() {
            assert_relative_eq!(*mesh.position(v), anchor, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_factor_once_solve_three_times() {
        let n = 7;
        let mut mesh = grid(n, bumpy);
        let mut solver = CountingSolver::new(None);

        let report = fair_with(
            &mut mesh,
            interior(n, 2, 4),
            &UniformWeights,
            &mut solver,
            &FairOptions::default(),
        )
        .unwrap();

        assert_eq!(solver.factors, 1);
        assert_eq!(solver.solves.load(Ordering::SeqCst), 3);
        assert_eq!(report.free_vertices, 9);
        assert!(report.nnz > 0);
        assert!(report.determinant.is_some());
    }

    #[test]
    fn test_failed_solve_writes_nothing() {
        let n = 7;
        let mut mesh = grid(n, bumpy);
        let before = positions(&mesh);
        let mut solver = CountingSolver::new(Some(2));

        let err = fair_with(
            &mut mesh,
            interior(n, 2, 4),
            &UniformWeights,
            &mut solver,
            &FairOptions::default().sequential(),
        )
        .unwrap_err();

        assert!(matches!(err, FairError::SolveFailure { axis: Axis::Y, .. }));
        assert_eq!(positions(&mesh), before);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let n = 9;
        let free = interior(n, 2, 6);
        let mut a = grid(n, bumpy);
        let mut b = grid(n, bumpy);

        fair_with(&mut a, free.clone(), &UniformWeights, &mut DenseLuSolver::new(), &FairOptions::default()).unwrap();
        fair_with(
            &mut b,
            free,
            &UniformWeights,
            &mut DenseLuSolver::new(),
            &FairOptions::default().sequential(),
        )
        .unwrap();

        assert!(max_distance(&positions(&a), &positions(&b)) < 1e-12);
    }

    #[test]
    fn test_sparse_and_dense_lu_agree() {
        let n = 9;
        let free = interior(n, 2, 6);
        let options = FairOptions::default().with_continuity(2);
        let mut sparse = grid(n, bumpy);
        let mut dense = grid(n, bumpy);

        let report =
            fair_with(&mut sparse, free.clone(), &UniformWeights, &mut SparseLuSolver::new(), &options)
                .unwrap();
        fair_with(&mut dense, free, &UniformWeights, &mut DenseLuSolver::new(), &options).unwrap();

        assert_eq!(report.determinant, None);
        assert!(max_distance(&positions(&sparse), &positions(&dense)) < 1e-9);
    }

    #[test]
    fn test_sparse_lu_handles_large_region() {
        // 34 x 34 free vertices: a dense copy would hold 1156² entries
        let n = 40;
        let free = interior(n, 3, 36);
        let plane = |i: usize, j: usize| 0.02 * i as f64 - 0.05 * j as f64;
        let mut mesh = grid(n, plane);
        let before = positions(&mesh);

        let report = fair(&mut mesh, free, 2).unwrap();

        assert_eq!(report.free_vertices, 34 * 34);
        assert!(report.nnz < report.free_vertices * 40);
        assert!(max_distance(&positions(&mesh), &before) < 1e-6);
    }

    #[test]
    fn test_bicgstab_solves_curvature_grid() {
        let n = 30;
        let free = interior(n, 3, 26);
        let options = FairOptions::default().with_continuity(2);
        let mut direct = grid(n, bumpy);
        let mut iterative = grid(n, bumpy);
        let before = positions(&direct);

        fair_with(&mut direct, free.clone(), &UniformWeights, &mut SparseLuSolver::new(), &options)
            .unwrap();
        let mut solver = BiCgStabSolver::new(20_000, 1e-11).unwrap();
        let report =
            fair_with(&mut iterative, free, &UniformWeights, &mut solver, &options).unwrap();

        assert_eq!(report.free_vertices, 24 * 24);
        assert!(max_distance(&positions(&direct), &before) > 1e-2);
        assert!(max_distance(&positions(&direct), &positions(&iterative)) < 1e-4);
    }

    #[test]
    fn test_iteration_cap_surfaces_as_solve_failure() {
        let n = 12;
        let mut mesh = grid(n, bumpy);
        let before = positions(&mesh);
        let mut solver = BiCgStabSolver::new(1, 1e-12).unwrap();

        let err = fair_with(
            &mut mesh,
            interior(n, 2, 9),
            &UniformWeights,
            &mut solver,
            &FairOptions::default().with_continuity(2).sequential(),
        )
        .unwrap_err();

        assert!(matches!(err, FairError::SolveFailure { axis: Axis::X, .. }));
        assert_eq!(positions(&mesh), before);
    }

    #[test]
    fn test_invalid_pruning_rejected_for_any_region() {
        let mut mesh = hexagon();
        let before = positions(&mesh);
        let options = FairOptions::default().with_pruning(PruningPolicy::Decimate { percent: -1.0 });

        for region in [Vec::new(), vec![VertexId::new(0)]] {
            let err = fair_with(
                &mut mesh,
                region,
                &UniformWeights,
                &mut SparseLuSolver::new(),
                &options,
            )
            .unwrap_err();
            assert!(matches!(err, FairError::InvalidParameter { name: "percent", .. }));
        }
        assert_eq!(positions(&mesh), before);
    }

    #[test]
    fn test_progress_walks_every_stage() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&stages);
        let progress = Progress::new(move |_, _, stage| sink.lock().unwrap().push(stage.to_string()));

        let mut mesh = hexagon();
        fair_with_progress(
            &mut mesh,
            [VertexId::new(0)],
            &UniformWeights,
            &mut DenseLuSolver::new(),
            &FairOptions::default(),
            &progress,
        )
        .unwrap();

        assert_eq!(
            stages.lock().unwrap().as_slice(),
            ["Selecting", "Assembling", "Factoring", "Solving", "WritingBack", "Done"]
        );
    }

    #[test]
    fn test_progress_reports_failure() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&stages);
        let progress = Progress::new(move |_, _, stage| sink.lock().unwrap().push(stage.to_string()));

        let mut mesh = hexagon();
        let options = FairOptions::default().with_continuity(7);
        let result = fair_with_progress(
            &mut mesh,
            [VertexId::new(0)],
            &UniformWeights,
            &mut DenseLuSolver::new(),
            &options,
            &progress,
        );

        assert!(result.is_err());
        assert_eq!(stages.lock().unwrap().as_slice(), ["Selecting", "Failed"]);
    }
}
