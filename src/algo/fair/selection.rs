//! Choosing which vertices fairing solves for.
//!
//! The caller names a region; everything outside it stays fixed and acts as
//! the boundary condition. When the region covers the whole mesh nothing is
//! left to anchor the solution, so a [`PruningPolicy`] releases a few
//! vertices back to the fixed set. This is a heuristic: it makes the
//! system solvable in practice but does not prove it non-singular.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::error::{FairError, Result};
use crate::mesh::FairingMesh;

/// How to free up fixed vertices when the whole mesh is selected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PruningPolicy {
    /// Walk the region in vertex order and fix every `floor(100 / percent)`-th
    /// vertex. If that fixes nothing, the first vertex is fixed instead.
    Decimate {
        /// Target share of the region to fix, in `[0.1, 100)`.
        percent: f64,
    },
    /// Fix the vertices with the smallest and largest x, y and z
    /// coordinates (up to six vertices).
    Extremal,
}

impl Default for PruningPolicy {
    fn default() -> Self {
        PruningPolicy::Decimate { percent: 10.0 }
    }
}

impl PruningPolicy {
    /// Check the policy parameters.
    pub fn validate(&self) -> Result<()> {
        match *self {
            PruningPolicy::Decimate { percent } if !(0.1..100.0).contains(&percent) => Err(
                FairError::invalid_param("percent", percent, "must be in [0.1, 100)"),
            ),
            _ => Ok(()),
        }
    }

    /// Remove vertices from `region` according to the policy.
    ///
    /// A non-empty region always shrinks by at least one vertex.
    pub fn prune<M: FairingMesh>(&self, mesh: &M, region: &mut BTreeSet<M::Vertex>) {
        match *self {
            PruningPolicy::Decimate { percent } => decimate(region, percent),
            PruningPolicy::Extremal => remove_extremal(mesh, region),
        }
    }
}

fn decimate<V: Ord + Copy>(region: &mut BTreeSet<V>, percent: f64) {
    let frequency = ((100.0 / percent).floor() as usize).max(1);

    let removed: Vec<V> = region
        .iter()
        .enumerate()
        .filter(|(i, _)| (i + 1) % frequency == 0)
        .map(|(_, &v)| v)
        .collect();

    if removed.is_empty() {
        debug!("region smaller than removal frequency {}, fixing first vertex", frequency);
        region.pop_first();
        return;
    }

    for v in &removed {
        region.remove(v);
    }
}

fn remove_extremal<M: FairingMesh>(mesh: &M, region: &mut BTreeSet<M::Vertex>) {
    let Some(&first) = region.iter().next() else {
        return;
    };

    let mut min = [first; 3];
    let mut max = [first; 3];
    for &v in region.iter() {
        let p = mesh.point(v);
        for axis in 0..3 {
            if p[axis] < mesh.point(min[axis])[axis] {
                min[axis] = v;
            }
            if p[axis] > mesh.point(max[axis])[axis] {
                max[axis] = v;
            }
        }
    }

    // min/max may coincide; the set removes each vertex once
    for v in min.iter().chain(max.iter()) {
        region.remove(v);
    }
}

/// Validate and deduplicate the caller's region.
///
/// Fails with [`FairError::VertexOutOfRange`] if the region names a vertex
/// the mesh does not contain.
pub fn collect_region<M, It>(mesh: &M, vertices: It) -> Result<BTreeSet<M::Vertex>>
where
    M: FairingMesh,
    It: IntoIterator<Item = M::Vertex>,
{
    let mut region = BTreeSet::new();
    for v in vertices {
        if !mesh.contains_vertex(v) {
            warn!("fairing region names unknown vertex {:?}", v);
            return Err(FairError::VertexOutOfRange {
                vertex: format!("{:?}", v),
                count: mesh.vertex_count(),
            });
        }
        region.insert(v);
    }
    Ok(region)
}

/// Whether the region covers every vertex of the mesh.
///
/// Compares sizes only; the region is already known to be a deduplicated
/// subset of the mesh.
pub fn covers_whole_mesh<M: FairingMesh>(mesh: &M, region: &BTreeSet<M::Vertex>) -> bool {
    !region.is_empty() && region.len() == mesh.vertex_count()
}

/// Turn a collected region into the free set, pruning if it covers the
/// whole mesh.
///
/// `region` comes from [`collect_region`]. Returns the free vertices and
/// whether pruning took place.
pub fn select_free_vertices<M: FairingMesh>(
    mesh: &M,
    mut region: BTreeSet<M::Vertex>,
    policy: PruningPolicy,
) -> Result<(BTreeSet<M::Vertex>, bool)> {
    policy.validate()?;

    if !covers_whole_mesh(mesh, &region) {
        return Ok((region, false));
    }

    let before = region.len();
    policy.prune(mesh, &mut region);
    warn!(
        "whole mesh selected for fairing, fixed {} of {} vertices ({:?})",
        before - region.len(),
        before,
        policy
    );
    Ok((region, true))
}

/// Dense numbering of free vertices: the row and column order of the
/// fairing system.
#[derive(Debug, Clone)]
pub struct VertexIdMap<V> {
    ids: BTreeMap<V, usize>,
    order: Vec<V>,
}

impl<V: Ord + Copy + std::fmt::Debug> VertexIdMap<V> {
    /// Number vertices in sequence order.
    ///
    /// Fails with [`FairError::DuplicateVertex`] if a vertex repeats.
    pub fn from_ordered<It: IntoIterator<Item = V>>(vertices: It) -> Result<Self> {
        let mut ids = BTreeMap::new();
        let mut order = Vec::new();
        for v in vertices {
            if ids.insert(v, order.len()).is_some() {
                warn!("duplicate vertex {:?} while numbering free vertices", v);
                return Err(FairError::DuplicateVertex {
                    vertex: format!("{:?}", v),
                });
            }
            order.push(v);
        }
        Ok(Self { ids, order })
    }

    /// System index of `v`, or `None` if `v` is fixed.
    #[inline]
    pub fn get(&self, v: &V) -> Option<usize> {
        self.ids.get(v).copied()
    }

    /// Number of free vertices.
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether there are no free vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Free vertices in index order.
    pub fn vertices(&self) -> &[V] {
        &self.order
    }
}
