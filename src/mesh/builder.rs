//! Mesh construction from face-vertex lists.

use std::collections::HashMap;

use nalgebra::Point3;

use super::halfedge::{Face, HalfEdge, HalfEdgeMesh};
use super::index::{FaceId, HalfEdgeId, MeshIndex, VertexId};
use crate::error::{FairError, Result};

/// Build a half-edge mesh from vertices and triangle faces.
///
/// Faces must be consistently oriented and the result must be manifold:
/// every directed edge may appear in at most one face, and every vertex may
/// touch at most one boundary loop.
///
/// # Example
/// ```
/// use fairmesh::mesh::{build_from_triangles, HalfEdgeMesh};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let faces = vec![[0, 1, 2]];
///
/// let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_faces(), 1);
/// ```
pub fn build_from_triangles<I: MeshIndex>(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<HalfEdgeMesh<I>> {
    if faces.is_empty() {
        return Err(FairError::EmptyMesh);
    }

    for (fi, face) in faces.iter().enumerate() {
        if let Some(&vi) = face.iter().find(|&&vi| vi >= vertices.len()) {
            return Err(FairError::InvalidVertexIndex { face: fi, vertex: vi });
        }
        if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
            return Err(FairError::DegenerateFace { face: fi });
        }
    }

    let mut mesh = HalfEdgeMesh::with_capacity(vertices.len(), faces.len());
    for &pos in vertices {
        mesh.add_vertex(pos);
    }

    // Directed edge (from, to) -> half-edge
    let mut edge_map: HashMap<(usize, usize), HalfEdgeId<I>> =
        HashMap::with_capacity(faces.len() * 3);

    for (fi, face) in faces.iter().enumerate() {
        let base = mesh.num_halfedges();
        let face_id = FaceId::<I>::new(fi);
        mesh.faces.push(Face::new(HalfEdgeId::new(base)));

        for k in 0..3 {
            let (from, to) = (face[k], face[(k + 1) % 3]);
            let id = HalfEdgeId::<I>::new(base + k);
            if edge_map.insert((from, to), id).is_some() {
                return Err(FairError::NonManifoldEdge { v0: from, v1: to });
            }
            mesh.halfedges.push(HalfEdge {
                origin: VertexId::new(from),
                twin: HalfEdgeId::invalid(),
                next: HalfEdgeId::new(base + (k + 1) % 3),
                prev: HalfEdgeId::new(base + (k + 2) % 3),
                face: face_id,
            });
            mesh.vertex_mut(VertexId::new(from)).halfedge = id;
        }
    }

    // Link twins in face order so boundary half-edge ids are deterministic
    let mut boundary_out: HashMap<usize, HalfEdgeId<I>> = HashMap::new();
    for face in faces {
        for k in 0..3 {
            let (from, to) = (face[k], face[(k + 1) % 3]);
            let he = edge_map[&(from, to)];
            if mesh.twin(he).is_valid() {
                continue;
            }
            match edge_map.get(&(to, from)) {
                Some(&twin) => {
                    mesh.halfedge_mut(he).twin = twin;
                    mesh.halfedge_mut(twin).twin = he;
                }
                None => {
                    let bhe = HalfEdgeId::<I>::new(mesh.num_halfedges());
                    mesh.halfedges.push(HalfEdge {
                        origin: VertexId::new(to),
                        twin: he,
                        ..HalfEdge::new()
                    });
                    mesh.halfedge_mut(he).twin = bhe;
                    if boundary_out.insert(to, bhe).is_some() {
                        return Err(FairError::NonManifoldVertex { vertex: to });
                    }
                }
            }
        }
    }

    link_boundary_loops(&mut mesh, &boundary_out);

    Ok(mesh)
}

/// Chain boundary half-edges into loops and make boundary vertices point
/// at their outgoing boundary half-edge.
fn link_boundary_loops<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    boundary_out: &HashMap<usize, HalfEdgeId<I>>,
) {
    for (&origin, &he) in boundary_out {
        let dest = mesh.dest(he).index();
        if let Some(&next) = boundary_out.get(&dest) {
            mesh.halfedge_mut(he).next = next;
            mesh.halfedge_mut(next).prev = he;
        }
        mesh.vertex_mut(VertexId::new(origin)).halfedge = he;
    }
}

/// Convert a half-edge mesh back to a face-vertex representation.
pub fn to_face_vertex<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let vertices = mesh.vertex_ids().map(|v| *mesh.position(v)).collect();
    let faces = mesh
        .face_ids()
        .map(|f| {
            let [v0, v1, v2] = mesh.face_triangle(f);
            [v0.index(), v1.index(), v2.index()]
        })
        .collect();
    (vertices, faces)
}
