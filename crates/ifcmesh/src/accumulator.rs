//! Builds the combined model mesh from per-entity geometry

use crate::session::EngineError;
use crate::types::{AccumulatedMesh, GeometryInstance, MeshRegion};

/// Appends entity geometry into shared vertex, index and normal buffers
///
/// Local indices address vertices within their own instance; on append they
/// are offset by the number of vertices already accumulated so they address
/// the combined vertex array.
#[derive(Debug, Default)]
pub struct MeshAccumulator {
    mesh: AccumulatedMesh,
}

impl MeshAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an accumulator with room for the given number of floats and indices
    pub fn with_capacity(vertex_floats: usize, indices: usize) -> Self {
        Self {
            mesh: AccumulatedMesh {
                indices: Vec::with_capacity(indices),
                vertices: Vec::with_capacity(vertex_floats),
                normals: Vec::with_capacity(vertex_floats),
            },
        }
    }

    /// Append one instance and return the region it occupies
    ///
    /// Fails without modifying the mesh if a rebased index would not fit in
    /// an `i32`.
    pub fn append(&mut self, instance: &GeometryInstance) -> Result<MeshRegion, EngineError> {
        let start_vertex = self.mesh.vertices.len() / 3;
        let too_large = || EngineError::MeshTooLarge {
            vertices: start_vertex.saturating_add(instance.vertex_count()),
        };

        let offset = i32::try_from(start_vertex).map_err(|_| too_large())?;
        let rebased = instance
            .indices
            .iter()
            .map(|&i| i.checked_add(offset).ok_or_else(too_large))
            .collect::<Result<Vec<i32>, EngineError>>()?;

        let region = MeshRegion::new(
            start_vertex,
            self.mesh.indices.len(),
            instance.triangle_count(),
        );
        self.mesh.indices.extend(rebased);
        self.mesh.vertices.extend_from_slice(&instance.vertices);
        self.mesh.normals.extend_from_slice(&instance.normals);

        Ok(region)
    }

    /// Get the mesh built so far
    pub fn mesh(&self) -> &AccumulatedMesh {
        &self.mesh
    }

    /// Number of vertices accumulated so far
    pub fn vertex_count(&self) -> usize {
        self.mesh.vertex_count()
    }

    /// Stop accumulating and take the combined mesh
    pub fn finish(self) -> AccumulatedMesh {
        self.mesh
    }
}
