//! Shared types for engine geometry and the assembled model mesh

/// Geometry for a single entity instance, as produced by the engine
///
/// Instances are transient: the session consumes each one as soon as it is
/// pulled and only the derived [`MeshRegion`] survives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryInstance {
    /// Numeric entity id; the subprocess wire format does not carry one
    pub id: Option<i32>,
    /// Entity name, empty when the transport does not report it
    pub name: String,
    /// Entity type name as reported by the engine (e.g. "IfcWall")
    pub entity_type: String,
    /// Global unique id, empty when the transport does not report it
    pub guid: String,
    /// Flattened vertex positions (x,y,z triplets)
    pub vertices: Vec<f32>,
    /// Triangle indices into `vertices`, counted in triplets
    pub indices: Vec<i32>,
    /// Flattened vertex normals (x,y,z triplets), possibly empty
    pub normals: Vec<f32>,
}

impl GeometryInstance {
    /// Create an instance with the given type and geometry
    pub fn new(entity_type: impl Into<String>, vertices: Vec<f32>, indices: Vec<i32>) -> Self {
        Self {
            entity_type: entity_type.into(),
            vertices,
            indices,
            ..Default::default()
        }
    }

    /// Attach a numeric entity id
    pub fn with_id(mut self, id: i32) -> Self {
        self.id = Some(id);
        self
    }

    /// Attach vertex normals
    pub fn with_normals(mut self, normals: Vec<f32>) -> Self {
        self.normals = normals;
        self
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Get the number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check if normals are present
    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    /// Validate the geometry consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.vertices.len() % 3 != 0 {
            return Err(format!(
                "Vertex count {} is not divisible by 3",
                self.vertices.len()
            ));
        }

        if self.has_normals() && self.normals.len() != self.vertices.len() {
            return Err(format!(
                "Normal count {} doesn't match vertex count {}",
                self.normals.len(),
                self.vertices.len()
            ));
        }

        if self.indices.len() % 3 != 0 {
            return Err(format!(
                "Index count {} is not divisible by 3",
                self.indices.len()
            ));
        }

        if let Some(&bad) = self
            .indices
            .iter()
            .find(|&&i| i < 0 || i as usize >= self.vertex_count())
        {
            return Err(format!(
                "Index {} out of range for {} vertices",
                bad,
                self.vertex_count()
            ));
        }

        Ok(())
    }
}

/// Contiguous span of the combined buffers belonging to one entity
///
/// `start_vertex` counts whole vertices (xyz triplets) and is also the value
/// added to the entity's local indices. `start_index` is the position of the
/// first index entry in the flat index array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MeshRegion {
    /// First vertex of the entity in the combined vertex array
    pub start_vertex: usize,
    /// First entry of the entity in the combined index array
    pub start_index: usize,
    /// Number of triangles
    pub primitive_count: usize,
}

impl MeshRegion {
    /// Zero-extent placeholder handed out for entities without geometry
    pub const EMPTY: MeshRegion = MeshRegion {
        start_vertex: 0,
        start_index: 0,
        primitive_count: 0,
    };

    /// Create a new region
    pub const fn new(start_vertex: usize, start_index: usize, primitive_count: usize) -> Self {
        Self {
            start_vertex,
            start_index,
            primitive_count,
        }
    }

    /// True if the region covers no triangles
    pub fn is_empty(&self) -> bool {
        self.primitive_count == 0
    }

    /// Range of this region within the combined index array
    pub fn index_range(&self) -> std::ops::Range<usize> {
        self.start_index..self.start_index + self.primitive_count * 3
    }
}

/// The combined geometry of every instance pulled from the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatedMesh {
    /// Rebased triangle indices into `vertices`, counted in triplets
    pub indices: Vec<i32>,
    /// Flattened vertex positions (x,y,z triplets)
    pub vertices: Vec<f32>,
    /// Flattened vertex normals; may be shorter than `vertices`
    pub normals: Vec<f32>,
}

impl AccumulatedMesh {
    /// Get the number of vertices in the mesh
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Get the number of triangles in the mesh
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// True if every index points at an existing vertex
    pub fn indices_in_bounds(&self) -> bool {
        let count = self.vertex_count();
        self.indices.iter().all(|&i| i >= 0 && (i as usize) < count)
    }

    /// Indices covered by a region
    pub fn region_indices(&self, region: &MeshRegion) -> &[i32] {
        let range = region.index_range();
        let end = range.end.min(self.indices.len());
        &self.indices[range.start.min(end)..end]
    }
}
