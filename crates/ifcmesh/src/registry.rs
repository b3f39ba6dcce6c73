//! Lookup tables from entity type and entity id to mesh regions

use crate::types::MeshRegion;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Records where each entity's geometry landed in the combined mesh
#[derive(Debug, Default, Clone)]
pub struct InstanceRegistry {
    by_type: HashMap<String, Vec<MeshRegion>>,
    by_id: HashMap<i32, MeshRegion>,
}

impl InstanceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a region under its entity type and, if known, its id
    ///
    /// Type names are stored upper-cased. A later region for an id that is
    /// already registered replaces the earlier one.
    pub fn record(&mut self, entity_type: &str, id: Option<i32>, region: MeshRegion) {
        self.by_type
            .entry(entity_type.to_uppercase())
            .or_default()
            .push(region);

        if let Some(id) = id {
            if let Some(previous) = self.by_id.insert(id, region) {
                debug!(
                    "Entity #{} registered again, replacing {:?} with {:?}",
                    id, previous, region
                );
            }
        }
    }

    /// Regions of every instance of a type, in stream order
    ///
    /// The name is matched case-insensitively. Unknown types yield an empty
    /// slice.
    pub fn by_type(&self, entity_type: &str) -> &[MeshRegion] {
        self.by_type
            .get(&entity_type.to_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Region of a single entity
    ///
    /// Entities the engine produced no geometry for get [`MeshRegion::EMPTY`].
    pub fn by_id(&self, id: i32) -> MeshRegion {
        match self.by_id.get(&id) {
            Some(region) => *region,
            None => {
                warn!("Entity #{} not found in model", id);
                MeshRegion::EMPTY
            }
        }
    }

    /// True if an entity id has a region
    pub fn contains_id(&self, id: i32) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Upper-cased type names seen so far
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.by_type.keys().map(String::as_str)
    }

    /// Number of entity ids registered
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True if no entity id is registered
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
