//! Per-job deduplication of harvested handles.
//!
//! Both strategies feed entities through an [`EntityAccumulator`]. The seen
//! set is a `HashSet`, so repeated passes over a reflowing list stay cheap
//! as it grows into the thousands.

use std::collections::HashSet;

use crate::types::Entity;

/// Set of handles already seen in one harvest job.
#[derive(Debug, Default)]
pub struct SeenSet {
    handles: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle. Returns `true` if it was not seen before.
    pub fn insert(&mut self, handle: &str) -> bool {
        if self.handles.contains(handle) {
            return false;
        }
        self.handles.insert(handle.to_string())
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.handles.contains(handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// First-seen ordered, deduplicated entity list with an upper bound.
///
/// The first sighting of a handle wins; later sightings never overwrite it.
#[derive(Debug)]
pub struct EntityAccumulator {
    seen: SeenSet,
    entities: Vec<Entity>,
    limit: usize,
}

impl EntityAccumulator {
    pub fn new(limit: usize) -> Self {
        Self {
            seen: SeenSet::new(),
            entities: Vec::new(),
            limit,
        }
    }

    /// Offer an entity. Returns `true` if it was new and accepted.
    ///
    /// Entities with an empty handle and entities offered after the bound
    /// is reached are rejected.
    pub fn offer(&mut self, entity: Entity) -> bool {
        if entity.handle.is_empty() || self.is_full() {
            return false;
        }
        if !self.seen.insert(&entity.handle) {
            return false;
        }
        self.entities.push(entity);
        true
    }

    /// Offer a batch; returns how many were new.
    pub fn extend<I: IntoIterator<Item = Entity>>(&mut self, batch: I) -> usize {
        let mut added = 0;
        for entity in batch {
            if self.is_full() {
                break;
            }
            if self.offer(entity) {
                added += 1;
            }
        }
        added
    }

    pub fn is_full(&self) -> bool {
        self.entities.len() >= self.limit
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.seen.contains(handle)
    }

    pub fn into_entities(mut self) -> Vec<Entity> {
        self.entities.truncate(self.limit);
        self.entities
    }
}
