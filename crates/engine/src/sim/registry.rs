use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(pub u64);

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorldId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(WorldId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no object registered under worldid {id}")]
    NotFound { id: WorldId },
    #[error("worldid {id} is already registered")]
    AlreadyRegistered { id: WorldId },
}

/// Id to object table. Ids come from a monotonic allocator and are never handed out twice.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    objects: BTreeMap<WorldId, T>,
    next_id: u64,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_id(&mut self) -> WorldId {
        let id = WorldId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert_with(&mut self, build: impl FnOnce(WorldId) -> T) -> WorldId {
        let id = self.allocate_id();
        self.objects.insert(id, build(id));
        id
    }

    /// Registers `object` under an id that was allocated elsewhere (e.g. read from a save).
    pub fn register(&mut self, id: WorldId, object: T) -> Result<(), RegistryError> {
        if self.objects.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered { id });
        }
        self.objects.insert(id, object);
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        Ok(())
    }

    pub fn remove(&mut self, id: WorldId) -> Result<T, RegistryError> {
        self.objects
            .remove(&id)
            .ok_or(RegistryError::NotFound { id })
    }

    pub fn get(&self, id: WorldId) -> Result<&T, RegistryError> {
        self.objects.get(&id).ok_or(RegistryError::NotFound { id })
    }

    pub fn get_mut(&mut self, id: WorldId) -> Result<&mut T, RegistryError> {
        self.objects
            .get_mut(&id)
            .ok_or(RegistryError::NotFound { id })
    }

    pub fn contains(&self, id: WorldId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Objects in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (WorldId, &T)> {
        self.objects.iter().map(|(id, object)| (*id, object))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (WorldId, &mut T)> {
        self.objects.iter_mut().map(|(id, object)| (*id, object))
    }

    pub fn ids(&self) -> Vec<WorldId> {
        self.objects.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Never moves the allocator backwards past a live id.
    pub fn restore_next_id(&mut self, next_id: u64) {
        let floor = self
            .objects
            .keys()
            .next_back()
            .map(|id| id.0.saturating_add(1))
            .unwrap_or(1);
        self.next_id = next_id.max(floor);
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }
}
