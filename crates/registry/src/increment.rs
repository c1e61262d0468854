use std::collections::{HashMap, HashSet};

use graphport_ir::{ObjectId, Record};

use crate::error::RegistryError;
use crate::key::IdentityKey;

/// A cached object: its id and sealed record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistryEntry<'a> {
    pub object_id: ObjectId,
    pub content: &'a Record,
}

/// The objects one walk added, not yet visible to other walks.
///
/// An increment has the same lookup surface as the long-term registry.
/// Records are kept in the order they were sealed.
#[derive(Debug, Default, Clone)]
pub struct RegistryIncrement {
    ids: HashMap<IdentityKey, ObjectId>,
    allocated: HashSet<ObjectId>,
    definitions: HashMap<ObjectId, Record>,
    sealed: Vec<ObjectId>,
}

impl RegistryIncrement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fully formed entry: key, id and record at once.
    pub fn push_entry(
        &mut self,
        key: IdentityKey,
        object_id: ObjectId,
        content: Record,
    ) -> Result<(), RegistryError> {
        self.push_allocation(key, object_id);
        self.push_definition(object_id, content)
    }

    pub(crate) fn push_allocation(&mut self, key: IdentityKey, object_id: ObjectId) {
        self.ids.insert(key, object_id);
        self.allocated.insert(object_id);
    }

    /// Bind a key to an id without claiming the id for this increment.
    pub(crate) fn push_alias(&mut self, key: IdentityKey, object_id: ObjectId) {
        self.ids.insert(key, object_id);
    }

    pub(crate) fn push_definition(
        &mut self,
        object_id: ObjectId,
        content: Record,
    ) -> Result<(), RegistryError> {
        if !self.allocated.contains(&object_id) {
            return Err(RegistryError::Unallocated(object_id));
        }
        if self.definitions.contains_key(&object_id) {
            return Err(RegistryError::AlreadyDefined(object_id));
        }
        self.definitions.insert(object_id, content);
        self.sealed.push(object_id);
        Ok(())
    }

    pub(crate) fn is_allocated(&self, object_id: ObjectId) -> bool {
        self.allocated.contains(&object_id)
    }

    pub fn has_object(&self, key: &IdentityKey) -> bool {
        self.ids.contains_key(key)
    }

    pub fn object_id(&self, key: &IdentityKey) -> Option<ObjectId> {
        self.ids.get(key).copied()
    }

    /// The entry for `key`, once its record has been sealed.
    pub fn get_object(&self, key: &IdentityKey) -> Option<RegistryEntry<'_>> {
        let object_id = self.object_id(key)?;
        let content = self.definitions.get(&object_id)?;
        Some(RegistryEntry { object_id, content })
    }

    pub fn has_object_id(&self, object_id: ObjectId) -> bool {
        self.definitions.contains_key(&object_id)
    }

    pub fn get_object_definition_by_object_id(&self, object_id: ObjectId) -> Option<&Record> {
        self.definitions.get(&object_id)
    }

    /// Ids in the order their records were sealed.
    pub fn seal_order(&self) -> &[ObjectId] {
        &self.sealed
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = (&IdentityKey, &ObjectId)> {
        self.ids.iter()
    }

    pub(crate) fn into_records(self) -> Vec<(ObjectId, Record)> {
        let mut definitions = self.definitions;
        self.sealed
            .into_iter()
            .filter_map(|id| definitions.remove(&id).map(|r| (id, r)))
            .collect()
    }

    /// Number of sealed records.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// No sealed records. Keys and minted ids may still be present.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Fails if some minted id never received a record.
    pub fn check_complete(&self) -> Result<(), RegistryError> {
        let mut missing: Vec<ObjectId> = self
            .allocated
            .iter()
            .filter(|id| !self.definitions.contains_key(id))
            .copied()
            .collect();
        missing.sort();
        match missing.first() {
            Some(id) => Err(RegistryError::IncompleteIncrement(*id)),
            None => Ok(()),
        }
    }
}
