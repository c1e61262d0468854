use std::collections::HashMap;

use graphport_ir::{ObjectId, Record};

use crate::error::RegistryError;
use crate::increment::{RegistryEntry, RegistryIncrement};
use crate::key::IdentityKey;
use crate::traits::RecordLookup;

/// The process-wide cache of converted objects.
///
/// Ids are never reused. Records are only ever added, through
/// [`merge_increment`](Self::merge_increment); a record once merged never
/// changes.
#[derive(Debug, Default)]
pub struct LongTermObjectRegistry {
    next_id: u64,
    ids: HashMap<IdentityKey, ObjectId>,
    definitions: HashMap<ObjectId, Record>,
}

impl LongTermObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh id. Minting is the only place ids come from, so walks
    /// building separate increments never collide.
    pub fn allocate_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn has_object(&self, key: &IdentityKey) -> bool {
        self.ids.contains_key(key)
    }

    pub fn object_id(&self, key: &IdentityKey) -> Option<ObjectId> {
        self.ids.get(key).copied()
    }

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

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Fold an increment in.
    ///
    /// Keys already bound keep their existing id. A record under an id that
    /// already holds an equal record is a no-op, so merging the same
    /// increment twice is harmless. Nothing is applied unless the whole
    /// increment is consistent.
    pub fn merge_increment(&mut self, increment: RegistryIncrement) -> Result<(), RegistryError> {
        increment.check_complete()?;
        for id in increment.seal_order() {
            if let (Some(existing), Some(incoming)) = (
                self.definitions.get(id),
                increment.get_object_definition_by_object_id(*id),
            ) {
                if existing != incoming {
                    return Err(RegistryError::ConflictingDefinition(*id));
                }
            }
        }

        let mut added_keys = 0usize;
        for (key, id) in increment.keys() {
            match self.ids.get(key) {
                Some(existing) if existing != id => {
                    tracing::debug!(%key, kept = %existing, dropped = %id, "key already bound");
                }
                Some(_) => {}
                None => {
                    self.ids.insert(key.clone(), *id);
                    added_keys += 1;
                }
            }
        }

        let mut added_records = 0usize;
        for (id, record) in increment.into_records() {
            if id.0 >= self.next_id {
                self.next_id = id.0 + 1;
            }
            if !self.definitions.contains_key(&id) {
                self.definitions.insert(id, record);
                added_records += 1;
            }
        }

        tracing::debug!(
            added_keys,
            added_records,
            total = self.definitions.len(),
            "merged increment"
        );
        Ok(())
    }
}

impl RecordLookup for LongTermObjectRegistry {
    fn definition(&self, id: ObjectId) -> Option<&Record> {
        self.definitions.get(&id)
    }
}
