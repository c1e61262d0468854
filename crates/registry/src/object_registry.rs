use graphport_ir::{ObjectId, Record};

use crate::error::RegistryError;
use crate::increment::RegistryIncrement;
use crate::key::IdentityKey;
use crate::long_term::LongTermObjectRegistry;
use crate::traits::{ObjectDefinitions, RecordLookup, Registration};

/// A walk's view of the registry: long-term records first, then the
/// walk's own increment.
///
/// Ids are minted from the long-term counter so increments built one after
/// another never collide, even if they are merged out of order.
pub struct ObjectRegistry<'a> {
    long_term: &'a mut LongTermObjectRegistry,
    increment: RegistryIncrement,
    minted: usize,
}

impl<'a> ObjectRegistry<'a> {
    pub fn new(long_term: &'a mut LongTermObjectRegistry) -> Self {
        Self {
            long_term,
            increment: RegistryIncrement::new(),
            minted: 0,
        }
    }

    /// Ids minted by this walk so far.
    pub fn minted(&self) -> usize {
        self.minted
    }

    pub fn increment(&self) -> &RegistryIncrement {
        &self.increment
    }

    /// Detach the increment without merging it.
    pub fn into_increment(self) -> RegistryIncrement {
        self.increment
    }

    /// Merge the increment into the long-term registry.
    pub fn commit(self) -> Result<(), RegistryError> {
        let ObjectRegistry {
            long_term,
            increment,
            ..
        } = self;
        long_term.merge_increment(increment)
    }
}

impl ObjectDefinitions for ObjectRegistry<'_> {
    fn lookup(&self, key: &IdentityKey) -> Option<ObjectId> {
        self.long_term
            .object_id(key)
            .or_else(|| self.increment.object_id(key))
    }

    fn register(&mut self, key: IdentityKey) -> Registration {
        if let Some(id) = self.lookup(&key) {
            return Registration::Existing(id);
        }
        let id = self.long_term.allocate_id();
        tracing::trace!(%key, %id, "minted");
        self.increment.push_allocation(key, id);
        self.minted += 1;
        Registration::New(id)
    }

    fn alias(&mut self, key: IdentityKey, id: ObjectId) {
        if self.lookup(&key).is_none() {
            self.increment.push_alias(key, id);
        }
    }

    fn check_definable(&self, id: ObjectId) -> Result<(), RegistryError> {
        if self.increment.is_allocated(id) {
            if self.increment.has_object_id(id) {
                return Err(RegistryError::AlreadyDefined(id));
            }
            Ok(())
        } else if self.long_term.has_object_id(id) {
            Err(RegistryError::AlreadyDefined(id))
        } else {
            Err(RegistryError::Unallocated(id))
        }
    }

    fn define(&mut self, id: ObjectId, record: Record) -> Result<(), RegistryError> {
        self.check_definable(id)?;
        self.increment.push_definition(id, record)
    }
}

impl RecordLookup for ObjectRegistry<'_> {
    fn definition(&self, id: ObjectId) -> Option<&Record> {
        self.long_term
            .get_object_definition_by_object_id(id)
            .or_else(|| self.increment.get_object_definition_by_object_id(id))
    }
}
