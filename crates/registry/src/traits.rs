use std::collections::{BTreeMap, HashSet};

use graphport_ir::{ModulePath, ObjectId, Primitive, Record};

use crate::error::RegistryError;
use crate::key::IdentityKey;

/// Adjacency map from every id in a closure to the ids it references directly.
pub type DependencyGraph = BTreeMap<ObjectId, Vec<ObjectId>>;

/// Outcome of [`ObjectDefinitions::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The key was already known; nothing new was minted.
    Existing(ObjectId),
    /// A fresh id was minted for the key and still needs a record.
    New(ObjectId),
}

impl Registration {
    pub fn id(self) -> ObjectId {
        match self {
            Registration::Existing(id) | Registration::New(id) => id,
        }
    }
}

/// Read access to sealed records.
pub trait RecordLookup {
    /// The sealed record for `id`.
    fn definition(&self, id: ObjectId) -> Option<&Record>;

    /// Every id reachable from `root`, each mapped to its direct references.
    ///
    /// Fails with [`RegistryError::MissingDefinition`] if any reachable id
    /// has no record.
    fn dependency_graph(&self, root: ObjectId) -> Result<DependencyGraph, RegistryError> {
        let mut graph = DependencyGraph::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if graph.contains_key(&id) {
                continue;
            }
            let record = self
                .definition(id)
                .ok_or(RegistryError::MissingDefinition(id))?;
            let deps = record.referenced_ids();
            for dep in deps.iter().rev() {
                if !graph.contains_key(dep) {
                    stack.push(*dep);
                }
            }
            graph.insert(id, deps);
        }
        Ok(graph)
    }
}

/// The registry capability the walker depends on.
///
/// ## Protocol
///
/// 1. `register(key)` mints an id (or returns the one already bound to the
///    key). Minting first lets cyclic graphs refer to an object before its
///    record exists.
/// 2. `define(id, record)` seals the record. Each id is defined exactly once.
///
/// The typed `define_*` helpers build the matching [`Record`] and call
/// `define`.
pub trait ObjectDefinitions: RecordLookup {
    /// Id bound to `key`, if any.
    fn lookup(&self, key: &IdentityKey) -> Option<ObjectId>;

    /// Bind `key` to an id, minting one if the key is new.
    fn register(&mut self, key: IdentityKey) -> Registration;

    /// Bind an extra key to an id that already exists, e.g. the object a
    /// substitute stood in for. A key that is already bound is left alone.
    fn alias(&mut self, key: IdentityKey, id: ObjectId);

    /// Whether `define(id, ..)` would be accepted right now.
    fn check_definable(&self, id: ObjectId) -> Result<(), RegistryError>;

    /// Seal the record for a minted id.
    fn define(&mut self, id: ObjectId, record: Record) -> Result<(), RegistryError>;

    /// Seal a group of records that may reference each other. Records of a
    /// group become visible together or not at all.
    fn define_group(&mut self, records: Vec<(ObjectId, Record)>) -> Result<(), RegistryError> {
        let mut ids = HashSet::with_capacity(records.len());
        for (id, _) in &records {
            self.check_definable(*id)?;
            if !ids.insert(*id) {
                return Err(RegistryError::AlreadyDefined(*id));
            }
        }
        for (id, record) in records {
            self.define(id, record)?;
        }
        Ok(())
    }

    // ── Typed helpers ───────────────────────────────────────────────

    fn define_primitive(&mut self, id: ObjectId, value: Primitive) -> Result<(), RegistryError> {
        self.define(id, Record::Primitive(value))
    }

    fn define_tuple(
        &mut self,
        id: ObjectId,
        member_ids: Vec<ObjectId>,
    ) -> Result<(), RegistryError> {
        self.define(id, Record::Tuple { member_ids })
    }

    fn define_list(
        &mut self,
        id: ObjectId,
        member_ids: Vec<ObjectId>,
    ) -> Result<(), RegistryError> {
        self.define(id, Record::List { member_ids })
    }

    fn define_dict(
        &mut self,
        id: ObjectId,
        key_ids: Vec<ObjectId>,
        value_ids: Vec<ObjectId>,
    ) -> Result<(), RegistryError> {
        self.define(id, Record::Dict { key_ids, value_ids })
    }

    fn define_file(&mut self, id: ObjectId, path: &str, text: &str) -> Result<(), RegistryError> {
        self.define(
            id,
            Record::File {
                path: path.to_owned(),
                text: text.to_owned(),
            },
        )
    }

    fn define_class_instance(
        &mut self,
        id: ObjectId,
        class_id: ObjectId,
        members: BTreeMap<String, ObjectId>,
    ) -> Result<(), RegistryError> {
        self.define(id, Record::ClassInstance { class_id, members })
    }

    fn define_with_block(
        &mut self,
        id: ObjectId,
        free_variable_chains: BTreeMap<String, ObjectId>,
        source_file_id: ObjectId,
        line_number: u32,
    ) -> Result<(), RegistryError> {
        self.define(
            id,
            Record::WithBlock {
                free_variable_chains,
                source_file_id,
                line_number,
            },
        )
    }

    fn define_remote_object(&mut self, id: ObjectId, handle: u64) -> Result<(), RegistryError> {
        self.define(id, Record::RemotePythonObject { handle })
    }

    fn define_named_singleton(&mut self, id: ObjectId, name: &str) -> Result<(), RegistryError> {
        self.define(
            id,
            Record::NamedSingleton {
                name: name.to_owned(),
            },
        )
    }

    fn define_builtin_exception_instance(
        &mut self,
        id: ObjectId,
        type_name: &str,
        args_id: ObjectId,
    ) -> Result<(), RegistryError> {
        self.define(
            id,
            Record::BuiltinExceptionInstance {
                type_name: type_name.to_owned(),
                args_id,
            },
        )
    }

    fn define_instance_method(
        &mut self,
        id: ObjectId,
        instance_id: ObjectId,
        method_name: &str,
    ) -> Result<(), RegistryError> {
        self.define(
            id,
            Record::InstanceMethod {
                instance_id,
                method_name: method_name.to_owned(),
            },
        )
    }

    fn define_module_level_object(
        &mut self,
        id: ObjectId,
        path: ModulePath,
    ) -> Result<(), RegistryError> {
        self.define(id, Record::ModuleLevelObject { path })
    }
}
