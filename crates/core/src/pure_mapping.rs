//! Portable stand-ins for objects the walker cannot convert as they are.
//!
//! A mapping replaces a library object (or every instance of a library
//! class) with an object built from convertible parts. The walker asks the
//! mapping after the singleton and module-index shortcuts, then restarts
//! resolution on whatever the mapping returns.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::heap::{Heap, Value, ValueRef};
use crate::singletons::NamedSingletons;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// Singletons are resolved before mappings, so a mapping for one would
    /// never be used.
    #[error("cannot map '{name}': it is reserved as a named singleton")]
    ReservedSingleton { name: String },
}

/// The capability the walker consults for substitutions.
pub trait PureMapping: Send + Sync {
    /// Whether `lookup` may return a substitute for `value`.
    fn can_map(&self, heap: &Heap, value: ValueRef) -> bool;

    /// The substitute for `value`. May allocate in the heap.
    fn lookup(&self, heap: &Heap, value: ValueRef) -> Option<ValueRef>;

    /// Whether `module` is opaque: chains stop at it instead of walking
    /// into its members.
    fn is_opaque_module(&self, heap: &Heap, module: ValueRef) -> bool;

    /// Objects with a mapping of their own (instances and mapped classes).
    fn mapped_objects(&self) -> Vec<ValueRef>;

    /// The mapping entry that answers `lookup` for `value`: the value
    /// itself, or the mapped class of an instance. The walker refuses to use
    /// one entry twice while resolving a single value.
    fn mapping_source(&self, _heap: &Heap, value: ValueRef) -> ValueRef {
        value
    }

    /// Fails if any mapped object is a named singleton.
    fn validate(&self, singletons: &NamedSingletons) -> Result<(), MappingError> {
        for value in self.mapped_objects() {
            if let Some(name) = singletons.name_for(value) {
                return Err(MappingError::ReservedSingleton {
                    name: name.to_owned(),
                });
            }
        }
        Ok(())
    }
}

/// Builds the stand-in for one instance of a mapped class.
pub type InstanceConverter = Arc<dyn Fn(&Heap, ValueRef) -> Option<ValueRef> + Send + Sync>;

struct TypeMapping {
    replacement: ValueRef,
    convert_instance: InstanceConverter,
}

/// Mappings registered up front by the caller.
#[derive(Default)]
pub struct PureImplementationMappings {
    reserved: HashMap<ValueRef, &'static str>,
    instances: HashMap<ValueRef, ValueRef>,
    types: HashMap<ValueRef, TypeMapping>,
    opaque_modules: HashSet<String>,
}

impl std::fmt::Debug for PureImplementationMappings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PureImplementationMappings")
            .field("instances", &self.instances)
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("opaque_modules", &self.opaque_modules)
            .finish()
    }
}

impl PureImplementationMappings {
    /// An empty set of mappings that refuses to map anything in `singletons`.
    pub fn new(singletons: &NamedSingletons) -> Self {
        PureImplementationMappings {
            reserved: singletons.iter().collect(),
            ..Default::default()
        }
    }

    fn check_reserved(&self, value: ValueRef) -> Result<(), MappingError> {
        match self.reserved.get(&value) {
            Some(name) => Err(MappingError::ReservedSingleton {
                name: (*name).to_owned(),
            }),
            None => Ok(()),
        }
    }

    /// Replace one specific object.
    pub fn add_instance_mapping(
        &mut self,
        original: ValueRef,
        replacement: ValueRef,
    ) -> Result<(), MappingError> {
        self.check_reserved(original)?;
        self.instances.insert(original, replacement);
        Ok(())
    }

    /// Replace a class with `replacement`, and each of its instances with
    /// whatever `convert_instance` builds.
    pub fn add_type_mapping(
        &mut self,
        class: ValueRef,
        replacement: ValueRef,
        convert_instance: InstanceConverter,
    ) -> Result<(), MappingError> {
        self.check_reserved(class)?;
        self.types.insert(
            class,
            TypeMapping {
                replacement,
                convert_instance,
            },
        );
        Ok(())
    }

    /// Treat the module named `name` as opaque.
    pub fn add_opaque_module(&mut self, name: &str) {
        self.opaque_modules.insert(name.to_owned());
    }
}

impl PureMapping for PureImplementationMappings {
    fn can_map(&self, heap: &Heap, value: ValueRef) -> bool {
        if self.instances.contains_key(&value) || self.types.contains_key(&value) {
            return true;
        }
        match heap.get(value) {
            Some(Value::Instance { class, .. }) => self.types.contains_key(&class),
            _ => false,
        }
    }

    fn lookup(&self, heap: &Heap, value: ValueRef) -> Option<ValueRef> {
        if let Some(replacement) = self.instances.get(&value) {
            return Some(*replacement);
        }
        if let Some(mapping) = self.types.get(&value) {
            return Some(mapping.replacement);
        }
        match heap.get(value) {
            Some(Value::Instance { class, .. }) => {
                let mapping = self.types.get(&class)?;
                (mapping.convert_instance)(heap, value)
            }
            _ => None,
        }
    }

    fn is_opaque_module(&self, heap: &Heap, module: ValueRef) -> bool {
        match heap.get(module) {
            Some(Value::Module(m)) => self.opaque_modules.contains(&m.name),
            _ => false,
        }
    }

    fn mapped_objects(&self) -> Vec<ValueRef> {
        let mut objects: Vec<ValueRef> = self
            .instances
            .keys()
            .chain(self.types.keys())
            .copied()
            .collect();
        objects.sort();
        objects
    }

    fn mapping_source(&self, heap: &Heap, value: ValueRef) -> ValueRef {
        if self.instances.contains_key(&value) || self.types.contains_key(&value) {
            return value;
        }
        match heap.get(value) {
            Some(Value::Instance { class, .. }) if self.types.contains_key(&class) => class,
            _ => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::ClassValue;

    #[test]
    fn reserved_singletons_rejected_at_registration() {
        let heap = Heap::new();
        let singletons = NamedSingletons::bind(&heap);
        let mut mappings = PureImplementationMappings::new(&singletons);
        let stand_in = heap.int(0);

        let exception = heap.builtin("Exception").unwrap();
        assert_eq!(
            mappings.add_instance_mapping(exception, stand_in),
            Err(MappingError::ReservedSingleton {
                name: "Exception".into()
            })
        );
        let object = heap.builtin("object").unwrap();
        let err = mappings
            .add_type_mapping(
                object,
                stand_in,
                Arc::new(|_: &Heap, _: ValueRef| -> Option<ValueRef> { None }),
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot map 'object': it is reserved as a named singleton"
        );
    }

    #[test]
    fn instance_mapping_substitutes_one_object() {
        let heap = Heap::new();
        let mut mappings = PureImplementationMappings::new(&NamedSingletons::bind(&heap));
        let original = heap.alloc(Value::Opaque {
            type_name: "ndarray".into(),
        });
        let stand_in = heap.list(vec![]);
        mappings.add_instance_mapping(original, stand_in).unwrap();

        assert!(mappings.can_map(&heap, original));
        assert_eq!(mappings.lookup(&heap, original), Some(stand_in));
        assert!(!mappings.can_map(&heap, stand_in));
    }

    #[test]
    fn type_mapping_converts_instances() {
        let heap = Heap::new();
        let mut mappings = PureImplementationMappings::new(&NamedSingletons::bind(&heap));
        let lib_class = heap.class(ClassValue::new("Matrix", "/site/lib.py", 1));
        let pure_class = heap.class(ClassValue::new("PureMatrix", "/pure/matrix.py", 1));
        mappings
            .add_type_mapping(
                lib_class,
                pure_class,
                Arc::new(move |heap: &Heap, _: ValueRef| Some(heap.instance(pure_class, &[]))),
            )
            .unwrap();

        let m = heap.instance(lib_class, &[]);
        assert!(mappings.can_map(&heap, m));
        let substitute = mappings.lookup(&heap, m).unwrap();
        assert!(matches!(
            heap.get(substitute),
            Some(Value::Instance { class, .. }) if class == pure_class
        ));
        assert_eq!(mappings.lookup(&heap, lib_class), Some(pure_class));
        assert_eq!(mappings.mapping_source(&heap, m), lib_class);
        assert_eq!(mappings.mapping_source(&heap, substitute), substitute);
    }

    #[test]
    fn opaque_modules_by_name() {
        let heap = Heap::new();
        let mut mappings = PureImplementationMappings::new(&NamedSingletons::bind(&heap));
        mappings.add_opaque_module("numpy");
        let numpy = heap.load_module("numpy", Some("/site/numpy/__init__.py"));
        let other = heap.load_module("scipy", Some("/site/scipy/__init__.py"));
        assert!(mappings.is_opaque_module(&heap, numpy));
        assert!(!mappings.is_opaque_module(&heap, other));
    }
}
