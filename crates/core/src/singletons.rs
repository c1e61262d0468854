//! Well-known builtin objects that both sides of a conversion can name.

use std::collections::HashMap;

use crate::heap::{BuiltinKind, Heap, ValueRef};

/// Every name the `builtins` module exports. Each one is a named singleton.
pub const BUILTIN_NAMES: &[(&str, BuiltinKind)] = &[
    ("object", BuiltinKind::Type),
    ("type", BuiltinKind::Type),
    ("bool", BuiltinKind::Type),
    ("int", BuiltinKind::Type),
    ("float", BuiltinKind::Type),
    ("str", BuiltinKind::Type),
    ("tuple", BuiltinKind::Type),
    ("list", BuiltinKind::Type),
    ("dict", BuiltinKind::Type),
    ("staticmethod", BuiltinKind::Type),
    ("classmethod", BuiltinKind::Type),
    ("property", BuiltinKind::Type),
    ("BaseException", BuiltinKind::ExceptionType),
    ("Exception", BuiltinKind::ExceptionType),
    ("ArithmeticError", BuiltinKind::ExceptionType),
    ("AssertionError", BuiltinKind::ExceptionType),
    ("AttributeError", BuiltinKind::ExceptionType),
    ("IndexError", BuiltinKind::ExceptionType),
    ("KeyError", BuiltinKind::ExceptionType),
    ("LookupError", BuiltinKind::ExceptionType),
    ("NameError", BuiltinKind::ExceptionType),
    ("NotImplementedError", BuiltinKind::ExceptionType),
    ("OverflowError", BuiltinKind::ExceptionType),
    ("RuntimeError", BuiltinKind::ExceptionType),
    ("StopIteration", BuiltinKind::ExceptionType),
    ("TypeError", BuiltinKind::ExceptionType),
    ("UserWarning", BuiltinKind::ExceptionType),
    ("ValueError", BuiltinKind::ExceptionType),
    ("ZeroDivisionError", BuiltinKind::ExceptionType),
    ("abs", BuiltinKind::Function),
    ("all", BuiltinKind::Function),
    ("any", BuiltinKind::Function),
    ("enumerate", BuiltinKind::Function),
    ("getattr", BuiltinKind::Function),
    ("hasattr", BuiltinKind::Function),
    ("isinstance", BuiltinKind::Function),
    ("issubclass", BuiltinKind::Function),
    ("iter", BuiltinKind::Function),
    ("len", BuiltinKind::Function),
    ("map", BuiltinKind::Function),
    ("max", BuiltinKind::Function),
    ("min", BuiltinKind::Function),
    ("next", BuiltinKind::Function),
    ("range", BuiltinKind::Function),
    ("reversed", BuiltinKind::Function),
    ("round", BuiltinKind::Function),
    ("sum", BuiltinKind::Function),
    ("zip", BuiltinKind::Function),
];

/// Bidirectional map between singleton objects and their portable names.
#[derive(Debug, Clone, Default)]
pub struct NamedSingletons {
    by_value: HashMap<ValueRef, &'static str>,
    by_name: HashMap<&'static str, ValueRef>,
}

impl NamedSingletons {
    /// Bind every builtin name against the heap's `builtins` module. A name
    /// the module does not export is skipped.
    pub fn bind(heap: &Heap) -> Self {
        let mut table = NamedSingletons::default();
        for &(name, _) in BUILTIN_NAMES {
            if let Some(value) = heap.builtin(name) {
                table.by_value.insert(value, name);
                table.by_name.insert(name, value);
            }
        }
        table
    }

    pub fn name_for(&self, value: ValueRef) -> Option<&'static str> {
        self.by_value.get(&value).copied()
    }

    pub fn value_for(&self, name: &str) -> Option<ValueRef> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, value: ValueRef) -> bool {
        self.by_value.contains_key(&value)
    }

    /// Every singleton with its name, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (ValueRef, &'static str)> + '_ {
        self.by_value.iter().map(|(value, name)| (*value, *name))
    }

    pub fn len(&self) -> usize {
        self.by_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_value.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_bidirectional() {
        let heap = Heap::new();
        let table = NamedSingletons::bind(&heap);
        assert_eq!(table.len(), BUILTIN_NAMES.len());

        let value_error = table.value_for("ValueError").unwrap();
        assert_eq!(table.name_for(value_error), Some("ValueError"));
        assert_eq!(heap.builtin("ValueError"), Some(value_error));
    }

    #[test]
    fn ordinary_values_miss() {
        let heap = Heap::new();
        let table = NamedSingletons::bind(&heap);
        let n = heap.int(0);
        assert_eq!(table.name_for(n), None);
        assert!(!table.contains(heap.builtins()));
        assert_eq!(table.value_for("frobnicate"), None);
    }
}
