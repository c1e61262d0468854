//! Canonical paths for objects that live in the common base environment.
//!
//! Objects reachable as a top-level member of a standard module do not need
//! to be walked: the remote side already has them and can look them up by
//! path. Only builtin modules and modules installed under a standard prefix
//! count; user and third-party modules are walked structurally.

use std::collections::{HashMap, HashSet};

use graphport_ir::ModulePath;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::heap::{Heap, Value, ValueRef};

/// Which modules belong to the common base environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleIndexConfig {
    /// Directory prefixes of the standard installation. A module whose file
    /// starts with one of these is indexed.
    #[serde(default = "default_standard_prefixes")]
    pub standard_prefixes: Vec<String>,
}

fn default_standard_prefixes() -> Vec<String> {
    vec!["/usr/lib/python3".to_owned()]
}

impl Default for ModuleIndexConfig {
    fn default() -> Self {
        ModuleIndexConfig {
            standard_prefixes: default_standard_prefixes(),
        }
    }
}

impl ModuleIndexConfig {
    fn is_standard(&self, file: Option<&str>) -> bool {
        match file {
            None => true,
            Some(file) => self
                .standard_prefixes
                .iter()
                .any(|prefix| file.starts_with(prefix.as_str())),
        }
    }
}

#[derive(Debug, Default)]
struct IndexState {
    /// Loaded modules already scanned, as a prefix of the heap's load order.
    scanned: usize,
    paths: HashMap<ValueRef, ModulePath>,
    failed_imports: HashSet<String>,
}

/// Bidirectional index between objects and module paths.
///
/// The index is rebuilt lazily: every query first checks whether the number
/// of loaded modules changed since the last scan, and if so scans only the
/// newly loaded ones. The check and the read happen under one lock.
#[derive(Debug, Default)]
pub struct ModuleLevelObjectIndex {
    config: ModuleIndexConfig,
    state: Mutex<IndexState>,
}

impl ModuleLevelObjectIndex {
    pub fn new(config: ModuleIndexConfig) -> Self {
        ModuleLevelObjectIndex {
            config,
            state: Mutex::new(IndexState::default()),
        }
    }

    pub fn config(&self) -> &ModuleIndexConfig {
        &self.config
    }

    /// The canonical path of `value`, if it is a standard module or one of
    /// its top-level members. Primitives are never indexed.
    pub fn path_for(&self, heap: &Heap, value: ValueRef) -> Option<ModulePath> {
        let mut state = self.state.lock();
        self.refresh(heap, &mut state);
        state.paths.get(&value).cloned()
    }

    /// The object at `path`, importing its module if it is not loaded yet.
    ///
    /// A failed import is remembered; later lookups in that module return
    /// `None` without trying again.
    pub fn object_for(&self, heap: &Heap, path: &ModulePath) -> Option<ValueRef> {
        let mut state = self.state.lock();
        let name = path.module_name();
        let module = match heap.loaded_module(name) {
            Some(module) => module,
            None => {
                if state.failed_imports.contains(name) {
                    return None;
                }
                match heap.import(name) {
                    Ok(module) => module,
                    Err(err) => {
                        tracing::warn!(module = name, error = %err, "import failed");
                        state.failed_imports.insert(name.to_owned());
                        return None;
                    }
                }
            }
        };
        self.refresh(heap, &mut state);
        match path {
            ModulePath::Module { .. } => Some(module),
            ModulePath::Member { member, .. } => heap.member(module, member),
        }
    }

    /// Whether an import of `name` has failed before.
    pub fn import_failed(&self, name: &str) -> bool {
        self.state.lock().failed_imports.contains(name)
    }

    fn refresh(&self, heap: &Heap, state: &mut IndexState) {
        let loaded = heap.loaded_modules();
        if loaded.len() == state.scanned {
            return;
        }
        let fresh = &loaded[state.scanned.min(loaded.len())..];
        let before = state.paths.len();
        for module in fresh {
            self.scan_module(heap, *module, state);
        }
        tracing::debug!(
            modules = fresh.len(),
            indexed = state.paths.len() - before,
            "rescanned module index"
        );
        state.scanned = loaded.len();
    }

    fn scan_module(&self, heap: &Heap, module: ValueRef, state: &mut IndexState) {
        let Some(Value::Module(m)) = heap.get(module) else {
            return;
        };
        if !self.config.is_standard(m.file.as_deref()) {
            return;
        }
        state
            .paths
            .entry(module)
            .or_insert_with(|| ModulePath::module(&m.name));
        for (member, value) in &m.members {
            let indexable = heap.get(*value).is_some_and(|v| !v.is_primitive());
            if indexable {
                // First module in load order wins.
                state
                    .paths
                    .entry(*value)
                    .or_insert_with(|| ModulePath::member(&m.name, member));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::FunctionValue;

    fn stdlib_heap() -> (Heap, ValueRef, ValueRef) {
        let heap = Heap::new();
        let math = heap.load_module("math", None);
        let sqrt = heap.function(FunctionValue::new("sqrt", "<builtin>", 0));
        heap.set_member(math, "sqrt", sqrt);
        let pi = heap.float(3.14159);
        heap.set_member(math, "pi", pi);
        (heap, math, sqrt)
    }

    #[test]
    fn standard_members_are_indexed() {
        let (heap, math, sqrt) = stdlib_heap();
        let index = ModuleLevelObjectIndex::default();
        assert_eq!(index.path_for(&heap, sqrt), Some(ModulePath::member("math", "sqrt")));
        assert_eq!(index.path_for(&heap, math), Some(ModulePath::module("math")));
        assert_eq!(index.object_for(&heap, &ModulePath::member("math", "sqrt")), Some(sqrt));
    }

    #[test]
    fn primitives_are_never_indexed() {
        let (heap, math, _) = stdlib_heap();
        let index = ModuleLevelObjectIndex::default();
        let pi = heap.member(math, "pi").unwrap();
        assert_eq!(index.path_for(&heap, pi), None);
    }

    #[test]
    fn user_modules_are_not_indexed() {
        let heap = Heap::new();
        let app = heap.load_module("app", Some("/home/me/app.py"));
        let f = heap.function(FunctionValue::new("f", "/home/me/app.py", 1));
        heap.set_member(app, "f", f);
        let index = ModuleLevelObjectIndex::default();
        assert_eq!(index.path_for(&heap, f), None);
        assert_eq!(index.path_for(&heap, app), None);
    }

    #[test]
    fn rescans_when_a_module_loads() {
        let heap = Heap::new();
        let index = ModuleLevelObjectIndex::default();
        let dumps = heap.function(
            FunctionValue::new("dumps", "/usr/lib/python3/json/__init__.py", 10),
        );
        assert_eq!(index.path_for(&heap, dumps), None);

        let json = heap.load_module("json", Some("/usr/lib/python3/json/__init__.py"));
        heap.set_member(json, "dumps", dumps);
        assert_eq!(index.path_for(&heap, dumps), Some(ModulePath::member("json", "dumps")));
    }

    #[test]
    fn object_for_imports_on_demand() {
        let heap = Heap::new();
        let index = ModuleLevelObjectIndex::default();
        let json = heap.add_importable_module("json", Some("/usr/lib/python3/json/__init__.py"));
        let loads = heap.function(
            FunctionValue::new("loads", "/usr/lib/python3/json/__init__.py", 20),
        );
        heap.set_member(json, "loads", loads);

        assert_eq!(index.object_for(&heap, &ModulePath::member("json", "loads")), Some(loads));
        assert_eq!(index.path_for(&heap, loads), Some(ModulePath::member("json", "loads")));
    }

    #[test]
    fn failed_import_is_not_retried() {
        let heap = Heap::new();
        heap.add_broken_module("cursed");
        let index = ModuleLevelObjectIndex::default();
        let path = ModulePath::member("cursed", "x");

        assert_eq!(index.object_for(&heap, &path), None);
        assert_eq!(index.object_for(&heap, &path), None);
        assert!(index.import_failed("cursed"));
        assert_eq!(heap.import_attempts("cursed"), 1);
    }

    #[test]
    fn config_prefixes_decide_membership() {
        let heap = Heap::new();
        let vendored = heap.load_module("vendored", Some("/opt/env/lib/vendored.py"));
        let default_index = ModuleLevelObjectIndex::default();
        assert_eq!(default_index.path_for(&heap, vendored), None);

        let index = ModuleLevelObjectIndex::new(ModuleIndexConfig {
            standard_prefixes: vec!["/opt/env/lib".into()],
        });
        assert_eq!(index.path_for(&heap, vendored), Some(ModulePath::module("vendored")));
    }
}
