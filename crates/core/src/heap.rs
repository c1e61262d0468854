//! The live object graph the walker converts.
//!
//! Values live in one arena and refer to each other by [`ValueRef`], so a
//! graph may be cyclic without any shared ownership. A value's identity is
//! its slot: two equal values in different slots are different objects.
//!
//! The heap also owns the text of every source file and the module loader
//! (which modules are loaded, which can still be imported, which fail).

use std::collections::{HashMap, HashSet};
use std::fmt;

use graphport_ir::{FreeVariableChain, Primitive};
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::singletons::BUILTIN_NAMES;

/// Name of the module every scope falls back to.
pub const BUILTINS_MODULE: &str = "builtins";

/// Index of a value in a [`Heap`]. Identity of the value it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueRef(u32);

impl ValueRef {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Where a definition starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Type,
    ExceptionType,
    Function,
}

/// A user function: its location, the free chains its body mentions, and
/// the scope those chains are looked up in.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionValue {
    pub name: String,
    pub location: SourceLocation,
    pub free_chains: Vec<FreeVariableChain>,
    /// Closure cells, by name.
    pub closure: IndexMap<String, ValueRef>,
    /// Module whose members are the function's globals.
    pub module: Option<ValueRef>,
}

impl FunctionValue {
    pub fn new(name: &str, file: &str, line: u32) -> Self {
        FunctionValue {
            name: name.to_owned(),
            location: SourceLocation {
                file: file.to_owned(),
                line,
            },
            free_chains: Vec::new(),
            closure: IndexMap::new(),
            module: None,
        }
    }

    pub fn chain(mut self, names: &[&str], line: u32, col: u32) -> Self {
        self.free_chains
            .push(FreeVariableChain::new(names.iter().copied(), line, col));
        self
    }

    pub fn cell(mut self, name: &str, value: ValueRef) -> Self {
        self.closure.insert(name.to_owned(), value);
        self
    }

    pub fn in_module(mut self, module: ValueRef) -> Self {
        self.module = Some(module);
        self
    }
}

/// A user class. `free_chains` covers the whole class body including
/// method bodies; `methods` supply the closure scopes those chains may
/// bind in.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassValue {
    pub name: String,
    pub location: SourceLocation,
    pub free_chains: Vec<FreeVariableChain>,
    pub bases: Vec<ValueRef>,
    pub methods: IndexMap<String, ValueRef>,
    pub module: Option<ValueRef>,
}

impl ClassValue {
    pub fn new(name: &str, file: &str, line: u32) -> Self {
        ClassValue {
            name: name.to_owned(),
            location: SourceLocation {
                file: file.to_owned(),
                line,
            },
            free_chains: Vec::new(),
            bases: Vec::new(),
            methods: IndexMap::new(),
            module: None,
        }
    }

    pub fn chain(mut self, names: &[&str], line: u32, col: u32) -> Self {
        self.free_chains
            .push(FreeVariableChain::new(names.iter().copied(), line, col));
        self
    }

    pub fn base(mut self, base: ValueRef) -> Self {
        self.bases.push(base);
        self
    }

    pub fn method(mut self, name: &str, function: ValueRef) -> Self {
        self.methods.insert(name.to_owned(), function);
        self
    }

    pub fn in_module(mut self, module: ValueRef) -> Self {
        self.module = Some(module);
        self
    }
}

/// The body of a `with` block shipped for remote execution.
#[derive(Debug, Clone, PartialEq)]
pub struct WithBlockValue {
    pub location: SourceLocation,
    pub free_chains: Vec<FreeVariableChain>,
    /// Variables visible at the block's entry.
    pub bound_variables: IndexMap<String, ValueRef>,
    /// Names assigned inside the block; chains rooted at them are not free.
    pub unbound_locals: HashSet<String>,
}

impl WithBlockValue {
    pub fn new(file: &str, line: u32) -> Self {
        WithBlockValue {
            location: SourceLocation {
                file: file.to_owned(),
                line,
            },
            free_chains: Vec::new(),
            bound_variables: IndexMap::new(),
            unbound_locals: HashSet::new(),
        }
    }

    pub fn chain(mut self, names: &[&str], line: u32, col: u32) -> Self {
        self.free_chains
            .push(FreeVariableChain::new(names.iter().copied(), line, col));
        self
    }

    pub fn bind(mut self, name: &str, value: ValueRef) -> Self {
        self.bound_variables.insert(name.to_owned(), value);
        self
    }

    pub fn local(mut self, name: &str) -> Self {
        self.unbound_locals.insert(name.to_owned());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleValue {
    pub name: String,
    /// `None` for modules compiled into the interpreter.
    pub file: Option<String>,
    pub members: IndexMap<String, ValueRef>,
}

/// Structural category of a live value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Primitive(Primitive),
    Tuple(Vec<ValueRef>),
    List(Vec<ValueRef>),
    Dict(Vec<(ValueRef, ValueRef)>),
    Function(FunctionValue),
    Class(ClassValue),
    Instance {
        class: ValueRef,
        members: IndexMap<String, ValueRef>,
    },
    BoundMethod {
        instance: ValueRef,
        name: String,
    },
    Module(ModuleValue),
    Builtin {
        name: String,
        kind: BuiltinKind,
    },
    ExceptionInstance {
        class: ValueRef,
        args: ValueRef,
    },
    WithBlock(WithBlockValue),
    /// An object that already lives on the remote side.
    Remote(u64),
    /// Anything the walker has no rule for.
    Opaque {
        type_name: String,
    },
}

impl Value {
    /// Type name used in error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Primitive(Primitive::None) => "NoneType",
            Value::Primitive(Primitive::Bool(_)) => "bool",
            Value::Primitive(Primitive::Int(_)) => "int",
            Value::Primitive(Primitive::Float(_)) => "float",
            Value::Primitive(Primitive::Str(_)) => "str",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Class(_) => "type",
            Value::Instance { .. } => "instance",
            Value::BoundMethod { .. } => "instancemethod",
            Value::Module(_) => "module",
            Value::Builtin { .. } => "builtin",
            Value::ExceptionInstance { .. } => "exception",
            Value::WithBlock(_) => "with-block",
            Value::Remote(_) => "remote",
            Value::Opaque { type_name } => type_name,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Value::Primitive(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImportError {
    #[error("no module named '{0}'")]
    NotFound(String),
    #[error("importing '{0}' failed")]
    Failed(String),
}

#[derive(Debug, Default)]
struct ModuleLoader {
    loaded: Vec<ValueRef>,
    by_name: HashMap<String, ValueRef>,
    importable: HashMap<String, ValueRef>,
    broken: HashSet<String>,
    attempts: HashMap<String, usize>,
}

#[derive(Debug, Default)]
struct HeapInner {
    values: Vec<Value>,
    sources: HashMap<String, String>,
    loader: ModuleLoader,
}

/// Arena of live values, shareable across threads.
///
/// Allocation takes `&self` so substitutes can be created while a walk is
/// running. Values are never changed after allocation except through
/// [`Heap::set`] and [`Heap::set_member`], which exist to build cyclic
/// graphs.
#[derive(Debug)]
pub struct Heap {
    inner: RwLock<HeapInner>,
    builtins: ValueRef,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// A heap holding only the loaded `builtins` module.
    pub fn new() -> Self {
        let mut inner = HeapInner::default();
        let mut members = IndexMap::new();
        for (name, kind) in BUILTIN_NAMES {
            let slot = ValueRef(inner.values.len() as u32);
            inner.values.push(Value::Builtin {
                name: (*name).to_owned(),
                kind: *kind,
            });
            members.insert((*name).to_owned(), slot);
        }
        let builtins = ValueRef(inner.values.len() as u32);
        inner.values.push(Value::Module(ModuleValue {
            name: BUILTINS_MODULE.to_owned(),
            file: None,
            members,
        }));
        inner.loader.loaded.push(builtins);
        inner
            .loader
            .by_name
            .insert(BUILTINS_MODULE.to_owned(), builtins);
        Heap {
            inner: RwLock::new(inner),
            builtins,
        }
    }

    pub fn alloc(&self, value: Value) -> ValueRef {
        let mut inner = self.inner.write();
        let slot = ValueRef(inner.values.len() as u32);
        inner.values.push(value);
        slot
    }

    /// A copy of the value at `slot`, or `None` for a ref from another heap.
    pub fn get(&self, slot: ValueRef) -> Option<Value> {
        self.inner.read().values.get(slot.0 as usize).cloned()
    }

    /// Replace the value at `slot`. Returns false if the slot does not exist.
    pub fn set(&self, slot: ValueRef, value: Value) -> bool {
        match self.inner.write().values.get_mut(slot.0 as usize) {
            Some(existing) => {
                *existing = value;
                true
            }
            None => false,
        }
    }

    /// Add or replace a member of a module. Returns false if `module` is
    /// not a module.
    pub fn set_member(&self, module: ValueRef, name: &str, value: ValueRef) -> bool {
        match self.inner.write().values.get_mut(module.0 as usize) {
            Some(Value::Module(m)) => {
                m.members.insert(name.to_owned(), value);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn builtins(&self) -> ValueRef {
        self.builtins
    }

    // ── Convenience constructors ────────────────────────────────────

    pub fn none(&self) -> ValueRef {
        self.alloc(Value::Primitive(Primitive::None))
    }

    pub fn int(&self, value: i64) -> ValueRef {
        self.alloc(Value::Primitive(Primitive::Int(value)))
    }

    pub fn float(&self, value: f64) -> ValueRef {
        self.alloc(Value::Primitive(Primitive::Float(value)))
    }

    pub fn str(&self, value: &str) -> ValueRef {
        self.alloc(Value::Primitive(Primitive::Str(value.to_owned())))
    }

    pub fn tuple(&self, members: Vec<ValueRef>) -> ValueRef {
        self.alloc(Value::Tuple(members))
    }

    pub fn list(&self, members: Vec<ValueRef>) -> ValueRef {
        self.alloc(Value::List(members))
    }

    pub fn function(&self, function: FunctionValue) -> ValueRef {
        self.alloc(Value::Function(function))
    }

    pub fn class(&self, class: ClassValue) -> ValueRef {
        self.alloc(Value::Class(class))
    }

    pub fn instance(&self, class: ValueRef, members: &[(&str, ValueRef)]) -> ValueRef {
        self.alloc(Value::Instance {
            class,
            members: members
                .iter()
                .map(|(name, value)| ((*name).to_owned(), *value))
                .collect(),
        })
    }

    /// Member `name` of module `module`.
    pub fn member(&self, module: ValueRef, name: &str) -> Option<ValueRef> {
        match self.inner.read().values.get(module.0 as usize) {
            Some(Value::Module(m)) => m.members.get(name).copied(),
            _ => None,
        }
    }

    /// The builtin named `name`.
    pub fn builtin(&self, name: &str) -> Option<ValueRef> {
        self.member(self.builtins, name)
    }

    // ── Sources ─────────────────────────────────────────────────────

    pub fn add_source(&self, path: &str, text: &str) {
        self.inner
            .write()
            .sources
            .insert(path.to_owned(), text.to_owned());
    }

    pub fn source(&self, path: &str) -> Option<String> {
        self.inner.read().sources.get(path).cloned()
    }

    // ── Modules ─────────────────────────────────────────────────────

    fn new_module(name: &str, file: Option<&str>) -> Value {
        Value::Module(ModuleValue {
            name: name.to_owned(),
            file: file.map(str::to_owned),
            members: IndexMap::new(),
        })
    }

    /// Create a module and mark it loaded.
    pub fn load_module(&self, name: &str, file: Option<&str>) -> ValueRef {
        let module = self.alloc(Self::new_module(name, file));
        let mut inner = self.inner.write();
        inner.loader.loaded.push(module);
        inner.loader.by_name.insert(name.to_owned(), module);
        module
    }

    /// Create a module that becomes loaded the first time it is imported.
    pub fn add_importable_module(&self, name: &str, file: Option<&str>) -> ValueRef {
        let module = self.alloc(Self::new_module(name, file));
        self.inner
            .write()
            .loader
            .importable
            .insert(name.to_owned(), module);
        module
    }

    /// Declare a module whose import raises.
    pub fn add_broken_module(&self, name: &str) {
        self.inner.write().loader.broken.insert(name.to_owned());
    }

    /// Loaded modules in load order.
    pub fn loaded_modules(&self) -> Vec<ValueRef> {
        self.inner.read().loader.loaded.clone()
    }

    pub fn loaded_module_count(&self) -> usize {
        self.inner.read().loader.loaded.len()
    }

    pub fn loaded_module(&self, name: &str) -> Option<ValueRef> {
        self.inner.read().loader.by_name.get(name).copied()
    }

    /// Import `name`, loading it if needed.
    pub fn import(&self, name: &str) -> Result<ValueRef, ImportError> {
        let mut inner = self.inner.write();
        let loader = &mut inner.loader;
        *loader.attempts.entry(name.to_owned()).or_default() += 1;
        if let Some(module) = loader.by_name.get(name) {
            return Ok(*module);
        }
        if loader.broken.contains(name) {
            return Err(ImportError::Failed(name.to_owned()));
        }
        let module = loader
            .importable
            .remove(name)
            .ok_or_else(|| ImportError::NotFound(name.to_owned()))?;
        loader.loaded.push(module);
        loader.by_name.insert(name.to_owned(), module);
        Ok(module)
    }

    /// How many times `import(name)` has been called.
    pub fn import_attempts(&self, name: &str) -> usize {
        self.inner
            .read()
            .loader
            .attempts
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}
