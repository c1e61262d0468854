//! Binding free-variable chains to the values they name.

use std::collections::BTreeMap;

use graphport_ir::FreeVariableChain;
use indexmap::IndexMap;

use crate::error::UnresolvedFreeVariable;
use crate::heap::{Heap, SourceLocation, Value, ValueRef};
use crate::pure_mapping::PureMapping;

/// Decorators whose chains never need a binding on the remote side.
const SKIPPED_ROOTS: &[&str] = &["staticmethod", "classmethod"];

/// One place a chain's root identifier may be bound.
#[derive(Debug, Clone)]
pub enum Scope {
    /// Closure cells or block-local variables.
    Cells(IndexMap<String, ValueRef>),
    /// The members of a module.
    Module(ValueRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Function,
    Class,
    WithBlock,
}

/// What the walker needs to know about a function, class or with-block.
#[derive(Debug, Clone)]
pub struct Definition {
    pub kind: DefinitionKind,
    pub location: SourceLocation,
    pub chains: Vec<FreeVariableChain>,
    pub bases: Vec<ValueRef>,
    /// Searched in order.
    pub scopes: Vec<Scope>,
}

impl Definition {
    /// The definition view of `value`, if it is one.
    ///
    /// Lookup order: a function searches its closure, its module, then
    /// builtins. A class searches its methods' closures (by method name),
    /// its module, then builtins. A with-block searches its bound variables,
    /// then builtins, and ignores chains rooted at names it assigns itself.
    pub fn of(heap: &Heap, value: &Value) -> Option<Definition> {
        let builtins = Scope::Module(heap.builtins());
        match value {
            Value::Function(f) => {
                let mut scopes = vec![Scope::Cells(f.closure.clone())];
                scopes.extend(f.module.map(Scope::Module));
                scopes.push(builtins);
                Some(Definition {
                    kind: DefinitionKind::Function,
                    location: f.location.clone(),
                    chains: f.free_chains.clone(),
                    bases: Vec::new(),
                    scopes,
                })
            }
            Value::Class(c) => {
                let methods: BTreeMap<&String, &ValueRef> = c.methods.iter().collect();
                let mut scopes: Vec<Scope> = methods
                    .values()
                    .filter_map(|method| match heap.get(**method) {
                        Some(Value::Function(f)) => Some(Scope::Cells(f.closure)),
                        _ => None,
                    })
                    .collect();
                scopes.extend(c.module.map(Scope::Module));
                scopes.push(builtins);
                Some(Definition {
                    kind: DefinitionKind::Class,
                    location: c.location.clone(),
                    chains: c.free_chains.clone(),
                    bases: c.bases.clone(),
                    scopes,
                })
            }
            Value::WithBlock(w) => Some(Definition {
                kind: DefinitionKind::WithBlock,
                location: w.location.clone(),
                chains: w
                    .free_chains
                    .iter()
                    .filter(|chain| !w.unbound_locals.contains(chain.root()))
                    .cloned()
                    .collect(),
                bases: Vec::new(),
                scopes: vec![Scope::Cells(w.bound_variables.clone()), builtins],
            }),
            _ => None,
        }
    }
}

/// A chain bound to a value. `chain` is the prefix actually consumed: the
/// root plus any module members walked through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChain {
    pub chain: FreeVariableChain,
    pub value: ValueRef,
}

pub struct FreeVariableResolver<'a> {
    heap: &'a Heap,
    mapping: &'a dyn PureMapping,
}

impl<'a> FreeVariableResolver<'a> {
    pub fn new(heap: &'a Heap, mapping: &'a dyn PureMapping) -> Self {
        FreeVariableResolver { heap, mapping }
    }

    /// Bind `chain` against `scopes`.
    ///
    /// Returns `Ok(None)` for chains that need no binding. After the root is
    /// found, resolution keeps going through module members as long as the
    /// current value is a module that is not opaque. A module without the
    /// next member is an error, like an unbound root.
    pub fn resolve(
        &self,
        scopes: &[Scope],
        chain: &FreeVariableChain,
    ) -> Result<Option<ResolvedChain>, UnresolvedFreeVariable> {
        let root = chain.root();
        if SKIPPED_ROOTS.contains(&root) {
            return Ok(None);
        }
        let mut value = scopes
            .iter()
            .find_map(|scope| self.lookup(scope, root))
            .ok_or_else(|| UnresolvedFreeVariable::new(prefix(chain, 1)))?;

        let mut consumed = 1;
        while consumed < chain.names.len() {
            if !matches!(self.heap.get(value), Some(Value::Module(_)))
                || self.mapping.is_opaque_module(self.heap, value)
            {
                break;
            }
            value = self
                .heap
                .member(value, &chain.names[consumed])
                .ok_or_else(|| UnresolvedFreeVariable::new(prefix(chain, consumed + 1)))?;
            consumed += 1;
        }

        Ok(Some(ResolvedChain {
            chain: prefix(chain, consumed),
            value,
        }))
    }

    fn lookup(&self, scope: &Scope, name: &str) -> Option<ValueRef> {
        match scope {
            Scope::Cells(cells) => cells.get(name).copied(),
            Scope::Module(module) => self.heap.member(*module, name),
        }
    }
}

fn prefix(chain: &FreeVariableChain, len: usize) -> FreeVariableChain {
    FreeVariableChain {
        names: chain.names[..len.min(chain.names.len())].to_vec(),
        position: chain.position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{ClassValue, FunctionValue, WithBlockValue};
    use crate::pure_mapping::PureImplementationMappings;
    use crate::singletons::NamedSingletons;

    struct Fixture {
        heap: Heap,
        mappings: PureImplementationMappings,
    }

    fn fixture() -> Fixture {
        let heap = Heap::new();
        let mappings = PureImplementationMappings::new(&NamedSingletons::bind(&heap));
        Fixture { heap, mappings }
    }

    fn resolve(
        fx: &Fixture,
        value: ValueRef,
        names: &[&str],
    ) -> Result<Option<ResolvedChain>, UnresolvedFreeVariable> {
        let definition = Definition::of(&fx.heap, &fx.heap.get(value).unwrap()).unwrap();
        let resolver = FreeVariableResolver::new(&fx.heap, &fx.mappings);
        resolver.resolve(&definition.scopes, &FreeVariableChain::new(names.iter().copied(), 2, 4))
    }

    #[test]
    fn closure_shadows_globals_and_builtins() {
        let fx = fixture();
        let app = fx.heap.load_module("app", Some("/home/me/app.py"));
        let global_len = fx.heap.int(1);
        fx.heap.set_member(app, "len", global_len);
        let cell = fx.heap.int(2);
        let f = fx.heap.function(
            FunctionValue::new("f", "/home/me/app.py", 1)
                .cell("len", cell)
                .in_module(app),
        );
        let g = fx.heap.function(FunctionValue::new("g", "/home/me/app.py", 5).in_module(app));
        let h = fx.heap.function(FunctionValue::new("h", "/home/me/app.py", 9));

        assert_eq!(resolve(&fx, f, &["len"]).unwrap().unwrap().value, cell);
        assert_eq!(resolve(&fx, g, &["len"]).unwrap().unwrap().value, global_len);
        assert_eq!(
            resolve(&fx, h, &["len"]).unwrap().unwrap().value,
            fx.heap.builtin("len").unwrap()
        );
    }

    #[test]
    fn chains_walk_through_modules() {
        let fx = fixture();
        let os = fx.heap.load_module("os", None);
        let path = fx.heap.load_module("os.path", None);
        let join = fx.heap.function(FunctionValue::new("join", "<builtin>", 0));
        fx.heap.set_member(os, "path", path);
        fx.heap.set_member(path, "join", join);
        let f = fx.heap.function(FunctionValue::new("f", "a.py", 1).cell("os", os));

        let resolved = resolve(&fx, f, &["os", "path", "join", "__doc__"]).unwrap().unwrap();
        assert_eq!(resolved.value, join);
        assert_eq!(resolved.chain.dotted(), "os.path.join");
    }

    #[test]
    fn opaque_modules_stop_the_walk() {
        let mut fx = fixture();
        fx.mappings.add_opaque_module("numpy");
        let numpy = fx.heap.load_module("numpy", Some("/site/numpy/__init__.py"));
        let f = fx.heap.function(FunctionValue::new("f", "a.py", 1).cell("np", numpy));

        let resolved = resolve(&fx, f, &["np", "linalg", "norm"]).unwrap().unwrap();
        assert_eq!(resolved.value, numpy);
        assert_eq!(resolved.chain.dotted(), "np");
    }

    #[test]
    fn missing_module_member_is_unresolved() {
        let fx = fixture();
        let math = fx.heap.load_module("math", None);
        let f = fx.heap.function(FunctionValue::new("f", "a.py", 1).cell("math", math));

        let err = resolve(&fx, f, &["math", "tau", "real"]).unwrap_err();
        assert_eq!(err.chain.dotted(), "math.tau");
    }

    #[test]
    fn unbound_root_is_unresolved() {
        let fx = fixture();
        let f = fx.heap.function(FunctionValue::new("f", "a.py", 1));
        let err = resolve(&fx, f, &["nowhere", "x"]).unwrap_err();
        assert_eq!(err.chain.dotted(), "nowhere");
        assert_eq!(err.chain.position.line, 2);
    }

    #[test]
    fn decorator_roots_are_skipped() {
        let fx = fixture();
        let f = fx.heap.function(FunctionValue::new("f", "a.py", 1));
        assert_eq!(resolve(&fx, f, &["staticmethod"]).unwrap(), None);
    }

    #[test]
    fn class_scopes_follow_method_names() {
        let fx = fixture();
        let from_b = fx.heap.int(2);
        let from_a = fx.heap.int(1);
        let b = fx.heap.function(FunctionValue::new("b", "c.py", 4).cell("k", from_b));
        let a = fx.heap.function(FunctionValue::new("a", "c.py", 2).cell("k", from_a));
        let class = fx.heap.class(ClassValue::new("C", "c.py", 1).method("b", b).method("a", a));

        assert_eq!(resolve(&fx, class, &["k"]).unwrap().unwrap().value, from_a);
    }

    #[test]
    fn with_block_locals_are_not_free() {
        let fx = fixture();
        let x = fx.heap.int(3);
        let block = fx.heap.alloc(Value::WithBlock(
            WithBlockValue::new("w.py", 10)
                .chain(&["x"], 11, 4)
                .chain(&["y"], 12, 4)
                .bind("x", x)
                .local("y"),
        ));
        let definition = Definition::of(&fx.heap, &fx.heap.get(block).unwrap()).unwrap();
        assert_eq!(definition.kind, DefinitionKind::WithBlock);
        assert_eq!(definition.chains.len(), 1);
        assert_eq!(resolve(&fx, block, &["x"]).unwrap().unwrap().value, x);
    }
}
