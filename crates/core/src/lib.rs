//! graphport-core: walking a live object graph into registry records.
//!
//! - [`Heap`] holds the live values, their source files and the modules
//!   that are loaded.
//! - [`NamedSingletons`] and [`ModuleLevelObjectIndex`] name objects the
//!   remote side already has.
//! - [`PureMapping`] supplies stand-ins for objects that cannot be
//!   converted as they are.
//! - [`Walker`] decomposes everything else, batching mutually dependent
//!   definitions with [`FreeVariableGraph`] and
//!   [`strongly_connected_components`].

pub mod error;
pub mod free_vars;
pub mod heap;
pub mod module_index;
pub mod pure_mapping;
pub mod resolver;
pub mod scc;
pub mod singletons;
pub mod walker;

pub use error::{TraceFrame, UnresolvedFreeVariable, WalkError};
pub use free_vars::{Binding, ChainBinding, ExpressionId, FreeVariableGraph};
pub use heap::{
    BuiltinKind, ClassValue, FunctionValue, Heap, ImportError, ModuleValue, SourceLocation, Value,
    ValueRef, WithBlockValue,
};
pub use module_index::{ModuleIndexConfig, ModuleLevelObjectIndex};
pub use pure_mapping::{InstanceConverter, MappingError, PureImplementationMappings, PureMapping};
pub use resolver::{Definition, DefinitionKind, FreeVariableResolver, ResolvedChain, Scope};
pub use scc::strongly_connected_components;
pub use singletons::NamedSingletons;
pub use walker::{WalkContext, Walker};
