//! Turning live values into registry records.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use graphport_ir::{ObjectId, Record};
use graphport_registry::{IdentityKey, ObjectDefinitions};

use crate::error::{TraceFrame, WalkError};
use crate::free_vars::{Binding, ExpressionId, FreeVariableGraph};
use crate::heap::{Heap, Value, ValueRef};
use crate::module_index::{ModuleIndexConfig, ModuleLevelObjectIndex};
use crate::pure_mapping::{PureImplementationMappings, PureMapping};
use crate::resolver::{Definition, DefinitionKind, FreeVariableResolver};
use crate::scc::strongly_connected_components;
use crate::singletons::NamedSingletons;

/// Everything a walk reads besides the registry. Built once and shared by
/// every walk against the same heap.
#[derive(Clone)]
pub struct WalkContext {
    pub heap: Arc<Heap>,
    pub singletons: Arc<NamedSingletons>,
    pub index: Arc<ModuleLevelObjectIndex>,
    pub mapping: Arc<dyn PureMapping>,
}

impl WalkContext {
    /// A context with no pure mappings.
    pub fn new(heap: Arc<Heap>, index_config: ModuleIndexConfig) -> Self {
        let singletons = Arc::new(NamedSingletons::bind(&heap));
        let mapping = Arc::new(PureImplementationMappings::new(&singletons));
        WalkContext {
            heap,
            singletons,
            index: Arc::new(ModuleLevelObjectIndex::new(index_config)),
            mapping,
        }
    }

    pub fn with_mapping(mut self, mapping: Arc<dyn PureMapping>) -> Self {
        self.mapping = mapping;
        self
    }
}

fn key(value: ValueRef) -> IdentityKey {
    IdentityKey::object(u64::from(value.index()))
}

/// Outcome of the shortcut checks for one value.
enum Step {
    Done(ObjectId),
    Substitute(ValueRef),
    Structural(Value),
}

/// Walks values into a registry.
///
/// Per value, in order: an id already in the registry is reused; a named
/// singleton becomes `NamedSingleton`; a standard module member becomes
/// `ModuleLevelObject`; a mapped object is replaced by its stand-in and
/// resolved again; anything else is decomposed. Functions, classes and
/// with-blocks are walked in batches: every definition they reach through
/// free variables is discovered first, then ids are minted for all of them,
/// then each strongly connected group is sealed at once.
pub struct Walker<'a, R: ObjectDefinitions> {
    ctx: &'a WalkContext,
    registry: &'a mut R,
    substitutions: HashMap<ValueRef, ValueRef>,
}

impl<'a, R: ObjectDefinitions> Walker<'a, R> {
    /// Fails if the context's mapping covers a named singleton.
    pub fn new(ctx: &'a WalkContext, registry: &'a mut R) -> Result<Self, WalkError> {
        ctx.mapping.validate(&ctx.singletons)?;
        Ok(Walker {
            ctx,
            registry,
            substitutions: HashMap::new(),
        })
    }

    /// Walk `root` and everything it reaches. Returns the root's id.
    pub fn walk(&mut self, root: ValueRef) -> Result<ObjectId, WalkError> {
        let mut value = root;
        let mut stood_in_for = Vec::new();
        let mut sources = Vec::new();
        let id = loop {
            match self.shortcut(value)? {
                Step::Done(id) => break id,
                Step::Substitute(substitute) => {
                    let source = self.ctx.mapping.mapping_source(&self.ctx.heap, value);
                    if sources.contains(&source) {
                        return Err(self.substitution_cycle(root));
                    }
                    sources.push(source);
                    stood_in_for.push(value);
                    value = substitute;
                }
                Step::Structural(contents) => break self.walk_structure(value, contents)?,
            }
        };
        for original in stood_in_for {
            self.registry.alias(key(original), id);
        }
        Ok(id)
    }

    fn heap(&self) -> &'a Heap {
        &self.ctx.heap
    }

    fn mint(&mut self, value: ValueRef) -> ObjectId {
        self.registry.register(key(value)).id()
    }

    /// The stand-in for `value`, asking the mapping at most once per walk.
    fn substitute(&mut self, value: ValueRef) -> Option<ValueRef> {
        if let Some(substitute) = self.substitutions.get(&value) {
            return Some(*substitute);
        }
        let ctx = self.ctx;
        if !ctx.mapping.can_map(&ctx.heap, value) {
            return None;
        }
        let substitute = ctx.mapping.lookup(&ctx.heap, value)?;
        if substitute == value {
            return None;
        }
        self.substitutions.insert(value, substitute);
        Some(substitute)
    }

    fn shortcut(&mut self, value: ValueRef) -> Result<Step, WalkError> {
        let ctx = self.ctx;
        if let Some(id) = self.registry.lookup(&key(value)) {
            return Ok(Step::Done(id));
        }
        let contents = ctx.heap.get(value).ok_or(WalkError::DanglingValue(value))?;

        if let Some(name) = ctx.singletons.name_for(value) {
            let id = self.mint(value);
            self.registry.define_named_singleton(id, name)?;
            return Ok(Step::Done(id));
        }
        if let Value::ExceptionInstance { class, args } = &contents {
            if let Some(type_name) = ctx.singletons.name_for(*class) {
                let id = self.mint(value);
                let args_id = self.walk(*args)?;
                self.registry
                    .define_builtin_exception_instance(id, type_name, args_id)?;
                return Ok(Step::Done(id));
            }
        }
        if !contents.is_primitive() {
            if let Some(path) = ctx.index.path_for(&ctx.heap, value) {
                tracing::trace!(%value, %path, "module-level object");
                let id = self.mint(value);
                self.registry.define_module_level_object(id, path)?;
                return Ok(Step::Done(id));
            }
        }
        if let Some(substitute) = self.substitute(value) {
            tracing::trace!(%value, %substitute, "substituted pure implementation");
            return Ok(Step::Substitute(substitute));
        }
        Ok(Step::Structural(contents))
    }

    fn substitution_cycle(&self, root: ValueRef) -> WalkError {
        let type_name = self
            .ctx
            .heap
            .get(root)
            .map_or_else(|| "unknown".to_owned(), |v| v.type_name().to_owned());
        tracing::warn!(%root, %type_name, "pure mappings substitute in a cycle");
        WalkError::SubstitutionCycle { type_name }
    }

    fn walk_structure(&mut self, value: ValueRef, contents: Value) -> Result<ObjectId, WalkError> {
        match contents {
            Value::Primitive(p) => {
                let id = self.mint(value);
                self.registry.define_primitive(id, p)?;
                Ok(id)
            }
            Value::Tuple(members) => {
                let id = self.mint(value);
                let member_ids = self.walk_all(&members)?;
                self.registry.define_tuple(id, member_ids)?;
                Ok(id)
            }
            Value::List(members) => {
                let id = self.mint(value);
                let member_ids = self.walk_all(&members)?;
                self.registry.define_list(id, member_ids)?;
                Ok(id)
            }
            Value::Dict(entries) => {
                let id = self.mint(value);
                let mut key_ids = Vec::with_capacity(entries.len());
                let mut value_ids = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    key_ids.push(self.walk(k)?);
                    value_ids.push(self.walk(v)?);
                }
                self.registry.define_dict(id, key_ids, value_ids)?;
                Ok(id)
            }
            Value::Function(_) | Value::Class(_) | Value::WithBlock(_) => {
                self.walk_definitions(value)
            }
            Value::Instance { class, members } => {
                let id = self.mint(value);
                let class_id = self.walk(class)?;
                let mut member_ids = BTreeMap::new();
                for (name, member) in members {
                    member_ids.insert(name, self.walk(member)?);
                }
                self.registry.define_class_instance(id, class_id, member_ids)?;
                Ok(id)
            }
            Value::ExceptionInstance { class, args } => {
                // User-defined exception classes convert like any instance.
                let id = self.mint(value);
                let class_id = self.walk(class)?;
                let mut member_ids = BTreeMap::new();
                member_ids.insert("args".to_owned(), self.walk(args)?);
                self.registry.define_class_instance(id, class_id, member_ids)?;
                Ok(id)
            }
            Value::BoundMethod { instance, name } => {
                let id = self.mint(value);
                let instance_id = self.walk(instance)?;
                self.registry.define_instance_method(id, instance_id, &name)?;
                Ok(id)
            }
            Value::Remote(handle) => {
                let id = self.mint(value);
                self.registry.define_remote_object(id, handle)?;
                Ok(id)
            }
            other @ (Value::Module(_) | Value::Builtin { .. } | Value::Opaque { .. }) => {
                Err(WalkError::unsupported(other.type_name()))
            }
        }
    }

    fn walk_all(&mut self, values: &[ValueRef]) -> Result<Vec<ObjectId>, WalkError> {
        values.iter().map(|v| self.walk(*v)).collect()
    }

    fn walk_file(&mut self, path: &str) -> Result<ObjectId, WalkError> {
        let text = self.heap().source(path).ok_or_else(|| WalkError::MissingSource {
            path: path.to_owned(),
        })?;
        let file_key = IdentityKey::file(path, &text);
        if let Some(id) = self.registry.lookup(&file_key) {
            return Ok(id);
        }
        let id = self.registry.register(file_key).id();
        self.registry.define_file(id, path, &text)?;
        Ok(id)
    }

    /// If `value` would be walked as a function or class, the value that
    /// would be walked (after substitutions). Has no registry side effects.
    fn definition_target(&mut self, value: ValueRef) -> Option<ValueRef> {
        let ctx = self.ctx;
        let mut current = value;
        let mut sources = Vec::new();
        loop {
            if self.registry.lookup(&key(current)).is_some() || ctx.singletons.contains(current) {
                return None;
            }
            let contents = ctx.heap.get(current)?;
            if !contents.is_primitive() && ctx.index.path_for(&ctx.heap, current).is_some() {
                return None;
            }
            match self.substitute(current) {
                Some(substitute) => {
                    // A cycle is reported when the value itself is walked.
                    let source = ctx.mapping.mapping_source(&ctx.heap, current);
                    if sources.contains(&source) {
                        return None;
                    }
                    sources.push(source);
                    current = substitute;
                }
                None => {
                    return matches!(contents, Value::Function(_) | Value::Class(_))
                        .then_some(current)
                }
            }
        }
    }

    fn bind(
        &mut self,
        graph: &mut FreeVariableGraph,
        from: ExpressionId,
        value: ValueRef,
        pending: &mut Vec<ExpressionId>,
    ) -> Binding {
        match self.definition_target(value) {
            Some(target) => {
                let (expr, is_new) = graph.node_for(target, Some(from));
                if is_new {
                    pending.push(expr);
                }
                Binding::Expression(expr)
            }
            None => Binding::Value(value),
        }
    }

    fn walk_definitions(&mut self, root: ValueRef) -> Result<ObjectId, WalkError> {
        let ctx = self.ctx;
        let resolver = FreeVariableResolver::new(&ctx.heap, ctx.mapping.as_ref());
        let mut graph = FreeVariableGraph::new();
        let mut definitions: HashMap<ExpressionId, Definition> = HashMap::new();

        // Discovery.
        let (root_expr, _) = graph.node_for(root, None);
        let mut pending = vec![root_expr];
        while let Some(expr) = pending.pop() {
            let Some(value) = graph.value(expr) else {
                continue;
            };
            let contents = ctx.heap.get(value).ok_or(WalkError::DanglingValue(value))?;
            let definition = Definition::of(&ctx.heap, &contents)
                .ok_or_else(|| WalkError::unsupported(contents.type_name()))?;

            for chain in &definition.chains {
                let resolved = match resolver.resolve(&definition.scopes, chain) {
                    Ok(Some(resolved)) => resolved,
                    Ok(None) => continue,
                    Err(mut err) => {
                        err.push_frame(self.frame(&definition));
                        err.trace.extend(self.ancestor_frames(&graph, &definitions, expr));
                        return Err(err.into());
                    }
                };
                let binding = self.bind(&mut graph, expr, resolved.value, &mut pending);
                graph.add_chain(expr, resolved.chain, binding);
            }
            for base in &definition.bases {
                let binding = self.bind(&mut graph, expr, *base, &mut pending);
                graph.add_base(expr, binding);
            }
            definitions.insert(expr, definition);
        }

        // Minting. Every node gets its id before any record is built, so
        // nested walks that reach a node see its id.
        let values: Vec<ValueRef> = graph.ids().filter_map(|expr| graph.value(expr)).collect();
        let ids: Vec<ObjectId> = values.iter().map(|value| self.mint(*value)).collect();
        self.alias_substituted(&values, &ids);

        // Sealing, one strongly connected group at a time.
        let components = strongly_connected_components(&graph.expression_id_graph());
        tracing::debug!(
            %root,
            definitions = graph.len(),
            components = components.len(),
            "walking definition batch"
        );
        for component in components {
            let mut records = Vec::with_capacity(component.len());
            for expr in component {
                let Some(definition) = definitions.get(&expr) else {
                    continue;
                };
                let record = self
                    .definition_record(&graph, expr, definition, &ids)
                    .map_err(|err| {
                        err.with_frames(|| {
                            let mut frames = vec![self.frame(definition)];
                            frames.extend(self.ancestor_frames(&graph, &definitions, expr));
                            frames
                        })
                    })?;
                records.push((ids[expr.index() as usize], record));
            }
            self.registry.define_group(records)?;
        }

        Ok(ids[root_expr.index() as usize])
    }

    /// A trace frame for `definition`, with its file id if the file is
    /// already registered.
    fn frame(&self, definition: &Definition) -> TraceFrame {
        let location = &definition.location;
        let frame = TraceFrame::new(&location.file, location.line);
        let known = self
            .heap()
            .source(&location.file)
            .and_then(|text| self.registry.lookup(&IdentityKey::file(&location.file, &text)));
        match known {
            Some(id) => frame.in_file(id),
            None => frame,
        }
    }

    /// Frames of every definition `expr` was discovered from, nearest first.
    fn ancestor_frames(
        &self,
        graph: &FreeVariableGraph,
        definitions: &HashMap<ExpressionId, Definition>,
        expr: ExpressionId,
    ) -> Vec<TraceFrame> {
        graph
            .ancestry(expr)
            .into_iter()
            .skip(1)
            .filter_map(|ancestor| definitions.get(&ancestor))
            .map(|definition| self.frame(definition))
            .collect()
    }

    /// Bind the originals of substituted definitions to their stand-in's id.
    fn alias_substituted(&mut self, values: &[ValueRef], ids: &[ObjectId]) {
        let nodes: HashMap<ValueRef, ObjectId> =
            values.iter().copied().zip(ids.iter().copied()).collect();
        let mut aliases = Vec::new();
        for original in self.substitutions.keys() {
            let mut current = *original;
            let mut hops = 0;
            while let Some(next) = self.substitutions.get(&current) {
                current = *next;
                hops += 1;
                if hops > self.substitutions.len() {
                    break;
                }
            }
            if let Some(id) = nodes.get(&current) {
                aliases.push((*original, *id));
            }
        }
        for (original, id) in aliases {
            self.registry.alias(key(original), id);
        }
    }

    fn bound_id(&mut self, binding: Binding, ids: &[ObjectId]) -> Result<ObjectId, WalkError> {
        match binding {
            Binding::Expression(expr) => Ok(ids[expr.index() as usize]),
            Binding::Value(value) => self.walk(value),
        }
    }

    fn definition_record(
        &mut self,
        graph: &FreeVariableGraph,
        expr: ExpressionId,
        definition: &Definition,
        ids: &[ObjectId],
    ) -> Result<Record, WalkError> {
        let mut free_variable_chains = BTreeMap::new();
        for bound in graph.chain_for(expr) {
            let id = self.bound_id(bound.binding, ids)?;
            free_variable_chains.insert(bound.chain.dotted(), id);
        }
        let source_file_id = self.walk_file(&definition.location.file)?;
        let line_number = definition.location.line;
        Ok(match definition.kind {
            DefinitionKind::Function => Record::FunctionDefinition {
                source_file_id,
                line_number,
                free_variable_chains,
            },
            DefinitionKind::Class => {
                let mut base_class_ids = Vec::new();
                for base in graph.bases(expr) {
                    base_class_ids.push(self.bound_id(*base, ids)?);
                }
                Record::ClassDefinition {
                    source_file_id,
                    line_number,
                    free_variable_chains,
                    base_class_ids,
                }
            }
            DefinitionKind::WithBlock => Record::WithBlock {
                free_variable_chains,
                source_file_id,
                line_number,
            },
        })
    }
}

