//! Typed records describing converted objects.
//!
//! Reference fields always hold [`ObjectId`]s; nothing in this module owns
//! another record. Maps are `BTreeMap`s so serialization order is stable.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque handle for one converted object, unique within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── Source attribution ──────────────────────────────────────────────

/// A (line, column) position inside a source file. Lines are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourcePosition {
    pub line: u32,
    pub col: u32,
}

impl SourcePosition {
    pub fn new(line: u32, col: u32) -> Self {
        SourcePosition { line, col }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: SourcePosition,
    pub stop: SourcePosition,
}

/// Source attribution surfaced in errors and traces:
/// `{"path": [filename], "range": {"start": {...}, "stop": {...}}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub path: Vec<String>,
    pub range: SourceRange,
}

impl SourceAttribution {
    /// Attribution for a single point in `file`.
    pub fn at(file: &str, position: SourcePosition) -> Self {
        SourceAttribution {
            path: vec![file.to_owned()],
            range: SourceRange {
                start: position,
                stop: position,
            },
        }
    }
}

/// An attribute-access chain rooted at one free identifier, e.g. `np.linalg.norm`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FreeVariableChain {
    pub names: Vec<String>,
    pub position: SourcePosition,
}

impl FreeVariableChain {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>, line: u32, col: u32) -> Self {
        FreeVariableChain {
            names: names.into_iter().map(Into::into).collect(),
            position: SourcePosition::new(line, col),
        }
    }

    /// The root identifier of the chain.
    pub fn root(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or("")
    }

    /// The chain joined with `.`, as used for keys on the wire.
    pub fn dotted(&self) -> String {
        self.names.join(".")
    }
}

impl fmt::Display for FreeVariableChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}

// ── Module paths ────────────────────────────────────────────────────

/// Canonical location of an object inside the common base environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModulePath {
    /// The module object itself.
    Module { module: String },
    /// A top-level member of a module.
    Member { module: String, member: String },
}

impl ModulePath {
    pub fn module(name: &str) -> Self {
        ModulePath::Module {
            module: name.to_owned(),
        }
    }

    pub fn member(module: &str, member: &str) -> Self {
        ModulePath::Member {
            module: module.to_owned(),
            member: member.to_owned(),
        }
    }

    pub fn module_name(&self) -> &str {
        match self {
            ModulePath::Module { module } | ModulePath::Member { module, .. } => module,
        }
    }

    /// Wire form: `["module", name]` or `["member", module, member]`.
    pub fn to_wire(&self) -> Value {
        match self {
            ModulePath::Module { module } => json!(["module", module]),
            ModulePath::Member { module, member } => json!(["member", module, member]),
        }
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModulePath::Module { module } => write!(f, "{}", module),
            ModulePath::Member { module, member } => write!(f, "{}.{}", module, member),
        }
    }
}

// ── Primitives ──────────────────────────────────────────────────────

/// JSON has no infinities or NaN; those floats travel as
/// `{"float": "inf" | "-inf" | "nan"}`.
const NON_FINITE_KEY: &str = "float";

fn non_finite_name(x: f64) -> &'static str {
    if x.is_nan() {
        "nan"
    } else if x > 0.0 {
        "inf"
    } else {
        "-inf"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Primitive {
    pub fn to_wire(&self) -> Value {
        match self {
            Primitive::None => Value::Null,
            Primitive::Bool(b) => Value::Bool(*b),
            Primitive::Int(i) => json!(i),
            Primitive::Float(x) if x.is_finite() => json!(x),
            Primitive::Float(x) => {
                let mut map = Map::new();
                map.insert(NON_FINITE_KEY.to_owned(), json!(non_finite_name(*x)));
                Value::Object(map)
            }
            Primitive::Str(s) => Value::String(s.clone()),
        }
    }

    /// Read a primitive back. Integers are preferred over floats, so `1.0`
    /// only decodes as a float when it was written with a fractional part.
    pub fn from_wire(value: &Value) -> Option<Primitive> {
        match value {
            Value::Null => Some(Primitive::None),
            Value::Bool(b) => Some(Primitive::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Primitive::Int)
                .or_else(|| n.as_f64().map(Primitive::Float)),
            Value::String(s) => Some(Primitive::Str(s.clone())),
            Value::Object(map) if map.len() == 1 => {
                let float = match map.get(NON_FINITE_KEY)?.as_str()? {
                    "inf" => f64::INFINITY,
                    "-inf" => f64::NEG_INFINITY,
                    "nan" => f64::NAN,
                    _ => return None,
                };
                Some(Primitive::Float(float))
            }
            _ => None,
        }
    }
}

// ── Records ─────────────────────────────────────────────────────────

/// One IR node. The variant set is closed; see [`Record::type_name`] for
/// the tag each variant carries on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Primitive(Primitive),
    Tuple {
        member_ids: Vec<ObjectId>,
    },
    List {
        member_ids: Vec<ObjectId>,
    },
    Dict {
        key_ids: Vec<ObjectId>,
        value_ids: Vec<ObjectId>,
    },
    File {
        path: String,
        text: String,
    },
    FunctionDefinition {
        source_file_id: ObjectId,
        line_number: u32,
        free_variable_chains: BTreeMap<String, ObjectId>,
    },
    ClassDefinition {
        source_file_id: ObjectId,
        line_number: u32,
        free_variable_chains: BTreeMap<String, ObjectId>,
        base_class_ids: Vec<ObjectId>,
    },
    ClassInstance {
        class_id: ObjectId,
        members: BTreeMap<String, ObjectId>,
    },
    WithBlock {
        free_variable_chains: BTreeMap<String, ObjectId>,
        source_file_id: ObjectId,
        line_number: u32,
    },
    RemotePythonObject {
        handle: u64,
    },
    NamedSingleton {
        name: String,
    },
    BuiltinExceptionInstance {
        type_name: String,
        args_id: ObjectId,
    },
    InstanceMethod {
        instance_id: ObjectId,
        method_name: String,
    },
    ModuleLevelObject {
        path: ModulePath,
    },
}

impl Record {
    /// The trailing type tag written on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            Record::Primitive(_) => "Primitive",
            Record::Tuple { .. } => "Tuple",
            Record::List { .. } => "List",
            Record::Dict { .. } => "Dict",
            Record::File { .. } => "File",
            Record::FunctionDefinition { .. } => "FunctionDefinition",
            Record::ClassDefinition { .. } => "ClassDefinition",
            Record::ClassInstance { .. } => "ClassInstanceDescription",
            Record::WithBlock { .. } => "WithBlockDescription",
            Record::RemotePythonObject { .. } => "RemotePythonObject",
            Record::NamedSingleton { .. } => "NamedSingleton",
            Record::BuiltinExceptionInstance { .. } => "BuiltinExceptionInstance",
            Record::InstanceMethod { .. } => "InstanceMethod",
            Record::ModuleLevelObject { .. } => "ModuleLevelObject",
        }
    }

    /// Function and class definitions may take part in reference cycles;
    /// nothing else may.
    pub fn is_definition(&self) -> bool {
        matches!(
            self,
            Record::FunctionDefinition { .. } | Record::ClassDefinition { .. }
        )
    }

    /// Ids this record refers to directly, in field order.
    pub fn referenced_ids(&self) -> Vec<ObjectId> {
        match self {
            Record::Primitive(_)
            | Record::File { .. }
            | Record::RemotePythonObject { .. }
            | Record::NamedSingleton { .. }
            | Record::ModuleLevelObject { .. } => Vec::new(),
            Record::Tuple { member_ids } | Record::List { member_ids } => member_ids.clone(),
            Record::Dict { key_ids, value_ids } => {
                key_ids.iter().chain(value_ids.iter()).copied().collect()
            }
            Record::FunctionDefinition {
                source_file_id,
                free_variable_chains,
                ..
            }
            | Record::WithBlock {
                source_file_id,
                free_variable_chains,
                ..
            } => {
                let mut ids: Vec<ObjectId> = free_variable_chains.values().copied().collect();
                ids.push(*source_file_id);
                ids
            }
            Record::ClassDefinition {
                source_file_id,
                free_variable_chains,
                base_class_ids,
                ..
            } => {
                let mut ids: Vec<ObjectId> = free_variable_chains.values().copied().collect();
                ids.extend(base_class_ids.iter().copied());
                ids.push(*source_file_id);
                ids
            }
            Record::ClassInstance { class_id, members } => {
                let mut ids = vec![*class_id];
                ids.extend(members.values().copied());
                ids
            }
            Record::BuiltinExceptionInstance { args_id, .. } => vec![*args_id],
            Record::InstanceMethod { instance_id, .. } => vec![*instance_id],
        }
    }

    /// Named fields in wire order, without the type tag.
    pub fn wire_fields(&self) -> Vec<(&'static str, Value)> {
        match self {
            Record::Primitive(p) => vec![("value", p.to_wire())],
            Record::Tuple { member_ids } | Record::List { member_ids } => {
                vec![("member_ids", json!(member_ids))]
            }
            Record::Dict { key_ids, value_ids } => vec![
                ("key_ids", json!(key_ids)),
                ("value_ids", json!(value_ids)),
            ],
            Record::File { path, text } => vec![("path", json!(path)), ("text", json!(text))],
            Record::FunctionDefinition {
                source_file_id,
                line_number,
                free_variable_chains,
            } => vec![
                ("source_file_id", json!(source_file_id)),
                ("line_number", json!(line_number)),
                ("free_variable_chains", chains_to_wire(free_variable_chains)),
            ],
            Record::ClassDefinition {
                source_file_id,
                line_number,
                free_variable_chains,
                base_class_ids,
            } => vec![
                ("source_file_id", json!(source_file_id)),
                ("line_number", json!(line_number)),
                ("free_variable_chains", chains_to_wire(free_variable_chains)),
                ("base_class_ids", json!(base_class_ids)),
            ],
            Record::ClassInstance { class_id, members } => vec![
                ("class_id", json!(class_id)),
                ("members", chains_to_wire(members)),
            ],
            Record::WithBlock {
                free_variable_chains,
                source_file_id,
                line_number,
            } => vec![
                ("free_variable_chains", chains_to_wire(free_variable_chains)),
                ("source_file_id", json!(source_file_id)),
                ("line_number", json!(line_number)),
            ],
            Record::RemotePythonObject { handle } => vec![("handle", json!(handle))],
            Record::NamedSingleton { name } => vec![("name", json!(name))],
            Record::BuiltinExceptionInstance { type_name, args_id } => vec![
                ("type_name", json!(type_name)),
                ("args_id", json!(args_id)),
            ],
            Record::InstanceMethod {
                instance_id,
                method_name,
            } => vec![
                ("instance_id", json!(instance_id)),
                ("method_name", json!(method_name)),
            ],
            Record::ModuleLevelObject { path } => vec![("path", path.to_wire())],
        }
    }

    /// Positional form: `[field, ..., "TypeName"]`.
    pub fn to_positional(&self) -> Value {
        let mut items: Vec<Value> = self.wire_fields().into_iter().map(|(_, v)| v).collect();
        items.push(Value::String(self.type_name().to_owned()));
        Value::Array(items)
    }

    /// Keyed form: `{"field": ..., "type": "TypeName"}` with the tag last.
    pub fn to_keyed(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in self.wire_fields() {
            map.insert(name.to_owned(), value);
        }
        map.insert(TYPE_KEY.to_owned(), Value::String(self.type_name().to_owned()));
        Value::Object(map)
    }
}

/// Key holding the type tag in the keyed wire form.
pub const TYPE_KEY: &str = "type";

fn chains_to_wire(chains: &BTreeMap<String, ObjectId>) -> Value {
    let mut map = Map::new();
    for (chain, id) in chains {
        map.insert(chain.clone(), json!(id));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_ids_function_includes_source_file() {
        let mut chains = BTreeMap::new();
        chains.insert("g".to_string(), ObjectId(3));
        let record = Record::FunctionDefinition {
            source_file_id: ObjectId(1),
            line_number: 4,
            free_variable_chains: chains,
        };
        assert_eq!(record.referenced_ids(), vec![ObjectId(3), ObjectId(1)]);
        assert!(record.is_definition());
    }

    #[test]
    fn test_referenced_ids_dict_keys_then_values() {
        let record = Record::Dict {
            key_ids: vec![ObjectId(1), ObjectId(2)],
            value_ids: vec![ObjectId(3), ObjectId(4)],
        };
        assert_eq!(
            record.referenced_ids(),
            vec![ObjectId(1), ObjectId(2), ObjectId(3), ObjectId(4)]
        );
        assert!(!record.is_definition());
    }

    #[test]
    fn test_positional_form_ends_with_tag() {
        let record = Record::NamedSingleton {
            name: "object".to_string(),
        };
        assert_eq!(record.to_positional(), json!(["object", "NamedSingleton"]));
    }

    #[test]
    fn test_keyed_form_puts_tag_last() {
        let record = Record::InstanceMethod {
            instance_id: ObjectId(7),
            method_name: "run".to_string(),
        };
        let keyed = record.to_keyed();
        let keys: Vec<&String> = keyed.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["instance_id", "method_name", "type"]);
        assert_eq!(keyed["type"], "InstanceMethod");
    }

    #[test]
    fn test_source_attribution_shape() {
        let attribution = SourceAttribution::at("model.py", SourcePosition::new(12, 4));
        assert_eq!(
            serde_json::to_value(&attribution).unwrap(),
            json!({
                "path": ["model.py"],
                "range": {
                    "start": {"line": 12, "col": 4},
                    "stop": {"line": 12, "col": 4}
                }
            })
        );
    }

    #[test]
    fn test_chain_dotted() {
        let chain = FreeVariableChain::new(["np", "linalg", "norm"], 3, 8);
        assert_eq!(chain.dotted(), "np.linalg.norm");
        assert_eq!(chain.root(), "np");
        assert_eq!(chain.to_string(), "np.linalg.norm");
    }

    #[test]
    fn test_primitive_int_and_float_stay_distinct() {
        assert_eq!(Primitive::from_wire(&json!(3)), Some(Primitive::Int(3)));
        assert_eq!(Primitive::from_wire(&json!(2.5)), Some(Primitive::Float(2.5)));
        assert_eq!(Primitive::from_wire(&json!([1])), None);
    }
}
