//! Deserialization of wire records back into [`Record`]s.
//!
//! The main entry point is [`from_wire`]. Both wire forms are accepted:
//! a positional array whose last element is the type tag, or a keyed object
//! whose `"type"` entry is the tag. Dispatch looks at the tag only.

use crate::types::*;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Errors while reading a wire record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    /// The value is neither an array nor an object, or carries no tag.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// The trailing tag names no known record kind.
    #[error("unknown record type '{0}'")]
    UnknownType(String),

    /// A field of a known record kind is missing or has the wrong shape.
    #[error("{kind}.{field}: {message}")]
    BadField {
        kind: String,
        field: String,
        message: String,
    },
}

/// Deserialize one record from either wire form.
pub fn from_wire(value: &Value) -> Result<Record, IrError> {
    let fields = Fields::from_value(value)?;
    let kind = fields.tag;

    let record = match kind {
        "Primitive" => {
            let raw = fields.get(0, "value")?;
            let primitive = Primitive::from_wire(raw)
                .ok_or_else(|| fields.bad("value", "expected a primitive value"))?;
            Record::Primitive(primitive)
        }
        "Tuple" => Record::Tuple {
            member_ids: fields.ids(0, "member_ids")?,
        },
        "List" => Record::List {
            member_ids: fields.ids(0, "member_ids")?,
        },
        "Dict" => {
            let key_ids = fields.ids(0, "key_ids")?;
            let value_ids = fields.ids(1, "value_ids")?;
            if key_ids.len() != value_ids.len() {
                return Err(fields.bad("value_ids", "length differs from key_ids"));
            }
            Record::Dict { key_ids, value_ids }
        }
        "File" => Record::File {
            path: fields.string(0, "path")?,
            text: fields.string(1, "text")?,
        },
        "FunctionDefinition" => Record::FunctionDefinition {
            source_file_id: fields.id(0, "source_file_id")?,
            line_number: fields.line(1, "line_number")?,
            free_variable_chains: fields.id_map(2, "free_variable_chains")?,
        },
        "ClassDefinition" => Record::ClassDefinition {
            source_file_id: fields.id(0, "source_file_id")?,
            line_number: fields.line(1, "line_number")?,
            free_variable_chains: fields.id_map(2, "free_variable_chains")?,
            base_class_ids: fields.ids(3, "base_class_ids")?,
        },
        "ClassInstanceDescription" => Record::ClassInstance {
            class_id: fields.id(0, "class_id")?,
            members: fields.id_map(1, "members")?,
        },
        "WithBlockDescription" => Record::WithBlock {
            free_variable_chains: fields.id_map(0, "free_variable_chains")?,
            source_file_id: fields.id(1, "source_file_id")?,
            line_number: fields.line(2, "line_number")?,
        },
        "RemotePythonObject" => Record::RemotePythonObject {
            handle: fields.u64(0, "handle")?,
        },
        "NamedSingleton" => Record::NamedSingleton {
            name: fields.string(0, "name")?,
        },
        "BuiltinExceptionInstance" => Record::BuiltinExceptionInstance {
            type_name: fields.string(0, "type_name")?,
            args_id: fields.id(1, "args_id")?,
        },
        "InstanceMethod" => Record::InstanceMethod {
            instance_id: fields.id(0, "instance_id")?,
            method_name: fields.string(1, "method_name")?,
        },
        "ModuleLevelObject" => Record::ModuleLevelObject {
            path: fields.module_path(0, "path")?,
        },
        other => return Err(IrError::UnknownType(other.to_owned())),
    };

    Ok(record)
}

// ── Field access ────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Layout<'a> {
    Positional(&'a [Value]),
    Keyed(&'a Map<String, Value>),
}

/// Uniform field access over both wire layouts.
struct Fields<'a> {
    tag: &'a str,
    layout: Layout<'a>,
}

impl<'a> Fields<'a> {
    fn from_value(value: &'a Value) -> Result<Self, IrError> {
        match value {
            Value::Array(items) => {
                let (last, rest) = items
                    .split_last()
                    .ok_or_else(|| IrError::Malformed("empty record array".to_string()))?;
                let tag = last.as_str().ok_or_else(|| {
                    IrError::Malformed("last element of record array is not a type tag".to_string())
                })?;
                Ok(Fields {
                    tag,
                    layout: Layout::Positional(rest),
                })
            }
            Value::Object(map) => {
                let tag = map.get(TYPE_KEY).and_then(|v| v.as_str()).ok_or_else(|| {
                    IrError::Malformed(format!("record object has no '{}' tag", TYPE_KEY))
                })?;
                Ok(Fields {
                    tag,
                    layout: Layout::Keyed(map),
                })
            }
            other => Err(IrError::Malformed(format!(
                "expected array or object, got {}",
                other
            ))),
        }
    }

    fn bad(&self, field: &str, message: &str) -> IrError {
        IrError::BadField {
            kind: self.tag.to_owned(),
            field: field.to_owned(),
            message: message.to_owned(),
        }
    }

    fn get(&self, index: usize, name: &str) -> Result<&'a Value, IrError> {
        let found = match self.layout {
            Layout::Positional(items) => items.get(index),
            Layout::Keyed(map) => map.get(name),
        };
        found.ok_or_else(|| self.bad(name, "missing"))
    }

    fn string(&self, index: usize, name: &str) -> Result<String, IrError> {
        self.get(index, name)?
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| self.bad(name, "expected a string"))
    }

    fn u64(&self, index: usize, name: &str) -> Result<u64, IrError> {
        self.get(index, name)?
            .as_u64()
            .ok_or_else(|| self.bad(name, "expected a non-negative integer"))
    }

    fn line(&self, index: usize, name: &str) -> Result<u32, IrError> {
        let raw = self.u64(index, name)?;
        u32::try_from(raw).map_err(|_| self.bad(name, "line number out of range"))
    }

    fn id(&self, index: usize, name: &str) -> Result<ObjectId, IrError> {
        self.u64(index, name).map(ObjectId)
    }

    fn ids(&self, index: usize, name: &str) -> Result<Vec<ObjectId>, IrError> {
        let items = self
            .get(index, name)?
            .as_array()
            .ok_or_else(|| self.bad(name, "expected an array of ids"))?;
        items
            .iter()
            .map(|v| {
                v.as_u64()
                    .map(ObjectId)
                    .ok_or_else(|| self.bad(name, "expected an array of ids"))
            })
            .collect()
    }

    fn id_map(&self, index: usize, name: &str) -> Result<BTreeMap<String, ObjectId>, IrError> {
        let map = self
            .get(index, name)?
            .as_object()
            .ok_or_else(|| self.bad(name, "expected an object of ids"))?;
        map.iter()
            .map(|(k, v)| {
                v.as_u64()
                    .map(|id| (k.clone(), ObjectId(id)))
                    .ok_or_else(|| self.bad(name, "expected an object of ids"))
            })
            .collect()
    }

    fn module_path(&self, index: usize, name: &str) -> Result<ModulePath, IrError> {
        let items = self
            .get(index, name)?
            .as_array()
            .ok_or_else(|| self.bad(name, "expected a module path array"))?;
        let parts: Option<Vec<&str>> = items.iter().map(|v| v.as_str()).collect();
        match parts.as_deref() {
            Some(["module", module]) => Ok(ModulePath::module(module)),
            Some(["member", module, member]) => Ok(ModulePath::member(module, member)),
            _ => Err(self.bad(name, "expected [\"module\", m] or [\"member\", m, name]")),
        }
    }
}
