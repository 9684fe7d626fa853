//! Schema tables and the provider interface.
//!
//! The engine never inspects Rust types directly; it consumes a read-only
//! description of the configuration tree through [`SchemaProvider`]. The
//! concrete [`TableSchema`] is built from explicit tables, either in code or
//! by loading a JSON schema document, and is validated against the mangling
//! marker before any classification happens.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::path::Mangler;

/// Primitive value types a leaf field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Integer,
    Float,
    Boolean,
}

/// Declared type of a field, before the repeated flag is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// A primitive leaf.
    Scalar(ScalarType),
    /// A closed set of string literals.
    Enum { choices: Vec<String> },
    /// A nested message type, referenced by name.
    Message { type_name: String },
}

/// One field of a message type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    /// Repeated fields hold an ordered list of elements of `ty`.
    pub repeated: bool,
    /// Declared default, used when list growth fills skipped indices and
    /// when an empty submission is coerced. For repeated fields this is the
    /// default of one element, not of the list.
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        FieldSpec {
            name: name.into(),
            ty,
            repeated: false,
            default: None,
        }
    }

    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Read-only description of the configuration tree.
///
/// Implementations must be deterministic and side-effect-free: the engine
/// calls these methods repeatedly during one classification or
/// reconstruction and assumes stable answers.
pub trait SchemaProvider {
    /// Name of the message type at the root of the tree.
    fn root_type(&self) -> &str;

    /// Fields of a message type, in declaration order.
    fn fields(&self, type_name: &str) -> Option<&[FieldSpec]>;

    /// Whether a message type is edited as one opaque leaf instead of being
    /// expanded into sub-fields.
    fn is_honorary_primitive(&self, type_name: &str) -> bool;
}

/// Schema construction and validation errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse schema document")]
    Parse(#[from] serde_json::Error),
    #[error("root type {0:?} is not declared")]
    UnknownRoot(String),
    #[error("message type {0:?} is not declared")]
    UnknownMessage(String),
    #[error("message type {0:?} nests itself without a repeated or opaque boundary")]
    UnboundedRecursion(String),
    #[error("field {type_name}.{field}: {reason}")]
    InvalidField {
        type_name: String,
        field: String,
        reason: String,
    },
}

/// Table-backed [`SchemaProvider`].
///
/// Holds the message tables, the honorary-primitives override set and the
/// root type name. Built with the `message`/`honorary_primitive` builder
/// methods or loaded from a JSON document with [`TableSchema::load`];
/// either way, [`TableSchema::validate`] must pass before the schema is
/// handed to an engine.
#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    root: String,
    messages: BTreeMap<String, Vec<FieldSpec>>,
    honorary: BTreeSet<String>,
}

impl TableSchema {
    pub fn new(root: impl Into<String>) -> Self {
        TableSchema {
            root: root.into(),
            messages: BTreeMap::new(),
            honorary: BTreeSet::new(),
        }
    }

    /// Declares a message type and its ordered fields.
    pub fn message(mut self, name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        self.messages.insert(name.into(), fields);
        self
    }

    /// Marks a declared message type as an honorary primitive.
    pub fn honorary_primitive(mut self, name: impl Into<String>) -> Self {
        self.honorary.insert(name.into());
        self
    }

    /// Parses and validates a JSON schema document.
    pub fn load(doc: &str, mangler: &Mangler) -> Result<Self, SchemaError> {
        let doc: SchemaDoc = serde_json::from_str(doc)?;
        let schema = TableSchema::try_from(doc)?;
        schema.validate(mangler)?;
        Ok(schema)
    }

    /// Checks the tables against the separator contract and internal
    /// consistency. Must be re-run if the schema is to be used with a
    /// different marker character.
    ///
    /// Rejects: an undeclared root or message reference, field names that
    /// the mangler cannot represent, duplicate field names, empty enum
    /// choice sets, enum choices containing `,` (the flattened choice
    /// separator), and message cycles that classification would expand
    /// forever.
    pub fn validate(&self, mangler: &Mangler) -> Result<(), SchemaError> {
        if !self.messages.contains_key(&self.root) {
            return Err(SchemaError::UnknownRoot(self.root.clone()));
        }
        for name in &self.honorary {
            if !self.messages.contains_key(name) {
                return Err(SchemaError::UnknownMessage(name.clone()));
            }
        }
        for (type_name, fields) in &self.messages {
            let mut seen = BTreeSet::new();
            for spec in fields {
                let invalid = |reason: String| SchemaError::InvalidField {
                    type_name: type_name.clone(),
                    field: spec.name.clone(),
                    reason,
                };
                mangler
                    .check_name(&spec.name)
                    .map_err(|e| invalid(e.to_string()))?;
                if !seen.insert(&spec.name) {
                    return Err(invalid("duplicate field name".into()));
                }
                match &spec.ty {
                    FieldType::Scalar(_) => {}
                    FieldType::Enum { choices } => {
                        if choices.is_empty() {
                            return Err(invalid("enum with no choices".into()));
                        }
                        let mut seen_choices = BTreeSet::new();
                        for choice in choices {
                            if choice.contains(',') {
                                return Err(invalid(format!(
                                    "enum choice {choice:?} contains ','"
                                )));
                            }
                            if !seen_choices.insert(choice) {
                                return Err(invalid(format!(
                                    "duplicate enum choice {choice:?}"
                                )));
                            }
                        }
                    }
                    FieldType::Message { type_name: target } => {
                        if !self.messages.contains_key(target) {
                            return Err(SchemaError::UnknownMessage(target.clone()));
                        }
                    }
                }
            }
        }
        let mut marks = BTreeMap::new();
        for type_name in self.messages.keys() {
            self.check_recursion(type_name, &mut marks)?;
        }
        Ok(())
    }

    /// Depth-first walk over non-repeated, non-opaque message fields.
    ///
    /// A cycle along such edges would make classification expand forever,
    /// since a singular nested message is always entered. Recursion through
    /// repeated or honorary-primitive fields is bounded by the data and
    /// stays legal.
    fn check_recursion<'a>(
        &'a self,
        type_name: &'a str,
        marks: &mut BTreeMap<&'a str, Mark>,
    ) -> Result<(), SchemaError> {
        match marks.get(type_name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(SchemaError::UnboundedRecursion(type_name.to_string()));
            }
            None => {}
        }
        marks.insert(type_name, Mark::Visiting);
        if let Some(fields) = self.messages.get(type_name) {
            for spec in fields {
                if spec.repeated {
                    continue;
                }
                if let FieldType::Message { type_name: target } = &spec.ty
                    && !self.honorary.contains(target)
                {
                    self.check_recursion(target, marks)?;
                }
            }
        }
        marks.insert(type_name, Mark::Done);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl SchemaProvider for TableSchema {
    fn root_type(&self) -> &str {
        &self.root
    }

    fn fields(&self, type_name: &str) -> Option<&[FieldSpec]> {
        self.messages.get(type_name).map(Vec::as_slice)
    }

    fn is_honorary_primitive(&self, type_name: &str) -> bool {
        self.honorary.contains(type_name)
    }
}

/// Default value for a field, used when list growth fills skipped indices
/// and when an empty submission lands on a non-string scalar.
///
/// An explicit schema default wins; otherwise scalars get their zero value,
/// enums their first choice, and message fields an empty object whose
/// sub-fields read through to their own defaults on access.
pub fn default_for_field(spec: &FieldSpec) -> Value {
    if let Some(v) = &spec.default {
        return v.clone();
    }
    match &spec.ty {
        FieldType::Scalar(ScalarType::String) => Value::String(String::new()),
        FieldType::Scalar(ScalarType::Integer) => Value::from(0i64),
        FieldType::Scalar(ScalarType::Float) => Value::from(0.0f64),
        FieldType::Scalar(ScalarType::Boolean) => Value::Bool(false),
        FieldType::Enum { choices } => Value::String(choices[0].clone()),
        FieldType::Message { .. } => Value::Object(serde_json::Map::new()),
    }
}

/// Serialized form of a schema, as stored in `*-schema.json` files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDoc {
    /// Root message type name.
    pub root: String,
    /// Message types edited as opaque leaves.
    #[serde(default)]
    pub honorary_primitives: Vec<String>,
    /// Field tables per message type.
    pub messages: BTreeMap<String, Vec<FieldDoc>>,
}

/// Serialized form of one field declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDoc {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKindDoc,
    #[serde(default)]
    pub repeated: bool,
    /// Enum choice literals; required for `enum` fields.
    #[serde(default)]
    pub choices: Vec<String>,
    /// Referenced message type; required for `message` fields.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
}

/// Field kind tag in a schema document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKindDoc {
    String,
    Integer,
    Float,
    Boolean,
    Enum,
    Message,
}

impl TryFrom<SchemaDoc> for TableSchema {
    type Error = SchemaError;

    fn try_from(doc: SchemaDoc) -> Result<Self, SchemaError> {
        let mut schema = TableSchema::new(doc.root);
        for name in doc.honorary_primitives {
            schema.honorary.insert(name);
        }
        for (type_name, field_docs) in doc.messages {
            let mut fields = Vec::with_capacity(field_docs.len());
            for fd in field_docs {
                let invalid = |reason: &str| SchemaError::InvalidField {
                    type_name: type_name.clone(),
                    field: fd.name.clone(),
                    reason: reason.into(),
                };
                let ty = match fd.kind {
                    FieldKindDoc::String => FieldType::Scalar(ScalarType::String),
                    FieldKindDoc::Integer => FieldType::Scalar(ScalarType::Integer),
                    FieldKindDoc::Float => FieldType::Scalar(ScalarType::Float),
                    FieldKindDoc::Boolean => FieldType::Scalar(ScalarType::Boolean),
                    FieldKindDoc::Enum => {
                        if fd.choices.is_empty() {
                            return Err(invalid("enum field without choices"));
                        }
                        FieldType::Enum {
                            choices: fd.choices.clone(),
                        }
                    }
                    FieldKindDoc::Message => {
                        let Some(target) = fd.message.clone() else {
                            return Err(invalid("message field without target type"));
                        };
                        FieldType::Message { type_name: target }
                    }
                };
                fields.push(FieldSpec {
                    name: fd.name,
                    ty,
                    repeated: fd.repeated,
                    default: fd.default,
                });
            }
            schema.messages.insert(type_name, fields);
        }
        Ok(schema)
    }
}
