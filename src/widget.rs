//! Widget classification.
//!
//! Walks a configuration object against its schema and produces one
//! [`WidgetDescriptor`] per editable leaf, in a stable order the rendering
//! layer depends on: schema declaration order, ascending index order inside
//! repeated fields, and an [`Widget::Append`] control after the last element
//! of every expandable list.

use log::debug;
use serde_json::Value;

use crate::engine::EngineError;
use crate::path::{FieldPath, Mangler};
use crate::schema::{FieldSpec, FieldType, SchemaError, SchemaProvider, default_for_field};

/// Render-time description of one editable control.
///
/// Produced fresh on every classification; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetDescriptor {
    /// Mangled identifier, used verbatim as the form element name.
    pub id: String,
    pub widget: Widget,
}

/// The kind of control a field maps to, with its current state.
#[derive(Debug, Clone, PartialEq)]
pub enum Widget {
    /// Free-text input for a scalar leaf or an honorary-primitive message.
    Text { value: String },
    /// Single-choice selector for an enum field.
    Select { value: String, choices: Vec<String> },
    /// Checkbox group for a repeated enum field; the whole list is edited
    /// as one multi-valued control.
    EnumMulti {
        values: Vec<String>,
        choices: Vec<String>,
    },
    /// Control that appends a new element to a repeated field. Its id is
    /// the repeated field's own path, with no index segment.
    Append,
}

impl Widget {
    /// Enum choices flattened into a single `,`-joined string, for
    /// templates that transport the choice set as one field. Schema
    /// validation forbids `,` inside individual choices.
    pub fn choices_joined(&self) -> Option<String> {
        match self {
            Widget::Select { choices, .. } | Widget::EnumMulti { choices, .. } => {
                Some(choices.join(","))
            }
            _ => None,
        }
    }

    /// Current value flattened into a single string: the value itself for
    /// single-valued widgets, `,`-joined for multi-valued ones.
    pub fn value_joined(&self) -> Option<String> {
        match self {
            Widget::Text { value } => Some(value.clone()),
            Widget::Select { value, .. } => Some(value.clone()),
            Widget::EnumMulti { values, .. } => Some(values.join(",")),
            Widget::Append => None,
        }
    }
}

/// Stringifies a leaf JSON value for display in a text or select widget.
fn leaf_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Compact single-line encoding of an honorary-primitive sub-object.
///
/// Plain JSON: it round-trips exactly and never spans lines. The
/// reconstructor parses the same form back in `rebuild`.
pub(crate) fn honorary_string(value: &Value) -> String {
    value.to_string()
}

pub(crate) fn classify_message(
    mangler: &Mangler,
    schema: &dyn SchemaProvider,
    type_name: &str,
    obj: &Value,
    path: &FieldPath,
    out: &mut Vec<WidgetDescriptor>,
) -> Result<(), EngineError> {
    debug!("classify {type_name} at [{path}]");
    let fields = schema
        .fields(type_name)
        .ok_or_else(|| SchemaError::UnknownMessage(type_name.to_string()))?;

    for spec in fields {
        let field_path = path.child(&spec.name);
        let current = obj.get(&spec.name);

        if spec.repeated {
            if let FieldType::Enum { choices } = &spec.ty {
                // Repeated enums collapse into one checkbox group.
                let values = current
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().map(leaf_string).collect())
                    .unwrap_or_default();
                out.push(WidgetDescriptor {
                    id: mangler.mangle(&field_path)?,
                    widget: Widget::EnumMulti {
                        values,
                        choices: choices.clone(),
                    },
                });
                continue;
            }
            let empty = Vec::new();
            let elements = current.and_then(Value::as_array).unwrap_or(&empty);
            for (index, element) in elements.iter().enumerate() {
                let element_path = field_path.element(index);
                classify_leaf_or_recurse(
                    mangler,
                    schema,
                    spec,
                    Some(element),
                    &element_path,
                    out,
                )?;
            }
            out.push(WidgetDescriptor {
                id: mangler.mangle(&field_path)?,
                widget: Widget::Append,
            });
        } else {
            classify_leaf_or_recurse(mangler, schema, spec, current, &field_path, out)?;
        }
    }
    Ok(())
}

/// Emits the descriptor for one addressed value, or recurses into a
/// non-honorary nested message (which contributes no descriptor itself).
fn classify_leaf_or_recurse(
    mangler: &Mangler,
    schema: &dyn SchemaProvider,
    spec: &FieldSpec,
    current: Option<&Value>,
    path: &FieldPath,
    out: &mut Vec<WidgetDescriptor>,
) -> Result<(), EngineError> {
    match &spec.ty {
        FieldType::Scalar(_) => {
            let value = match current {
                Some(v) if !v.is_null() => leaf_string(v),
                _ => leaf_string(&default_for_field(spec)),
            };
            out.push(WidgetDescriptor {
                id: mangler.mangle(path)?,
                widget: Widget::Text { value },
            });
        }
        FieldType::Enum { choices } => {
            let value = match current {
                Some(v) if !v.is_null() => leaf_string(v),
                _ => leaf_string(&default_for_field(spec)),
            };
            out.push(WidgetDescriptor {
                id: mangler.mangle(path)?,
                widget: Widget::Select {
                    value,
                    choices: choices.clone(),
                },
            });
        }
        FieldType::Message { type_name } => {
            if schema.is_honorary_primitive(type_name) {
                let value = match current {
                    Some(v) if !v.is_null() => honorary_string(v),
                    _ => honorary_string(&default_for_field(spec)),
                };
                out.push(WidgetDescriptor {
                    id: mangler.mangle(path)?,
                    widget: Widget::Text { value },
                });
            } else {
                let empty = Value::Object(serde_json::Map::new());
                let sub = match current {
                    Some(v) if v.is_object() => v,
                    _ => &empty,
                };
                classify_message(mangler, schema, type_name, sub, path, out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::{ScalarType, TableSchema};

    fn schema() -> TableSchema {
        TableSchema::new("Root")
            .message(
                "Root",
                vec![
                    FieldSpec::new("a", FieldType::Scalar(ScalarType::String)),
                    FieldSpec::new("b", FieldType::Scalar(ScalarType::Integer)).repeated(),
                    FieldSpec::new(
                        "c",
                        FieldType::Enum {
                            choices: vec!["x".into(), "y".into()],
                        },
                    ),
                ],
            )
            .message(
                "Color",
                vec![
                    FieldSpec::new("r", FieldType::Scalar(ScalarType::Integer)),
                    FieldSpec::new("g", FieldType::Scalar(ScalarType::Integer)),
                ],
            )
    }

    fn ids(out: &[WidgetDescriptor]) -> Vec<&str> {
        out.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_declaration_and_index_order() {
        let schema = schema();
        let obj = json!({"a": "hi", "b": [1, 2], "c": "y"});
        let mut out = Vec::new();
        classify_message(
            &Mangler::default(),
            &schema,
            "Root",
            &obj,
            &FieldPath::root(),
            &mut out,
        )
        .unwrap();
        assert_eq!(ids(&out), ["a", "b:0", "b:1", "b", "c"]);
        assert_eq!(out[3].widget, Widget::Append);
        assert_eq!(
            out[4].widget,
            Widget::Select {
                value: "y".into(),
                choices: vec!["x".into(), "y".into()],
            }
        );
    }

    #[test]
    fn test_deterministic() {
        let schema = schema();
        let obj = json!({"a": "hi", "b": [3]});
        let mut first = Vec::new();
        let mut second = Vec::new();
        for out in [&mut first, &mut second] {
            classify_message(
                &Mangler::default(),
                &schema,
                "Root",
                &obj,
                &FieldPath::root(),
                out,
            )
            .unwrap();
        }
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_fields_show_defaults() {
        let schema = schema();
        let obj = json!({});
        let mut out = Vec::new();
        classify_message(
            &Mangler::default(),
            &schema,
            "Root",
            &obj,
            &FieldPath::root(),
            &mut out,
        )
        .unwrap();
        // Empty list contributes only its append control.
        assert_eq!(ids(&out), ["a", "b", "c"]);
        assert_eq!(out[0].widget, Widget::Text { value: String::new() });
        assert_eq!(out[1].widget, Widget::Append);
        // Enum defaults to its first choice.
        assert_eq!(
            out[2].widget,
            Widget::Select {
                value: "x".into(),
                choices: vec!["x".into(), "y".into()],
            }
        );
    }

    #[test]
    fn test_honorary_primitive_is_opaque() {
        let schema = TableSchema::new("Root")
            .message(
                "Root",
                vec![FieldSpec::new(
                    "tint",
                    FieldType::Message {
                        type_name: "Color".into(),
                    },
                )],
            )
            .message(
                "Color",
                vec![
                    FieldSpec::new("r", FieldType::Scalar(ScalarType::Integer)),
                    FieldSpec::new("g", FieldType::Scalar(ScalarType::Integer)),
                ],
            )
            .honorary_primitive("Color");
        let obj = json!({"tint": {"r": 1, "g": 2}});
        let mut out = Vec::new();
        classify_message(
            &Mangler::default(),
            &schema,
            "Root",
            &obj,
            &FieldPath::root(),
            &mut out,
        )
        .unwrap();
        assert_eq!(ids(&out), ["tint"]);
        // serde_json orders object keys; the encoding stays on one line and
        // round-trips through the reconstructor.
        assert_eq!(
            out[0].widget,
            Widget::Text {
                value: r#"{"g":2,"r":1}"#.into()
            }
        );
    }

    #[test]
    fn test_tree_shaped_schema_expands_only_present_elements() {
        let schema = TableSchema::new("Node").message(
            "Node",
            vec![
                FieldSpec::new("label", FieldType::Scalar(ScalarType::String)),
                FieldSpec::new(
                    "children",
                    FieldType::Message {
                        type_name: "Node".into(),
                    },
                )
                .repeated(),
            ],
        );
        schema.validate(&Mangler::default()).unwrap();
        let obj = json!({
            "label": "root",
            "children": [{"label": "leaf"}]
        });
        let mut out = Vec::new();
        classify_message(
            &Mangler::default(),
            &schema,
            "Node",
            &obj,
            &FieldPath::root(),
            &mut out,
        )
        .unwrap();
        assert_eq!(
            ids(&out),
            ["label", "children:0:label", "children:0:children", "children"]
        );
        assert_eq!(out[2].widget, Widget::Append);
    }

    #[test]
    fn test_repeated_enum_collapses() {
        let schema = TableSchema::new("Root").message(
            "Root",
            vec![
                FieldSpec::new(
                    "layers",
                    FieldType::Enum {
                        choices: vec!["roads".into(), "borders".into(), "labels".into()],
                    },
                )
                .repeated(),
            ],
        );
        let obj = json!({"layers": ["roads", "labels"]});
        let mut out = Vec::new();
        classify_message(
            &Mangler::default(),
            &schema,
            "Root",
            &obj,
            &FieldPath::root(),
            &mut out,
        )
        .unwrap();
        assert_eq!(ids(&out), ["layers"]);
        assert_eq!(out[0].widget.value_joined().unwrap(), "roads,labels");
        assert_eq!(
            out[0].widget.choices_joined().unwrap(),
            "roads,borders,labels"
        );
    }
}
