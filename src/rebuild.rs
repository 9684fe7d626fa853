//! Tree reconstruction from submitted form values.
//!
//! The inverse of classification: a flat set of (identifier, value) pairs is
//! resolved against the schema and applied to a private copy of the base
//! object. Failures are per-field and accumulated; one bad submission never
//! blocks the rest.
//!
//! Each submission is handled in two phases. The first resolves the path
//! against the schema alone and coerces the submitted string, without
//! touching the object; only when both succeed does the second phase walk
//! the copy and write, growing lists and materializing missing intermediate
//! objects as it goes. A rejected submission therefore leaves the copy
//! byte-for-byte unchanged.

use std::fmt;

use log::{debug, warn};
use serde_json::Value;

use crate::path::{Mangler, Segment};
use crate::schema::{FieldSpec, FieldType, ScalarType, SchemaProvider, default_for_field};

/// Value(s) submitted for one form element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    /// One value, the common case.
    Single(String),
    /// Ordered values of a multi-valued widget (e.g. a checkbox group).
    Many(Vec<String>),
}

impl Submitted {
    pub fn single(s: impl Into<String>) -> Self {
        Submitted::Single(s.into())
    }

    /// The effective value for a single-valued field. When a browser posts
    /// the same name more than once, the last value wins.
    fn last(&self) -> &str {
        match self {
            Submitted::Single(s) => s,
            Submitted::Many(v) => v.last().map(String::as_str).unwrap_or(""),
        }
    }
}

impl From<&str> for Submitted {
    fn from(s: &str) -> Self {
        Submitted::Single(s.to_string())
    }
}

/// Ordered flat mapping from mangled identifier to submitted value(s).
/// Request-scoped; one per edit submission.
pub type SubmissionMap = Vec<(String, Submitted)>;

/// Why one submission was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// The identifier does not resolve to an editable leaf of the schema.
    UnknownField,
    /// The value failed type coercion, enum membership, or the
    /// honorary-primitive parse.
    InvalidValue,
}

/// Per-field failure recorded during reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// The submitted identifier, verbatim.
    pub id: String,
    pub kind: FieldErrorKind,
    pub detail: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FieldErrorKind::UnknownField => "unknown field",
            FieldErrorKind::InvalidValue => "invalid value",
        };
        write!(f, "{}: {kind}: {}", self.id, self.detail)
    }
}

impl std::error::Error for FieldError {}

/// Largest list index a submission may address. Growth fills every skipped
/// slot with a default element, so the ceiling bounds the allocation one
/// wire submission can force.
pub const MAX_LIST_INDEX: usize = 9999;

/// How the resolved path addresses its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Overwrite the addressed leaf (or list element).
    Set,
    /// Append one element to the addressed repeated field.
    Append,
    /// Replace the whole list of a repeated enum.
    ReplaceList,
}

enum Reject {
    Unknown(String),
    Invalid(String),
}

pub(crate) fn reconstruct(
    mangler: &Mangler,
    schema: &dyn SchemaProvider,
    root_type: &str,
    base: &Value,
    submissions: &SubmissionMap,
) -> (Value, Vec<FieldError>) {
    let mut copy = base.clone();
    let mut errors = Vec::new();

    for (id, submitted) in submissions {
        debug!("reconstruct: applying {id:?}");
        match apply_one(mangler, schema, root_type, &mut copy, id, submitted) {
            Ok(()) => {}
            Err(Reject::Unknown(detail)) => {
                warn!("reconstruct: {id:?} unknown: {detail}");
                errors.push(FieldError {
                    id: id.clone(),
                    kind: FieldErrorKind::UnknownField,
                    detail,
                });
            }
            Err(Reject::Invalid(detail)) => {
                warn!("reconstruct: {id:?} invalid: {detail}");
                errors.push(FieldError {
                    id: id.clone(),
                    kind: FieldErrorKind::InvalidValue,
                    detail,
                });
            }
        }
    }
    (copy, errors)
}

fn apply_one(
    mangler: &Mangler,
    schema: &dyn SchemaProvider,
    root_type: &str,
    copy: &mut Value,
    id: &str,
    submitted: &Submitted,
) -> Result<(), Reject> {
    // A malformed id from the wire is indistinguishable from an unknown one
    // at this layer; both are tolerated per field.
    let path = mangler
        .unmangle(id)
        .map_err(|e| Reject::Unknown(e.to_string()))?;

    let (spec, mode) = resolve_leaf(schema, root_type, path.segments())?;
    let value = coerce(schema, spec, mode, submitted)?;
    write_leaf(schema, root_type, copy, path.segments(), mode, value);
    Ok(())
}

/// Walks the schema along the path, without touching any object, and
/// returns the leaf's field spec plus the write mode. All failures here are
/// [`FieldErrorKind::UnknownField`].
fn resolve_leaf<'a>(
    schema: &'a dyn SchemaProvider,
    root_type: &str,
    segs: &[Segment],
) -> Result<(&'a FieldSpec, WriteMode), Reject> {
    let unknown = |detail: String| Reject::Unknown(detail);
    let mut type_name = root_type.to_string();
    let mut i = 0;

    loop {
        let Some(Segment::Name(name)) = segs.get(i) else {
            return Err(unknown("expected a field name segment".into()));
        };
        let fields = schema
            .fields(&type_name)
            .ok_or_else(|| unknown(format!("message type {type_name:?} not declared")))?;
        let spec = fields
            .iter()
            .find(|f| &f.name == name)
            .ok_or_else(|| unknown(format!("no field {name:?} in {type_name}")))?;
        i += 1;

        if spec.repeated {
            match segs.get(i) {
                // Bare repeated id: the wire form of the append control,
                // except for repeated enums which are edited as one list.
                None => {
                    let mode = if matches!(spec.ty, FieldType::Enum { .. }) {
                        WriteMode::ReplaceList
                    } else {
                        WriteMode::Append
                    };
                    return Ok((spec, mode));
                }
                Some(Segment::Index(index)) => {
                    if *index > MAX_LIST_INDEX {
                        return Err(Reject::Invalid(format!(
                            "index {index} exceeds the list ceiling {MAX_LIST_INDEX}"
                        )));
                    }
                    i += 1;
                    if segs.get(i).is_none() {
                        check_leaf(schema, spec)?;
                        return Ok((spec, WriteMode::Set));
                    }
                    type_name = descend(schema, spec)?;
                }
                Some(Segment::Name(_)) => {
                    return Err(unknown(format!(
                        "repeated field {name:?} requires an index"
                    )));
                }
            }
        } else {
            match segs.get(i) {
                None => {
                    check_leaf(schema, spec)?;
                    return Ok((spec, WriteMode::Set));
                }
                Some(Segment::Name(_)) => {
                    type_name = descend(schema, spec)?;
                }
                Some(Segment::Index(_)) => {
                    return Err(unknown(format!("field {name:?} is not repeated")));
                }
            }
        }
    }
}

/// The path continues past this field: it must be a nested, non-opaque
/// message. Returns the type to continue with.
fn descend(schema: &dyn SchemaProvider, spec: &FieldSpec) -> Result<String, Reject> {
    match &spec.ty {
        FieldType::Message { type_name } => {
            if schema.is_honorary_primitive(type_name) {
                Err(Reject::Unknown(format!(
                    "field {:?} is an opaque {type_name} and has no sub-fields",
                    spec.name
                )))
            } else {
                Ok(type_name.clone())
            }
        }
        _ => Err(Reject::Unknown(format!(
            "field {:?} has no sub-fields",
            spec.name
        ))),
    }
}

/// The path ends here: the field must be editable as one value.
fn check_leaf(schema: &dyn SchemaProvider, spec: &FieldSpec) -> Result<(), Reject> {
    match &spec.ty {
        FieldType::Scalar(_) | FieldType::Enum { .. } => Ok(()),
        FieldType::Message { type_name } => {
            if schema.is_honorary_primitive(type_name) {
                Ok(())
            } else {
                Err(Reject::Unknown(format!(
                    "field {:?} is a nested message, not an editable leaf",
                    spec.name
                )))
            }
        }
    }
}

/// Coerces the submitted string(s) into the JSON value to write. All
/// failures here are [`FieldErrorKind::InvalidValue`].
fn coerce(
    schema: &dyn SchemaProvider,
    spec: &FieldSpec,
    mode: WriteMode,
    submitted: &Submitted,
) -> Result<Value, Reject> {
    if mode == WriteMode::ReplaceList {
        return coerce_enum_list(spec, submitted);
    }
    if let FieldType::Message { type_name } = &spec.ty
        && !schema.is_honorary_primitive(type_name)
    {
        // Only reachable as an append to a repeated message list: the add
        // control materializes one default element.
        return Ok(default_for_field(spec));
    }
    coerce_leaf(spec, submitted.last())
}

fn coerce_leaf(spec: &FieldSpec, text: &str) -> Result<Value, Reject> {
    let invalid = |detail: String| Reject::Invalid(detail);

    match &spec.ty {
        FieldType::Scalar(ScalarType::String) => Ok(Value::String(text.to_string())),
        // An empty submission for a non-string scalar means "reset to the
        // declared default".
        FieldType::Scalar(_) if text.is_empty() => Ok(default_for_field(spec)),
        FieldType::Scalar(ScalarType::Integer) => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid(format!("{text:?} is not an integer"))),
        FieldType::Scalar(ScalarType::Float) => {
            let f = text
                .trim()
                .parse::<f64>()
                .map_err(|_| invalid(format!("{text:?} is not a number")))?;
            serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| invalid(format!("{text:?} is not a finite number")))
        }
        FieldType::Scalar(ScalarType::Boolean) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "off" => Ok(Value::Bool(false)),
            _ => Err(invalid(format!("{text:?} is not a boolean"))),
        },
        FieldType::Enum { choices } => {
            if choices.iter().any(|c| c == text) {
                Ok(Value::String(text.to_string()))
            } else {
                Err(invalid(format!(
                    "{text:?} is not one of {}",
                    choices.join(",")
                )))
            }
        }
        FieldType::Message { .. } => {
            // Honorary primitive: the compact single-line JSON form emitted
            // by the classifier.
            let parsed: Value = serde_json::from_str(text)
                .map_err(|e| invalid(format!("opaque value does not parse: {e}")))?;
            if parsed.is_object() {
                Ok(parsed)
            } else {
                Err(invalid("opaque value must be a JSON object".into()))
            }
        }
    }
}

/// Replaces the whole list of a repeated enum. Accepts either the
/// multi-value form of a checkbox group or one `,`-joined string.
fn coerce_enum_list(spec: &FieldSpec, submitted: &Submitted) -> Result<Value, Reject> {
    let FieldType::Enum { choices } = &spec.ty else {
        return Err(Reject::Unknown(format!(
            "field {:?} is not a repeated enum",
            spec.name
        )));
    };
    let texts: Vec<String> = match submitted {
        Submitted::Many(values) => values.clone(),
        Submitted::Single(s) if s.is_empty() => Vec::new(),
        Submitted::Single(s) => s.split(',').map(str::to_string).collect(),
    };
    for text in &texts {
        if !choices.iter().any(|c| c == text) {
            return Err(Reject::Invalid(format!(
                "{text:?} is not one of {}",
                choices.join(",")
            )));
        }
    }
    Ok(Value::Array(texts.into_iter().map(Value::String).collect()))
}

/// Writes a coerced value along an already-resolved path, materializing
/// missing intermediate objects and growing lists with schema defaults.
/// Cannot fail: the path was validated against the schema by
/// [`resolve_leaf`].
fn write_leaf(
    schema: &dyn SchemaProvider,
    type_name: &str,
    obj: &mut Value,
    segs: &[Segment],
    mode: WriteMode,
    value: Value,
) {
    if !obj.is_object() {
        *obj = Value::Object(serde_json::Map::new());
    }
    let Some(fields) = schema.fields(type_name) else {
        return;
    };
    let Some(Segment::Name(name)) = segs.first() else {
        return;
    };
    let Some(spec) = fields.iter().find(|f| &f.name == name) else {
        return;
    };
    let Value::Object(map) = obj else {
        return;
    };
    let rest = &segs[1..];

    if spec.repeated {
        match rest.first() {
            None => match mode {
                WriteMode::ReplaceList => {
                    map.insert(name.clone(), value);
                }
                _ => {
                    let slot = map
                        .entry(name.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if !slot.is_array() {
                        *slot = Value::Array(Vec::new());
                    }
                    if let Value::Array(arr) = slot {
                        arr.push(value);
                    }
                }
            },
            Some(Segment::Index(index)) => {
                let slot = map
                    .entry(name.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !slot.is_array() {
                    *slot = Value::Array(Vec::new());
                }
                let Value::Array(arr) = slot else {
                    return;
                };
                // Grow to cover the index, filling skipped slots with the
                // element default.
                while arr.len() <= *index {
                    arr.push(default_for_field(spec));
                }
                if rest.len() == 1 {
                    arr[*index] = value;
                } else if let FieldType::Message { type_name } = &spec.ty {
                    write_leaf(schema, type_name, &mut arr[*index], &rest[1..], mode, value);
                }
            }
            Some(Segment::Name(_)) => {}
        }
    } else {
        match rest.first() {
            None => {
                map.insert(name.clone(), value);
            }
            Some(Segment::Name(_)) => {
                if let FieldType::Message { type_name } = &spec.ty {
                    let sub = map
                        .entry(name.clone())
                        .or_insert_with(|| Value::Object(serde_json::Map::new()));
                    write_leaf(schema, type_name, sub, rest, mode, value);
                }
            }
            Some(Segment::Index(_)) => {}
        }
    }
}

/// Convenience for building a [`SubmissionMap`] in tests and examples.
pub fn submissions<const N: usize>(pairs: [(&str, &str); N]) -> SubmissionMap {
    pairs
        .into_iter()
        .map(|(id, v)| (id.to_string(), Submitted::single(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::{FieldSpec, FieldType, ScalarType, TableSchema};

    fn schema() -> TableSchema {
        TableSchema::new("Root")
            .message(
                "Root",
                vec![
                    FieldSpec::new("x", FieldType::Scalar(ScalarType::Integer)),
                    FieldSpec::new("y", FieldType::Scalar(ScalarType::Integer)),
                    FieldSpec::new("ratio", FieldType::Scalar(ScalarType::Float)),
                    FieldSpec::new("active", FieldType::Scalar(ScalarType::Boolean)),
                    FieldSpec::new("items", FieldType::Scalar(ScalarType::String))
                        .repeated()
                        .with_default(Value::String("-".into())),
                    FieldSpec::new(
                        "servers",
                        FieldType::Message {
                            type_name: "Server".into(),
                        },
                    )
                    .repeated(),
                    FieldSpec::new(
                        "tint",
                        FieldType::Message {
                            type_name: "Color".into(),
                        },
                    ),
                    FieldSpec::new(
                        "layers",
                        FieldType::Enum {
                            choices: vec!["roads".into(), "borders".into()],
                        },
                    )
                    .repeated(),
                ],
            )
            .message(
                "Server",
                vec![
                    FieldSpec::new("url", FieldType::Scalar(ScalarType::String)),
                    FieldSpec::new("port", FieldType::Scalar(ScalarType::Integer)),
                ],
            )
            .message(
                "Color",
                vec![
                    FieldSpec::new("r", FieldType::Scalar(ScalarType::Integer)),
                    FieldSpec::new("g", FieldType::Scalar(ScalarType::Integer)),
                ],
            )
            .honorary_primitive("Color")
    }

    fn run(base: Value, subs: SubmissionMap) -> (Value, Vec<FieldError>) {
        reconstruct(&Mangler::default(), &schema(), "Root", &base, &subs)
    }

    #[test]
    fn test_partial_failure_isolation() {
        let base = json!({"x": 1, "y": 2});
        let (copy, errors) = run(base, submissions([("x", "5"), ("y", "not-a-number")]));
        assert_eq!(copy["x"], json!(5));
        assert_eq!(copy["y"], json!(2));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].id, "y");
        assert_eq!(errors[0].kind, FieldErrorKind::InvalidValue);
    }

    #[test]
    fn test_unknown_field_no_mutation() {
        let base = json!({"x": 1});
        let (copy, errors) = run(base.clone(), submissions([("nope:0:deep", "v")]));
        assert_eq!(copy, base);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, FieldErrorKind::UnknownField);
    }

    #[test]
    fn test_base_untouched() {
        let base = json!({"x": 1});
        let (copy, errors) = run(base.clone(), submissions([("x", "9")]));
        assert!(errors.is_empty());
        assert_eq!(copy["x"], json!(9));
        assert_eq!(base["x"], json!(1));
    }

    #[test]
    fn test_list_growth_fills_defaults() {
        let base = json!({"items": ["first"]});
        let (copy, errors) = run(base, submissions([("items:3", "v")]));
        assert!(errors.is_empty());
        assert_eq!(copy["items"], json!(["first", "-", "-", "v"]));
    }

    #[test]
    fn test_nested_list_element_write() {
        let base = json!({});
        let (copy, errors) = run(
            base,
            submissions([("servers:1:url", "http://b"), ("servers:0:port", "80")]),
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(copy["servers"][0]["port"], json!(80));
        assert_eq!(copy["servers"][1]["url"], json!("http://b"));
    }

    #[test]
    fn test_append_via_bare_repeated_id() {
        let base = json!({"items": ["a"]});
        let (copy, errors) = run(base, submissions([("items", "b")]));
        assert!(errors.is_empty());
        assert_eq!(copy["items"], json!(["a", "b"]));
    }

    #[test]
    fn test_append_message_element_is_default() {
        let base = json!({"servers": [{"url": "http://a"}]});
        let (copy, errors) = run(base, submissions([("servers", "")]));
        assert!(errors.is_empty());
        assert_eq!(copy["servers"], json!([{"url": "http://a"}, {}]));
    }

    #[test]
    fn test_honorary_primitive_round_trip() {
        let base = json!({});
        let (copy, errors) = run(base, submissions([("tint", r#"{"r":7,"g":8}"#)]));
        assert!(errors.is_empty());
        assert_eq!(copy["tint"], json!({"r": 7, "g": 8}));
    }

    #[test]
    fn test_honorary_primitive_parse_failure() {
        let base = json!({"tint": {"r": 1}});
        let (copy, errors) = run(base.clone(), submissions([("tint", "not json")]));
        assert_eq!(copy, base);
        assert_eq!(errors[0].kind, FieldErrorKind::InvalidValue);
    }

    #[test]
    fn test_honorary_primitive_has_no_sub_ids() {
        let base = json!({});
        let (_, errors) = run(base, submissions([("tint:r", "3")]));
        assert_eq!(errors[0].kind, FieldErrorKind::UnknownField);
    }

    #[test]
    fn test_repeated_enum_from_joined_string() {
        let base = json!({"layers": ["roads"]});
        let (copy, errors) = run(base, submissions([("layers", "roads,borders")]));
        assert!(errors.is_empty());
        assert_eq!(copy["layers"], json!(["roads", "borders"]));
    }

    #[test]
    fn test_repeated_enum_from_many() {
        let subs = vec![(
            "layers".to_string(),
            Submitted::Many(vec!["borders".into(), "roads".into()]),
        )];
        let (copy, errors) = reconstruct(&Mangler::default(), &schema(), "Root", &json!({}), &subs);
        assert!(errors.is_empty());
        assert_eq!(copy["layers"], json!(["borders", "roads"]));
    }

    #[test]
    fn test_repeated_enum_rejects_non_member() {
        let base = json!({"layers": []});
        let (copy, errors) = run(base.clone(), submissions([("layers", "roads,rivers")]));
        assert_eq!(copy, base);
        assert_eq!(errors[0].kind, FieldErrorKind::InvalidValue);
    }

    #[test]
    fn test_float_and_boolean_coercion() {
        let base = json!({});
        let (copy, errors) = run(base, submissions([("ratio", "0.5"), ("active", "on")]));
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(copy["ratio"], json!(0.5));
        assert_eq!(copy["active"], json!(true));

        let (_, errors) = run(json!({}), submissions([("active", "maybe")]));
        assert_eq!(errors[0].kind, FieldErrorKind::InvalidValue);
        let (_, errors) = run(json!({}), submissions([("ratio", "NaN")]));
        assert_eq!(errors[0].kind, FieldErrorKind::InvalidValue);
    }

    #[test]
    fn test_list_index_ceiling() {
        let base = json!({"items": ["a"]});
        let (copy, errors) = run(base.clone(), submissions([("items:4000000000", "v")]));
        assert_eq!(copy, base);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, FieldErrorKind::InvalidValue);
    }

    #[test]
    fn test_empty_scalar_resets_to_default() {
        let base = json!({"x": 12});
        let (copy, errors) = run(base, submissions([("x", "")]));
        assert!(errors.is_empty());
        assert_eq!(copy["x"], json!(0));
    }

    #[test]
    fn test_errors_accumulate_in_order() {
        let base = json!({});
        let (_, errors) = run(
            base,
            submissions([("bogus", "1"), ("x", "nope"), ("y", "3")]),
        );
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].id, "bogus");
        assert_eq!(errors[0].kind, FieldErrorKind::UnknownField);
        assert_eq!(errors[1].id, "x");
        assert_eq!(errors[1].kind, FieldErrorKind::InvalidValue);
    }
}
