//! # formtree
//!
//! Schema-driven form identifier mapping and widget classification for
//! nested configuration editing.
//!
//! Given a schema-typed configuration tree, formtree derives a stable,
//! collision-free string identifier for every editable leaf and list
//! element, classifies each field by widget kind, and rebuilds the tree
//! from the flat (identifier, value) pairs a web form submits back. A UI
//! can edit an arbitrarily nested configuration object without any
//! per-field code.
//!
//! ## Features
//!
//! - Bidirectional field-path <-> identifier mangling with a single
//!   reserved marker character (no escaping machinery)
//! - Widget classification: text inputs, enum selectors, checkbox groups
//!   for repeated enums, per-element widgets and append controls for lists
//! - Tree reconstruction with per-field error accumulation; one bad value
//!   never blocks the rest of a submission
//! - Honorary primitives: nested types edited as one opaque value
//! - Multi-format session layer: TOML and JSON configuration files, with
//!   automatic backup before saving changes
//!
//! ## Quick Start
//!
//! ```rust
//! use formtree::{Engine, FieldSpec, FieldType, ScalarType, TableSchema};
//! use formtree::rebuild::submissions;
//! use serde_json::json;
//!
//! let schema = TableSchema::new("Config").message(
//!     "Config",
//!     vec![
//!         FieldSpec::new("title", FieldType::Scalar(ScalarType::String)),
//!         FieldSpec::new("port", FieldType::Scalar(ScalarType::Integer)),
//!     ],
//! );
//! let engine = Engine::default();
//! schema.validate(engine.mangler()).unwrap();
//!
//! // One descriptor per editable leaf, for the rendering layer.
//! let obj = json!({"title": "demo", "port": 80});
//! let widgets = engine.classify(&schema, &obj).unwrap();
//! assert_eq!(widgets.len(), 2);
//!
//! // Apply a form submission back onto a copy of the object.
//! let (copy, errors) = engine.reconstruct(&schema, &obj, &submissions([("port", "8080")]));
//! assert!(errors.is_empty());
//! assert_eq!(copy["port"], json!(8080));
//! ```
//!
//! ## Modules
//!
//! - [`path`] - Field paths and identifier mangling
//! - [`schema`] - Schema tables, validation, and the provider interface
//! - [`widget`] - Widget classification
//! - [`rebuild`] - Tree reconstruction from submitted values
//! - [`engine`] - The engine tying both directions together
//! - [`session`] - File-backed editing sessions

/// The engine tying classification and reconstruction together.
pub mod engine;

/// Field paths and identifier mangling.
pub mod path;

/// Tree reconstruction from submitted form values.
pub mod rebuild;

/// Schema tables, validation, and the provider interface.
pub mod schema;

/// File-backed editing sessions.
pub mod session;

/// Widget classification.
pub mod widget;

pub use engine::{Engine, EngineError};
pub use path::{DEFAULT_MARKER, FieldPath, Mangler, PathError, Segment};
pub use rebuild::{FieldError, FieldErrorKind, SubmissionMap, Submitted};
pub use schema::{
    FieldSpec, FieldType, ScalarType, SchemaError, SchemaProvider, TableSchema,
};
pub use session::EditSession;
pub use widget::{Widget, WidgetDescriptor};

pub use serde_json::Value;
