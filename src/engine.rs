//! The form-mapping engine.
//!
//! An [`Engine`] bundles the per-instance configuration state (the mangling
//! marker) and exposes the two halves of the edit cycle: [`Engine::classify`]
//! turns a configuration object into an ordered list of widget descriptors,
//! and [`Engine::reconstruct`] applies a flat submission back onto a copy of
//! the object. Engines are cheap, hold no shared mutable state, and are safe
//! to use from any number of threads.

use serde_json::Value;
use thiserror::Error;

use crate::path::{FieldPath, Mangler, PathError};
use crate::rebuild::{self, FieldError, SubmissionMap};
use crate::schema::{SchemaError, SchemaProvider};
use crate::widget::{self, WidgetDescriptor};

/// Fail-fast errors from classification.
///
/// These indicate a schema or template bug (an unvalidated schema, a field
/// name violating the separator contract), never bad user input; per-field
/// submission problems are reported as [`FieldError`]s instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Stateless mapping engine, parameterized by its marker character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engine {
    mangler: Mangler,
}

impl Default for Engine {
    fn default() -> Self {
        Engine {
            mangler: Mangler::default(),
        }
    }
}

impl Engine {
    /// An engine using `marker` to join path segments. Schemas must be
    /// validated against the same marker before use.
    pub fn new(marker: char) -> Self {
        Engine {
            mangler: Mangler::new(marker),
        }
    }

    pub fn mangler(&self) -> &Mangler {
        &self.mangler
    }

    /// Produces one widget descriptor per editable leaf of `obj`, in
    /// schema declaration order (ascending index order within repeated
    /// fields). Pure read; descriptors are produced fresh on every call
    /// and the output is identical for an unmodified object.
    pub fn classify(
        &self,
        schema: &dyn SchemaProvider,
        obj: &Value,
    ) -> Result<Vec<WidgetDescriptor>, EngineError> {
        let mut out = Vec::new();
        widget::classify_message(
            &self.mangler,
            schema,
            schema.root_type(),
            obj,
            &FieldPath::root(),
            &mut out,
        )?;
        Ok(out)
    }

    /// Applies a flat submission to a private copy of `base`.
    ///
    /// Returns the mutated copy plus all per-field errors, in submission
    /// order; `base` itself is never touched, so the caller decides whether
    /// partial success is acceptable before committing.
    pub fn reconstruct(
        &self,
        schema: &dyn SchemaProvider,
        base: &Value,
        submissions: &SubmissionMap,
    ) -> (Value, Vec<FieldError>) {
        rebuild::reconstruct(&self.mangler, schema, schema.root_type(), base, submissions)
    }
}
