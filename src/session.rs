//! File-backed editing session.
//!
//! Owns a configuration value loaded from a JSON or TOML file together with
//! its validated schema, and drives the classify/submit cycle for a caller
//! that renders the widgets. The engine itself never does I/O; everything
//! filesystem-shaped lives here.

use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use anyhow::{Context, bail};
use log::debug;
use serde_json::Value;

use crate::{
    engine::{Engine, EngineError},
    rebuild::{FieldError, SubmissionMap},
    schema::TableSchema,
    widget::WidgetDescriptor,
};

const DEFAULT_CONFIG_PATH: &str = ".config.toml";

/// Derive a default schema path from a config path:
/// `config.toml` -> `config-schema.json`.
pub fn default_schema_path(config: &Path) -> PathBuf {
    let binding = config
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name_split = binding.split('.').collect::<Vec<_>>();
    if name_split.len() > 1 {
        name_split.pop();
    }

    let name = format!("{}-schema.json", name_split.join("."));

    if let Some(parent) = config.parent() {
        parent.join(name)
    } else {
        PathBuf::from(name)
    }
}

/// An open configuration file plus its schema and pending edits.
#[derive(Debug, Clone)]
pub struct EditSession {
    engine: Engine,
    schema: TableSchema,
    /// Current configuration value; mutated only by [`EditSession::apply`].
    pub value: Value,
    /// Whether the value differs from what is on disk.
    pub needs_save: bool,
    /// Path of the configuration file.
    pub config: PathBuf,
}

impl EditSession {
    /// Opens a config file with its schema.
    ///
    /// When `schema` is not given it is derived from the config path. The
    /// config file may be absent, in which case editing starts from an
    /// empty object.
    pub fn open(
        config: Option<impl AsRef<Path>>,
        schema: Option<impl AsRef<Path>>,
    ) -> anyhow::Result<Self> {
        let config_path = config
            .map(|c| c.as_ref().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let schema_path = match schema {
            Some(s) => s.as_ref().to_path_buf(),
            None => default_schema_path(&config_path),
        };
        if !schema_path.exists() {
            bail!("Schema file does not exist: {}", schema_path.display());
        }
        let schema_content = fs::read_to_string(&schema_path)
            .with_context(|| format!("Failed to read {}", schema_path.display()))?;
        Self::open_with_schema(config_path, &schema_content)
    }

    /// Opens a config file with an already-loaded schema document.
    pub fn open_with_schema(
        config: impl AsRef<Path>,
        schema_doc: &str,
    ) -> anyhow::Result<Self> {
        let engine = Engine::default();
        let schema = TableSchema::load(schema_doc, engine.mangler())?;

        let config_path = config.as_ref().to_path_buf();
        let value = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            parse_config(&content, &config_path)?
        } else {
            Value::Object(serde_json::Map::new())
        };

        Ok(EditSession {
            engine,
            schema,
            value,
            needs_save: false,
            config: config_path,
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Widget descriptors for the current value, for the rendering layer.
    pub fn widgets(&self) -> Result<Vec<WidgetDescriptor>, EngineError> {
        self.engine.classify(&self.schema, &self.value)
    }

    /// Applies a submission and adopts the reconstructed copy.
    ///
    /// Per-field errors are returned; the fields they name were skipped
    /// while every valid submission was applied. Callers wanting
    /// all-or-nothing semantics can check the error list and drop the
    /// session instead of saving.
    pub fn apply(&mut self, submissions: &SubmissionMap) -> Vec<FieldError> {
        let (copy, errors) = self.engine.reconstruct(&self.schema, &self.value, submissions);
        if copy != self.value {
            debug!("session: {} edits applied", submissions.len());
            self.value = copy;
            self.needs_save = true;
        }
        errors
    }

    /// Persists pending changes, keeping a timestamped backup of the
    /// previous file. Does nothing when there is nothing to save.
    pub fn save(&mut self) -> anyhow::Result<()> {
        if !self.needs_save {
            return Ok(());
        }
        let ext = self
            .config
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        let s = match ext {
            "toml" | "tml" => toml::to_string_pretty(&self.value)?,
            "json" => serde_json::to_string_pretty(&self.value)?,
            _ => {
                bail!("Unsupported config file extension: {}", ext);
            }
        };

        if self.config.exists() {
            let bk = format!(
                "bk-{}.{ext}",
                SystemTime::now()
                    .duration_since(SystemTime::UNIX_EPOCH)?
                    .as_secs()
            );
            let backup_path = self.config.with_extension(bk);
            fs::copy(&self.config, &backup_path)
                .with_context(|| format!("Failed to back up {}", self.config.display()))?;
        }
        fs::write(&self.config, s)
            .with_context(|| format!("Failed to write {}", self.config.display()))?;
        self.needs_save = false;
        Ok(())
    }
}

fn parse_config(content: &str, path: &Path) -> anyhow::Result<Value> {
    if content.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let value = match ext {
        "json" => serde_json::from_str(content)?,
        "toml" | "tml" => {
            let v: toml::Value = toml::from_str(content)?;
            serde_json::to_value(v)?
        }
        _ => {
            bail!("Unsupported config file extension: {ext:?}");
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::rebuild::submissions;

    const SCHEMA_DOC: &str = r#"{
        "root": "Root",
        "messages": {
            "Root": [
                {"name": "title", "type": "string"},
                {"name": "count", "type": "integer"}
            ]
        }
    }"#;

    #[test]
    fn test_default_schema_path() {
        let schema_path = default_schema_path(Path::new("config.toml"));
        assert_eq!(schema_path, PathBuf::from("config-schema.json"));
    }

    #[test]
    fn test_missing_config_starts_empty() {
        let session =
            EditSession::open_with_schema("does-not-exist.toml", SCHEMA_DOC).unwrap();
        assert_eq!(session.value, json!({}));
        assert!(!session.needs_save);
    }

    #[test]
    fn test_apply_marks_dirty_only_on_change() {
        let mut session =
            EditSession::open_with_schema("does-not-exist.toml", SCHEMA_DOC).unwrap();

        let errors = session.apply(&submissions([("count", "bad")]));
        assert_eq!(errors.len(), 1);
        assert!(!session.needs_save);

        let errors = session.apply(&submissions([("title", "hello")]));
        assert!(errors.is_empty());
        assert!(session.needs_save);
        assert_eq!(session.value, json!({"title": "hello"}));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = std::env::temp_dir().join("formtree-session-test");
        fs::create_dir_all(&dir).unwrap();
        let config = dir.join("app.json");
        let _ = fs::remove_file(&config);

        let mut session = EditSession::open_with_schema(&config, SCHEMA_DOC).unwrap();
        session.apply(&submissions([("title", "hi"), ("count", "3")]));
        session.save().unwrap();
        assert!(!session.needs_save);

        let reopened = EditSession::open_with_schema(&config, SCHEMA_DOC).unwrap();
        assert_eq!(reopened.value, json!({"count": 3, "title": "hi"}));
    }
}
