//! Configuration from `critq.toml`.
//!
//! ```toml
//! base_alias = "c"
//! schema = "schema.toml"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CriteriaError, CriteriaResult};
use crate::field::Entity;
use crate::query::{DEFAULT_ALIAS, Query, QueryKind, is_identifier};
use crate::registry::FieldRegistry;
use crate::schema::Schema;

const CONFIG_FILE: &str = "critq.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CriteriaConfig {
    /// Alias of every root entity.
    pub base_alias: String,
    /// TOML schema document, relative to the config file.
    pub schema: Option<PathBuf>,
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            base_alias: DEFAULT_ALIAS.to_string(),
            schema: None,
        }
    }
}

impl CriteriaConfig {
    pub fn from_toml_str(content: &str) -> CriteriaResult<Self> {
        let config: CriteriaConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file. A relative `schema` path is resolved against the
    /// file's directory.
    pub fn load(path: impl AsRef<Path>) -> CriteriaResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        if let (Some(schema), Some(dir)) = (&config.schema, path.parent()) {
            if schema.is_relative() {
                config.schema = Some(dir.join(schema));
            }
        }
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// `./critq.toml`, then `<config dir>/critq/config.toml`, else defaults.
    pub fn discover() -> CriteriaResult<Self> {
        let local = Path::new(CONFIG_FILE);
        if local.exists() {
            return Self::load(local);
        }
        if let Some(global) = dirs::config_dir().map(|d| d.join("critq").join("config.toml")) {
            if global.exists() {
                return Self::load(global);
            }
        }
        tracing::debug!("No config found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> CriteriaResult<()> {
        if !is_identifier(&self.base_alias) {
            return Err(CriteriaError::config(format!(
                "base_alias '{}' is not an identifier",
                self.base_alias
            )));
        }
        Ok(())
    }

    /// Load the configured schema document.
    pub fn load_schema(&self) -> CriteriaResult<Schema> {
        match &self.schema {
            Some(path) => Schema::load(path),
            None => Err(CriteriaError::config("no schema configured")),
        }
    }

    pub fn select<'r, E: Entity>(&self, registry: &'r FieldRegistry) -> Query<'r, E> {
        Query::with_alias(registry, QueryKind::Select, &self.base_alias)
    }

    pub fn update<'r, E: Entity>(&self, registry: &'r FieldRegistry) -> Query<'r, E> {
        Query::with_alias(registry, QueryKind::Update, &self.base_alias)
    }

    pub fn delete<'r, E: Entity>(&self, registry: &'r FieldRegistry) -> Query<'r, E> {
        Query::with_alias(registry, QueryKind::Delete, &self.base_alias)
    }
}
