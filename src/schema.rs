//! Schema metadata: maps an accessor `(declaring type, method)` to the
//! persisted field behind it.
//!
//! A [`Schema`] is filled either from `entity!` declarations
//! ([`Schema::register`]) or from a TOML document:
//!
//! ```toml
//! [[entity]]
//! name = "BaseEntity"
//! [[entity.field]]
//! accessor = "id"
//! type = "ID"
//! generic = "ID"
//!
//! [[entity]]
//! name = "Person"
//! parent = "BaseEntity"
//! generics = { id = "i64" }
//! [[entity.field]]
//! accessor = "birth_date"
//! name = "birthDate"
//! type = "NaiveDate"
//! temporal = "date"
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CriteriaError, CriteriaResult};
use crate::field::Entity;

/// Temporal class of a date/time field, carried with every binding on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalClass {
    Date,
    Time,
    Timestamp,
}

impl fmt::Display for TemporalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalClass::Date => write!(f, "date"),
            TemporalClass::Time => write!(f, "time"),
            TemporalClass::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// Metadata for one declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Type that actually declares the field (a parent for inherited fields).
    pub declared_in: String,
    pub field_name: String,
    pub field_type: String,
    /// Element type of collections, or the type parameter of generic fields.
    pub generic_type: Option<String>,
    pub temporal: Option<TemporalClass>,
}

/// Static field declaration emitted by `entity!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub declared_in: &'static str,
    pub method: &'static str,
    pub field_name: &'static str,
    pub field_type: &'static str,
    pub temporal: Option<TemporalClass>,
}

/// Source of field metadata consulted by the registry on a cache miss.
pub trait SchemaProvider: Send + Sync {
    /// Look up the field behind `declaring_type::method`.
    fn field_info(&self, declaring_type: &str, method: &str) -> CriteriaResult<FieldInfo>;

    /// Field metadata of an inherited field as seen from `entity_type`, when
    /// it differs from the declaration (e.g. a concrete generic parameter).
    fn specialize(
        &self,
        entity_type: &str,
        declaring_type: &str,
        method: &str,
    ) -> Option<FieldInfo> {
        let _ = (entity_type, declaring_type, method);
        None
    }
}

/// In-memory schema.
#[derive(Debug, Default, Clone)]
pub struct Schema {
    fields: HashMap<(String, String), FieldInfo>,
    parents: HashMap<String, String>,
    /// `(entity, method)` → concrete type for inherited generic fields.
    generics: HashMap<(String, String), String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every field an entity declares.
    pub fn register<E: Entity>(&mut self) -> &mut Self {
        for def in E::fields() {
            if def.declared_in != E::ENTITY_NAME {
                self.set_parent(E::ENTITY_NAME, def.declared_in);
                self.generics.insert(
                    (E::ENTITY_NAME.to_string(), def.method.to_string()),
                    def.field_type.to_string(),
                );
                let inherited = (def.declared_in.to_string(), def.method.to_string());
                if self.fields.contains_key(&inherited) {
                    continue;
                }
            }
            self.fields.insert(
                (def.declared_in.to_string(), def.method.to_string()),
                FieldInfo {
                    declared_in: def.declared_in.to_string(),
                    field_name: def.field_name.to_string(),
                    field_type: def.field_type.to_string(),
                    generic_type: None,
                    temporal: def.temporal,
                },
            );
        }
        tracing::debug!("Registered entity {}", E::ENTITY_NAME);
        self
    }

    /// Declare a field by hand.
    pub fn add_field(
        &mut self,
        entity: &str,
        method: &str,
        field_name: &str,
        field_type: &str,
        generic_type: Option<&str>,
        temporal: Option<TemporalClass>,
    ) -> &mut Self {
        self.fields.insert(
            (entity.to_string(), method.to_string()),
            FieldInfo {
                declared_in: entity.to_string(),
                field_name: field_name.to_string(),
                field_type: field_type.to_string(),
                generic_type: generic_type.map(str::to_string),
                temporal,
            },
        );
        self
    }

    /// Record that `entity` inherits the fields of `parent`.
    pub fn set_parent(&mut self, entity: &str, parent: &str) -> &mut Self {
        self.parents.insert(entity.to_string(), parent.to_string());
        self
    }

    /// Bind the concrete type of an inherited generic field for `entity`.
    pub fn set_generic(&mut self, entity: &str, method: &str, concrete: &str) -> &mut Self {
        self.generics
            .insert((entity.to_string(), method.to_string()), concrete.to_string());
        self
    }

    /// Entity names known to this schema, sorted.
    pub fn entities(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .fields
            .keys()
            .map(|(entity, _)| entity.as_str())
            .chain(self.parents.keys().map(String::as_str))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Accessor names visible on `entity`, inherited ones included, sorted.
    pub fn methods(&self, entity: &str) -> Vec<&str> {
        let mut methods = Vec::new();
        let mut current = Some(entity);
        while let Some(ty) = current {
            methods.extend(
                self.fields
                    .keys()
                    .filter(|(owner, _)| owner == ty)
                    .map(|(_, method)| method.as_str()),
            );
            current = self.parents.get(ty).map(String::as_str);
        }
        methods.sort_unstable();
        methods.dedup();
        methods
    }

    /// Parse a TOML schema document.
    pub fn from_toml_str(content: &str) -> CriteriaResult<Self> {
        let doc: SchemaDocument = toml::from_str(content)?;
        let mut schema = Schema::new();
        for entity in doc.entity {
            if let Some(parent) = &entity.parent {
                schema.set_parent(&entity.name, parent);
            }
            for (method, concrete) in &entity.generics {
                schema.set_generic(&entity.name, method, concrete);
            }
            for field in &entity.field {
                schema.add_field(
                    &entity.name,
                    &field.accessor,
                    field.name.as_deref().unwrap_or(&field.accessor),
                    &field.field_type,
                    field.generic.as_deref(),
                    field.temporal,
                );
            }
        }
        Ok(schema)
    }

    /// Load a TOML schema document from disk.
    pub fn load(path: impl AsRef<Path>) -> CriteriaResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let schema = Self::from_toml_str(&content)?;
        tracing::info!(
            "Loaded {} fields for {} entities from {}",
            schema.fields.len(),
            schema.entities().len(),
            path.display()
        );
        Ok(schema)
    }
}

impl SchemaProvider for Schema {
    fn field_info(&self, declaring_type: &str, method: &str) -> CriteriaResult<FieldInfo> {
        let mut current = Some(declaring_type);
        while let Some(ty) = current {
            if let Some(info) = self.fields.get(&(ty.to_string(), method.to_string())) {
                return Ok(info.clone());
            }
            current = self.parents.get(ty).map(String::as_str);
        }
        Err(CriteriaError::not_found(declaring_type, method))
    }

    fn specialize(
        &self,
        entity_type: &str,
        declaring_type: &str,
        method: &str,
    ) -> Option<FieldInfo> {
        let concrete = self
            .generics
            .get(&(entity_type.to_string(), method.to_string()))?;
        let mut info = self.field_info(declaring_type, method).ok()?;
        if info.generic_type.is_some() {
            info.generic_type = Some(concrete.clone());
        }
        info.field_type = concrete.clone();
        Some(info)
    }
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    #[serde(default)]
    entity: Vec<EntityDoc>,
}

#[derive(Debug, Deserialize)]
struct EntityDoc {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    generics: HashMap<String, String>,
    #[serde(default)]
    field: Vec<FieldDoc>,
}

#[derive(Debug, Deserialize)]
struct FieldDoc {
    accessor: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    generic: Option<String>,
    #[serde(default)]
    temporal: Option<TemporalClass>,
}
