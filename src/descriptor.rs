//! Resolved field metadata bound to a query-time alias.

use std::fmt;

use crate::field::AccessorId;
use crate::schema::{FieldInfo, TemporalClass};

/// A field descriptor. Plain value: every builder works on its own copy, so
/// assigning an alias never leaks into the registry or another builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Entity type this descriptor is bound to.
    pub owner: String,
    pub method: String,
    pub field_name: String,
    pub field_type: String,
    pub generic_type: Option<String>,
    pub temporal: Option<TemporalClass>,
    alias: Option<String>,
}

impl FieldDescriptor {
    pub(crate) fn from_info(id: &AccessorId, info: FieldInfo) -> Self {
        Self {
            owner: info.declared_in,
            method: id.method.to_string(),
            field_name: info.field_name,
            field_type: info.field_type,
            generic_type: info.generic_type,
            temporal: info.temporal,
            alias: None,
        }
    }

    /// Rebind this descriptor to `entity_type`, taking the specialized
    /// metadata when there is one.
    pub(crate) fn specialized(&self, entity_type: &str, info: Option<FieldInfo>) -> Self {
        let mut out = self.clone();
        out.owner = entity_type.to_string();
        if let Some(info) = info {
            out.field_type = info.field_type;
            out.generic_type = info.generic_type;
            out.temporal = info.temporal;
        }
        out
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn has_no_alias(&self) -> bool {
        self.alias.is_none()
    }

    pub fn set_alias(&mut self, alias: impl Into<String>) {
        self.alias = Some(alias.into());
    }

    /// `alias.field`, or the bare field name when unaliased.
    pub fn path(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{}.{}", alias, self.field_name),
            None => self.field_name.clone(),
        }
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}
