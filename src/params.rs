//! Parameter bindings.
//!
//! Names are `<field name><n>` with `n` drawn from one counter shared by a
//! query and all of its sub-queries and joins, so they never repeat inside a
//! rendered statement.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;

use crate::descriptor::FieldDescriptor;
use crate::error::{CriteriaError, CriteriaResult};
use crate::schema::TemporalClass;
use crate::value::Value;

/// One named parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterBinding {
    pub name: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalClass>,
}

/// Name-keyed parameter set, kept in binding order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParameterSet(Vec<ParameterBinding>);

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a binding. Re-inserting an identical binding is a no-op;
    /// rebinding a name to another value is rejected.
    pub fn insert(&mut self, binding: ParameterBinding) -> CriteriaResult<()> {
        match self.0.iter().find(|b| b.name == binding.name) {
            Some(existing) if existing.value == binding.value => Ok(()),
            Some(existing) => Err(CriteriaError::config(format!(
                "parameter '{}' already bound to {}, refusing {}",
                existing.name, existing.value, binding.value
            ))),
            None => {
                self.0.push(binding);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterBinding> {
        self.0.iter().find(|b| b.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterBinding> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a ParameterBinding;
    type IntoIter = std::slice::Iter<'a, ParameterBinding>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Generates parameter names and records their values. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ParameterBinder {
    counter: Rc<Cell<usize>>,
    params: Rc<RefCell<ParameterSet>>,
}

impl ParameterBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` against `field` and return the generated name.
    pub fn bind(&self, field: &FieldDescriptor, value: Value) -> CriteriaResult<String> {
        // `phone` + 20 and `phone2` + 0 spell the same name; skip taken ones
        let name = loop {
            let n = self.counter.get();
            self.counter.set(n + 1);
            let name = format!("{}{}", field.field_name, n);
            if !self.params.borrow().contains(&name) {
                break name;
            }
        };
        self.bind_named(&name, value, field.temporal)?;
        Ok(name)
    }

    /// Two independent bindings for range-style operators.
    pub fn bind_pair(
        &self,
        field: &FieldDescriptor,
        low: Value,
        high: Value,
    ) -> CriteriaResult<(String, String)> {
        Ok((self.bind(field, low)?, self.bind(field, high)?))
    }

    /// Bind under a caller-chosen name.
    pub fn bind_named(
        &self,
        name: &str,
        value: Value,
        temporal: Option<TemporalClass>,
    ) -> CriteriaResult<()> {
        self.params.borrow_mut().insert(ParameterBinding {
            name: name.to_string(),
            value,
            temporal,
        })
    }

    /// Snapshot of everything bound so far.
    pub fn parameters(&self) -> ParameterSet {
        self.params.borrow().clone()
    }
}
