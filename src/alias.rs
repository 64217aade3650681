//! Alias allocation.
//!
//! The root entity of a query gets the bare base alias (`c`). Every other
//! entity type takes `base + n` on first reference, with `n` drawn from a
//! counter shared by the whole query tree.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::descriptor::FieldDescriptor;

/// Base alias plus optional counter; renders as their concatenation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AliasTuple {
    pub base: String,
    pub counter: Option<usize>,
}

impl AliasTuple {
    pub fn root(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            counter: None,
        }
    }
}

impl fmt::Display for AliasTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.counter {
            Some(n) => write!(f, "{}{}", self.base, n),
            None => write!(f, "{}", self.base),
        }
    }
}

/// Per-builder alias scope.
#[derive(Debug, Clone)]
pub struct AliasAllocator {
    base: String,
    counter: Rc<Cell<usize>>,
    assigned: HashMap<String, String>,
}

impl AliasAllocator {
    /// Scope of a root query over `entity`.
    pub fn new(base: impl Into<String>, entity: &str) -> Self {
        let base = base.into();
        let mut assigned = HashMap::new();
        assigned.insert(entity.to_string(), base.clone());
        Self {
            base,
            counter: Rc::new(Cell::new(0)),
            assigned,
        }
    }

    /// Fresh alias for a nested builder.
    pub fn next_sub_alias(&self) -> AliasTuple {
        let n = self.counter.get();
        self.counter.set(n + 1);
        AliasTuple {
            base: self.base.clone(),
            counter: Some(n),
        }
    }

    /// Scope of a nested builder over `entity`. Outer aliases stay visible
    /// (correlation); `entity` itself is rebound to `alias`.
    pub fn nested(&self, entity: &str, alias: &AliasTuple) -> Self {
        let mut assigned = self.assigned.clone();
        assigned.insert(entity.to_string(), alias.to_string());
        Self {
            base: self.base.clone(),
            counter: Rc::clone(&self.counter),
            assigned,
        }
    }

    /// Alias of `entity`, allocated on first reference.
    pub fn alias_for(&mut self, entity: &str) -> String {
        if let Some(alias) = self.assigned.get(entity) {
            return alias.clone();
        }
        let alias = self.next_sub_alias().to_string();
        tracing::debug!("Allocated alias {} for {}", alias, entity);
        self.assigned.insert(entity.to_string(), alias.clone());
        alias
    }

    /// Make `alias` the alias of `entity` unless it already has one.
    pub fn bind_if_absent(&mut self, entity: &str, alias: &str) {
        self.assigned
            .entry(entity.to_string())
            .or_insert_with(|| alias.to_string());
    }

    pub fn assign_alias_if_absent(&mut self, descriptor: &mut FieldDescriptor) {
        if descriptor.has_no_alias() {
            let alias = self.alias_for(&descriptor.owner);
            descriptor.set_alias(alias);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_alias() {
        let mut aliases = AliasAllocator::new("c", "Person");
        assert_eq!(aliases.alias_for("Person"), "c");
        assert_eq!(aliases.alias_for("Person"), "c");
        assert_eq!(aliases.alias_for("Order"), "c0");
        assert_eq!(aliases.alias_for("Order"), "c0");
    }

    #[test]
    fn test_nested_scopes_never_collide() {
        let root = AliasAllocator::new("c", "Person");
        let first = root.next_sub_alias();
        let mut sub = root.nested("Order", &first);
        let second = sub.next_sub_alias();
        assert_eq!(first.to_string(), "c0");
        assert_eq!(second.to_string(), "c1");
        assert_eq!(sub.alias_for("Order"), "c0");
        assert_eq!(sub.alias_for("Person"), "c");
        assert_eq!(root.next_sub_alias().to_string(), "c2");
    }

    #[test]
    fn test_bind_if_absent_keeps_existing() {
        let mut aliases = AliasAllocator::new("c", "Person");
        aliases.bind_if_absent("Person", "c4");
        aliases.bind_if_absent("Order", "c0");
        assert_eq!(aliases.alias_for("Person"), "c");
        assert_eq!(aliases.alias_for("Order"), "c0");
    }

    #[test]
    fn test_alias_tuple_display() {
        assert_eq!(AliasTuple::root("p").to_string(), "p");
        let t = AliasTuple {
            base: "p".into(),
            counter: Some(3),
        };
        assert_eq!(t.to_string(), "p3");
    }
}
