//! Sub-queries and joins.
//!
//! Both spin a nested [`Query`] over another entity. The nested builder
//! shares the registry, the parameter set and the alias counter of the whole
//! tree, and sees the outer aliases so it can correlate against them.
//! A sub-query renders into its own bracketed text; a join shares the parent's
//! FROM clause instead.

use super::{Query, QueryKind};
use crate::clause::{JoinClause, JoinKind};
use crate::field::{Accessor, Entity, Field};
use crate::transpiler::Render;

/// Comparison operator of a quantified sub-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Cmp {
    pub fn symbol(self) -> &'static str {
        match self {
            Cmp::Eq => "=",
            Cmp::Ne => "<>",
            Cmp::Gt => ">",
            Cmp::Ge => ">=",
            Cmp::Lt => "<",
            Cmp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    All,
    Any,
    Some,
}

impl Quantifier {
    pub fn keyword(self) -> &'static str {
        match self {
            Quantifier::All => "ALL",
            Quantifier::Any => "ANY",
            Quantifier::Some => "SOME",
        }
    }
}

/// Field type of a relation: names the entity a join lands on.
pub trait Relation {
    type Target: Entity;
}

impl<J: Entity> Relation for Vec<J> {
    type Target = J;
}

impl<J: Entity> Relation for Option<J> {
    type Target = J;
}

/// Absent join body.
fn no_body<'r, J: Entity>() -> Option<fn(&mut Query<'r, J>)> {
    None
}

impl<'r, E: Entity> Query<'r, E> {
    /// Fresh builder over `J` bound to the next alias of the tree.
    pub fn nested<J: Entity>(&self) -> Query<'r, J> {
        let alias = self.aliases.next_sub_alias();
        let aliases = self.aliases.nested(J::ENTITY_NAME, &alias);
        Query::from_parts(
            self.registry,
            QueryKind::Select,
            J::ENTITY_NAME,
            alias,
            aliases,
            self.binder.clone(),
        )
    }

    /// Build and render a nested SELECT over `J`. `None` when the callback is
    /// absent or something failed (the failure is recorded on `self`).
    fn subquery<J: Entity>(&mut self, f: Option<impl FnOnce(&mut Query<'r, J>)>) -> Option<String> {
        let f = f?;
        if self.error.is_some() {
            return None;
        }
        let mut sub = self.nested::<J>();
        f(&mut sub);
        match sub.render(Render::Nested) {
            Ok(text) => Some(text),
            Err(err) => {
                self.fail(err);
                None
            }
        }
    }

    /// `EXISTS (SELECT c0 FROM J AS c0 ...)`
    ///
    /// ```rust,ignore
    /// q.exists::<Order>(|s| {
    ///     s.eq_field(Order::CUSTOMER_ID, Person::ID).gt(Order::TOTAL, 100);
    /// });
    /// ```
    pub fn exists<J: Entity>(&mut self, f: impl FnOnce(&mut Query<'r, J>)) -> &mut Self {
        self.exists_opt::<J>(Some(f))
    }

    /// Like [`Query::exists`]; `None` adds nothing.
    pub fn exists_opt<J: Entity>(
        &mut self,
        f: Option<impl FnOnce(&mut Query<'r, J>)>,
    ) -> &mut Self {
        if let Some(sub) = self.subquery::<J>(f) {
            self.clauses.filter.push(&format!("EXISTS ({})", sub));
        }
        self
    }

    pub fn not_exists<J: Entity>(&mut self, f: impl FnOnce(&mut Query<'r, J>)) -> &mut Self {
        if let Some(sub) = self.subquery::<J>(Some(f)) {
            self.clauses.filter.push(&format!("NOT EXISTS ({})", sub));
        }
        self
    }

    fn splice<A: Accessor, J: Entity>(
        &mut self,
        field: A,
        op: &str,
        f: impl FnOnce(&mut Query<'r, J>),
    ) -> &mut Self {
        let Some(field) = self.field(&field) else {
            return self;
        };
        if let Some(sub) = self.subquery::<J>(Some(f)) {
            self.clauses
                .filter
                .push(&format!("{} {} ({})", field.path(), op, sub));
        }
        self
    }

    /// `field IN (SELECT ...)`; the sub-query should project one column.
    pub fn in_sub<A: Accessor, J: Entity>(
        &mut self,
        field: A,
        f: impl FnOnce(&mut Query<'r, J>),
    ) -> &mut Self {
        self.splice(field, "IN", f)
    }

    pub fn not_in_sub<A: Accessor, J: Entity>(
        &mut self,
        field: A,
        f: impl FnOnce(&mut Query<'r, J>),
    ) -> &mut Self {
        self.splice(field, "NOT IN", f)
    }

    /// `field > ALL (SELECT ...)` and friends.
    pub fn compare_sub<A: Accessor, J: Entity>(
        &mut self,
        field: A,
        cmp: Cmp,
        quantifier: Quantifier,
        f: impl FnOnce(&mut Query<'r, J>),
    ) -> &mut Self {
        let op = format!("{} {}", cmp.symbol(), quantifier.keyword());
        self.splice(field, &op, f)
    }

    // ---------------------------------------------------------------------
    // Joins
    // ---------------------------------------------------------------------

    /// Append a join on `relation` and hand back the builder of the joined
    /// entity with the index of its join clause.
    fn start_join<X, R: Relation>(
        &mut self,
        relation: Field<X, R>,
        kind: JoinKind,
    ) -> Option<(Query<'r, R::Target>, usize)> {
        if self.kind != QueryKind::Select {
            self.fail(crate::error::CriteriaError::config(format!(
                "joins are not allowed on a {:?} query",
                self.kind
            )));
            return None;
        }
        let path = self.field(&relation)?.path();
        let child = self.nested::<R::Target>();
        let alias = child.alias();
        self.aliases
            .bind_if_absent(<R::Target as Entity>::ENTITY_NAME, &alias);
        self.clauses.joins.push(JoinClause {
            kind,
            path,
            alias,
            on: None,
        });
        Some((child, self.clauses.joins.len() - 1))
    }

    /// Fold a join builder back into `self`. Its conditions become the ON
    /// clause of join `slot`, or land in the shared WHERE when `on` is false.
    fn finish_join<J: Entity>(&mut self, mut child: Query<'r, J>, slot: usize, on: bool) {
        if let Some(err) = child.error.take() {
            self.fail(err);
            return;
        }
        let conditions = child.clauses.filter.rendered().trim().to_string();
        if !conditions.is_empty() {
            if on {
                self.clauses.joins[slot].on = Some(conditions);
            } else if child.clauses.filter.has_top_level_or() {
                self.clauses.filter.push(&format!("({})", conditions));
            } else {
                self.clauses.filter.push(&conditions);
            }
        }
        self.clauses.joins.append(&mut child.clauses.joins);
        self.clauses.projection.append(child.clauses.projection);
        self.clauses.group.append(child.clauses.group);
        self.clauses.order.append(child.clauses.order);
        let having = child.clauses.having.rendered().trim().to_string();
        if child.clauses.having.has_top_level_or() {
            self.clauses.having.push(&format!("({})", having));
        } else if !having.is_empty() {
            self.clauses.having.push(&having);
        }
    }

    fn join_parts<X, R: Relation>(
        &mut self,
        relation: Field<X, R>,
        kind: JoinKind,
        f: Option<impl FnOnce(&mut Query<'r, R::Target>)>,
        on: bool,
    ) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        let Some((mut child, slot)) = self.start_join(relation, kind) else {
            return self;
        };
        if let Some(f) = f {
            f(&mut child);
        }
        self.finish_join(child, slot, on);
        self
    }

    /// `JOIN c.relation AS cN`
    pub fn join<X, R: Relation>(&mut self, relation: Field<X, R>) -> &mut Self {
        self.join_parts(relation, JoinKind::Inner, no_body(), false)
    }

    pub fn left_join<X, R: Relation>(&mut self, relation: Field<X, R>) -> &mut Self {
        self.join_parts(relation, JoinKind::Left, no_body(), false)
    }

    /// `JOIN FETCH`: load the relation along with the root entity.
    pub fn fetch_join<X, R: Relation>(&mut self, relation: Field<X, R>) -> &mut Self {
        self.join_parts(relation, JoinKind::Fetch, no_body(), false)
    }

    pub fn left_fetch_join<X, R: Relation>(&mut self, relation: Field<X, R>) -> &mut Self {
        self.join_parts(relation, JoinKind::LeftFetch, no_body(), false)
    }

    /// Join and add conditions on the joined entity to the WHERE clause.
    ///
    /// ```rust,ignore
    /// q.join_with(Person::ORDERS, JoinKind::Inner, |o| {
    ///     o.gt(Order::TOTAL, 100);
    /// });
    /// ```
    pub fn join_with<X, R: Relation>(
        &mut self,
        relation: Field<X, R>,
        kind: JoinKind,
        body: impl FnOnce(&mut Query<'r, R::Target>),
    ) -> &mut Self {
        self.join_parts(relation, kind, Some(body), false)
    }

    /// `JOIN c.relation AS cN ON (...)`
    pub fn join_on<X, R: Relation>(
        &mut self,
        relation: Field<X, R>,
        on: impl FnOnce(&mut Query<'r, R::Target>),
    ) -> &mut Self {
        self.join_parts(relation, JoinKind::Inner, Some(on), true)
    }

    pub fn left_join_on<X, R: Relation>(
        &mut self,
        relation: Field<X, R>,
        on: impl FnOnce(&mut Query<'r, R::Target>),
    ) -> &mut Self {
        self.join_parts(relation, JoinKind::Left, Some(on), true)
    }

    /// Like [`Query::join_on`] with an optional ON callback; `None` joins
    /// without an ON clause.
    pub fn join_on_opt<X, R: Relation>(
        &mut self,
        relation: Field<X, R>,
        kind: JoinKind,
        on: Option<impl FnOnce(&mut Query<'r, R::Target>)>,
    ) -> &mut Self {
        self.join_parts(relation, kind, on, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::tests::{Order, Person, registry};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exists_correlated() {
        let reg = registry();
        let mut q = Query::<Person>::select(&reg);
        q.eq(Person::NAME, "Ann").exists::<Order>(|s| {
            s.eq_field(Order::CUSTOMER_ID, Person::ID).gt(Order::TOTAL, 100);
        });
        assert_eq!(
            q.sql().unwrap(),
            "SELECT c FROM Person AS c WHERE c.name = :name0 AND EXISTS \
             (SELECT c0 FROM Order AS c0 WHERE c0.customerId = c.id AND c0.total > :total1)"
        );
        assert_eq!(q.parameters().len(), 2);
    }

    #[test]
    fn test_not_exists_and_in_sub() {
        let reg = registry();
        let mut q = Query::<Person>::select(&reg);
        q.not_exists::<Order>(|s| {
            s.eq_field(Order::CUSTOMER_ID, Person::ID);
        })
        .in_sub::<_, Order>(Person::ID, |s| {
            s.project(Order::CUSTOMER_ID).ge(Order::TOTAL, 10);
        });
        assert_eq!(
            q.sql().unwrap(),
            "SELECT c FROM Person AS c WHERE NOT EXISTS \
             (SELECT c0 FROM Order AS c0 WHERE c0.customerId = c.id) AND c.id IN \
             (SELECT c1.customerId FROM Order AS c1 WHERE c1.total >= :total0)"
        );
    }

    #[test]
    fn test_compare_sub_quantifier() {
        let reg = registry();
        let mut q = Query::<Person>::select(&reg);
        q.compare_sub::<_, Order>(Person::AGE, Cmp::Gt, Quantifier::All, |s| {
            s.project(Order::TOTAL);
        })
        .or()
        .not_in_sub::<_, Order>(Person::ID, |s| {
            s.project(Order::CUSTOMER_ID);
        });
        assert_eq!(
            q.sql().unwrap(),
            "SELECT c FROM Person AS c WHERE c.age > ALL (SELECT c0.total FROM Order AS c0) \
             OR c.id NOT IN (SELECT c1.customerId FROM Order AS c1)"
        );
    }

    #[test]
    fn test_nested_subqueries_share_counters() {
        let reg = registry();
        let mut q = Query::<Person>::select(&reg);
        q.eq(Person::CITY, "Oslo").exists::<Order>(|s| {
            s.eq(Order::TOTAL, 5).exists::<Person>(|inner| {
                inner.eq(Person::CITY, "Rome");
            });
        });
        let sql = q.sql().unwrap();
        assert_eq!(
            sql,
            "SELECT c FROM Person AS c WHERE c.city = :city0 AND EXISTS \
             (SELECT c0 FROM Order AS c0 WHERE c0.total = :total1 AND EXISTS \
             (SELECT c1 FROM Person AS c1 WHERE c1.city = :city2))"
        );
    }

    #[test]
    fn test_exists_opt_none_is_noop() {
        let reg = registry();
        let mut q = Query::<Person>::select(&reg);
        q.eq(Person::NAME, "Ann")
            .exists_opt(None::<fn(&mut Query<'_, Order>)>);
        assert_eq!(q.sql().unwrap(), "SELECT c FROM Person AS c WHERE c.name = :name0");
    }

    #[test]
    fn test_join_with_body_and_on() {
        let reg = registry();
        let mut q = Query::<Person>::select(&reg);
        q.left_join_on(Person::ORDERS, |o| {
            o.gt(Order::TOTAL, 10);
        })
        .join_with(Person::ORDERS, JoinKind::Inner, |o| {
            o.lt(Order::TOTAL, 5).or().is_null(Order::TOTAL);
        })
        .eq(Person::NAME, "Ann");
        assert_eq!(
            q.sql().unwrap(),
            "SELECT c FROM Person AS c LEFT JOIN c.orders AS c0 ON (c0.total > :total0) \
             JOIN c.orders AS c1 WHERE (c1.total < :total1 OR c1.total IS NULL) AND c.name = :name2"
        );
    }

    #[test]
    fn test_join_registers_alias_in_parent() {
        let reg = registry();
        let mut q = Query::<Person>::select(&reg);
        q.join(Person::ORDERS).ge(Order::TOTAL, 1);
        assert_eq!(
            q.sql().unwrap(),
            "SELECT c FROM Person AS c JOIN c.orders AS c0 WHERE c0.total >= :total0"
        );
    }

    #[test]
    fn test_fetch_join_degrades_in_count() {
        let reg = registry();
        let mut q = Query::<Person>::select(&reg);
        q.fetch_join(Person::ORDERS).asc(Person::NAME);
        assert_eq!(
            q.sql().unwrap(),
            "SELECT c FROM Person AS c JOIN FETCH c.orders AS c0 ORDER BY c.name ASC"
        );
        assert_eq!(
            q.count_sql().unwrap(),
            "SELECT COUNT(c) FROM Person AS c JOIN c.orders AS c0"
        );
    }

    #[test]
    fn test_join_on_update_is_rejected() {
        let reg = registry();
        let mut q = Query::<Person>::update(&reg);
        q.join(Person::ORDERS).set(Person::NAME, "Bo");
        let err = q.sql().unwrap_err();
        assert!(err.to_string().contains("joins are not allowed"));
    }
}
