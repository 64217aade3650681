//! Aggregates: projections, ordering and the HAVING builder.

use std::fmt;

use super::{Query, QueryKind, SortOrder};
use crate::descriptor::FieldDescriptor;
use crate::field::{Accessor, Entity};
use crate::value::Value;

/// Aggregate function tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Avg,
    Sum,
    Max,
    Min,
    Count,
    CountDistinct,
    /// Largest value of a comparable (non-numeric) field; renders as `MAX`.
    Greatest,
    /// Smallest value of a comparable (non-numeric) field; renders as `MIN`.
    Least,
}

impl AggregateFunc {
    fn wrap(self, path: &str) -> String {
        match self {
            AggregateFunc::Avg => format!("AVG({})", path),
            AggregateFunc::Sum => format!("SUM({})", path),
            AggregateFunc::Max | AggregateFunc::Greatest => format!("MAX({})", path),
            AggregateFunc::Min | AggregateFunc::Least => format!("MIN({})", path),
            AggregateFunc::Count => format!("COUNT({})", path),
            AggregateFunc::CountDistinct => format!("COUNT(DISTINCT {})", path),
        }
    }

    /// Result is a number whatever the field type.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            AggregateFunc::Avg
                | AggregateFunc::Sum
                | AggregateFunc::Count
                | AggregateFunc::CountDistinct
        )
    }
}

/// An aggregate over a field token, not yet resolved.
#[derive(Debug, Clone, Copy)]
pub struct Aggregate<A> {
    pub func: AggregateFunc,
    pub field: A,
}

pub fn avg<A: Accessor>(field: A) -> Aggregate<A> {
    Aggregate { func: AggregateFunc::Avg, field }
}

pub fn sum<A: Accessor>(field: A) -> Aggregate<A> {
    Aggregate { func: AggregateFunc::Sum, field }
}

pub fn max<A: Accessor>(field: A) -> Aggregate<A> {
    Aggregate { func: AggregateFunc::Max, field }
}

pub fn min<A: Accessor>(field: A) -> Aggregate<A> {
    Aggregate { func: AggregateFunc::Min, field }
}

pub fn count<A: Accessor>(field: A) -> Aggregate<A> {
    Aggregate { func: AggregateFunc::Count, field }
}

pub fn count_distinct<A: Accessor>(field: A) -> Aggregate<A> {
    Aggregate { func: AggregateFunc::CountDistinct, field }
}

pub fn greatest<A: Accessor>(field: A) -> Aggregate<A> {
    Aggregate { func: AggregateFunc::Greatest, field }
}

pub fn least<A: Accessor>(field: A) -> Aggregate<A> {
    Aggregate { func: AggregateFunc::Least, field }
}

/// Resolved aggregate: a field descriptor plus its function tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateDescriptor {
    pub func: AggregateFunc,
    pub field: FieldDescriptor,
}

impl AggregateDescriptor {
    /// Descriptor to bind comparison values against. Numeric aggregates
    /// drop the field's temporal class.
    fn binding_field(&self) -> FieldDescriptor {
        let mut field = self.field.clone();
        if self.func.is_numeric() {
            field.temporal = None;
        }
        field
    }
}

impl fmt::Display for AggregateDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.func.wrap(&self.field.path()))
    }
}

impl<'r, E: Entity> Query<'r, E> {
    pub(crate) fn aggregate<A: Accessor>(
        &mut self,
        agg: &Aggregate<A>,
    ) -> Option<AggregateDescriptor> {
        self.field(&agg.field).map(|field| AggregateDescriptor {
            func: agg.func,
            field,
        })
    }

    /// Select an aggregate column (SELECT only).
    pub fn project_aggregate<A: Accessor>(&mut self, agg: Aggregate<A>) -> &mut Self {
        if !self.require(QueryKind::Select, "project_aggregate") {
            return self;
        }
        if let Some(agg) = self.aggregate(&agg) {
            self.clauses.projection.push(agg.to_string());
        }
        self
    }

    pub fn order_by_aggregate<A: Accessor>(
        &mut self,
        agg: Aggregate<A>,
        order: SortOrder,
    ) -> &mut Self {
        if let Some(agg) = self.aggregate(&agg) {
            self.clauses
                .order
                .push(format!("{} {}", agg, order.keyword()));
        }
        self
    }

    /// Add HAVING conditions through a [`Having`] builder.
    ///
    /// ```rust,ignore
    /// q.group_by(Person::CITY).having(|h| {
    ///     h.gt(avg(Person::AGE), 30).or().lt(count(Person::ID), 5);
    /// });
    /// ```
    pub fn having<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut Having<'_, 'r, E>),
    {
        if !self.require(QueryKind::Select, "having") {
            return self;
        }
        let mut having = Having { query: &mut *self };
        f(&mut having);
        self
    }
}

/// Condition builder over aggregates, writing to the HAVING region with the
/// same connective and bracket rules as WHERE.
pub struct Having<'q, 'r, E> {
    query: &'q mut Query<'r, E>,
}

impl<'q, 'r, E: Entity> Having<'q, 'r, E> {
    fn compare<A: Accessor>(&mut self, agg: Aggregate<A>, op: &str, value: Value) -> &mut Self {
        let Some(agg) = self.query.aggregate(&agg) else {
            return self;
        };
        if let Some(name) = self.query.bind(&agg.binding_field(), value) {
            self.query
                .clauses
                .having
                .push(&format!("{} {} :{}", agg, op, name));
        }
        self
    }

    pub fn eq<A: Accessor, V: Into<Value>>(&mut self, agg: Aggregate<A>, value: V) -> &mut Self {
        self.compare(agg, "=", value.into())
    }

    pub fn ne<A: Accessor, V: Into<Value>>(&mut self, agg: Aggregate<A>, value: V) -> &mut Self {
        self.compare(agg, "<>", value.into())
    }

    pub fn gt<A: Accessor, V: Into<Value>>(&mut self, agg: Aggregate<A>, value: V) -> &mut Self {
        self.compare(agg, ">", value.into())
    }

    pub fn ge<A: Accessor, V: Into<Value>>(&mut self, agg: Aggregate<A>, value: V) -> &mut Self {
        self.compare(agg, ">=", value.into())
    }

    pub fn lt<A: Accessor, V: Into<Value>>(&mut self, agg: Aggregate<A>, value: V) -> &mut Self {
        self.compare(agg, "<", value.into())
    }

    pub fn le<A: Accessor, V: Into<Value>>(&mut self, agg: Aggregate<A>, value: V) -> &mut Self {
        self.compare(agg, "<=", value.into())
    }

    pub fn between<A: Accessor, V: Into<Value>>(
        &mut self,
        agg: Aggregate<A>,
        low: V,
        high: V,
    ) -> &mut Self {
        let Some(agg) = self.query.aggregate(&agg) else {
            return self;
        };
        match self
            .query
            .binder
            .bind_pair(&agg.binding_field(), low.into(), high.into())
        {
            Ok((lo, hi)) => self
                .query
                .clauses
                .having
                .push(&format!("{} BETWEEN :{} AND :{}", agg, lo, hi)),
            Err(err) => self.query.fail(err),
        }
        self
    }

    pub fn and(&mut self) -> &mut Self {
        self.query.clauses.having.and();
        self
    }

    pub fn or(&mut self) -> &mut Self {
        self.query.clauses.having.or();
        self
    }

    pub fn not(&mut self) -> &mut Self {
        self.query.clauses.having.not();
        self
    }

    pub fn brackets<F: FnOnce(&mut Self)>(&mut self, f: F) -> &mut Self {
        self.query.clauses.having.open();
        f(self);
        self.query.clauses.having.close();
        self
    }
}
