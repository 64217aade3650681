//! The query assembly engine.
//!
//! A [`Query`] is a stateful builder: every call resolves its field tokens
//! through the [`FieldRegistry`], binds values to generated parameter names
//! and appends text to one of the clause buffers. Rendering
//! ([`Query::sql`], [`Query::count_sql`]) rebuilds the statement from those
//! buffers on every call.
//!
//! ```rust,ignore
//! let mut q = Query::<Person>::select(&registry);
//! q.eq(Person::NAME, "Ann")
//!     .brackets(|q| {
//!         q.gt(Person::AGE, 30).or().is_null(Person::AGE);
//!     })
//!     .desc(Person::BIRTH_DATE);
//! let sql = q.sql()?;
//! ```

pub mod aggregate;
pub mod compose;

use std::marker::PhantomData;

use serde::Serialize;

use crate::alias::{AliasAllocator, AliasTuple};
use crate::clause::ClauseBuffers;
use crate::descriptor::FieldDescriptor;
use crate::error::{CriteriaError, CriteriaResult};
use crate::field::{Accessor, Entity};
use crate::params::{ParameterBinder, ParameterSet};
use crate::registry::{FieldRegistry, LocalCache};
use crate::schema::FieldDef;
use crate::value::Value;

pub use aggregate::{Aggregate, AggregateDescriptor, AggregateFunc, Having};
pub use compose::{Cmp, Quantifier, Relation};

/// Alias of the root entity unless configured otherwise.
pub const DEFAULT_ALIAS: &str = "c";

/// Statement type of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Update,
    Delete,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Shape of one result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultShape {
    /// The root entity.
    Entity,
    /// A single projected column.
    Scalar,
    /// Several projected columns.
    Tuple(usize),
}

/// Criteria builder over entity `E`.
pub struct Query<'r, E> {
    pub(crate) registry: &'r FieldRegistry,
    pub(crate) kind: QueryKind,
    pub(crate) entity: String,
    pub(crate) alias: AliasTuple,
    pub(crate) aliases: AliasAllocator,
    pub(crate) binder: ParameterBinder,
    pub(crate) local: LocalCache,
    pub(crate) clauses: ClauseBuffers,
    pub(crate) distinct: bool,
    pub(crate) first_result: Option<u64>,
    pub(crate) max_results: Option<u64>,
    pub(crate) error: Option<CriteriaError>,
    _entity: PhantomData<fn() -> E>,
}

impl<'r, E: Entity> Query<'r, E> {
    /// `SELECT c FROM E AS c`
    pub fn select(registry: &'r FieldRegistry) -> Self {
        Self::with_alias(registry, QueryKind::Select, DEFAULT_ALIAS)
    }

    /// `UPDATE E AS c SET ...`
    pub fn update(registry: &'r FieldRegistry) -> Self {
        Self::with_alias(registry, QueryKind::Update, DEFAULT_ALIAS)
    }

    /// `DELETE FROM E AS c`
    pub fn delete(registry: &'r FieldRegistry) -> Self {
        Self::with_alias(registry, QueryKind::Delete, DEFAULT_ALIAS)
    }

    /// Query with a custom root alias.
    pub fn with_alias(registry: &'r FieldRegistry, kind: QueryKind, base: &str) -> Self {
        Self::root(registry, kind, base, E::ENTITY_NAME)
    }

    fn root(registry: &'r FieldRegistry, kind: QueryKind, base: &str, entity: &str) -> Self {
        let mut query = Self::from_parts(
            registry,
            kind,
            entity,
            AliasTuple::root(base),
            AliasAllocator::new(base, entity),
            ParameterBinder::new(),
        );
        if !is_identifier(base) {
            query.fail(CriteriaError::config(format!("invalid alias '{}'", base)));
        } else if !is_identifier(entity) {
            query.fail(CriteriaError::config(format!("invalid entity name '{}'", entity)));
        }
        query
    }

    pub(crate) fn from_parts(
        registry: &'r FieldRegistry,
        kind: QueryKind,
        entity: &str,
        alias: AliasTuple,
        aliases: AliasAllocator,
        binder: ParameterBinder,
    ) -> Self {
        Self {
            registry,
            kind,
            entity: entity.to_string(),
            alias,
            aliases,
            binder,
            local: LocalCache::default(),
            clauses: ClauseBuffers::default(),
            distinct: false,
            first_result: None,
            max_results: None,
            error: None,
            _entity: PhantomData,
        }
    }

    /// Name of the root entity.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Alias of the root entity in this builder.
    pub fn alias(&self) -> String {
        self.alias.to_string()
    }

    /// Parameters bound so far, sub-queries and joins included.
    pub fn parameters(&self) -> ParameterSet {
        self.binder.parameters()
    }

    /// Row shape the statement produces.
    pub fn shape(&self) -> ResultShape {
        match self.clauses.projection.len() {
            0 => ResultShape::Entity,
            1 => ResultShape::Scalar,
            n => ResultShape::Tuple(n),
        }
    }

    /// First failure recorded by a fluent call, if any.
    pub fn check(&self) -> CriteriaResult<()> {
        match &self.error {
            Some(err) => Err(err.replay()),
            None => Ok(()),
        }
    }

    pub(crate) fn fail(&mut self, err: CriteriaError) {
        if self.error.is_none() {
            tracing::error!("Query on {} failed: {}", self.entity, err);
            self.error = Some(err);
        }
    }

    fn require(&mut self, kind: QueryKind, op: &str) -> bool {
        if self.kind == kind {
            return true;
        }
        self.fail(CriteriaError::config(format!(
            "{}() is not allowed on a {:?} query",
            op, self.kind
        )));
        false
    }

    /// Resolve an accessor to an aliased descriptor, recording failures.
    pub(crate) fn field<A: Accessor>(&mut self, accessor: &A) -> Option<FieldDescriptor> {
        if self.error.is_some() {
            return None;
        }
        match self.registry.get_or_init(accessor, &mut self.local) {
            Ok(mut descriptor) => {
                self.aliases.assign_alias_if_absent(&mut descriptor);
                Some(descriptor)
            }
            Err(err) => {
                self.fail(err);
                None
            }
        }
    }

    pub(crate) fn bind(&mut self, field: &FieldDescriptor, value: Value) -> Option<String> {
        match self.binder.bind(field, value) {
            Ok(name) => Some(name),
            Err(err) => {
                self.fail(err);
                None
            }
        }
    }

    fn compare<A: Accessor>(&mut self, accessor: A, op: &str, value: Value) -> &mut Self {
        let Some(field) = self.field(&accessor) else {
            return self;
        };
        if let Some(name) = self.bind(&field, value) {
            self.clauses
                .filter
                .push(&format!("{} {} :{}", field.path(), op, name));
        }
        self
    }

    fn unary<A: Accessor>(&mut self, accessor: A, suffix: &str) -> &mut Self {
        if let Some(field) = self.field(&accessor) {
            self.clauses
                .filter
                .push(&format!("{} {}", field.path(), suffix));
        }
        self
    }

    fn compare_fields<A: Accessor, B: Accessor>(
        &mut self,
        left: A,
        op: &str,
        right: B,
    ) -> &mut Self {
        let Some(left) = self.field(&left) else {
            return self;
        };
        if let Some(right) = self.field(&right) {
            self.clauses
                .filter
                .push(&format!("{} {} {}", left.path(), op, right.path()));
        }
        self
    }

    // ---------------------------------------------------------------------
    // Relational operators
    // ---------------------------------------------------------------------

    /// `field = :p`, or `field IS NULL` for a null value.
    pub fn eq<A: Accessor, V: Into<Value>>(&mut self, field: A, value: V) -> &mut Self {
        match value.into() {
            Value::Null => self.is_null(field),
            value => self.compare(field, "=", value),
        }
    }

    /// `field <> :p`, or `field IS NOT NULL` for a null value.
    pub fn ne<A: Accessor, V: Into<Value>>(&mut self, field: A, value: V) -> &mut Self {
        match value.into() {
            Value::Null => self.is_not_null(field),
            value => self.compare(field, "<>", value),
        }
    }

    pub fn gt<A: Accessor, V: Into<Value>>(&mut self, field: A, value: V) -> &mut Self {
        self.compare(field, ">", value.into())
    }

    pub fn ge<A: Accessor, V: Into<Value>>(&mut self, field: A, value: V) -> &mut Self {
        self.compare(field, ">=", value.into())
    }

    pub fn lt<A: Accessor, V: Into<Value>>(&mut self, field: A, value: V) -> &mut Self {
        self.compare(field, "<", value.into())
    }

    pub fn le<A: Accessor, V: Into<Value>>(&mut self, field: A, value: V) -> &mut Self {
        self.compare(field, "<=", value.into())
    }

    /// Temporal `<`.
    pub fn before<A: Accessor, V: Into<Value>>(&mut self, field: A, value: V) -> &mut Self {
        self.lt(field, value)
    }

    /// Temporal `>`.
    pub fn after<A: Accessor, V: Into<Value>>(&mut self, field: A, value: V) -> &mut Self {
        self.gt(field, value)
    }

    pub fn between<A: Accessor, V: Into<Value>>(&mut self, field: A, low: V, high: V) -> &mut Self {
        self.range(field, "BETWEEN", low.into(), high.into())
    }

    pub fn not_between<A: Accessor, V: Into<Value>>(
        &mut self,
        field: A,
        low: V,
        high: V,
    ) -> &mut Self {
        self.range(field, "NOT BETWEEN", low.into(), high.into())
    }

    fn range<A: Accessor>(&mut self, accessor: A, op: &str, low: Value, high: Value) -> &mut Self {
        let Some(field) = self.field(&accessor) else {
            return self;
        };
        match self.binder.bind_pair(&field, low, high) {
            Ok((lo, hi)) => self
                .clauses
                .filter
                .push(&format!("{} {} :{} AND :{}", field.path(), op, lo, hi)),
            Err(err) => self.fail(err),
        }
        self
    }

    /// `field IN (:p)` with the whole collection bound to one parameter. An
    /// empty collection matches nothing.
    pub fn in_<A, I, V>(&mut self, field: A, values: I) -> &mut Self
    where
        A: Accessor,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.membership(field, "IN", values.into_iter().map(Into::into).collect())
    }

    /// `field NOT IN (:p)`. An empty collection matches everything.
    pub fn not_in<A, I, V>(&mut self, field: A, values: I) -> &mut Self
    where
        A: Accessor,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.membership(field, "NOT IN", values.into_iter().map(Into::into).collect())
    }

    fn membership<A: Accessor>(&mut self, accessor: A, op: &str, values: Vec<Value>) -> &mut Self {
        let Some(field) = self.field(&accessor) else {
            return self;
        };
        if values.is_empty() {
            let constant = if op == "IN" { "1 = 0" } else { "1 = 1" };
            self.clauses.filter.push(constant);
            return self;
        }
        if let Some(name) = self.bind(&field, Value::List(values)) {
            self.clauses
                .filter
                .push(&format!("{} {} (:{})", field.path(), op, name));
        }
        self
    }

    pub fn is_null<A: Accessor>(&mut self, field: A) -> &mut Self {
        self.unary(field, "IS NULL")
    }

    pub fn is_not_null<A: Accessor>(&mut self, field: A) -> &mut Self {
        self.unary(field, "IS NOT NULL")
    }

    /// Collection field has no elements.
    pub fn is_empty<A: Accessor>(&mut self, field: A) -> &mut Self {
        self.unary(field, "IS EMPTY")
    }

    pub fn is_not_empty<A: Accessor>(&mut self, field: A) -> &mut Self {
        self.unary(field, "IS NOT EMPTY")
    }

    /// `:p MEMBER OF field`
    pub fn member_of<A: Accessor, V: Into<Value>>(&mut self, field: A, value: V) -> &mut Self {
        let Some(field) = self.field(&field) else {
            return self;
        };
        if let Some(name) = self.bind(&field, value.into()) {
            self.clauses
                .filter
                .push(&format!(":{} MEMBER OF {}", name, field.path()));
        }
        self
    }

    // ---------------------------------------------------------------------
    // Text operators
    // ---------------------------------------------------------------------

    pub fn like<A: Accessor>(&mut self, field: A, pattern: impl Into<String>) -> &mut Self {
        self.compare(field, "LIKE", Value::String(pattern.into()))
    }

    pub fn not_like<A: Accessor>(&mut self, field: A, pattern: impl Into<String>) -> &mut Self {
        self.compare(field, "NOT LIKE", Value::String(pattern.into()))
    }

    pub fn starts_with<A: Accessor>(&mut self, field: A, prefix: &str) -> &mut Self {
        self.like(field, format!("{}%", prefix))
    }

    pub fn ends_with<A: Accessor>(&mut self, field: A, suffix: &str) -> &mut Self {
        self.like(field, format!("%{}", suffix))
    }

    pub fn contains<A: Accessor>(&mut self, field: A, part: &str) -> &mut Self {
        self.like(field, format!("%{}%", part))
    }

    /// `LOWER(field) = :p` with the value lower-cased.
    pub fn lower_eq<A: Accessor>(&mut self, field: A, value: &str) -> &mut Self {
        let Some(field) = self.field(&field) else {
            return self;
        };
        if let Some(name) = self.bind(&field, Value::String(value.to_lowercase())) {
            self.clauses
                .filter
                .push(&format!("LOWER({}) = :{}", field.path(), name));
        }
        self
    }

    // ---------------------------------------------------------------------
    // Field-to-field comparisons
    // ---------------------------------------------------------------------

    pub fn eq_field<A: Accessor, B: Accessor>(&mut self, left: A, right: B) -> &mut Self {
        self.compare_fields(left, "=", right)
    }

    pub fn ne_field<A: Accessor, B: Accessor>(&mut self, left: A, right: B) -> &mut Self {
        self.compare_fields(left, "<>", right)
    }

    pub fn gt_field<A: Accessor, B: Accessor>(&mut self, left: A, right: B) -> &mut Self {
        self.compare_fields(left, ">", right)
    }

    pub fn lt_field<A: Accessor, B: Accessor>(&mut self, left: A, right: B) -> &mut Self {
        self.compare_fields(left, "<", right)
    }

    // ---------------------------------------------------------------------
    // Connectives
    // ---------------------------------------------------------------------

    /// Explicit `AND`; redundant since conditions are AND-ed by default.
    pub fn and(&mut self) -> &mut Self {
        self.clauses.filter.and();
        self
    }

    pub fn or(&mut self) -> &mut Self {
        self.clauses.filter.or();
        self
    }

    /// Negate the next condition or bracket.
    pub fn not(&mut self) -> &mut Self {
        self.clauses.filter.not();
        self
    }

    /// Group the conditions added by `f` in parentheses.
    pub fn brackets<F: FnOnce(&mut Self)>(&mut self, f: F) -> &mut Self {
        self.brackets_opt(Some(f))
    }

    /// Like [`Query::brackets`]; `None` adds nothing.
    pub fn brackets_opt<F: FnOnce(&mut Self)>(&mut self, f: Option<F>) -> &mut Self {
        let Some(f) = f else {
            return self;
        };
        self.clauses.filter.open();
        f(self);
        self.clauses.filter.close();
        self
    }

    // ---------------------------------------------------------------------
    // SET, ORDER BY, GROUP BY, projections
    // ---------------------------------------------------------------------

    /// `SET field = :p` (UPDATE only).
    pub fn set<A: Accessor, V: Into<Value>>(&mut self, field: A, value: V) -> &mut Self {
        if !self.require(QueryKind::Update, "set") {
            return self;
        }
        let Some(field) = self.field(&field) else {
            return self;
        };
        match value.into() {
            Value::Null => self.clauses.set.push(format!("{} = NULL", field.path())),
            value => {
                if let Some(name) = self.bind(&field, value) {
                    self.clauses.set.push(format!("{} = :{}", field.path(), name));
                }
            }
        }
        self
    }

    /// `SET field = NULL` (UPDATE only).
    pub fn set_null<A: Accessor>(&mut self, field: A) -> &mut Self {
        self.set(field, Value::Null)
    }

    pub fn order_by<A: Accessor>(&mut self, field: A, order: SortOrder) -> &mut Self {
        if let Some(field) = self.field(&field) {
            self.clauses
                .order
                .push(format!("{} {}", field.path(), order.keyword()));
        }
        self
    }

    pub fn asc<A: Accessor>(&mut self, field: A) -> &mut Self {
        self.order_by(field, SortOrder::Asc)
    }

    pub fn desc<A: Accessor>(&mut self, field: A) -> &mut Self {
        self.order_by(field, SortOrder::Desc)
    }

    pub fn group_by<A: Accessor>(&mut self, field: A) -> &mut Self {
        if let Some(field) = self.field(&field) {
            self.clauses.group.push(field.path());
        }
        self
    }

    /// Select `field` instead of the whole entity (SELECT only).
    pub fn project<A: Accessor>(&mut self, field: A) -> &mut Self {
        if !self.require(QueryKind::Select, "project") {
            return self;
        }
        if let Some(field) = self.field(&field) {
            self.clauses.projection.push(field.path());
        }
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.distinct = true;
        self
    }

    // ---------------------------------------------------------------------
    // Paging and trailing text
    // ---------------------------------------------------------------------

    pub fn first_result(&mut self, offset: u64) -> &mut Self {
        self.first_result = Some(offset);
        self
    }

    pub fn max_results(&mut self, limit: u64) -> &mut Self {
        self.max_results = Some(limit);
        self
    }

    /// Raw trailing text, e.g. a vendor hint. Left out of the count query.
    pub fn suffix(&mut self, text: &str) -> &mut Self {
        if !self.clauses.suffix.is_empty() {
            self.clauses.suffix.push(' ');
        }
        self.clauses.suffix.push_str(text.trim());
        self
    }
}

/// Stand-in entity for queries whose root is only known by name at runtime.
pub struct Dynamic;

impl Entity for Dynamic {
    const ENTITY_NAME: &'static str = "Dynamic";

    fn fields() -> Vec<FieldDef> {
        Vec::new()
    }
}

impl<'r> Query<'r, Dynamic> {
    /// Query over an entity named at runtime; pair it with
    /// [`DynField`](crate::field::DynField) accessors.
    pub fn dynamic(registry: &'r FieldRegistry, kind: QueryKind, base: &str, entity: &str) -> Self {
        Self::root(registry, kind, base, entity)
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
