//! Query text rendering.
//!
//! Rebuilds the statement from a builder's clause buffers on every call, so
//! rendering never consumes or mutates builder state.

use crate::error::{CriteriaError, CriteriaResult};
use crate::field::Entity;
use crate::query::{Query, QueryKind};

/// Which statement to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Render {
    /// The statement itself.
    Full,
    /// Scalar row count of the statement.
    Count,
    /// Body of a sub-query: no ORDER BY, no suffix.
    Nested,
}

impl<'r, E: Entity> Query<'r, E> {
    /// Render the statement text.
    pub fn sql(&self) -> CriteriaResult<String> {
        self.render(Render::Full)
    }

    /// Render `SELECT COUNT(c) ...` over the same FROM, WHERE, GROUP BY and
    /// HAVING. ORDER BY and the suffix are left out. A DISTINCT query with one
    /// projected field counts `DISTINCT` values of that column; with several
    /// it counts distinct root entities.
    pub fn count_sql(&self) -> CriteriaResult<String> {
        self.render(Render::Count)
    }

    pub fn render(&self, mode: Render) -> CriteriaResult<String> {
        self.check()?;
        if self.kind == QueryKind::Update && self.clauses.set.is_empty() {
            return Err(CriteriaError::config("UPDATE without SET"));
        }
        let sql = match self.kind {
            QueryKind::Select => self.to_select_sql(mode),
            QueryKind::Update if mode == Render::Full => self.to_update_sql(),
            QueryKind::Delete if mode == Render::Full => self.to_delete_sql(),
            kind => {
                return Err(CriteriaError::config(format!(
                    "cannot render a {:?} query as {:?}",
                    kind, mode
                )));
            }
        };
        tracing::debug!("Rendered {:?}: {}", mode, sql);
        Ok(sql)
    }

    fn to_select_sql(&self, mode: Render) -> String {
        let alias = self.alias.to_string();
        let distinct = if self.distinct { "DISTINCT " } else { "" };

        let mut sql = String::from("SELECT ");
        if mode == Render::Count {
            // a single distinct field counts its values, anything else counts roots
            let projected = self.clauses.projection.to_string();
            let target = if self.distinct
                && self.clauses.projection.len() == 1
                && !projected.contains('(')
            {
                projected
            } else {
                alias.clone()
            };
            sql.push_str(&format!("COUNT({}{})", distinct, target));
        } else {
            sql.push_str(distinct);
            if self.clauses.projection.is_empty() {
                sql.push_str(&alias);
            } else {
                sql.push_str(&self.clauses.projection.to_string());
            }
        }

        // FROM + joins
        sql.push_str(&format!(" FROM {} AS {}", self.entity, alias));
        for join in &self.clauses.joins {
            sql.push_str(&join.render(mode == Render::Count));
        }

        self.push_where(&mut sql);

        if !self.clauses.group.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.clauses.group.to_string());
        }

        if !self.clauses.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(self.clauses.having.rendered());
        }

        if mode == Render::Full {
            self.push_tail(&mut sql);
        }

        sql
    }

    fn to_update_sql(&self) -> String {
        let mut sql = format!(
            "UPDATE {} AS {} SET {}",
            self.entity, self.alias, self.clauses.set
        );

        self.push_where(&mut sql);
        self.push_tail(&mut sql);
        sql
    }

    fn to_delete_sql(&self) -> String {
        let mut sql = format!("DELETE FROM {} AS {}", self.entity, self.alias);
        self.push_where(&mut sql);
        self.push_tail(&mut sql);
        sql
    }

    fn push_where(&self, sql: &mut String) {
        if !self.clauses.filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(self.clauses.filter.rendered());
        }
    }

    /// ORDER BY and the raw suffix.
    fn push_tail(&self, sql: &mut String) {
        if !self.clauses.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.clauses.order.to_string());
        }
        if !self.clauses.suffix.is_empty() {
            sql.push(' ');
            sql.push_str(&self.clauses.suffix);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::CriteriaError;
    use crate::query::Query;
    use crate::query::tests::{Person, registry};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simple_select() {
        let reg = registry();
        let q = Query::<Person>::select(&reg);
        assert_eq!(q.sql().unwrap(), "SELECT c FROM Person AS c");
        assert_eq!(q.count_sql().unwrap(), "SELECT COUNT(c) FROM Person AS c");
    }

    #[test]
    fn test_select_distinct_projection() {
        let reg = registry();
        let mut q = Query::<Person>::select(&reg);
        q.distinct().project(Person::CITY).asc(Person::CITY);
        assert_eq!(
            q.sql().unwrap(),
            "SELECT DISTINCT c.city FROM Person AS c ORDER BY c.city ASC"
        );
        assert_eq!(q.count_sql().unwrap(), "SELECT COUNT(DISTINCT c.city) FROM Person AS c");

        let mut q = Query::<Person>::select(&reg);
        q.distinct().project(Person::CITY).project(Person::NAME);
        assert_eq!(q.count_sql().unwrap(), "SELECT COUNT(DISTINCT c) FROM Person AS c");

        let mut q = Query::<Person>::select(&reg);
        q.distinct().project_aggregate(crate::query::aggregate::max(Person::AGE));
        assert_eq!(q.count_sql().unwrap(), "SELECT COUNT(DISTINCT c) FROM Person AS c");
    }

    #[test]
    fn test_count_keeps_group_and_having_drops_order_and_suffix() {
        let reg = registry();
        let mut q = Query::<Person>::select(&reg);
        q.gt(Person::AGE, 18)
            .group_by(Person::CITY)
            .having(|h| {
                h.gt(crate::query::aggregate::count(Person::ID), 3);
            })
            .desc(Person::CITY)
            .suffix("FOR UPDATE");
        assert_eq!(
            q.sql().unwrap(),
            "SELECT c FROM Person AS c WHERE c.age > :age0 GROUP BY c.city \
             HAVING COUNT(c.id) > :id1 ORDER BY c.city DESC FOR UPDATE"
        );
        assert_eq!(
            q.count_sql().unwrap(),
            "SELECT COUNT(c) FROM Person AS c WHERE c.age > :age0 GROUP BY c.city \
             HAVING COUNT(c.id) > :id1"
        );
    }

    #[test]
    fn test_update() {
        let reg = registry();
        let mut q = Query::<Person>::update(&reg);
        q.set(Person::CITY, "Oslo")
            .set_null(Person::BIRTH_DATE)
            .eq(Person::NAME, "Ann");
        assert_eq!(
            q.sql().unwrap(),
            "UPDATE Person AS c SET c.city = :city0, c.birthDate = NULL WHERE c.name = :name1"
        );
        assert!(q.count_sql().is_err());
    }

    #[test]
    fn test_update_without_set_is_rejected() {
        let reg = registry();
        let mut q = Query::<Person>::update(&reg);
        q.eq(Person::NAME, "Ann");
        let err = q.sql().unwrap_err();
        assert!(matches!(err, CriteriaError::Configuration(_)));
        assert!(err.to_string().contains("UPDATE without SET"));
    }

    #[test]
    fn test_delete() {
        let reg = registry();
        let mut q = Query::<Person>::delete(&reg);
        q.lt(Person::AGE, 0);
        assert_eq!(q.sql().unwrap(), "DELETE FROM Person AS c WHERE c.age < :age0");
        assert!(q.count_sql().unwrap_err().to_string().contains("Count"));
    }

    #[test]
    fn test_render_is_idempotent() {
        let reg = registry();
        let mut q = Query::<Person>::select(&reg);
        q.eq(Person::NAME, "Ann").or();
        let first = q.sql().unwrap();
        assert_eq!(first, q.sql().unwrap());
        assert_eq!(q.count_sql().unwrap(), q.count_sql().unwrap());
        assert_eq!(first, "SELECT c FROM Person AS c WHERE c.name = :name0");
    }
}
