//! Execution boundary.
//!
//! The crate never talks to a data store. A rendered [`Statement`] is handed
//! to an [`Executor`] supplied by the application; whatever the executor
//! reports as a failure comes back unchanged as [`CriteriaError::Execution`].

use serde::Serialize;

use crate::error::{CriteriaError, CriteriaResult};
use crate::field::Entity;
use crate::params::ParameterSet;
use crate::query::{Query, QueryKind, ResultShape};

/// Fully assembled statement: text, bindings, paging and row shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub text: String,
    pub parameters: ParameterSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_result: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u64>,
    pub shape: ResultShape,
}

/// Runs statements against a real data store.
///
/// # Example
///
/// ```rust,ignore
/// struct Pg(postgres::Client);
///
/// impl Executor for Pg {
///     type Row = postgres::Row;
///     fn fetch(&self, stmt: &Statement) -> anyhow::Result<Vec<Self::Row>> { ... }
///     fn execute(&self, stmt: &Statement) -> anyhow::Result<u64> { ... }
///     fn count(&self, stmt: &Statement) -> anyhow::Result<u64> { ... }
/// }
/// ```
pub trait Executor {
    type Row;

    /// Rows of a SELECT, honoring the statement's paging.
    fn fetch(&self, statement: &Statement) -> anyhow::Result<Vec<Self::Row>>;

    /// Run an UPDATE or DELETE and return the affected row count.
    fn execute(&self, statement: &Statement) -> anyhow::Result<u64>;

    /// Run a count statement and return its scalar.
    fn count(&self, statement: &Statement) -> anyhow::Result<u64>;
}

impl<'r, E: Entity> Query<'r, E> {
    /// Text, parameters and paging of the statement.
    pub fn statement(&self) -> CriteriaResult<Statement> {
        Ok(Statement {
            text: self.sql()?,
            parameters: self.parameters(),
            first_result: self.first_result,
            max_results: self.max_results,
            shape: self.shape(),
        })
    }

    /// The matching count statement. Paging does not apply to it.
    pub fn count_statement(&self) -> CriteriaResult<Statement> {
        Ok(Statement {
            text: self.count_sql()?,
            parameters: self.parameters(),
            first_result: None,
            max_results: None,
            shape: ResultShape::Scalar,
        })
    }

    fn expect_kind(&self, allowed: &[QueryKind], op: &str) -> CriteriaResult<()> {
        if allowed.contains(&self.kind) {
            Ok(())
        } else {
            Err(CriteriaError::config(format!(
                "{}() is not allowed on a {:?} query",
                op, self.kind
            )))
        }
    }

    /// Every matching row.
    pub fn to_list<X: Executor>(&self, executor: &X) -> CriteriaResult<Vec<X::Row>> {
        self.check()?;
        self.expect_kind(&[QueryKind::Select], "to_list")?;
        let statement = self.statement()?;
        tracing::debug!("Fetching: {}", statement.text);
        executor.fetch(&statement).map_err(CriteriaError::Execution)
    }

    /// The single matching row; any other row count is an error.
    pub fn get<X: Executor>(&self, executor: &X) -> CriteriaResult<X::Row> {
        let mut rows = self.to_list(executor)?;
        if rows.len() != 1 {
            return Err(CriteriaError::NonUniqueResult(rows.len()));
        }
        rows.pop().ok_or(CriteriaError::NonUniqueResult(0))
    }

    /// Run an UPDATE or DELETE.
    pub fn execute<X: Executor>(&self, executor: &X) -> CriteriaResult<u64> {
        self.check()?;
        self.expect_kind(&[QueryKind::Update, QueryKind::Delete], "execute")?;
        let statement = self.statement()?;
        tracing::debug!("Executing: {}", statement.text);
        let affected = executor
            .execute(&statement)
            .map_err(CriteriaError::Execution)?;
        tracing::info!("{} row(s) affected", affected);
        Ok(affected)
    }

    /// Row count of [`count_sql`](Query::count_sql), paging ignored. For a
    /// DISTINCT query over several projected columns this is the number of
    /// distinct root entities.
    pub fn count<X: Executor>(&self, executor: &X) -> CriteriaResult<u64> {
        let statement = self.count_statement()?;
        tracing::debug!("Counting: {}", statement.text);
        executor.count(&statement).map_err(CriteriaError::Execution)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::query::tests::{Person, registry};
    use pretty_assertions::assert_eq;

    /// Records every statement and answers with canned rows.
    #[derive(Default)]
    struct MockExecutor {
        rows: Vec<String>,
        seen: RefCell<Vec<Statement>>,
        fail: bool,
    }

    impl Executor for MockExecutor {
        type Row = String;

        fn fetch(&self, statement: &Statement) -> anyhow::Result<Vec<String>> {
            self.seen.borrow_mut().push(statement.clone());
            if self.fail {
                anyhow::bail!("connection reset");
            }
            Ok(self.rows.clone())
        }

        fn execute(&self, statement: &Statement) -> anyhow::Result<u64> {
            self.seen.borrow_mut().push(statement.clone());
            Ok(3)
        }

        fn count(&self, statement: &Statement) -> anyhow::Result<u64> {
            self.seen.borrow_mut().push(statement.clone());
            Ok(self.rows.len() as u64)
        }
    }

    #[test]
    fn test_to_list_passes_paging() {
        let reg = registry();
        let exec = MockExecutor {
            rows: vec!["Ann".into(), "Bo".into()],
            ..Default::default()
        };
        let mut q = Query::<Person>::select(&reg);
        q.eq(Person::CITY, "Oslo").first_result(10).max_results(5);

        assert_eq!(q.to_list(&exec).unwrap(), vec!["Ann", "Bo"]);
        let seen = exec.seen.borrow();
        assert_eq!(seen[0].text, "SELECT c FROM Person AS c WHERE c.city = :city0");
        assert_eq!(seen[0].first_result, Some(10));
        assert_eq!(seen[0].max_results, Some(5));
        assert_eq!(seen[0].shape, ResultShape::Entity);
    }

    #[test]
    fn test_get_requires_exactly_one_row() {
        let reg = registry();
        let q = Query::<Person>::select(&reg);

        let two = MockExecutor {
            rows: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        assert!(matches!(q.get(&two), Err(CriteriaError::NonUniqueResult(2))));

        let none = MockExecutor::default();
        assert!(matches!(q.get(&none), Err(CriteriaError::NonUniqueResult(0))));

        let one = MockExecutor {
            rows: vec!["a".into()],
            ..Default::default()
        };
        assert_eq!(q.get(&one).unwrap(), "a");
    }

    #[test]
    fn test_execution_error_propagates() {
        let reg = registry();
        let exec = MockExecutor {
            fail: true,
            ..Default::default()
        };
        let q = Query::<Person>::select(&reg);
        let err = q.to_list(&exec).unwrap_err();
        assert!(matches!(err, CriteriaError::Execution(_)));
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn test_count_ignores_paging() {
        let reg = registry();
        let exec = MockExecutor {
            rows: vec!["a".into()],
            ..Default::default()
        };
        let mut q = Query::<Person>::select(&reg);
        q.max_results(1).asc(Person::NAME);
        assert_eq!(q.count(&exec).unwrap(), 1);
        let seen = exec.seen.borrow();
        assert_eq!(seen[0].text, "SELECT COUNT(c) FROM Person AS c");
        assert_eq!(seen[0].max_results, None);
    }

    #[test]
    fn test_execute_only_for_bulk_statements() {
        let reg = registry();
        let exec = MockExecutor::default();

        let mut update = Query::<Person>::update(&reg);
        update.set(Person::CITY, "Rome").eq(Person::NAME, "Ann");
        assert_eq!(update.execute(&exec).unwrap(), 3);

        let select = Query::<Person>::select(&reg);
        assert!(matches!(select.execute(&exec), Err(CriteriaError::Configuration(_))));
        assert!(update.to_list(&exec).is_err());
        assert_eq!(exec.seen.borrow().len(), 1);
    }

    #[test]
    fn test_statement_json() {
        let reg = registry();
        let mut q = Query::<Person>::select(&reg);
        q.eq(Person::NAME, "Ann");
        let json = serde_json::to_string(&q.statement().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"text":"SELECT c FROM Person AS c WHERE c.name = :name0","parameters":[{"name":"name0","value":"Ann"}],"shape":"Entity"}"#
        );
    }
}
