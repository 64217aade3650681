//! # critq: typed criteria builder
//!
//! > **Stop writing column strings. Reference your fields.**
//!
//! Describe filters, projections and ordering on an entity with compile-time
//! field tokens; critq resolves them to persisted fields, allocates aliases,
//! binds named parameters and renders query text for an execution layer of
//! your choice.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use critq::prelude::*;
//!
//! struct Person;
//!
//! critq::entity! {
//!     Person {
//!         ID => id: i64,
//!         NAME => name: String,
//!     }
//! }
//!
//! let mut schema = Schema::new();
//! schema.register::<Person>();
//! let registry = FieldRegistry::new(schema);
//!
//! let mut q = Query::<Person>::select(&registry);
//! q.eq(Person::NAME, "Ann");
//! assert_eq!(q.sql()?, "SELECT c FROM Person AS c WHERE c.name = :name0");
//! assert_eq!(q.count_sql()?, "SELECT COUNT(c) FROM Person AS c WHERE c.name = :name0");
//! ```
//!
//! ## Layout
//!
//! | Module        | Role                                              |
//! |---------------|---------------------------------------------------|
//! | `field`       | field tokens, accessor identity, `entity!`        |
//! | `schema`      | field metadata provider                           |
//! | `registry`    | two-tier descriptor cache                         |
//! | `alias`       | alias allocation                                  |
//! | `params`      | parameter naming and bindings                     |
//! | `clause`      | clause buffers                                    |
//! | `query`       | the criteria builder, aggregates, sub-queries     |
//! | `transpiler`  | text rendering                                    |
//! | `engine`      | statements and the executor boundary              |

pub mod alias;
pub mod clause;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod field;
pub mod params;
pub mod parser;
pub mod query;
pub mod registry;
pub mod schema;
pub mod transpiler;
pub mod value;

pub mod prelude {
    pub use crate::clause::JoinKind;
    pub use crate::config::CriteriaConfig;
    pub use crate::descriptor::FieldDescriptor;
    pub use crate::engine::{Executor, Statement};
    pub use crate::error::*;
    pub use crate::field::{Accessor, AccessorId, DynField, Entity, Field};
    pub use crate::params::{ParameterBinding, ParameterSet};
    pub use crate::parser::{parse_filter, parse_sort};
    pub use crate::query::aggregate::{
        avg, count, count_distinct, greatest, least, max, min, sum,
    };
    pub use crate::query::{
        Cmp, Dynamic, Quantifier, Query, QueryKind, Relation, ResultShape, SortOrder,
    };
    pub use crate::registry::{FieldRegistry, LocalCache, RegistryStats};
    pub use crate::schema::{FieldInfo, Schema, SchemaProvider, TemporalClass};
    pub use crate::transpiler::Render;
    pub use crate::value::Value;
}
