//! Database access layer.
//!
//! - `query`: query descriptors, bound parameters and result types
//! - `pretty`: single-line rendering of a query with its arguments
//! - `driver`: the `Queryable`/`Pool` traits the executor is written against
//! - `pool`/`transaction`: the sqlx backend for MySQL, PostgreSQL and SQLite
//! - `tx_context`: carrying a transaction through a `Context`
//! - `executor`: the traced, transaction-aware front end

pub mod driver;
pub mod executor;
#[macro_use]
pub mod macros;
pub(crate) mod params;
pub mod pool;
pub mod pretty;
pub mod query;
pub mod transaction;
pub mod tx_context;

pub use driver::{FromRow, Pool, Queryable, RowCursor, RowHandle};
pub use executor::QueryExecutor;
pub use macros::DatabaseType;
pub use pool::{DbPool, DbRow};
pub use pretty::{Placeholder, PrettyQuery, pretty};
pub use query::{ExecResult, IsolationLevel, Query, QueryParam, TxOptions};
pub use transaction::DbTransaction;
pub use tx_context::{transaction_of, with_transaction};
