//! Query execution facade.
//!
//! Every call is routed to the transaction carried by the context when there
//! is one, otherwise to the pool. Each call runs inside its own `db.query`
//! span; the formatted query is logged at DEBUG before dispatch and failures
//! are recorded on the span before being returned unchanged.

use crate::context::Context;
use crate::db::driver::{FromRow, Pool, Queryable, RowCursor, RowHandle};
use crate::db::pretty::PrettyQuery;
use crate::db::query::{ExecResult, Query, QueryParam, TxOptions};
use crate::db::tx_context::transaction_of;
use crate::error::{DbError, DbResult};
use std::future::Future;
use tracing::field::{Empty, display};
use tracing::{Instrument, Span, debug, info_span};

/// Where a routed call is dispatched.
enum Route<'a, P: Pool> {
    Pool(&'a P),
    Tx(P::Tx),
}

impl<P: Pool> Route<'_, P> {
    async fn exec(&self, sql: &str, args: &[QueryParam]) -> DbResult<ExecResult> {
        match self {
            Route::Pool(pool) => pool.exec(sql, args).await,
            Route::Tx(tx) => tx.exec(sql, args).await,
        }
    }

    async fn query(&self, sql: &str, args: &[QueryParam]) -> DbResult<RowCursor<P::Row>> {
        match self {
            Route::Pool(pool) => pool.query(sql, args).await,
            Route::Tx(tx) => tx.query(sql, args).await,
        }
    }

    async fn query_row(&self, sql: &str, args: &[QueryParam]) -> RowHandle<P::Row> {
        match self {
            Route::Pool(pool) => pool.query_row(sql, args).await,
            Route::Tx(tx) => tx.query_row(sql, args).await,
        }
    }
}

/// Transaction-aware, traced front end over a [`Pool`].
#[derive(Debug, Clone)]
pub struct QueryExecutor<P> {
    pool: P,
}

impl<P: Pool> QueryExecutor<P> {
    pub fn new(pool: P) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Run `query` and decode exactly one row.
    ///
    /// No row yields [`DbError::NotFound`], more than one row yields
    /// [`DbError::MultipleRows`].
    pub async fn scan_one<T>(
        &self,
        ctx: &Context,
        query: Query<'_>,
        args: &[QueryParam],
    ) -> DbResult<T>
    where
        T: FromRow<P::Row>,
    {
        let route = self.route(ctx);
        self.traced(ctx, query, args, async {
            let mut cursor = route.query(query.raw, args).await?;
            let row = cursor.next_row().await.transpose()?.ok_or(DbError::NotFound)?;
            if cursor.next_row().await.transpose()?.is_some() {
                return Err(DbError::MultipleRows);
            }
            T::from_row(&row)
        })
        .await
    }

    /// Run `query` and decode every row. No rows is not an error.
    pub async fn scan_all<T>(
        &self,
        ctx: &Context,
        query: Query<'_>,
        args: &[QueryParam],
    ) -> DbResult<Vec<T>>
    where
        T: FromRow<P::Row>,
    {
        let route = self.route(ctx);
        self.traced(ctx, query, args, async {
            let mut cursor = route.query(query.raw, args).await?;
            let mut items = Vec::new();
            while let Some(row) = cursor.next_row().await {
                items.push(T::from_row(&row?)?);
            }
            Ok(items)
        })
        .await
    }

    /// Run a statement that returns no rows.
    pub async fn exec(
        &self,
        ctx: &Context,
        query: Query<'_>,
        args: &[QueryParam],
    ) -> DbResult<ExecResult> {
        let route = self.route(ctx);
        self.traced(ctx, query, args, route.exec(query.raw, args))
            .await
    }

    /// Run `query` and hand back a lazy cursor over its rows.
    pub async fn query(
        &self,
        ctx: &Context,
        query: Query<'_>,
        args: &[QueryParam],
    ) -> DbResult<RowCursor<P::Row>> {
        let route = self.route(ctx);
        self.traced(ctx, query, args, route.query(query.raw, args))
            .await
    }

    /// Run `query` for at most one row. Errors surface from
    /// [`RowHandle::scan`].
    pub async fn query_row(
        &self,
        ctx: &Context,
        query: Query<'_>,
        args: &[QueryParam],
    ) -> RowHandle<P::Row> {
        let route = self.route(ctx);
        let result = self
            .traced(ctx, query, args, async {
                route.query_row(query.raw, args).await.into_inner()
            })
            .await;
        RowHandle::new(result)
    }

    /// Start a transaction on the pool. A transaction already carried by
    /// `ctx` is ignored; nesting is not supported.
    pub async fn begin(&self, ctx: &Context, options: TxOptions) -> DbResult<P::Tx> {
        let span = info_span!("BeginTx", otel.name = "BeginTx", error = Empty, err = Empty);
        with_deadline(ctx, "BeginTx", self.pool.begin(options))
            .instrument(span.clone())
            .await
            .inspect_err(|err| record_error(&span, err))
    }

    /// Check that the database is reachable.
    pub async fn ping(&self, ctx: &Context) -> DbResult<()> {
        with_deadline(ctx, "Ping", self.pool.ping()).await
    }

    /// Close the pool. Later calls fail with a driver error.
    pub async fn close(&self) {
        self.pool.close().await
    }

    fn route(&self, ctx: &Context) -> Route<'_, P> {
        match transaction_of::<P::Tx>(ctx) {
            Some(tx) => Route::Tx(tx),
            None => Route::Pool(&self.pool),
        }
    }

    async fn traced<T>(
        &self,
        ctx: &Context,
        query: Query<'_>,
        args: &[QueryParam],
        dispatch: impl Future<Output = DbResult<T>>,
    ) -> DbResult<T> {
        let span = info_span!(
            "db.query",
            otel.name = query.name,
            query = query.raw,
            error = Empty,
            err = Empty,
        );

        async {
            debug!(
                sql = query.name,
                query = %PrettyQuery::new(query.raw, self.pool.placeholder(), args)
            );
            with_deadline(ctx, query.name, dispatch)
                .await
                .inspect_err(|err| record_error(&Span::current(), err))
        }
        .instrument(span)
        .await
    }
}

fn record_error(span: &Span, err: &DbError) {
    span.record("error", true);
    span.record("err", display(err));
}

/// Bound `fut` by the context deadline, if there is one.
async fn with_deadline<T>(
    ctx: &Context,
    operation: &str,
    fut: impl Future<Output = DbResult<T>>,
) -> DbResult<T> {
    if ctx.is_expired() {
        return Err(DbError::deadline_exceeded(operation));
    }
    match ctx.deadline() {
        Some(deadline) => tokio::time::timeout_at(deadline.into(), fut)
            .await
            .unwrap_or_else(|_| Err(DbError::deadline_exceeded(operation))),
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::pool::DbPool;
    use crate::db::tx_context::with_transaction;
    use std::time::Duration;

    const CREATE: Query<'static> = Query::new(
        "CreateUsers",
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    );
    const INSERT: Query<'static> = Query::new(
        "InsertUser",
        "INSERT INTO users (id, name) VALUES ($1, $2)",
    );
    const BY_ID: Query<'static> =
        Query::new("UserById", "SELECT id, name FROM users WHERE id = $1");
    const ALL: Query<'static> = Query::new("AllUsers", "SELECT id, name FROM users ORDER BY id");

    async fn executor() -> QueryExecutor<DbPool> {
        let config = DatabaseConfig::parse("sqlite::memory:").unwrap();
        let executor = QueryExecutor::new(DbPool::connect(&config).await.unwrap());
        executor
            .exec(&Context::background(), CREATE, &[])
            .await
            .unwrap();
        executor
    }

    #[tokio::test]
    async fn test_scan_one_cardinality() {
        let db = executor().await;
        let ctx = Context::background();

        let err = db
            .scan_one::<(i64, String)>(&ctx, BY_ID, &crate::params![1])
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        db.exec(&ctx, INSERT, &crate::params![1, "ann"]).await.unwrap();
        db.exec(&ctx, INSERT, &crate::params![2, "bob"]).await.unwrap();

        let user: (i64, String) = db.scan_one(&ctx, BY_ID, &crate::params![2]).await.unwrap();
        assert_eq!(user, (2, "bob".to_string()));

        let err = db.scan_one::<(i64, String)>(&ctx, ALL, &[]).await.unwrap_err();
        assert!(matches!(err, DbError::MultipleRows));
    }

    #[tokio::test]
    async fn test_scan_all_empty_is_ok() {
        let db = executor().await;
        let users: Vec<(i64, String)> = db
            .scan_all(&Context::background(), ALL, &[])
            .await
            .unwrap();
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_expired_deadline() {
        let db = executor().await;
        let ctx = Context::background().with_timeout(Duration::ZERO);
        let err = db.exec(&ctx, INSERT, &crate::params![1, "x"]).await.unwrap_err();
        match err {
            DbError::DeadlineExceeded { operation } => assert_eq!(operation, "InsertUser"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_query_row_defers_errors() {
        let db = executor().await;
        let ctx = Context::background();
        let handle = db
            .query_row(&ctx, Query::new("Broken", "SELEC nothing"), &[])
            .await;
        assert!(matches!(handle.error(), Some(DbError::Driver(_))));

        let handle = db.query_row(&ctx, BY_ID, &crate::params![99]).await;
        assert!(handle.error().is_none());
        assert!(handle.scan::<(i64, String)>().unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_transaction_in_context_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite:{}?mode=rwc&max_connections=2",
            dir.path().join("exec.db").display()
        );
        let db = QueryExecutor::new(
            DbPool::connect(&DatabaseConfig::parse(&url).unwrap())
                .await
                .unwrap(),
        );
        let root = Context::background();
        db.exec(&root, CREATE, &[]).await.unwrap();

        let tx = db.begin(&root, TxOptions::default()).await.unwrap();
        let ctx = with_transaction(&root, tx.clone());
        db.exec(&ctx, INSERT, &crate::params![1, "ann"]).await.unwrap();

        let inside: Vec<(i64, String)> = db.scan_all(&ctx, ALL, &[]).await.unwrap();
        assert_eq!(inside.len(), 1);

        tx.rollback().await.unwrap();
        let outside: Vec<(i64, String)> = db.scan_all(&root, ALL, &[]).await.unwrap();
        assert!(outside.is_empty());
    }
}
