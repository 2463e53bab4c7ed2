//! Driver boundary.
//!
//! `Queryable` is the capability set shared by a pool and an open
//! transaction; `Pool` adds what only the pool can do. The executor is
//! generic over `Pool`, which keeps routing testable without a database.

use crate::db::pretty::Placeholder;
use crate::db::query::{ExecResult, QueryParam, TxOptions};
use crate::error::{DbError, DbResult};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

/// Decode one result row into `Self`.
pub trait FromRow<R>: Sized {
    fn from_row(row: &R) -> DbResult<Self>;
}

/// Operations available on both a pool and a transaction.
pub trait Queryable: Send + Sync {
    type Row: Send + 'static;

    /// Run a statement that returns no rows.
    fn exec(
        &self,
        sql: &str,
        args: &[QueryParam],
    ) -> impl Future<Output = DbResult<ExecResult>> + Send;

    /// Run a query and return a lazy cursor over its rows.
    fn query(
        &self,
        sql: &str,
        args: &[QueryParam],
    ) -> impl Future<Output = DbResult<RowCursor<Self::Row>>> + Send;

    /// Run a query expected to return at most one row. Failures are kept in
    /// the handle and surface when it is scanned.
    fn query_row(
        &self,
        sql: &str,
        args: &[QueryParam],
    ) -> impl Future<Output = RowHandle<Self::Row>> + Send {
        async move {
            match self.query(sql, args).await {
                Ok(mut cursor) => RowHandle::new(cursor.next_row().await.transpose()),
                Err(err) => RowHandle::new(Err(err)),
            }
        }
    }
}

/// A connection pool.
pub trait Pool: Queryable {
    /// Handle of a transaction opened on this pool.
    type Tx: Queryable<Row = Self::Row> + Clone + Send + Sync + 'static;

    fn begin(&self, options: TxOptions) -> impl Future<Output = DbResult<Self::Tx>> + Send;

    fn ping(&self) -> impl Future<Output = DbResult<()>> + Send;

    fn close(&self) -> impl Future<Output = ()> + Send;

    /// Placeholder style used by query templates for this pool.
    fn placeholder(&self) -> Placeholder {
        Placeholder::Dollar
    }
}

/// Lazy, forward-only sequence of result rows.
///
/// Dropping the cursor or calling [`RowCursor::close`] releases whatever the
/// cursor holds (a pooled connection or the transaction lock).
pub struct RowCursor<R> {
    rows: Option<BoxStream<'static, DbResult<R>>>,
}

impl<R: Send + 'static> RowCursor<R> {
    pub fn new(rows: impl Stream<Item = DbResult<R>> + Send + 'static) -> Self {
        Self {
            rows: Some(rows.boxed()),
        }
    }

    /// Cursor over rows that are already in memory.
    pub fn from_rows(rows: Vec<R>) -> Self {
        Self::new(stream::iter(rows.into_iter().map(Ok)))
    }

    pub fn empty() -> Self {
        Self::from_rows(Vec::new())
    }

    /// Cursor that yields `first` and then the rest of `rows`.
    pub fn with_first(first: R, rows: impl Stream<Item = DbResult<R>> + Send + 'static) -> Self {
        Self::new(stream::once(async move { Ok(first) }).chain(rows))
    }

    /// Fetch the next row, `None` once the cursor is exhausted or closed.
    pub async fn next_row(&mut self) -> Option<DbResult<R>> {
        match self.rows.as_mut() {
            Some(rows) => rows.next().await,
            None => None,
        }
    }

    /// Drain the cursor, stopping at the first error.
    pub async fn collect_rows(mut self) -> DbResult<Vec<R>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Stop reading and release the underlying resources.
    pub fn close(&mut self) {
        self.rows = None;
    }

    pub fn is_closed(&self) -> bool {
        self.rows.is_none()
    }
}

impl<R> Stream for RowCursor<R> {
    type Item = DbResult<R>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut().rows.as_mut() {
            Some(rows) => rows.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }
}

impl<R> std::fmt::Debug for RowCursor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCursor")
            .field("closed", &self.rows.is_none())
            .finish()
    }
}

/// Result of a single-row query whose decoding is left to the caller.
#[derive(Debug)]
pub struct RowHandle<R> {
    row: DbResult<Option<R>>,
}

impl<R> RowHandle<R> {
    pub fn new(row: DbResult<Option<R>>) -> Self {
        Self { row }
    }

    /// Decode the row. No row yields [`DbError::NotFound`]; a failed query
    /// yields its original error.
    pub fn scan<T: FromRow<R>>(self) -> DbResult<T> {
        match self.row? {
            Some(row) => T::from_row(&row),
            None => Err(DbError::NotFound),
        }
    }

    /// Error the query failed with, if any.
    pub fn error(&self) -> Option<&DbError> {
        self.row.as_ref().err()
    }

    pub fn into_inner(self) -> DbResult<Option<R>> {
        self.row
    }
}
