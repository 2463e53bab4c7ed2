//! Transaction handle for the sqlx backend.
//!
//! A `DbTransaction` owns one dedicated connection until it is committed or
//! rolled back. The handle is cheap to clone so it can ride along in a
//! request context; every clone drives the same transaction, one operation
//! at a time.

use crate::db::driver::{Queryable, RowCursor, RowHandle};
use crate::db::macros::DatabaseType;
use crate::db::params::{mysql_query, postgres_query, sqlite_query};
use crate::db::pool::{CURSOR_BUFFER, DbRow, forward_rows, open_cursor};
use crate::db::query::{ExecResult, QueryParam};
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use futures_util::stream::{BoxStream, StreamExt};
use sqlx::{Executor, MySql, Postgres, Sqlite, Transaction};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::{Mutex, mpsc};
use tracing::{Instrument, debug};

/// Database-specific open transaction.
pub(crate) enum TxConn {
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
    SQLite(Transaction<'static, Sqlite>),
}

impl TxConn {
    fn db_type(&self) -> DatabaseType {
        match self {
            TxConn::MySql(_) => DatabaseType::MySQL,
            TxConn::Postgres(_) => DatabaseType::PostgreSQL,
            TxConn::SQLite(_) => DatabaseType::SQLite,
        }
    }

    async fn commit(self) -> DbResult<()> {
        match self {
            TxConn::MySql(tx) => tx.commit().await.map_err(DbError::from),
            TxConn::Postgres(tx) => tx.commit().await.map_err(DbError::from),
            TxConn::SQLite(tx) => tx.commit().await.map_err(DbError::from),
        }
    }

    async fn rollback(self) -> DbResult<()> {
        match self {
            TxConn::MySql(tx) => tx.rollback().await.map_err(DbError::from),
            TxConn::Postgres(tx) => tx.rollback().await.map_err(DbError::from),
            TxConn::SQLite(tx) => tx.rollback().await.map_err(DbError::from),
        }
    }
}

/// Handle to an open database transaction.
#[derive(Clone)]
pub struct DbTransaction {
    id: Arc<str>,
    db_type: DatabaseType,
    started_at: DateTime<Utc>,
    conn: Arc<Mutex<Option<TxConn>>>,
    /// Alive while a cursor opened on this transaction still has rows.
    open_cursor: Arc<StdMutex<Weak<()>>>,
}

impl DbTransaction {
    pub(crate) fn new(conn: TxConn) -> Self {
        Self {
            id: format!("tx_{}", uuid::Uuid::new_v4().simple()).into(),
            db_type: conn.db_type(),
            started_at: Utc::now(),
            conn: Arc::new(Mutex::new(Some(conn))),
            open_cursor: Arc::new(StdMutex::new(Weak::new())),
        }
    }

    /// Unique identifier, used in logs and errors.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the transaction has not been committed or rolled back yet.
    pub async fn is_active(&self) -> bool {
        self.has_open_cursor() || self.conn.lock().await.is_some()
    }

    /// Commit the transaction. Every clone of the handle becomes inactive.
    pub async fn commit(&self) -> DbResult<()> {
        let conn = self.take().await?;
        conn.commit().await?;
        debug!(transaction_id = %self.id, "Transaction committed");
        Ok(())
    }

    /// Roll the transaction back. Every clone of the handle becomes inactive.
    pub async fn rollback(&self) -> DbResult<()> {
        let conn = self.take().await?;
        conn.rollback().await?;
        debug!(transaction_id = %self.id, "Transaction rolled back");
        Ok(())
    }

    async fn take(&self) -> DbResult<TxConn> {
        self.ensure_idle()?;
        self.conn.lock().await.take().ok_or_else(|| self.inactive())
    }

    fn has_open_cursor(&self) -> bool {
        self.open_cursor
            .lock()
            .is_ok_and(|cursor| cursor.strong_count() > 0)
    }

    /// The connection cannot serve another statement until an open cursor
    /// is drained, closed or dropped.
    fn ensure_idle(&self) -> DbResult<()> {
        if self.has_open_cursor() {
            return Err(DbError::transaction(
                "Transaction is busy with an open cursor",
                &*self.id,
            ));
        }
        Ok(())
    }

    fn track_cursor(&self) -> Arc<()> {
        let token = Arc::new(());
        if let Ok(mut cursor) = self.open_cursor.lock() {
            *cursor = Arc::downgrade(&token);
        }
        token
    }

    fn inactive(&self) -> DbError {
        DbError::transaction("Transaction is no longer active", &*self.id)
    }
}

impl std::fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbTransaction")
            .field("id", &self.id)
            .field("db_type", &self.db_type)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl Queryable for DbTransaction {
    type Row = DbRow;

    async fn exec(&self, sql: &str, args: &[QueryParam]) -> DbResult<ExecResult> {
        self.ensure_idle()?;
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(|| self.inactive())?;

        let result: ExecResult = match conn {
            TxConn::MySql(tx) if args.is_empty() => (&mut **tx).execute(sql).await?.into(),
            TxConn::MySql(tx) => mysql_query(sql, args).execute(&mut **tx).await?.into(),
            TxConn::Postgres(tx) if args.is_empty() => (&mut **tx).execute(sql).await?.into(),
            TxConn::Postgres(tx) => postgres_query(sql, args).execute(&mut **tx).await?.into(),
            TxConn::SQLite(tx) if args.is_empty() => (&mut **tx).execute(sql).await?.into(),
            TxConn::SQLite(tx) => sqlite_query(sql, args).execute(&mut **tx).await?.into(),
        };
        Ok(result)
    }

    async fn query(&self, sql: &str, args: &[QueryParam]) -> DbResult<RowCursor<DbRow>> {
        self.ensure_idle()?;
        // The producer keeps the connection locked until the rows run out or
        // the reader goes away.
        let mut guard = self.conn.clone().lock_owned().await;
        if guard.is_none() {
            return Err(self.inactive());
        }

        let (sender, receiver) = mpsc::channel(CURSOR_BUFFER);
        let sql = sql.to_string();
        let args = args.to_vec();

        tokio::spawn(
            async move {
                if let Some(conn) = guard.as_mut() {
                    forward_rows(fetch_from_tx(conn, &sql, &args), &sender).await;
                }
                // Unlock before the reader sees the end of the rows.
                drop(guard);
                drop(sender);
            }
            .in_current_span(),
        );

        open_cursor(receiver, self.track_cursor()).await
    }

    async fn query_row(&self, sql: &str, args: &[QueryParam]) -> RowHandle<DbRow> {
        if let Err(err) = self.ensure_idle() {
            return RowHandle::new(Err(err));
        }
        let mut guard = self.conn.lock().await;
        let Some(conn) = guard.as_mut() else {
            return RowHandle::new(Err(self.inactive()));
        };

        let row = match conn {
            TxConn::MySql(tx) => mysql_query(sql, args)
                .fetch_optional(&mut **tx)
                .await
                .map(|r| r.map(DbRow::MySql)),
            TxConn::Postgres(tx) => postgres_query(sql, args)
                .fetch_optional(&mut **tx)
                .await
                .map(|r| r.map(DbRow::Postgres)),
            TxConn::SQLite(tx) => sqlite_query(sql, args)
                .fetch_optional(&mut **tx)
                .await
                .map(|r| r.map(DbRow::SQLite)),
        };
        RowHandle::new(row.map_err(DbError::from))
    }
}

fn fetch_from_tx<'a>(
    conn: &'a mut TxConn,
    sql: &'a str,
    args: &'a [QueryParam],
) -> BoxStream<'a, Result<DbRow, sqlx::Error>> {
    match conn {
        TxConn::MySql(tx) => {
            let rows = if args.is_empty() {
                (&mut **tx).fetch(sql)
            } else {
                mysql_query(sql, args).fetch(&mut **tx)
            };
            rows.map(|r| r.map(DbRow::MySql)).boxed()
        }
        TxConn::Postgres(tx) => {
            let rows = if args.is_empty() {
                (&mut **tx).fetch(sql)
            } else {
                postgres_query(sql, args).fetch(&mut **tx)
            };
            rows.map(|r| r.map(DbRow::Postgres)).boxed()
        }
        TxConn::SQLite(tx) => {
            let rows = if args.is_empty() {
                (&mut **tx).fetch(sql)
            } else {
                sqlite_query(sql, args).fetch(&mut **tx)
            };
            rows.map(|r| r.map(DbRow::SQLite)).boxed()
        }
    }
}
