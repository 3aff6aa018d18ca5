//! `MySQL` pool, pooled runner and transaction runner.
//!
//! Statements are sent over the text protocol (`sqlx::raw_sql`): values were
//! already inlined by the statement builder, and every column comes back as
//! text that [`decode_text_value`] turns into a JSON scalar.

use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::mysql::{MySqlConnection, MySqlPool, MySqlPoolOptions, MySqlQueryResult, MySqlRow};
use sqlx::{Column as _, Executor, MySql, Row as _, Transaction, TypeInfo as _};
use tracing::{debug, info, trace};

use crate::config::DbConfig;
use crate::record::Row;
use crate::runner::{DbRunner, DbSource, ExecOutcome, TxRunner};
use crate::tx::TxState;
use crate::{DbError, Result};

/// Shared handle to the connection pool. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Db {
    pool: MySqlPool,
}

impl Db {
    /// Open the pool described by `cfg`.
    ///
    /// # Errors
    /// Returns `DbError::Sqlx` when the server is unreachable or rejects the
    /// credentials.
    pub async fn connect(cfg: &DbConfig) -> Result<Self> {
        let pool = cfg
            .pool
            .apply_mysql(MySqlPoolOptions::new())
            .connect_with(cfg.connect_options())
            .await?;
        info!(url = %cfg.redacted_url(), "database pool ready");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DbSource for Db {
    type Conn = DbConn;
    type Tx = DbTx;

    fn conn(&self) -> DbConn {
        DbConn {
            pool: self.pool.clone(),
        }
    }

    async fn begin(&self) -> Result<DbTx> {
        let tx = self.pool.begin().await?;
        debug!("transaction started");
        Ok(DbTx {
            tx: Some(tx),
            state: TxState::InTransaction,
        })
    }
}

/// Runs each statement on whichever pooled connection is free.
#[derive(Clone, Debug)]
pub struct DbConn {
    pool: MySqlPool,
}

#[async_trait]
impl DbRunner for DbConn {
    async fn execute(&mut self, sql: &str) -> Result<ExecOutcome> {
        trace!(sql, "execute");
        let done = sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(outcome(&done))
    }

    async fn fetch_all(&mut self, sql: &str) -> Result<Vec<Row>> {
        trace!(sql, "fetch");
        let rows = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }
}

/// One connection between BEGIN and COMMIT/ROLLBACK.
///
/// Dropping an unfinished `DbTx` rolls it back when the connection returns to
/// the pool.
pub struct DbTx {
    tx: Option<Transaction<'static, MySql>>,
    state: TxState,
}

impl std::fmt::Debug for DbTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbTx").field("state", &self.state).finish_non_exhaustive()
    }
}

impl DbTx {
    fn open(&mut self) -> Result<&mut Transaction<'static, MySql>> {
        self.tx.as_mut().ok_or(DbError::TxFinished)
    }
}

#[async_trait]
impl DbRunner for DbTx {
    async fn execute(&mut self, sql: &str) -> Result<ExecOutcome> {
        trace!(sql, "execute in transaction");
        let conn: &mut MySqlConnection = self.open()?.as_mut();
        let done = Executor::execute(conn, sqlx::raw_sql(sql)).await?;
        Ok(outcome(&done))
    }

    async fn fetch_all(&mut self, sql: &str) -> Result<Vec<Row>> {
        trace!(sql, "fetch in transaction");
        let conn: &mut MySqlConnection = self.open()?.as_mut();
        let rows = Executor::fetch_all(conn, sqlx::raw_sql(sql)).await?;
        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl TxRunner for DbTx {
    fn state(&self) -> TxState {
        self.state
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(DbError::TxFinished)?;
        match tx.commit().await {
            Ok(()) => {
                self.state = TxState::Committed;
                debug!("transaction committed");
                Ok(())
            }
            Err(e) => {
                // the connection is gone with the failed COMMIT; the server discards the work
                self.state = TxState::RolledBack;
                Err(e.into())
            }
        }
    }

    async fn rollback(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(DbError::TxFinished)?;
        self.state = TxState::RolledBack;
        tx.rollback().await?;
        debug!("transaction rolled back");
        Ok(())
    }
}

fn outcome(done: &MySqlQueryResult) -> ExecOutcome {
    ExecOutcome {
        rows_affected: done.rows_affected(),
        last_insert_id: done.last_insert_id(),
    }
}

fn decode_row(row: &MySqlRow) -> Result<Row> {
    row.columns()
        .iter()
        .map(|column| {
            let raw = row
                .try_get_unchecked::<Option<&[u8]>, _>(column.ordinal())
                .map_err(|e| DbError::Decode {
                    column: column.name().to_owned(),
                    message: e.to_string(),
                })?;
            let value = match raw {
                None => Value::Null,
                Some(bytes) => decode_text_value(column.type_info().name(), bytes),
            };
            Ok((column.name(), value))
        })
        .collect()
}

/// Turn one text-protocol column value into a JSON scalar.
///
/// - a one-byte `BIT` is a boolean, true when the first byte is `1`. The
///   server sends `BIT(1)` through `BIT(8)` as one byte and the width is not
///   visible here, so only `BIT(1)` columns should be mapped as flags;
/// - a wider `BIT` is an unsigned big-endian number;
/// - `BOOLEAN` (`TINYINT(1)`) is false only for `0`;
/// - integer types and `YEAR` become numbers;
/// - `FLOAT`, `DOUBLE` and `DECIMAL` become numbers when they fit an `f64`;
/// - everything else, dates included, is returned as text.
#[must_use]
pub fn decode_text_value(type_name: &str, raw: &[u8]) -> Value {
    let text = || String::from_utf8_lossy(raw).into_owned();
    match type_name {
        "BIT" if raw.len() <= 1 => Value::Bool(raw.first() == Some(&1)),
        "BIT" => Value::from(raw.iter().fold(0_u64, |acc, b| (acc << 8) | u64::from(*b))),
        "BOOLEAN" => Value::Bool(raw != b"0"),
        t if t.contains("INT") || t == "YEAR" => {
            let s = text();
            let parsed = if t.ends_with("UNSIGNED") {
                s.parse::<u64>().ok().map(Value::from)
            } else {
                s.parse::<i64>().ok().map(Value::from)
            };
            parsed.unwrap_or(Value::String(s))
        }
        "FLOAT" | "DOUBLE" | "DECIMAL" => {
            let s = text();
            s.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map_or(Value::String(s), Value::Number)
        }
        _ => Value::String(text()),
    }
}
