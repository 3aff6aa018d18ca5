//! Statement execution seams.
//!
//! [`DbRunner`] is implemented by anything that can run a fully-substituted
//! statement: a pooled connection, an open transaction, or the scripted fake
//! in [`crate::testing`]. Persistence code is generic over it, so the same
//! function runs inside or outside a transaction.

use async_trait::async_trait;

use crate::Result;
use crate::record::Row;
use crate::tx::TxState;

/// What a write statement reports back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Auto-increment id generated by the statement, `0` if none.
    pub last_insert_id: u64,
}

#[async_trait]
pub trait DbRunner: Send {
    /// Run a statement that returns no rows.
    async fn execute(&mut self, sql: &str) -> Result<ExecOutcome>;

    /// Run a query and decode every row.
    async fn fetch_all(&mut self, sql: &str) -> Result<Vec<Row>>;
}

/// A runner pinned to one connection between BEGIN and COMMIT/ROLLBACK.
#[async_trait]
pub trait TxRunner: DbRunner {
    fn state(&self) -> TxState;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// Hands out runners. Implemented by [`crate::Db`].
#[async_trait]
pub trait DbSource: Send + Sync {
    type Conn: DbRunner;
    type Tx: TxRunner;

    /// A runner that borrows a pooled connection per statement.
    fn conn(&self) -> Self::Conn;

    /// Acquire a connection and issue BEGIN on it.
    async fn begin(&self) -> Result<Self::Tx>;
}
