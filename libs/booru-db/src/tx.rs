//! Transaction coordinator.
//!
//! A unit of work receives `&mut S::Tx`, a runner pinned to the single
//! connection the BEGIN was issued on, so every statement in the scope shares
//! that session. The work decides the outcome by its return value:
//!
//! ```rust,no_run
//! use booru_db::{Db, DbError, Record, persist, transaction};
//! use booru_db::schema::{Column, ColumnDef, EntitySchema};
//!
//! static TAGS: EntitySchema = EntitySchema::new(
//!     "tags",
//!     &[
//!         Column::new("id", ColumnDef::number("tag_id").primary_key()),
//!         Column::new("name", ColumnDef::string("tag_name")),
//!     ],
//! );
//!
//! # async fn demo(db: Db) -> Result<(), booru_db::TxError<DbError>> {
//! let tag = transaction(&db, move |tx| {
//!     Box::pin(async move {
//!         let mut tag = Record::new().with("name", "cat");
//!         persist::sync(tx, &TAGS, &mut tag).await?;
//!         Ok::<_, DbError>(tag)
//!     })
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::DbError;
use crate::runner::{DbSource, TxRunner};

/// Lifecycle of a live transaction handle.
///
/// There is no `Idle` variant: before BEGIN there is simply no handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    InTransaction,
    Committed,
    RolledBack,
}

/// Outcome of a failed [`transaction`].
#[derive(Debug, Error)]
pub enum TxError<E> {
    /// The unit of work failed; the transaction was rolled back.
    #[error(transparent)]
    Domain(E),

    /// BEGIN or COMMIT failed.
    #[error("transaction infrastructure error: {0}")]
    Infra(#[source] DbError),
}

impl<E> TxError<E>
where
    E: From<DbError>,
{
    /// Collapse both arms into the caller's error type.
    #[must_use]
    pub fn into_domain(self) -> E {
        match self {
            TxError::Domain(e) => e,
            TxError::Infra(e) => E::from(e),
        }
    }
}

/// Run `work` between BEGIN and COMMIT on one pooled connection.
///
/// `Ok(v)` commits and returns `v`. `Err(e)` rolls back and returns
/// `TxError::Domain(e)`; a failing ROLLBACK is logged and `e` is kept.
///
/// # Errors
/// `TxError::Domain` when the work failed, `TxError::Infra` when BEGIN or
/// COMMIT failed.
pub async fn transaction<S, F, T, E>(db: &S, work: F) -> Result<T, TxError<E>>
where
    S: DbSource + ?Sized,
    F: for<'a> FnOnce(&'a mut S::Tx) -> BoxFuture<'a, Result<T, E>> + Send,
{
    let mut tx = db.begin().await.map_err(TxError::Infra)?;

    match work(&mut tx).await {
        Ok(value) => {
            commit_if_open(&mut tx).await.map_err(TxError::Infra)?;
            Ok(value)
        }
        Err(e) => {
            rollback_if_open(&mut tx).await;
            Err(TxError::Domain(e))
        }
    }
}

/// Boolean form of [`transaction`].
///
/// `Ok(true)` commits and yields `true`; `Ok(false)`, `Err`, or a failed
/// BEGIN/COMMIT roll back and yield `false`. Failure causes are logged, not
/// returned: use [`transaction`] when the caller needs them.
pub async fn run_in_transaction<S, F>(db: &S, work: F) -> bool
where
    S: DbSource + ?Sized,
    F: for<'a> FnOnce(&'a mut S::Tx) -> BoxFuture<'a, Result<bool, DbError>> + Send,
{
    let mut tx = match db.begin().await {
        Ok(tx) => tx,
        Err(e) => {
            warn!(error = %e, "cannot begin transaction");
            return false;
        }
    };

    match work(&mut tx).await {
        Ok(true) => match commit_if_open(&mut tx).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "commit failed");
                false
            }
        },
        Ok(false) => {
            debug!("unit of work asked for rollback");
            rollback_if_open(&mut tx).await;
            false
        }
        Err(e) => {
            warn!(error = %e, "transaction rolled back");
            rollback_if_open(&mut tx).await;
            false
        }
    }
}

async fn commit_if_open<T: TxRunner + ?Sized>(tx: &mut T) -> Result<(), DbError> {
    if tx.state() == TxState::InTransaction {
        tx.commit().await
    } else {
        warn!(state = ?tx.state(), "unit of work already finished its transaction");
        Ok(())
    }
}

async fn rollback_if_open<T: TxRunner + ?Sized>(tx: &mut T) {
    if tx.state() != TxState::InTransaction {
        return;
    }
    if let Err(e) = tx.rollback().await {
        error!(error = %e, "rollback failed; the server discards the transaction with the connection");
    }
}
