#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Booru database core.
//!
//! A schema-driven row-mapping layer on top of a `MySQL` pool (`SQLx`):
//!
//! - [`schema`]: static per-entity column metadata ([`EntitySchema`]).
//! - [`mapper`]: storage row → [`Record`], and validated input → [`Record`].
//! - [`statement`]: INSERT / UPDATE / SELECT text with `:name` placeholders and
//!   client-side literal substitution (escaping is delegated to `sea-query`).
//! - [`persist`]: insert-vs-update decision, generated key reconciliation, selects.
//! - [`tx`]: BEGIN / COMMIT / ROLLBACK around a unit of work pinned to one connection.
//! - [`entity`]: the same operations for typed structs implementing [`Entity`].
//!
//! Everything that touches storage goes through a [`DbRunner`], so the same
//! code runs on a pooled connection ([`DbConn`]) or inside a transaction ([`DbTx`]).
//!
//! # Example
//! ```rust,no_run
//! use booru_db::{Db, DbConfig, DbSource, persist, schema::{Column, ColumnDef, EntitySchema}};
//!
//! static SOURCES: EntitySchema = EntitySchema::new(
//!     "sources",
//!     &[
//!         Column::new("id", ColumnDef::number("source_id").primary_key()),
//!         Column::new("name", ColumnDef::string("source_name")),
//!     ],
//! );
//!
//! # async fn demo() -> booru_db::Result<()> {
//! let db = Db::connect(&DbConfig::default()).await?;
//! let mut conn = db.conn();
//! let all = persist::select_all(&mut conn, &SOURCES).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod conn;
pub mod entity;
pub mod error;
pub mod mapper;
pub mod persist;
pub mod record;
pub mod runner;
pub mod schema;
pub mod statement;
pub mod tx;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{DbConfig, PoolCfg};
pub use conn::{Db, DbConn, DbTx};
pub use entity::Entity;
pub use error::{DbError, Result, ValidationError, ValidationErrors};
pub use record::{Record, Row};
pub use runner::{DbRunner, DbSource, ExecOutcome, TxRunner};
pub use schema::{Column, ColumnDef, ColumnType, EntitySchema};
pub use tx::{TxError, TxState, run_in_transaction, transaction};
