//! In-process scripted database for tests.
//!
//! [`ScriptedDb`] implements [`DbSource`] without a server: statements are
//! journaled, INSERTs get increasing auto-increment ids, SELECTs return rows
//! queued with [`ScriptedDb::push_rows`], and any statement containing the
//! configured needle fails like a dropped connection would. Statements issued
//! inside a transaction reach [`ScriptedDb::applied`] only on COMMIT.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::record::Row;
use crate::runner::{DbRunner, DbSource, ExecOutcome, TxRunner};
use crate::tx::TxState;
use crate::{DbError, Result};

#[derive(Debug, Default)]
struct Journal {
    log: Vec<String>,
    applied: Vec<String>,
    last_id: u64,
    rows: VecDeque<Vec<Row>>,
    fail_on: Option<String>,
}

impl Journal {
    fn check(&self, sql: &str) -> Result<()> {
        match &self.fail_on {
            Some(needle) if sql.contains(needle.as_str()) => Err(DbError::Sqlx(
                sqlx::Error::Protocol(format!("scripted failure on `{needle}`")),
            )),
            _ => Ok(()),
        }
    }

    fn run(&mut self, sql: &str) -> Result<ExecOutcome> {
        self.check(sql)?;
        self.log.push(sql.to_owned());
        let mut outcome = ExecOutcome {
            rows_affected: 1,
            last_insert_id: 0,
        };
        if sql.trim_start().starts_with("INSERT") {
            self.last_id += 1;
            outcome.last_insert_id = self.last_id;
        }
        Ok(outcome)
    }

    fn fetch(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.check(sql)?;
        self.log.push(sql.to_owned());
        Ok(self.rows.pop_front().unwrap_or_default())
    }
}

/// Shared fake; clones observe the same journal.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDb {
    journal: Arc<Mutex<Journal>>,
}

impl ScriptedDb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement (BEGIN and COMMIT included) whose text contains `needle`.
    #[must_use]
    pub fn fail_on(self, needle: &str) -> Self {
        self.journal.lock().fail_on = Some(needle.to_owned());
        self
    }

    /// Stop failing statements.
    pub fn heal(&self) {
        self.journal.lock().fail_on = None;
    }

    /// First generated id will be `last_id + 1`.
    #[must_use]
    pub fn starting_after(self, last_id: u64) -> Self {
        self.journal.lock().last_id = last_id;
        self
    }

    /// Queue the result of the next SELECT/CALL fetch. Unqueued fetches
    /// return no rows.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.journal.lock().rows.push_back(rows);
    }

    /// Every statement seen, including BEGIN/COMMIT/ROLLBACK.
    #[must_use]
    pub fn log(&self) -> Vec<String> {
        self.journal.lock().log.clone()
    }

    /// Write statements that took effect: outside a transaction, or committed.
    #[must_use]
    pub fn applied(&self) -> Vec<String> {
        self.journal.lock().applied.clone()
    }
}

#[async_trait]
impl DbSource for ScriptedDb {
    type Conn = ScriptedConn;
    type Tx = ScriptedTx;

    fn conn(&self) -> ScriptedConn {
        ScriptedConn {
            journal: Arc::clone(&self.journal),
        }
    }

    async fn begin(&self) -> Result<ScriptedTx> {
        self.journal.lock().run("BEGIN")?;
        Ok(ScriptedTx {
            journal: Arc::clone(&self.journal),
            pending: Vec::new(),
            state: TxState::InTransaction,
        })
    }
}

#[derive(Debug)]
pub struct ScriptedConn {
    journal: Arc<Mutex<Journal>>,
}

#[async_trait]
impl DbRunner for ScriptedConn {
    async fn execute(&mut self, sql: &str) -> Result<ExecOutcome> {
        let mut journal = self.journal.lock();
        let outcome = journal.run(sql)?;
        journal.applied.push(sql.to_owned());
        Ok(outcome)
    }

    async fn fetch_all(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.journal.lock().fetch(sql)
    }
}

#[derive(Debug)]
pub struct ScriptedTx {
    journal: Arc<Mutex<Journal>>,
    pending: Vec<String>,
    state: TxState,
}

impl ScriptedTx {
    fn ensure_open(&self) -> Result<()> {
        if self.state == TxState::InTransaction {
            Ok(())
        } else {
            Err(DbError::TxFinished)
        }
    }
}

#[async_trait]
impl DbRunner for ScriptedTx {
    async fn execute(&mut self, sql: &str) -> Result<ExecOutcome> {
        self.ensure_open()?;
        let outcome = self.journal.lock().run(sql)?;
        self.pending.push(sql.to_owned());
        Ok(outcome)
    }

    async fn fetch_all(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.ensure_open()?;
        self.journal.lock().fetch(sql)
    }
}

#[async_trait]
impl TxRunner for ScriptedTx {
    fn state(&self) -> TxState {
        self.state
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let mut journal = self.journal.lock();
        if let Err(e) = journal.run("COMMIT") {
            self.state = TxState::RolledBack;
            self.pending.clear();
            return Err(e);
        }
        journal.applied.append(&mut self.pending);
        self.state = TxState::Committed;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.state = TxState::RolledBack;
        self.pending.clear();
        self.journal.lock().run("ROLLBACK").map(|_| ())
    }
}
