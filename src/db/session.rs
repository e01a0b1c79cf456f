//! Session handles given to callers.
//!
//! A [`Session`] is a pooled session checked out for one transaction. It must
//! end with [`Session::commit`] or [`Session::rollback`], both of which return it
//! to the pool whatever their outcome. A [`BasicSession`] borrows the
//! manager's dedicated session for one-off statements.

use crate::db::connection::Connection;
use crate::db::manager::{PooledConn, Shared};
use crate::error::{DbError, DbResult};
use crate::models::{ExecInfo, Params, Row};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Statement that ends a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalCommand {
    Commit,
    Rollback,
}

impl FinalCommand {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Commit => "COMMIT",
            Self::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for FinalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

/// A pooled session checked out for a transaction.
pub struct Session {
    id: u64,
    transaction_id: String,
    conn: Option<Box<dyn Connection>>,
    shared: Arc<Shared>,
}

impl Session {
    pub(crate) fn checkout(pooled: PooledConn, shared: Arc<Shared>) -> Self {
        Self {
            id: pooled.id,
            transaction_id: generate_transaction_id(),
            conn: Some(pooled.conn),
            shared,
        }
    }

    /// Give the connection back without ending the transaction.
    pub(crate) fn into_pooled(mut self) -> Option<PooledConn> {
        let id = self.id;
        self.conn.take().map(|conn| PooledConn { id, conn })
    }

    /// Pool slot of the underlying session, stable across checkouts.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Identifier of this checkout, unique per transaction.
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    fn conn(&mut self) -> DbResult<&mut (dyn Connection + 'static)> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| DbError::internal("Session has already been returned to the pool"))
    }

    /// Execute a statement without capturing rows.
    pub async fn command(&mut self, sql: &str, params: &Params) -> DbResult<ExecInfo> {
        let shared = self.shared.clone();
        let result = shared.executor().command(self.conn()?, sql, params).await;
        shared.observe(result)
    }

    /// Fetch every row of a statement.
    pub async fn fetch_array(&mut self, sql: &str, params: &Params) -> DbResult<Vec<Row>> {
        let shared = self.shared.clone();
        let result = shared.executor().fetch_array(self.conn()?, sql, params).await;
        shared.observe(result)
    }

    /// Fetch the first row of a statement, or `None` when it produced no rows.
    pub async fn fetch_one(&mut self, sql: &str, params: &Params) -> DbResult<Option<Row>> {
        let shared = self.shared.clone();
        let result = shared.executor().fetch_one(self.conn()?, sql, params).await;
        shared.observe(result)
    }

    pub async fn commit(self) -> DbResult<()> {
        self.finish(FinalCommand::Commit).await
    }

    pub async fn rollback(self) -> DbResult<()> {
        self.finish(FinalCommand::Rollback).await
    }

    /// End the transaction and return the session to the pool.
    ///
    /// The session goes back to the pool even when the final statement fails;
    /// its transaction state is then whatever the server left it in.
    pub async fn finish(mut self, command: FinalCommand) -> DbResult<()> {
        let shared = self.shared.clone();
        let result = shared
            .executor()
            .command(self.conn()?, command.sql(), &Params::new())
            .await;

        let id = self.id;
        if let Some(conn) = self.conn.take() {
            shared.release(id, conn);
        }

        match &result {
            Ok(_) => info!(
                session_id = id,
                transaction_id = %self.transaction_id,
                command = %command,
                "Transaction finished"
            ),
            Err(e) => warn!(
                session_id = id,
                transaction_id = %self.transaction_id,
                command = %command,
                error = %e,
                "Transaction finished with an error"
            ),
        }

        shared.observe(result).map(|_| ())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let id = self.id;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(
                session_id = id,
                transaction_id = %self.transaction_id,
                "Session dropped outside a runtime; it cannot be returned to the pool"
            );
            return;
        };

        warn!(
            session_id = id,
            transaction_id = %self.transaction_id,
            "Session dropped without commit or rollback, rolling back"
        );
        let shared = self.shared.clone();
        handle.spawn(async move {
            let params = Params::new();
            let result = shared
                .executor()
                .command(&mut *conn, FinalCommand::Rollback.sql(), &params)
                .await;
            if let Err(e) = &result {
                warn!(session_id = id, error = %e, "Rollback of dropped session failed");
            }
            shared.release(id, conn);
            let _ = shared.observe(result);
        });
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("transaction_id", &self.transaction_id)
            .field("active", &self.conn.is_some())
            .finish()
    }
}

/// The manager's dedicated session. Statements run outside any transaction
/// this crate manages, one at a time.
#[derive(Clone)]
pub struct BasicSession {
    shared: Arc<Shared>,
}

impl BasicSession {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub async fn command(&self, sql: &str, params: &Params) -> DbResult<ExecInfo> {
        let mut dedicated = self.shared.dedicated().lock().await;
        let conn = dedicated.as_deref_mut().ok_or_else(closed)?;
        let result = self.shared.executor().command(conn, sql, params).await;
        self.shared.observe(result)
    }

    pub async fn fetch_array(&self, sql: &str, params: &Params) -> DbResult<Vec<Row>> {
        let mut dedicated = self.shared.dedicated().lock().await;
        let conn = dedicated.as_deref_mut().ok_or_else(closed)?;
        let result = self.shared.executor().fetch_array(conn, sql, params).await;
        self.shared.observe(result)
    }

    pub async fn fetch_one(&self, sql: &str, params: &Params) -> DbResult<Option<Row>> {
        let mut dedicated = self.shared.dedicated().lock().await;
        let conn = dedicated.as_deref_mut().ok_or_else(closed)?;
        let result = self.shared.executor().fetch_one(conn, sql, params).await;
        self.shared.observe(result)
    }
}

impl fmt::Debug for BasicSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicSession").finish_non_exhaustive()
    }
}

fn closed() -> DbError {
    DbError::not_ready("Dedicated session is closed")
}

/// Generate a unique transaction ID.
fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}
