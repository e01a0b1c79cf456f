//! Driver and session abstractions.
//!
//! The wire protocol and authentication belong to the database client library.
//! The manager only sees a [`Driver`] that opens sessions and a [`Connection`]
//! that streams the events of one statement at a time.

use crate::error::DbResult;
use crate::models::{ColumnTypes, ConnectionConfig, ExecInfo, Row, Statement};
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use std::sync::Arc;

/// One event on a statement's result stream.
#[derive(Debug, Clone)]
pub enum QueryEvent {
    /// A result row, with the declared column types when the driver knows them.
    Row {
        row: Row,
        types: Option<Arc<ColumnTypes>>,
    },
    /// A result set (or a statement without rows) finished.
    Done(ExecInfo),
}

/// A live database session.
pub trait Connection: Send {
    /// Run a statement and stream its events.
    ///
    /// Errors are yielded in-stream; the stream ends once the statement has
    /// completed, successfully or not.
    fn query<'a>(&'a mut self, statement: &'a Statement) -> BoxStream<'a, DbResult<QueryEvent>>;

    /// Switch the session to manual transaction control.
    fn disable_autocommit(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            let statement = Statement::raw("SET autocommit = 0");
            let mut stream = self.query(&statement);
            let mut first_error = None;
            while let Some(event) = stream.next().await {
                if let Err(e) = event {
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        })
    }

    /// Terminate the session.
    fn close(self: Box<Self>) -> BoxFuture<'static, DbResult<()>>;
}

/// Session factory: opens sessions against connection parameters.
pub trait Driver: Send + Sync + 'static {
    fn connect(&self, config: &ConnectionConfig) -> BoxFuture<'static, DbResult<Box<dyn Connection>>>;
}
