//! Statement execution on a single session.
//!
//! Every operation here drains the statement's event stream to the end before
//! resolving: a session is never handed back while rows are still in flight.
//! The first error seen on the stream is the one reported.

use crate::db::connection::{Connection, QueryEvent};
use crate::db::params::prepare;
use crate::db::types::convert_row;
use crate::error::DbResult;
use crate::models::{ExecInfo, Params, Row};
use futures_util::StreamExt;
use std::time::Instant;
use tracing::debug;

/// Runs statements and shapes their results.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExecutor {
    coerce_types: bool,
}

impl QueryExecutor {
    /// Create an executor. With `coerce_types`, fetched rows are converted
    /// using the column types the driver reports.
    pub fn new(coerce_types: bool) -> Self {
        Self { coerce_types }
    }

    pub fn coerce_types(&self) -> bool {
        self.coerce_types
    }

    /// Execute a statement and report its completion info.
    ///
    /// Rows produced by the statement are discarded. When the statement yields
    /// several result sets, the info of the last one is returned.
    pub async fn command(
        &self,
        conn: &mut dyn Connection,
        sql: &str,
        params: &Params,
    ) -> DbResult<ExecInfo> {
        let start = Instant::now();
        let statement = prepare(sql, params)?;
        debug!(sql = %sql, params = params.len(), "Executing command");

        let mut info = ExecInfo::default();
        let mut first_error = None;
        let mut events = conn.query(&statement);
        while let Some(event) = events.next().await {
            match event {
                Ok(QueryEvent::Done(done)) => info = done,
                Ok(QueryEvent::Row { .. }) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        debug!(
            rows_affected = info.rows_affected,
            last_insert_id = ?info.last_insert_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Command completed"
        );
        Ok(info)
    }

    /// Fetch every row produced by a statement, in arrival order.
    pub async fn fetch_array(
        &self,
        conn: &mut dyn Connection,
        sql: &str,
        params: &Params,
    ) -> DbResult<Vec<Row>> {
        let start = Instant::now();
        let statement = prepare(sql, params)?;
        debug!(sql = %sql, params = params.len(), "Fetching rows");

        let mut rows = Vec::new();
        let mut first_error = None;
        let mut events = conn.query(&statement);
        while let Some(event) = events.next().await {
            match event {
                Ok(QueryEvent::Row { mut row, types }) => {
                    if let (true, Some(types)) = (self.coerce_types, types) {
                        convert_row(&mut row, &types);
                    }
                    rows.push(row);
                }
                Ok(QueryEvent::Done(_)) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        debug!(
            row_count = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Rows fetched"
        );
        Ok(rows)
    }

    /// Fetch the first row produced by a statement, if any.
    ///
    /// The remaining rows are still read, and dropped as they arrive.
    pub async fn fetch_one(
        &self,
        conn: &mut dyn Connection,
        sql: &str,
        params: &Params,
    ) -> DbResult<Option<Row>> {
        let start = Instant::now();
        let statement = prepare(sql, params)?;
        debug!(sql = %sql, params = params.len(), "Fetching first row");

        let mut first = None;
        let mut discarded = 0usize;
        let mut first_error = None;
        let mut events = conn.query(&statement);
        while let Some(event) = events.next().await {
            match event {
                Ok(QueryEvent::Row { mut row, types }) => {
                    if first.is_some() {
                        discarded += 1;
                        continue;
                    }
                    if let (true, Some(types)) = (self.coerce_types, types) {
                        convert_row(&mut row, &types);
                    }
                    first = Some(row);
                }
                Ok(QueryEvent::Done(_)) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        debug!(
            found = first.is_some(),
            discarded = discarded,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "First row fetched"
        );
        Ok(first)
    }
}
