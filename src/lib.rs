//! txpool
//!
//! A transaction manager in front of a fixed set of database sessions
//! (MySQL/MariaDB or SQLite). Callers check a session out with `begin`, run
//! statements on it, and end with `commit` or `rollback`, which always returns
//! the session to the pool. Callers that find the pool empty are queued and
//! served in arrival order.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, ManagerConfig};
pub use db::{BasicSession, PoolStatus, Session, TransactionManager};
pub use error::{DbError, DbResult};
pub use models::{ExecInfo, Params, QueryParam, Row, Value};
