//! Database layer.
//!
//! This module provides:
//! - The driver seam (`Driver`, `Connection`) and its sqlx implementation
//! - Named parameter rewriting
//! - Statement execution and result shaping
//! - Column type coercion
//! - The pooled transaction manager and the sessions it hands out

pub mod connection;
pub mod driver;
pub mod events;
pub mod executor;
pub mod manager;
pub mod params;
pub mod session;
pub mod types;

pub use connection::{Connection, Driver, QueryEvent};
pub use driver::{DbConnection, SqlxDriver};
pub use events::{EventHub, ListenerId};
pub use executor::QueryExecutor;
pub use manager::{PoolStatus, TransactionManager};
pub use session::{BasicSession, FinalCommand, Session};
pub use types::{TypeCategory, categorize_type, convert_row};
