//! Transaction manager.
//!
//! The manager owns a dedicated session for ad-hoc statements and a fixed set
//! of pooled sessions with auto-commit turned off. [`TransactionManager::begin`]
//! checks a pooled session out, or queues the caller until a commit or rollback
//! frees one. Queued callers are served strictly in arrival order.
//!
//! # Locking
//!
//! The pool and the queue sit behind one `std::sync::Mutex` that is never held
//! across an `.await`. The dedicated session has its own async mutex, held for
//! the duration of a statement.

use crate::config::ManagerConfig;
use crate::db::connection::{Connection, Driver};
use crate::db::driver::SqlxDriver;
use crate::db::events::{EventHub, ListenerId};
use crate::db::executor::QueryExecutor;
use crate::db::session::{BasicSession, Session};
use crate::error::{DbError, DbResult};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// A pooled session waiting in the pool, tagged with its stable slot id.
pub(crate) struct PooledConn {
    pub(crate) id: u64,
    pub(crate) conn: Box<dyn Connection>,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<PooledConn>,
    queue: VecDeque<oneshot::Sender<Session>>,
}

/// State shared between the manager and the sessions it hands out.
pub(crate) struct Shared {
    config: ManagerConfig,
    driver: Arc<dyn Driver>,
    executor: QueryExecutor,
    events: EventHub,
    state: Mutex<PoolState>,
    dedicated: tokio::sync::Mutex<Option<Box<dyn Connection>>>,
    started: AtomicBool,
    ready: AtomicBool,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub(crate) fn dedicated(&self) -> &tokio::sync::Mutex<Option<Box<dyn Connection>>> {
        &self.dedicated
    }

    /// Broadcast connectivity failures to error observers, passing the result through.
    pub(crate) fn observe<T>(&self, result: DbResult<T>) -> DbResult<T> {
        match &result {
            Err(e) if e.is_connectivity() => self.events.emit_error(e),
            _ => {}
        }
        result
    }

    /// Return a session to the pool, then serve the queue.
    pub(crate) fn release(self: &Arc<Self>, id: u64, conn: Box<dyn Connection>) {
        let mut state = self.state();
        state.idle.push_back(PooledConn { id, conn });
        debug!(session_id = id, idle = state.idle.len(), "Session returned to pool");
        self.check_queue(&mut state);
    }

    /// Hand idle sessions to the oldest live waiters.
    fn check_queue(self: &Arc<Self>, state: &mut PoolState) {
        while !state.idle.is_empty() {
            let Some(waiter) = state.queue.pop_front() else {
                return;
            };
            if waiter.is_closed() {
                continue;
            }
            let Some(pooled) = state.idle.pop_front() else {
                return;
            };

            let session = Session::checkout(pooled, self.clone());
            let session_id = session.id();
            let transaction_id = session.transaction_id().to_string();
            match waiter.send(session) {
                Ok(()) => info!(
                    session_id = session_id,
                    transaction_id = %transaction_id,
                    waiting = state.queue.len(),
                    "Queued transaction started"
                ),
                // The waiter went away between the check and the send
                Err(session) => {
                    if let Some(pooled) = session.into_pooled() {
                        state.idle.push_front(pooled);
                    }
                }
            }
        }
    }

    /// Open one pooled session and admit it to the pool.
    async fn open_pooled(self: Arc<Self>, id: u64) -> DbResult<()> {
        let opened = async {
            let mut conn = self.driver.connect(&self.config.connection).await?;
            if let Err(e) = conn.disable_autocommit().await {
                if let Err(close_err) = conn.close().await {
                    debug!(session_id = id, error = %close_err, "Failed to close rejected session");
                }
                return Err(e);
            }
            Ok(conn)
        }
        .await;

        match opened {
            Ok(conn) => {
                debug!(session_id = id, "Pooled session connected");
                self.release(id, conn);
                Ok(())
            }
            Err(e) => {
                error!(session_id = id, error = %e, "Failed to open pooled session");
                self.events.emit_error(&e);
                Err(e)
            }
        }
    }
}

/// Snapshot of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Sessions idle in the pool
    pub idle: usize,
    /// Callers queued for a session
    pub waiting: usize,
    /// Configured number of pooled sessions
    pub capacity: usize,
    /// Initialization completed and the manager is not closed
    pub ready: bool,
}

/// Pooled transaction manager.
///
/// Cloning is cheap; all clones share the same pool.
#[derive(Clone)]
pub struct TransactionManager {
    shared: Arc<Shared>,
}

impl TransactionManager {
    /// Create a manager backed by the sqlx drivers. Nothing connects until [`init`](Self::init).
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_driver(config, Arc::new(SqlxDriver))
    }

    /// Create a manager with a custom session driver.
    pub fn with_driver(config: ManagerConfig, driver: Arc<dyn Driver>) -> Self {
        let executor = QueryExecutor::new(config.metadata);
        Self {
            shared: Arc::new(Shared {
                config,
                driver,
                executor,
                events: EventHub::new(),
                state: Mutex::new(PoolState::default()),
                dedicated: tokio::sync::Mutex::new(None),
                started: AtomicBool::new(false),
                ready: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Connect the dedicated session, then every pooled session in parallel.
    ///
    /// Resolves once all pooled sessions are idle in the pool. The first
    /// failure rejects the call; every failure, including later ones, is also
    /// sent to error observers.
    ///
    /// A manager that failed to open its dedicated session can be initialized
    /// again. Once pooled sessions have been attempted, later calls are rejected.
    pub async fn init(&self) -> DbResult<()> {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(DbError::invalid_input(
                "Transaction manager is already initialized",
            ));
        }

        let config = &self.shared.config;
        info!(
            db_type = %config.connection.db_type,
            url = %config.connection.masked_connection_string(),
            poolsize = config.poolsize,
            metadata = config.metadata,
            "Initializing transaction manager"
        );

        let dedicated = match self.shared.driver.connect(&config.connection).await {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "Failed to open dedicated session");
                self.shared.events.emit_error(&e);
                self.shared.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        *self.shared.dedicated.lock().await = Some(dedicated);

        if config.poolsize > 0 {
            let (tx, mut rx) = mpsc::unbounded_channel();
            for id in 0..config.poolsize as u64 {
                let shared = self.shared.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(shared.open_pooled(id).await);
                });
            }
            drop(tx);

            // Stragglers keep running after a failure and report to observers
            while let Some(result) = rx.recv().await {
                result?;
            }
        }

        self.shared.ready.store(true, Ordering::SeqCst);
        info!(poolsize = config.poolsize, "Transaction manager initialized");
        self.shared.events.emit_ready();
        Ok(())
    }

    /// Check out a pooled session for a transaction.
    ///
    /// Resolves at once when a session is idle. Otherwise the caller waits, with
    /// no timeout, until a commit or rollback frees a session for it.
    pub async fn begin(&self) -> DbResult<Session> {
        let waiter = {
            let mut state = self.shared.state();
            if let Some(pooled) = state.idle.pop_front() {
                let session = Session::checkout(pooled, self.shared.clone());
                info!(
                    session_id = session.id(),
                    transaction_id = %session.transaction_id(),
                    idle = state.idle.len(),
                    "Transaction started"
                );
                return Ok(session);
            }

            let (tx, rx) = oneshot::channel();
            state.queue.retain(|w| !w.is_closed());
            state.queue.push_back(tx);
            info!(waiting = state.queue.len(), "No idle session, transaction queued");
            rx
        };

        waiter
            .await
            .map_err(|_| DbError::internal("Transaction manager dropped a queued transaction"))
    }

    /// Access the dedicated non-transactional session.
    pub fn basic(&self) -> DbResult<BasicSession> {
        if !self.shared.ready.load(Ordering::SeqCst) {
            return Err(DbError::not_ready(
                "Transaction manager has not finished initializing",
            ));
        }
        Ok(BasicSession::new(self.shared.clone()))
    }

    /// Terminate the dedicated session and every idle pooled session.
    ///
    /// Checked-out sessions are not tracked and stay open, and queued callers
    /// keep waiting. Termination runs in the background; this returns once it
    /// has been requested. A basic statement still running keeps the dedicated
    /// session until it completes, and that session is closed right after.
    pub async fn close(&self) -> DbResult<()> {
        self.shared.ready.store(false, Ordering::SeqCst);

        let dedicated = match self.shared.dedicated.try_lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                debug!("Dedicated session busy, closing it once its statement completes");
                let shared = self.shared.clone();
                tokio::spawn(async move {
                    if let Some(conn) = shared.dedicated.lock().await.take() {
                        if let Err(e) = conn.close().await {
                            warn!(error = %e, "Failed to close session");
                        }
                    }
                });
                None
            }
        };
        let (idle, waiting) = {
            let mut state = self.shared.state();
            let idle: Vec<PooledConn> = state.idle.drain(..).collect();
            (idle, state.queue.len())
        };

        info!(
            dedicated = dedicated.is_some(),
            idle = idle.len(),
            waiting = waiting,
            "Closing transaction manager"
        );

        let sessions = dedicated
            .into_iter()
            .chain(idle.into_iter().map(|pooled| pooled.conn));
        for conn in sessions {
            tokio::spawn(async move {
                if let Err(e) = conn.close().await {
                    warn!(error = %e, "Failed to close session");
                }
            });
        }
        Ok(())
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.shared.state();
        PoolStatus {
            idle: state.idle.len(),
            waiting: state.queue.iter().filter(|w| !w.is_closed()).count(),
            capacity: self.shared.config.poolsize,
            ready: self.shared.ready.load(Ordering::SeqCst),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    /// Subscribe to connectivity errors.
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&DbError) + Send + Sync + 'static,
    {
        self.shared.events.on_error(listener)
    }

    /// Subscribe to the end of a successful [`init`](Self::init).
    pub fn on_ready<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.events.on_ready(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.events.unsubscribe(id)
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.shared.config)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionConfig;

    fn config(poolsize: usize) -> ManagerConfig {
        ManagerConfig::new(ConnectionConfig::new("sqlite::memory:").unwrap()).with_poolsize(poolsize)
    }

    #[test]
    fn test_new_manager_status() {
        let manager = TransactionManager::new(config(3));
        assert_eq!(
            manager.status(),
            PoolStatus {
                idle: 0,
                waiting: 0,
                capacity: 3,
                ready: false
            }
        );
    }

    #[test]
    fn test_basic_before_init_is_not_ready() {
        let manager = TransactionManager::new(config(1));
        assert!(matches!(manager.basic(), Err(DbError::NotReady { .. })));
    }

    #[tokio::test]
    async fn test_abandoned_waiters_are_pruned_on_enqueue() {
        let manager = TransactionManager::new(config(1));
        manager.init().await.unwrap();
        let held = manager.begin().await.unwrap();

        let mut abandoned: Vec<_> = (0..3).map(|_| tokio_test::task::spawn(manager.begin())).collect();
        for waiter in &mut abandoned {
            tokio_test::assert_pending!(waiter.poll());
        }
        assert_eq!(manager.shared.state().queue.len(), 3);
        drop(abandoned);

        let mut waiter = tokio_test::task::spawn(manager.begin());
        tokio_test::assert_pending!(waiter.poll());
        assert_eq!(manager.shared.state().queue.len(), 1);
        assert_eq!(manager.status().waiting, 1);

        held.commit().await.unwrap();
        assert!(waiter.is_woken());
        let next = tokio_test::assert_ready!(waiter.poll()).unwrap();
        next.rollback().await.unwrap();
        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_before_init_is_safe() {
        let manager = TransactionManager::new(config(2));
        manager.close().await.unwrap();
        assert!(!manager.is_ready());
    }
}
