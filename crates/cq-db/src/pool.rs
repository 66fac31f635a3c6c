//! Bounded pool of exclusive connections.
//!
//! A `tokio::sync::Semaphore` bounds the number of outstanding leases; idle
//! connections wait in a mutex-guarded list. Acquiring at capacity waits for a
//! release instead of failing.

use crate::error::{DbError, DbResult};
use crate::traits::Connector;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct PoolInner<C: Connector> {
    connector: C,
    idle: Mutex<Vec<C::Connection>>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl<C: Connector> PoolInner<C> {
    fn return_connection(&self, conn: C::Connection) {
        self.idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(conn);
    }
}

/// A fixed-size connection pool. Cloning shares the pool.
pub struct ResourcePool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for ResourcePool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> ResourcePool<C> {
    /// Open `size` connections up front.
    pub fn new(connector: C, size: usize) -> DbResult<Self> {
        if size == 0 {
            return Err(DbError::ConnectionError(
                "pool size must be at least 1".to_string(),
            ));
        }

        let mut idle = Vec::with_capacity(size);
        for _ in 0..size {
            idle.push(connector.connect()?);
        }
        log::debug!("Opened {} {} connection(s)", size, connector.db_type());

        Ok(Self {
            inner: Arc::new(PoolInner {
                connector,
                idle: Mutex::new(idle),
                permits: Arc::new(Semaphore::new(size)),
                capacity: size,
            }),
        })
    }

    /// Wait for a free connection.
    pub async fn acquire(&self) -> DbResult<Lease<C>> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| DbError::PoolClosed)?;
        self.checkout(permit)
    }

    /// Take a free connection if one is available right now.
    pub fn try_acquire(&self) -> DbResult<Option<Lease<C>>> {
        match Arc::clone(&self.inner.permits).try_acquire_owned() {
            Ok(permit) => self.checkout(permit).map(Some),
            Err(tokio::sync::TryAcquireError::NoPermits) => Ok(None),
            Err(tokio::sync::TryAcquireError::Closed) => Err(DbError::PoolClosed),
        }
    }

    fn checkout(&self, permit: OwnedSemaphorePermit) -> DbResult<Lease<C>> {
        let idle = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop();
        let conn = match idle {
            Some(conn) => conn,
            None => {
                log::warn!("Replacing a lost {} connection", self.inner.connector.db_type());
                self.inner.connector.connect()?
            }
        };
        Ok(Lease {
            conn: Some(conn),
            permit: Some(permit),
            pool: Arc::clone(&self.inner),
        })
    }

    /// Return a lease's connection. Releasing twice is a no-op.
    pub fn release(&self, lease: &mut Lease<C>) {
        lease.release();
    }

    /// Stop handing out connections; waiting acquires fail with `PoolClosed`.
    pub fn close(&self) {
        self.inner.permits.close();
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Leases that could be granted without waiting.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    pub fn db_type(&self) -> &'static str {
        self.inner.connector.db_type()
    }
}

/// Exclusive handle to one pooled connection.
///
/// The connection goes back to the pool on the first `release()` or on drop,
/// whichever comes first.
pub struct Lease<C: Connector> {
    conn: Option<C::Connection>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner<C>>,
}

impl<C: Connector> Lease<C> {
    pub fn is_released(&self) -> bool {
        self.permit.is_none()
    }

    pub fn connection_mut(&mut self) -> DbResult<&mut C::Connection> {
        self.conn.as_mut().ok_or(DbError::LeaseReleased)
    }

    /// Give the connection back to the pool.
    pub fn release(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        match self.conn.take() {
            Some(conn) => self.pool.return_connection(conn),
            None => log::warn!("Lease released without its connection; it will be reopened"),
        }
        // The connection is back before the permit frees a waiter.
        drop(permit);
    }

    pub(crate) fn take_connection(&mut self) -> DbResult<C::Connection> {
        if self.is_released() {
            return Err(DbError::LeaseReleased);
        }
        self.conn.take().ok_or(DbError::LeaseReleased)
    }

    pub(crate) fn restore_connection(&mut self, conn: C::Connection) {
        if self.is_released() {
            self.pool.return_connection(conn);
        } else {
            self.conn = Some(conn);
        }
    }

    /// Run blocking work on this lease's connection in a worker thread.
    ///
    /// The connection comes back once `f` returns. If the worker panics the
    /// connection is lost and the pool opens a replacement later.
    pub async fn run_blocking<F, T>(&mut self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut C::Connection) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = self.take_connection()?;
        let joined = tokio::task::spawn_blocking(move || {
            let result = f(&mut conn);
            (conn, result)
        })
        .await;

        match joined {
            Ok((conn, result)) => {
                self.restore_connection(conn);
                result
            }
            Err(e) => Err(DbError::Internal(format!("database worker failed: {e}"))),
        }
    }
}

impl<C: Connector> Drop for Lease<C> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod tests;
