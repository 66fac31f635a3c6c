use super::*;
use crate::duckdb::DuckDbConnector;
use crate::output::ColumnDescriptor;
use crate::pool::ResourcePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Connection whose queries take `work` to finish, echoing the SQL back.
struct SlowConnector {
    work: Duration,
    honour_cancel: bool,
    panics: bool,
    finished: Arc<AtomicUsize>,
}

struct SlowConnection {
    work: Duration,
    honour_cancel: bool,
    panics: bool,
    finished: Arc<AtomicUsize>,
}

impl Connector for SlowConnector {
    type Connection = SlowConnection;

    fn connect(&self) -> DbResult<SlowConnection> {
        Ok(SlowConnection {
            work: self.work,
            honour_cancel: self.honour_cancel,
            panics: self.panics,
            finished: Arc::clone(&self.finished),
        })
    }

    fn db_type(&self) -> &'static str {
        "slow"
    }
}

impl QueryConnection for SlowConnection {
    fn query(&mut self, sql: &str, cancel: &CancellationToken) -> DbResult<QueryOutput> {
        let start = Instant::now();
        while start.elapsed() < self.work {
            if self.honour_cancel && cancel.is_cancelled() {
                self.finished.fetch_add(1, Ordering::SeqCst);
                return Err(DbError::Cancelled);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self.panics {
            panic!("worker crashed");
        }
        Ok(QueryOutput {
            columns: vec![ColumnDescriptor::new("sql")],
            rows: vec![vec![sql.to_string()]],
        })
    }

    fn execute_batch(&mut self, _sql: &str) -> DbResult<()> {
        Ok(())
    }
}

fn slow_pool(work: Duration, honour_cancel: bool) -> (ResourcePool<SlowConnector>, Arc<AtomicUsize>) {
    connector_pool(work, honour_cancel, false)
}

fn connector_pool(
    work: Duration,
    honour_cancel: bool,
    panics: bool,
) -> (ResourcePool<SlowConnector>, Arc<AtomicUsize>) {
    let finished = Arc::new(AtomicUsize::new(0));
    let connector = SlowConnector {
        work,
        honour_cancel,
        panics,
        finished: Arc::clone(&finished),
    };
    (ResourcePool::new(connector, 1).unwrap(), finished)
}

#[tokio::test]
async fn test_completes_within_timeout() {
    let (pool, finished) = slow_pool(Duration::from_millis(20), true);
    let executor = QueryExecutor::new(Duration::from_secs(5));

    let lease = pool.acquire().await.unwrap();
    let output = executor.execute(lease, "SELECT 1").await.unwrap();

    assert_eq!(output.rows, vec![vec!["SELECT 1".to_string()]]);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn test_times_out_and_cancels_worker() {
    let (pool, finished) = slow_pool(Duration::from_secs(10), true);
    let executor = QueryExecutor::new(Duration::from_secs(60));

    let started = Instant::now();
    let lease = pool.acquire().await.unwrap();
    let err = executor
        .execute_with_timeout(lease, "SELECT slow", Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::TimedOut { timeout_ms: 50 }));
    assert!(started.elapsed() < Duration::from_secs(5));
    // The worker has stopped and its connection is back in the pool.
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn test_waits_for_worker_that_ignores_cancellation() {
    let (pool, finished) = slow_pool(Duration::from_millis(300), false);
    let executor = QueryExecutor::new(Duration::from_millis(20));

    let started = Instant::now();
    let lease = pool.acquire().await.unwrap();
    let err = executor.execute(lease, "SELECT stubborn").await.unwrap_err();

    assert!(matches!(err, DbError::TimedOut { .. }));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(finished.load(Ordering::SeqCst), 1);

    // The connection is reusable afterwards.
    let lease = pool.try_acquire().unwrap().unwrap();
    let executor = QueryExecutor::new(Duration::from_secs(5));
    assert!(executor.execute(lease, "SELECT again").await.is_ok());
}

#[tokio::test]
async fn test_worker_panic_after_deadline_loses_only_the_connection() {
    let (pool, finished) = connector_pool(Duration::from_millis(100), false, true);
    let executor = QueryExecutor::new(Duration::from_millis(10));

    let lease = pool.acquire().await.unwrap();
    let err = executor.execute(lease, "SELECT crash").await.unwrap_err();

    assert!(matches!(err, DbError::TimedOut { timeout_ms: 10 }));
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(pool.available(), 1);

    // The pool opens a replacement for the lost connection.
    let mut lease = pool.acquire().await.unwrap();
    assert!(!lease.is_released());
    assert!(lease.connection_mut().is_ok());
}

#[tokio::test]
async fn test_duckdb_rows_returned() {
    let pool = ResourcePool::new(DuckDbConnector::in_memory().unwrap(), 2).unwrap();
    let executor = QueryExecutor::new(Duration::from_secs(30));

    let lease = pool.acquire().await.unwrap();
    let output = executor
        .execute(lease, "SELECT n, n * 2 AS doubled FROM range(3) t(n) ORDER BY n")
        .await
        .unwrap();

    assert_eq!(output.column_names(), vec!["n", "doubled"]);
    assert_eq!(
        output.rows,
        vec![vec!["0", "0"], vec!["1", "2"], vec!["2", "4"]]
    );
    assert_eq!(pool.available(), 2);
}

#[tokio::test]
async fn test_duckdb_error_releases_lease() {
    let pool = ResourcePool::new(DuckDbConnector::in_memory().unwrap(), 1).unwrap();
    let executor = QueryExecutor::new(Duration::from_secs(30));

    let lease = pool.acquire().await.unwrap();
    let err = executor
        .execute(lease, "SELECT missing_column FROM range(1)")
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::ExecutionError(_)));
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn test_duckdb_long_query_times_out() {
    let connector = DuckDbConnector::in_memory().unwrap().with_poll_interval(100);
    let pool = ResourcePool::new(connector, 1).unwrap();
    let executor = QueryExecutor::new(Duration::from_millis(1));

    let lease = pool.acquire().await.unwrap();
    let err = executor
        .execute(lease, "SELECT n, n::VARCHAR AS label FROM range(5000000) t(n)")
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::TimedOut { timeout_ms: 1 }));
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn test_duckdb_single_row_aggregate_is_interrupted() {
    let pool = ResourcePool::new(DuckDbConnector::in_memory().unwrap(), 1).unwrap();
    let executor = QueryExecutor::new(Duration::from_millis(100));

    // One output row, produced only after the whole scan.
    let started = Instant::now();
    let lease = pool.acquire().await.unwrap();
    let err = executor
        .execute(lease, "SELECT SUM(hash(n)) FROM range(100000000000) t(n)")
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::TimedOut { timeout_ms: 100 }));
    assert!(started.elapsed() < Duration::from_secs(20));
    assert_eq!(pool.available(), 1);

    // The interrupt does not leak into the next query on the connection.
    let executor = QueryExecutor::new(Duration::from_secs(30));
    let lease = pool.acquire().await.unwrap();
    let output = executor.execute(lease, "SELECT 42 AS answer").await.unwrap();
    assert_eq!(output.rows, vec![vec!["42"]]);
}
