//! Read-only `DuckDB` connection pool.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const PING_SQL: &str = "SELECT 1";

/// A pooled connection and the moment it was opened.
pub struct PooledConnection {
    conn: duckdb::Connection,
    opened_at: Instant,
}

impl PooledConnection {
    fn open(path: &Path) -> Result<Self, duckdb::Error> {
        let conn = duckdb::Connection::open_with_flags(
            path,
            duckdb::Config::default().access_mode(duckdb::AccessMode::ReadOnly)?,
        )?;
        Ok(Self {
            conn,
            opened_at: Instant::now(),
        })
    }

    fn is_healthy(&self, max_age: Duration, ping: &str) -> bool {
        self.opened_at.elapsed() < max_age
            && self
                .conn
                .query_row(ping, [], |row| row.get::<_, i32>(0))
                .is_ok()
    }
}

impl Deref for PooledConnection {
    type Target = duckdb::Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

/// Fixed-size pool of read-only connections handed out round-robin.
///
/// `duckdb::Connection` is `Send` but not `Sync`, so each connection sits
/// behind its own `Mutex`. Every acquire pings the connection and reopens
/// it when the ping fails or the connection is older than the maximum age.
pub struct DuckDbPool {
    path: PathBuf,
    connections: Vec<Mutex<PooledConnection>>,
    next: AtomicUsize,
    max_age: Duration,
    ping: &'static str,
}

impl DuckDbPool {
    /// Opens `size` (at least one) read-only connections to the file at
    /// `path`.
    ///
    /// # Errors
    ///
    /// * If any connection fails to open
    pub fn open(path: &Path, size: usize, max_age: Duration) -> Result<Self, duckdb::Error> {
        let connections = (0..size.max(1))
            .map(|_| PooledConnection::open(path).map(Mutex::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            connections,
            next: AtomicUsize::new(0),
            max_age,
            ping: PING_SQL,
        })
    }

    /// Number of connections.
    #[must_use]
    pub fn size(&self) -> usize {
        self.connections.len()
    }

    /// Acquires the next connection, reopening it first if it is stale.
    ///
    /// # Errors
    ///
    /// * If a stale connection cannot be reopened
    pub fn acquire(&self) -> Result<MutexGuard<'_, PooledConnection>, duckdb::Error> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        let mut guard = self.connections[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !guard.is_healthy(self.max_age, self.ping) {
            log::debug!("Recycling DuckDB connection {idx}");
            *guard = PooledConnection::open(&self.path)?;
        }

        Ok(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("crash_map_pool_{}.duckdb", uuid::Uuid::new_v4()));
        let conn = duckdb::Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1), (2);")
            .unwrap();
        drop(conn);
        path
    }

    fn count(pool: &DuckDbPool) -> i64 {
        pool.acquire()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn hands_out_working_read_only_connections() {
        let path = temp_db();
        let pool = DuckDbPool::open(&path, 3, Duration::from_secs(60)).unwrap();

        assert_eq!(pool.size(), 3);
        for _ in 0..5 {
            assert_eq!(count(&pool), 2);
        }
        assert!(
            pool.acquire()
                .unwrap()
                .execute_batch("INSERT INTO t VALUES (3)")
                .is_err()
        );

        drop(pool);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn recycles_connections_past_max_age() {
        let path = temp_db();
        let pool = DuckDbPool::open(&path, 0, Duration::ZERO).unwrap();

        assert_eq!(pool.size(), 1);
        let before = pool.acquire().unwrap().opened_at;
        let after = pool.acquire().unwrap().opened_at;
        assert!(after > before);
        assert_eq!(count(&pool), 2);

        drop(pool);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reopens_connections_that_fail_the_ping() {
        let path = temp_db();
        let mut pool = DuckDbPool::open(&path, 1, Duration::from_secs(60)).unwrap();

        let first = pool.acquire().unwrap().opened_at;
        assert_eq!(pool.acquire().unwrap().opened_at, first);

        std::thread::sleep(Duration::from_millis(5));
        pool.ping = "SELECT missing_column";
        let reopened = pool.acquire().unwrap().opened_at;
        assert!(reopened > first);
        assert_eq!(count(&pool), 2);

        pool.ping = PING_SQL;
        let settled = pool.acquire().unwrap().opened_at;
        assert_eq!(pool.acquire().unwrap().opened_at, settled);

        drop(pool);
        let _ = std::fs::remove_file(&path);
    }
}
