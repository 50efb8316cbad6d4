/// Concurrent access tests
///
/// Many sessions sharing one connection source from multiple threads.
/// Run with: cargo test --test concurrent_access_tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use txsession::testing::ScriptedDriver;
use txsession::{ConnectionConfig, ConnectionPool, DbError, Session};

fn scripted_pool(max: usize, timeout: Duration) -> (Arc<ConnectionPool>, ScriptedDriver) {
    let driver = ScriptedDriver::new();
    let config = ConnectionConfig::new("memory", "scripted")
        .max_active(max)
        .connect_timeout(timeout);
    let pool = ConnectionPool::with_driver(config, Arc::new(driver.clone())).unwrap();
    (Arc::new(pool), driver)
}

#[test]
fn test_outstanding_count_matches_holders() {
    let (pool, _driver) = scripted_pool(4, Duration::from_millis(20));
    let mut sessions: Vec<Session<'static>> =
        (0..4).map(|_| Session::pooled(Arc::clone(&pool))).collect();

    let mut holders = 0;
    for (i, session) in sessions.iter_mut().enumerate() {
        match i % 4 {
            0 => {
                session.get_connection().unwrap();
                holders += 1;
            }
            1 => {
                session.begin_tx().unwrap();
                holders += 1;
            }
            2 => {
                session.begin_tx().unwrap();
                session.commit_tx().unwrap();
            }
            _ => {
                session.get_connection().unwrap();
                session.close();
            }
        }
        assert_eq!(pool.outstanding_count(), holders);
        assert!(pool.outstanding_count() <= pool.capacity());
    }

    sessions[1].rollback_tx().unwrap();
    assert_eq!(pool.outstanding_count(), 1);
    drop(sessions);
    assert_eq!(pool.outstanding_count(), 0);
}

#[test]
fn test_concurrent_sessions_respect_capacity() {
    let capacity = 3;
    let (pool, driver) = scripted_pool(capacity, Duration::from_secs(5));
    let peak = AtomicUsize::new(0);
    let workers = 12;

    thread::scope(|scope| {
        for worker in 0..workers {
            let pool = Arc::clone(&pool);
            let peak = &peak;
            scope.spawn(move || {
                let mut session = Session::pooled(Arc::clone(&pool));
                for round in 0..20 {
                    session.begin_tx().unwrap();
                    let now = pool.outstanding_count();
                    peak.fetch_max(now, Ordering::SeqCst);
                    assert!(now <= pool.capacity());
                    session
                        .execute(&format!("INSERT INTO t VALUES ({worker}, {round})"))
                        .unwrap();
                    if round % 2 == 0 {
                        session.commit_tx().unwrap();
                    } else {
                        session.rollback_tx().unwrap();
                    }
                }
            });
        }
    });

    assert_eq!(pool.outstanding_count(), 0);
    assert_eq!(driver.live_connections(), 0);
    assert!(peak.load(Ordering::SeqCst) <= capacity);
    assert_eq!(driver.executed().len(), workers * 20);
}

#[test]
fn test_exhausted_pool_reports_acquisition_error() {
    let (pool, _driver) = scripted_pool(2, Duration::from_millis(30));
    let barrier = Barrier::new(3);

    thread::scope(|scope| {
        for _ in 0..2 {
            let pool = Arc::clone(&pool);
            let barrier = &barrier;
            scope.spawn(move || {
                let mut session = Session::pooled(pool);
                session.begin_tx().unwrap();
                barrier.wait();
                // hold until the main thread has observed exhaustion
                barrier.wait();
                session.commit_tx().unwrap();
            });
        }

        barrier.wait();
        let mut late = Session::pooled(Arc::clone(&pool));
        assert!(matches!(late.get_connection(), Err(DbError::Acquisition(_))));
        assert_eq!(pool.outstanding_count(), 2);
        barrier.wait();
    });

    assert_eq!(pool.outstanding_count(), 0);
}
