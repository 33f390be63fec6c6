#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use netns_kit::NetNs;
    use parking_lot::Mutex;

    use crate::error::FabricError;
    use crate::pool::TaskPool;

    #[test]
    fn test_runs_every_task() {
        let pool = TaskPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..500 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .unwrap();
        }
        pool.wait();
        assert_eq!(counter.load(Ordering::Relaxed), 500);
        assert!(!pool.has_error());
        assert!(pool.drain_errors().is_empty());
    }

    #[test]
    fn test_wait_without_tasks_returns() {
        let pool = TaskPool::new(2).unwrap();
        pool.wait();
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_zero_size_gets_one_worker() {
        assert_eq!(TaskPool::new(0).unwrap().size(), 1);
    }

    #[test]
    fn test_failures_do_not_stop_siblings() {
        let pool = TaskPool::new(3).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for i in 0..20 {
            let done = Arc::clone(&done);
            pool.submit(move || {
                done.fetch_add(1, Ordering::Relaxed);
                if i % 5 == 0 {
                    return Err(FabricError::Config(format!("task {i}")));
                }
                Ok(())
            })
            .unwrap();
        }
        pool.wait();

        assert_eq!(done.load(Ordering::Relaxed), 20);
        assert!(pool.has_error());
        let mut failed: Vec<String> = pool.drain_errors().iter().map(|e| e.to_string()).collect();
        failed.sort();
        assert_eq!(failed.len(), 4);
        assert!(failed.iter().all(|m| m.starts_with("invalid configuration: task")));

        // The flag stays set after draining.
        assert!(pool.has_error());
        assert!(pool.drain_errors().is_empty());
    }

    #[test]
    fn test_panicking_task_is_reported() {
        let pool = TaskPool::new(1).unwrap();
        pool.submit(|| panic!("boom")).unwrap();
        let after = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&after);
        pool.submit(move || {
            flag.store(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
        pool.wait();

        let errors = pool.drain_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], FabricError::TaskPanicked(msg) if msg == "boom"));
        // The single worker survived the panic.
        assert_eq!(after.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_tasks_run_on_named_workers_in_home_namespace() {
        let home = NetNs::current().unwrap().id();
        let pool = TaskPool::new(2).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..10 {
            let seen = Arc::clone(&seen);
            pool.submit(move || {
                let name = thread::current().name().unwrap_or_default().to_string();
                let ns = NetNs::current()
                    .map_err(|e| FabricError::namespace("current", e))?
                    .id();
                seen.lock().push((name, ns));
                Ok(())
            })
            .unwrap();
        }
        pool.wait();

        let seen = seen.lock();
        assert_eq!(seen.len(), 10);
        for (name, ns) in seen.iter() {
            assert!(name.starts_with("netfab-worker-"), "{name}");
            assert_eq!(*ns, home);
        }
    }

    #[test]
    fn test_wait_is_a_barrier() {
        let pool = TaskPool::new(4).unwrap();
        let finished = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let finished = Arc::clone(&finished);
            pool.submit(move || {
                thread::sleep(Duration::from_millis(20));
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }
        pool.wait();
        assert_eq!(finished.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_drop_joins_workers() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = TaskPool::new(2).unwrap();
            for _ in 0..16 {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
            }
        }
        // Queued tasks drain before the workers exit.
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }
}
