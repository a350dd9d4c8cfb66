// ==============================================
// CACHE CONCURRENCY TESTS (integration)
// ==============================================
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ttlkit::builder::CacheBuilder;
use ttlkit::item::Ttl;

mod mixed_operations {
    use super::*;

    #[test]
    fn test_basic_thread_safe_operations() {
        let cache = CacheBuilder::new()
            .capacity(100)
            .default_ttl(Duration::from_secs(5))
            .build();
        let num_threads = 8;
        let operations_per_thread = 250;
        let success_count = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..num_threads)
            .map(|thread_id| {
                let cache = cache.clone();
                let success_count = Arc::clone(&success_count);

                thread::spawn(move || {
                    for i in 0..operations_per_thread {
                        match i % 4 {
                            0 => {
                                let key = format!("thread_{}_{}", thread_id, i);
                                let value = format!("value_{}_{}", thread_id, i);
                                cache.insert(key, value, Ttl::Default);
                                success_count.fetch_add(1, Ordering::SeqCst);
                            }
                            1 => {
                                let key = format!("thread_{}_0", thread_id);
                                if cache.get(&key).is_some() {
                                    success_count.fetch_add(1, Ordering::SeqCst);
                                }
                            }
                            2 => {
                                let key = format!("thread_{}_{}", thread_id, i - 2);
                                if cache.touch(&key) {
                                    success_count.fetch_add(1, Ordering::SeqCst);
                                }
                            }
                            _ => {
                                let key = format!("thread_{}_{}", thread_id, i - 3);
                                cache.remove(&key);
                                success_count.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 100);
        assert!(success_count.load(Ordering::SeqCst) > 0);

        let snapshot = cache.metrics_snapshot();
        assert!(snapshot.insertions >= 100);
        assert_eq!(snapshot.cache_len, cache.len());
    }

    #[test]
    fn test_capacity_enforced_under_contention() {
        let cache = CacheBuilder::new().capacity(64).build();
        let num_threads = 8;
        let inserts_per_thread = 200u64;

        let handles: Vec<_> = (0..num_threads)
            .map(|thread_id| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..inserts_per_thread {
                        cache.insert(format!("{}:{}", thread_id, i), i, Ttl::Never);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 64);
        let snapshot = cache.metrics_snapshot();
        assert_eq!(snapshot.insertions, 8 * 200);
        assert_eq!(snapshot.evictions, 8 * 200 - 64);
    }

    #[test]
    fn test_clear_races_with_inserts() {
        let cache = CacheBuilder::new().build();

        let writers: Vec<_> = (0..4)
            .map(|thread_id| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..500u64 {
                        cache.insert(format!("{}:{}", thread_id, i), i, Ttl::Never);
                    }
                })
            })
            .collect();

        for _ in 0..10 {
            thread::sleep(Duration::from_millis(2));
            cache.clear();
        }

        for handle in writers {
            handle.join().unwrap();
        }
        cache.clear();

        assert!(cache.is_empty());
        let snapshot = cache.metrics_snapshot();
        assert_eq!(snapshot.insertions, 4 * 500);
        // everything inserted was eventually evicted
        assert_eq!(snapshot.evictions, snapshot.insertions);
    }
}

mod with_driver {
    use super::*;

    #[test]
    fn test_driver_runs_alongside_writers() {
        let cache = CacheBuilder::new()
            .default_ttl(Duration::from_millis(30))
            .build();

        let driver = {
            let cache = cache.clone();
            thread::spawn(move || cache.start().unwrap())
        };

        let writers: Vec<_> = (0..4)
            .map(|thread_id| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..50u64 {
                        cache.insert(format!("{}:{}", thread_id, i), i, Ttl::Default);
                        thread::sleep(Duration::from_millis(1));
                    }
                })
            })
            .collect();

        for handle in writers {
            handle.join().unwrap();
        }
        thread::sleep(Duration::from_millis(300));

        // every short-lived item has been swept
        assert!(cache.is_empty());
        assert_eq!(cache.metrics_snapshot().evictions, 4 * 50);

        cache.stop();
        driver.join().unwrap();
    }

    #[test]
    fn test_observers_fire_once_per_event_across_threads() {
        let insertions = Arc::new(AtomicUsize::new(0));
        let evictions = Arc::new(AtomicUsize::new(0));
        let cache = CacheBuilder::new().capacity(32).build();
        {
            let insertions = Arc::clone(&insertions);
            cache.on_insertion(move |_| {
                insertions.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let evictions = Arc::clone(&evictions);
            cache.on_eviction(move |_, _| {
                evictions.fetch_add(1, Ordering::SeqCst);
            });
        }

        let handles: Vec<_> = (0..4)
            .map(|thread_id| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..100u64 {
                        cache.insert(format!("{}:{}", thread_id, i), i, Ttl::Never);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(insertions.load(Ordering::SeqCst), 400);
        assert_eq!(evictions.load(Ordering::SeqCst), 400 - 32);
        assert_eq!(
            cache.metrics_snapshot().evictions,
            evictions.load(Ordering::SeqCst) as u64
        );
    }
}
