//! Miss-handler strategy and its single-flight wrapper.
//!
//! A [`Loader`] is consulted by `get` when a key is absent or expired. It
//! receives the cache itself, so it may insert what it loads; the facade
//! releases the item lock before invoking it, making that re-entry safe.
//! The loader's result is returned to the caller as-is — loading does not
//! insert by itself.
//!
//! [`SuppressedLoader`] adds single-flight semantics on top of any loader:
//! concurrent loads of the same key share one underlying call.
//!
//! ## Flight Rendezvous
//!
//! ```text
//!   thread A (leader)              thread B..N (waiters)
//!   ─────────────────              ─────────────────────
//!   table lock: reserve flight     table lock: find flight
//!   run inner loader  ◄── only     wait on flight condvar
//!   publish result, notify_all ──► wake, clone result
//!   retire flight from table
//! ```
//!
//! Every waiter receives its own clone of the resulting view (the value
//! stays shared behind its `Arc`); an absent result fans out as `None`.
//! A leader that panics publishes `None` before the panic resumes, so
//! waiters never hang.

use std::hash::Hash;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::cache::Cache;
use crate::item::ItemView;

/// Strategy invoked by `get` on a miss.
pub trait Loader<K, V>: Send + Sync {
    /// Produces an item for `key`, or `None` if it cannot.
    ///
    /// The implementation may call [`Cache::insert`] if it wants the result
    /// cached.
    fn load(&self, cache: &Cache<K, V>, key: &K) -> Option<ItemView<K, V>>;
}

impl<K, V, F> Loader<K, V> for F
where
    F: Fn(&Cache<K, V>, &K) -> Option<ItemView<K, V>> + Send + Sync,
{
    fn load(&self, cache: &Cache<K, V>, key: &K) -> Option<ItemView<K, V>> {
        self(cache, key)
    }
}

enum FlightSlot<K, V> {
    Pending,
    Done(Option<ItemView<K, V>>),
}

struct Flight<K, V> {
    slot: Mutex<FlightSlot<K, V>>,
    ready: Condvar,
}

impl<K, V> Flight<K, V> {
    fn new() -> Self {
        Flight {
            slot: Mutex::new(FlightSlot::Pending),
            ready: Condvar::new(),
        }
    }

    fn publish(&self, result: Option<ItemView<K, V>>)
    where
        K: Clone,
    {
        let mut slot = self.slot.lock();
        *slot = FlightSlot::Done(result);
        self.ready.notify_all();
    }

    fn wait(&self) -> Option<ItemView<K, V>>
    where
        K: Clone,
    {
        let mut slot = self.slot.lock();
        loop {
            match &*slot {
                FlightSlot::Done(result) => return result.clone(),
                FlightSlot::Pending => self.ready.wait(&mut slot),
            }
        }
    }
}

/// Loader wrapper that collapses concurrent same-key loads into one call.
///
/// The first caller for a key becomes the leader and runs the inner
/// loader; callers arriving while that call is in flight block and
/// receive a clone of the leader's result. Once the flight retires, a
/// later load for the same key starts a fresh call.
pub struct SuppressedLoader<K, V, L> {
    inner: L,
    flights: Mutex<FxHashMap<K, Arc<Flight<K, V>>>>,
}

impl<K, V, L> SuppressedLoader<K, V, L> {
    pub fn new(inner: L) -> Self {
        SuppressedLoader {
            inner,
            flights: Mutex::new(FxHashMap::default()),
        }
    }

    /// Unwraps the inner loader.
    pub fn into_inner(self) -> L {
        self.inner
    }
}

impl<K, V, L> Loader<K, V> for SuppressedLoader<K, V, L>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Send + Sync,
    L: Loader<K, V>,
{
    fn load(&self, cache: &Cache<K, V>, key: &K) -> Option<ItemView<K, V>> {
        use std::collections::hash_map::Entry;

        let (flight, leader) = {
            let mut flights = self.flights.lock();
            match flights.entry(key.clone()) {
                Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
                Entry::Vacant(entry) => {
                    (Arc::clone(entry.insert(Arc::new(Flight::new()))), true)
                }
            }
        };

        if !leader {
            return flight.wait();
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| self.inner.load(cache, key)));
        let result = match &outcome {
            Ok(result) => result.clone(),
            Err(_) => None,
        };

        flight.publish(result.clone());
        self.flights.lock().remove(key);

        match outcome {
            Ok(_) => result,
            Err(panic) => resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::cache::Cache;

    #[test]
    fn closure_is_a_loader() {
        let called = AtomicUsize::new(0);
        let loader = |_: &Cache<String, String>, key: &String| {
            called.fetch_add(1, Ordering::SeqCst);
            Some(ItemView::detached(key.clone(), "loaded".to_string()))
        };

        let cache: Cache<String, String> = Cache::new();
        let item = loader.load(&cache, &"k".to_string()).unwrap();
        assert_eq!(item.value(), "loaded");
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_loads_share_one_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);

        let inner = {
            let calls = Arc::clone(&calls);
            move |_: &Cache<String, String>, key: &String| {
                calls.fetch_add(1, Ordering::SeqCst);
                release_rx.recv().ok();
                Some(ItemView::detached(key.clone(), "loaded".to_string()))
            }
        };
        let loader = Arc::new(SuppressedLoader::new(inner));
        let cache: Cache<String, String> = Cache::new();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let loader = Arc::clone(&loader);
                let cache = cache.clone();
                thread::spawn(move || loader.load(&cache, &"q".to_string()))
            })
            .collect();

        // let both threads reach the flight before releasing the leader
        thread::sleep(Duration::from_millis(100));
        release_tx.send(()).unwrap();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in &results {
            let item = result.as_ref().unwrap();
            assert_eq!(item.key(), "q");
            assert_eq!(item.value(), "loaded");
        }
    }

    #[test]
    fn absent_result_fans_out_to_all_waiters() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);

        let inner = {
            let calls = Arc::clone(&calls);
            move |_: &Cache<String, String>, _: &String| -> Option<ItemView<String, String>> {
                calls.fetch_add(1, Ordering::SeqCst);
                release_rx.recv().ok();
                None
            }
        };
        let loader = Arc::new(SuppressedLoader::new(inner));
        let cache: Cache<String, String> = Cache::new();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let loader = Arc::clone(&loader);
                let cache = cache.clone();
                thread::spawn(move || loader.load(&cache, &"q".to_string()))
            })
            .collect();

        thread::sleep(Duration::from_millis(100));
        release_tx.send(()).unwrap();

        for handle in handles {
            assert!(handle.join().unwrap().is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn flight_retires_after_completion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = {
            let calls = Arc::clone(&calls);
            move |_: &Cache<String, String>, key: &String| {
                calls.fetch_add(1, Ordering::SeqCst);
                Some(ItemView::detached(key.clone(), "loaded".to_string()))
            }
        };
        let loader = SuppressedLoader::new(inner);
        let cache: Cache<String, String> = Cache::new();

        assert!(loader.load(&cache, &"q".to_string()).is_some());
        assert!(loader.load(&cache, &"q".to_string()).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(loader.flights.lock().is_empty());
    }

    #[test]
    fn distinct_keys_do_not_share_flights() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = {
            let calls = Arc::clone(&calls);
            move |_: &Cache<String, String>, key: &String| {
                calls.fetch_add(1, Ordering::SeqCst);
                Some(ItemView::detached(key.clone(), key.to_uppercase()))
            }
        };
        let loader = SuppressedLoader::new(inner);
        let cache: Cache<String, String> = Cache::new();

        let a = loader.load(&cache, &"a".to_string()).unwrap();
        let b = loader.load(&cache, &"b".to_string()).unwrap();
        assert_eq!(a.value(), "A");
        assert_eq!(b.value(), "B");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_leader_releases_waiters() {
        let (entered_tx, entered_rx) = crossbeam_channel::bounded::<()>(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);

        let inner = move |_: &Cache<String, String>,
                          _: &String|
              -> Option<ItemView<String, String>> {
            entered_tx.send(()).ok();
            release_rx.recv().ok();
            panic!("loader failure");
        };
        let loader = Arc::new(SuppressedLoader::new(inner));
        let cache: Cache<String, String> = Cache::new();

        let leader = {
            let loader = Arc::clone(&loader);
            let cache = cache.clone();
            thread::spawn(move || loader.load(&cache, &"q".to_string()))
        };
        entered_rx.recv().unwrap();

        let waiter = {
            let loader = Arc::clone(&loader);
            let cache = cache.clone();
            thread::spawn(move || loader.load(&cache, &"q".to_string()))
        };
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        assert!(leader.join().is_err()); // the panic surfaces in the leader
        assert!(waiter.join().unwrap().is_none());
        assert!(loader.flights.lock().is_empty());
    }
}
