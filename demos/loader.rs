use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ttlkit::builder::CacheBuilder;
use ttlkit::cache::Cache;
use ttlkit::item::Ttl;
use ttlkit::loader::SuppressedLoader;

fn main() {
    let calls = Arc::new(AtomicUsize::new(0));

    let loader = {
        let calls = Arc::clone(&calls);
        SuppressedLoader::new(move |cache: &Cache<String, String>, key: &String| {
            calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50)); // a slow backend
            Some(cache.insert(key.clone(), format!("origin({key})"), Ttl::Never))
        })
    };

    let cache = CacheBuilder::new().loader(loader).build();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            thread::spawn(move || cache.get(&"user:42".to_string()).unwrap())
        })
        .collect();

    for reader in readers {
        let item = reader.join().unwrap();
        println!("got {}", item.value());
    }

    println!("backend calls: {}", calls.load(Ordering::SeqCst));
    println!("cached: {}", cache.contains(&"user:42".to_string()));
}

// Expected output:
// got origin(user:42)
// got origin(user:42)
// got origin(user:42)
// got origin(user:42)
// backend calls: 1
// cached: true
//
// Explanation: four concurrent misses on the same key collapse into one
// loader invocation; the loader inserts, so later reads are plain hits.
