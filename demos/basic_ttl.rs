use std::thread;
use std::time::Duration;

use ttlkit::builder::CacheBuilder;
use ttlkit::cache::Cache;
use ttlkit::item::Ttl;

fn main() {
    let cache: Cache<&str, &str> = CacheBuilder::new()
        .capacity(2)
        .default_ttl(Duration::from_millis(50))
        .build();

    cache.on_eviction(|reason, item| {
        println!("evicted {} ({:?})", item.key(), reason);
    });

    cache.insert("alpha", "a", Ttl::Default);
    cache.insert("beta", "b", Ttl::Never);

    if let Some(item) = cache.get(&"alpha") {
        println!("hit alpha: {}", item.value());
    }

    cache.insert("gamma", "c", Ttl::Default);

    thread::sleep(Duration::from_millis(100));
    cache.remove_expired();

    println!("len after sweep: {}", cache.len());
}

// Expected output:
// hit alpha: a
// evicted beta (CapacityReached)
// evicted alpha (Expired)
// evicted gamma (Expired)
// len after sweep: 0
//
// Explanation: capacity=2; after get, "alpha" is MRU and "beta" is LRU,
// so inserting "gamma" evicts "beta". The two remaining items carry the
// 50ms default TTL and are swept once it elapses; alpha's deadline is
// the older of the two, so it expires first.
