//! Operation counters and their point-in-time snapshot.

/// Monotonic counters, guarded by their own lock so snapshot reads do not
/// contend with the item index.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    pub(crate) insertions: u64,
    pub(crate) hits: u64,
    pub(crate) misses: u64,
    pub(crate) evictions: u64,
}

impl Metrics {
    pub(crate) fn record_insertion(&mut self) {
        self.insertions += 1;
    }

    pub(crate) fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub(crate) fn record_evictions(&mut self, count: u64) {
        self.evictions += count;
    }
}

/// Copy of the cache counters plus gauges captured at snapshot time.
///
/// `insertions` counts new keys only (updates of an existing key do not
/// count). `evictions` covers explicit removal, capacity eviction, and
/// expiration alike.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsSnapshot {
    pub insertions: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,

    // gauges captured at snapshot time
    pub cache_len: usize,
    pub capacity: usize,
}

impl MetricsSnapshot {
    /// Hits as a fraction of all lookups; 0.0 when nothing was looked up.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut m = Metrics::default();
        m.record_insertion();
        m.record_insertion();
        m.record_hit();
        m.record_miss();
        m.record_evictions(3);

        assert_eq!(m.insertions, 2);
        assert_eq!(m.hits, 1);
        assert_eq!(m.misses, 1);
        assert_eq!(m.evictions, 3);
    }

    #[test]
    fn hit_ratio_handles_empty_and_mixed() {
        let empty = MetricsSnapshot::default();
        assert_eq!(empty.hit_ratio(), 0.0);

        let snapshot = MetricsSnapshot {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((snapshot.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }
}
