//! N+1 lookup tracking.
//!
//! Reading a record issues one extra query for every foreign-key or
//! one-to-one field it holds. That is the documented behavior, so the
//! tracker does not prevent it; it counts the lookups per `(table, field)`
//! and warns once a field crosses the configured threshold.
//!
//! ```
//! use duckorm_session::n1_detection::N1QueryTracker;
//!
//! let mut tracker = N1QueryTracker::new().with_threshold(2);
//! tracker.record_load("persons", "city", "1");
//! tracker.record_load("persons", "city", "2");
//! assert_eq!(tracker.count_for("persons", "city"), 2);
//! assert_eq!(tracker.stats().potential_n1, 1);
//! ```

use std::collections::HashMap;
use std::time::Instant;

/// How many recent lookups of a field are logged with the warning.
const SAMPLE_SIZE: usize = 5;

/// Counts relationship lookups per `(table, field)`.
#[derive(Debug)]
pub struct N1QueryTracker {
    counts: HashMap<(String, String), usize>,
    threshold: usize,
    enabled: bool,
    lookups: Vec<Lookup>,
}

impl Default for N1QueryTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// One recorded lookup.
#[derive(Debug, Clone)]
pub struct Lookup {
    /// Table of the record being materialized
    pub table: String,
    /// Reference field that triggered the lookup
    pub field: String,
    /// Key value that was looked up, rendered as text
    pub key: String,
    pub timestamp: Instant,
}

/// Summary of the tracked lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct N1Stats {
    pub total_loads: usize,
    /// Distinct `(table, field)` pairs seen
    pub relationships_loaded: usize,
    /// Pairs at or above the threshold
    pub potential_n1: usize,
}

impl N1QueryTracker {
    /// A tracker with the default threshold of 3.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            threshold: 3,
            enabled: true,
            lookups: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Count one lookup of `table.field` for `key`.
    ///
    /// Warns exactly once per pair, when its count reaches the threshold.
    pub fn record_load(&mut self, table: &str, field: &str, key: &str) {
        if !self.enabled {
            return;
        }

        let count = self
            .counts
            .entry((table.to_string(), field.to_string()))
            .or_insert(0);
        *count += 1;
        let count = *count;

        self.lookups.push(Lookup {
            table: table.to_string(),
            field: field.to_string(),
            key: key.to_string(),
            timestamp: Instant::now(),
        });

        if count == self.threshold {
            self.emit_warning(table, field, count);
        }
    }

    fn emit_warning(&self, table: &str, field: &str, count: usize) {
        tracing::warn!(
            target: "duckorm::n1",
            table,
            field,
            queries = count,
            threshold = self.threshold,
            "N+1 lookup pattern: one query per row for this reference"
        );

        let recent = self
            .lookups
            .iter()
            .rev()
            .filter(|l| l.table == table && l.field == field)
            .take(SAMPLE_SIZE);
        for (i, lookup) in recent.enumerate() {
            tracing::debug!(target: "duckorm::n1", index = i, key = %lookup.key, "  recent lookup");
        }
    }

    /// Forget all counts and lookups.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.lookups.clear();
    }

    pub fn count_for(&self, table: &str, field: &str) -> usize {
        self.counts
            .get(&(table.to_string(), field.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn stats(&self) -> N1Stats {
        N1Stats {
            total_loads: self.counts.values().sum(),
            relationships_loaded: self.counts.len(),
            potential_n1: self
                .counts
                .values()
                .filter(|&&c| c >= self.threshold)
                .count(),
        }
    }

    /// Every recorded lookup, oldest first.
    pub fn lookups(&self) -> &[Lookup] {
        &self.lookups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_defaults() {
        let tracker = N1QueryTracker::new();
        assert_eq!(tracker.threshold(), 3);
        assert!(tracker.is_enabled());
        assert_eq!(tracker.stats(), N1Stats::default());
    }

    #[test]
    fn test_tracker_enable_disable() {
        let mut tracker = N1QueryTracker::new();
        tracker.disable();
        tracker.record_load("persons", "city", "1");
        assert_eq!(tracker.count_for("persons", "city"), 0);
        assert!(tracker.lookups().is_empty());

        tracker.enable();
        tracker.record_load("persons", "city", "1");
        assert_eq!(tracker.count_for("persons", "city"), 1);
    }

    #[test]
    fn test_tracker_counts_per_pair() {
        let mut tracker = N1QueryTracker::new().with_threshold(10);
        tracker.record_load("persons", "city", "1");
        tracker.record_load("persons", "city", "2");
        tracker.record_load("persons", "employer", "4");
        tracker.record_load("passports", "holder", "9");

        assert_eq!(tracker.count_for("persons", "city"), 2);
        assert_eq!(tracker.count_for("persons", "employer"), 1);
        assert_eq!(tracker.count_for("passports", "holder"), 1);
        assert_eq!(tracker.count_for("cities", "persons"), 0);
    }

    #[test]
    fn test_lookups_keep_order_and_key() {
        let mut tracker = N1QueryTracker::new();
        tracker.record_load("persons", "city", "7");
        tracker.record_load("persons", "city", "8");

        let lookups = tracker.lookups();
        assert_eq!(lookups.len(), 2);
        assert_eq!(lookups[0].key, "7");
        assert_eq!(lookups[1].key, "8");
        assert!(lookups[1].timestamp >= lookups[0].timestamp);
    }

    #[test]
    fn test_stats() {
        let mut tracker = N1QueryTracker::new().with_threshold(2);
        tracker.record_load("persons", "city", "1");
        tracker.record_load("persons", "city", "2");
        tracker.record_load("persons", "employer", "3");

        assert_eq!(
            tracker.stats(),
            N1Stats {
                total_loads: 3,
                relationships_loaded: 2,
                potential_n1: 1,
            }
        );
    }

    #[test]
    fn test_reset() {
        let mut tracker = N1QueryTracker::new();
        tracker.record_load("persons", "city", "1");
        tracker.reset();
        assert_eq!(tracker.count_for("persons", "city"), 0);
        assert!(tracker.lookups().is_empty());
    }
}
