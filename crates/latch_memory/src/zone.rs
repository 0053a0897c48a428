//! Zones: named buckets for attributing and budgeting memory usage.
//!
//! A zone never allocates. Allocators report every raw block to their zone,
//! which keeps lifetime and active counters and may refuse a block that would
//! push it over budget.

use crate::error::ZoneError;
use std::cell::Cell;

/// Snapshot of a zone's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZoneStats {
    // lifetime values
    pub total_allocations: usize,
    pub total_bytes: usize,

    // active values
    pub active_allocations: usize,
    pub active_bytes: usize,

    pub high_watermark: usize,
    pub smallest_allocation: usize,
    pub largest_allocation: usize,
}

/// Named accounting bucket with an optional byte budget (0 = unbounded).
///
/// Counters live in `Cell`s so several allocators can report to one zone
/// through shared references. That also makes the zone `!Sync`.
#[derive(Debug)]
pub struct Zone {
    name: String,
    budget_bytes: usize,
    stats: Cell<ZoneStats>,
    next_allocation_id: Cell<usize>,
}

impl Zone {
    pub fn new(name: impl Into<String>, budget_bytes: usize) -> Self {
        Self {
            name: name.into(),
            budget_bytes,
            stats: Cell::new(ZoneStats::default()),
            next_allocation_id: Cell::new(0),
        }
    }

    /// Zone without a budget.
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(name, 0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    pub fn stats(&self) -> ZoneStats {
        self.stats.get()
    }

    pub fn total_allocations(&self) -> usize {
        self.stats.get().total_allocations
    }

    pub fn total_bytes(&self) -> usize {
        self.stats.get().total_bytes
    }

    pub fn active_allocations(&self) -> usize {
        self.stats.get().active_allocations
    }

    pub fn active_bytes(&self) -> usize {
        self.stats.get().active_bytes
    }

    pub fn high_watermark(&self) -> usize {
        self.stats.get().high_watermark
    }

    pub fn smallest_allocation(&self) -> usize {
        self.stats.get().smallest_allocation
    }

    pub fn largest_allocation(&self) -> usize {
        self.stats.get().largest_allocation
    }

    /// Monotonic index handed to the debug tracker for each new block.
    pub fn next_allocation_id(&self) -> usize {
        let id = self.next_allocation_id.get();
        self.next_allocation_id.set(id + 1);
        id
    }

    /// Account for a block of `size` bytes.
    ///
    /// A request that would exceed the budget is rejected before any counter
    /// changes.
    pub fn add_allocation(&self, size: usize) -> Result<(), ZoneError> {
        let mut stats = self.stats.get();
        let projected = stats.active_bytes.saturating_add(size);
        if self.budget_bytes > 0 && projected > self.budget_bytes {
            return Err(ZoneError::BudgetExceeded {
                zone: self.name.clone(),
                requested: size,
                active: stats.active_bytes,
                budget: self.budget_bytes,
            });
        }

        stats.total_allocations += 1;
        stats.total_bytes += size;

        stats.active_allocations += 1;
        stats.active_bytes = projected;

        if size > stats.largest_allocation {
            stats.largest_allocation = size;
        }

        if size < stats.smallest_allocation || stats.smallest_allocation == 0 {
            stats.smallest_allocation = size;
        }

        if stats.active_bytes > stats.high_watermark {
            stats.high_watermark = stats.active_bytes;
        }

        self.stats.set(stats);
        Ok(())
    }

    /// Stop accounting for a block of `size` bytes.
    ///
    /// Panics on underflow: the block was freed twice or with the wrong size.
    pub fn remove_allocation(&self, size: usize) {
        let mut stats = self.stats.get();
        assert!(
            stats.active_allocations > 0 && stats.active_bytes >= size,
            "zone '{}': freed {} bytes that were never allocated ({} allocations, {} bytes active)",
            self.name,
            size,
            stats.active_allocations,
            stats.active_bytes
        );

        stats.active_allocations -= 1;
        stats.active_bytes -= size;
        self.stats.set(stats);
    }

    /// Log every counter at info level.
    pub fn report(&self) {
        let stats = self.stats.get();
        tracing::info!(
            zone = %self.name,
            total_allocations = stats.total_allocations,
            total_bytes = stats.total_bytes,
            budget_bytes = self.budget_bytes,
            "zone lifetime totals"
        );
        tracing::info!(
            zone = %self.name,
            active_allocations = stats.active_allocations,
            active_bytes = stats.active_bytes,
            high_watermark = stats.high_watermark,
            "zone active usage"
        );
        tracing::info!(
            zone = %self.name,
            smallest_allocation = stats.smallest_allocation,
            largest_allocation = stats.largest_allocation,
            "zone allocation extremes"
        );
    }

    /// True when nothing is outstanding.
    pub fn is_balanced(&self) -> bool {
        let stats = self.stats.get();
        stats.active_allocations == 0 && stats.active_bytes == 0
    }
}

impl Drop for Zone {
    fn drop(&mut self) {
        self.report();

        if std::thread::panicking() {
            return;
        }

        // If you hit this, something allocated from this zone was never freed.
        let stats = self.stats.get();
        assert!(
            self.is_balanced(),
            "zone '{}' leaked {} allocations ({} bytes)",
            self.name,
            stats.active_allocations,
            stats.active_bytes
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_lifetime_and_active_counters() {
        let zone = Zone::unbounded("test");
        zone.add_allocation(64).unwrap();
        zone.add_allocation(16).unwrap();
        zone.remove_allocation(64);

        let stats = zone.stats();
        assert_eq!(stats.total_allocations, 2);
        assert_eq!(stats.total_bytes, 80);
        assert_eq!(stats.active_allocations, 1);
        assert_eq!(stats.active_bytes, 16);
        assert_eq!(stats.high_watermark, 80);
        assert_eq!(stats.smallest_allocation, 16);
        assert_eq!(stats.largest_allocation, 64);

        zone.remove_allocation(16);
    }

    #[test]
    fn budget_rejects_without_mutating() {
        let zone = Zone::new("budgeted", 1024);
        zone.add_allocation(512).unwrap();
        let before = zone.stats();

        let err = zone.add_allocation(600).unwrap_err();
        assert_eq!(
            err,
            ZoneError::BudgetExceeded {
                zone: "budgeted".into(),
                requested: 600,
                active: 512,
                budget: 1024,
            }
        );
        assert_eq!(zone.stats(), before);

        // Exactly filling the budget is allowed.
        zone.add_allocation(512).unwrap();
        assert_eq!(zone.active_bytes(), 1024);

        zone.remove_allocation(512);
        zone.remove_allocation(512);
        assert_eq!(zone.active_bytes(), 0);
    }

    #[test]
    fn active_bytes_never_exceed_budget() {
        let zone = Zone::new("bounded", 300);
        let sizes = [100, 150, 90, 10, 60, 1, 200];
        let mut accepted = Vec::new();
        for size in sizes {
            if zone.add_allocation(size).is_ok() {
                accepted.push(size);
            }
            assert!(zone.active_bytes() <= zone.budget_bytes());
        }
        assert_eq!(accepted, vec![100, 150, 10, 1]);
        for size in accepted {
            zone.remove_allocation(size);
        }
    }

    #[test]
    fn paired_add_remove_balances() {
        let zone = Zone::unbounded("paired");
        let sizes = [8, 24, 1, 4096, 3];
        for &size in &sizes {
            zone.add_allocation(size).unwrap();
        }
        for &size in sizes.iter().rev() {
            zone.remove_allocation(size);
        }
        assert!(zone.is_balanced());
        assert_eq!(zone.high_watermark(), 8 + 24 + 1 + 4096 + 3);
    }

    #[test]
    fn allocation_ids_are_monotonic() {
        let zone = Zone::unbounded("ids");
        assert_eq!(zone.next_allocation_id(), 0);
        assert_eq!(zone.next_allocation_id(), 1);
        assert_eq!(zone.next_allocation_id(), 2);
    }

    #[test]
    #[should_panic(expected = "never allocated")]
    fn double_free_panics() {
        let zone = Zone::unbounded("double");
        zone.add_allocation(32).unwrap();
        zone.remove_allocation(32);
        zone.remove_allocation(32);
    }

    #[test]
    #[should_panic(expected = "leaked 1 allocations")]
    fn leak_detected_on_drop() {
        let zone = Zone::unbounded("leaky");
        zone.add_allocation(8).unwrap();
        drop(zone);
    }
}
