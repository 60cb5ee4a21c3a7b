use core::sync::atomic::{AtomicU64, Ordering};

/// Event counters of the swap engine.
#[derive(Debug, Default)]
pub struct SwapStats {
    page_outs: AtomicU64,
    page_ins: AtomicU64,
    failed_page_outs: AtomicU64,
    victims_scanned: AtomicU64,
}

/// A point-in-time copy of [`SwapStats`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SwapStatsSnapshot {
    pub page_outs: u64,
    pub page_ins: u64,
    pub failed_page_outs: u64,
    /// Resident entries the clock hand passed across all victim selections.
    pub victims_scanned: u64,
}

impl SwapStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            page_outs: AtomicU64::new(0),
            page_ins: AtomicU64::new(0),
            failed_page_outs: AtomicU64::new(0),
            victims_scanned: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_page_out(&self) {
        self.page_outs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_page_in(&self) {
        self.page_ins.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_page_out(&self) {
        self.failed_page_outs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self, entries: usize) {
        self.victims_scanned
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> SwapStatsSnapshot {
        SwapStatsSnapshot {
            page_outs: self.page_outs.load(Ordering::Relaxed),
            page_ins: self.page_ins.load(Ordering::Relaxed),
            failed_page_outs: self.failed_page_outs.load(Ordering::Relaxed),
            victims_scanned: self.victims_scanned.load(Ordering::Relaxed),
        }
    }
}
