use serde::Serialize;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Every event taken off the stream, including ones that were dropped.
    pub events: u64,
    pub presence_upserts: u64,
    pub presence_removals: u64,
    pub member_removals: u64,
    pub dropped: u64,
    pub seeded: u64,
}

/// Counters shared between the ingestion task and readers.
#[derive(Debug)]
pub struct IngestCounters {
    presence_upserts: AtomicU64,
    presence_removals: AtomicU64,
    member_removals: AtomicU64,
    dropped: AtomicU64,
    seeded: AtomicU64,
    events: watch::Sender<u64>,
}

impl Default for IngestCounters {
    fn default() -> Self {
        Self {
            presence_upserts: AtomicU64::new(0),
            presence_removals: AtomicU64::new(0),
            member_removals: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            seeded: AtomicU64::new(0),
            events: watch::channel(0).0,
        }
    }
}

impl IngestCounters {
    pub fn record_presence_upsert(&self) {
        self.presence_upserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_presence_removal(&self) {
        self.presence_removals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_member_removal(&self) {
        self.member_removals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_seeded(&self, inserted: u64) {
        self.seeded.fetch_add(inserted, Ordering::Relaxed);
    }

    /// Called once an event has been fully handled.
    pub fn record_event(&self) {
        self.events.send_modify(|count| *count = count.saturating_add(1));
    }

    /// Watches the number of fully handled events.
    pub fn subscribe_events(&self) -> watch::Receiver<u64> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> IngestStats {
        IngestStats {
            events: *self.events.borrow(),
            presence_upserts: self.presence_upserts.load(Ordering::Relaxed),
            presence_removals: self.presence_removals.load(Ordering::Relaxed),
            member_removals: self.member_removals.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            seeded: self.seeded.load(Ordering::Relaxed),
        }
    }
}
