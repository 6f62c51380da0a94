//! A sequenced single-value publisher and its cheap-to-poll observers.
//!
//! One [`Publisher<T>`] is shared by a writer (the hub, setting logger/group
//! configuration) and many readers (loggers, checking whether they're
//! enabled on every emit call). Reads must not pay for a lock in the common
//! case where nothing has changed since the last check.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The writable side. `set` is a no-op (no sequence bump) when the new value
/// equals the current one, so observers that already hold the latest value
/// never see a spurious wakeup.
pub struct Publisher<T> {
    value: ArcSwap<T>,
    sequence: AtomicU64,
}

impl<T: PartialEq> Publisher<T> {
    pub fn new(initial: T) -> Arc<Publisher<T>> {
        Arc::new(Publisher {
            value: ArcSwap::new(Arc::new(initial)),
            sequence: AtomicU64::new(1),
        })
    }

    pub fn set(&self, new_value: T) {
        let unchanged = **self.value.load() == new_value;
        if unchanged {
            return;
        }
        self.value.store(Arc::new(new_value));
        self.sequence.fetch_add(1, Ordering::AcqRel);
    }

    pub fn get(&self) -> Arc<T> {
        self.value.load_full()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }
}

/// A reader's private cache of a [`Publisher`]'s value. `update` is the hot
/// path: one atomic load and, absent a change, one compare — no lock, no
/// allocation.
pub struct Observer<T> {
    publisher: Arc<Publisher<T>>,
    cached: ArcSwap<T>,
    local_sequence: AtomicU64,
}

impl<T: PartialEq> Observer<T> {
    pub fn new(publisher: Arc<Publisher<T>>) -> Observer<T> {
        let value = publisher.get();
        let sequence = publisher.sequence();
        Observer {
            publisher,
            cached: ArcSwap::new(value),
            local_sequence: AtomicU64::new(sequence),
        }
    }

    #[inline]
    pub fn update(&self) {
        let published = self.publisher.sequence.load(Ordering::Acquire);
        if published == self.local_sequence.load(Ordering::Acquire) {
            return;
        }
        self.cached.store(self.publisher.value.load_full());
        self.local_sequence.store(published, Ordering::Release);
    }

    /// Current cached value. Call [`Self::update`] first if you need to be
    /// sure it reflects the latest published value.
    pub fn get(&self) -> Arc<T> {
        self.cached.load_full()
    }

    /// Convenience: refresh then read.
    pub fn get_fresh(&self) -> Arc<T> {
        self.update();
        self.get()
    }
}
