//! A sink adapter that buffers records in a bounded ring and delivers them
//! to a wrapped target sink from one dedicated worker thread, so a slow or
//! stalled downstream sink never blocks an emitting thread.
//!
//! Overflow policy is drop-oldest, not block: a producer that outruns the
//! worker discards the ring's oldest entry to make room rather than waiting.

use crate::record::Record;
use crate::sink::Sink;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_BATCH_PER_WAKE: usize = 500;

pub struct QueueSinkAdapter {
    target: Arc<dyn Sink>,
    capacity: usize,
    wakeup_threshold: usize,
    ring: Mutex<VecDeque<Record>>,
    wake_tx: crossbeam_channel::Sender<()>,
    enabled: AtomicBool,
    last_enqueued_sequence: AtomicU64,
    last_delivered_sequence: AtomicU64,
    flush_after_sequence: AtomicU64,
    flush_requested: AtomicBool,
    total_dropped: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QueueSinkAdapter {
    /// `capacity` bounds the ring; `wakeup_threshold` is the depth at which
    /// the worker is proactively signaled rather than waiting out its poll
    /// interval.
    pub fn new(target: Arc<dyn Sink>, capacity: usize, wakeup_threshold: usize) -> Arc<QueueSinkAdapter> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let adapter = Arc::new(QueueSinkAdapter {
            target,
            capacity,
            wakeup_threshold,
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            wake_tx: tx,
            enabled: AtomicBool::new(true),
            last_enqueued_sequence: AtomicU64::new(0),
            last_delivered_sequence: AtomicU64::new(0),
            flush_after_sequence: AtomicU64::new(0),
            flush_requested: AtomicBool::new(false),
            total_dropped: AtomicU64::new(0),
            worker: Mutex::new(None),
        });
        let worker_adapter = adapter.clone();
        let handle = thread::Builder::new()
            .name("logcore-queue-sink".to_string())
            .spawn(move || worker_adapter.run(rx))
            .expect("spawning queue sink worker thread");
        *adapter.worker.lock() = Some(handle);
        adapter
    }

    fn signal(&self) {
        let _ = self.wake_tx.try_send(());
    }

    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Acquire)
    }

    pub fn queue_depth(&self) -> usize {
        self.ring.lock().len()
    }

    fn handle_one(&self, record: Record) {
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }
        let seq = record.sequence();
        let depth = {
            let mut ring = self.ring.lock();
            if ring.len() >= self.capacity {
                ring.pop_front();
                self.total_dropped.fetch_add(1, Ordering::AcqRel);
            }
            ring.push_back(record);
            ring.len()
        };
        self.last_enqueued_sequence.fetch_max(seq, Ordering::AcqRel);
        if depth >= self.wakeup_threshold {
            self.signal();
        }
    }

    /// `true` while `sequence` has been enqueued but not yet delivered to
    /// the target sink.
    pub fn is_delivery_in_progress(&self, sequence: u64) -> bool {
        let delivered = self.last_delivered_sequence.load(Ordering::Acquire);
        let enqueued = self.last_enqueued_sequence.load(Ordering::Acquire);
        sequence > delivered && sequence <= enqueued
    }

    /// Blocks until every record enqueued so far has been delivered to the
    /// target sink and the target itself has flushed.
    pub fn flush(&self) {
        let target_seq = self.last_enqueued_sequence.load(Ordering::Acquire);
        if target_seq > 0 {
            let _ = self
                .flush_after_sequence
                .fetch_max(target_seq, Ordering::AcqRel);
        } else {
            self.flush_requested.store(true, Ordering::Release);
        }
        self.signal();
        while target_seq > 0 && self.is_delivery_in_progress(target_seq) {
            thread::sleep(Duration::from_millis(5));
        }
        // wait for the worker to actually run the target's flush
        while self.flush_after_sequence.load(Ordering::Acquire) != 0
            || self.flush_requested.load(Ordering::Acquire)
        {
            thread::sleep(Duration::from_millis(5));
        }
    }

    pub fn shutdown(&self) {
        self.enabled.store(false, Ordering::Release);
        self.signal();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    fn drain_batch(&self, limit: usize) -> Vec<Record> {
        let mut ring = self.ring.lock();
        let n = ring.len().min(limit);
        ring.drain(..n).collect()
    }

    fn run(self: Arc<Self>, wake_rx: crossbeam_channel::Receiver<()>) {
        loop {
            let batch = self.drain_batch(MAX_BATCH_PER_WAKE);
            let did_work = !batch.is_empty();
            if did_work {
                let max_seq = batch.iter().map(Record::sequence).max().unwrap_or(0);
                self.target.handle_many(batch);
                self.last_delivered_sequence.fetch_max(max_seq, Ordering::AcqRel);
            }

            let pending_flush_seq = self.flush_after_sequence.load(Ordering::Acquire);
            if pending_flush_seq != 0 && !self.is_delivery_in_progress(pending_flush_seq) {
                self.target.flush();
                self.flush_after_sequence.store(0, Ordering::Release);
            }
            if self.flush_requested.swap(false, Ordering::AcqRel) {
                self.target.flush();
            }

            if !self.enabled.load(Ordering::Acquire) {
                let remainder = self.drain_batch(usize::MAX);
                if !remainder.is_empty() {
                    let max_seq = remainder.iter().map(Record::sequence).max().unwrap_or(0);
                    self.target.handle_many(remainder);
                    self.last_delivered_sequence.fetch_max(max_seq, Ordering::AcqRel);
                }
                let dropped = self.total_dropped.load(Ordering::Acquire);
                if dropped > 0 {
                    tracing::warn!(target: "logcore::internal", dropped, "queue sink dropped records before shutdown");
                }
                self.target.flush();
                self.target.shutdown();
                return;
            }

            if !did_work {
                let _ = wake_rx.recv_timeout(WORKER_POLL_INTERVAL);
            }
        }
    }
}

impl Sink for QueueSinkAdapter {
    fn name(&self) -> &str {
        self.target.name()
    }

    fn handle(&self, record: Record) {
        self.handle_one(record);
    }

    fn handle_many(&self, records: Vec<Record>) {
        for record in records {
            self.handle_one(record);
        }
    }

    fn supports_refcounted_release(&self) -> bool {
        self.target.supports_refcounted_release()
    }

    fn flush(&self) {
        QueueSinkAdapter::flush(self);
    }

    fn shutdown(&self) {
        QueueSinkAdapter::shutdown(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::collecting::CollectingSink;
    use crate::severity::Severity;
    use std::time::Instant;

    fn make_record(seq: u64, body: &str) -> Record {
        let r = Record::new_heap();
        r.with_message_mut(|m| {
            m.set_body(body);
            m.set_severity(Severity::Info);
        });
        r.mark_emitted(seq);
        r
    }

    #[test]
    fn delivers_records_in_order() {
        let target = Arc::new(CollectingSink::new("t"));
        let adapter = QueueSinkAdapter::new(target.clone(), 16, 100);
        for i in 1..=5u64 {
            adapter.handle(make_record(i, &format!("m{i}")));
        }
        adapter.flush();
        assert_eq!(
            target.bodies(),
            vec!["m1", "m2", "m3", "m4", "m5"].into_iter().map(String::from).collect::<Vec<_>>()
        );
        adapter.shutdown();
    }

    #[test]
    fn drops_oldest_on_overflow() {
        let target = Arc::new(CollectingSink::new("t"));
        let adapter = QueueSinkAdapter::new(target, 2, 1_000_000);
        // Enqueue faster than the worker's 50ms poll can drain; with a
        // wakeup threshold this high the worker won't be signaled early.
        for i in 1..=5u64 {
            adapter.handle(make_record(i, &format!("m{i}")));
        }
        assert!(adapter.total_dropped() >= 1);
        adapter.flush();
        adapter.shutdown();
    }

    #[test]
    fn flush_waits_for_pending_records_to_land() {
        let target = Arc::new(CollectingSink::new("t"));
        let adapter = QueueSinkAdapter::new(target.clone(), 64, 1000);
        for i in 1..=10u64 {
            adapter.handle(make_record(i, &format!("m{i}")));
        }
        let deadline = Instant::now() + Duration::from_secs(2);
        adapter.flush();
        assert!(Instant::now() < deadline);
        assert_eq!(target.len(), 10);
        adapter.shutdown();
    }
}
