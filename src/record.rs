//! `LogMessage`: the payload carried through the distribution hub to every
//! sink, and `Pool`: opt-in reuse of the backing allocation.
//!
//! A [`Record`] is a reference-counted handle (`Arc` under the hood). Each
//! sink that receives a fan-out copy owns one handle; "releasing" a record
//! is just dropping that handle. When the last handle of a pool-born record
//! drops, the message is reset and returned to its pool automatically —
//! `Drop` gives us the release-to-pool bookkeeping for free.

use crate::severity::Severity;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// File/line of the call that produced a record, captured via
/// `#[track_caller]` rather than an explicit skip-frame count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
}

impl From<&'static std::panic::Location<'static>> for CallSite {
    fn from(loc: &'static std::panic::Location<'static>) -> Self {
        CallSite {
            file: loc.file(),
            line: loc.line(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadIdentity {
    pub os_id: u64,
    pub name: Option<String>,
}

impl ThreadIdentity {
    pub fn capture() -> ThreadIdentity {
        let thread = std::thread::current();
        ThreadIdentity {
            os_id: thread_id_as_u64(&thread),
            name: thread.name().map(str::to_owned),
        }
    }
}

fn thread_id_as_u64(thread: &std::thread::Thread) -> u64 {
    // `ThreadId` doesn't expose a stable numeric form; hash it into one so
    // sinks have a cheap, comparable identifier to print.
    use std::hash::{Hash, Hasher};
    let mut hasher = ahash::AHasher::default();
    thread.id().hash(&mut hasher);
    hasher.finish()
}

/// The mutable payload of a record, between `Reset` and `Emitted`.
#[derive(Debug, Clone)]
pub struct LogMessage {
    pub logger_name: String,
    pub logger_id: i32,
    pub severity: Severity,
    pub body: String,
    pub binary_data: Option<Vec<u8>>,
    pub keywords: SmallVec<[String; 4]>,
    pub call_site: Option<CallSite>,
    pub thread: Option<ThreadIdentity>,
    pub emitted: bool,
    pub emitted_at_wall: Option<DateTime<Utc>>,
    pub emitted_at_monotonic: Option<Instant>,
    pub sequence: u64,
}

impl Default for LogMessage {
    fn default() -> Self {
        LogMessage {
            logger_name: String::new(),
            logger_id: -1,
            severity: Severity::None,
            body: String::new(),
            binary_data: None,
            keywords: SmallVec::new(),
            call_site: None,
            thread: None,
            emitted: false,
            emitted_at_wall: None,
            emitted_at_monotonic: None,
            sequence: 0,
        }
    }
}

impl LogMessage {
    fn assert_not_emitted(&self) {
        assert!(!self.emitted, "mutating a record after it has been emitted");
    }

    pub fn set_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.assert_not_emitted();
        self.body = body.into();
        self
    }

    pub fn set_severity(&mut self, severity: Severity) -> &mut Self {
        self.assert_not_emitted();
        self.severity = severity;
        self
    }

    pub fn set_logger(&mut self, id: i32, name: &str) -> &mut Self {
        self.assert_not_emitted();
        self.logger_id = id;
        name.clone_into(&mut self.logger_name);
        self
    }

    pub fn add_keyword(&mut self, keyword: impl Into<String>) -> &mut Self {
        self.assert_not_emitted();
        self.keywords.push(keyword.into());
        self
    }

    pub fn set_call_site(&mut self, site: Option<CallSite>) -> &mut Self {
        self.assert_not_emitted();
        self.call_site = site;
        self
    }

    pub fn set_binary_data(&mut self, data: Vec<u8>) -> &mut Self {
        self.assert_not_emitted();
        self.binary_data = Some(data);
        self
    }

    /// Clears mutable content but keeps allocated capacity on `body`,
    /// `keywords`, and `binary_data` so a pooled record avoids reallocating.
    fn reset(&mut self) {
        self.logger_name.clear();
        self.logger_id = -1;
        self.severity = Severity::None;
        self.body.clear();
        self.binary_data = None;
        self.keywords.clear();
        self.call_site = None;
        self.thread = None;
        self.emitted = false;
        self.emitted_at_wall = None;
        self.emitted_at_monotonic = None;
        self.sequence = 0;
    }

    /// Stamps the fields the hub fills in at distribution time and flips the
    /// record from `Reset` to `Emitted`.
    pub(crate) fn mark_emitted(&mut self, sequence: u64, thread: ThreadIdentity) {
        self.thread = Some(thread);
        self.sequence = sequence;
        self.emitted_at_wall = Some(Utc::now());
        self.emitted_at_monotonic = Some(Instant::now());
        self.emitted = true;
    }

    /// `true` if `self` and `other` agree on every field except the ones
    /// that distribution always stamps fresh (sequence, timestamps,
    /// thread). Used to check that a record coming back out of a pool is
    /// indistinguishable from a freshly defaulted one.
    pub fn structurally_eq_ignoring_transient(&self, other: &LogMessage) -> bool {
        self.logger_name == other.logger_name
            && self.logger_id == other.logger_id
            && self.severity == other.severity
            && self.body == other.body
            && self.binary_data == other.binary_data
            && self.keywords == other.keywords
            && self.call_site == other.call_site
            && self.emitted == other.emitted
    }
}

#[derive(Debug)]
enum Origin {
    Heap,
    Pooled(Arc<Pool>),
}

#[derive(Debug)]
struct RecordInner {
    message: Mutex<LogMessage>,
    sequence_cache: AtomicU64,
    origin: Origin,
}

impl Drop for RecordInner {
    fn drop(&mut self) {
        if let Origin::Pooled(pool) = &self.origin {
            let mut message = self.message.lock();
            message.reset();
            pool.recycle(std::mem::take(&mut *message));
        }
    }
}

/// A handle to a [`LogMessage`]. Cloning increments the reference count;
/// the last clone to drop triggers pool return (if pool-born).
#[derive(Debug)]
pub struct Record(Arc<RecordInner>);

impl Record {
    pub fn new_heap() -> Record {
        Record(Arc::new(RecordInner {
            message: Mutex::new(LogMessage::default()),
            sequence_cache: AtomicU64::new(0),
            origin: Origin::Heap,
        }))
    }

    pub fn clone_ref(&self) -> Record {
        Record(self.0.clone())
    }

    pub fn with_message<R>(&self, f: impl FnOnce(&LogMessage) -> R) -> R {
        f(&self.0.message.lock())
    }

    pub fn with_message_mut<R>(&self, f: impl FnOnce(&mut LogMessage) -> R) -> R {
        f(&mut self.0.message.lock())
    }

    pub fn sequence(&self) -> u64 {
        self.0.sequence_cache.load(Ordering::Acquire)
    }

    pub(crate) fn mark_emitted(&self, sequence: u64) {
        self.0.sequence_cache.store(sequence, Ordering::Release);
        let thread = ThreadIdentity::capture();
        self.with_message_mut(|m| m.mark_emitted(sequence, thread));
    }

    /// A detached copy of the current content: always heap-born, with
    /// `emitted` cleared and `sequence` zeroed, ready to be re-emitted
    /// independently of the original.
    pub fn clone_detached(&self) -> Record {
        let mut content = self.with_message(|m| m.clone());
        content.emitted = false;
        content.sequence = 0;
        content.emitted_at_wall = None;
        content.emitted_at_monotonic = None;
        Record(Arc::new(RecordInner {
            message: Mutex::new(content),
            sequence_cache: AtomicU64::new(0),
            origin: Origin::Heap,
        }))
    }
}

/// A capped, thread-safe free list of reusable [`LogMessage`] buffers.
#[derive(Debug)]
pub struct Pool {
    free: Mutex<VecDeque<LogMessage>>,
    outstanding: AtomicUsize,
    max_outstanding: usize,
}

impl Pool {
    pub fn new(max_outstanding: usize) -> Arc<Pool> {
        Arc::new(Pool {
            free: Mutex::new(VecDeque::new()),
            outstanding: AtomicUsize::new(0),
            max_outstanding,
        })
    }

    /// Returns a pool-born record in `Reset` state, or
    /// [`crate::error::LogCoreError::PoolExhausted`] if too many records
    /// allocated from this pool are already outstanding. The caller is
    /// expected to fall back to [`Record::new_heap`] on that error.
    pub fn get(self: &Arc<Pool>) -> Result<Record, crate::error::LogCoreError> {
        let previous = self.outstanding.fetch_add(1, Ordering::AcqRel);
        if previous >= self.max_outstanding {
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
            return Err(crate::error::LogCoreError::PoolExhausted);
        }
        let message = self.free.lock().pop_front().unwrap_or_default();
        Ok(Record(Arc::new(RecordInner {
            message: Mutex::new(message),
            sequence_cache: AtomicU64::new(0),
            origin: Origin::Pooled(self.clone()),
        })))
    }

    fn recycle(&self, message: LogMessage) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        let mut free = self.free.lock();
        if free.len() < self.max_outstanding {
            free.push_back(message);
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_record_mutates_then_locks_after_emit() {
        let record = Record::new_heap();
        record.with_message_mut(|m| {
            m.set_body("hello").set_severity(Severity::Info);
        });
        record.mark_emitted(1);
        assert!(record.with_message(|m| m.emitted));
    }

    #[test]
    #[should_panic(expected = "mutating a record after it has been emitted")]
    fn mutating_after_emit_panics() {
        let record = Record::new_heap();
        record.mark_emitted(1);
        record.with_message_mut(|m| {
            m.set_body("too late");
        });
    }

    #[test]
    fn pool_returns_record_equal_to_fresh_default_after_release() {
        let pool = Pool::new(4);
        {
            let record = pool.get().unwrap();
            record.with_message_mut(|m| {
                m.set_body("payload").add_keyword("k1");
            });
            record.mark_emitted(42);
            // record drops here -> recycled
        }
        assert_eq!(pool.free_count(), 1);
        let recycled = pool.get().unwrap();
        let fresh = LogMessage::default();
        assert!(recycled.with_message(|m| m.structurally_eq_ignoring_transient(&fresh)));
    }

    #[test]
    fn pool_exhaustion_is_reported() {
        let pool = Pool::new(1);
        let _first = pool.get().unwrap();
        let second = pool.get();
        assert_eq!(second.unwrap_err(), crate::error::LogCoreError::PoolExhausted);
    }

    #[test]
    fn detached_clone_is_heap_born_and_unemitted() {
        let record = Record::new_heap();
        record.with_message_mut(|m| { m.set_body("original"); });
        record.mark_emitted(7);
        let clone = record.clone_detached();
        assert!(!clone.with_message(|m| m.emitted));
        assert_eq!(clone.sequence(), 0);
        assert_eq!(clone.with_message(|m| m.body.clone()), "original");
    }
}
