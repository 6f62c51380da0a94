//! The distribution hub: interns logger names, binds them to distribution
//! groups, stamps sequence numbers, and fans records out to every sink in a
//! group. One process-wide [`Hub`] is reachable through [`hub()`].

use crate::gate::LogGate;
use crate::gate::LoggerConfig;
use crate::observer::{Observer, Publisher};
use crate::record::{Pool, Record};
use crate::sink::Sink;
use ahash::AHashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const ID_INVALID: i32 = -1;

/// Stable per-name identity plus the sequenced config that loggers of this
/// name observe.
pub struct LoggerSourceInfo {
    pub id: i32,
    pub name: String,
    pub config: Arc<Publisher<LoggerConfig>>,
}

struct GroupEntry {
    sinks: Vec<Arc<dyn Sink>>,
    sick: Vec<AtomicBool>,
    sick_since: Mutex<Vec<Option<Instant>>>,
    pool: Option<Arc<Pool>>,
    default_gate: LogGate,
    completed_through: AtomicU64,
}

const SICK_RETRY_COOLDOWN: Duration = Duration::from_secs(5);

impl GroupEntry {
    fn new(sinks: Vec<Arc<dyn Sink>>, default_gate: LogGate, pool_capacity: Option<usize>) -> GroupEntry {
        let n = sinks.len();
        let all_support_pool = sinks.iter().all(|s| s.supports_refcounted_release());
        GroupEntry {
            sinks,
            sick: (0..n).map(|_| AtomicBool::new(false)).collect(),
            sick_since: Mutex::new(vec![None; n]),
            pool: if all_support_pool { pool_capacity.map(Pool::new) } else { None },
            default_gate,
            completed_through: AtomicU64::new(0),
        }
    }

    fn is_sick(&self, idx: usize) -> bool {
        if !self.sick[idx].load(Ordering::Acquire) {
            return false;
        }
        let since = self.sick_since.lock()[idx];
        match since {
            Some(t) if t.elapsed() >= SICK_RETRY_COOLDOWN => {
                // give it another chance; mark healthy optimistically
                self.sick[idx].store(false, Ordering::Release);
                false
            }
            _ => true,
        }
    }

    fn mark_sick(&self, idx: usize) {
        self.sick[idx].store(true, Ordering::Release);
        self.sick_since.lock()[idx] = Some(Instant::now());
    }
}

pub struct Hub {
    names: RwLock<AHashMap<String, i32>>,
    infos: RwLock<Vec<Arc<LoggerSourceInfo>>>,
    groups: RwLock<AHashMap<String, Arc<GroupEntry>>>,
    sequence: AtomicU64,
    shut_down: AtomicBool,
    last_enqueued_by_logger: Mutex<AHashMap<i32, u64>>,
}

impl Hub {
    fn new() -> Hub {
        Hub {
            names: RwLock::new(AHashMap::new()),
            infos: RwLock::new(Vec::new()),
            groups: RwLock::new(AHashMap::new()),
            sequence: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
            last_enqueued_by_logger: Mutex::new(AHashMap::new()),
        }
    }

    /// Builds an unshared hub instance for tests that want isolation from
    /// the process-wide singleton.
    #[doc(hidden)]
    pub fn new_for_test() -> Hub {
        Hub::new()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Interns `name`, creating a new [`LoggerSourceInfo`] with an unbound
    /// (`""`) group the first time it's seen.
    pub fn intern(&self, name: &str) -> Arc<LoggerSourceInfo> {
        if let Some(&id) = self.names.read().get(name) {
            return self.infos.read()[id as usize].clone();
        }
        let mut names = self.names.write();
        if let Some(&id) = names.get(name) {
            return self.infos.read()[id as usize].clone();
        }
        let mut infos = self.infos.write();
        let id = infos.len() as i32;
        let info = Arc::new(LoggerSourceInfo {
            id,
            name: name.to_string(),
            config: Publisher::new(LoggerConfig::new("", LogGate::NONE)),
        });
        infos.push(info.clone());
        names.insert(name.to_string(), id);
        info
    }

    pub fn new_observer(&self, info: &Arc<LoggerSourceInfo>) -> Observer<LoggerConfig> {
        Observer::new(info.config.clone())
    }

    /// Registers (or replaces) a distribution group's sink list. `pool_capacity`
    /// enables record pooling for the group if every sink in it declares
    /// `supports_refcounted_release`.
    pub fn define_group(&self, group_name: &str, sinks: Vec<Arc<dyn Sink>>, default_gate: LogGate, pool_capacity: Option<usize>) {
        let entry = Arc::new(GroupEntry::new(sinks, default_gate, pool_capacity));
        self.groups.write().insert(group_name.to_string(), entry);
    }

    /// Binds `logger_name` to `group_name`, inheriting that group's default
    /// gate. Existing `Observer`s for this logger pick the change up on
    /// their next `update()` call.
    pub fn set_group(&self, logger_name: &str, group_name: &str) {
        let info = self.intern(logger_name);
        let gate = self
            .groups
            .read()
            .get(group_name)
            .map(|g| g.default_gate)
            .unwrap_or(LogGate::NONE);
        let supports_pool = self
            .groups
            .read()
            .get(group_name)
            .map(|g| g.pool.is_some())
            .unwrap_or(false);
        let mut config = LoggerConfig::new(group_name, gate);
        config.supports_refcounted_release = supports_pool;
        info.config.set(config);
    }

    /// Overrides just the gate for a logger without touching its group
    /// binding.
    pub fn set_gate(&self, logger_name: &str, gate: LogGate) {
        let info = self.intern(logger_name);
        let mut config = (*info.config.get()).clone();
        config.gate = gate;
        info.config.set(config);
    }

    pub fn allocate_record(&self, group_name: &str) -> Record {
        let groups = self.groups.read();
        match groups.get(group_name).and_then(|g| g.pool.as_ref()) {
            Some(pool) => pool.get().unwrap_or_else(|_| Record::new_heap()),
            None => Record::new_heap(),
        }
    }

    /// Stamps a sequence number and hands a fan-out copy to every non-sick
    /// sink in `group_name`. Sinks that panic are isolated ("marked sick")
    /// and skipped until their cooldown elapses.
    pub fn distribute(&self, logger_id: i32, group_name: &str, record: Record) {
        if self.is_shut_down() {
            return;
        }
        let groups = self.groups.read();
        let Some(group) = groups.get(group_name) else {
            return;
        };
        let seq = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        record.mark_emitted(seq);
        self.last_enqueued_by_logger.lock().insert(logger_id, seq);

        for (idx, sink) in group.sinks.iter().enumerate() {
            if group.is_sick(idx) {
                continue;
            }
            let handle = record.clone_ref();
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink.handle(handle)));
            if outcome.is_err() {
                group.mark_sick(idx);
                tracing::error!(target: "logcore::internal", sink = sink.name(), "sink panicked, marking sick");
            }
        }
        group.completed_through.fetch_max(seq, Ordering::AcqRel);
    }

    /// Blocks until every sink in `logger_name`'s group has been invoked for
    /// every record enqueued on it so far, or `deadline` passes. This
    /// tracks *invocation*, not necessarily the sink's own end-to-end
    /// delivery (queue adapters report that separately via `flush`).
    pub fn wait_for_completion(&self, logger_name: &str, deadline: Instant) -> bool {
        let info = self.intern(logger_name);
        let config = info.config.get();
        let target_seq = *self
            .last_enqueued_by_logger
            .lock()
            .get(&info.id)
            .unwrap_or(&0);
        if target_seq == 0 {
            return true;
        }
        loop {
            let done = self
                .groups
                .read()
                .get(&config.group_name)
                .map(|g| g.completed_through.load(Ordering::Acquire) >= target_seq)
                .unwrap_or(true);
            if done {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Flushes and shuts down every sink of every group, then marks the hub
    /// shut down. Further `distribute` calls become no-ops.
    pub fn teardown(&self) {
        self.shut_down.store(true, Ordering::Release);
        for group in self.groups.read().values() {
            for sink in &group.sinks {
                sink.flush();
                sink.shutdown();
            }
        }
    }
}

static HUB: OnceCell<Hub> = OnceCell::new();

/// Explicit process-wide initialization. Calling this more than once is a
/// no-op after the first call wins.
pub fn init() -> &'static Hub {
    HUB.get_or_init(Hub::new)
}

/// Returns the singleton, initializing it on first use.
pub fn hub() -> &'static Hub {
    init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::collecting::CollectingSink;

    #[test]
    fn distribute_fans_out_to_every_sink_in_group() {
        let hub = Hub::new();
        let a = Arc::new(CollectingSink::new("a"));
        let b = Arc::new(CollectingSink::new("b"));
        hub.define_group("g", vec![a.clone(), b.clone()], LogGate::ALL, None);
        hub.set_group("demo", "g");

        let info = hub.intern("demo");
        let record = hub.allocate_record("g");
        record.with_message_mut(|m| { m.set_body("hello"); });
        hub.distribute(info.id, "g", record);

        assert_eq!(a.bodies(), vec!["hello".to_string()]);
        assert_eq!(b.bodies(), vec!["hello".to_string()]);
    }

    #[test]
    fn wait_for_completion_returns_promptly_when_nothing_was_sent() {
        let hub = Hub::new();
        assert!(hub.wait_for_completion("never-used", Instant::now() + Duration::from_millis(10)));
    }

    struct PanickingSink;
    impl Sink for PanickingSink {
        fn name(&self) -> &str {
            "panicking"
        }
        fn handle(&self, _record: Record) {
            panic!("boom");
        }
    }

    #[test]
    fn a_panicking_sink_is_isolated_and_does_not_block_siblings() {
        let hub = Hub::new();
        let good = Arc::new(CollectingSink::new("good"));
        hub.define_group("g", vec![Arc::new(PanickingSink), good.clone()], LogGate::ALL, None);
        hub.set_group("demo", "g");
        let info = hub.intern("demo");

        for _ in 0..3 {
            let record = hub.allocate_record("g");
            record.with_message_mut(|m| { m.set_body("x"); });
            hub.distribute(info.id, "g", record);
        }
        assert_eq!(good.len(), 3);
    }
}
