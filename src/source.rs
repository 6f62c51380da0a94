//! The logger façade: [`Logger`] plus one [`Emitter`] per severity, and the
//! special-purpose emitters used in tests and fallback paths.

use crate::gate::LoggerConfig;
use crate::hub::{Hub, LoggerSourceInfo};
use crate::observer::Observer;
use crate::record::CallSite;
use crate::severity::Severity;
use parking_lot::Mutex;
use std::panic::Location;
use std::sync::Arc;

/// A named logger bound (indirectly, through its published config) to a
/// distribution group. Cheap to clone: it's a handful of `Arc`s.
#[derive(Clone)]
pub struct Logger {
    hub: &'static Hub,
    pub(crate) source_info: Arc<LoggerSourceInfo>,
    pub(crate) observer: Arc<Observer<LoggerConfig>>,
    instance_gate: Option<crate::gate::LogGate>,
}

impl Logger {
    pub fn new(hub: &'static Hub, name: &str) -> Logger {
        let source_info = hub.intern(name);
        let observer = Arc::new(hub.new_observer(&source_info));
        Logger {
            hub,
            source_info,
            observer,
            instance_gate: None,
        }
    }

    pub fn with_instance_gate(mut self, gate: crate::gate::LogGate) -> Logger {
        self.instance_gate = Some(gate);
        self
    }

    pub fn name(&self) -> &str {
        &self.source_info.name
    }

    pub fn is_enabled(&self, severity: Severity) -> bool {
        if self.hub.is_shut_down() {
            return false;
        }
        if let Some(gate) = self.instance_gate {
            if !gate.allows(severity) {
                return false;
            }
        }
        self.observer.update();
        self.observer.get().gate.allows(severity)
    }

    pub fn emitter(&self, severity: Severity) -> Emitter {
        Emitter {
            logger: self.clone(),
            severity,
        }
    }

    pub fn fatal(&self) -> Emitter {
        self.emitter(Severity::Fatal)
    }
    pub fn error(&self) -> Emitter {
        self.emitter(Severity::Error)
    }
    pub fn warning(&self) -> Emitter {
        self.emitter(Severity::Warning)
    }
    pub fn signif(&self) -> Emitter {
        self.emitter(Severity::Signif)
    }
    pub fn info(&self) -> Emitter {
        self.emitter(Severity::Info)
    }
    pub fn debug(&self) -> Emitter {
        self.emitter(Severity::Debug)
    }
    pub fn trace(&self) -> Emitter {
        self.emitter(Severity::Trace)
    }

    pub fn wait_for_completion(&self, deadline: std::time::Instant) -> bool {
        self.hub.wait_for_completion(self.name(), deadline)
    }

    fn dispatch_with_severity(&self, loc: &'static Location<'static>, severity: Severity, body: String) {
        let config = self.observer.get();
        let record = self.hub.allocate_record(&config.group_name);
        record.with_message_mut(|m| {
            m.set_logger(self.source_info.id, self.name());
            m.set_severity(severity);
            m.set_body(body);
            if config.record_call_site {
                m.set_call_site(Some(CallSite::from(loc)));
            }
        });
        self.hub.distribute(self.source_info.id, &config.group_name, record);
    }
}

/// A tiny, cheaply-constructed object caching `{logger, severity}`. Returned
/// fresh by `Logger::info()` and friends; callers are not expected to hold
/// on to one across calls, though doing so is harmless.
pub struct Emitter {
    logger: Logger,
    severity: Severity,
}

impl Emitter {
    pub fn is_enabled(&self) -> bool {
        self.logger.is_enabled(self.severity)
    }

    #[track_caller]
    pub fn emit(&self, body: impl Into<String>) {
        let loc = Location::caller();
        self.emit_at(loc, body);
    }

    /// For wrapper layers one level removed from the real call site: the
    /// wrapper itself must be `#[track_caller]` so its own `Location::caller()`
    /// resolves to *its* caller, which is then threaded through here.
    pub fn emit_at(&self, loc: &'static Location<'static>, body: impl Into<String>) {
        if !self.is_enabled() {
            return;
        }
        self.logger.dispatch_with_severity(loc, self.severity, body.into());
    }

    /// Lazily formats `f` only if enabled, and never lets a panic inside the
    /// formatter escape the call — it's captured and a fallback body is
    /// emitted instead.
    #[track_caller]
    pub fn emit_with(&self, f: impl FnOnce() -> String) {
        let loc = Location::caller();
        if !self.is_enabled() {
            return;
        }
        let body = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f))
            .unwrap_or_else(|_| "<log message formatting failed>".to_string());
        self.emit_at(loc, body);
    }
}

/// Always disabled, never allocates or emits. Useful as a default/null
/// object so call sites don't need an `Option<Emitter>`.
pub struct NullEmitter;

impl NullEmitter {
    pub fn is_enabled(&self) -> bool {
        false
    }
    pub fn emit(&self, _body: impl Into<String>) {}
}

/// Always enabled; emitting it panics instead of dispatching, using a
/// caller-supplied message factory. Used to verify that a code path is
/// never reached in tests.
pub struct ThrowingEmitter<F: Fn(&str) -> String> {
    factory: F,
}

impl<F: Fn(&str) -> String> ThrowingEmitter<F> {
    pub fn new(factory: F) -> Self {
        ThrowingEmitter { factory }
    }

    pub fn is_enabled(&self) -> bool {
        true
    }

    pub fn emit(&self, body: impl Into<String>) -> ! {
        let body = body.into();
        panic!("{}", (self.factory)(&body));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub body: String,
    pub call_site: Option<(&'static str, u32)>,
}

/// Collects emitted bodies in memory instead of dispatching through a hub.
/// Used by tests that only care about whether/what was logged.
#[derive(Default, Clone)]
pub struct ListEmitter {
    entries: Arc<Mutex<Vec<ListEntry>>>,
}

impl ListEmitter {
    pub fn new() -> ListEmitter {
        ListEmitter::default()
    }

    pub fn is_enabled(&self) -> bool {
        true
    }

    #[track_caller]
    pub fn emit(&self, body: impl Into<String>) {
        let loc = Location::caller();
        self.entries.lock().push(ListEntry {
            body: body.into(),
            call_site: Some((loc.file(), loc.line())),
        });
    }

    pub fn entries(&self) -> Vec<ListEntry> {
        self.entries.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::LogGate;
    use crate::hub::Hub;
    use crate::sinks::collecting::CollectingSink;
    use std::sync::OnceLock;

    fn test_hub() -> &'static Hub {
        static HUB: OnceLock<Hub> = OnceLock::new();
        HUB.get_or_init(Hub::new_for_test)
    }

    #[test]
    fn gate_below_threshold_suppresses_emit_without_touching_sinks() {
        let hub = test_hub();
        let sink = Arc::new(CollectingSink::new("s"));
        hub.define_group("g-source-1", vec![sink.clone()], LogGate::new(Severity::Warning), None);
        hub.set_group("source-test-1", "g-source-1");
        let logger = Logger::new(hub, "source-test-1");

        logger.debug().emit("should be suppressed");
        assert!(sink.is_empty());

        logger.error().emit("should pass");
        assert_eq!(sink.bodies(), vec!["should pass".to_string()]);
    }

    #[test]
    fn list_emitter_records_call_site() {
        let list = ListEmitter::new();
        list.emit("hi");
        let entries = list.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].body, "hi");
        assert!(entries[0].call_site.is_some());
    }

    #[test]
    #[should_panic(expected = "boom: nope")]
    fn throwing_emitter_panics_with_factory_message() {
        let emitter = ThrowingEmitter::new(|body: &str| format!("boom: {body}"));
        emitter.emit("nope");
    }

    #[test]
    fn null_emitter_is_always_disabled() {
        let emitter = NullEmitter;
        assert!(!emitter.is_enabled());
        emitter.emit("ignored");
    }
}
