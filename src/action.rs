//! Asynchronous action reporting: a small state machine pairing a client
//! (starts the action, waits on it, can request cancellation) with a
//! provider (does the work, publishes progress, completes it).
//!
//! Independent of the logging side of this crate except that an action can
//! optionally be handed a [`crate::source::Logger`] for its own lifecycle
//! trace messages.

use crate::source::Logger;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStateCode {
    Initial,
    Ready,
    Started,
    Issued,
    Complete,
    /// Entered when a transition outside the table above is attempted;
    /// terminal, never leaves this state.
    Invalid,
}

#[derive(Debug, Clone)]
pub struct ActionStateSnapshot {
    pub state: ActionStateCode,
    pub transition_timestamp: DateTime<Utc>,
    pub result_code: String,
    pub cancel_requested: bool,
    pub named_values: Arc<HashMap<String, Value>>,
}

impl ActionStateSnapshot {
    pub fn is_complete(&self) -> bool {
        self.state == ActionStateCode::Complete
    }

    pub fn succeeded(&self) -> bool {
        self.is_complete() && self.result_code.is_empty()
    }

    pub fn failed(&self) -> bool {
        self.is_complete() && !self.result_code.is_empty()
    }
}

pub type ListenerToken = u64;
type Listener = Arc<dyn Fn(&ActionStateSnapshot) + Send + Sync>;

struct ActionInner<P> {
    state: ActionStateCode,
    transition_timestamp: DateTime<Utc>,
    result_code: String,
    cancel_requested: bool,
    named_values: Arc<HashMap<String, Value>>,
    param: Option<Arc<P>>,
}

impl<P> ActionInner<P> {
    fn snapshot(&self) -> ActionStateSnapshot {
        ActionStateSnapshot {
            state: self.state,
            transition_timestamp: self.transition_timestamp,
            result_code: self.result_code.clone(),
            cancel_requested: self.cancel_requested,
            named_values: self.named_values.clone(),
        }
    }
}

struct ActionCore<P> {
    inner: Mutex<ActionInner<P>>,
    delegate: Box<dyn Fn(&ProviderFacet<P>) -> Option<String> + Send + Sync>,
    complete_listeners: Mutex<Vec<(ListenerToken, Listener)>>,
    update_listeners: Mutex<Vec<(ListenerToken, Listener)>>,
    next_token: AtomicU64,
    logger: Option<Logger>,
}

impl<P: Send + Sync + 'static> ActionCore<P> {
    fn snapshot(&self) -> ActionStateSnapshot {
        self.inner.lock().snapshot()
    }

    fn notify(&self, which: &Mutex<Vec<(ListenerToken, Listener)>>, snapshot: &ActionStateSnapshot) {
        let listeners: Vec<Listener> = which.lock().iter().map(|(_, cb)| cb.clone()).collect();
        for cb in listeners {
            cb(snapshot);
        }
    }

    fn notify_update(&self) {
        let snapshot = self.snapshot();
        self.notify(&self.update_listeners, &snapshot);
    }

    fn notify_complete(&self) {
        let snapshot = self.snapshot();
        self.notify(&self.complete_listeners, &snapshot);
    }

    fn trace(&self, what: &str) {
        if let Some(logger) = &self.logger {
            logger.trace().emit(what.to_string());
        }
    }

    fn start(self: &Arc<Self>, param: P) -> Result<(), crate::error::LogCoreError> {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                ActionStateCode::Initial | ActionStateCode::Ready | ActionStateCode::Complete => {
                    inner.state = ActionStateCode::Started;
                    inner.transition_timestamp = Utc::now();
                    inner.cancel_requested = false;
                    inner.result_code.clear();
                    inner.named_values = Arc::new(HashMap::new());
                    inner.param = Some(Arc::new(param));
                }
                ActionStateCode::Started | ActionStateCode::Issued | ActionStateCode::Invalid => {
                    let message = format!("Illegal transition: start from {:?}", inner.state);
                    inner.state = ActionStateCode::Invalid;
                    inner.result_code = message.clone();
                    drop(inner);
                    self.notify_update();
                    return Err(crate::error::LogCoreError::LogicViolation(message));
                }
            }
        }
        self.trace("start");
        self.notify_update();
        let this = self.clone();
        std::thread::spawn(move || this.run_provider_cycle());
        Ok(())
    }

    fn run_provider_cycle(self: Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            if inner.state != ActionStateCode::Started {
                return;
            }
            inner.state = ActionStateCode::Issued;
            inner.transition_timestamp = Utc::now();
        }
        self.trace("issued");
        self.notify_update();

        let facet = ProviderFacet { core: self.clone() };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (self.delegate)(&facet)));
        match result {
            Ok(Some(code)) => self.complete_internal(code, None),
            Ok(None) => {}
            Err(_) => self.complete_internal("delegate panicked".to_string(), None),
        }
    }

    fn complete_internal(&self, result_code: String, named_values: Option<HashMap<String, Value>>) {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                ActionStateCode::Started | ActionStateCode::Issued => {
                    inner.state = ActionStateCode::Complete;
                    inner.transition_timestamp = Utc::now();
                    inner.result_code = result_code;
                    if let Some(nv) = named_values {
                        let mut merged = (*inner.named_values).clone();
                        merged.extend(nv);
                        inner.named_values = Arc::new(merged);
                    }
                }
                _ => {
                    inner.result_code = format!("Illegal transition: complete from {:?}", inner.state);
                    inner.state = ActionStateCode::Invalid;
                }
            }
        }
        self.trace("complete");
        self.notify_complete();
        self.notify_update();
    }

    fn request_cancel(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ActionStateCode::Complete || inner.cancel_requested {
            return;
        }
        inner.cancel_requested = true;
        drop(inner);
        self.notify_update();
    }

    fn register(which: &Mutex<Vec<(ListenerToken, Listener)>>, token_src: &AtomicU64, f: Listener) -> ListenerToken {
        let token = token_src.fetch_add(1, Ordering::AcqRel);
        which.lock().push((token, f));
        token
    }

    fn unregister(which: &Mutex<Vec<(ListenerToken, Listener)>>, token: ListenerToken) {
        which.lock().retain(|(t, _)| *t != token);
    }
}

/// The view of an in-flight action handed to its delegate.
pub struct ProviderFacet<P> {
    core: Arc<ActionCore<P>>,
}

impl<P: Send + Sync + 'static> ProviderFacet<P> {
    pub fn param(&self) -> Arc<P> {
        self.core
            .inner
            .lock()
            .param
            .clone()
            .expect("param is set before the delegate runs")
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.core.inner.lock().cancel_requested
    }

    pub fn publish_named_values(&self, updates: HashMap<String, Value>) {
        {
            let mut inner = self.core.inner.lock();
            let mut merged = (*inner.named_values).clone();
            merged.extend(updates);
            inner.named_values = Arc::new(merged);
        }
        self.core.notify_update();
    }

    /// Completes the action. `result_code` empty means success; non-empty
    /// is a failure code (e.g. `"Cancel Requested"`).
    pub fn complete(&self, result_code: impl Into<String>, named_values: Option<HashMap<String, Value>>) {
        self.core.complete_internal(result_code.into(), named_values);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    TimedOut,
}

/// A pooled `Mutex<bool>` + `Condvar` pair, reused across waits instead of
/// allocated fresh each time.
struct WaitEvent {
    mutex: Mutex<bool>,
    condvar: Condvar,
}

impl WaitEvent {
    fn new() -> WaitEvent {
        WaitEvent {
            mutex: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn notify(&self) {
        let mut signaled = self.mutex.lock();
        *signaled = true;
        self.condvar.notify_all();
    }

    fn wait_timeout(&self, dur: Duration) {
        let mut signaled = self.mutex.lock();
        if !*signaled {
            self.condvar.wait_for(&mut signaled, dur);
        }
        *signaled = false;
    }
}

struct WaitEventPool {
    free: Mutex<Vec<Arc<WaitEvent>>>,
}

impl WaitEventPool {
    fn global() -> &'static WaitEventPool {
        static POOL: OnceCell<WaitEventPool> = OnceCell::new();
        POOL.get_or_init(|| WaitEventPool { free: Mutex::new(Vec::new()) })
    }

    fn acquire(&self) -> Arc<WaitEvent> {
        self.free.lock().pop().unwrap_or_else(|| Arc::new(WaitEvent::new()))
    }

    fn release(&self, event: Arc<WaitEvent>) {
        self.free.lock().push(event);
    }
}

/// A client/provider pair around one action state machine. Cloning shares
/// the same underlying action.
pub struct Action<P: Send + Sync + 'static>(Arc<ActionCore<P>>);

impl<P: Send + Sync + 'static> Clone for Action<P> {
    fn clone(&self) -> Self {
        Action(self.0.clone())
    }
}

impl<P: Send + Sync + 'static> Action<P> {
    pub fn new(delegate: impl Fn(&ProviderFacet<P>) -> Option<String> + Send + Sync + 'static) -> Action<P> {
        Self::build(delegate, None)
    }

    pub fn with_logger(delegate: impl Fn(&ProviderFacet<P>) -> Option<String> + Send + Sync + 'static, logger: Logger) -> Action<P> {
        Self::build(delegate, Some(logger))
    }

    fn build(delegate: impl Fn(&ProviderFacet<P>) -> Option<String> + Send + Sync + 'static, logger: Option<Logger>) -> Action<P> {
        Action(Arc::new(ActionCore {
            inner: Mutex::new(ActionInner {
                state: ActionStateCode::Ready,
                transition_timestamp: Utc::now(),
                result_code: String::new(),
                cancel_requested: false,
                named_values: Arc::new(HashMap::new()),
                param: None,
            }),
            delegate: Box::new(delegate),
            complete_listeners: Mutex::new(Vec::new()),
            update_listeners: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(0),
            logger,
        }))
    }

    pub fn state(&self) -> ActionStateSnapshot {
        self.0.snapshot()
    }

    pub fn start(&self, param: P) -> Result<(), crate::error::LogCoreError> {
        self.0.start(param)
    }

    pub fn request_cancel(&self) {
        self.0.request_cancel();
    }

    pub fn on_complete(&self, f: impl Fn(&ActionStateSnapshot) + Send + Sync + 'static) -> ListenerToken {
        ActionCore::<P>::register(&self.0.complete_listeners, &self.0.next_token, Arc::new(f))
    }

    pub fn on_update(&self, f: impl Fn(&ActionStateSnapshot) + Send + Sync + 'static) -> ListenerToken {
        ActionCore::<P>::register(&self.0.update_listeners, &self.0.next_token, Arc::new(f))
    }

    pub fn remove_complete_listener(&self, token: ListenerToken) {
        ActionCore::<P>::unregister(&self.0.complete_listeners, token);
    }

    pub fn remove_update_listener(&self, token: ListenerToken) {
        ActionCore::<P>::unregister(&self.0.update_listeners, token);
    }

    /// Blocks the calling thread until the action reaches `Complete` or
    /// `deadline` passes. Uses a pooled wait-event rather than allocating a
    /// fresh condvar per call.
    pub fn wait_until_complete(&self, deadline: Instant) -> WaitOutcome {
        if self.state().is_complete() {
            return WaitOutcome::Completed;
        }
        let pool = WaitEventPool::global();
        let event = pool.acquire();
        let wake_event = event.clone();
        let token = self.on_complete(move |_| wake_event.notify());

        let outcome = loop {
            if self.state().is_complete() {
                break WaitOutcome::Completed;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break WaitOutcome::TimedOut;
            }
            event.wait_timeout(remaining.min(Duration::from_millis(50)));
        };
        self.remove_complete_listener(token);
        pool.release(event);
        outcome
    }

    pub fn run(&self, param: P, deadline: Instant) -> WaitOutcome {
        if self.start(param).is_err() {
            return WaitOutcome::TimedOut;
        }
        self.wait_until_complete(deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_completes_with_empty_result_code() {
        let action: Action<u32> = Action::new(|facet| {
            let n = *facet.param();
            facet.complete("", Some(HashMap::from([("doubled".to_string(), Value::from(n * 2))])));
            None
        });
        let outcome = action.run(21, Instant::now() + Duration::from_secs(1));
        assert_eq!(outcome, WaitOutcome::Completed);
        let snap = action.state();
        assert!(snap.succeeded());
        assert_eq!(snap.named_values.get("doubled"), Some(&Value::from(42)));
    }

    #[test]
    fn completion_named_values_merge_with_published_ones_instead_of_replacing_them() {
        let action: Action<()> = Action::new(|facet| {
            facet.publish_named_values(HashMap::from([("progress".to_string(), Value::from(0.5))]));
            facet.complete("", Some(HashMap::from([("result".to_string(), Value::from(42))])));
            None
        });
        let outcome = action.run((), Instant::now() + Duration::from_secs(1));
        assert_eq!(outcome, WaitOutcome::Completed);
        let snap = action.state();
        assert_eq!(snap.named_values.get("progress"), Some(&Value::from(0.5)));
        assert_eq!(snap.named_values.get("result"), Some(&Value::from(42)));
    }

    #[test]
    fn delegate_return_value_completes_the_action() {
        let action: Action<()> = Action::new(|_facet| Some("done".to_string()));
        let outcome = action.run((), Instant::now() + Duration::from_secs(1));
        assert_eq!(outcome, WaitOutcome::Completed);
        assert!(action.state().failed());
        assert_eq!(action.state().result_code, "done");
    }

    #[test]
    fn cancellation_is_cooperative_and_idempotent() {
        let action: Action<()> = Action::new(|facet| {
            loop {
                if facet.is_cancel_requested() {
                    facet.complete("Cancel Requested", None);
                    return None;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        });
        action.start(()).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        action.request_cancel();
        action.request_cancel(); // idempotent, must not panic or double-fire
        let outcome = action.wait_until_complete(Instant::now() + Duration::from_secs(2));
        assert_eq!(outcome, WaitOutcome::Completed);
        assert_eq!(action.state().result_code, "Cancel Requested");
    }

    #[test]
    fn starting_twice_without_completing_is_invalid() {
        let action: Action<()> = Action::new(|_facet| {
            std::thread::sleep(Duration::from_millis(200));
            Some("late".to_string())
        });
        action.start(()).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        let second = action.start(());
        assert!(second.is_err());
        let snapshot = action.state();
        assert_eq!(snapshot.state, ActionStateCode::Invalid);
        assert!(!snapshot.result_code.is_empty(), "invalid transition must record a non-empty result code");
    }

    #[test]
    fn re_arms_after_complete_for_another_start() {
        let action: Action<u32> = Action::new(|facet| {
            let n = *facet.param();
            facet.complete(if n == 0 { "zero" } else { "" }, None);
            None
        });
        assert_eq!(action.run(1, Instant::now() + Duration::from_secs(1)), WaitOutcome::Completed);
        assert!(action.state().succeeded());
        assert_eq!(action.run(0, Instant::now() + Duration::from_secs(1)), WaitOutcome::Completed);
        assert!(action.state().failed());
    }
}
