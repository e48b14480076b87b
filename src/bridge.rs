//! Bridge façade and lifecycle.
//!
//! A [`Bridge`] owns one script runtime, one correlator and one handler
//! registry. Nothing is shared between bridge instances.
//!
//! ```text
//! Created ──(first readiness call)──▶ Ready
//!    │                                  │
//!    └────────────(destroy)─────────────┴──▶ Destroyed
//! ```

use crate::config::BridgeConfig;
use crate::dispatcher::{Dispatcher, Responder};
use crate::envelope::{compact_params, ScriptResult};
use crate::error::{BridgeError, ErrorCode, Result};
use crate::logging;
use crate::metrics::{BridgeStats, MetricsCollector};
use crate::registry::BridgeHandler;
use crate::runtime::{InboundSink, RuntimeHandle, ScriptEngine, ScriptPort};
use crate::value::{BridgeValue, ValueMap};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, instrument, warn};

/// Lifecycle state of a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Runtime constructed, peer not ready yet
    Created,
    /// The peer signalled readiness
    Ready,
    /// Torn down; terminal
    Destroyed,
}

/// Observer receiving script console lines
pub type ConsoleObserver = Arc<dyn Fn(&str) + Send + Sync>;

type ReadyContinuation = Box<dyn FnOnce() + Send + 'static>;

struct BridgeInner {
    id: String,
    config: BridgeConfig,
    dispatcher: Dispatcher,
    metrics: Arc<MetricsCollector>,
    state: watch::Sender<LifecycleState>,
    /// Guards the Created → Ready transition together with the waiter list
    ready_waiters: Mutex<Vec<ReadyContinuation>>,
    console_observer: RwLock<Option<ConsoleObserver>>,
    created_at: DateTime<Utc>,
    ready_at: Mutex<Option<DateTime<Utc>>>,
}

/// Messaging bridge between native code and an embedded script runtime.
///
/// Clones share the same bridge. The bridge is destroyed by [`destroy`]
/// or when the last clone is dropped.
///
/// [`destroy`]: Bridge::destroy
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl Bridge {
    /// Start a bridge.
    ///
    /// `factory` runs on the new runtime thread and builds the engine; the
    /// [`ScriptPort`] it receives must be exposed to scripts as the native
    /// interface. Bootstrap scripts are evaluated before anything else.
    #[instrument(skip_all, fields(thread = %config.thread_name))]
    pub fn spawn<E, F>(config: BridgeConfig, factory: F) -> Result<Self>
    where
        E: ScriptEngine,
        F: FnOnce(ScriptPort) -> anyhow::Result<E> + Send + 'static,
    {
        config.validate()?;

        let id = uuid::Uuid::new_v4().to_string();
        let metrics = Arc::new(MetricsCollector::new());
        let dispatcher = Dispatcher::new(
            id.clone(),
            config.entry_point.clone(),
            config.callback_prefix.clone(),
            Arc::clone(&metrics),
        );
        let (state, _) = watch::channel(LifecycleState::Created);

        let inner = Arc::new(BridgeInner {
            id,
            config,
            dispatcher,
            metrics,
            state,
            ready_waiters: Mutex::new(Vec::new()),
            console_observer: RwLock::new(None),
            created_at: Utc::now(),
            ready_at: Mutex::new(None),
        });
        inner.install_ready_handler()?;

        let hook_metrics = Arc::clone(&inner.metrics);
        let runtime = RuntimeHandle::new(inner.config.thread_name.clone()).with_eval_error_hook(
            Arc::new(move |_: &anyhow::Error| hook_metrics.record_error(ErrorCode::EngineError)),
        );
        for script in inner.config.bootstrap_scripts() {
            runtime.evaluate(script)?;
        }

        // Attached before launch so the bootstrap can reach native handlers
        let runtime = Arc::new(runtime);
        inner.dispatcher.attach_runtime(Arc::clone(&runtime));

        let weak_inner = Arc::downgrade(&inner);
        let sink: Weak<dyn InboundSink> = weak_inner;
        let port = ScriptPort::new(sink);
        runtime.launch(move || factory(port))?;

        info!(bridge = %inner.id, "Bridge started");
        Ok(Self { inner })
    }

    /// Bridge instance id
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The configuration the bridge was started with
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *self.inner.state.borrow()
    }

    /// Check if the peer has signalled readiness
    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    /// Register a native handler the script side may call.
    ///
    /// Replaces any handler with the same name, including the built-in
    /// readiness handler.
    pub fn register(&self, name: impl Into<String>, handler: impl BridgeHandler + 'static) -> Result<()> {
        self.inner.ensure_alive()?;
        let name = name.into();
        if name == self.inner.config.ready_handler {
            warn!(bridge = %self.inner.id, handler = %name, "Replacing built-in readiness handler");
        }
        self.inner.dispatcher.registry().register(name, Arc::new(handler))
    }

    /// Unregister a handler; returns whether one was present
    pub fn remove(&self, name: &str) -> bool {
        self.inner.dispatcher.registry().remove(name).is_some()
    }

    /// Registered handler names
    pub fn handler_names(&self) -> Vec<String> {
        self.inner.dispatcher.registry().names()
    }

    /// Call a script operation without expecting a response
    pub fn notify(&self, handler_name: &str, data: Option<BridgeValue>) -> Result<()> {
        self.inner
            .dispatcher
            .send(handler_name, data, None)
            .map(|_| ())
    }

    /// Call a script operation; `completion` receives its `responseData`.
    ///
    /// Returns the callback id. The completion is never invoked if the call
    /// is abandoned by [`reset`](Self::reset) or [`destroy`](Self::destroy).
    pub fn call(
        &self,
        handler_name: &str,
        data: Option<BridgeValue>,
        completion: impl FnOnce(Option<BridgeValue>) + Send + 'static,
    ) -> Result<String> {
        self.inner
            .dispatcher
            .send_with_callback(handler_name, data, Box::new(completion))
    }

    /// Call a script operation and wait for its response.
    ///
    /// Dropping the future cancels the call; a late response is then
    /// ignored. Reset or teardown fails it with `Abandoned`. There is no
    /// built-in timeout.
    pub async fn call_async(
        &self,
        handler_name: &str,
        data: Option<BridgeValue>,
    ) -> Result<Option<BridgeValue>> {
        let (tx, rx) = oneshot::channel();
        let callback_id = self.inner.dispatcher.send_with_callback(
            handler_name,
            data,
            Box::new(move |response| {
                let _ = tx.send(response);
            }),
        )?;

        let mut guard = PendingCall {
            dispatcher: self.inner.dispatcher.clone(),
            metrics: Arc::clone(&self.inner.metrics),
            callback_id: Some(callback_id),
        };

        let outcome = rx.await;
        let callback_id = guard.disarm();
        outcome.map_err(|_| BridgeError::Abandoned(callback_id))
    }

    /// Call a script operation returning a `{state, result}` envelope.
    ///
    /// Null parameters are dropped and an empty mapping is sent as no data.
    pub async fn call_unwrapped(&self, handler_name: &str, params: ValueMap) -> Result<BridgeValue> {
        let response = self
            .call_async(handler_name, compact_params(params))
            .await?;
        ScriptResult::from_response(response)?.into_result()
    }

    /// Deliver a wire string from the script side
    pub fn receive(&self, raw: &str) {
        self.inner.on_message(raw);
    }

    /// Deliver a console line from the script side
    pub fn console_log(&self, line: &str) {
        self.inner.on_console(line);
    }

    /// Run `f` once the peer is ready; immediately if it already is.
    ///
    /// Dropped without running if the bridge is destroyed first.
    pub fn on_ready(&self, f: impl FnOnce() + Send + 'static) {
        let mut waiters = self.inner.ready_waiters.lock();
        let state = self.state();
        match state {
            LifecycleState::Created => waiters.push(Box::new(f)),
            LifecycleState::Ready => {
                drop(waiters);
                f();
            }
            LifecycleState::Destroyed => {}
        }
    }

    /// Wait until the peer is ready.
    ///
    /// Fails with `RuntimeUnavailable` if the bridge is destroyed first.
    pub async fn ready(&self) -> Result<()> {
        let mut rx = self.inner.state.subscribe();
        let state = *rx
            .wait_for(|state| *state != LifecycleState::Created)
            .await
            .map_err(|_| BridgeError::RuntimeUnavailable)?;

        match state {
            LifecycleState::Ready => Ok(()),
            _ => Err(BridgeError::RuntimeUnavailable),
        }
    }

    /// Install the console observer, replacing any previous one
    pub fn set_console_observer(&self, observer: impl Fn(&str) + Send + Sync + 'static) {
        *self.inner.console_observer.write() = Some(Arc::new(observer));
    }

    /// Remove the console observer; later lines are dropped
    pub fn clear_console_observer(&self) {
        self.inner.console_observer.write().take();
    }

    /// Number of calls awaiting a response
    pub fn pending_calls(&self) -> usize {
        self.inner.dispatcher.correlator().len()
    }

    /// Abandon every pending call and restart callback id numbering.
    ///
    /// Handlers and the runtime are kept. Returns the number abandoned.
    pub fn reset(&self) -> usize {
        let abandoned = self.inner.dispatcher.correlator().reset();
        self.inner.metrics.record_abandoned(abandoned);
        debug!(bridge = %self.inner.id, abandoned, "Bridge reset");
        abandoned
    }

    /// Tear the bridge down. Idempotent.
    ///
    /// Pending calls are abandoned, handlers cleared and the runtime thread
    /// stopped. A destroyed bridge cannot be restarted.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Bridge counters
    pub fn metrics(&self) -> &MetricsCollector {
        &self.inner.metrics
    }

    /// Snapshot of counters and state
    pub fn stats(&self) -> BridgeStats {
        let metrics = &self.inner.metrics;
        BridgeStats {
            bridge_id: self.inner.id.clone(),
            state: self.state(),
            calls_sent: metrics.calls_sent(),
            responses_resolved: metrics.responses_resolved(),
            stale_responses: metrics.stale_responses(),
            inbound_calls: metrics.inbound_calls(),
            responses_sent: metrics.responses_sent(),
            pending_calls: self.pending_calls(),
            registered_handlers: self.inner.dispatcher.registry().len(),
            created_at: self.inner.created_at,
            ready_at: *self.inner.ready_at.lock(),
        }
    }

    /// Export Prometheus-format metrics
    pub fn prometheus_metrics(&self) -> String {
        let mut output = self.inner.metrics.to_prometheus();

        output.push_str("\n# HELP etherweb_bridge_pending_calls Calls awaiting a response\n");
        output.push_str("# TYPE etherweb_bridge_pending_calls gauge\n");
        output.push_str(&format!(
            "etherweb_bridge_pending_calls {}\n",
            self.pending_calls()
        ));

        output.push_str("\n# HELP etherweb_bridge_handlers Registered native handlers\n");
        output.push_str("# TYPE etherweb_bridge_handlers gauge\n");
        output.push_str(&format!(
            "etherweb_bridge_handlers {}\n",
            self.inner.dispatcher.registry().len()
        ));

        output
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl BridgeInner {
    fn is_destroyed(&self) -> bool {
        *self.state.borrow() == LifecycleState::Destroyed
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(BridgeError::RuntimeUnavailable)
        } else {
            Ok(())
        }
    }

    fn install_ready_handler(self: &Arc<Self>) -> Result<()> {
        let weak = Arc::downgrade(self);
        self.dispatcher.registry().register(
            self.config.ready_handler.clone(),
            Arc::new(move |_: Option<BridgeValue>, responder: Option<Responder>| {
                if let Some(inner) = weak.upgrade() {
                    inner.mark_ready();
                }
                if let Some(responder) = responder {
                    let ack: BridgeValue = [("status", "received")].into_iter().collect();
                    if let Err(e) = responder.respond(ack) {
                        debug!(error = %e, "Readiness acknowledgement not sent");
                    }
                }
            }),
        )
    }

    fn mark_ready(&self) {
        let continuations = {
            let mut waiters = self.ready_waiters.lock();
            let transitioned = self.state.send_if_modified(|state| {
                if *state == LifecycleState::Created {
                    *state = LifecycleState::Ready;
                    true
                } else {
                    false
                }
            });
            if !transitioned {
                debug!(bridge = %self.id, "Repeated readiness signal ignored");
                return;
            }
            *self.ready_at.lock() = Some(Utc::now());
            std::mem::take(&mut *waiters)
        };

        info!(bridge = %self.id, "Script side ready");
        for continuation in continuations {
            continuation();
        }
    }

    fn destroy(&self) {
        let (previous, waiters) = {
            let mut waiters = self.ready_waiters.lock();
            let previous = self.state.send_replace(LifecycleState::Destroyed);
            (previous, std::mem::take(&mut *waiters))
        };
        drop(waiters);
        if previous == LifecycleState::Destroyed {
            return;
        }

        // Runtime goes first: a call registered after this point fails in
        // delivery, and one registered before it is dropped by the reset.
        if let Some(runtime) = self.dispatcher.detach_runtime() {
            runtime.close();
        }

        let abandoned = self.dispatcher.correlator().reset();
        self.metrics.record_abandoned(abandoned);
        self.dispatcher.registry().clear();
        self.console_observer.write().take();

        info!(bridge = %self.id, abandoned, "Bridge destroyed");
    }
}

impl InboundSink for BridgeInner {
    fn on_message(&self, raw: &str) {
        if self.is_destroyed() {
            debug!(bridge = %self.id, "Ignoring message after teardown");
            return;
        }
        self.dispatcher.receive(raw);
    }

    fn on_console(&self, line: &str) {
        if self.is_destroyed() {
            return;
        }
        if self.config.log_console {
            logging::forward_console_line(&self.id, line);
        }

        let observer = self.console_observer.read().clone();
        match observer {
            Some(observer) => {
                observer(line);
                self.metrics.record_console(true);
            }
            None => self.metrics.record_console(false),
        }
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Withdraws a pending call if its future is dropped before completion
struct PendingCall {
    dispatcher: Dispatcher,
    metrics: Arc<MetricsCollector>,
    callback_id: Option<String>,
}

impl PendingCall {
    fn disarm(&mut self) -> String {
        self.callback_id.take().unwrap_or_default()
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if let Some(callback_id) = self.callback_id.take() {
            if self.dispatcher.correlator().cancel(&callback_id) {
                self.metrics.record_cancelled();
                debug!(callback_id = %callback_id, "Pending call cancelled");
            }
        }
    }
}
