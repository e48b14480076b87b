//! Message dispatch between native code and the script runtime.
//!
//! The dispatcher is the only component that talks to the runtime. Outbound
//! calls are framed, escaped and handed to the runtime's evaluation queue.
//! Inbound wire strings are decoded and routed either to the correlator
//! (responses) or to the handler registry (calls).

use crate::codec;
use crate::correlator::{CallbackCorrelator, ResponseCallback};
use crate::error::{BridgeError, ErrorCode, Result};
use crate::message::{CallMessage, Message, ResponseMessage};
use crate::metrics::MetricsCollector;
use crate::registry::HandlerRegistry;
use crate::runtime::RuntimeHandle;
use crate::value::BridgeValue;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace, warn};

/// Inner dispatcher state
struct DispatcherInner {
    /// Bridge instance id for diagnostics
    bridge_id: String,
    /// Script function receiving native payloads
    entry_point: String,
    /// Pending outbound calls
    correlator: CallbackCorrelator,
    /// Native handlers
    registry: HandlerRegistry,
    /// Live runtime, absent before start and after teardown
    runtime: RwLock<Option<Arc<RuntimeHandle>>>,
    /// Shared counters
    metrics: Arc<MetricsCollector>,
}

/// Routes messages across the bridge
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Create a dispatcher with no runtime attached
    pub fn new(
        bridge_id: impl Into<String>,
        entry_point: impl Into<String>,
        callback_prefix: impl Into<String>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                bridge_id: bridge_id.into(),
                entry_point: entry_point.into(),
                correlator: CallbackCorrelator::new(callback_prefix),
                registry: HandlerRegistry::new(),
                runtime: RwLock::new(None),
                metrics,
            }),
        }
    }

    /// Attach the runtime that receives outbound commands
    pub fn attach_runtime(&self, runtime: Arc<RuntimeHandle>) {
        *self.inner.runtime.write() = Some(runtime);
    }

    /// Detach the runtime; later sends fail with `RuntimeUnavailable`
    pub fn detach_runtime(&self) -> Option<Arc<RuntimeHandle>> {
        self.inner.runtime.write().take()
    }

    /// Check if a runtime is attached
    pub fn has_runtime(&self) -> bool {
        self.inner.runtime.read().is_some()
    }

    /// The pending-call correlator
    pub fn correlator(&self) -> &CallbackCorrelator {
        &self.inner.correlator
    }

    /// The handler registry
    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    /// Send a call to the script side.
    ///
    /// With a callback the call carries a fresh callback id, which is
    /// returned; without one the message has no `callbackId` key.
    pub fn send(
        &self,
        handler_name: &str,
        data: Option<BridgeValue>,
        callback: Option<ResponseCallback>,
    ) -> Result<Option<String>> {
        match callback {
            Some(callback) => self.send_with_callback(handler_name, data, callback).map(Some),
            None => {
                let mut call = CallMessage::new(handler_name);
                call.data = data;
                self.inner.deliver(&Message::Call(call))?;
                self.inner.metrics.record_call_sent();
                Ok(None)
            }
        }
    }

    /// Send a call expecting a response and return its callback id.
    ///
    /// On failure the pending entry is withdrawn before returning.
    pub fn send_with_callback(
        &self,
        handler_name: &str,
        data: Option<BridgeValue>,
        callback: ResponseCallback,
    ) -> Result<String> {
        // Checked before registering so a dead runtime leaves no entry behind
        if !self.has_runtime() {
            return Err(BridgeError::RuntimeUnavailable);
        }

        let callback_id = self.inner.correlator.register(callback);
        let mut call = CallMessage::new(handler_name).with_callback_id(callback_id.clone());
        call.data = data;

        if let Err(e) = self.inner.deliver(&Message::Call(call)) {
            self.inner.correlator.cancel(&callback_id);
            return Err(e);
        }

        self.inner.metrics.record_call_sent();
        trace!(
            bridge = %self.inner.bridge_id,
            handler = handler_name,
            callback_id = %callback_id,
            "Call sent"
        );
        Ok(callback_id)
    }

    /// Process one wire string posted by the script side.
    ///
    /// Never fails: malformed messages, stale responses and missing
    /// handlers are logged and counted, then dropped.
    pub fn receive(&self, raw: &str) {
        let message = match codec::decode(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(bridge = %self.inner.bridge_id, error = %e, "Dropping malformed message");
                self.inner.metrics.record_error(e.code());
                return;
            }
        };

        match message {
            Message::Response(response) => self.resolve(response),
            Message::Call(call) => self.dispatch_call(call),
        }
    }

    fn resolve(&self, response: ResponseMessage) {
        let resolved = self
            .inner
            .correlator
            .resolve(&response.response_id, response.response_data);
        self.inner.metrics.record_response(resolved);

        if !resolved {
            debug!(
                bridge = %self.inner.bridge_id,
                callback_id = %response.response_id,
                "Ignoring response with no pending call"
            );
        }
    }

    fn dispatch_call(&self, call: CallMessage) {
        let handler = match self.inner.registry.lookup(&call.handler_name) {
            Some(handler) => handler,
            None => {
                warn!(
                    bridge = %self.inner.bridge_id,
                    handler = %call.handler_name,
                    "No handler for message from script"
                );
                self.inner.metrics.record_error(ErrorCode::NoHandler);
                return;
            }
        };

        self.inner.metrics.record_inbound(&call.handler_name);
        let responder = call.callback_id.map(|callback_id| Responder {
            callback_id,
            dispatcher: Arc::downgrade(&self.inner),
        });
        handler.handle(call.data, responder);
    }
}

impl DispatcherInner {
    fn runtime(&self) -> Result<Arc<RuntimeHandle>> {
        self.runtime
            .read()
            .clone()
            .ok_or(BridgeError::RuntimeUnavailable)
    }

    /// Encode, escape and hand one message to the runtime
    fn deliver(&self, message: &Message) -> Result<()> {
        let runtime = self.runtime()?;

        let payload = codec::encode(message).map_err(|e| {
            error!(bridge = %self.bridge_id, error = %e, "Failed to encode message");
            self.metrics.record_error(e.code());
            BridgeError::from(e)
        })?;

        runtime.evaluate(codec::script_command(&self.entry_point, &payload))
    }
}

/// One-shot reply channel for an inbound call that requested a response
pub struct Responder {
    callback_id: String,
    dispatcher: Weak<DispatcherInner>,
}

impl Responder {
    /// The callback id the response will carry
    pub fn callback_id(&self) -> &str {
        &self.callback_id
    }

    /// Send the handler's result back to the script side.
    ///
    /// The response is a one-way send and is never given a callback id.
    pub fn respond(self, result: impl Into<BridgeValue>) -> Result<()> {
        let dispatcher = self
            .dispatcher
            .upgrade()
            .ok_or(BridgeError::RuntimeUnavailable)?;

        let response = ResponseMessage::new(self.callback_id, result.into());
        dispatcher.deliver(&Message::Response(response))?;
        dispatcher.metrics.record_response_sent();
        Ok(())
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("callback_id", &self.callback_id)
            .finish()
    }
}
