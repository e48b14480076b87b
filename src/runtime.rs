//! Script runtime confinement.
//!
//! The embedded engine lives on one dedicated OS thread and is only touched
//! there. Other threads reach it by enqueueing [`RuntimeTask`]s on an
//! unbounded single-consumer queue, which keeps per-sender FIFO order.
//! Code already running on the runtime thread evaluates immediately when the
//! engine is idle; re-entrant sends made while the engine is evaluating are
//! appended to the queue.

use crate::error::{BridgeError, Result};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{JoinHandle, ThreadId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// An embedded script engine instance.
///
/// Implementations are created and dropped on the runtime thread and never
/// leave it, so they do not need to be `Send`.
pub trait ScriptEngine: 'static {
    /// Evaluate a script statement
    fn evaluate(&mut self, script: &str) -> anyhow::Result<()>;
}

/// Receiver for everything the script side pushes across the boundary
pub trait InboundSink: Send + Sync {
    /// A serialized bridge message posted by the script side
    fn on_message(&self, raw: &str);

    /// A free-text diagnostic line from the script console
    fn on_console(&self, line: &str);
}

/// Native interface handed to the engine at construction.
///
/// Engines expose it to scripts (as `NativeBridge.postMessage` /
/// `NativeBridge.consoleLog`). Calls after teardown are ignored.
#[derive(Clone)]
pub struct ScriptPort {
    sink: Weak<dyn InboundSink>,
}

impl ScriptPort {
    /// Create a port forwarding to `sink`
    pub fn new(sink: Weak<dyn InboundSink>) -> Self {
        Self { sink }
    }

    /// Deliver a serialized message from the script side
    pub fn post_message(&self, raw: &str) {
        match self.sink.upgrade() {
            Some(sink) => sink.on_message(raw),
            None => debug!("Dropping script message posted after teardown"),
        }
    }

    /// Deliver a console line from the script side
    pub fn console_log(&self, line: &str) {
        if let Some(sink) = self.sink.upgrade() {
            sink.on_console(line);
        }
    }
}

/// Work executed on the runtime thread
pub enum RuntimeTask {
    /// Evaluate a script statement
    Evaluate(String),
    /// Run a closure on the runtime thread
    Run(Box<dyn FnOnce() + Send + 'static>),
    /// Stop the loop and drop the engine
    Shutdown,
}

/// Hook invoked on the runtime thread when an evaluation fails
pub type EvalErrorHook = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

thread_local! {
    static ENGINE: RefCell<Option<Box<dyn ScriptEngine>>> = RefCell::new(None);
}

/// Handle owning the runtime thread and its task queue
pub struct RuntimeHandle {
    tx: mpsc::UnboundedSender<RuntimeTask>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<RuntimeTask>>>,
    thread_name: String,
    context: Arc<OnceCell<ThreadId>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
    on_eval_error: Option<EvalErrorHook>,
}

impl RuntimeHandle {
    /// Create a handle whose queue accepts tasks before the thread starts.
    ///
    /// Tasks queued before [`launch`](Self::launch) run right after the
    /// engine is constructed, in order.
    pub fn new(thread_name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            thread_name: thread_name.into(),
            context: Arc::new(OnceCell::new()),
            worker: Mutex::new(None),
            shutdown: AtomicBool::new(false),
            on_eval_error: None,
        }
    }

    /// Install a hook observing evaluation failures
    pub fn with_eval_error_hook(mut self, hook: EvalErrorHook) -> Self {
        self.on_eval_error = Some(hook);
        self
    }

    /// Start the runtime thread and construct the engine on it.
    ///
    /// Blocks until the factory has returned; a factory error is reported
    /// here and leaves the handle shut down.
    pub fn launch<E, F>(&self, factory: F) -> Result<()>
    where
        E: ScriptEngine,
        F: FnOnce() -> anyhow::Result<E> + Send + 'static,
    {
        let mut rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| BridgeError::Engine("runtime already launched".into()))?;

        let (init_tx, init_rx) = std::sync::mpsc::channel::<std::result::Result<(), String>>();
        let context = Arc::clone(&self.context);
        let on_eval_error = self.on_eval_error.clone();

        let worker = std::thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                let _ = context.set(std::thread::current().id());

                match factory() {
                    Ok(engine) => {
                        let engine: Box<dyn ScriptEngine> = Box::new(engine);
                        ENGINE.with(|slot| *slot.borrow_mut() = Some(engine));
                        let _ = init_tx.send(Ok(()));
                    }
                    Err(err) => {
                        let _ = init_tx.send(Err(format!("{:#}", err)));
                        return;
                    }
                }

                while let Some(task) = rx.blocking_recv() {
                    match task {
                        RuntimeTask::Evaluate(script) => {
                            evaluate_on_context(&script, on_eval_error.as_ref())
                        }
                        RuntimeTask::Run(job) => job(),
                        RuntimeTask::Shutdown => break,
                    }
                }

                ENGINE.with(|slot| slot.borrow_mut().take());
                debug!("Script runtime thread exiting");
            })?;

        match init_rx.recv() {
            Ok(Ok(())) => {
                info!(thread = %self.thread_name, "Script runtime started");
                *self.worker.lock() = Some(worker);
                Ok(())
            }
            Ok(Err(err)) => {
                self.shutdown.store(true, Ordering::SeqCst);
                let _ = worker.join();
                Err(BridgeError::Engine(err))
            }
            Err(_) => {
                self.shutdown.store(true, Ordering::SeqCst);
                let _ = worker.join();
                Err(BridgeError::Engine(
                    "runtime thread exited during initialization".into(),
                ))
            }
        }
    }

    /// Check if the caller runs on the runtime thread
    pub fn is_on_context(&self) -> bool {
        self.context
            .get()
            .is_some_and(|id| *id == std::thread::current().id())
    }

    /// Evaluate a statement on the runtime thread.
    ///
    /// Never blocks: off-context callers enqueue and return.
    pub fn evaluate(&self, script: String) -> Result<()> {
        if self.is_shutdown() {
            return Err(BridgeError::RuntimeUnavailable);
        }

        if self.is_on_context() && try_evaluate_now(&script, self.on_eval_error.as_ref()) {
            return Ok(());
        }

        self.enqueue(RuntimeTask::Evaluate(script))
    }

    /// Run a closure on the runtime thread
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        if self.is_shutdown() {
            return Err(BridgeError::RuntimeUnavailable);
        }
        self.enqueue(RuntimeTask::Run(Box::new(job)))
    }

    fn enqueue(&self, task: RuntimeTask) -> Result<()> {
        self.tx
            .send(task)
            .map_err(|_| BridgeError::RuntimeUnavailable)
    }

    /// Check if the runtime has been shut down
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Stop the runtime thread.
    ///
    /// Already-queued tasks run first. Waits for the thread to exit unless
    /// called from the runtime thread itself.
    pub fn close(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.tx.send(RuntimeTask::Shutdown);

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if self.is_on_context() {
                debug!("Runtime closed from its own thread; not joining");
            } else if worker.join().is_err() {
                warn!("Script runtime thread panicked");
            }
        }
        info!(thread = %self.thread_name, "Script runtime stopped");
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        self.close();
    }
}

// The loop never runs while the slot is borrowed.
fn evaluate_on_context(script: &str, on_error: Option<&EvalErrorHook>) {
    if !try_evaluate_now(script, on_error) {
        warn!("Script engine unavailable; evaluation skipped");
    }
}

/// Evaluate immediately if an idle engine is installed. Returns `false` when
/// the engine is borrowed by an evaluation further up the stack or is still
/// being constructed; the caller queues the script instead.
fn try_evaluate_now(script: &str, on_error: Option<&EvalErrorHook>) -> bool {
    ENGINE.with(|slot| {
        let mut guard = match slot.try_borrow_mut() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        let Some(engine) = guard.as_mut() else {
            return false;
        };
        if let Err(err) = engine.evaluate(script) {
            warn!(error = %err, "Script evaluation failed");
            if let Some(hook) = on_error {
                hook(&err);
            }
        }
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    struct RecordingEngine {
        seen: std_mpsc::Sender<String>,
    }

    impl ScriptEngine for RecordingEngine {
        fn evaluate(&mut self, script: &str) -> anyhow::Result<()> {
            if script == "fail" {
                anyhow::bail!("syntax error");
            }
            let _ = self.seen.send(script.to_string());
            Ok(())
        }
    }

    fn launch_recording() -> (RuntimeHandle, std_mpsc::Receiver<String>) {
        let (tx, rx) = std_mpsc::channel();
        let handle = RuntimeHandle::new("test-runtime");
        handle
            .launch(move || Ok(RecordingEngine { seen: tx }))
            .unwrap();
        (handle, rx)
    }

    fn next(rx: &std_mpsc::Receiver<String>) -> String {
        rx.recv_timeout(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_off_context_evaluation_is_queued_in_order() {
        let (handle, rx) = launch_recording();
        assert!(!handle.is_on_context());

        for i in 0..20 {
            handle.evaluate(format!("stmt{}", i)).unwrap();
        }
        for i in 0..20 {
            assert_eq!(next(&rx), format!("stmt{}", i));
        }
        handle.close();
    }

    #[test]
    fn test_tasks_queued_before_launch_run_first() {
        let (tx, rx) = std_mpsc::channel();
        let handle = RuntimeHandle::new("test-runtime");
        handle.evaluate("bootstrap".into()).unwrap();
        handle
            .launch(move || Ok(RecordingEngine { seen: tx }))
            .unwrap();
        handle.evaluate("after".into()).unwrap();

        assert_eq!(next(&rx), "bootstrap");
        assert_eq!(next(&rx), "after");
    }

    #[test]
    fn test_on_context_evaluation_is_immediate() {
        let (handle, rx) = launch_recording();
        let handle = Arc::new(handle);
        let (done_tx, done_rx) = std_mpsc::channel();

        let inner = Arc::clone(&handle);
        handle
            .post(move || {
                assert!(inner.is_on_context());
                inner.evaluate("inline".into()).unwrap();
                // Already evaluated before this closure returns
                let _ = done_tx.send(());
            })
            .unwrap();

        done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(next(&rx), "inline");
    }

    #[test]
    fn test_evaluation_during_engine_construction_is_queued() {
        let (tx, rx) = std_mpsc::channel();
        let handle = Arc::new(RuntimeHandle::new("test-runtime"));
        handle.evaluate("bootstrap".into()).unwrap();

        let inner = Arc::clone(&handle);
        handle
            .launch(move || {
                assert!(inner.is_on_context());
                inner.evaluate("from factory".into())?;
                Ok(RecordingEngine { seen: tx })
            })
            .unwrap();

        assert_eq!(next(&rx), "bootstrap");
        assert_eq!(next(&rx), "from factory");
        handle.close();
    }

    #[test]
    fn test_factory_error_is_reported() {
        let handle = RuntimeHandle::new("test-runtime");
        let result = handle.launch(|| -> anyhow::Result<RecordingEngine> {
            anyhow::bail!("no engine available")
        });
        match result {
            Err(BridgeError::Engine(msg)) => assert!(msg.contains("no engine available")),
            other => panic!("Expected engine error, got {:?}", other.err()),
        }
        assert!(handle.is_shutdown());
        assert!(matches!(
            handle.evaluate("x".into()),
            Err(BridgeError::RuntimeUnavailable)
        ));
    }

    #[test]
    fn test_evaluation_failure_reaches_hook() {
        let (tx, rx) = std_mpsc::channel();
        let (err_tx, err_rx) = std_mpsc::channel();
        let handle = RuntimeHandle::new("test-runtime").with_eval_error_hook(Arc::new(
            move |err: &anyhow::Error| {
                let _ = err_tx.send(err.to_string());
            },
        ));
        handle
            .launch(move || Ok(RecordingEngine { seen: tx }))
            .unwrap();

        handle.evaluate("fail".into()).unwrap();
        handle.evaluate("ok".into()).unwrap();

        assert_eq!(
            err_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            "syntax error"
        );
        assert_eq!(next(&rx), "ok");
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_sends() {
        let (handle, _rx) = launch_recording();
        handle.close();
        handle.close();
        assert!(handle.is_shutdown());
        assert!(matches!(
            handle.evaluate("late".into()),
            Err(BridgeError::RuntimeUnavailable)
        ));
        assert!(handle.post(|| {}).is_err());
    }
}
