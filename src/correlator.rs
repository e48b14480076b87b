//! Callback correlation for outbound calls.
//!
//! Each call that expects an answer gets a callback id of the form
//! `<prefix><n>`. The counter and the pending map sit behind one lock, so
//! minting an id and storing its callback is a single atomic step.

use crate::value::BridgeValue;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::trace;

/// Callback invoked with the `responseData` of the matching response
pub type ResponseCallback = Box<dyn FnOnce(Option<BridgeValue>) + Send + 'static>;

struct CorrelatorState {
    counter: u64,
    pending: HashMap<String, ResponseCallback>,
}

/// Maps callback ids to pending result callbacks
pub struct CallbackCorrelator {
    prefix: String,
    state: Mutex<CorrelatorState>,
}

impl CallbackCorrelator {
    /// Create a correlator minting ids with the given prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            state: Mutex::new(CorrelatorState {
                counter: 0,
                pending: HashMap::new(),
            }),
        }
    }

    /// Store a callback and return its freshly minted id
    pub fn register(&self, callback: ResponseCallback) -> String {
        let mut state = self.state.lock();
        state.counter += 1;
        let id = format!("{}{}", self.prefix, state.counter);
        state.pending.insert(id.clone(), callback);
        trace!(callback_id = %id, "Registered pending callback");
        id
    }

    /// Resolve a pending callback.
    ///
    /// The entry is removed under the lock and the callback runs after the
    /// lock is released, exactly once. Returns `false` for unknown ids.
    pub fn resolve(&self, id: &str, data: Option<BridgeValue>) -> bool {
        let callback = self.state.lock().pending.remove(id);
        match callback {
            Some(callback) => {
                callback(data);
                true
            }
            None => false,
        }
    }

    /// Drop a pending callback without invoking it
    pub fn cancel(&self, id: &str) -> bool {
        self.state.lock().pending.remove(id).is_some()
    }

    /// Abandon every pending callback and restart the counter.
    ///
    /// Returns how many callbacks were dropped. None of them is invoked.
    pub fn reset(&self) -> usize {
        let abandoned = {
            let mut state = self.state.lock();
            state.counter = 0;
            std::mem::take(&mut state.pending)
        };
        // Dropped outside the lock: callbacks may own channels whose
        // receivers react immediately.
        let count = abandoned.len();
        drop(abandoned);
        count
    }

    /// Check whether an id is pending
    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().pending.contains_key(id)
    }

    /// Number of pending callbacks
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The id prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
