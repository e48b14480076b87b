//! # EtherWeb Bridge
//!
//! This library connects native code to an in-process script engine through
//! a narrow string channel. Either side may call named operations on the
//! other, asynchronously, with request/response correlation by callback id.
//!
//! ## Architecture
//!
//! ```text
//! Native callers (any thread)
//!     │
//!     │ Bridge::call / call_async / notify
//!     ▼
//! Dispatcher ── Correlator (pending calls)
//!     │      └─ Registry (native handlers)
//!     │
//!     │ escaped script command, queued
//!     ▼
//! Runtime thread ── ScriptEngine::evaluate
//!     │
//!     │ ScriptPort::post_message / console_log
//!     ▼
//! Dispatcher::receive
//! ```
//!
//! ## Features
//!
//! - **Runtime Confinement**: The engine lives on one dedicated thread
//! - **Correlation**: Responses are matched to calls by callback id
//! - **Async Calls**: Futures that cancel their pending entry on drop
//! - **Readiness**: One-shot notification when the script side is loaded
//! - **Console Channel**: Script console lines forwarded to an observer

#![deny(missing_docs)]

pub mod bridge;
pub mod codec;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod registry;
pub mod runtime;
pub mod value;

// Re-export commonly used types
pub use bridge::{Bridge, LifecycleState};
pub use config::BridgeConfig;
pub use dispatcher::Responder;
pub use envelope::ScriptResult;
pub use error::{BridgeError, ErrorCode, Result};
pub use message::{CallMessage, Message, ResponseMessage};
pub use metrics::{BridgeStats, MetricsCollector};
pub use registry::BridgeHandler;
pub use runtime::{ScriptEngine, ScriptPort};
pub use value::{BridgeValue, ValueMap};

/// Script-side half of the bridge, evaluated first at startup
pub const BRIDGE_SCRIPT: &str = include_str!("js/bridge.js");

/// Console hook forwarding `console.*` output as `[level] message` lines
pub const CONSOLE_HOOK_SCRIPT: &str = include_str!("js/hook_console.js");

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "1.0.0");
    }

    #[test]
    fn test_bridge_script_loaded() {
        assert!(BRIDGE_SCRIPT.contains("handleMessageFromNative"));
        assert!(BRIDGE_SCRIPT.contains("NativeBridge.postMessage"));
        assert!(BRIDGE_SCRIPT.contains("registerHandler"));
    }

    #[test]
    fn test_console_hook_loaded() {
        assert!(CONSOLE_HOOK_SCRIPT.contains("NativeBridge.consoleLog"));
    }

    #[test]
    fn test_default_entry_point_is_defined_by_bridge_script() {
        let config = BridgeConfig::default();
        let (object, function) = config.entry_point.split_once('.').unwrap();
        assert!(BRIDGE_SCRIPT.contains(&format!("global.{}", object)));
        assert!(BRIDGE_SCRIPT.contains(function));
    }
}
