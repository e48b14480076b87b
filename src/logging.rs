//! Tracing setup and console line forwarding.
//!
//! Script console output arrives as free-text lines of the form
//! `[level] message`. When mirroring is enabled each line is re-emitted as a
//! tracing event under the `etherweb_bridge::console` target.

use serde::{Deserialize, Serialize};
use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Install a fmt subscriber once per process.
///
/// `RUST_LOG` takes precedence over `default_filter`. Returns quietly if
/// another subscriber is already installed.
pub fn init_tracing(default_filter: &str) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

        let _ = fmt().with_env_filter(env_filter).compact().try_init();
    });
}

/// Console line severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    /// console.debug
    Debug,
    /// console.log / console.info
    Info,
    /// console.warn
    Warn,
    /// console.error
    Error,
}

impl ConsoleLevel {
    /// Split a console line into its level and message.
    ///
    /// Lines without a recognised `[level]` prefix are `Info` and returned
    /// unchanged.
    pub fn parse(line: &str) -> (ConsoleLevel, &str) {
        let Some(rest) = line.strip_prefix('[') else {
            return (ConsoleLevel::Info, line);
        };
        let Some((tag, message)) = rest.split_once(']') else {
            return (ConsoleLevel::Info, line);
        };

        let level = match tag.to_ascii_lowercase().as_str() {
            "debug" | "trace" => ConsoleLevel::Debug,
            "log" | "info" => ConsoleLevel::Info,
            "warn" | "warning" => ConsoleLevel::Warn,
            "error" => ConsoleLevel::Error,
            _ => return (ConsoleLevel::Info, line),
        };
        (level, message.strip_prefix(' ').unwrap_or(message))
    }
}

/// Re-emit a console line as a tracing event
pub fn forward_console_line(bridge_id: &str, line: &str) {
    let (level, message) = ConsoleLevel::parse(line);
    match level {
        ConsoleLevel::Debug => {
            tracing::debug!(target: "etherweb_bridge::console", bridge = %bridge_id, "{}", message)
        }
        ConsoleLevel::Info => {
            tracing::info!(target: "etherweb_bridge::console", bridge = %bridge_id, "{}", message)
        }
        ConsoleLevel::Warn => {
            tracing::warn!(target: "etherweb_bridge::console", bridge = %bridge_id, "{}", message)
        }
        ConsoleLevel::Error => {
            tracing::error!(target: "etherweb_bridge::console", bridge = %bridge_id, "{}", message)
        }
    }
}
