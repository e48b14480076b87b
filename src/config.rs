//! Bridge configuration types and defaults.
//!
//! This module defines the configuration options for a bridge instance,
//! including callback id prefix, readiness handler name, script entry point
//! and bootstrap script injection.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default prefix of native callback ids
pub const DEFAULT_CALLBACK_PREFIX: &str = "android_cb_";

/// Default name of the readiness handler
pub const DEFAULT_READY_HANDLER: &str = "FinishLoad";

/// Default script function that receives native messages
pub const DEFAULT_ENTRY_POINT: &str = "WebViewJavascriptBridge.handleMessageFromNative";

/// Default name of the runtime thread
pub const DEFAULT_THREAD_NAME: &str = "etherweb-runtime";

/// Configuration for a bridge instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Prefix of callback ids minted for outbound calls
    #[serde(default = "default_callback_prefix")]
    pub callback_prefix: String,

    /// Handler name the script side calls once it is ready
    #[serde(default = "default_ready_handler")]
    pub ready_handler: String,

    /// Script function receiving escaped native payloads
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// Inject the console hook script at startup (default: true)
    #[serde(default = "default_true")]
    pub hook_console: bool,

    /// Extra script injected after the bridge script
    #[serde(default)]
    pub extra_script: Option<String>,

    /// Mirror console lines into tracing (default: false)
    #[serde(default)]
    pub log_console: bool,

    /// Name of the runtime thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            callback_prefix: DEFAULT_CALLBACK_PREFIX.to_string(),
            ready_handler: DEFAULT_READY_HANDLER.to_string(),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            hook_console: true,
            extra_script: None,
            log_console: false,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Set the callback id prefix
    pub fn with_callback_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.callback_prefix = prefix.into();
        self
    }

    /// Set the readiness handler name
    pub fn with_ready_handler(mut self, name: impl Into<String>) -> Self {
        self.ready_handler = name.into();
        self
    }

    /// Set the script entry point
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Enable or disable the console hook
    pub fn with_console_hook(mut self, enable: bool) -> Self {
        self.hook_console = enable;
        self
    }

    /// Set an extra bootstrap script
    pub fn with_extra_script(mut self, script: impl Into<String>) -> Self {
        self.extra_script = Some(script.into());
        self
    }

    /// Mirror console lines into tracing
    pub fn with_console_logging(mut self, enable: bool) -> Self {
        self.log_console = enable;
        self
    }

    /// Set the runtime thread name
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("callback_prefix", &self.callback_prefix),
            ("ready_handler", &self.ready_handler),
            ("thread_name", &self.thread_name),
        ] {
            if value.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    reason: "must not be empty".into(),
                });
            }
        }

        if !is_dotted_identifier(&self.entry_point) {
            return Err(ConfigError::InvalidValue {
                field: "entry_point".into(),
                reason: "must be a dotted identifier path".into(),
            });
        }

        Ok(())
    }

    /// Scripts evaluated before anything else, in order
    pub fn bootstrap_scripts(&self) -> Vec<String> {
        let mut scripts = vec![crate::BRIDGE_SCRIPT.to_string()];
        if self.hook_console {
            scripts.push(crate::CONSOLE_HOOK_SCRIPT.to_string());
        }
        if let Some(extra) = self.extra_script.as_ref().filter(|s| !s.is_empty()) {
            scripts.push(extra.clone());
        }
        scripts
    }
}

// The entry point is spliced into evaluated code unescaped.
fn is_dotted_identifier(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field name
        field: String,
        /// The reason it's invalid
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Default value functions for serde
fn default_callback_prefix() -> String {
    DEFAULT_CALLBACK_PREFIX.to_string()
}

fn default_ready_handler() -> String {
    DEFAULT_READY_HANDLER.to_string()
}

fn default_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_string()
}

fn default_thread_name() -> String {
    DEFAULT_THREAD_NAME.to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.callback_prefix, "android_cb_");
        assert_eq!(config.ready_handler, "FinishLoad");
        assert!(config.hook_console);
        assert!(!config.log_console);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = BridgeConfig::new()
            .with_callback_prefix("native_")
            .with_ready_handler("Ready")
            .with_console_hook(false)
            .with_extra_script("globalThis.VERSION = '1';");

        assert_eq!(config.callback_prefix, "native_");
        assert_eq!(config.ready_handler, "Ready");
        assert_eq!(config.bootstrap_scripts().len(), 2);
    }

    #[test]
    fn test_config_validation() {
        assert!(BridgeConfig::new().with_callback_prefix("").validate().is_err());
        assert!(BridgeConfig::new().with_ready_handler("").validate().is_err());
        assert!(BridgeConfig::new()
            .with_entry_point("bridge.receive('x'); evil")
            .validate()
            .is_err());
        assert!(BridgeConfig::new()
            .with_entry_point("window.$bridge._receive")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_bootstrap_order() {
        let config = BridgeConfig::new().with_extra_script("extra()");
        let scripts = config.bootstrap_scripts();
        assert_eq!(scripts.len(), 3);
        assert_eq!(scripts[0], crate::BRIDGE_SCRIPT);
        assert_eq!(scripts[1], crate::CONSOLE_HOOK_SCRIPT);
        assert_eq!(scripts[2], "extra()");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = BridgeConfig::from_json_str(r#"{"readyHandler":"Loaded","logConsole":true}"#)
            .unwrap();
        assert_eq!(config.ready_handler, "Loaded");
        assert!(config.log_console);
        assert_eq!(config.callback_prefix, DEFAULT_CALLBACK_PREFIX);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"callbackPrefix":"host_cb_","hookConsole":false}}"#).unwrap();

        let config = BridgeConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.callback_prefix, "host_cb_");
        assert!(!config.hook_console);

        assert!(matches!(
            BridgeConfig::from_json_file(file.path().with_extension("missing")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(matches!(
            BridgeConfig::from_json_str(r#"{"callbackPrefix":""}"#),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            BridgeConfig::from_json_str("{"),
            Err(ConfigError::Serialization(_))
        ));
    }
}
