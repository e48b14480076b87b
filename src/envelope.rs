//! Tagged results returned by the script-side operation library.
//!
//! Operations answer with `{"state": bool, "result": any}`. A `true` state
//! carries the operation's value; anything else is a failure whose `result`
//! (if any) describes what went wrong.

use crate::error::{BridgeError, CodecError, Result};
use crate::value::{BridgeValue, ValueMap};
use serde::{Deserialize, Serialize};

/// Result envelope of a script operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptResult {
    /// Whether the operation succeeded
    pub state: bool,
    /// Operation value or failure detail
    #[serde(default)]
    pub result: Option<BridgeValue>,
}

impl ScriptResult {
    /// Decode the envelope from a response payload
    pub fn from_response(response: Option<BridgeValue>) -> Result<Self> {
        let value = response.unwrap_or_default().to_json();
        serde_json::from_value(value).map_err(|e| BridgeError::Codec(CodecError::Decode(e)))
    }

    /// The operation value on success, `OperationFailed` otherwise
    pub fn into_result(self) -> Result<BridgeValue> {
        if self.state {
            Ok(self.result.unwrap_or_default())
        } else {
            Err(BridgeError::OperationFailed(self.result))
        }
    }
}

/// Drop null-valued parameters; an empty mapping becomes no data at all
pub fn compact_params(params: ValueMap) -> Option<BridgeValue> {
    let compacted: ValueMap = params
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .collect();

    if compacted.is_empty() {
        None
    } else {
        Some(BridgeValue::Object(compacted))
    }
}
