//! Bridge message framing.
//!
//! Every message on the wire is exactly one of a call
//! (`{handlerName, data?, callbackId?}`) or a response
//! (`{responseId, responseData?}`). A key that is present with a `null`
//! value decodes to `Some(BridgeValue::Null)`; an absent key decodes to `None`.

use crate::value::BridgeValue;
use serde::{Deserialize, Deserializer, Serialize};

/// A call naming an operation on the other side
#[derive(Debug, Clone, PartialEq)]
pub struct CallMessage {
    /// Operation name
    pub handler_name: String,
    /// Optional parameters
    pub data: Option<BridgeValue>,
    /// Present only when the sender expects a response
    pub callback_id: Option<String>,
}

impl CallMessage {
    /// Create a call without data or callback
    pub fn new(handler_name: impl Into<String>) -> Self {
        Self {
            handler_name: handler_name.into(),
            data: None,
            callback_id: None,
        }
    }

    /// Attach parameters
    pub fn with_data(mut self, data: BridgeValue) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a callback id
    pub fn with_callback_id(mut self, id: impl Into<String>) -> Self {
        self.callback_id = Some(id.into());
        self
    }
}

/// The result of a previously issued call
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    /// The callback id of the call being answered
    pub response_id: String,
    /// Result payload
    pub response_data: Option<BridgeValue>,
}

impl ResponseMessage {
    /// Create a response
    pub fn new(response_id: impl Into<String>, response_data: BridgeValue) -> Self {
        Self {
            response_id: response_id.into(),
            response_data: Some(response_data),
        }
    }
}

/// A single bridge message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireMessage", try_from = "WireMessage")]
pub enum Message {
    /// Operation call
    Call(CallMessage),
    /// Response to an earlier call
    Response(ResponseMessage),
}

impl Message {
    /// Check if this is a response
    pub fn is_response(&self) -> bool {
        matches!(self, Message::Response(_))
    }
}

impl From<CallMessage> for Message {
    fn from(call: CallMessage) -> Self {
        Message::Call(call)
    }
}

impl From<ResponseMessage> for Message {
    fn from(response: ResponseMessage) -> Self {
        Message::Response(response)
    }
}

/// Flat wire shape shared by both message kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    handler_name: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    data: Option<BridgeValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    callback_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_id: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    response_data: Option<BridgeValue>,
}

// Only reached when the key exists, so `null` stays `Some(Null)`.
fn present<'de, D>(deserializer: D) -> Result<Option<BridgeValue>, D::Error>
where
    D: Deserializer<'de>,
{
    BridgeValue::deserialize(deserializer).map(Some)
}

impl From<Message> for WireMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::Call(call) => WireMessage {
                handler_name: Some(call.handler_name),
                data: call.data,
                callback_id: call.callback_id,
                response_id: None,
                response_data: None,
            },
            Message::Response(response) => WireMessage {
                handler_name: None,
                data: None,
                callback_id: None,
                response_id: Some(response.response_id),
                response_data: response.response_data,
            },
        }
    }
}

impl TryFrom<WireMessage> for Message {
    type Error = String;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        match (wire.handler_name, wire.response_id) {
            (Some(handler_name), None) => Ok(Message::Call(CallMessage {
                handler_name,
                data: wire.data,
                callback_id: wire.callback_id,
            })),
            (None, Some(response_id)) => Ok(Message::Response(ResponseMessage {
                response_id,
                response_data: wire.response_data,
            })),
            (Some(_), Some(_)) => {
                Err("message carries both handlerName and responseId".to_string())
            }
            (None, None) => Err("message carries neither handlerName nor responseId".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_without_callback_has_no_callback_key() {
        let msg = Message::Call(CallMessage::new("getGasPrice"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"handlerName": "getGasPrice"}));
    }

    #[test]
    fn test_response_wire_shape() {
        let msg = Message::Response(ResponseMessage::new("js_cb_4", BridgeValue::Null));
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"responseId":"js_cb_4","responseData":null}"#);
    }

    #[test]
    fn test_null_data_differs_from_absent_data() {
        let with_null: Message =
            serde_json::from_str(r#"{"handlerName":"a","data":null}"#).unwrap();
        let without: Message = serde_json::from_str(r#"{"handlerName":"a"}"#).unwrap();

        match (with_null, without) {
            (Message::Call(a), Message::Call(b)) => {
                assert_eq!(a.data, Some(BridgeValue::Null));
                assert_eq!(b.data, None);
            }
            other => panic!("Expected two calls, got {:?}", other),
        }
    }

    #[test]
    fn test_response_without_data() {
        let msg: Message = serde_json::from_str(r#"{"responseId":"android_cb_2"}"#).unwrap();
        assert_eq!(
            msg,
            Message::Response(ResponseMessage {
                response_id: "android_cb_2".into(),
                response_data: None,
            })
        );
    }

    #[test]
    fn test_ambiguous_message_rejected() {
        let both = serde_json::from_str::<Message>(r#"{"handlerName":"a","responseId":"b"}"#);
        assert!(both.is_err());

        let neither = serde_json::from_str::<Message>(r#"{"data":{}}"#);
        assert!(neither.is_err());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let msg: Message =
            serde_json::from_str(r#"{"handlerName":"a","extra":1,"callbackId":"cb"}"#).unwrap();
        assert_eq!(
            msg,
            Message::Call(CallMessage::new("a").with_callback_id("cb"))
        );
    }
}
