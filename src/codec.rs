//! Wire encoding and script-literal escaping.
//!
//! Encoding turns a [`Message`] into its JSON wire string. Before that string
//! is embedded in an evaluated statement it goes through a second, separate
//! escape pass so it cannot terminate the single-quoted literal it sits in.
//! Payloads kept in-process are never escaped.

use crate::error::CodecError;
use crate::message::Message;

/// Encode a message to its wire string
pub fn encode(message: &Message) -> Result<String, CodecError> {
    serde_json::to_string(message).map_err(CodecError::Encode)
}

/// Decode a wire string into a message
pub fn decode(raw: &str) -> Result<Message, CodecError> {
    serde_json::from_str(raw).map_err(CodecError::Decode)
}

/// Escape a wire string for embedding inside a quoted script literal.
///
/// Backslash, both quote characters, newline, carriage return, form feed,
/// U+2028 and U+2029 are replaced with their escaped spelling.
pub fn escape_script_literal(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 8);
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{000C}' => out.push_str("\\f"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`escape_script_literal`].
///
/// Only the sequences the escape pass produces are accepted.
pub fn unescape_script_literal(input: &str) -> Result<String, CodecError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        let position = input.len() - rest.len() + pos;
        let tail = &rest[pos + 1..];

        let (ch, consumed) = match tail.chars().next() {
            Some('\\') => ('\\', 1),
            Some('"') => ('"', 1),
            Some('\'') => ('\'', 1),
            Some('n') => ('\n', 1),
            Some('r') => ('\r', 1),
            Some('f') => ('\u{000C}', 1),
            Some('u') if tail.starts_with("u2028") => ('\u{2028}', 5),
            Some('u') if tail.starts_with("u2029") => ('\u{2029}', 5),
            _ => return Err(CodecError::InvalidEscape { position }),
        };

        out.push(ch);
        rest = &tail[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Build the statement that hands `payload` to the script-side entry point
pub fn script_command(entry_point: &str, payload: &str) -> String {
    format!("{}('{}');", entry_point, escape_script_literal(payload))
}

/// Recover the payload from a statement built by [`script_command`].
///
/// Returns `None` when the statement does not target `entry_point`.
pub fn parse_script_command(entry_point: &str, command: &str) -> Option<String> {
    let literal = command
        .strip_prefix(entry_point)?
        .strip_prefix("('")?
        .strip_suffix("');")?;
    unescape_script_literal(literal).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CallMessage, ResponseMessage};
    use crate::value::BridgeValue;
    use proptest::prelude::*;
    use serde_json::json;

    const ENTRY: &str = "WebViewJavascriptBridge.handleMessageFromNative";

    #[test]
    fn test_encode_decode_nested_message() {
        let msg = Message::Call(
            CallMessage::new("ethTransfer")
                .with_data(BridgeValue::from(json!({
                    "to": "0x1",
                    "gas": {"limit": 21000, "price": 1.5},
                    "tags": [true, null, "x"]
                })))
                .with_callback_id("android_cb_9"),
        );
        let wire = encode(&msg).unwrap();
        assert_eq!(decode(&wire).unwrap(), msg);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("not json").is_err());
        assert!(decode("[1,2,3]").is_err());
        assert!(decode(r#"{"handlerName": 5}"#).is_err());
    }

    #[test]
    fn test_escape_each_special_character() {
        assert_eq!(escape_script_literal("a\\b"), "a\\\\b");
        assert_eq!(escape_script_literal("\""), "\\\"");
        assert_eq!(escape_script_literal("'"), "\\'");
        assert_eq!(escape_script_literal("\n"), "\\n");
        assert_eq!(escape_script_literal("\r"), "\\r");
        assert_eq!(escape_script_literal("\u{000C}"), "\\f");
        assert_eq!(escape_script_literal("\u{2028}"), "\\u2028");
        assert_eq!(escape_script_literal("\u{2029}"), "\\u2029");
    }

    #[test]
    fn test_escape_inverse_for_combined_specials() {
        let nasty = "'); alert(1); ('\\\"\n\r\u{000C}\u{2028}\u{2029}";
        let escaped = escape_script_literal(nasty);
        assert!(!escaped.contains('\n'));
        assert!(!escaped.contains('\u{2028}'));
        assert_eq!(unescape_script_literal(&escaped).unwrap(), nasty);
    }

    #[test]
    fn test_unescape_rejects_unknown_sequence() {
        match unescape_script_literal("ab\\x") {
            Err(CodecError::InvalidEscape { position }) => assert_eq!(position, 2),
            other => panic!("Expected invalid escape, got {:?}", other),
        }
        assert!(unescape_script_literal("trailing\\").is_err());
    }

    #[test]
    fn test_script_command_round_trip() {
        let msg = Message::Response(ResponseMessage::new(
            "js_cb_1",
            BridgeValue::from("it's \"quoted\"\nline"),
        ));
        let wire = encode(&msg).unwrap();
        let command = script_command(ENTRY, &wire);

        assert!(command.starts_with(ENTRY));
        assert!(command.ends_with("');"));
        assert_eq!(parse_script_command(ENTRY, &command).unwrap(), wire);
        assert!(parse_script_command("other.entry", &command).is_none());
    }

    #[test]
    fn test_escaping_does_not_touch_wire_payload() {
        let msg = Message::Call(CallMessage::new("echo").with_data("a'b".into()));
        let wire = encode(&msg).unwrap();
        assert!(wire.contains("a'b"));
    }

    fn arb_value() -> impl Strategy<Value = BridgeValue> {
        let leaf = prop_oneof![
            Just(BridgeValue::Null),
            any::<bool>().prop_map(BridgeValue::Bool),
            any::<i64>().prop_map(BridgeValue::Integer),
            // Quarter steps parse back exactly
            (-1_000_000i32..1_000_000).prop_map(|n| BridgeValue::Float(f64::from(n) / 4.0 + 0.5)),
            ".*".prop_map(BridgeValue::String),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..8).prop_map(BridgeValue::Array),
                proptest::collection::vec((".*", inner), 0..8)
                    .prop_map(|entries| BridgeValue::Object(entries.into_iter().collect())),
            ]
        })
    }

    fn arb_message() -> impl Strategy<Value = Message> {
        prop_oneof![
            (".+", proptest::option::of(arb_value()), proptest::option::of("[a-z_]+[0-9]+"))
                .prop_map(|(handler_name, data, callback_id)| {
                    Message::Call(CallMessage {
                        handler_name,
                        data,
                        callback_id,
                    })
                }),
            ("[a-z_]+[0-9]+", proptest::option::of(arb_value())).prop_map(
                |(response_id, response_data)| {
                    Message::Response(ResponseMessage {
                        response_id,
                        response_data,
                    })
                }
            ),
        ]
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(message in arb_message()) {
            let wire = encode(&message).unwrap();
            prop_assert_eq!(decode(&wire).unwrap(), message.clone());

            let command = script_command(ENTRY, &wire);
            let recovered = parse_script_command(ENTRY, &command).unwrap();
            prop_assert_eq!(decode(&recovered).unwrap(), message);
        }

        #[test]
        fn prop_unescape_inverts_escape(
            s in proptest::collection::vec(
                prop_oneof![
                    Just('\\'), Just('"'), Just('\''), Just('\n'), Just('\r'),
                    Just('\u{000C}'), Just('\u{2028}'), Just('\u{2029}'),
                    any::<char>(),
                ],
                0..64,
            ).prop_map(|chars| chars.into_iter().collect::<String>())
        ) {
            let escaped = escape_script_literal(&s);
            prop_assert_eq!(unescape_script_literal(&escaped).unwrap(), s);
        }
    }
}
