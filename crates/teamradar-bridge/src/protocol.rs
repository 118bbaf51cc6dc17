//! Companion output parsing
//!
//! Companion lines look like free-form log output with at most one JSON
//! object embedded somewhere after a short header:
//!
//! ```text
//! messages new 8214 828bab5f-... 6336 {"Id":6336,"MessageType":"normal",...}
//! rooms remove 8214
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use teamradar_core::events::{Account, CompanionEvent, Document, RoomInfo, RoomUser};
use teamradar_core::prelude::*;

/// Why a candidate JSON payload was rejected
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("expected a JSON object, found {kind}")]
    NotAnObject { kind: &'static str },
}

// ─────────────────────────────────────────────────────────
// Extraction and Decoding (Free Functions)
// ─────────────────────────────────────────────────────────

/// Find the JSON object embedded in a line.
///
/// Scans from the first `{` to the `}` that balances it. Braces inside string
/// literals (including escaped quotes) do not count towards the depth. Only the
/// first object on a line is considered; if it never balances the line has no
/// match, even when a later `{` would.
pub fn extract_json(line: &str) -> Option<&str> {
    let start = line.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    // Every byte we branch on is ASCII, so slicing at them stays on char boundaries.
    for (offset, byte) in line.as_bytes()[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&line[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Decode JSON text into a keyed document.
///
/// Decoding is all-or-nothing, and a top-level array or scalar is rejected.
pub fn decode_document(json: &str) -> std::result::Result<Document, DecodeError> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::NotAnObject {
            kind: json_kind(&other),
        }),
    }
}

/// Extract and decode in one step.
///
/// Returns `None` when the line has no embedded object.
pub fn decode_line(line: &str) -> Option<std::result::Result<Document, DecodeError>> {
    extract_json(line).map(decode_document)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ─────────────────────────────────────────────────────────
// Line Classification
// ─────────────────────────────────────────────────────────

/// `<routine> <action> [rest]`, matched against the text before the payload
static HEADER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([a-z]+)\s+([a-z]+)(?:\s+(.*?))?\s*$").expect("Invalid header pattern regex")
});

/// Classify one companion output line.
///
/// Returns `None` for lines that carry no event: plain log output, and lines
/// whose payload is missing or fails to decode. Those are dropped here and
/// never reach the connection state.
pub fn parse_companion_line(line: &str) -> Option<CompanionEvent> {
    let head = line.split('{').next().unwrap_or_default();
    let caps = HEADER_PATTERN.captures(head)?;
    let routine = caps.get(1)?.as_str();
    let action = caps.get(2)?.as_str();
    let rest = caps.get(3).map(|m| m.as_str()).unwrap_or_default();

    if action == "error" {
        // The error text is free-form and may itself contain braces.
        let full_rest = line
            .trim()
            .splitn(3, char::is_whitespace)
            .nth(2)
            .unwrap_or_default();
        return Some(parse_failure(routine, full_rest));
    }

    let ids: Vec<&str> = rest.split_whitespace().collect();

    match (routine, action) {
        ("rooms", "remove") => Some(CompanionEvent::RoomRemoved {
            room_id: parse_id(ids.first())?,
        }),
        ("users", "remove") => Some(CompanionEvent::UserLeft {
            room_id: parse_id(ids.first())?,
            user_id: ids.get(1)?.to_string(),
        }),
        ("accounts", "login") => {
            let document = payload(line)?;
            let account: Account = from_document(&document).unwrap_or_default();
            Some(CompanionEvent::AccountLogin { account, document })
        }
        ("rooms", "add") => {
            let document = payload(line)?;
            let room: RoomInfo = from_document(&document).unwrap_or_default();
            let room_id = parse_id(ids.first()).unwrap_or(room.id);
            Some(CompanionEvent::RoomAdded {
                room_id,
                name: room.name,
                document,
            })
        }
        ("users", "add") | ("users", "change") => {
            let document = payload(line)?;
            let user: RoomUser = from_document(&document).unwrap_or_default();
            let room_id = parse_id(ids.first()).unwrap_or(user.room_id);
            let user_id = ids
                .get(1)
                .map(|id| id.to_string())
                .unwrap_or_else(|| user.user.id.clone());
            if action == "add" {
                Some(CompanionEvent::UserJoined {
                    room_id,
                    user_id,
                    online: user.is_online,
                    document,
                })
            } else {
                Some(CompanionEvent::UserChanged {
                    room_id,
                    user_id,
                    online: user.is_online,
                    document,
                })
            }
        }
        ("messages", "new") => {
            let document = payload(line)?;
            let room_id = parse_id(ids.first())
                .or_else(|| document.get("PostedRoomId").and_then(Value::as_u64))?;
            let message_id = parse_id(ids.get(2))
                .or_else(|| document.get("Id").and_then(Value::as_u64))?;
            Some(CompanionEvent::MessagePosted {
                room_id,
                message_id,
                document,
            })
        }
        _ => Some(CompanionEvent::Unrecognized {
            routine: routine.to_string(),
            action: action.to_string(),
        }),
    }
}

/// `rooms error <text>` or `users|messages error <room> <text>`
fn parse_failure(routine: &str, rest: &str) -> CompanionEvent {
    let (room_id, message) = match rest.split_once(char::is_whitespace) {
        Some((first, tail)) if routine != "rooms" => match first.parse::<u64>() {
            Ok(id) => (Some(id), tail.trim()),
            Err(_) => (None, rest),
        },
        _ => match rest.parse::<u64>() {
            Ok(id) if routine != "rooms" => (Some(id), ""),
            _ => (None, rest),
        },
    };

    CompanionEvent::Failure {
        routine: routine.to_string(),
        room_id,
        message: message.to_string(),
    }
}

/// Decode the embedded object, logging and dropping failures
fn payload(line: &str) -> Option<Document> {
    match decode_line(line)? {
        Ok(document) => Some(document),
        Err(e) => {
            debug!("Dropping companion line with undecodable payload: {}", e);
            None
        }
    }
}

fn parse_id(token: Option<&&str>) -> Option<u64> {
    token.and_then(|t| t.parse().ok())
}

fn from_document<T: serde::de::DeserializeOwned>(document: &Document) -> Option<T> {
    serde_json::from_value(Value::Object(document.clone())).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use teamradar_core::document_path;

    const MESSAGE_LINE: &str = r#"messages new 8214 828bab5f-0f36-4e8f-bbc2-e98cbfe67e8f 6336 {"Id":6336,"Content":"asdjfsj asdfjasd asjdf","MessageType":"normal","PostedTime":"2016-03-16T00:42:29.367Z","PostedRoomId":8214,"PostedBy":{"Id":"828bab5f-0f36-4e8f-bbc2-e98cbfe67e8f","DisplayName":"Felix","Url":"https://islandjohn.vssps.visualstudio.com/_apis/Identities/828bab5f-0f36-4e8f-bbc2-e98cbfe67e8f","ImageUrl":"https://islandjohn.visualstudio.com/DefaultCollection/_api/_common/identityImage?id=828bab5f-0f36-4e8f-bbc2-e98cbfe67e8f"}}"#;

    // ─────────────────────────────────────────────────────────
    // extract_json
    // ─────────────────────────────────────────────────────────

    #[test]
    fn test_extract_message_payload() {
        let json = extract_json(MESSAGE_LINE).unwrap();
        assert!(json.starts_with(r#"{"Id":6336,"#));
        assert!(json.ends_with(r#"e98cbfe67e8f"}}"#));
        assert_eq!(MESSAGE_LINE.len() - json.len(), MESSAGE_LINE.find('{').unwrap());
    }

    #[test]
    fn test_extract_surrounded_by_text() {
        let line = r#"2016/03/16 rooms add 1 {"Id":1,"Name":"General"} trailing text"#;
        assert_eq!(extract_json(line), Some(r#"{"Id":1,"Name":"General"}"#));
    }

    #[test]
    fn test_extract_no_brace() {
        assert_eq!(extract_json("rooms remove 8214"), None);
        assert_eq!(extract_json(""), None);
    }

    #[test]
    fn test_extract_unbalanced() {
        assert_eq!(extract_json(r#"prefix {"Id":1"#), None);
        assert_eq!(extract_json("only a closing } brace"), None);
    }

    #[test]
    fn test_extract_ignores_braces_in_strings() {
        let line = r#"x {"Content":"a } b { c","Id":2} y"#;
        assert_eq!(extract_json(line), Some(r#"{"Content":"a } b { c","Id":2}"#));
    }

    #[test]
    fn test_extract_escaped_quotes_in_strings() {
        let line = r#"x {"Content":"say \"}\" now","Id":3} y"#;
        assert_eq!(extract_json(line), Some(r#"{"Content":"say \"}\" now","Id":3}"#));
    }

    #[test]
    fn test_extract_escaped_backslash_before_quote() {
        let line = r#"{"Path":"C:\\","Id":4} {"Id":5}"#;
        assert_eq!(extract_json(line), Some(r#"{"Path":"C:\\","Id":4}"#));
    }

    #[test]
    fn test_extract_first_object_only() {
        let line = r#"a {"Id":1} b {"Id":2}"#;
        assert_eq!(extract_json(line), Some(r#"{"Id":1}"#));
    }

    #[test]
    fn test_extract_nested() {
        let line = r#"{"a":{"b":{"c":{}}}}"#;
        assert_eq!(extract_json(line), Some(line));
    }

    #[test]
    fn test_extract_multibyte_text() {
        let line = r#"héllo → {"Name":"Café ☕"} ✓"#;
        assert_eq!(extract_json(line), Some(r#"{"Name":"Café ☕"}"#));
    }

    // ─────────────────────────────────────────────────────────
    // decode_document / decode_line
    // ─────────────────────────────────────────────────────────

    #[test]
    fn test_decode_message_line() {
        let doc = decode_line(MESSAGE_LINE).unwrap().unwrap();
        assert_eq!(doc["MessageType"], "normal");
        assert_eq!(
            document_path(&doc, "PostedBy.DisplayName").and_then(Value::as_str),
            Some("Felix")
        );
    }

    #[test]
    fn test_decode_prefixed_line() {
        let line = r#"ignored prefix {"Id":6336,"MessageType":"normal","PostedBy":{"Id":"x","DisplayName":"Felix"}}"#;
        let doc = decode_line(line).unwrap().unwrap();
        assert_eq!(doc["MessageType"], "normal");
        assert_eq!(doc["PostedBy"]["DisplayName"], "Felix");
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        assert!(matches!(
            decode_document("[1,2,3]"),
            Err(DecodeError::NotAnObject { kind: "an array" })
        ));
        assert!(matches!(
            decode_document("42"),
            Err(DecodeError::NotAnObject { kind: "a number" })
        ));
    }

    #[test]
    fn test_decode_malformed_is_error() {
        assert!(matches!(
            decode_document(r#"{"Id":}"#),
            Err(DecodeError::Syntax(_))
        ));
        assert!(matches!(
            decode_document(r#"{"Name":"unterminated}"#),
            Err(DecodeError::Syntax(_))
        ));
    }

    #[test]
    fn test_decode_line_is_total() {
        let inputs = [
            "",
            "{",
            "}",
            "{}",
            r#"{"a":"#,
            r#"{"a":"b}"#,
            r#"{"a":1,}"#,
            r#"{'a':1}"#,
            r#"{"a":"\"}"#,
            "{{}}",
            r#"prefix {"a":[1,2} suffix"#,
        ];
        for input in inputs {
            // Must never panic; any outcome is acceptable.
            let _ = decode_line(input);
        }
        assert!(decode_line("{}").unwrap().unwrap().is_empty());
        assert!(decode_line("no payload").is_none());
    }

    #[test]
    fn test_truncated_message_never_decodes() {
        // Every cut leaves the outer object open, often mid-string.
        for end in 0..MESSAGE_LINE.len() {
            if !MESSAGE_LINE.is_char_boundary(end) {
                continue;
            }
            let truncated = &MESSAGE_LINE[..end];
            assert!(
                decode_line(truncated).is_none(),
                "decoded a payload from {:?}",
                truncated
            );
            let _ = parse_companion_line(truncated);
        }
        assert!(matches!(decode_line(MESSAGE_LINE), Some(Ok(_))));
    }

    // ─────────────────────────────────────────────────────────
    // parse_companion_line
    // ─────────────────────────────────────────────────────────

    #[test]
    fn test_parse_message_new() {
        match parse_companion_line(MESSAGE_LINE) {
            Some(CompanionEvent::MessagePosted {
                room_id,
                message_id,
                document,
            }) => {
                assert_eq!(room_id, 8214);
                assert_eq!(message_id, 6336);
                assert_eq!(document["Content"], "asdjfsj asdfjasd asjdf");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rooms_add_and_remove() {
        let added = parse_companion_line(r#"rooms add 8214 {"Id":8214,"Name":"General"}"#);
        assert!(matches!(
            added,
            Some(CompanionEvent::RoomAdded { room_id: 8214, ref name, .. }) if name.as_deref() == Some("General")
        ));

        let removed = parse_companion_line("rooms remove 8214");
        assert_eq!(removed, Some(CompanionEvent::RoomRemoved { room_id: 8214 }));
    }

    #[test]
    fn test_parse_rooms_add_falls_back_to_document_id() {
        let added = parse_companion_line(r#"rooms add {"Id":77,"Name":"Ops"}"#);
        assert!(matches!(
            added,
            Some(CompanionEvent::RoomAdded { room_id: 77, .. })
        ));
    }

    #[test]
    fn test_parse_users() {
        let joined = parse_companion_line(
            r#"users add 8214 u-1 {"RoomId":8214,"User":{"Id":"u-1","DisplayName":"Felix"},"IsOnline":true}"#,
        );
        assert!(matches!(
            joined,
            Some(CompanionEvent::UserJoined { room_id: 8214, ref user_id, online: true, .. }) if user_id == "u-1"
        ));

        let changed = parse_companion_line(
            r#"users change 8214 u-1 {"RoomId":8214,"User":{"Id":"u-1"},"IsOnline":false}"#,
        );
        assert!(matches!(
            changed,
            Some(CompanionEvent::UserChanged { online: false, .. })
        ));

        let left = parse_companion_line("users remove 8214 u-1");
        assert_eq!(
            left,
            Some(CompanionEvent::UserLeft {
                room_id: 8214,
                user_id: "u-1".into()
            })
        );
    }

    #[test]
    fn test_parse_account_login() {
        let event =
            parse_companion_line(r#"accounts login {"UserId":"u-1","LoginUser":"felix@example.com"}"#);
        match event {
            Some(CompanionEvent::AccountLogin { account, .. }) => {
                assert_eq!(account.user_id, "u-1");
                assert_eq!(account.login_user, "felix@example.com");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(
            parse_companion_line("rooms error 401 Unauthorized"),
            Some(CompanionEvent::Failure {
                routine: "rooms".into(),
                room_id: None,
                message: "401 Unauthorized".into(),
            })
        );
        assert_eq!(
            parse_companion_line("messages error 8214 Get {url}: timeout"),
            Some(CompanionEvent::Failure {
                routine: "messages".into(),
                room_id: Some(8214),
                message: "Get {url}: timeout".into(),
            })
        );
    }

    #[test]
    fn test_parse_drops_bad_payload() {
        assert_eq!(parse_companion_line(r#"rooms add 1 {"Id":1,"#), None);
        assert_eq!(parse_companion_line("rooms add 1 [1,2]"), None);
        assert_eq!(parse_companion_line("rooms remove not-a-number"), None);
    }

    #[test]
    fn test_parse_ignores_log_output() {
        assert_eq!(
            parse_companion_line("2016/03/16 00:42:29 main.pollTfsRooms:112 EOF"),
            None
        );
        assert_eq!(parse_companion_line(""), None);
    }

    #[test]
    fn test_parse_unrecognized() {
        assert_eq!(
            parse_companion_line("interface ping"),
            Some(CompanionEvent::Unrecognized {
                routine: "interface".into(),
                action: "ping".into(),
            })
        );
    }
}
