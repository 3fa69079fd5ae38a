//! Purpose: Regression coverage for parse-failure categories and positions.
//! Exports: Integration tests only.
//! Role: Verify the diagnostics a host sees when `parse` rejects a document.
//! Invariants: Failed parses report line/column and mint no handle.
//! Invariants: Category labels stay stable across parser updates.

use jsonhandle::api::{ErrorKind, OwnerId, ParseFailureCategory, Runtime};
use jsonhandle::core::decode;

fn category_of(text: &str) -> ParseFailureCategory {
    let err = serde_json::from_str::<serde_json::Value>(text).unwrap_err();
    decode::categorize_error(&err)
}

#[test]
fn category_mapping_handles_syntax_and_eof() {
    assert_eq!(category_of(r#"{"a":}"#), ParseFailureCategory::Syntax);
    assert_eq!(category_of("[1] x"), ParseFailureCategory::Syntax);
    assert_eq!(category_of(r#"{"a":"#), ParseFailureCategory::Eof);
    assert_eq!(category_of(""), ParseFailureCategory::Eof);
}

#[test]
fn parse_error_carries_position_and_category() {
    let err = decode::parse(r#"{"a":}"#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(err.line(), Some(1));
    assert_eq!(err.column(), Some(6));
    let message = err.message().expect("message");
    assert!(message.contains("parse category: syntax"), "{message}");
    assert!(!message.contains("at line"), "{message}");
    assert!(err.to_string().starts_with("Parse: Line 1:6: "));
}

#[test]
fn position_tracks_later_lines() {
    let err = decode::parse("{\n  \"a\": 1,\n  \"b\": tru\n}").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(err.line(), Some(3));
    assert_eq!(err.column(), Some(10));
}

#[test]
fn integers_beyond_i64_are_rejected() {
    let err = decode::parse("[9223372036854775808]").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    let message = err.message().expect("message");
    assert!(message.contains("too big integer"), "{message}");
    assert!(message.contains("parse category: data"), "{message}");

    let root = decode::parse("[9223372036854775807, -9223372036854775808]").expect("bounds");
    assert_eq!(root.array_get(0).and_then(|n| n.as_i64()), Some(i64::MAX));
    assert_eq!(root.array_get(1).and_then(|n| n.as_i64()), Some(i64::MIN));
}

#[test]
fn runtime_parse_failure_leaves_table_empty() {
    let mut runtime = Runtime::new();
    let owner = OwnerId(9);
    for text in [r#"{"a":"#, "nul", "{\"a\" 1}", "[1,]"] {
        let err = runtime.session(owner).parse(text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse, "{text}");
        assert!(err.line().is_some(), "{text}");
    }
    assert_eq!(runtime.live_handles(), 0);
}

#[test]
fn scalar_roots_are_accepted() {
    let mut runtime = Runtime::new();
    let mut session = runtime.session(OwnerId(1));
    for text in ["1", "\"s\"", "true", "null", "2.5"] {
        session.parse(text).expect(text);
    }
    drop(session);
    assert_eq!(runtime.live_handles(), 5);
}
