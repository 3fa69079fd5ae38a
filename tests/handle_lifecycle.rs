//! Purpose: End-to-end handle lifecycle checks over the public runtime API.
//! Exports: Integration tests only.
//! Role: Pin reference counting, handle invalidation, and owner teardown behavior.
//! Invariants: A node lives exactly as long as some handle or parent references it.
//! Invariants: A destroyed handle is never resolvable again, even if its slot is reused.

use jsonhandle::api::{
    Access, EncodeFlags, ErrorKind, Handle, IterRead, IterStep, JsonType, Node, OwnerId, Runtime,
};

const OWNER: OwnerId = OwnerId(1);
const OTHER: OwnerId = OwnerId(2);

fn child(rt: &mut Runtime, parent: Handle, key: &str) -> Handle {
    rt.session(OWNER)
        .object_get(parent, key)
        .expect("object_get")
        .value()
        .expect("present")
}

#[test]
fn aliases_survive_any_release_order() {
    let text = r#"{"inner":{"v":[1,2,3]}}"#;
    for parent_first in [true, false] {
        let mut rt = Runtime::new();
        let root = rt.session(OWNER).parse(text).expect("parse");
        let inner = child(&mut rt, root, "inner");
        assert_eq!(rt.session(OWNER).ref_count(inner).expect("refs"), 2);

        let (first, second) = if parent_first {
            (root, inner)
        } else {
            (inner, root)
        };
        rt.session(OWNER).close(first).expect("close first");
        let survivor = rt
            .session(OWNER)
            .dumps(second, EncodeFlags::default().with(EncodeFlags::COMPACT))
            .expect("dumps survivor");
        assert!(!survivor.is_empty());
        assert_eq!(rt.session(OWNER).ref_count(second).expect("refs"), 1);
        rt.session(OWNER).close(second).expect("close second");
        assert_eq!(rt.live_handles(), 0);
    }
}

#[test]
fn object_and_array_paths_alias_the_same_node() {
    for containers_first in [true, false] {
        let mut rt = Runtime::new();
        let mut s = rt.session(OWNER);
        let root = s.parse(r#"{"a":[{"x":1}]}"#).expect("parse");
        let list = s.object_get(root, "a").expect("get").value().expect("list");
        let list_again = s.object_get(root, "a").expect("get").value().expect("list");
        let item = s.array_get(list, 0).expect("get").value().expect("item");
        let item_again = s
            .array_get(list_again, 0)
            .expect("get")
            .value()
            .expect("item");
        assert_eq!(s.ref_count(list).expect("refs"), 3);
        assert_eq!(s.ref_count(item).expect("refs"), 3);

        let (closed, survivor, text) = if containers_first {
            ([root, list, list_again, item], item_again, r#"{"x":1}"#)
        } else {
            ([item_again, item, list_again, list], root, r#"{"a":[{"x":1}]}"#)
        };
        for handle in closed {
            s.close(handle).expect("close");
        }
        assert_eq!(s.ref_count(survivor).expect("refs"), 1);
        let compact = EncodeFlags::default().with(EncodeFlags::COMPACT);
        assert_eq!(s.dumps(survivor, compact).expect("dumps"), text);
        s.close(survivor).expect("close survivor");
        drop(s);
        assert_eq!(rt.live_handles(), 0);
    }
}

#[test]
fn destroyed_handle_is_rejected_after_slot_reuse() {
    let mut rt = Runtime::new();
    let mut s = rt.session(OWNER);
    let first = s.parse("1").expect("parse");
    s.close(first).expect("close");
    let second = s.parse("2").expect("parse");
    assert_ne!(first, second);

    let err = s.read_integer(first).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidHandle);
    assert_eq!(err.handle(), Some(first.raw()));
    assert_eq!(s.close(first).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(s.read_integer(second).expect("read"), Access::Value(2));
}

#[test]
fn iterator_handles_are_not_values() {
    let mut rt = Runtime::new();
    let mut s = rt.session(OWNER);
    let root = s.parse(r#"{"k":1}"#).expect("parse");
    let iter = s.object_iter(root).expect("iter").value().expect("iter");

    assert_eq!(s.type_of(iter).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(
        s.object_iter_next(root).unwrap_err().kind(),
        ErrorKind::InvalidHandle
    );
    s.close(iter).expect("close iterator early");
    assert_eq!(s.ref_count(root).expect("refs"), 1);
}

#[test]
fn iteration_visits_every_entry_once_in_order() {
    let mut rt = Runtime::new();
    let mut s = rt.session(OWNER);
    let root = s
        .parse(r#"{"z":1,"a":"two","m":[3],"b":null}"#)
        .expect("parse");
    let size = s.object_size(root).expect("size").value().expect("object");
    let iter = s.object_iter(root).expect("iter").value().expect("iter");

    let mut keys = Vec::new();
    loop {
        let IterRead::Entry { key, value } = s.object_iter_read(iter).expect("read") else {
            panic!("read before next must not exhaust");
        };
        let direct = s
            .object_get(root, &key)
            .expect("get")
            .value()
            .expect("present");
        let flags = EncodeFlags::default();
        assert_eq!(
            s.dumps(value, flags).expect("dumps"),
            s.dumps(direct, flags).expect("dumps")
        );
        s.close(value).expect("close");
        s.close(direct).expect("close");
        keys.push(key);
        if s.object_iter_next(iter).expect("next") == IterStep::Exhausted {
            break;
        }
    }
    assert_eq!(keys.len(), size);
    assert_eq!(keys, ["z", "a", "m", "b"]);
    assert_eq!(s.ref_count(root).expect("refs"), 1);
}

#[test]
fn exhausted_iterator_read_destroys_handle() {
    let mut rt = Runtime::new();
    let mut s = rt.session(OWNER);
    let root = s.parse(r#"{"only":true}"#).expect("parse");
    let iter = s.object_iter(root).expect("iter").value().expect("iter");
    assert_eq!(s.object_iter_next(iter).expect("next"), IterStep::Exhausted);
    assert_eq!(
        s.object_iter_read(iter).unwrap_err().kind(),
        ErrorKind::InvalidHandle
    );

    let empty = s.parse("{}").expect("parse");
    assert_eq!(s.object_iter(empty).expect("iter"), Access::OutOfRange);
    drop(s);
    assert_eq!(rt.live_handles(), 2);
}

#[test]
fn array_index_bounds() {
    let mut rt = Runtime::new();
    let mut s = rt.session(OWNER);
    let list = s.parse("[10, 20, 30]").expect("parse");
    for index in [-1, -3, 3, i64::MIN, i64::MAX] {
        assert_eq!(
            s.array_get(list, index).expect("get"),
            Access::OutOfRange,
            "{index}"
        );
    }
    let last = s.array_get(list, 2).expect("get").value().expect("last");
    assert_eq!(s.read_integer(last).expect("read"), Access::Value(30));
    assert_eq!(s.object_get(list, "0").expect("get"), Access::WrongType);
    drop(s);
    assert_eq!(rt.live_handles(), 2);
}

#[test]
fn type_codes_and_scalar_reads() {
    let mut rt = Runtime::new();
    let mut s = rt.session(OWNER);
    let root = s
        .parse(r#"[null, true, 7, 1.25, "s", [], {}]"#)
        .expect("parse");
    let expected = [
        JsonType::Null,
        JsonType::Bool,
        JsonType::Integer,
        JsonType::Real,
        JsonType::String,
        JsonType::Array,
        JsonType::Object,
    ];
    for (index, json_type) in expected.into_iter().enumerate() {
        let item = s
            .array_get(root, index as i64)
            .expect("get")
            .value()
            .expect("item");
        assert_eq!(s.type_of(item).expect("type"), json_type);
        assert_eq!(json_type.code(), index as i32);
    }

    let real = s.array_get(root, 3).expect("get").value().expect("real");
    assert_eq!(s.read_real(real).expect("read"), Access::Value(1.25));
    let flag = s.array_get(root, 1).expect("get").value().expect("bool");
    assert_eq!(s.read_bool(flag).expect("read"), Access::Value(true));
    let text = s.array_get(root, 4).expect("get").value().expect("string");
    assert_eq!(
        s.read_string(text).expect("read"),
        Access::Value("s".to_string())
    );
    assert_eq!(s.read_integer(text).expect("read"), Access::WrongType);
}

#[test]
fn owner_release_frees_only_that_owner() {
    let mut rt = Runtime::new();
    let mine = rt.session(OWNER).parse(r#"{"a":[1]}"#).expect("parse");
    let _a = child(&mut rt, mine, "a");
    let iter = rt
        .session(OWNER)
        .object_iter(mine)
        .expect("iter")
        .value()
        .expect("iter");
    let theirs = rt.session(OTHER).parse("[1]").expect("parse");
    assert_eq!(rt.live_handles(), 4);

    assert_eq!(rt.release_owner(OWNER), 3);
    assert_eq!(rt.live_handles(), 1);
    assert_eq!(
        rt.session(OWNER).object_iter_next(iter).unwrap_err().kind(),
        ErrorKind::InvalidHandle
    );
    assert_eq!(
        rt.session(OTHER).array_size(theirs).expect("size"),
        Access::Value(1)
    );
    assert_eq!(rt.release_owner(OWNER), 0);
}

#[test]
fn foreign_owner_cannot_use_or_close() {
    let mut rt = Runtime::new();
    let root = rt.session(OWNER).parse("[1]").expect("parse");
    let mut other = rt.session(OTHER);
    assert_eq!(
        other.array_size(root).unwrap_err().kind(),
        ErrorKind::InvalidHandle
    );
    assert_eq!(other.close(root).unwrap_err().kind(), ErrorKind::InvalidHandle);
    assert_eq!(
        rt.session(OWNER).array_size(root).expect("size"),
        Access::Value(1)
    );
}

#[test]
fn adopt_takes_ownership_without_extra_reference() {
    let mut rt = Runtime::new();
    let node = Node::object([("n", Node::integer(4))]);
    let keep = node.incref();
    assert_eq!(keep.ref_count(), 2);

    let handle = rt.session(OWNER).adopt(node).expect("adopt");
    assert_eq!(keep.ref_count(), 2);
    assert_eq!(rt.session(OWNER).ref_count(handle).expect("refs"), 2);

    rt.session(OWNER).close(handle).expect("close");
    assert_eq!(keep.ref_count(), 1);
}

#[test]
fn dropping_runtime_releases_every_reference() {
    let node = Node::array(vec![Node::string("x")]);
    let keep = node.incref();
    {
        let mut rt = Runtime::new();
        let mut s = rt.session(OWNER);
        let handle = s.adopt(node).expect("adopt");
        s.array_get(handle, 0).expect("get");
        assert_eq!(keep.ref_count(), 2);
    }
    assert_eq!(keep.ref_count(), 1);
}
