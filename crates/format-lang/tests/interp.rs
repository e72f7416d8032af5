// Integration tests for the format interpreter engine

use format_lang::error::Error;
use format_lang::{FormatEngine, ParseOptions, ProcessFilter, Value};
use num_bigint::BigInt;

fn parse(schema: &str, data: &[u8]) -> Value {
    FormatEngine::new()
        .parse(schema, data, &ParseOptions::default())
        .expect("engine.parse failed")
}

fn parse_err(schema: &str, data: &[u8]) -> Error {
    FormatEngine::new()
        .parse(schema, data, &ParseOptions::default())
        .expect_err("engine.parse unexpectedly succeeded")
}

fn int(tree: &Value, name: &str) -> i64 {
    tree.get(name).unwrap().as_int().unwrap()
}

// ========== Magic + fields, little-endian ==========

#[test]
fn test_magic_and_fields_le() {
    let schema = r#"{
        "meta": {"id": "header", "endian": "le"},
        "seq": [
            {"contents": [77, 90]},
            {"id": "version", "type": "u2"},
            {"id": "count", "type": "u4"}
        ]
    }"#;
    let tree = parse(schema, &[0x4D, 0x5A, 0x01, 0x00, 0x0A, 0x00, 0x00, 0x00]);
    assert_eq!(int(&tree, "version"), 1);
    assert_eq!(int(&tree, "count"), 10);
    // the anonymous magic is verified but not stored
    assert_eq!(tree.entries().unwrap().len(), 2);
}

#[test]
fn test_named_contents_is_stored() {
    let schema = r#"{
        "meta": {"id": "header"},
        "seq": [{"id": "magic", "contents": "MZ"}]
    }"#;
    let tree = parse(schema, b"MZ");
    match tree.get("magic").unwrap() {
        Value::Bytes(b) => assert_eq!(b, vec![0x4D, 0x5A]),
        other => panic!("expected bytes, got {:?}", other),
    }
}

#[test]
fn test_contents_mismatch_reports_position() {
    let schema = r#"{
        "meta": {"id": "header"},
        "seq": [{"contents": [77, 90]}]
    }"#;
    match parse_err(schema, &[0x4D, 0x00]) {
        Error::Validation(e) => assert_eq!(e.byte_pos, Some(1)),
        other => panic!("expected validation error, got {:?}", other),
    }
}

// ========== Conditional field ==========

#[test]
fn test_conditional_field() {
    let schema = r#"{
        "meta": {"id": "t", "endian": "le"},
        "seq": [
            {"id": "flag", "type": "u1"},
            {"id": "payload", "type": "u4", "if": "flag == 1"}
        ]
    }"#;
    let tree = parse(schema, &[0x01, 0x0A, 0x0B, 0x0C, 0x0D]);
    assert_eq!(int(&tree, "flag"), 1);
    assert_eq!(int(&tree, "payload"), 0x0D0C0B0A);

    let tree = parse(schema, &[0x00, 0x0A, 0x0B, 0x0C, 0x0D]);
    assert_eq!(int(&tree, "flag"), 0);
    // the gated field produces no stored value
    assert!(tree.get("payload").is_err());
    assert_eq!(tree.entries().unwrap().len(), 1);
}

// ========== Repetition ==========

#[test]
fn test_repeat_with_computed_count() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "a", "type": "u1"},
            {"id": "b", "type": "u1"},
            {"id": "vs", "type": "u1", "repeat": "expr", "repeat-expr": "(a + b) * 2"}
        ]
    }"#;
    let tree = parse(
        schema,
        &[0x02, 0x03, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
    );
    let vs = tree.get("vs").unwrap();
    match &vs {
        Value::List(items) => assert_eq!(items.len(), 10),
        other => panic!("expected sequence, got {:?}", other),
    }
    for i in 0..10 {
        assert_eq!(vs.at(i).unwrap().as_int().unwrap(), (i + 1) as i64);
    }
}

#[test]
fn test_repeat_until_last_value() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "vs", "type": "u1", "repeat": "until", "repeat-until": "_ == 0"},
            {"id": "tail", "type": "u1"}
        ]
    }"#;
    let tree = parse(schema, &[1, 2, 3, 0, 0x99]);
    let vs = tree.get("vs").unwrap();
    match &vs {
        Value::List(items) => assert_eq!(items.len(), 4),
        other => panic!("expected sequence, got {:?}", other),
    }
    assert_eq!(vs.at(3).unwrap().as_int().unwrap(), 0);
    // the loop consumed exactly four bytes
    assert_eq!(int(&tree, "tail"), 0x99);
}

#[test]
fn test_repeat_until_stops_at_eos() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "vs", "type": "u1", "repeat": "until", "repeat-until": "_ == 99"}]
    }"#;
    let tree = parse(schema, &[1, 2, 3]);
    match tree.get("vs").unwrap() {
        Value::List(items) => assert_eq!(items.len(), 3),
        other => panic!("expected sequence, got {:?}", other),
    }
}

#[test]
fn test_repeat_eos() {
    let schema = r#"{
        "meta": {"id": "t", "endian": "le"},
        "seq": [{"id": "vs", "type": "u2", "repeat": "eos"}]
    }"#;
    let tree = parse(schema, &[0x01, 0x00, 0x02, 0x00, 0x03, 0x00]);
    match tree.get("vs").unwrap() {
        Value::List(items) => {
            assert_eq!(items.len(), 3);
            assert_eq!(items[2].as_int().unwrap(), 3);
        }
        other => panic!("expected sequence, got {:?}", other),
    }
}

#[test]
fn test_repeat_eos_on_empty_stream() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "vs", "type": "u1", "repeat": "eos"}]
    }"#;
    let tree = parse(schema, &[]);
    match tree.get("vs").unwrap() {
        Value::List(items) => assert!(items.is_empty()),
        other => panic!("expected sequence, got {:?}", other),
    }
}

#[test]
fn test_negative_repeat_count_fails() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "a", "type": "s1"},
            {"id": "vs", "type": "u1", "repeat": "expr", "repeat-expr": "a"}
        ]
    }"#;
    assert!(matches!(parse_err(schema, &[0xFF]), Error::Parse(_)));
}

#[test]
fn test_repeat_index_variable() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "n", "type": "u1"},
            {"id": "vs", "type": "u1", "repeat": "expr", "repeat-expr": "n"},
            {"id": "after", "type": "u1", "if": "_index == 0 or true"}
        ],
        "instances": {
            "check": {"value": "vs[0] + vs[1]"}
        }
    }"#;
    let tree = parse(schema, &[2, 10, 20, 7]);
    assert_eq!(int(&tree, "check"), 30);
    // _index is unbound outside repetition; `or` short-circuits around it
    assert_eq!(int(&tree, "after"), 7);
}

// ========== Switch types ==========

#[test]
fn test_switch_with_default() {
    let schema = r#"{
        "meta": {"id": "t", "endian": "le"},
        "seq": [
            {"id": "tc", "type": "u1"},
            {"id": "d", "type": {
                "switch-on": "tc",
                "cases": {"1": "u1", "2": "u2"},
                "default": "u4"
            }}
        ]
    }"#;
    let tree = parse(schema, &[0x02, 0x0A, 0x0B]);
    assert_eq!(int(&tree, "tc"), 2);
    assert_eq!(int(&tree, "d"), 0x0B0A);

    let tree = parse(schema, &[0x09, 0x01, 0x02, 0x03, 0x04]);
    assert_eq!(int(&tree, "tc"), 9);
    assert_eq!(int(&tree, "d"), 0x04030201);
}

#[test]
fn test_switch_without_matching_case_fails() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "tc", "type": "u1"},
            {"id": "d", "type": {"switch-on": "tc", "cases": {"1": "u1"}}}
        ]
    }"#;
    assert!(matches!(parse_err(schema, &[9, 0]), Error::Parse(_)));
}

#[test]
fn test_switch_selects_user_type() {
    let schema = r#"{
        "meta": {"id": "t", "endian": "le"},
        "seq": [
            {"id": "kind", "type": "u1"},
            {"id": "body", "type": {"switch-on": "kind", "cases": {"1": "pair"}}}
        ],
        "types": {
            "pair": {"seq": [
                {"id": "x", "type": "u1"},
                {"id": "y", "type": "u1"}
            ]}
        }
    }"#;
    let tree = parse(schema, &[1, 7, 8]);
    let body = tree.get("body").unwrap();
    assert_eq!(int(&body, "x"), 7);
    assert_eq!(int(&body, "y"), 8);
}

// ========== Lazy instances ==========

#[test]
fn test_pos_instance_restores_stream() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "first", "type": "u1"},
            {"id": "second", "type": "u1"}
        ],
        "instances": {
            "at5": {"pos": 5, "type": "u1"},
            "cursor": {"value": "_io.pos"}
        }
    }"#;
    let tree = parse(schema, &[0x01, 0x02, 0x03, 0x04, 0x05, 0xFF]);
    assert_eq!(int(&tree, "first"), 1);
    assert_eq!(int(&tree, "second"), 2);
    assert_eq!(int(&tree, "at5"), 0xFF);
    // position is back where the sequence left it
    assert_eq!(int(&tree, "cursor"), 2);
    // memoized: same value on second access
    assert_eq!(int(&tree, "at5"), 0xFF);
}

#[test]
fn test_value_instance() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "a", "type": "u1"},
            {"id": "b", "type": "u1"}
        ],
        "instances": {
            "total": {"value": "a + b * 2"}
        }
    }"#;
    let tree = parse(schema, &[3, 4]);
    assert_eq!(int(&tree, "total"), 11);
}

#[test]
fn test_instance_usable_in_sequence_expressions() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "a", "type": "u1"},
            {"id": "b", "type": "u1", "if": "double > 3"}
        ],
        "instances": {
            "double": {"value": "a * 2"}
        }
    }"#;
    let tree = parse(schema, &[2, 9]);
    assert_eq!(int(&tree, "b"), 9);
    let tree = parse(schema, &[1, 9]);
    assert!(tree.get("b").is_err());
}

#[test]
fn test_failing_instance_not_memoized() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "a", "type": "u1"}],
        "instances": {
            "beyond": {"pos": 100, "type": "u1"},
            "cursor": {"value": "_io.pos"}
        }
    }"#;
    let tree = parse(schema, &[1]);
    assert!(tree.get("beyond").is_err());
    // the failed read restored the position...
    assert_eq!(int(&tree, "cursor"), 1);
    // ...and the error is raised again on re-access
    assert!(tree.get("beyond").is_err());
}

#[test]
fn test_self_referential_instance_fails() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [],
        "instances": {
            "loop_me": {"value": "loop_me + 1"}
        }
    }"#;
    let tree = parse(schema, &[]);
    assert!(tree.get("loop_me").is_err());
}

// ========== Enums ==========

#[test]
fn test_enum_comparison_and_numeric_storage() {
    let schema = r#"{
        "meta": {"id": "t", "endian": "le"},
        "seq": [
            {"id": "t1", "type": "u1", "enum": "ft"},
            {"id": "body", "type": "u4", "if": "t1 == ft::text"}
        ],
        "enums": {
            "ft": {"1": "text", "2": "binary"}
        }
    }"#;
    let tree = parse(schema, &[0x01, 0x0A, 0x0B, 0x0C, 0x0D]);
    // enum-tagged values stay numeric
    match tree.get("t1").unwrap() {
        Value::Int(1) => {}
        other => panic!("expected Int(1), got {:?}", other),
    }
    assert_eq!(int(&tree, "body"), 0x0D0C0B0A);

    let tree = parse(schema, &[0x02, 0x0A, 0x0B, 0x0C, 0x0D]);
    assert_eq!(int(&tree, "t1"), 2);
    assert!(tree.get("body").is_err());
}

// ========== Strings ==========

#[test]
fn test_sized_string_with_encoding() {
    let schema = r#"{
        "meta": {"id": "t", "encoding": "ASCII"},
        "seq": [
            {"id": "name", "type": "str", "size": 4},
            {"id": "wide", "type": "str", "size": 4, "encoding": "UTF-16LE"}
        ]
    }"#;
    let tree = parse(schema, &[b'a', b'b', b'c', b'd', 0x48, 0x00, 0x69, 0x00]);
    match tree.get("name").unwrap() {
        Value::Str(s) => assert_eq!(s, "abcd"),
        other => panic!("expected string, got {:?}", other),
    }
    match tree.get("wide").unwrap() {
        Value::Str(s) => assert_eq!(s, "Hi"),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn test_terminated_string() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "name", "type": "strz"},
            {"id": "next", "type": "u1"}
        ]
    }"#;
    let tree = parse(schema, &[b'A', b'B', 0, b'C']);
    match tree.get("name").unwrap() {
        Value::Str(s) => assert_eq!(s, "AB"),
        other => panic!("expected string, got {:?}", other),
    }
    // terminator consumed by default
    assert_eq!(int(&tree, "next"), b'C' as i64);
}

#[test]
fn test_terminated_string_custom_flags() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "name", "type": "strz", "terminator": 59, "include": true, "consume": false},
            {"id": "next", "type": "u1"}
        ]
    }"#;
    // terminator is ';' and stays in the stream
    let tree = parse(schema, &[b'h', b'i', b';', b'x']);
    match tree.get("name").unwrap() {
        Value::Str(s) => assert_eq!(s, "hi;"),
        other => panic!("expected string, got {:?}", other),
    }
    assert_eq!(int(&tree, "next"), b';' as i64);
}

#[test]
fn test_unterminated_strz_fails_by_default() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "name", "type": "strz"}]
    }"#;
    assert!(parse_err(schema, &[b'A', b'B']).is_eos());
}

#[test]
fn test_terminated_bytes_field() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "line", "terminator": 10},
            {"id": "next", "type": "u1"}
        ]
    }"#;
    let tree = parse(schema, &[b'o', b'k', b'\n', 0x42]);
    match tree.get("line").unwrap() {
        Value::Bytes(b) => assert_eq!(b, b"ok"),
        other => panic!("expected bytes, got {:?}", other),
    }
    assert_eq!(int(&tree, "next"), 0x42);
}

#[test]
fn test_str_with_terminator() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "name", "type": "str", "terminator": 0}]
    }"#;
    let tree = parse(schema, &[b'h', b'i', 0]);
    match tree.get("name").unwrap() {
        Value::Str(s) => assert_eq!(s, "hi"),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn test_bare_str_without_size_fails() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "name", "type": "str"}]
    }"#;
    assert!(matches!(parse_err(schema, &[1, 2]), Error::Parse(_)));
}

// ========== Sizes and sub-streams ==========

#[test]
fn test_sized_bytes_and_size_eos() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "head", "size": 2},
            {"id": "rest", "size-eos": true}
        ]
    }"#;
    let tree = parse(schema, &[1, 2, 3, 4, 5]);
    match tree.get("head").unwrap() {
        Value::Bytes(b) => assert_eq!(b, vec![1, 2]),
        other => panic!("expected bytes, got {:?}", other),
    }
    match tree.get("rest").unwrap() {
        Value::Bytes(b) => assert_eq!(b, vec![3, 4, 5]),
        other => panic!("expected bytes, got {:?}", other),
    }
}

#[test]
fn test_sized_user_type_is_bounded() {
    // the inner type's size-eos sees only the carved window
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "blk", "type": "block", "size": 3},
            {"id": "after", "type": "u1"}
        ],
        "types": {
            "block": {"seq": [
                {"id": "tag", "type": "u1"},
                {"id": "body", "size-eos": true}
            ]}
        }
    }"#;
    let tree = parse(schema, &[9, 1, 2, 0x77]);
    let blk = tree.get("blk").unwrap();
    assert_eq!(int(&blk, "tag"), 9);
    match blk.get("body").unwrap() {
        Value::Bytes(b) => assert_eq!(b, vec![1, 2]),
        other => panic!("expected bytes, got {:?}", other),
    }
    // the outer stream resumed right past the window
    assert_eq!(int(&tree, "after"), 0x77);
}

#[test]
fn test_inner_read_cannot_cross_window() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "blk", "type": "block", "size": 2}],
        "types": {
            "block": {"seq": [{"id": "wide", "type": "u4"}]}
        }
    }"#;
    assert!(parse_err(schema, &[1, 2, 3, 4, 5]).is_eos());
}

// ========== Endianness ==========

#[test]
fn test_endian_inheritance_and_suffix_override() {
    let schema = r#"{
        "meta": {"id": "t", "endian": "be"},
        "seq": [
            {"id": "inherited", "type": "u2"},
            {"id": "forced", "type": "u2le"},
            {"id": "nested", "type": "pair"}
        ],
        "types": {
            "pair": {"seq": [{"id": "v", "type": "u2"}]}
        }
    }"#;
    let tree = parse(schema, &[0x01, 0x02, 0x01, 0x02, 0x01, 0x02]);
    assert_eq!(int(&tree, "inherited"), 0x0102);
    assert_eq!(int(&tree, "forced"), 0x0201);
    // nested type without meta inherits the enclosing byte order
    assert_eq!(int(&tree.get("nested").unwrap(), "v"), 0x0102);
}

#[test]
fn test_default_endian_is_little() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "v", "type": "u2"}]
    }"#;
    let tree = parse(schema, &[0x01, 0x02]);
    assert_eq!(int(&tree, "v"), 0x0201);
}

#[test]
fn test_endian_switch_in_meta() {
    let schema = r#"{
        "meta": {"id": "t", "endian": "le"},
        "seq": [
            {"id": "order", "type": "u1"},
            {"id": "body", "type": "payload"}
        ],
        "types": {
            "payload": {
                "meta": {"endian": {"switch-on": "_parent.order", "cases": {"0": "le", "1": "be"}}},
                "seq": [{"id": "v", "type": "u2"}]
            }
        }
    }"#;
    let tree = parse(schema, &[0, 0x01, 0x02]);
    assert_eq!(int(&tree.get("body").unwrap(), "v"), 0x0201);
    let tree = parse(schema, &[1, 0x01, 0x02]);
    assert_eq!(int(&tree.get("body").unwrap(), "v"), 0x0102);
}

// ========== 64-bit values ==========

#[test]
fn test_u8_surfaces_full_range() {
    let schema = r#"{
        "meta": {"id": "t", "endian": "le"},
        "seq": [{"id": "big", "type": "u8"}]
    }"#;
    let tree = parse(schema, &[0xFF; 8]);
    match tree.get("big").unwrap() {
        Value::BigInt(v) => assert_eq!(v, BigInt::from(u64::MAX)),
        other => panic!("expected big integer, got {:?}", other),
    }
}

#[test]
fn test_u8_equality_in_expressions() {
    let schema = r#"{
        "meta": {"id": "t", "endian": "le"},
        "seq": [
            {"id": "big", "type": "u8"},
            {"id": "tail", "type": "u1", "if": "big == 0xFFFFFFFFFFFFFFFF"}
        ]
    }"#;
    let mut data = vec![0xFF; 8];
    data.push(0x55);
    let tree = parse(schema, &data);
    assert_eq!(int(&tree, "tail"), 0x55);
}

// ========== Positioned fields ==========

#[test]
fn test_in_sequence_pos_does_not_restore() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "a", "type": "u1"},
            {"id": "jumped", "type": "u1", "pos": 4},
            {"id": "next", "type": "u1"}
        ]
    }"#;
    let tree = parse(schema, &[1, 2, 3, 4, 5, 6]);
    assert_eq!(int(&tree, "a"), 1);
    assert_eq!(int(&tree, "jumped"), 5);
    // the sequence continues from the new position
    assert_eq!(int(&tree, "next"), 6);
}

// ========== Parametric types ==========

#[test]
fn test_parametric_type() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "n", "type": "u1"},
            {"id": "blk", "type": "block(n * 2)"}
        ],
        "types": {
            "block": {
                "params": [{"id": "len", "type": "u4"}],
                "seq": [{"id": "data", "size": "len"}]
            }
        }
    }"#;
    let tree = parse(schema, &[2, 1, 2, 3, 4, 5]);
    let blk = tree.get("blk").unwrap();
    assert_eq!(int(&blk, "len"), 4);
    match blk.get("data").unwrap() {
        Value::Bytes(b) => assert_eq!(b, vec![1, 2, 3, 4]),
        other => panic!("expected bytes, got {:?}", other),
    }
}

#[test]
fn test_missing_type_argument_fails() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "blk", "type": "block"}],
        "types": {
            "block": {
                "params": [{"id": "len"}],
                "seq": [{"id": "data", "size": "len"}]
            }
        }
    }"#;
    assert!(matches!(parse_err(schema, &[1]), Error::Parse(_)));
}

// ========== Scope chain ==========

#[test]
fn test_parent_and_root_access() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [
            {"id": "limit", "type": "u1"},
            {"id": "outer", "type": "wrap"}
        ],
        "types": {
            "wrap": {"seq": [{"id": "inner", "type": "leaf"}]},
            "leaf": {"seq": [
                {"id": "v", "type": "u1", "if": "_root.limit > 0"},
                {"id": "w", "type": "u1", "if": "_parent._parent.limit > 1"}
            ]}
        }
    }"#;
    let tree = parse(schema, &[2, 7, 8]);
    let leaf = tree.get("outer").unwrap().get("inner").unwrap();
    assert_eq!(int(&leaf, "v"), 7);
    assert_eq!(int(&leaf, "w"), 8);
}

#[test]
fn test_type_resolution_walks_outward() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "a", "type": "outer_wrap"}],
        "types": {
            "outer_wrap": {"seq": [{"id": "b", "type": "shared"}]},
            "shared": {"seq": [{"id": "v", "type": "u1"}]}
        }
    }"#;
    let tree = parse(schema, &[42]);
    let v = tree.get("a").unwrap().get("b").unwrap();
    assert_eq!(int(&v, "v"), 42);
}

#[test]
fn test_unknown_type_fails() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "a", "type": "nonexistent"}]
    }"#;
    assert!(matches!(parse_err(schema, &[1]), Error::Parse(_)));
}

#[test]
fn test_enum_inherited_by_nested_type() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "e", "type": "entry"}],
        "enums": {"kind": {"5": "five"}},
        "types": {
            "entry": {"seq": [
                {"id": "k", "type": "u1", "enum": "kind"},
                {"id": "v", "type": "u1", "if": "k == kind::five"}
            ]}
        }
    }"#;
    let tree = parse(schema, &[5, 9]);
    let entry = tree.get("e").unwrap();
    assert_eq!(int(&entry, "v"), 9);
}

// ========== Reserved features ==========

#[test]
fn test_io_redirect_not_implemented() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "a", "type": "u1", "io": "_root._io"}]
    }"#;
    assert!(matches!(
        parse_err(schema, &[1]),
        Error::NotImplemented(_)
    ));
}

#[test]
fn test_unregistered_process_filter_not_implemented() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "a", "size": 2, "process": "zlib"}]
    }"#;
    match parse_err(schema, &[1, 2]) {
        Error::NotImplemented(feature) => assert!(feature.contains("zlib")),
        other => panic!("expected not-implemented, got {:?}", other),
    }
}

struct XorFilter(u8);

impl ProcessFilter for XorFilter {
    fn apply(&self, bytes: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(bytes.iter().map(|b| b ^ self.0).collect())
    }
}

#[test]
fn test_registered_process_filter_runs() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "a", "size": 3, "process": "xor"}]
    }"#;
    let tree = FormatEngine::new()
        .with_filter("xor", XorFilter(0xFF))
        .parse(schema, &[0xFE, 0xFD, 0xFC], &ParseOptions::default())
        .unwrap();
    match tree.get("a").unwrap() {
        Value::Bytes(b) => assert_eq!(b, vec![1, 2, 3]),
        other => panic!("expected bytes, got {:?}", other),
    }
}

#[test]
fn test_process_feeds_sized_subtype() {
    let schema = r#"{
        "meta": {"id": "t", "endian": "le"},
        "seq": [{"id": "blk", "type": "pair", "size": 2, "process": "xor"}],
        "types": {
            "pair": {"seq": [{"id": "v", "type": "u2"}]}
        }
    }"#;
    let tree = FormatEngine::new()
        .with_filter("xor", XorFilter(0xFF))
        .parse(schema, &[0xFE, 0xFF], &ParseOptions::default())
        .unwrap();
    assert_eq!(int(&tree.get("blk").unwrap(), "v"), 0x0001);
}

// ========== Validation options ==========

#[test]
fn test_validation_on_by_default() {
    // missing root meta id: the validator rejects it up front
    let schema = r#"{"seq": [{"id": "a", "type": "u1"}]}"#;
    let err = FormatEngine::new()
        .parse(schema, &[1], &ParseOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_validation_can_be_skipped() {
    let schema = r#"{"seq": [{"id": "a", "type": "u1"}]}"#;
    let options = ParseOptions {
        validate: false,
        strict: false,
    };
    let tree = FormatEngine::new().parse(schema, &[1], &options).unwrap();
    assert_eq!(int(&tree, "a"), 1);
}

#[test]
fn test_strict_mode_promotes_warnings() {
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "BadCase", "type": "u1"}]
    }"#;
    let engine = FormatEngine::new();
    assert!(engine.validate(schema, false).unwrap().valid);
    assert!(!engine.validate(schema, true).unwrap().valid);
}

// ========== Determinism ==========

#[test]
fn test_reparse_is_observably_equal() {
    let schema = r#"{
        "meta": {"id": "t", "endian": "le"},
        "seq": [
            {"id": "n", "type": "u1"},
            {"id": "vs", "type": "u2", "repeat": "expr", "repeat-expr": "n"}
        ]
    }"#;
    let data = &[2, 0x01, 0x00, 0x02, 0x00];
    let a = parse(schema, data);
    let b = parse(schema, data);
    assert_eq!(format!("{:?}", a), format!("{:?}", b));
}

// ========== Deep structures ==========

#[test]
fn test_recursive_type_bounded_by_input() {
    // each dive consumes one byte; the chain ends on a zero tag
    let schema = r#"{
        "meta": {"id": "t"},
        "seq": [{"id": "head", "type": "node"}],
        "types": {
            "node": {"seq": [
                {"id": "tag", "type": "u1"},
                {"id": "next", "type": "node", "if": "tag != 0"}
            ]}
        }
    }"#;
    let tree = parse(schema, &[1, 1, 0]);
    let head = tree.get("head").unwrap();
    let next = head.get("next").unwrap();
    let last = next.get("next").unwrap();
    assert_eq!(int(&last, "tag"), 0);
    assert!(last.get("next").is_err());
}
