//! Property-based test generators using proptest.
//!
//! Paths are generated from a small alphabet so that independent writes
//! collide often enough to exercise overwrites and nesting.

use proptest::prelude::*;
use serde_json::{Map, Value};
use tabdb_core::DocPath;

/// Strategy for a single object-key path segment.
pub fn segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-d][a-z0-9_]{0,3}").expect("Invalid regex")
}

/// Strategy for non-root paths of one to four segments.
pub fn path_strategy() -> impl Strategy<Value = DocPath> {
    prop::collection::vec(segment_strategy(), 1..=4).prop_map(DocPath::from_segments)
}

/// Strategy for JSON scalars.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
    ]
}

/// Strategy for nested JSON values up to three levels deep.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(segment_strategy(), inner, 0..4)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Strategy for a sequence of writes.
pub fn writes_strategy(max: usize) -> impl Strategy<Value = Vec<(DocPath, Value)>> {
    prop::collection::vec((path_strategy(), value_strategy()), 1..=max.max(1))
}
