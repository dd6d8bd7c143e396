//! Domain model module declarations.

use serde_json::Value;

pub mod artifact;
pub mod payload;
pub mod rule;
pub mod snapshot;
pub mod violation;

/// Walk a dotted path (`a.b.0.c`) through nested mappings and sequences.
///
/// Numeric segments index into arrays; any other mismatch yields `None`.
pub(crate) fn walk_path<'a, 'b, I>(root: &'a Value, segments: I) -> Option<&'a Value>
where
    I: IntoIterator<Item = &'b str>,
{
    segments.into_iter().try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// JSON truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are falsy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
