//! Dot/bracket path addressing into JSON values.
//!
//! `items[2].name`, `items.2.name` and `items[2]name` all address the same
//! slot. Purely numeric segments are indices; everything else is an object
//! key.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{FormError, Result};

/// How many `null`s a write may pad an array with to reach its index.
pub const MAX_INDEX_GAP: usize = 4096;

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Array index.
    Index(usize),
    /// Object key.
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Key(key) => f.write_str(key),
        }
    }
}

/// Split a path into segments.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    path.replace('[', ".")
        .replace(']', "")
        .split('.')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.parse::<usize>() {
            Ok(index) if segment.bytes().all(|b| b.is_ascii_digit()) => PathSegment::Index(index),
            _ => PathSegment::Key(segment.to_string()),
        })
        .collect()
}

/// Render segments in canonical form: keys joined with `.`, indices in
/// brackets.
pub fn render_path(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            PathSegment::Index(index) => {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
            PathSegment::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
        }
    }
    out
}

/// The path of element `index` of the array at `field`.
pub fn index_path(field: &str, index: usize) -> String {
    format!("{field}[{index}]")
}

/// Whether `candidate` is `prefix` itself or nested below it.
///
/// `items[1]` contains `items[1].name` and `items[1][0]` but not
/// `items[10]`.
pub fn is_within(candidate: &str, prefix: &str) -> bool {
    match candidate.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with('['),
        None => false,
    }
}

fn child<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match (value, segment) {
        (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
        (Value::Object(map), PathSegment::Index(index)) => map.get(&index.to_string()),
        (Value::Object(map), PathSegment::Key(key)) => map.get(key),
        _ => None,
    }
}

/// Read the value at `path`. The empty path addresses the root.
pub fn get_by<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    parse_path(path)
        .iter()
        .try_fold(value, |current, segment| child(current, segment))
}

/// Mutable slot for `segment` inside `value`, creating containers as
/// needed.
///
/// A scalar parent is replaced by an array for index segments and by an
/// object for key segments. Arrays are padded with `null` up to the
/// addressed index, at most [`MAX_INDEX_GAP`] elements at a time.
fn child_mut<'a>(value: &'a mut Value, segment: &PathSegment, path: &str) -> Result<&'a mut Value> {
    match segment {
        PathSegment::Index(index) => {
            if !value.is_array() && !value.is_object() {
                *value = Value::Array(Vec::new());
            }
            match value {
                Value::Object(map) => Ok(map.entry(index.to_string()).or_insert(Value::Null)),
                Value::Array(items) => {
                    let len = items.len();
                    if len <= *index {
                        let new_len = index
                            .checked_add(1)
                            .filter(|new_len| new_len - len <= MAX_INDEX_GAP)
                            .ok_or_else(|| FormError::index_too_far(path, *index, len))?;
                        items.resize(new_len, Value::Null);
                    }
                    Ok(&mut items[*index])
                }
                other => Ok(other),
            }
        }
        PathSegment::Key(key) => {
            if !value.is_object() {
                *value = Value::Object(Map::new());
            }
            match value {
                Value::Object(map) => Ok(map.entry(key.clone()).or_insert(Value::Null)),
                other => Ok(other),
            }
        }
    }
}

/// Replace the value at `path` with `updater(current)`.
///
/// `current` is `Value::Null` when nothing is stored there yet. Fails with
/// [`FormError::IndexTooFar`] when reaching an index would pad an array by
/// more than [`MAX_INDEX_GAP`]; `root` may then hold containers created on
/// the way down, so callers write into a copy.
pub fn set_by<F>(root: &mut Value, path: &str, updater: F) -> Result<()>
where
    F: FnOnce(&Value) -> Value,
{
    let slot = parse_path(path)
        .iter()
        .try_fold(root, |current, segment| child_mut(current, segment, path))?;
    let next = updater(slot);
    *slot = next;
    Ok(())
}

/// Remove the value at `path`.
///
/// Object keys are removed; array elements are filtered out, shifting
/// later elements down. Missing paths and out-of-range indices are a no-op.
pub fn delete_by(root: &mut Value, path: &str) {
    let segments = parse_path(path);
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = root;
    for segment in parents {
        current = match (current, segment) {
            (Value::Array(items), PathSegment::Index(index)) => match items.get_mut(*index) {
                Some(next) => next,
                None => return,
            },
            (Value::Object(map), segment) => match map.get_mut(&segment.to_string()) {
                Some(next) => next,
                None => return,
            },
            _ => return,
        };
    }

    match (current, last) {
        (Value::Array(items), PathSegment::Index(index)) if *index < items.len() => {
            items.remove(*index);
        }
        (Value::Object(map), segment) => {
            map.remove(&segment.to_string());
        }
        _ => {}
    }
}
