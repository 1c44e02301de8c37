//! Document paths and the path resolver.
//!
//! A [`DocPath`] is an ordered list of string segments. The empty path is the
//! document root. Strings are split on `.`, so `"projects.list.p1"` and
//! `["projects", "list", "p1"]` address the same location.
//!
//! The resolver functions walk a `serde_json::Value` tree. Objects are indexed
//! by key and arrays by decimal index.

use serde_json::{Map, Value};
use std::fmt;

/// Separator used when a path is written as a single string.
pub const SEPARATOR: char = '.';

/// A location inside the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    segments: Vec<String>,
}

impl DocPath {
    /// The document root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a `.`-joined path. Empty segments are ignored.
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split(SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Builds a path from individual segments. Empty segments are ignored.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    /// Returns the segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Consumes the path, returning its segments.
    pub fn into_segments(self) -> Vec<String> {
        self.segments
    }

    /// Returns true for the document root.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true for the document root.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the `.`-joined form. The root joins to `""`.
    pub fn joined(&self) -> String {
        self.segments.join(".")
    }

    /// Returns a path extended by one segment.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        let segment = segment.into();
        if !segment.is_empty() {
            segments.push(segment);
        }
        Self { segments }
    }

    /// Returns the parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Iterates over strict ancestors, closest first, ending at the root.
    pub fn ancestors(&self) -> impl Iterator<Item = DocPath> + '_ {
        (0..self.segments.len()).rev().map(move |k| Self {
            segments: self.segments[..k].to_vec(),
        })
    }

    /// Returns true if `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &DocPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.joined())
        }
    }
}

impl From<&str> for DocPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<String> for DocPath {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}

impl From<&String> for DocPath {
    fn from(path: &String) -> Self {
        Self::parse(path)
    }
}

impl From<&DocPath> for DocPath {
    fn from(path: &DocPath) -> Self {
        path.clone()
    }
}

impl From<Vec<String>> for DocPath {
    fn from(segments: Vec<String>) -> Self {
        Self::from_segments(segments)
    }
}

impl From<&[&str]> for DocPath {
    fn from(segments: &[&str]) -> Self {
        Self::from_segments(segments.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for DocPath {
    fn from(segments: [&str; N]) -> Self {
        Self::from_segments(segments)
    }
}

/// Reads the value at `path`.
///
/// Returns `None` as soon as an intermediate value is missing, `null`, or not
/// a container. Never panics.
pub fn get_value_at_path<'a>(tree: &'a Value, path: &DocPath) -> Option<&'a Value> {
    let mut current = tree;
    for segment in path.segments() {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Most `null` slots a write may add past the end of an array.
pub const MAX_ARRAY_GAP: usize = 1024;

/// Writes `value` at `path`, creating intermediate objects as needed.
///
/// A root path replaces the whole tree. Intermediate values that are not
/// containers (including `null`) are replaced by empty objects. On arrays, a
/// decimal segment addresses an element: past the end the array is padded
/// with `null`, by at most [`MAX_ARRAY_GAP`] slots. Any other segment,
/// including an index further out, replaces the array by an object.
pub fn set_value_at_path(tree: &mut Value, path: &DocPath, value: Value) {
    let Some((last, parents)) = path.segments().split_last() else {
        *tree = value;
        return;
    };

    let mut current = tree;
    for segment in parents {
        current = match slot_mut(current, segment) {
            Some(slot) => slot,
            None => return,
        };
    }

    if let Some(slot) = slot_mut(current, last) {
        *slot = value;
    }
}

/// Removes the value at `path`, returning it.
///
/// Object keys are removed. Array elements are replaced by `null` so the
/// indices of their siblings stay stable. A missing location is a no-op. The
/// root is reset to an empty object.
pub fn remove_value_at_path(tree: &mut Value, path: &DocPath) -> Option<Value> {
    let Some((last, parents)) = path.segments().split_last() else {
        return Some(std::mem::replace(tree, Value::Object(Map::new())));
    };

    let mut current = tree;
    for segment in parents {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    match current {
        Value::Object(map) => map.remove(last),
        Value::Array(items) => {
            let index = last.parse::<usize>().ok()?;
            items
                .get_mut(index)
                .map(|slot| std::mem::replace(slot, Value::Null))
        }
        _ => None,
    }
}

/// Returns the child slot for `segment`, turning `node` into a container
/// first if needed.
fn slot_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    let array_index = match &*node {
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .filter(|&index| index.saturating_sub(items.len()) <= MAX_ARRAY_GAP),
        _ => None,
    };

    match (node, array_index) {
        (Value::Array(items), Some(index)) => {
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            items.get_mut(index)
        }
        (node, _) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            node.as_object_mut()
                .map(|map| map.entry(segment.to_string()).or_insert(Value::Null))
        }
    }
}
