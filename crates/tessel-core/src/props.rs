//! Untyped property maps at the platform-bridge edge.
//!
//! The reconciler keeps element properties as an insertion-ordered [`Props`]
//! map and describes changes between two renders as a [`PropDiff`]: an
//! ordered list of keys that were set to a new value or reset to the native
//! default. Typed prop schemas implement [`ElementProps`] and serialize into
//! a [`Props`] map only when an element node is built.

use std::fmt;

use indexmap::IndexMap;

/// A single property value as seen by the native side.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum PropValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<PropValue>),
    Map(Props),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropValue::Float(value) => Some(*value),
            PropValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropValue::Null)
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Null => f.write_str("null"),
            PropValue::Bool(value) => write!(f, "{value}"),
            PropValue::Int(value) => write!(f, "{value}"),
            PropValue::Float(value) => write!(f, "{value}"),
            PropValue::Str(value) => write!(f, "{value:?}"),
            PropValue::List(values) => {
                f.write_str("[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
            PropValue::Map(props) => write!(f, "{props}"),
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(value as i64)
    }
}

impl From<u32> for PropValue {
    fn from(value: u32) -> Self {
        PropValue::Int(value as i64)
    }
}

impl From<usize> for PropValue {
    fn from(value: usize) -> Self {
        PropValue::Int(value as i64)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<f32> for PropValue {
    fn from(value: f32) -> Self {
        PropValue::Float(value as f64)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(value)
    }
}

impl<T: Into<PropValue>> From<Vec<T>> for PropValue {
    fn from(values: Vec<T>) -> Self {
        PropValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<Props> for PropValue {
    fn from(value: Props) -> Self {
        PropValue::Map(value)
    }
}

impl<T: Into<PropValue>> From<Option<T>> for PropValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(PropValue::Null)
    }
}

/// Insertion-ordered property map. Keys are unique.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Props {
    entries: IndexMap<String, PropValue>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or replaces a value. Replacing keeps the key's original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Option<PropValue> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<PropValue> {
        self.entries.shift_remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Computes the changes that turn `self` into `next`.
    ///
    /// Keys whose value differs (or that are new) come first in `next`'s
    /// order, followed by keys that disappeared, which are reset.
    pub fn diff(&self, next: &Props) -> PropDiff {
        let mut diff = PropDiff::default();
        for (key, value) in next.entries.iter() {
            if self.entries.get(key) != Some(value) {
                diff.set(key.clone(), value.clone());
            }
        }
        for key in self.entries.keys() {
            if !next.entries.contains_key(key) {
                diff.reset(key.clone());
            }
        }
        diff
    }

    /// Applies a diff. Applying the same diff twice is a no-op the second time.
    pub fn apply_diff(&mut self, diff: &PropDiff) {
        for (key, change) in diff.iter() {
            match change {
                PropChange::Set(value) => {
                    self.entries.insert(key.to_owned(), value.clone());
                }
                PropChange::Reset => {
                    self.entries.shift_remove(key);
                }
            }
        }
    }
}

impl fmt::Display for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, (key, value)) in self.entries.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        f.write_str("}")
    }
}

impl<K: Into<String>, V: Into<PropValue>> FromIterator<(K, V)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Props::new();
        for (key, value) in iter {
            props.insert(key, value);
        }
        props
    }
}

/// A single key change inside a [`PropDiff`].
#[derive(Clone, Debug, PartialEq)]
pub enum PropChange {
    Set(PropValue),
    /// The key is gone from the new props; the native side restores its default.
    Reset,
}

/// Ordered changed-keys set carried by an update mutation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropDiff {
    changes: Vec<(String, PropChange)>,
}

impl PropDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Records `key = value`, replacing an earlier change for the same key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropValue>) {
        self.put(key.into(), PropChange::Set(value.into()));
    }

    /// Records a reset of `key`, replacing an earlier change for the same key.
    pub fn reset(&mut self, key: impl Into<String>) {
        self.put(key.into(), PropChange::Reset);
    }

    /// Drops any change recorded for `key`.
    pub fn remove(&mut self, key: &str) -> Option<PropChange> {
        let index = self.changes.iter().position(|(existing, _)| existing == key)?;
        Some(self.changes.remove(index).1)
    }

    pub fn get(&self, key: &str) -> Option<&PropChange> {
        self.changes
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, change)| change)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropChange)> {
        self.changes.iter().map(|(key, change)| (key.as_str(), change))
    }

    fn put(&mut self, key: String, change: PropChange) {
        if let Some(slot) = self.changes.iter_mut().find(|(existing, _)| *existing == key) {
            slot.1 = change;
        } else {
            self.changes.push((key, change));
        }
    }
}

/// Statically typed prop schema for one element type.
///
/// Only the serialized [`Props`] form crosses into the reconciler, so the
/// diffing stays generic while call sites keep a typed surface.
pub trait ElementProps {
    /// Native view type tag.
    const TAG: &'static str;

    fn to_props(&self) -> Props;
}

/// Builds a [`Props`] map from `key => value` pairs.
#[macro_export]
macro_rules! props {
    () => {
        $crate::Props::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut props = $crate::Props::new();
        $(props.insert($key, $value);)+
        props
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_reports_changed_then_removed_keys() {
        let old = props! { "color" => "red", "width" => 10, "opacity" => 0.5 };
        let new = props! { "width" => 12, "color" => "red", "label" => "hi" };
        let diff = old.diff(&new);
        let keys: Vec<_> = diff.keys().collect();
        assert_eq!(keys, vec!["width", "label", "opacity"]);
        assert_eq!(diff.get("opacity"), Some(&PropChange::Reset));
        assert_eq!(diff.get("width"), Some(&PropChange::Set(PropValue::Int(12))));
    }

    #[test]
    fn identical_props_produce_empty_diff() {
        let props = props! { "a" => 1, "b" => true };
        assert!(props.diff(&props.clone()).is_empty());
    }

    #[test]
    fn applying_a_diff_twice_is_idempotent() {
        let old = props! { "a" => 1, "b" => "x", "c" => false };
        let new = props! { "a" => 2, "c" => false, "d" => 4.5 };
        let diff = old.diff(&new);

        let mut native = old.clone();
        native.apply_diff(&diff);
        let once = native.clone();
        native.apply_diff(&diff);

        assert_eq!(native, once);
        assert_eq!(native.get("a"), Some(&PropValue::Int(2)));
        assert!(native.get("b").is_none());
        assert_eq!(native.get("d"), Some(&PropValue::Float(4.5)));
    }

    #[test]
    fn diff_set_replaces_existing_change() {
        let mut diff = PropDiff::new();
        diff.set("a", 1);
        diff.reset("a");
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.get("a"), Some(&PropChange::Reset));
        assert_eq!(diff.remove("a"), Some(PropChange::Reset));
        assert!(diff.is_empty());
    }

    struct LabelProps {
        text: String,
        lines: u32,
    }

    impl ElementProps for LabelProps {
        const TAG: &'static str = "Text";

        fn to_props(&self) -> Props {
            props! { "text" => self.text.as_str(), "lines" => self.lines }
        }
    }

    #[test]
    fn typed_schema_serializes_in_declaration_order() {
        let props = LabelProps {
            text: "hello".into(),
            lines: 2,
        }
        .to_props();
        assert_eq!(LabelProps::TAG, "Text");
        assert_eq!(props.keys().collect::<Vec<_>>(), vec!["text", "lines"]);
        assert_eq!(props.to_string(), "{text: \"hello\", lines: 2}");
    }
}
