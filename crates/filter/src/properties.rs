//! Typed key/value sets attached to services and components.

use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single property value.
///
/// Filters compare typed values natively when the operand converts to the
/// same type, and fall back to the textual form otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
	Bool(bool),
	Long(i64),
	Double(f64),
	String(String),
}

impl PropertyValue {
	/// Textual form used for string comparison and substring matching.
	pub fn as_text(&self) -> Cow<'_, str> {
		match self {
			Self::String(s) => Cow::Borrowed(s),
			Self::Long(v) => Cow::Owned(v.to_string()),
			Self::Double(v) => Cow::Owned(v.to_string()),
			Self::Bool(v) => Cow::Borrowed(if *v { "true" } else { "false" }),
		}
	}

	/// Integer view. Strings are parsed; doubles and booleans are not coerced.
	pub fn as_long(&self) -> Option<i64> {
		match self {
			Self::Long(v) => Some(*v),
			Self::String(s) => s.trim().parse().ok(),
			_ => None,
		}
	}

	/// Floating point view. Integers widen; strings are parsed.
	pub fn as_double(&self) -> Option<f64> {
		match self {
			Self::Double(v) => Some(*v),
			Self::Long(v) => Some(*v as f64),
			Self::String(s) => s.trim().parse().ok(),
			Self::Bool(_) => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(v) => Some(*v),
			Self::String(s) => s.trim().parse().ok(),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(s) => Some(s),
			_ => None,
		}
	}
}

impl fmt::Display for PropertyValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.as_text())
	}
}

impl From<&str> for PropertyValue {
	fn from(value: &str) -> Self {
		Self::String(value.to_string())
	}
}

impl From<String> for PropertyValue {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl From<i64> for PropertyValue {
	fn from(value: i64) -> Self {
		Self::Long(value)
	}
}

impl From<i32> for PropertyValue {
	fn from(value: i32) -> Self {
		Self::Long(value.into())
	}
}

impl From<u64> for PropertyValue {
	fn from(value: u64) -> Self {
		i64::try_from(value).map_or_else(|_| Self::String(value.to_string()), Self::Long)
	}
}

impl From<f64> for PropertyValue {
	fn from(value: f64) -> Self {
		Self::Double(value)
	}
}

impl From<bool> for PropertyValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

/// Ordered string-keyed property set.
///
/// Keys are unique; setting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
	entries: IndexMap<String, PropertyValue>,
}

impl Properties {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets `key` to `value`, returning the previous value if any.
	pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Option<PropertyValue> {
		self.entries.insert(key.into(), value.into())
	}

	/// Builder form of [`Properties::set`].
	pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
		self.set(key, value);
		self
	}

	pub fn get(&self, key: &str) -> Option<&PropertyValue> {
		self.entries.get(key)
	}

	/// String value of `key`, only if it is stored as a string.
	pub fn get_str(&self, key: &str) -> Option<&str> {
		self.get(key).and_then(PropertyValue::as_str)
	}

	/// Integer view of `key`, or `default` when absent or not convertible.
	pub fn get_as_long(&self, key: &str, default: i64) -> i64 {
		self.get(key).and_then(PropertyValue::as_long).unwrap_or(default)
	}

	pub fn get_as_bool(&self, key: &str, default: bool) -> bool {
		self.get(key).and_then(PropertyValue::as_bool).unwrap_or(default)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.entries.contains_key(key)
	}

	/// Removes `key`, keeping the relative order of the remaining entries.
	pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
		self.entries.shift_remove(key)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
		self.entries.iter().map(|(k, v)| (k.as_str(), v))
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.entries.keys().map(String::as_str)
	}
}

impl<K: Into<String>, V: Into<PropertyValue>> FromIterator<(K, V)> for Properties {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut props = Self::new();
		props.extend(iter);
		props
	}
}

impl<K: Into<String>, V: Into<PropertyValue>> Extend<(K, V)> for Properties {
	fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
		for (k, v) in iter {
			self.set(k, v);
		}
	}
}

impl<K: Into<String>, V: Into<PropertyValue>, const N: usize> From<[(K, V); N]> for Properties {
	fn from(entries: [(K, V); N]) -> Self {
		entries.into_iter().collect()
	}
}

impl<'a> IntoIterator for &'a Properties {
	type Item = (&'a String, &'a PropertyValue);
	type IntoIter = indexmap::map::Iter<'a, String, PropertyValue>;

	fn into_iter(self) -> Self::IntoIter {
		self.entries.iter()
	}
}
