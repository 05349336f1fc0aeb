//! Configuration value model
//!
//! A `ConfigValue` is frozen on construction. Containers are shared behind `Arc` and no API
//! hands out mutable access to their contents, so a stored value can never be changed through
//! a reference the caller kept. The `From` conversions are the freeze step: they copy
//! caller-owned data into these containers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Frozen mapping payload of [`ConfigValue::Map`]
pub type ValueMap = BTreeMap<Box<str>, ConfigValue>;

/// Runtime type of a configuration value, the unit of type checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
	Null,
	Bool,
	Int,
	Float,
	String,
	List,
	Map,
}

impl ValueKind {
	/// Every kind a value can have except `Null`
	pub const NON_NULL: [ValueKind; 6] = [
		ValueKind::Bool,
		ValueKind::Int,
		ValueKind::Float,
		ValueKind::String,
		ValueKind::List,
		ValueKind::Map,
	];

	pub fn name(self) -> &'static str {
		match self {
			ValueKind::Null => "null",
			ValueKind::Bool => "bool",
			ValueKind::Int => "int",
			ValueKind::Float => "float",
			ValueKind::String => "string",
			ValueKind::List => "list",
			ValueKind::Map => "map",
		}
	}

	/// Numeric kinds take range bounds
	pub fn is_numeric(self) -> bool {
		matches!(self, ValueKind::Int | ValueKind::Float)
	}

	/// Sized kinds take length bounds
	pub fn is_sized(self) -> bool {
		matches!(self, ValueKind::String | ValueKind::List | ValueKind::Map)
	}
}

impl fmt::Display for ValueKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Configuration value
///
/// Serialized untagged, so the JSON form is the natural one. Integers and floats keep distinct
/// encodings (`1` vs `1.0`), which makes the serialization type-stable for checksums. NaN and the
/// infinities have no JSON form and fail to serialize instead of turning into `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum ConfigValue {
	#[default]
	Null,
	Bool(bool), // Must be before Int to avoid bool -> int coercion
	Int(i64),
	Float(#[serde(serialize_with = "serialize_finite")] f64),
	String(Arc<str>),
	List(Arc<[ConfigValue]>),
	Map(Arc<ValueMap>),
}

fn serialize_finite<S: serde::Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
	if !value.is_finite() {
		return Err(serde::ser::Error::custom(format!("non-finite float {}", value)));
	}
	serializer.serialize_f64(*value)
}

impl ConfigValue {
	/// Build a frozen list from any iterator of convertible items
	pub fn list<I, T>(items: I) -> Self
	where
		I: IntoIterator<Item = T>,
		T: Into<ConfigValue>,
	{
		ConfigValue::List(items.into_iter().map(Into::into).collect())
	}

	/// Build a frozen map from any iterator of key/value pairs
	pub fn map<I, K, V>(entries: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<Box<str>>,
		V: Into<ConfigValue>,
	{
		let map: ValueMap = entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
		ConfigValue::Map(Arc::new(map))
	}

	pub fn kind(&self) -> ValueKind {
		match self {
			ConfigValue::Null => ValueKind::Null,
			ConfigValue::Bool(_) => ValueKind::Bool,
			ConfigValue::Int(_) => ValueKind::Int,
			ConfigValue::Float(_) => ValueKind::Float,
			ConfigValue::String(_) => ValueKind::String,
			ConfigValue::List(_) => ValueKind::List,
			ConfigValue::Map(_) => ValueKind::Map,
		}
	}

	/// Get the type name for error messages
	pub fn type_name(&self) -> &'static str {
		self.kind().name()
	}

	pub fn is_null(&self) -> bool {
		matches!(self, ConfigValue::Null)
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			ConfigValue::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			ConfigValue::Int(i) => Some(*i),
			_ => None,
		}
	}

	/// False when a NaN or infinite float occurs anywhere in the value
	pub fn is_finite(&self) -> bool {
		match self {
			ConfigValue::Float(x) => x.is_finite(),
			ConfigValue::List(items) => items.iter().all(ConfigValue::is_finite),
			ConfigValue::Map(map) => map.values().all(ConfigValue::is_finite),
			_ => true,
		}
	}

	/// Numeric view used by range checks, `None` for non-numeric values
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			ConfigValue::Int(i) => Some(*i as f64),
			ConfigValue::Float(x) => Some(*x),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			ConfigValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_list(&self) -> Option<&[ConfigValue]> {
		match self {
			ConfigValue::List(items) => Some(items),
			_ => None,
		}
	}

	pub fn as_map(&self) -> Option<&ValueMap> {
		match self {
			ConfigValue::Map(map) => Some(map),
			_ => None,
		}
	}

	/// Length of a sized value (chars of a string, items of a list, entries of a map)
	pub fn len(&self) -> Option<usize> {
		match self {
			ConfigValue::String(s) => Some(s.chars().count()),
			ConfigValue::List(items) => Some(items.len()),
			ConfigValue::Map(map) => Some(map.len()),
			_ => None,
		}
	}

	/// Look up an entry of a map value
	pub fn get(&self, key: &str) -> Option<&ConfigValue> {
		self.as_map().and_then(|map| map.get(key))
	}

	/// Convert into a plain JSON value
	pub fn to_json(&self) -> serde_json::Value {
		match self {
			ConfigValue::Null => serde_json::Value::Null,
			ConfigValue::Bool(b) => serde_json::Value::Bool(*b),
			ConfigValue::Int(i) => serde_json::Value::from(*i),
			ConfigValue::Float(x) => {
				serde_json::Number::from_f64(*x).map_or(serde_json::Value::Null, Into::into)
			}
			ConfigValue::String(s) => serde_json::Value::String(s.to_string()),
			ConfigValue::List(items) => items.iter().map(ConfigValue::to_json).collect(),
			ConfigValue::Map(map) => serde_json::Value::Object(
				map.iter().map(|(k, v)| (k.to_string(), v.to_json())).collect(),
			),
		}
	}
}

impl fmt::Display for ConfigValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigValue::String(s) => write!(f, "{:?}", s),
			other => write!(f, "{}", other.to_json()),
		}
	}
}

impl From<bool> for ConfigValue {
	fn from(value: bool) -> Self {
		ConfigValue::Bool(value)
	}
}

macro_rules! from_int {
	($($t:ty),*) => {
		$(
			impl From<$t> for ConfigValue {
				fn from(value: $t) -> Self {
					ConfigValue::Int(i64::from(value))
				}
			}
		)*
	};
}

from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for ConfigValue {
	fn from(value: f64) -> Self {
		ConfigValue::Float(value)
	}
}

impl From<f32> for ConfigValue {
	fn from(value: f32) -> Self {
		ConfigValue::Float(f64::from(value))
	}
}

impl From<&str> for ConfigValue {
	fn from(value: &str) -> Self {
		ConfigValue::String(value.into())
	}
}

impl From<String> for ConfigValue {
	fn from(value: String) -> Self {
		ConfigValue::String(value.into())
	}
}

impl From<&String> for ConfigValue {
	fn from(value: &String) -> Self {
		ConfigValue::String(value.as_str().into())
	}
}

impl From<Box<str>> for ConfigValue {
	fn from(value: Box<str>) -> Self {
		ConfigValue::String(value.into())
	}
}

impl From<Arc<str>> for ConfigValue {
	fn from(value: Arc<str>) -> Self {
		ConfigValue::String(value)
	}
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
	fn from(value: Vec<T>) -> Self {
		ConfigValue::list(value)
	}
}

impl<T: Into<ConfigValue> + Clone> From<&[T]> for ConfigValue {
	fn from(value: &[T]) -> Self {
		ConfigValue::list(value.iter().cloned())
	}
}

impl<T: Into<ConfigValue>, const N: usize> From<[T; N]> for ConfigValue {
	fn from(value: [T; N]) -> Self {
		ConfigValue::list(value)
	}
}

impl<K: Into<Box<str>>, V: Into<ConfigValue>> From<BTreeMap<K, V>> for ConfigValue {
	fn from(value: BTreeMap<K, V>) -> Self {
		ConfigValue::map(value)
	}
}

impl<K: Into<Box<str>>, V: Into<ConfigValue>, S> From<HashMap<K, V, S>> for ConfigValue {
	fn from(value: HashMap<K, V, S>) -> Self {
		ConfigValue::map(value)
	}
}

impl<T: Into<ConfigValue>> From<Option<T>> for ConfigValue {
	fn from(value: Option<T>) -> Self {
		value.map_or(ConfigValue::Null, Into::into)
	}
}

impl From<serde_json::Value> for ConfigValue {
	fn from(value: serde_json::Value) -> Self {
		match value {
			serde_json::Value::Null => ConfigValue::Null,
			serde_json::Value::Bool(b) => ConfigValue::Bool(b),
			serde_json::Value::Number(n) => match n.as_i64() {
				Some(i) => ConfigValue::Int(i),
				None => ConfigValue::Float(n.as_f64().unwrap_or(f64::NAN)),
			},
			serde_json::Value::String(s) => ConfigValue::String(s.into()),
			serde_json::Value::Array(items) => ConfigValue::list(items),
			serde_json::Value::Object(map) => ConfigValue::map(map),
		}
	}
}


// vim: ts=4
