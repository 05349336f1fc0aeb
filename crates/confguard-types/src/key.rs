//! Parameter keys
//!
//! A key is either plain text (canonical name or alias, case and surrounding whitespace do not
//! matter) or an application token that carries such a text. Tokens without a string value are
//! malformed keys; resolving them fails with a validation error rather than "not found".

use std::fmt;

/// Anything that can name a configuration parameter
pub trait ParamKey {
	/// Text used for registry lookup, `None` when the token carries no string value
	fn key_text(&self) -> Option<&str>;

	/// Label used in diagnostics
	fn key_label(&self) -> String {
		self.key_text().map_or_else(|| "<non-string key>".to_string(), ToString::to_string)
	}
}

impl ParamKey for str {
	fn key_text(&self) -> Option<&str> {
		Some(self)
	}
}

impl ParamKey for String {
	fn key_text(&self) -> Option<&str> {
		Some(self)
	}
}

impl ParamKey for Box<str> {
	fn key_text(&self) -> Option<&str> {
		Some(self)
	}
}

impl<T: ParamKey + ?Sized> ParamKey for &T {
	fn key_text(&self) -> Option<&str> {
		(**self).key_text()
	}

	fn key_label(&self) -> String {
		(**self).key_label()
	}
}

/// Owned snapshot of a key, kept by batches until they are resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnedParamKey {
	text: Option<Box<str>>,
	label: Box<str>,
}

impl OwnedParamKey {
	pub fn of<K: ParamKey + ?Sized>(key: &K) -> Self {
		Self { text: key.key_text().map(Into::into), label: key.key_label().into() }
	}
}

impl ParamKey for OwnedParamKey {
	fn key_text(&self) -> Option<&str> {
		self.text.as_deref()
	}

	fn key_label(&self) -> String {
		self.label.to_string()
	}
}

impl fmt::Display for OwnedParamKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.label)
	}
}

impl From<&str> for OwnedParamKey {
	fn from(value: &str) -> Self {
		Self::of(value)
	}
}

impl From<String> for OwnedParamKey {
	fn from(value: String) -> Self {
		Self { label: value.clone().into(), text: Some(value.into()) }
	}
}


// vim: ts=4
