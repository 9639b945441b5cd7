//! Normalizes an incoming request body to a tagged union at the edge (§9
//! "Dynamic body typing at the request boundary"), so handlers switch on it
//! once instead of re-sniffing content type at every call site.

use std::collections::HashMap;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone)]
pub enum RequestBody {
	Form(HashMap<String, String>),
	Text(String),
	Raw(Vec<u8>),
}

impl RequestBody {
	pub fn from_parts(content_type: Option<&str>, raw: Vec<u8>) -> Self {
		if content_type.is_some_and(|ct| ct.starts_with(FORM_URLENCODED)) {
			let form = url::form_urlencoded::parse(&raw).into_owned().collect();
			return RequestBody::Form(form);
		}
		match String::from_utf8(raw) {
			Ok(text) => RequestBody::Text(text),
			Err(err) => RequestBody::Raw(err.into_bytes()),
		}
	}

	/// A named form field, if this body parsed as a form.
	pub fn field(&self, key: &str) -> Option<String> {
		match self {
			RequestBody::Form(fields) => fields.get(key).cloned(),
			_ => None,
		}
	}

	/// The body as text, whether it arrived as `Text` or valid-UTF-8 `Raw`.
	pub fn as_text(&self) -> Option<String> {
		match self {
			RequestBody::Text(text) => Some(text.clone()),
			RequestBody::Raw(bytes) => String::from_utf8(bytes.clone()).ok(),
			RequestBody::Form(_) => None,
		}
	}
}
