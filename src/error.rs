use std::fmt;

use thiserror::Error;

/// A report record that cannot be rendered.
///
/// Raised before any output is produced, so a caller never sees a partial document.
#[derive(Debug, Error)]
pub enum MalformedRecordError {
	#[error("required field `{0}` is missing or empty")]
	MissingField(&'static str),

	#[error("`{field}` has value `{value}`, expected one of: {expected}")]
	InvalidToken {
		field: &'static str,
		value: String,
		expected: String
	},

	#[error("`{field}` is {value}, expected {expected}")]
	OutOfRange {
		field: &'static str,
		value: u64,
		expected: &'static str
	},

	#[error("date range ends at {end}, before it begins at {begin}")]
	InvalidDateRange { begin: u64, end: u64 },

	#[error("`{0}` contains characters that cannot appear in XML")]
	InvalidText(&'static str),

	#[error("`{0}` cannot be used in a file name (path separator, NUL or leading '.')")]
	UnsafeFilename(&'static str),

	#[error("report has no records")]
	NoRecords,

	#[error("could not decode record: {0}")]
	Decode(#[from] serde_json::Error),

	#[error("could not write document: {0}")]
	Emit(#[from] xml::writer::Error),

	#[error("document is not valid UTF-8: {0}")]
	Encoding(#[from] std::string::FromUtf8Error)
}

/// A document that does not conform to the aggregate report schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {kind}")]
pub struct SchemaValidationError {
	/// Slash-separated element path, e.g. `/feedback/record[2]/row/count`.
	pub path: String,
	pub kind: SchemaErrorKind
}

impl SchemaValidationError {
	pub fn new(path: impl Into<String>, kind: SchemaErrorKind) -> Self {
		SchemaValidationError { path: path.into(), kind }
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaErrorKind {
	Empty,
	Parse(String),
	UnexpectedRoot(String),
	MissingElement(&'static str),
	UnexpectedElement(String),
	UnexpectedText(String),
	InvalidToken {
		value: String,
		expected: &'static [&'static str]
	},
	NotAnInteger(String),
	NotADecimal(String),
	OutOfRange {
		value: u64,
		max: u64
	},
	InvalidAddress(String)
}

impl fmt::Display for SchemaErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			SchemaErrorKind::Empty => write!(f, "document is empty"),
			SchemaErrorKind::Parse(message) => write!(f, "not well-formed XML: {}", message),
			SchemaErrorKind::UnexpectedRoot(name) => write!(f, "root element is <{}>, expected <feedback>", name),
			SchemaErrorKind::MissingElement(name) => write!(f, "missing required element <{}>", name),
			SchemaErrorKind::UnexpectedElement(name) => write!(f, "unexpected element <{}>", name),
			SchemaErrorKind::UnexpectedText(text) => write!(f, "unexpected text '{}'", text),
			SchemaErrorKind::InvalidToken { value, expected } => {
				write!(f, "'{}' is not one of: {}", value, expected.join(", "))
			},
			SchemaErrorKind::NotAnInteger(value) => write!(f, "'{}' is not a non-negative integer", value),
			SchemaErrorKind::NotADecimal(value) => write!(f, "'{}' is not a decimal number", value),
			SchemaErrorKind::OutOfRange { value, max } => write!(f, "{} is out of range 0..={}", value, max),
			SchemaErrorKind::InvalidAddress(value) => write!(f, "'{}' is not an IP address", value),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn schema_error_display_includes_path() {
		let error = SchemaValidationError::new(
			"/feedback/record[1]/row/policy_evaluated/disposition",
			SchemaErrorKind::InvalidToken { value: "discard".to_string(), expected: &["none", "quarantine", "reject"] }
		);
		assert_eq!(
			error.to_string(),
			"/feedback/record[1]/row/policy_evaluated/disposition: 'discard' is not one of: none, quarantine, reject"
		);
	}

	#[test]
	fn malformed_record_display() {
		let error = MalformedRecordError::InvalidDateRange { begin: 10, end: 5 };
		assert_eq!(error.to_string(), "date range ends at 5, before it begins at 10");
	}
}
