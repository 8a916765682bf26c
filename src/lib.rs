pub mod config;
pub mod demo;
pub mod dmarc;
pub mod error;

pub use dmarc::{parse, render, validate, RenderedDocument, ReportRecord};
pub use error::{MalformedRecordError, SchemaErrorKind, SchemaValidationError};
