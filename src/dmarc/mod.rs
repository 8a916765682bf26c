//! DMARC aggregate reports: the typed model, rendering to XML and schema validation.

pub mod filename;
pub mod render;
pub mod tree;
pub mod types;
pub mod validate;

pub use filename::{canonical_filename, parse_filename, FilenameParts};
pub use render::{render, RenderedDocument};
pub use types::ReportRecord;
pub use validate::{parse, validate};
