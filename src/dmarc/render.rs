use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};

use super::filename::canonical_filename;
use super::types::*;
use crate::error::MalformedRecordError;

/// A rendered report and the file name it should be stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
	document: String,
	filename: String
}

impl RenderedDocument {
	pub fn document(&self) -> &str {
		&self.document
	}

	pub fn filename(&self) -> &str {
		&self.filename
	}

	/// Where the document goes inside `dir`, as `<filename>.<extension>`.
	pub fn path_in(&self, dir: &Path, extension: &str) -> PathBuf {
		dir.join(format!("{}.{}", self.filename, extension))
	}
}

/// Renders a report record into an aggregate report XML document.
///
/// The record is checked in full before anything is written, so an error never
/// leaves a partial document behind.
pub fn render(record: &ReportRecord) -> Result<RenderedDocument, MalformedRecordError> {
	check(record)?;

	let mut buffer = Vec::new();
	{
		let mut writer = EmitterConfig::new()
			.perform_indent(true)
			.indent_string("  ")
			.create_writer(&mut buffer);

		writer.write(XmlEvent::start_element("feedback"))?;
		write_metadata(&mut writer, &record.report_metadata)?;
		write_policy(&mut writer, &record.policy_published)?;
		for entry in &record.records {
			write_record(&mut writer, entry)?;
		}
		writer.write(XmlEvent::end_element())?;
	}

	let document = String::from_utf8(buffer)?;
	let filename = canonical_filename(&record.report_metadata);
	debug!("Rendered report {} with {} records", filename, record.records.len());

	Ok(RenderedDocument { document, filename })
}

fn check(record: &ReportRecord) -> Result<(), MalformedRecordError> {
	let metadata = &record.report_metadata;
	required("org_name", &metadata.org_name)?;
	required("email", &metadata.email)?;
	required("report_id", &metadata.report_id)?;
	filename_part("org_name", &metadata.org_name)?;
	filename_part("report_id", &metadata.report_id)?;
	optional("extra_contact_info", &metadata.extra_contact_info)?;
	for error in &metadata.errors {
		text("error", error)?;
	}
	if metadata.date_range.end < metadata.date_range.begin {
		return Err(MalformedRecordError::InvalidDateRange {
			begin: metadata.date_range.begin,
			end: metadata.date_range.end
		});
	}

	let policy = &record.policy_published;
	required("domain", &policy.domain)?;
	if u64::from(policy.pct) > 100 {
		return Err(MalformedRecordError::OutOfRange { field: "pct", value: policy.pct.into(), expected: "0..=100" });
	}
	optional("fo", &policy.fo)?;

	if record.records.is_empty() {
		return Err(MalformedRecordError::NoRecords);
	}

	for entry in &record.records {
		if entry.row.count == 0 {
			return Err(MalformedRecordError::OutOfRange { field: "count", value: 0, expected: "at least 1" });
		}
		for reason in &entry.row.policy_evaluated.reasons {
			optional("comment", &reason.comment)?;
		}

		let identifiers = &entry.identifiers;
		required("header_from", &identifiers.header_from)?;
		optional("envelope_to", &identifiers.envelope_to)?;
		optional("envelope_from", &identifiers.envelope_from)?;

		for dkim in &entry.auth_results.dkim {
			text("dkim domain", &dkim.domain)?;
			optional("selector", &dkim.selector)?;
			optional("human_result", &dkim.human_result)?;
		}
		for spf in &entry.auth_results.spf {
			text("spf domain", &spf.domain)?;
		}
		if entry.auth_results.is_empty() {
			warn!("Record for {} from {} has no auth results", identifiers.header_from, entry.row.source_ip);
		}
	}

	Ok(())
}

fn required(field: &'static str, value: &str) -> Result<(), MalformedRecordError> {
	if value.trim().is_empty() {
		return Err(MalformedRecordError::MissingField(field));
	}
	text(field, value)
}

fn optional(field: &'static str, value: &Option<String>) -> Result<(), MalformedRecordError> {
	match value {
		Some(value) => text(field, value),
		None => Ok(()),
	}
}

/// Keeps a value that becomes part of the canonical file name from naming another directory.
fn filename_part(field: &'static str, value: &str) -> Result<(), MalformedRecordError> {
	if value.starts_with('.') || value.contains(&['/', '\\', '\0'][..]) {
		return Err(MalformedRecordError::UnsafeFilename(field));
	}
	Ok(())
}

/// Rejects characters outside the XML 1.0 `Char` production.
fn text(field: &'static str, value: &str) -> Result<(), MalformedRecordError> {
	let legal = |c: char| match c {
		'\t' | '\n' | '\r' => true,
		'\u{0}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}' => false,
		_ => true,
	};
	if value.chars().all(legal) {
		Ok(())
	} else {
		Err(MalformedRecordError::InvalidText(field))
	}
}

type Writer<'a> = EventWriter<&'a mut Vec<u8>>;

fn leaf<W: Write>(writer: &mut EventWriter<W>, name: &str, value: &str) -> xml::writer::Result<()> {
	writer.write(XmlEvent::start_element(name))?;
	if !value.is_empty() {
		writer.write(XmlEvent::characters(value))?;
	}
	writer.write(XmlEvent::end_element())
}

fn optional_leaf<W: Write>(writer: &mut EventWriter<W>, name: &str, value: &Option<String>) -> xml::writer::Result<()> {
	match value {
		Some(value) => leaf(writer, name, value),
		None => Ok(()),
	}
}

fn write_metadata(writer: &mut Writer, metadata: &ReportMetadata) -> xml::writer::Result<()> {
	writer.write(XmlEvent::start_element("report_metadata"))?;
	leaf(writer, "org_name", &metadata.org_name)?;
	leaf(writer, "email", &metadata.email)?;
	optional_leaf(writer, "extra_contact_info", &metadata.extra_contact_info)?;
	leaf(writer, "report_id", &metadata.report_id)?;

	writer.write(XmlEvent::start_element("date_range"))?;
	leaf(writer, "begin", &metadata.date_range.begin.to_string())?;
	leaf(writer, "end", &metadata.date_range.end.to_string())?;
	writer.write(XmlEvent::end_element())?;

	for error in &metadata.errors {
		leaf(writer, "error", error)?;
	}
	writer.write(XmlEvent::end_element())
}

fn write_policy(writer: &mut Writer, policy: &PolicyPublished) -> xml::writer::Result<()> {
	writer.write(XmlEvent::start_element("policy_published"))?;
	leaf(writer, "domain", &policy.domain)?;
	leaf(writer, "adkim", policy.adkim.as_str())?;
	leaf(writer, "aspf", policy.aspf.as_str())?;
	leaf(writer, "p", policy.p.as_str())?;
	leaf(writer, "sp", policy.subdomain_policy().as_str())?;
	leaf(writer, "pct", &policy.pct.to_string())?;
	optional_leaf(writer, "fo", &policy.fo)?;
	writer.write(XmlEvent::end_element())
}

fn write_record(writer: &mut Writer, record: &Record) -> xml::writer::Result<()> {
	writer.write(XmlEvent::start_element("record"))?;

	let row = &record.row;
	writer.write(XmlEvent::start_element("row"))?;
	leaf(writer, "source_ip", &row.source_ip.to_string())?;
	leaf(writer, "count", &row.count.to_string())?;
	writer.write(XmlEvent::start_element("policy_evaluated"))?;
	leaf(writer, "disposition", row.policy_evaluated.disposition.as_str())?;
	leaf(writer, "dkim", row.policy_evaluated.dkim.as_str())?;
	leaf(writer, "spf", row.policy_evaluated.spf.as_str())?;
	for reason in &row.policy_evaluated.reasons {
		writer.write(XmlEvent::start_element("reason"))?;
		leaf(writer, "type", reason.kind.as_str())?;
		optional_leaf(writer, "comment", &reason.comment)?;
		writer.write(XmlEvent::end_element())?;
	}
	writer.write(XmlEvent::end_element())?;
	writer.write(XmlEvent::end_element())?;

	let identifiers = &record.identifiers;
	writer.write(XmlEvent::start_element("identifiers"))?;
	optional_leaf(writer, "envelope_to", &identifiers.envelope_to)?;
	optional_leaf(writer, "envelope_from", &identifiers.envelope_from)?;
	leaf(writer, "header_from", &identifiers.header_from)?;
	writer.write(XmlEvent::end_element())?;

	writer.write(XmlEvent::start_element("auth_results"))?;
	for dkim in &record.auth_results.dkim {
		writer.write(XmlEvent::start_element("dkim"))?;
		leaf(writer, "domain", &dkim.domain)?;
		optional_leaf(writer, "selector", &dkim.selector)?;
		leaf(writer, "result", dkim.result.as_str())?;
		optional_leaf(writer, "human_result", &dkim.human_result)?;
		writer.write(XmlEvent::end_element())?;
	}
	for spf in &record.auth_results.spf {
		writer.write(XmlEvent::start_element("spf"))?;
		leaf(writer, "domain", &spf.domain)?;
		leaf(writer, "scope", spf.scope.as_str())?;
		leaf(writer, "result", spf.result.as_str())?;
		writer.write(XmlEvent::end_element())?;
	}
	writer.write(XmlEvent::end_element())?;

	writer.write(XmlEvent::end_element())
}
