use std::sync::LazyLock;

use regex::Regex;

use super::types::ReportMetadata;

/// The parts encoded in a report file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameParts {
	pub org_name: String,
	pub report_id: String,
	pub begin: u64,
	pub end: u64,
	pub extension: Option<String>
}

// the report id may itself contain '!', so it takes everything between the org and the timestamps
static FILENAME: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^([^!]+)!(.+)!(\d+)!(\d+)(?:\.([A-Za-z0-9.]+))?$").unwrap()
});

/// Builds `{org_name}!{report_id}!{begin}!{end}`. Callers append an extension.
pub fn canonical_filename(metadata: &ReportMetadata) -> String {
	format!(
		"{}!{}!{}!{}",
		metadata.org_name, metadata.report_id, metadata.date_range.begin, metadata.date_range.end
	)
}

/// Splits a report file name back into its parts, returning `None` if it is not in the canonical shape.
pub fn parse_filename(name: &str) -> Option<FilenameParts> {
	let captures = FILENAME.captures(name)?;

	Some(FilenameParts {
		org_name: captures.get(1)?.as_str().to_string(),
		report_id: captures.get(2)?.as_str().to_string(),
		begin: captures.get(3)?.as_str().parse().ok()?,
		end: captures.get(4)?.as_str().parse().ok()?,
		extension: captures.get(5).map(|x| x.as_str().to_string())
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dmarc::types::DateRange;

	fn metadata(org_name: &str, report_id: &str, begin: u64, end: u64) -> ReportMetadata {
		ReportMetadata {
			org_name: org_name.to_string(),
			email: "dmarc@example.com".to_string(),
			extra_contact_info: None,
			report_id: report_id.to_string(),
			date_range: DateRange { begin, end },
			errors: Vec::new()
		}
	}

	#[test]
	fn canonical_name() {
		let name = canonical_filename(&metadata("example.com", "1", 1483228800, 1483315199));
		assert_eq!(name, "example.com!1!1483228800!1483315199");
	}

	#[test]
	fn parse_recovers_parts() {
		let parts = parse_filename("reporter.org!reportee.org:1514847601!1514761200!1514847600.xml").unwrap();
		assert_eq!(parts.org_name, "reporter.org");
		assert_eq!(parts.report_id, "reportee.org:1514847601");
		assert_eq!(parts.begin, 1514761200);
		assert_eq!(parts.end, 1514847600);
		assert_eq!(parts.extension.as_deref(), Some("xml"));

		let parts = parse_filename("google.com!a!b!10!20.xml.gz").unwrap();
		assert_eq!(parts.report_id, "a!b");
		assert_eq!(parts.extension.as_deref(), Some("xml.gz"));
	}

	#[test]
	fn parse_inverts_canonical_name() {
		let name = canonical_filename(&metadata("example.com", "42", 5, 5));
		let parts = parse_filename(&name).unwrap();
		assert_eq!(parts, FilenameParts {
			org_name: "example.com".to_string(),
			report_id: "42".to_string(),
			begin: 5,
			end: 5,
			extension: None
		});
	}

	#[test]
	fn parse_rejects_other_names() {
		assert!(parse_filename("report.xml").is_none());
		assert!(parse_filename("example.com!1!start!end").is_none());
		assert!(parse_filename("!1!2!3").is_none());
	}
}
