use std::net::IpAddr;
use std::str::FromStr;

use log::debug;

use super::tree::{self, Element};
use super::types::*;
use crate::error::{SchemaErrorKind, SchemaValidationError};

type Result<T> = std::result::Result<T, SchemaValidationError>;

/// Checks a document against the aggregate report schema.
pub fn validate(document: &str) -> Result<()> {
	parse(document).map(|_| ())
}

/// Validates a document and returns the report it describes.
///
/// Optional elements come back as their defaults, so a rendered record parses
/// back with `sp`, `pct` and the alignment modes filled in.
pub fn parse(document: &str) -> Result<ReportRecord> {
	if document.trim().is_empty() {
		return Err(SchemaValidationError::new("/", SchemaErrorKind::Empty));
	}

	let root = tree::parse(document).map_err(|e| SchemaValidationError::new("/", SchemaErrorKind::Parse(e)))?;
	if root.name != "feedback" {
		return Err(SchemaValidationError::new("/", SchemaErrorKind::UnexpectedRoot(root.name)));
	}

	let mut feedback = Sequence::new("/feedback".to_string(), &root)?;
	if let Some(version) = feedback.optional("version") {
		let text = version.value()?;
		if !is_decimal(&text) {
			return Err(SchemaValidationError::new(version.path, SchemaErrorKind::NotADecimal(text)));
		}
	}
	let report_metadata = report_metadata(feedback.required("report_metadata")?)?;
	let policy_published = policy_published(feedback.required("policy_published")?)?;
	let records = feedback
		.one_or_more("record")?
		.into_iter()
		.map(record)
		.collect::<Result<Vec<_>>>()?;
	feedback.finish()?;

	debug!("Validated report {} with {} records", report_metadata.report_id, records.len());
	Ok(ReportRecord { report_metadata, policy_published, records })
}

/// The child elements of one element, consumed in schema order.
struct Sequence<'a> {
	path: String,
	children: &'a [Element],
	position: usize
}

/// An element together with its path in the document.
struct Node<'a> {
	path: String,
	element: &'a Element
}

impl<'a> Sequence<'a> {
	fn new(path: String, element: &'a Element) -> Result<Self> {
		let text = element.text.trim();
		if !text.is_empty() {
			return Err(SchemaValidationError::new(path, SchemaErrorKind::UnexpectedText(text.to_string())));
		}
		Ok(Sequence { path, children: &element.children, position: 0 })
	}

	fn peek(&self, name: &str) -> bool {
		self.children.get(self.position).map_or(false, |x| x.name == name)
	}

	fn take(&mut self, name: &str, index: Option<usize>) -> Node<'a> {
		let element = &self.children[self.position];
		self.position += 1;
		let path = match index {
			Some(index) => format!("{}/{}[{}]", self.path, name, index),
			None => format!("{}/{}", self.path, name),
		};
		Node { path, element }
	}

	fn optional(&mut self, name: &str) -> Option<Node<'a>> {
		if self.peek(name) {
			Some(self.take(name, None))
		} else {
			None
		}
	}

	fn required(&mut self, name: &'static str) -> Result<Node<'a>> {
		match self.optional(name) {
			Some(node) => Ok(node),
			None => Err(self.unexpected(name)),
		}
	}

	fn zero_or_more(&mut self, name: &str) -> Vec<Node<'a>> {
		let mut nodes = Vec::new();
		while self.peek(name) {
			let index = nodes.len() + 1;
			nodes.push(self.take(name, Some(index)));
		}
		nodes
	}

	fn one_or_more(&mut self, name: &'static str) -> Result<Vec<Node<'a>>> {
		let nodes = self.zero_or_more(name);
		if nodes.is_empty() {
			return Err(self.unexpected(name));
		}
		Ok(nodes)
	}

	/// Error for a required element that is not next in line.
	fn unexpected(&self, name: &'static str) -> SchemaValidationError {
		match self.children.get(self.position) {
			Some(other) if self.children.iter().skip(self.position).any(|x| x.name == name) => {
				SchemaValidationError::new(
					format!("{}/{}", self.path, other.name),
					SchemaErrorKind::UnexpectedElement(other.name.clone())
				)
			},
			_ => SchemaValidationError::new(self.path.clone(), SchemaErrorKind::MissingElement(name)),
		}
	}

	fn finish(self) -> Result<()> {
		match self.children.get(self.position) {
			Some(extra) => Err(SchemaValidationError::new(
				format!("{}/{}", self.path, extra.name),
				SchemaErrorKind::UnexpectedElement(extra.name.clone())
			)),
			None => Ok(()),
		}
	}
}

impl<'a> Node<'a> {
	fn sequence(&self) -> Result<Sequence<'a>> {
		Sequence::new(self.path.clone(), self.element)
	}

	/// Text content of an element that must not have children, whitespace kept as in xs:string.
	fn text(&self) -> Result<String> {
		if let Some(child) = self.element.children.first() {
			return Err(SchemaValidationError::new(
				format!("{}/{}", self.path, child.name),
				SchemaErrorKind::UnexpectedElement(child.name.clone())
			));
		}
		Ok(self.element.text.clone())
	}

	/// Text of a typed leaf (number, token, address), with surrounding whitespace collapsed away.
	fn value(&self) -> Result<String> {
		Ok(self.text()?.trim().to_string())
	}

	fn integer(&self) -> Result<u64> {
		let text = self.value()?;
		text.parse::<u64>()
			.map_err(|_| SchemaValidationError::new(self.path.clone(), SchemaErrorKind::NotAnInteger(text)))
	}

	fn token<T: FromStr>(&self, expected: &'static [&'static str]) -> Result<T> {
		let text = self.value()?;
		text.parse::<T>().map_err(|_| {
			SchemaValidationError::new(self.path.clone(), SchemaErrorKind::InvalidToken { value: text, expected })
		})
	}
}

/// xs:decimal lexical form: optional sign, digits, optional fraction, at least one digit.
fn is_decimal(text: &str) -> bool {
	let unsigned = text.strip_prefix(&['+', '-'][..]).unwrap_or(text);
	let (whole, fraction) = match unsigned.split_once('.') {
		Some((whole, fraction)) => (whole, fraction),
		None => (unsigned, ""),
	};
	let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
	!(whole.is_empty() && fraction.is_empty()) && digits(whole) && digits(fraction)
}

fn optional_text(node: Option<Node>) -> Result<Option<String>> {
	node.map(|x| x.text()).transpose()
}

fn report_metadata(node: Node) -> Result<ReportMetadata> {
	let mut children = node.sequence()?;
	let org_name = children.required("org_name")?.text()?;
	let email = children.required("email")?.text()?;
	let extra_contact_info = optional_text(children.optional("extra_contact_info"))?;
	let report_id = children.required("report_id")?.text()?;

	let date_range = children.required("date_range")?;
	let mut range = date_range.sequence()?;
	let begin = range.required("begin")?.integer()?;
	let end = range.required("end")?.integer()?;
	range.finish()?;

	let errors = children
		.zero_or_more("error")
		.iter()
		.map(|x| x.text())
		.collect::<Result<Vec<_>>>()?;
	children.finish()?;

	Ok(ReportMetadata {
		org_name,
		email,
		extra_contact_info,
		report_id,
		date_range: DateRange { begin, end },
		errors
	})
}

fn policy_published(node: Node) -> Result<PolicyPublished> {
	let mut children = node.sequence()?;
	let domain = children.required("domain")?.text()?;
	let adkim = match children.optional("adkim") {
		Some(x) => x.token(Alignment::TOKENS)?,
		None => Alignment::default(),
	};
	let aspf = match children.optional("aspf") {
		Some(x) => x.token(Alignment::TOKENS)?,
		None => Alignment::default(),
	};
	let p = children.required("p")?.token(Disposition::TOKENS)?;
	let sp = match children.optional("sp") {
		Some(x) => Some(x.token(Disposition::TOKENS)?),
		None => None,
	};
	let pct = match children.optional("pct") {
		Some(x) => {
			let value = x.integer()?;
			if value > 100 {
				return Err(SchemaValidationError::new(x.path, SchemaErrorKind::OutOfRange { value, max: 100 }));
			}
			value as u8
		},
		None => DEFAULT_PCT,
	};
	let fo = optional_text(children.optional("fo"))?;
	children.finish()?;

	Ok(PolicyPublished { domain, adkim, aspf, p, sp, pct, fo })
}

fn record(node: Node) -> Result<Record> {
	let mut children = node.sequence()?;
	let row = row(children.required("row")?)?;
	let identifiers = identifiers(children.required("identifiers")?)?;
	let auth_results = auth_results(children.required("auth_results")?)?;
	children.finish()?;

	Ok(Record { row, identifiers, auth_results })
}

fn row(node: Node) -> Result<Row> {
	let mut children = node.sequence()?;

	let source_ip = children.required("source_ip")?;
	let address = source_ip.value()?;
	let source_ip = address
		.parse::<IpAddr>()
		.map_err(|_| SchemaValidationError::new(source_ip.path.clone(), SchemaErrorKind::InvalidAddress(address.clone())))?;

	let count = children.required("count")?.integer()?;

	let mut evaluated = children.required("policy_evaluated")?.sequence()?;
	let disposition = evaluated.required("disposition")?.token(Disposition::TOKENS)?;
	let dkim = evaluated.required("dkim")?.token(DmarcResult::TOKENS)?;
	let spf = evaluated.required("spf")?.token(DmarcResult::TOKENS)?;
	let reasons = evaluated
		.zero_or_more("reason")
		.into_iter()
		.map(reason)
		.collect::<Result<Vec<_>>>()?;
	evaluated.finish()?;
	children.finish()?;

	Ok(Row {
		source_ip,
		count,
		policy_evaluated: PolicyEvaluated { disposition, dkim, spf, reasons }
	})
}

fn reason(node: Node) -> Result<PolicyOverrideReason> {
	let mut children = node.sequence()?;
	let kind = children.required("type")?.token(PolicyOverride::TOKENS)?;
	let comment = optional_text(children.optional("comment"))?;
	children.finish()?;

	Ok(PolicyOverrideReason { kind, comment })
}

fn identifiers(node: Node) -> Result<Identifiers> {
	let mut children = node.sequence()?;
	let envelope_to = optional_text(children.optional("envelope_to"))?;
	let envelope_from = optional_text(children.optional("envelope_from"))?;
	let header_from = children.required("header_from")?.text()?;
	children.finish()?;

	Ok(Identifiers { envelope_to, envelope_from, header_from })
}

fn auth_results(node: Node) -> Result<AuthResults> {
	let mut children = node.sequence()?;

	let mut dkim = Vec::new();
	for node in children.zero_or_more("dkim") {
		let mut fields = node.sequence()?;
		let domain = fields.required("domain")?.text()?;
		let selector = optional_text(fields.optional("selector"))?;
		let result = fields.required("result")?.token(DkimResult::TOKENS)?;
		let human_result = optional_text(fields.optional("human_result"))?;
		fields.finish()?;
		dkim.push(DkimAuthResult { domain, selector, result, human_result });
	}

	let mut spf = Vec::new();
	for node in children.zero_or_more("spf") {
		let mut fields = node.sequence()?;
		let domain = fields.required("domain")?.text()?;
		let scope = match fields.optional("scope") {
			Some(x) => x.token(SpfScope::TOKENS)?,
			None => SpfScope::default(),
		};
		let result = fields.required("result")?.token(SpfResult::TOKENS)?;
		fields.finish()?;
		spf.push(SpfAuthResult { domain, scope, result });
	}
	children.finish()?;

	Ok(AuthResults { dkim, spf })
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feedback>
  <report_metadata>
    <org_name>example.com</org_name>
    <email>dmarc@example.com</email>
    <report_id>1</report_id>
    <date_range><begin>1483228800</begin><end>1483315199</end></date_range>
  </report_metadata>
  <policy_published>
    <domain>example.com</domain>
    <p>reject</p>
  </policy_published>
  <record>
    <row>
      <source_ip>203.0.113.5</source_ip>
      <count>2</count>
      <policy_evaluated><disposition>reject</disposition><dkim>fail</dkim><spf>pass</spf></policy_evaluated>
    </row>
    <identifiers><header_from>example.com</header_from></identifiers>
    <auth_results><spf><domain>example.com</domain><result>pass</result></spf></auth_results>
  </record>
</feedback>"#;

	fn kind_of(document: &str) -> SchemaErrorKind {
		validate(document).unwrap_err().kind
	}

	#[test]
	fn accepts_hand_written_document() {
		let report = parse(MINIMAL).unwrap();
		assert_eq!(report.policy_published.p, Disposition::Reject);
		assert_eq!(report.policy_published.sp, None);
		assert_eq!(report.policy_published.pct, 100);
		assert_eq!(report.records[0].row.count, 2);
		assert_eq!(report.records[0].auth_results.spf[0].scope, SpfScope::Mfrom);
	}

	#[test]
	fn rejects_empty_and_non_xml() {
		assert_eq!(kind_of(""), SchemaErrorKind::Empty);
		assert_eq!(kind_of("  \n"), SchemaErrorKind::Empty);
		assert!(matches!(kind_of("this is not a report"), SchemaErrorKind::Parse(_)));
		assert!(matches!(kind_of("<feedback><report_metadata>"), SchemaErrorKind::Parse(_)));
		assert_eq!(kind_of("<report/>"), SchemaErrorKind::UnexpectedRoot("report".to_string()));
	}

	#[test]
	fn rejects_missing_metadata_field() {
		let document = MINIMAL.replace("<report_id>1</report_id>", "");
		let error = validate(&document).unwrap_err();
		assert_eq!(error.path, "/feedback/report_metadata");
		assert_eq!(error.kind, SchemaErrorKind::MissingElement("report_id"));
	}

	#[test]
	fn rejects_document_without_records() {
		let start = MINIMAL.find("<record>").unwrap();
		let end = MINIMAL.find("</record>").unwrap() + "</record>".len();
		let document = format!("{}{}", &MINIMAL[..start], &MINIMAL[end..]);
		let error = validate(&document).unwrap_err();
		assert_eq!(error.path, "/feedback");
		assert_eq!(error.kind, SchemaErrorKind::MissingElement("record"));
	}

	#[test]
	fn rejects_bad_tokens_and_numbers() {
		let document = MINIMAL.replace("<disposition>reject</disposition>", "<disposition>discard</disposition>");
		let error = validate(&document).unwrap_err();
		assert_eq!(error.path, "/feedback/record[1]/row/policy_evaluated/disposition");
		assert_eq!(error.kind, SchemaErrorKind::InvalidToken {
			value: "discard".to_string(),
			expected: Disposition::TOKENS
		});

		let document = MINIMAL.replace("<count>2</count>", "<count>two</count>");
		assert_eq!(kind_of(&document), SchemaErrorKind::NotAnInteger("two".to_string()));

		let document = MINIMAL.replace("<p>reject</p>", "<p>reject</p><pct>150</pct>");
		assert_eq!(kind_of(&document), SchemaErrorKind::OutOfRange { value: 150, max: 100 });

		let document = MINIMAL.replace("203.0.113.5", "203.0.113");
		assert_eq!(kind_of(&document), SchemaErrorKind::InvalidAddress("203.0.113".to_string()));
	}

	#[test]
	fn enforces_element_order() {
		let document = MINIMAL.replace(
			"<org_name>example.com</org_name>\n    <email>dmarc@example.com</email>",
			"<email>dmarc@example.com</email>\n    <org_name>example.com</org_name>"
		);
		assert_eq!(kind_of(&document), SchemaErrorKind::UnexpectedElement("email".to_string()));

		let document = MINIMAL.replace("<p>reject</p>", "<p>reject</p><color>blue</color>");
		let error = validate(&document).unwrap_err();
		assert_eq!(error.path, "/feedback/policy_published/color");
	}

	#[test]
	fn rejects_text_in_container_and_children_in_leaf() {
		let document = MINIMAL.replace("<row>", "<row>stray");
		assert_eq!(kind_of(&document), SchemaErrorKind::UnexpectedText("stray".to_string()));

		let document = MINIMAL.replace("<org_name>example.com</org_name>", "<org_name><b>x</b></org_name>");
		assert_eq!(kind_of(&document), SchemaErrorKind::UnexpectedElement("b".to_string()));
	}

	#[test]
	fn rejects_bad_result_tokens() {
		let document = MINIMAL.replace("<dkim>fail</dkim>", "<dkim>maybe</dkim>");
		let error = validate(&document).unwrap_err();
		assert_eq!(error.path, "/feedback/record[1]/row/policy_evaluated/dkim");
		assert_eq!(error.kind, SchemaErrorKind::InvalidToken { value: "maybe".to_string(), expected: DmarcResult::TOKENS });

		let document = MINIMAL.replace("<spf>pass</spf>", "<spf>maybe</spf>");
		let error = validate(&document).unwrap_err();
		assert_eq!(error.path, "/feedback/record[1]/row/policy_evaluated/spf");
		assert_eq!(error.kind, SchemaErrorKind::InvalidToken { value: "maybe".to_string(), expected: DmarcResult::TOKENS });

		let document = MINIMAL.replace("<result>pass</result></spf>", "<result>maybe</result></spf>");
		let error = validate(&document).unwrap_err();
		assert_eq!(error.path, "/feedback/record[1]/auth_results/spf[1]/result");
		assert_eq!(error.kind, SchemaErrorKind::InvalidToken { value: "maybe".to_string(), expected: SpfResult::TOKENS });
	}

	#[test]
	fn rejects_duplicate_metadata() {
		let start = MINIMAL.find("<report_metadata>").unwrap();
		let end = MINIMAL.find("</report_metadata>").unwrap() + "</report_metadata>".len();
		let document = MINIMAL.replacen("<policy_published>", &format!("{}\n  <policy_published>", &MINIMAL[start..end]), 1);
		let error = validate(&document).unwrap_err();
		assert_eq!(error.path, "/feedback/report_metadata");
		assert_eq!(error.kind, SchemaErrorKind::UnexpectedElement("report_metadata".to_string()));
	}

	#[test]
	fn version_must_be_decimal() {
		let with_version = |version: &str| MINIMAL.replace("<feedback>", &format!("<feedback><version>{}</version>", version));
		validate(&with_version("1.0")).unwrap();
		validate(&with_version(" 2 ")).unwrap();

		for bad in &["NaN", "inf", "1e3", "", ".", "1.0.0"] {
			let error = validate(&with_version(bad)).unwrap_err();
			assert_eq!(error.path, "/feedback/version");
			assert_eq!(error.kind, SchemaErrorKind::NotADecimal(bad.to_string()));
		}
	}

	#[test]
	fn keeps_whitespace_in_strings() {
		let document = MINIMAL.replace("<org_name>example.com</org_name>", "<org_name> example.com </org_name>");
		let report = parse(&document).unwrap();
		assert_eq!(report.report_metadata.org_name, " example.com ");

		let document = MINIMAL.replace("<count>2</count>", "<count>\n  2\n</count>");
		assert_eq!(parse(&document).unwrap().records[0].row.count, 2);
	}
}
