use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MalformedRecordError;

/// Defines a closed set of lowercase tokens used by the report format.
macro_rules! token_enum {
	(
		$(#[$meta:meta])*
		$name:ident ($field:literal) {
			$($variant:ident => $token:literal),+ $(,)?
		}
	) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
		pub enum $name {
			$(#[serde(rename = $token)] $variant),+
		}

		impl $name {
			pub const ALL: &'static [$name] = &[$($name::$variant),+];
			pub const TOKENS: &'static [&'static str] = &[$($token),+];

			pub fn as_str(self) -> &'static str {
				match self {
					$($name::$variant => $token),+
				}
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
				f.write_str(self.as_str())
			}
		}

		impl FromStr for $name {
			type Err = MalformedRecordError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				match s {
					$($token => Ok($name::$variant),)+
					_ => Err(MalformedRecordError::InvalidToken {
						field: $field,
						value: s.to_string(),
						expected: $name::TOKENS.join(", ")
					})
				}
			}
		}
	};
}

token_enum! {
	/// Identifier alignment mode, relaxed or strict.
	Alignment ("alignment") {
		Relaxed => "r",
		Strict => "s",
	}
}

token_enum! {
	/// Policy action, both as published and as applied.
	Disposition ("disposition") {
		None => "none",
		Quarantine => "quarantine",
		Reject => "reject",
	}
}

token_enum! {
	/// Aligned DKIM or SPF outcome as seen by DMARC.
	DmarcResult ("dmarc result") {
		Pass => "pass",
		Fail => "fail",
	}
}

token_enum! {
	/// Why the applied disposition differs from the published policy.
	PolicyOverride ("reason type") {
		Forwarded => "forwarded",
		SampledOut => "sampled_out",
		TrustedForwarder => "trusted_forwarder",
		MailingList => "mailing_list",
		LocalPolicy => "local_policy",
		Other => "other",
	}
}

token_enum! {
	/// Raw DKIM verification result of a single signature.
	DkimResult ("dkim result") {
		None => "none",
		Pass => "pass",
		Fail => "fail",
		Policy => "policy",
		Neutral => "neutral",
		TempError => "temperror",
		PermError => "permerror",
	}
}

token_enum! {
	/// Raw SPF check result.
	SpfResult ("spf result") {
		None => "none",
		Neutral => "neutral",
		Pass => "pass",
		Fail => "fail",
		SoftFail => "softfail",
		TempError => "temperror",
		PermError => "permerror",
	}
}

token_enum! {
	/// Which identity the SPF check ran against, HELO or MAIL FROM.
	SpfScope ("spf scope") {
		Helo => "helo",
		Mfrom => "mfrom",
	}
}

impl Default for Alignment {
	fn default() -> Self {
		Alignment::Relaxed
	}
}

impl Default for SpfScope {
	fn default() -> Self {
		SpfScope::Mfrom
	}
}

pub const DEFAULT_PCT: u8 = 100;

fn default_pct() -> u8 {
	DEFAULT_PCT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
	pub begin: u64,
	pub end: u64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetadata {
	pub org_name: String,
	#[serde(alias = "org_email")]
	pub email: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub extra_contact_info: Option<String>,
	pub report_id: String,
	pub date_range: DateRange,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub errors: Vec<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPublished {
	pub domain: String,
	#[serde(default)]
	pub adkim: Alignment,
	#[serde(default)]
	pub aspf: Alignment,
	pub p: Disposition,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sp: Option<Disposition>,
	#[serde(default = "default_pct")]
	pub pct: u8,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fo: Option<String>
}

impl PolicyPublished {
	/// Policy for a domain with every optional field at its default.
	pub fn new(domain: impl Into<String>, p: Disposition) -> Self {
		PolicyPublished {
			domain: domain.into(),
			adkim: Alignment::default(),
			aspf: Alignment::default(),
			p,
			sp: None,
			pct: DEFAULT_PCT,
			fo: None
		}
	}

	/// The subdomain policy, falling back to the domain policy.
	pub fn subdomain_policy(&self) -> Disposition {
		self.sp.unwrap_or(self.p)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverrideReason {
	#[serde(rename = "type")]
	pub kind: PolicyOverride,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub comment: Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEvaluated {
	pub disposition: Disposition,
	pub dkim: DmarcResult,
	pub spf: DmarcResult,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub reasons: Vec<PolicyOverrideReason>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
	pub source_ip: IpAddr,
	pub count: u64,
	pub policy_evaluated: PolicyEvaluated
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifiers {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub envelope_to: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub envelope_from: Option<String>,
	pub header_from: String
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkimAuthResult {
	pub domain: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub selector: Option<String>,
	pub result: DkimResult,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub human_result: Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpfAuthResult {
	pub domain: String,
	#[serde(default)]
	pub scope: SpfScope,
	pub result: SpfResult
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResults {
	#[serde(default)]
	pub dkim: Vec<DkimAuthResult>,
	#[serde(default)]
	pub spf: Vec<SpfAuthResult>
}

impl AuthResults {
	pub fn is_empty(&self) -> bool {
		self.dkim.is_empty() && self.spf.is_empty()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
	pub row: Row,
	pub identifiers: Identifiers,
	#[serde(default)]
	pub auth_results: AuthResults
}

/// One aggregate report: who reports, on which policy, and what was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
	pub report_metadata: ReportMetadata,
	pub policy_published: PolicyPublished,
	pub records: Vec<Record>
}

impl ReportRecord {
	/// Decodes the JSON form of a record. Field names follow the XML
	/// element names, with list fields pluralized (`records`, `reasons`, `errors`).
	pub fn from_json(text: &str) -> Result<ReportRecord, MalformedRecordError> {
		Ok(serde_json::from_str(text)?)
	}
}
