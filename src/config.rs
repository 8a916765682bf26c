use serde::{Deserialize, Serialize};

use crate::dmarc::types::Disposition;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config<'a> {
	pub output_dir: &'a str,
	/// First reported day, as YYYY-MM-DD.
	pub start_date: &'a str,
	pub days: u32,
	pub max_spoofed_records: u32,
	pub seed: u64,

	#[serde(borrow)]
	pub local: OrgConfig<'a>,

	#[serde(borrow)]
	pub foreign: OrgConfig<'a>
}

/// One side of the demo traffic, acting as both reporter and reportee.
#[derive(Debug, Deserialize, Serialize)]
pub struct OrgConfig<'a> {
	pub org_name: &'a str,
	pub email: &'a str,
	pub extra_contact_info: &'a str,
	pub domain: &'a str,
	pub policy: Disposition,
	pub legitimate_ip: &'a str
}

pub const DEFAULT: Config = Config{
	output_dir: "reports",
	start_date: "2018-01-01",
	days: 7,
	max_spoofed_records: 3,
	seed: 2018,
	local: OrgConfig{
		org_name: "dmarc-viewer.example",
		email: "dmarc@dmarc-viewer.example",
		extra_contact_info: "https://dmarc-viewer.example",
		domain: "dmarc-viewer.example",
		policy: Disposition::None,
		legitimate_ip: "192.0.2.25"
	},
	foreign: OrgConfig{
		org_name: "guugle.example",
		email: "noreply-dmarc-support@guugle.example",
		extra_contact_info: "https://support.guugle.example/dmarc",
		domain: "guugle.example",
		policy: Disposition::Reject,
		legitimate_ip: "198.51.100.17"
	}
};

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_survives_toml() {
		let text = toml::to_string(&DEFAULT).unwrap();
		let config: Config = toml::from_str(&text).unwrap();
		assert_eq!(config.days, DEFAULT.days);
		assert_eq!(config.foreign.policy, Disposition::Reject);
		assert_eq!(config.local.legitimate_ip, "192.0.2.25");
	}
}
