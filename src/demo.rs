//! Synthetic report traffic between two fictitious organizations.
//!
//! Each day yields one incoming report (the foreign organization reporting on
//! mail that claimed to be from the local domain) and one outgoing report (the
//! local organization reporting on the foreign domain). Every report carries
//! the legitimate sender plus a few spoofed sources from random networks.

use std::boxed::Box;
use std::error::Error;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use chrono::{Days, NaiveDate};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use simple_error::bail;

use crate::config::{Config, OrgConfig};
use crate::dmarc::types::*;
use crate::dmarc::{render, validate, RenderedDocument};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Country code and the first two octets of a network that spoofed mail comes from.
const SENDER_NETWORKS: &[(&str, [u8; 2])] = &[
	("at", [80, 110]),
	("br", [177, 12]),
	("cn", [36, 96]),
	("de", [91, 64]),
	("in", [49, 36]),
	("ru", [95, 24]),
	("us", [64, 233]),
];

const SPOOFER_DOMAINS: &[&str] = &["mailer.invalid", "bulk-sender.invalid", "phish.invalid"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	Incoming,
	Outgoing
}

impl Direction {
	pub const BOTH: [Direction; 2] = [Direction::Incoming, Direction::Outgoing];

	/// Returns (reporter, reportee) for this direction.
	fn sides<'c, 'a>(self, config: &'c Config<'a>) -> (&'c OrgConfig<'a>, &'c OrgConfig<'a>) {
		match self {
			Direction::Incoming => (&config.foreign, &config.local),
			Direction::Outgoing => (&config.local, &config.foreign),
		}
	}
}

/// The fully populated sample report.
pub fn sample_report() -> ReportRecord {
	ReportRecord {
		report_metadata: ReportMetadata {
			org_name: "reporter.org".to_string(),
			email: "postmaster@example.org".to_string(),
			extra_contact_info: Some("www.reporter.org".to_string()),
			report_id: "reportee.org:1514847601".to_string(),
			date_range: DateRange { begin: 1514761200, end: 1514847600 },
			errors: Vec::new()
		},
		policy_published: PolicyPublished {
			domain: "reportee.org".to_string(),
			adkim: Alignment::Relaxed,
			aspf: Alignment::Relaxed,
			p: Disposition::None,
			sp: Some(Disposition::None),
			pct: 100,
			fo: None
		},
		records: vec![Record {
			row: Row {
				source_ip: IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
				count: 42,
				policy_evaluated: PolicyEvaluated {
					disposition: Disposition::None,
					dkim: DmarcResult::Pass,
					spf: DmarcResult::Fail,
					reasons: vec![PolicyOverrideReason {
						kind: PolicyOverride::Other,
						comment: Some("No reason".to_string())
					}]
				}
			},
			identifiers: Identifiers {
				envelope_to: Some("reporter.org".to_string()),
				envelope_from: None,
				header_from: "reportee.org".to_string()
			},
			auth_results: AuthResults {
				dkim: vec![DkimAuthResult {
					domain: "reportee.org".to_string(),
					selector: Some("abc".to_string()),
					result: DkimResult::Pass,
					human_result: Some("pass".to_string())
				}],
				spf: vec![SpfAuthResult {
					domain: "reportee.org".to_string(),
					scope: SpfScope::Helo,
					result: SpfResult::Neutral
				}]
			}
		}]
	}
}

/// Builds one day's report from `reporter` about mail claiming to be from `reportee`.
pub fn generate_report<R: Rng + ?Sized>(
	rng: &mut R,
	reporter: &OrgConfig,
	reportee: &OrgConfig,
	day: NaiveDate,
	max_spoofed_records: u32
) -> Result<ReportRecord, Box<dyn Error>> {
	let midnight = match day.and_hms_opt(0, 0, 0) {
		Some(x) => x.and_utc().timestamp(),
		None => bail!("Could not compute start of {}", day),
	};
	let begin = u64::try_from(midnight)?;
	let end = begin + SECONDS_PER_DAY - 1;

	let legitimate_ip: IpAddr = reportee.legitimate_ip.parse()?;
	let mut records = vec![legitimate_record(rng, reporter, reportee, legitimate_ip)];
	for _ in 0..rng.random_range(0..=max_spoofed_records) {
		records.push(spoofed_record(rng, reporter, reportee));
	}

	Ok(ReportRecord {
		report_metadata: ReportMetadata {
			org_name: reporter.org_name.to_string(),
			email: reporter.email.to_string(),
			extra_contact_info: Some(reporter.extra_contact_info.to_string()),
			report_id: format!("{}:{}", reportee.domain, end + 1),
			date_range: DateRange { begin, end },
			errors: Vec::new()
		},
		policy_published: PolicyPublished::new(reportee.domain, reportee.policy),
		records
	})
}

fn legitimate_record<R: Rng + ?Sized>(rng: &mut R, reporter: &OrgConfig, reportee: &OrgConfig, source_ip: IpAddr) -> Record {
	Record {
		row: Row {
			source_ip,
			count: rng.random_range(50..=500),
			policy_evaluated: PolicyEvaluated {
				disposition: Disposition::None,
				dkim: DmarcResult::Pass,
				spf: DmarcResult::Pass,
				reasons: Vec::new()
			}
		},
		identifiers: Identifiers {
			envelope_to: Some(reporter.domain.to_string()),
			envelope_from: Some(reportee.domain.to_string()),
			header_from: reportee.domain.to_string()
		},
		auth_results: AuthResults {
			dkim: vec![DkimAuthResult {
				domain: reportee.domain.to_string(),
				selector: Some("default".to_string()),
				result: DkimResult::Pass,
				human_result: None
			}],
			spf: vec![SpfAuthResult {
				domain: reportee.domain.to_string(),
				scope: SpfScope::Mfrom,
				result: SpfResult::Pass
			}]
		}
	}
}

fn spoofed_record<R: Rng + ?Sized>(rng: &mut R, reporter: &OrgConfig, reportee: &OrgConfig) -> Record {
	let (country, prefix) = SENDER_NETWORKS.choose(rng).copied().unwrap_or(("us", [64, 233]));
	let source_ip = IpAddr::V4(Ipv4Addr::new(prefix[0], prefix[1], rng.random(), rng.random_range(1..255)));
	debug!("Spoofed sender {} ({})", source_ip, country);

	let mut dkim = Vec::new();
	if rng.random_bool(0.5) {
		let domain = if rng.random_bool(0.5) {
			reportee.domain
		} else {
			SPOOFER_DOMAINS.choose(rng).copied().unwrap_or(reportee.domain)
		};
		dkim.push(DkimAuthResult {
			domain: domain.to_string(),
			selector: Some("s1".to_string()),
			result: DkimResult::ALL.choose(rng).copied().unwrap_or(DkimResult::None),
			human_result: None
		});
	}

	let spf = SpfAuthResult {
		domain: reportee.domain.to_string(),
		scope: if rng.random_bool(0.5) { SpfScope::Mfrom } else { SpfScope::Helo },
		result: SpfResult::ALL.choose(rng).copied().unwrap_or(SpfResult::None)
	};

	let dkim_aligned = dkim.iter().any(|x| x.result == DkimResult::Pass && x.domain == reportee.domain);
	let spf_aligned = spf.result == SpfResult::Pass;
	let disposition = if dkim_aligned || spf_aligned {
		Disposition::None
	} else {
		reportee.policy
	};

	Record {
		row: Row {
			source_ip,
			count: rng.random_range(1..=40),
			policy_evaluated: PolicyEvaluated {
				disposition,
				dkim: if dkim_aligned { DmarcResult::Pass } else { DmarcResult::Fail },
				spf: if spf_aligned { DmarcResult::Pass } else { DmarcResult::Fail },
				reasons: Vec::new()
			}
		},
		identifiers: Identifiers {
			envelope_to: Some(reporter.domain.to_string()),
			envelope_from: None,
			header_from: reportee.domain.to_string()
		},
		auth_results: AuthResults { dkim, spf: vec![spf] }
	}
}

/// Generates, renders and validates every report the config describes.
pub fn generate_all(config: &Config) -> Result<Vec<RenderedDocument>, Box<dyn Error>> {
	let start = NaiveDate::parse_from_str(config.start_date, "%Y-%m-%d")?;
	let mut rng = StdRng::seed_from_u64(config.seed);
	let mut documents = Vec::new();

	for offset in 0..config.days {
		let day = match start.checked_add_days(Days::new(offset.into())) {
			Some(x) => x,
			None => bail!("Date out of range: {} + {} days", start, offset),
		};

		for direction in Direction::BOTH.iter() {
			let (reporter, reportee) = direction.sides(config);
			let report = generate_report(&mut rng, reporter, reportee, day, config.max_spoofed_records)?;
			let rendered = render(&report)?;
			validate(rendered.document())?;
			documents.push(rendered);
		}
	}

	Ok(documents)
}

/// Writes every generated report into `config.output_dir`, returning how many were written.
pub fn run(config: &Config) -> Result<usize, Box<dyn Error>> {
	let documents = generate_all(config)?;
	let output_dir = Path::new(config.output_dir);
	fs::create_dir_all(output_dir)?;

	for rendered in documents.iter() {
		let path = rendered.path_in(output_dir, "xml");
		fs::write(&path, rendered.document())?;
		info!("Wrote {}", path.display());
	}

	Ok(documents.len())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::DEFAULT;

	#[test]
	fn sample_report_renders_and_validates() {
		let rendered = render(&sample_report()).unwrap();
		assert_eq!(rendered.filename(), "reporter.org!reportee.org:1514847601!1514761200!1514847600");
		validate(rendered.document()).unwrap();
	}

	#[test]
	fn reports_cover_one_day() {
		let mut rng = StdRng::seed_from_u64(7);
		let day = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
		let report = generate_report(&mut rng, &DEFAULT.foreign, &DEFAULT.local, day, 3).unwrap();

		let metadata = &report.report_metadata;
		assert_eq!(metadata.org_name, "guugle.example");
		assert_eq!(metadata.date_range.begin, 1514764800);
		assert_eq!(metadata.date_range.end, 1514764800 + SECONDS_PER_DAY - 1);
		assert_eq!(metadata.report_id, "dmarc-viewer.example:1514851200");
		assert_eq!(report.policy_published.domain, "dmarc-viewer.example");
		assert!(report.records.len() >= 1 && report.records.len() <= 4);
		assert_eq!(report.records[0].row.source_ip.to_string(), "192.0.2.25");
	}

	#[test]
	fn spoofed_dispositions_follow_policy() {
		let mut rng = StdRng::seed_from_u64(11);
		for _ in 0..200 {
			let record = spoofed_record(&mut rng, &DEFAULT.local, &DEFAULT.foreign);
			let evaluated = &record.row.policy_evaluated;
			let passed = evaluated.dkim == DmarcResult::Pass || evaluated.spf == DmarcResult::Pass;
			let expected = if passed { Disposition::None } else { Disposition::Reject };
			assert_eq!(evaluated.disposition, expected);
			assert_eq!(record.auth_results.spf.len(), 1);
			assert!(record.row.count >= 1);
		}
	}

	#[test]
	fn generation_is_reproducible() {
		let first = generate_all(&DEFAULT).unwrap();
		let second = generate_all(&DEFAULT).unwrap();
		assert_eq!(first.len(), (DEFAULT.days * 2) as usize);
		assert_eq!(first, second);
	}

	#[test]
	fn invalid_start_date_is_an_error() {
		let config = Config { start_date: "January 1st", ..DEFAULT };
		assert!(generate_all(&config).is_err());
	}
}
