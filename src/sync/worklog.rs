//! Batch work-log posting.

use color_eyre::eyre::{Result, bail};
use futures::{StreamExt, stream};
use jiff::{Timestamp, Zoned, civil, tz::TimeZone};
use serde_json::Value;
use tracing::{debug, instrument};

use super::BatchReport;
use crate::{error::ValidationError, expr::to_js_string, markup::regex, tracker::TrackerClient};

/// Frontmatter key holding a batch of work logs.
pub const BATCH_KEY: &str = "jira_worklog_batch";

/// One requested work log, as authored in a document.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WorkLogEntry {
	pub issue_key: String,
	pub start_time: String,
	pub duration: String,
	pub comment: String,
}

impl WorkLogEntry {
	/// Read the `issueKey`/`startTime`/`duration`/`comment` members. Absent or null members are empty.
	fn from_value(value: &Value) -> Self {
		let member = |name: &str| match value.get(name) {
			None | Some(Value::Null) => String::new(),
			Some(v) => to_js_string(v),
		};
		Self {
			issue_key: member("issueKey"),
			start_time: member("startTime"),
			duration: member("duration"),
			comment: member("comment"),
		}
	}
}

/// Entries from the [`BATCH_KEY`] frontmatter value: either a list, or a string holding a JSON list.
pub fn work_log_entries_from_frontmatter(value: &Value) -> Result<Vec<WorkLogEntry>> {
	let parsed;
	let list = match value {
		Value::Array(items) => items,
		Value::String(s) => {
			parsed = serde_json::from_str::<Value>(s)?;
			match &parsed {
				Value::Array(items) => items,
				other => bail!("{BATCH_KEY} must hold a list, found {other}"),
			}
		}
		other => bail!("{BATCH_KEY} must be a list or a JSON string, found {other}"),
	};
	Ok(list.iter().map(WorkLogEntry::from_value).collect())
}

/// Normalize a duration like `1w 2d 3h 30m` into the tracker's form, dropping zero-valued and
/// seconds tokens. An empty result means the duration is below one minute.
pub fn parse_duration(input: &str) -> String {
	regex!(r"(\d+)([wdhms])")
		.captures_iter(input)
		.filter_map(|caps| {
			let value: u64 = caps[1].parse().ok()?;
			let unit = &caps[2];
			(value != 0 && unit != "s").then(|| format!("{value}{unit}"))
		})
		.collect::<Vec<_>>()
		.join(" ")
}

/// Convert a user-supplied start time into the tracker's `2024-01-15T09:00:00.000+0000` form (UTC).
///
/// Accepts RFC 3339 / ISO 8601 timestamps with an offset, zoned date-times, civil date-times
/// (interpreted in the system time zone) and bare dates (midnight UTC).
pub fn to_tracker_timestamp(input: &str) -> Result<String, ValidationError> {
	let trimmed = input.trim();
	let invalid = || ValidationError::InvalidStartTime { input: input.to_string() };

	let timestamp = if regex!(r"^\d{4}-\d{2}-\d{2}$").is_match(trimmed) {
		let date: civil::Date = trimmed.parse().map_err(|_| invalid())?;
		date.to_zoned(TimeZone::UTC).map_err(|_| invalid())?.timestamp()
	} else if let Ok(ts) = trimmed.parse::<Timestamp>() {
		ts
	} else if let Ok(zoned) = trimmed.parse::<Zoned>() {
		zoned.timestamp()
	} else if let Ok(dt) = trimmed.parse::<civil::DateTime>() {
		dt.to_zoned(TimeZone::system()).map_err(|_| invalid())?.timestamp()
	} else {
		return Err(invalid());
	};

	let utc = timestamp.to_zoned(TimeZone::UTC);
	Ok(format!("{}.{:03}+0000", utc.strftime("%Y-%m-%dT%H:%M:%S"), utc.millisecond()))
}

/// Validate one entry and post it.
async fn post_one(client: &dyn TrackerClient, entry: &WorkLogEntry) -> Result<()> {
	if entry.issue_key.trim().is_empty() || entry.start_time.trim().is_empty() || entry.duration.trim().is_empty() {
		return Err(ValidationError::MissingWorkLogFields.into());
	}
	let started = to_tracker_timestamp(&entry.start_time)?;
	let time_spent = parse_duration(&entry.duration);
	if time_spent.is_empty() {
		return Err(ValidationError::InvalidDuration { input: entry.duration.clone() }.into());
	}
	debug!(key = %entry.issue_key, %time_spent, %started, "posting work log");
	client.post_work_log(entry.issue_key.trim(), &time_spent, &started, &entry.comment).await
}

/// Post every entry, at most `concurrency` at a time. One entry failing never stops the others;
/// failures are grouped by reason in the report.
#[instrument(skip(client, entries), fields(total = entries.len()))]
pub async fn post_work_log_batch(client: &dyn TrackerClient, entries: &[WorkLogEntry], concurrency: usize) -> BatchReport {
	let outcomes: Vec<(String, Result<()>)> = stream::iter(entries)
		.map(|entry| async move {
			let key = match entry.issue_key.trim() {
				"" => "unknown".to_string(),
				key => key.to_string(),
			};
			(key, post_one(client, entry).await)
		})
		.buffered(concurrency.max(1))
		.collect()
		.await;

	let mut report = BatchReport::new(entries.len());
	for (key, outcome) in outcomes {
		match outcome {
			Ok(()) => report.record_success(),
			Err(err) => report.record_failure(err.to_string(), key),
		}
	}
	report
}
