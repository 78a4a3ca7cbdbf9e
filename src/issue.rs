//! Tracker-side data shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Flat field name to value mapping assembled from a document (frontmatter + markers).
pub type LocalSnapshot = Map<String, Value>;

static NULL: Value = Value::Null;

/// An issue as returned by the tracker.
///
/// Absent fields read as `null` through [`IssueRecord::field`], so mapping functions never have to
/// special-case a missing key.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct IssueRecord {
	#[serde(default)]
	pub id: String,
	pub key: String,
	#[serde(rename = "self", default)]
	pub self_url: String,
	#[serde(default)]
	pub fields: Map<String, Value>,
}

impl IssueRecord {
	pub fn new(key: impl Into<String>, fields: Map<String, Value>) -> Self {
		Self {
			key: key.into(),
			fields,
			..Default::default()
		}
	}

	/// Field value, `null` when absent.
	pub fn field(&self, name: &str) -> &Value {
		self.fields.get(name).unwrap_or(&NULL)
	}

	/// `fields.<field>.<member>` as a string, empty when absent or not a string.
	pub fn field_member(&self, field: &str, member: &str) -> String {
		self.field(field).get(member).and_then(Value::as_str).unwrap_or_default().to_string()
	}

	/// The record as the JSON object expressions see (`issue.key`, `issue.fields.summary`, ...).
	pub fn to_value(&self) -> Value {
		json!({
			"id": self.id,
			"key": self.key,
			"self": self.self_url,
			"fields": self.fields,
		})
	}

	/// A representative, fully populated but empty issue. Used to smoke-test user expressions.
	pub fn placeholder() -> Self {
		let reference = |extra: Value| {
			let mut base = json!({ "self": "", "id": "", "name": "" });
			if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
				base.extend(extra);
			}
			base
		};
		let user = || reference(json!({ "key": "", "emailAddress": "", "displayName": "", "active": false, "timeZone": "" }));
		let fields = json!({
			"summary": "",
			"description": "",
			"issuetype": reference(json!({ "description": "", "iconUrl": "", "subtask": false })),
			"project": reference(json!({ "key": "", "projectTypeKey": "" })),
			"priority": reference(json!({ "iconUrl": "" })),
			"status": reference(json!({ "description": "", "statusCategory": { "id": 0, "key": "", "colorName": "", "name": "" } })),
			"assignee": user(),
			"reporter": user(),
			"creator": user(),
			"created": "",
			"updated": "",
			"lastViewed": "",
			"resolution": null,
			"resolutiondate": null,
			"labels": [],
			"components": [],
			"fixVersions": [],
			"versions": [],
			"issuelinks": [],
			"subtasks": [],
			"attachment": [],
			"timespent": 0,
			"timeestimate": 0,
			"timeoriginalestimate": null,
			"timetracking": { "remainingEstimate": "", "timeSpent": "", "remainingEstimateSeconds": 0, "timeSpentSeconds": 0 },
			"aggregateprogress": { "progress": 0, "total": 0, "percent": 0 },
			"progress": { "progress": 0, "total": 0 },
			"watches": { "self": "", "watchCount": 0, "isWatching": false },
		});
		let fields = match fields {
			Value::Object(map) => map,
			_ => Map::new(),
		};
		Self {
			fields,
			..Default::default()
		}
	}
}

/// A workflow transition available from an issue's current status.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Transition {
	pub id: String,
	/// Name of the transition itself (e.g. "Start Progress").
	pub action: String,
	/// Name of the status the transition leads to.
	pub status: String,
}

/// Window into a query's results.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Pagination {
	pub start_at: usize,
	pub max_results: usize,
}

impl Pagination {
	pub const MAX_PAGE: usize = 1000;

	/// Pages covering the first `limit` results, each at most [`Self::MAX_PAGE`] long.
	pub fn pages(limit: usize) -> Vec<Pagination> {
		(0..limit)
			.step_by(Self::MAX_PAGE)
			.map(|start_at| Pagination {
				start_at,
				max_results: Self::MAX_PAGE.min(limit - start_at),
			})
			.collect()
	}
}

/// One page of search results.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SearchPage {
	pub total: usize,
	#[serde(default)]
	pub issues: Vec<IssueRecord>,
}
