use serde_json::{Value, json};

use super::FieldMapping;
use crate::{
	expr::to_js_string,
	issue::{IssueRecord, LocalSnapshot},
	markup::wiki_value_to_markdown,
};

type ToRemote = fn(&Value) -> Option<Value>;
type FromRemote = fn(&IssueRecord, &LocalSnapshot) -> Option<Value>;

/// A mapping that ships with the crate.
#[derive(Debug)]
pub struct BuiltinMapping {
	pub name: &'static str,
	to_remote: ToRemote,
	from_remote: FromRemote,
}

impl FieldMapping for BuiltinMapping {
	fn to_remote(&self, value: &Value) -> Option<Value> {
		(self.to_remote)(value)
	}

	fn from_remote(&self, issue: &IssueRecord, local: &LocalSnapshot) -> Option<Value> {
		(self.from_remote)(issue, local)
	}
}

pub static BUILTINS: &[BuiltinMapping] = &[
	BuiltinMapping { name: "summary", to_remote: passthrough, from_remote: |issue, _| verbatim(issue, "summary") },
	// Pushed separately, through `markdown_to_wiki`.
	BuiltinMapping { name: "description", to_remote: never, from_remote: description },
	BuiltinMapping { name: "key", to_remote: never, from_remote: |issue, _| non_empty(&issue.key) },
	BuiltinMapping { name: "self", to_remote: never, from_remote: |issue, _| non_empty(&issue.self_url) },
	BuiltinMapping { name: "project", to_remote: |v| wrap("key", v), from_remote: |issue, _| Some(issue.field_member("project", "key").into()) },
	BuiltinMapping { name: "issuetype", to_remote: |v| wrap("name", v), from_remote: |issue, _| named(issue, "issuetype") },
	BuiltinMapping { name: "priority", to_remote: |v| wrap("name", v), from_remote: |issue, _| named(issue, "priority") },
	BuiltinMapping { name: "assignee", to_remote: |v| wrap("name", v), from_remote: |issue, _| named(issue, "assignee") },
	BuiltinMapping { name: "reporter", to_remote: |v| wrap("name", v), from_remote: |issue, _| named(issue, "reporter") },
	// Changed through transitions, never written as a field.
	BuiltinMapping { name: "status", to_remote: never, from_remote: |issue, _| named(issue, "status") },
	BuiltinMapping { name: "creator", to_remote: never, from_remote: |issue, _| named(issue, "creator") },
	BuiltinMapping { name: "created", to_remote: never, from_remote: |issue, _| verbatim(issue, "created") },
	BuiltinMapping { name: "updated", to_remote: never, from_remote: |issue, _| verbatim(issue, "updated") },
	BuiltinMapping { name: "lastViewed", to_remote: never, from_remote: |issue, _| verbatim(issue, "lastViewed") },
	BuiltinMapping { name: "link", to_remote: never, from_remote: |issue, _| browse_url(issue).map(Value::String) },
	BuiltinMapping { name: "openLink", to_remote: never, from_remote: |issue, _| browse_url(issue).map(|url| Value::String(format!("[Open in Jira]({url})"))) },
	BuiltinMapping { name: "progress", to_remote: never, from_remote: progress },
	// Local-only.
	BuiltinMapping { name: "tags", to_remote: never, from_remote: |_, _| None },
	BuiltinMapping { name: "aliases", to_remote: never, from_remote: |_, _| None },
	BuiltinMapping { name: "deadline", to_remote: never, from_remote: |_, _| None },
];

pub fn builtin(name: &str) -> Option<&'static BuiltinMapping> {
	BUILTINS.iter().find(|m| m.name == name)
}

fn passthrough(value: &Value) -> Option<Value> {
	Some(value.clone())
}

fn never(_: &Value) -> Option<Value> {
	None
}

/// Scalar to the tracker's reference-object shape, e.g. `{"key": "ABC"}`.
fn wrap(member: &str, value: &Value) -> Option<Value> {
	Some(json!({ member: value }))
}

fn verbatim(issue: &IssueRecord, field: &str) -> Option<Value> {
	Some(issue.field(field).clone()).filter(|v| !v.is_null())
}

fn named(issue: &IssueRecord, field: &str) -> Option<Value> {
	Some(Value::String(issue.field_member(field, "name")))
}

fn non_empty(s: &str) -> Option<Value> {
	Some(Value::String(s.to_string())).filter(|_| !s.is_empty())
}

fn description(issue: &IssueRecord, _: &LocalSnapshot) -> Option<Value> {
	let raw = issue.field("description");
	if raw.is_null() {
		return None;
	}
	Some(Value::String(wiki_value_to_markdown(raw)))
}

fn progress(issue: &IssueRecord, _: &LocalSnapshot) -> Option<Value> {
	let percent = issue.field("aggregateprogress").get("percent").filter(|p| !p.is_null())?;
	Some(Value::String(format!("{}%", to_js_string(percent))))
}

/// `<base>/browse/<KEY>`, where base is everything before `/rest/` in the record's API URL.
fn browse_url(issue: &IssueRecord) -> Option<String> {
	if issue.key.is_empty() || issue.self_url.is_empty() {
		return None;
	}
	let base = match issue.self_url.find("/rest/") {
		Some(i) => issue.self_url[..i].to_string(),
		None => url::Url::parse(&issue.self_url).ok()?.origin().ascii_serialization(),
	};
	Some(format!("{base}/browse/{}", issue.key))
}
