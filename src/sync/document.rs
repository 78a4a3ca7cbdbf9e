//! Pure document transforms behind the orchestrator's operations.

use std::collections::BTreeMap;

use color_eyre::eyre::Result;
use serde_json::{Map, Value};

use crate::{
	document::frontmatter,
	error::ValidationError,
	issue::{IssueRecord, LocalSnapshot},
	mapping::FieldMappingRegistry,
	marker,
	markup::{coerce_input, markdown_to_wiki, wiki_to_markdown},
};

const DESCRIPTION: &str = "description";

/// Fields the tracker refuses to create an issue without.
pub const REQUIRED_ON_CREATE: [&str; 3] = ["summary", "project", "issuetype"];

/// Marker values merged with frontmatter; frontmatter wins a tie.
pub fn local_snapshot(frontmatter: &LocalSnapshot, body: &str) -> LocalSnapshot {
	let mut local: LocalSnapshot = marker::extract_values(body).into_iter().map(|(name, content)| (name, Value::String(content))).collect();
	local.extend(frontmatter.iter().map(|(k, v)| (k.clone(), v.clone())));
	local
}

/// Frontmatter merged with marker values; a marker wins a tie. This is what remote→local
/// expressions see as `local`.
pub fn pull_snapshot(frontmatter: &LocalSnapshot, body: &str) -> LocalSnapshot {
	let mut local = frontmatter.clone();
	local.extend(marker::extract_values(body).into_iter().map(|(name, content)| (name, Value::String(content))));
	local
}

/// Field bag to push for `local`. The built-in description goes through [`markdown_to_wiki`]
/// rather than the registry.
pub fn push_fields(registry: &FieldMappingRegistry, local: &LocalSnapshot) -> Map<String, Value> {
	let mut fields = registry.to_remote_fields(local);
	if registry.is_builtin(DESCRIPTION)
		&& let Some(description) = local.get(DESCRIPTION).filter(|v| !v.is_null())
	{
		fields.insert(DESCRIPTION.to_string(), Value::String(markdown_to_wiki(&coerce_input(description))));
	}
	fields
}

/// Required fields absent from (or blank in) a create payload.
pub fn check_required(fields: &Map<String, Value>) -> Result<(), ValidationError> {
	let missing: Vec<String> = REQUIRED_ON_CREATE.iter().filter(|name| fields.get(**name).is_none_or(is_blank)).map(|name| name.to_string()).collect();
	match missing.is_empty() {
		true => Ok(()),
		false => Err(ValidationError::MissingRequiredFields { fields: missing }),
	}
}

fn is_blank(value: &Value) -> bool {
	match value {
		Value::Null => true,
		Value::String(s) => s.trim().is_empty(),
		Value::Object(map) => map.values().all(is_blank),
		_ => false,
	}
}

/// How a non-string value is written into a marker.
pub fn marker_text(value: &Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::String(s) => s.clone(),
		Value::Array(items) if items.iter().all(|v| !v.is_object() && !v.is_array()) => items.iter().map(marker_text).collect::<Vec<_>>().join(", "),
		Value::Object(_) | Value::Array(_) => value.to_string(),
		other => other.to_string(),
	}
}

/// Write `issue` into a document: every frontmatter key and every marker already present is
/// resolved through the registry and updated when it yields a value.
pub fn pull_into_text(registry: &FieldMappingRegistry, issue: &IssueRecord, text: &str) -> Result<String> {
	let (mut fm, body) = frontmatter::split(text)?;
	let markers = marker::extract_values(body);
	let local = pull_snapshot(&fm, body);

	let mut updates = BTreeMap::new();
	for name in markers.keys() {
		let Some(value) = registry.value_from_remote(name, issue, &local) else { continue };
		let mut content = marker_text(&value);
		// The built-in already converts; a custom description mapping sees raw wiki text.
		if name == DESCRIPTION && !registry.is_builtin(DESCRIPTION) {
			content = wiki_to_markdown(&content);
		}
		updates.insert(name.clone(), content);
	}

	let previous_description = fm.get(DESCRIPTION).cloned();
	registry.apply_from_remote(&mut fm, issue, &local);
	// Frontmatter keeps the tracker's own text, and only when no marker carries the description.
	if let Some(previous) = previous_description {
		let raw = issue.field(DESCRIPTION);
		let value = match markers.contains_key(DESCRIPTION) || raw.is_null() {
			true => previous,
			false => raw.clone(),
		};
		fm.insert(DESCRIPTION.to_string(), value);
	}

	frontmatter::join(&fm, &marker::apply_updates(body, &updates))
}

/// Set the local `status` to `status`: the frontmatter key (added if absent) and any `status` marker.
pub fn set_status_in_text(text: &str, status: &str) -> Result<String> {
	let (mut fm, body) = frontmatter::split(text)?;
	fm.insert("status".to_string(), Value::String(status.to_string()));
	let updates = BTreeMap::from([("status".to_string(), status.to_string())]);
	frontmatter::join(&fm, &marker::apply_updates(body, &updates))
}
