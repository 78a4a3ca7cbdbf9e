//! Custom field mappings configured through `field_mappings`.

use std::collections::BTreeMap;

use jira_sync::{
	AppConfig, CompileError,
	expr::{self, Direction},
	mapping::MappingSource,
};
use serde_json::json;

use crate::{common::TestContext, tracing_utils::capture_sync};

fn config_with(mappings: &[(&str, &str, &str)]) -> AppConfig {
	let field_mappings: BTreeMap<String, MappingSource> = mappings
		.iter()
		.map(|(field, to_remote, from_remote)| {
			(field.to_string(), MappingSource {
				to_remote: to_remote.to_string(),
				from_remote: from_remote.to_string(),
			})
		})
		.collect();
	AppConfig { field_mappings, ..Default::default() }
}

const DOC: &str = "//- /a.md\n---\nkey: ABC-1\nsummary: Fix bug\n---\n";

#[tokio::test]
async fn expression_with_dynamic_code_execution_is_rejected_and_never_run() {
	assert_eq!(expr::validate("(value) => eval(value)", Direction::ToRemote, true).unwrap_err(), CompileError::Forbidden {
		token: "eval".to_string()
	});

	let (ctx, log) = capture_sync(|| TestContext::with_config(DOC, config_with(&[("summary", "(value) => eval(value)", "")])));
	assert!(log.warnings().iter().any(|e| e.fields.field.as_deref() == Some("summary")), "{:#?}", log.warnings());
	ctx.remote_issue("ABC-1", json!({ "summary": "old" }));

	ctx.orchestrator.push_to_remote("a.md").await.unwrap();

	// The built-in passthrough applies instead.
	assert_eq!(ctx.tracker.issue("ABC-1").unwrap().fields["summary"], "Fix bug");
}

#[tokio::test]
async fn custom_mapping_converts_both_ways() {
	let config = config_with(&[(
		"labels",
		"value ? String(value).split(',').map((s) => s.trim()).filter((s) => s) : []",
		"issue.fields.labels ? issue.fields.labels.join(', ') : ''",
	)]);
	let ctx = TestContext::with_config("//- /a.md\n---\nkey: ABC-1\nlabels: backend, urgent\n---\nLabels: `sync-line-labels` old\n", config);
	ctx.remote_issue("ABC-1", json!({ "summary": "x" }));

	ctx.orchestrator.push_to_remote("a.md").await.unwrap();
	assert_eq!(ctx.tracker.issue("ABC-1").unwrap().fields["labels"], json!(["backend", "urgent"]));

	ctx.remote_issue("ABC-1", json!({ "labels": ["ops", "later"] }));
	ctx.orchestrator.fetch_and_pull("a.md").await.unwrap();
	assert_eq!(ctx.read("a.md"), "---\nkey: ABC-1\nlabels: ops, later\n---\nLabels: `sync-line-labels` ops, later\n");
}

#[tokio::test]
async fn runtime_failure_skips_only_that_field() {
	let config = config_with(&[("summary", "value.toUpperCase()", "")]);
	let ctx = TestContext::with_config("//- /a.md\n---\nkey: ABC-1\nsummary: 42\npriority: High\n---\n", config);
	ctx.remote_issue("ABC-1", json!({ "summary": "untouched" }));

	let (_, log) = crate::tracing_utils::capture(async { ctx.orchestrator.push_to_remote("a.md").await.unwrap() }).await;

	let fields = ctx.tracker.issue("ABC-1").unwrap().fields;
	assert_eq!(fields["summary"], "untouched");
	assert_eq!(fields["priority"], json!({ "name": "High" }));
	assert!(log.warnings().iter().any(|e| e.fields.field.as_deref() == Some("summary")));
}
