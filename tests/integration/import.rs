use insta::assert_snapshot;
use jira_sync::AppConfig;
use serde_json::json;

use crate::{assert_traced, common::TestContext, tracing_utils::capture};

fn fields(summary: &str) -> serde_json::Value {
	json!({
		"summary": summary,
		"project": { "key": "ABC" },
		"issuetype": { "name": "Story" },
		"status": { "name": "To Do" },
		"priority": { "name": "Medium" },
		"assignee": { "name": "alice" },
		"reporter": { "name": "bob" },
		"created": "2024-01-10T08:00:00.000+0000",
		"updated": "2024-01-12T16:30:00.000+0000",
		"description": "As a user I want *fast* pages."
	})
}

#[tokio::test]
async fn import_by_key_creates_document_from_default_template() {
	let ctx = TestContext::new("");
	ctx.remote_issue("ABC-3", fields("Speed up search"));

	let path = ctx.orchestrator.import_by_key("ABC-3").await.unwrap();

	assert_eq!(path, "jira-issues/Speed up search (ABC-3).md");
	assert_snapshot!(ctx.read(&path), @r"
	---
	key: ABC-3
	summary: Speed up search
	project: ABC
	issuetype: Story
	status: To Do
	priority: Medium
	assignee: alice
	reporter: bob
	created: 2024-01-10T08:00:00.000+0000
	updated: 2024-01-12T16:30:00.000+0000
	link: https://jira.example.com/browse/ABC-3
	---
	`sync-section-description`
	As a user I want **fast** pages.
	");
}

#[tokio::test]
async fn import_reuses_document_found_anywhere_in_issues_folder() {
	let ctx = TestContext::new("//- /jira-issues/done/renamed.md\n---\nkey: ABC-3\nsummary: old\n---\nmy notes\n");
	ctx.remote_issue("ABC-3", fields("Speed up search"));

	let path = ctx.orchestrator.import_by_key("ABC-3").await.unwrap();

	assert_eq!(path, "jira-issues/done/renamed.md");
	assert_eq!(ctx.read(&path), "---\nkey: ABC-3\nsummary: Speed up search\n---\nmy notes\n");
	assert_eq!(ctx.files(), vec!["jira-issues/done/renamed.md"]);
}

#[tokio::test]
async fn import_by_query_imports_every_match() {
	let config = AppConfig {
		issues_folder: "tracker".to_string(),
		filename_template: "{key}".to_string(),
		template_path: Some("templates/issue".to_string()),
		..Default::default()
	};
	let ctx = TestContext::with_config("//- /templates/issue.md\n---\nsummary:\nstatus:\n---\n", config);
	for n in 1..=3 {
		ctx.remote_issue(&format!("ABC-{n}"), fields(&format!("Story {n}")));
	}

	let (report, log) = capture(ctx.orchestrator.import_by_query("project = ABC ORDER BY key", None)).await;

	assert_eq!(report.unwrap().to_string(), "3/3 succeeded");
	assert_traced!(log, "search_by_query");
	assert_eq!(ctx.files(), vec!["templates/issue.md", "tracker/ABC-1.md", "tracker/ABC-2.md", "tracker/ABC-3.md"]);
	assert_eq!(ctx.read("tracker/ABC-2.md"), "---\nsummary: Story 2\nstatus: To Do\nkey: ABC-2\n---\n");
}

#[tokio::test]
async fn missing_template_falls_back_to_default() {
	let config = AppConfig {
		template_path: Some("templates/missing".to_string()),
		..Default::default()
	};
	let ctx = TestContext::with_config("", config);
	ctx.remote_issue("ABC-1", fields("x"));

	let path = ctx.orchestrator.import_by_key("ABC-1").await.unwrap();

	assert!(ctx.read(&path).contains("`sync-section-description`\nAs a user I want **fast** pages."));
}
