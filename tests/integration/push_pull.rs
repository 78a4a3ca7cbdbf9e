//! Push, pull and transition against a vault on disk.

use insta::assert_snapshot;
use jira_sync::ValidationError;
use serde_json::json;

use crate::{assert_traced, common::TestContext, tracing_utils::capture};

#[tokio::test]
async fn push_creates_issue_and_records_key() {
	let ctx = TestContext::new(
		r#"
//- /jira-issues/new.md
---
summary: Fix bug
project: ABC
issuetype: Bug
---
Some notes.
"#,
	);

	let (key, log) = capture(ctx.orchestrator.push_to_remote("jira-issues/new.md")).await;

	assert_eq!(key.unwrap(), "ABC-1");
	assert_traced!(log, "create_issue");
	assert_eq!(ctx.tracker.created_payloads(), vec![json!({
		"fields": { "summary": "Fix bug", "project": { "key": "ABC" }, "issuetype": { "name": "Bug" } }
	})]);
	assert_snapshot!(ctx.read("jira-issues/new.md"), @r"
	---
	summary: Fix bug
	project: ABC
	issuetype: Bug
	key: ABC-1
	---
	Some notes.
	");
}

#[tokio::test]
async fn push_sends_description_as_wiki() {
	let ctx = TestContext::new(
		r#"
//- /jira-issues/a.md
---
key: ABC-1
---
`sync-block-start-description`
### Repro
1. open the app
1. press **Save**
`sync-block-end-description`
"#,
	);
	ctx.remote_issue("ABC-1", json!({ "summary": "x" }));

	let (result, log) = capture(ctx.orchestrator.push_to_remote("jira-issues/a.md")).await;

	result.unwrap();
	assert_traced!(log, "update_issue", "ABC-1");
	assert!(!log.has_mock_call("create_issue"));
	assert_snapshot!(ctx.tracker.issue("ABC-1").unwrap().fields["description"].as_str().unwrap(), @r"
	h3. Repro
	# open the app
	# press *Save*
	");
}

const PULL_FIXTURE: &str = r#"
//- /jira-issues/a.md
---
key: ABC-1
summary: old
status: Open
priority: Low
tags: [mine]
---
# Notes
Keep this paragraph.

`sync-block-start-description`
stale
`sync-block-end-description`

Assignee: `sync-line-assignee` nobody
Open: `sync-inline-start-openLink``sync-inline-end-openLink`
"#;

#[tokio::test]
async fn pull_updates_fields_and_keeps_user_text() {
	let ctx = TestContext::new(PULL_FIXTURE);
	ctx.remote_issue(
		"ABC-1",
		json!({
			"summary": "New summary",
			"status": { "name": "In Progress" },
			"priority": { "name": "High" },
			"assignee": { "name": "alice" },
			"description": "h3. Repro\n# open the app\n# click {{Save}}"
		}),
	);

	let (result, log) = capture(ctx.orchestrator.fetch_and_pull("jira-issues/a.md")).await;

	result.unwrap();
	assert_traced!(log, "fetch_issue", "ABC-1");
	let first = ctx.read("jira-issues/a.md");
	assert_snapshot!(first, @r"
	---
	key: ABC-1
	summary: New summary
	status: In Progress
	priority: High
	tags:
	- mine
	---
	# Notes
	Keep this paragraph.

	`sync-block-start-description`
	### Repro
	1. open the app
	1. click `Save`
	`sync-block-end-description`

	Assignee: `sync-line-assignee` alice
	Open: `sync-inline-start-openLink`[Open in Jira](https://jira.example.com/browse/ABC-1)`sync-inline-end-openLink`
	");

	ctx.orchestrator.fetch_and_pull("jira-issues/a.md").await.unwrap();
	assert_eq!(ctx.read("jira-issues/a.md"), first);
}

#[tokio::test]
async fn concurrent_pulls_leave_a_consistent_document() {
	let ctx = TestContext::new(PULL_FIXTURE);
	ctx.remote_issue("ABC-1", json!({ "summary": "New summary", "description": "plain" }));

	let (a, b) = tokio::join!(ctx.orchestrator.fetch_and_pull("jira-issues/a.md"), ctx.orchestrator.fetch_and_pull("jira-issues/a.md"));
	a.unwrap();
	b.unwrap();

	let text = ctx.read("jira-issues/a.md");
	assert_eq!(text.matches("`sync-block-start-description`\nplain\n`sync-block-end-description`").count(), 1);
	assert_eq!(text.matches("summary: New summary").count(), 1);
}

#[tokio::test]
async fn transition_moves_remote_and_local_status() {
	let ctx = TestContext::new(
		r#"
//- /jira-issues/a.md
---
key: ABC-1
summary: mine
status: To Do
---
Status: `sync-line-status` To Do
"#,
	);
	ctx.remote_issue("ABC-1", json!({ "summary": "theirs", "status": { "name": "To Do" } }));

	let transitions = ctx.orchestrator.transitions("jira-issues/a.md").await.unwrap();
	let done = transitions.iter().find(|t| t.status == "Done").unwrap();
	let (result, log) = capture(ctx.orchestrator.transition_status("jira-issues/a.md", &done.id, &done.status)).await;

	result.unwrap();
	assert_traced!(log, "transition_issue", "ABC-1");
	assert!(!log.has_mock_call("fetch_issue"));
	assert_eq!(ctx.tracker.issue("ABC-1").unwrap().fields["status"], json!({ "name": "Done" }));
	assert_snapshot!(ctx.read("jira-issues/a.md"), @r"
	---
	key: ABC-1
	summary: mine
	status: Done
	---
	Status: `sync-line-status` Done
	");
}

#[tokio::test]
async fn rejected_transition_leaves_document_alone() {
	let fixture = "//- /a.md\n---\nkey: ABC-1\nstatus: To Do\n---\n";
	let ctx = TestContext::new(fixture);
	ctx.remote_issue("ABC-1", json!({}));

	let err = ctx.orchestrator.transition_status("a.md", "999", "Nowhere").await.unwrap_err();

	assert!(err.to_string().contains("status 400"), "{err}");
	assert_eq!(ctx.read("a.md"), "---\nkey: ABC-1\nstatus: To Do\n---\n");
}

#[tokio::test]
async fn pull_without_key_is_a_validation_error() {
	let ctx = TestContext::new("//- /a.md\n---\nsummary: no key\n---\n");

	let err = ctx.orchestrator.fetch_and_pull("a.md").await.unwrap_err();

	assert_eq!(err.downcast_ref::<ValidationError>(), Some(&ValidationError::MissingIssueKey));
	assert!(ctx.tracker.get_call_log().is_empty());
}
