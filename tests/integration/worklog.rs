use insta::assert_snapshot;
use serde_json::json;

use crate::{assert_traced, common::TestContext, tracing_utils::capture};

#[tokio::test]
async fn batch_from_frontmatter_reports_each_failure() {
	let ctx = TestContext::new(
		r#"
//- /logs/2024-01-15.md
---
jira_worklog_batch:
- issueKey: ABC-1
  startTime: 2024-01-15T09:00:00+02:00
  duration: 1h 30m
  comment: pairing
- issueKey: ABC-1
  startTime: 2024-01-15
  duration: 45s
- issueKey: ABC-404
  startTime: 2024-01-15T13:00:00Z
  duration: 2h
- startTime: 2024-01-15T14:00:00Z
  duration: 1h
---
"#,
	);
	ctx.remote_issue("ABC-1", json!({}));

	let (report, log) = capture(ctx.orchestrator.post_work_log_batch_from("logs/2024-01-15.md")).await;
	let report = report.unwrap();

	assert_traced!(log, "post_work_log", "ABC-1");
	assert_snapshot!(report.to_string(), @r"
	1/4 succeeded
	Failed: duration must be at least 1 minute for issues: ABC-1
	Failed: not found: issue ABC-404 for issues: ABC-404
	Failed: missing required fields for issues: unknown
	");
	let posted = ctx.tracker.work_logs();
	assert_eq!(posted.len(), 1);
	assert_eq!((posted[0].time_spent.as_str(), posted[0].started.as_str(), posted[0].comment.as_str()), ("1h 30m", "2024-01-15T07:00:00.000+0000", "pairing"));
}

#[tokio::test]
async fn batch_given_as_json_string() {
	let ctx = TestContext::new(
		r#"
//- /log.md
---
jira_worklog_batch: '[{"issueKey": "ABC-1", "startTime": "2024-01-15T09:00:00Z", "duration": "15m"}]'
---
"#,
	);
	ctx.remote_issue("ABC-1", json!({}));

	let report = ctx.orchestrator.post_work_log_batch_from("log.md").await.unwrap();

	assert_eq!((report.total, report.succeeded), (1, 1));
	assert_eq!(ctx.tracker.work_logs()[0].started, "2024-01-15T09:00:00.000+0000");
}

#[tokio::test]
async fn malformed_batch_is_an_error() {
	let ctx = TestContext::new("//- /log.md\n---\njira_worklog_batch: 3\n---\n");

	assert!(ctx.orchestrator.post_work_log_batch_from("log.md").await.is_err());
	assert!(ctx.tracker.get_call_log().is_empty());
}
