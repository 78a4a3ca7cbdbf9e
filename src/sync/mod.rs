//! Synchronization Orchestrator.
//!
//! Ties the tracker, the document host and the mapping registry together. Every document edit is
//! a single [`DocumentHost::process_document`] call, so a pull never interleaves with another write
//! to the same document.

mod document;
mod import;
pub mod worklog;

use std::{
	collections::{BTreeMap, HashMap},
	fmt,
	sync::Arc,
};

use color_eyre::eyre::{Result, WrapErr};
pub use document::{REQUIRED_ON_CREATE, check_required, local_snapshot, marker_text, pull_into_text, push_fields, set_status_in_text};
use futures::{StreamExt, stream};
pub use import::{DEFAULT_TEMPLATE, document_path, filename_from_template};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
pub use worklog::{WorkLogEntry, parse_duration, post_work_log_batch, to_tracker_timestamp, work_log_entries_from_frontmatter};

use crate::{
	config::AppConfig,
	document::{BoxedDocumentHost, frontmatter},
	error::{DocumentExists, ValidationError},
	issue::{IssueRecord, LocalSnapshot, Pagination, Transition},
	mapping::{FieldMappingRegistry, MappingSource},
	tracker::BoxedTrackerClient,
};

//==============================================================================
// Batch Reports
//==============================================================================

/// Items that failed for the same reason.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FailureGroup {
	pub reason: String,
	pub issue_keys: Vec<String>,
}

/// Outcome of a batch operation. Failed items never abort the batch; they are grouped here by
/// reason, in order of first occurrence.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct BatchReport {
	pub total: usize,
	pub succeeded: usize,
	pub failures: Vec<FailureGroup>,
}

impl BatchReport {
	pub fn new(total: usize) -> Self {
		Self { total, ..Default::default() }
	}

	pub fn record_success(&mut self) {
		self.succeeded += 1;
	}

	pub fn record_failure(&mut self, reason: String, issue_key: String) {
		match self.failures.iter_mut().find(|g| g.reason == reason) {
			Some(group) => group.issue_keys.push(issue_key),
			None => self.failures.push(FailureGroup { reason, issue_keys: vec![issue_key] }),
		}
	}

	pub fn failed(&self) -> usize {
		self.failures.iter().map(|g| g.issue_keys.len()).sum()
	}
}

impl fmt::Display for BatchReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{} succeeded", self.succeeded, self.total)?;
		for group in &self.failures {
			write!(f, "\nFailed: {} for issues: {}", group.reason, group.issue_keys.join(", "))?;
		}
		Ok(())
	}
}

//==============================================================================
// Orchestrator
//==============================================================================

#[derive(Clone, Debug)]
struct ImportSettings {
	issues_folder: String,
	template_path: Option<String>,
	filename_template: String,
}

pub struct Orchestrator {
	client: BoxedTrackerClient,
	host: BoxedDocumentHost,
	registry: Arc<FieldMappingRegistry>,
	import: ImportSettings,
	request_concurrency: usize,
	/// Issue key to document path, filled by imports and folder scans.
	index: RwLock<HashMap<String, String>>,
}

impl Orchestrator {
	pub fn new(client: BoxedTrackerClient, host: BoxedDocumentHost, config: &AppConfig) -> Self {
		Self {
			client,
			host,
			registry: Arc::new(FieldMappingRegistry::new(&config.field_mappings, config.enable_field_validation)),
			import: ImportSettings {
				issues_folder: config.issues_folder.clone(),
				template_path: config.template_path.clone(),
				filename_template: config.filename_template.clone(),
			},
			request_concurrency: config.request_concurrency.max(1),
			index: RwLock::new(HashMap::new()),
		}
	}

	pub fn registry(&self) -> &FieldMappingRegistry {
		&self.registry
	}

	/// Swap in new custom mappings; unchanged sources keep their compiled form.
	pub fn set_field_mappings(&mut self, sources: &BTreeMap<String, MappingSource>, smoke_test: bool) {
		Arc::make_mut(&mut self.registry).rebuild(sources, smoke_test);
	}

	/// The `key` frontmatter value of `doc`.
	async fn document_key(&self, doc: &str) -> Result<String> {
		let fm = self.host.read_frontmatter(doc).await?;
		match fm.get("key").map(marker_text).map(|k| k.trim().to_string()) {
			Some(key) if !key.is_empty() => Ok(key),
			_ => Err(ValidationError::MissingIssueKey.into()),
		}
	}

	/// Send the document's fields to the tracker, creating the issue when the document has no
	/// `key` yet (and writing the new key back). Returns the issue key.
	#[instrument(skip(self))]
	pub async fn push_to_remote(&self, doc: &str) -> Result<String> {
		let text = self.host.read_text(doc).await?;
		let (fm, body) = frontmatter::split(&text).wrap_err_with(|| format!("failed to read frontmatter of {doc}"))?;
		let local = local_snapshot(&fm, body);
		let fields = push_fields(&self.registry, &local);

		let existing = local.get("key").map(marker_text).map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
		if let Some(key) = existing {
			debug!(%key, fields = fields.len(), "updating issue");
			self.client.update_issue(&key, &fields).await?;
			return Ok(key);
		}

		check_required(&fields)?;
		let created = self.client.create_issue(&fields).await?;
		let key = created.key.clone();
		info!(%key, "created issue");
		self.host
			.mutate_frontmatter(
				doc,
				Box::new(move |fm: &mut LocalSnapshot| {
					fm.insert("key".to_string(), Value::String(created.key));
				}),
			)
			.await?;
		self.index.write().await.insert(key.clone(), doc.to_string());
		Ok(key)
	}

	/// Write `issue` into the document as one read-modify-write.
	#[instrument(skip(self, issue), fields(key = %issue.key))]
	pub async fn pull_from_remote(&self, doc: &str, issue: &IssueRecord) -> Result<()> {
		let registry = self.registry.clone();
		let issue = issue.clone();
		self.host.process_document(doc, Box::new(move |text: String| pull_into_text(&registry, &issue, &text))).await
	}

	/// Fetch the document's issue and pull it.
	#[instrument(skip(self))]
	pub async fn fetch_and_pull(&self, doc: &str) -> Result<IssueRecord> {
		let key = self.document_key(doc).await?;
		let issue = self.client.fetch_issue(&key).await?;
		self.pull_from_remote(doc, &issue).await?;
		Ok(issue)
	}

	/// Transitions available for the document's issue.
	pub async fn transitions(&self, doc: &str) -> Result<Vec<Transition>> {
		let key = self.document_key(doc).await?;
		self.client.fetch_transitions(&key).await
	}

	/// Move the document's issue through `transition_id`, then set only the local status to
	/// `status`, without a full pull.
	#[instrument(skip(self))]
	pub async fn transition_status(&self, doc: &str, transition_id: &str, status: &str) -> Result<()> {
		let key = self.document_key(doc).await?;
		self.client.transition_issue(&key, transition_id).await?;
		let status = status.to_string();
		self.host.process_document(doc, Box::new(move |text: String| set_status_in_text(&text, &status))).await
	}

	pub async fn post_work_log_batch(&self, entries: &[WorkLogEntry]) -> BatchReport {
		post_work_log_batch(self.client.as_ref(), entries, self.request_concurrency).await
	}

	/// Post the batch stored under [`worklog::BATCH_KEY`] in the document's frontmatter.
	#[instrument(skip(self))]
	pub async fn post_work_log_batch_from(&self, doc: &str) -> Result<BatchReport> {
		let fm = self.host.read_frontmatter(doc).await?;
		let value = fm.get(worklog::BATCH_KEY).cloned().unwrap_or(Value::Null);
		let entries = work_log_entries_from_frontmatter(&value).wrap_err_with(|| format!("failed to read `{}` from {doc}", worklog::BATCH_KEY))?;
		Ok(self.post_work_log_batch(&entries).await)
	}

	/// Document already holding `key`: the index entry if still valid, else a scan of the issues folder.
	async fn find_document(&self, key: &str) -> Result<Option<String>> {
		let cached = self.index.read().await.get(key).cloned();
		if let Some(path) = cached {
			if self.host.exists(&path).await? && self.document_key(&path).await.is_ok_and(|k| k == key) {
				return Ok(Some(path));
			}
			debug!(%key, %path, "stale index entry");
			self.index.write().await.remove(key);
		}

		let mut found = None;
		for path in self.host.list_documents(&self.import.issues_folder).await? {
			let Ok(doc_key) = self.document_key(&path).await else { continue };
			if doc_key == key && found.is_none() {
				found = Some(path.clone());
			}
			self.index.write().await.entry(doc_key).or_insert(path);
		}
		Ok(found)
	}

	async fn template_text(&self) -> String {
		let Some(template) = self.import.template_path.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
			return DEFAULT_TEMPLATE.to_string();
		};
		let path = match template.ends_with(".md") {
			true => template.to_string(),
			false => format!("{template}.md"),
		};
		match self.host.read_text(&path).await {
			Ok(text) => text,
			Err(e) => {
				warn!(%path, error = %e, "template not readable, using the default");
				DEFAULT_TEMPLATE.to_string()
			}
		}
	}

	async fn create_issue_document(&self, issue: &IssueRecord) -> Result<String> {
		let key = issue.key.clone();
		let text = frontmatter::rewrite(&self.template_text().await, |fm| {
			fm.insert("key".to_string(), json!(key));
		})?;

		let name = filename_from_template(&self.import.filename_template, issue);
		let mut attempt = 1;
		loop {
			let path = document_path(&self.import.issues_folder, &name, attempt);
			attempt += 1;
			if self.host.exists(&path).await? {
				continue;
			}
			// Another import may take the name between the check and the create.
			match self.host.create_document(&path, &text).await {
				Ok(()) => {
					info!(key = %issue.key, %path, "created document");
					return Ok(path);
				}
				Err(e) if e.downcast_ref::<DocumentExists>().is_some() => debug!(%path, "name taken concurrently, trying the next one"),
				Err(e) => return Err(e),
			}
		}
	}

	/// Pull `issue` into its document, creating one in the issues folder if none holds its key.
	/// Returns the document path.
	#[instrument(skip(self, issue), fields(key = %issue.key))]
	pub async fn import_issue(&self, issue: &IssueRecord) -> Result<String> {
		let path = match self.find_document(&issue.key).await? {
			Some(path) => path,
			None => self.create_issue_document(issue).await?,
		};
		self.pull_from_remote(&path, issue).await?;
		self.index.write().await.insert(issue.key.clone(), path.clone());
		Ok(path)
	}

	/// Fetch and import the issue with `key`.
	pub async fn import_by_key(&self, key: &str) -> Result<String> {
		let issue = self.client.fetch_issue(key).await?;
		self.import_issue(&issue).await
	}

	/// Import up to `limit` issues matching `query` (all of them when `None`).
	#[instrument(skip(self))]
	pub async fn import_by_query(&self, query: &str, limit: Option<usize>) -> Result<BatchReport> {
		let probe = self.client.search_by_query(query, Pagination { start_at: 0, max_results: 1 }).await?;
		let wanted = limit.map_or(probe.total, |limit| limit.min(probe.total));
		debug!(total = probe.total, wanted, "query matched");

		let mut issues = Vec::with_capacity(wanted);
		for page in Pagination::pages(wanted) {
			let result = self.client.search_by_query(query, page).await?;
			if result.issues.is_empty() {
				break;
			}
			issues.extend(result.issues);
		}
		issues.truncate(wanted);

		let outcomes: Vec<(String, Result<String>)> = stream::iter(&issues)
			.map(|issue| async move { (issue.key.clone(), self.import_issue(issue).await) })
			.buffered(self.request_concurrency)
			.collect()
			.await;

		let mut report = BatchReport::new(issues.len());
		for (key, outcome) in outcomes {
			match outcome {
				Ok(_) => report.record_success(),
				Err(err) => report.record_failure(err.to_string(), key),
			}
		}
		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		document::{DocumentHost, MemoryDocumentHost, TextEdit},
		tracker::{MockTrackerClient, TrackerClient},
	};

	fn setup(docs: &[(&str, &str)], config: AppConfig) -> (Arc<MockTrackerClient>, Arc<MemoryDocumentHost>, Orchestrator) {
		let mock = Arc::new(MockTrackerClient::default());
		let host = Arc::new(MemoryDocumentHost::with_documents(docs.iter().copied()));
		let orchestrator = Orchestrator::new(mock.clone(), host.clone(), &config);
		(mock, host, orchestrator)
	}

	fn remote_issue(key: &str, summary: &str) -> IssueRecord {
		let fields = json!({
			"summary": summary,
			"project": { "key": "ABC" },
			"issuetype": { "name": "Task" },
			"status": { "name": "To Do" },
			"description": "Some *bold* text"
		});
		IssueRecord {
			self_url: format!("https://jira.example.com/rest/api/2/issue/{key}"),
			..IssueRecord::new(key, fields.as_object().cloned().unwrap_or_default())
		}
	}

	#[tokio::test]
	async fn test_push_creates_and_writes_key_back() {
		let (mock, host, orchestrator) = setup(&[("issues/new.md", "---\nsummary: Fix bug\nproject: ABC\nissuetype: Bug\n---\nbody\n")], AppConfig::default());

		let key = orchestrator.push_to_remote("issues/new.md").await.unwrap();

		assert_eq!(key, "ABC-1");
		assert_eq!(mock.created_payloads(), vec![json!({
			"fields": { "summary": "Fix bug", "project": { "key": "ABC" }, "issuetype": { "name": "Bug" } }
		})]);
		assert_eq!(host.get("issues/new.md").await.unwrap(), "---\nsummary: Fix bug\nproject: ABC\nissuetype: Bug\nkey: ABC-1\n---\nbody\n");
	}

	#[tokio::test]
	async fn test_push_without_required_fields_creates_nothing() {
		let (mock, host, orchestrator) = setup(&[("a.md", "---\nsummary: only a summary\n---\n")], AppConfig::default());

		let err = orchestrator.push_to_remote("a.md").await.unwrap_err();

		assert_eq!(err.downcast_ref::<ValidationError>(), Some(&ValidationError::MissingRequiredFields {
			fields: vec!["project".to_string(), "issuetype".to_string()]
		}));
		assert!(mock.get_call_log().is_empty());
		assert_eq!(host.get("a.md").await.unwrap(), "---\nsummary: only a summary\n---\n");
	}

	#[tokio::test]
	async fn test_push_updates_existing_issue() {
		let (mock, _host, orchestrator) = setup(
			&[("a.md", "---\nkey: ABC-1\nstatus: Done\n---\n`sync-line-priority` High\n`sync-section-description`\n**now** bold\n")],
			AppConfig::default(),
		);
		mock.insert_issue(remote_issue("ABC-1", "Old"));

		orchestrator.push_to_remote("a.md").await.unwrap();

		assert_eq!(mock.get_call_log(), vec![r#"update_issue(ABC-1, {"priority":{"name":"High"},"description":"*now* bold"})"#]);
		assert_eq!(mock.issue("ABC-1").unwrap().fields["description"], "*now* bold");
	}

	#[tokio::test]
	async fn test_fetch_and_pull() {
		let (mock, host, orchestrator) = setup(&[("a.md", "---\nkey: ABC-1\nsummary: stale\n---\n`sync-section-description`\nold\n")], AppConfig::default());
		mock.insert_issue(remote_issue("ABC-1", "Fresh"));

		orchestrator.fetch_and_pull("a.md").await.unwrap();

		assert_eq!(host.get("a.md").await.unwrap(), "---\nkey: ABC-1\nsummary: Fresh\n---\n`sync-section-description`\nSome **bold** text\n");
	}

	#[tokio::test]
	async fn test_transition_updates_local_status_only() {
		let (mock, host, orchestrator) = setup(&[("a.md", "---\nkey: ABC-1\nsummary: mine\nstatus: To Do\n---\n")], AppConfig::default());
		mock.insert_issue(remote_issue("ABC-1", "theirs"));

		let transitions = orchestrator.transitions("a.md").await.unwrap();
		assert_eq!(transitions.iter().map(|t| t.status.as_str()).collect::<Vec<_>>(), vec!["To Do", "In Progress", "Done"]);

		orchestrator.transition_status("a.md", "21", "In Progress").await.unwrap();

		assert_eq!(mock.issue("ABC-1").unwrap().fields["status"], json!({ "name": "In Progress" }));
		assert_eq!(host.get("a.md").await.unwrap(), "---\nkey: ABC-1\nsummary: mine\nstatus: In Progress\n---\n");
	}

	#[tokio::test]
	async fn test_operations_need_a_key() {
		let (mock, _host, orchestrator) = setup(&[("a.md", "---\nsummary: x\n---\n")], AppConfig::default());

		let err = orchestrator.transition_status("a.md", "21", "In Progress").await.unwrap_err();

		assert_eq!(err.downcast_ref::<ValidationError>(), Some(&ValidationError::MissingIssueKey));
		assert!(mock.get_call_log().is_empty());
	}

	#[tokio::test]
	async fn test_work_log_batch_from_document() {
		let doc = "---\njira_worklog_batch:\n- issueKey: ABC-1\n  startTime: 2024-01-15T09:00:00Z\n  duration: 1h\n  comment: review\n- issueKey: ABC-1\n  startTime: 2024-01-15\n  duration: 10s\n---\n";
		let (mock, _host, orchestrator) = setup(&[("log.md", doc)], AppConfig::default());
		mock.insert_issue(remote_issue("ABC-1", "x"));

		let report = orchestrator.post_work_log_batch_from("log.md").await.unwrap();

		assert_eq!(report.to_string(), "1/2 succeeded\nFailed: duration must be at least 1 minute for issues: ABC-1");
		assert_eq!(mock.work_logs()[0].comment, "review");
	}

	#[tokio::test]
	async fn test_import_creates_then_reuses_document() {
		let (mock, host, orchestrator) = setup(&[], AppConfig::default());
		let issue = remote_issue("ABC-7", "Fix: the bug");
		mock.insert_issue(issue.clone());

		let path = orchestrator.import_issue(&issue).await.unwrap();
		assert_eq!(path, "jira-issues/Fix- the bug (ABC-7).md");

		let fm = host.read_frontmatter(&path).await.unwrap();
		assert_eq!(fm["key"], "ABC-7");
		assert_eq!(fm["summary"], "Fix: the bug");
		assert_eq!(fm["status"], "To Do");
		assert_eq!(fm["link"], "https://jira.example.com/browse/ABC-7");
		assert!(host.get(&path).await.unwrap().ends_with("`sync-section-description`\nSome **bold** text"));

		let again = orchestrator.import_issue(&issue).await.unwrap();
		assert_eq!(again, path);
		assert_eq!(host.paths().await, vec![path]);
	}

	#[tokio::test]
	async fn test_import_finds_existing_document_by_key() {
		let (_mock, host, orchestrator) = setup(&[("jira-issues/sub/mine.md", "---\nkey: ABC-7\n---\n")], AppConfig::default());

		let path = orchestrator.import_issue(&remote_issue("ABC-7", "Renamed")).await.unwrap();

		assert_eq!(path, "jira-issues/sub/mine.md");
		assert_eq!(host.get(&path).await.unwrap(), "---\nkey: ABC-7\n---\n");
		assert_eq!(host.paths().await.len(), 1);
	}

	#[tokio::test]
	async fn test_import_deduplicates_file_names() {
		let config = AppConfig {
			filename_template: "{summary}".to_string(),
			..Default::default()
		};
		let (_mock, host, orchestrator) = setup(&[], config);

		orchestrator.import_issue(&remote_issue("ABC-1", "Same")).await.unwrap();
		orchestrator.import_issue(&remote_issue("ABC-2", "Same")).await.unwrap();

		assert_eq!(host.paths().await, vec!["jira-issues/Same (2).md", "jira-issues/Same.md"]);
	}

	/// A store whose `exists` answers from a stale view, as when another import creates the
	/// document between the check and the create.
	struct StaleExistsHost(MemoryDocumentHost);

	#[async_trait::async_trait]
	impl DocumentHost for StaleExistsHost {
		async fn read_text(&self, path: &str) -> Result<String> {
			self.0.read_text(path).await
		}

		async fn process_document(&self, path: &str, edit: TextEdit) -> Result<()> {
			self.0.process_document(path, edit).await
		}

		async fn create_document(&self, path: &str, text: &str) -> Result<()> {
			self.0.create_document(path, text).await
		}

		async fn exists(&self, _path: &str) -> Result<bool> {
			Ok(false)
		}

		async fn list_documents(&self, folder: &str) -> Result<Vec<String>> {
			self.0.list_documents(folder).await
		}
	}

	#[tokio::test]
	async fn test_import_takes_next_name_when_create_loses_race() {
		let config = AppConfig {
			filename_template: "{summary}".to_string(),
			..Default::default()
		};
		let mock = Arc::new(MockTrackerClient::default());
		let host = Arc::new(StaleExistsHost(MemoryDocumentHost::with_documents([("jira-issues/Same.md", "---\nkey: ABC-1\n---\n")])));
		let orchestrator = Orchestrator::new(mock, host.clone(), &config);

		let path = orchestrator.import_issue(&remote_issue("ABC-2", "Same")).await.unwrap();

		assert_eq!(path, "jira-issues/Same (2).md");
		assert_eq!(host.0.get("jira-issues/Same.md").await.unwrap(), "---\nkey: ABC-1\n---\n");
		assert_eq!(host.0.read_frontmatter(&path).await.unwrap()["key"], "ABC-2");
	}

	#[tokio::test]
	async fn test_import_uses_template_document() {
		let config = AppConfig {
			template_path: Some("templates/issue".to_string()),
			..Default::default()
		};
		let (_mock, host, orchestrator) = setup(&[("templates/issue.md", "---\nsummary:\n---\n# `sync-inline-start-summary``sync-inline-end-summary`\n")], config);

		let path = orchestrator.import_issue(&remote_issue("ABC-1", "Templated")).await.unwrap();

		assert_eq!(host.get(&path).await.unwrap(), "---\nsummary: Templated\nkey: ABC-1\n---\n# `sync-inline-start-summary`Templated`sync-inline-end-summary`\n");
	}

	#[tokio::test]
	async fn test_import_by_query_pages_and_limits() {
		let (mock, host, orchestrator) = setup(&[], AppConfig::default());
		for n in 1..=3 {
			mock.insert_issue(remote_issue(&format!("ABC-{n}"), &format!("Issue {n}")));
		}

		let report = orchestrator.import_by_query("project = ABC", Some(2)).await.unwrap();

		assert_eq!(report, BatchReport { total: 2, succeeded: 2, failures: vec![] });
		assert_eq!(host.paths().await.len(), 2);
		assert_eq!(mock.get_call_log(), vec!["search_by_query(project = ABC, 0, 1)", "search_by_query(project = ABC, 0, 2)"]);
	}

	#[tokio::test]
	async fn test_set_field_mappings_applies_to_push() {
		let (mock, _host, mut orchestrator) = setup(&[("a.md", "---\nkey: ABC-1\nsummary: lower\n---\n")], AppConfig::default());
		mock.insert_issue(remote_issue("ABC-1", "x"));

		let sources = BTreeMap::from([("summary".to_string(), MappingSource {
			to_remote: "value.toUpperCase()".to_string(),
			from_remote: String::new(),
		})]);
		orchestrator.set_field_mappings(&sources, true);
		orchestrator.push_to_remote("a.md").await.unwrap();

		let updated = mock.fetch_issue("ABC-1").await.unwrap();
		assert_eq!(updated.fields.get("summary"), Some(&json!("LOWER")));
	}

	#[test]
	fn test_report_groups_by_reason() {
		let mut report = BatchReport::new(4);
		report.record_success();
		report.record_failure("a".to_string(), "K-1".to_string());
		report.record_failure("b".to_string(), "K-2".to_string());
		report.record_failure("a".to_string(), "K-3".to_string());
		assert_eq!(report.failed(), 3);
		assert_eq!(report.failures[0], FailureGroup {
			reason: "a".to_string(),
			issue_keys: vec!["K-1".to_string(), "K-3".to_string()],
		});
		assert_eq!(report.to_string(), "1/4 succeeded\nFailed: a for issues: K-1, K-3\nFailed: b for issues: K-2");
	}
}
