//! In-memory tracker for tests.
//!
//! Every call is recorded in a call log and emitted as a `tracing::info!` event with target
//! `mock_tracker`, so tests can assert on what the sync layer sent.

use std::{
	collections::{BTreeMap, HashMap, HashSet},
	sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use color_eyre::eyre::Result;
use serde_json::{Map, Value, json};
use tracing::instrument;

use super::TrackerClient;
use crate::{
	error::RemoteRequestError,
	issue::{IssueRecord, Pagination, SearchPage, Transition},
};

/// A work log as the mock received it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkLogCall {
	pub key: String,
	pub time_spent: String,
	pub started: String,
	pub comment: String,
}

/// Tracker that stores all state in memory.
pub struct MockTrackerClient {
	base_url: String,

	/// Issues by key
	issues: Mutex<BTreeMap<String, IssueRecord>>,

	/// Next issue number, per project key
	counters: Mutex<HashMap<String, u64>>,

	/// Transitions offered per issue key; issues without an entry get [`MockTrackerClient::default_transitions`]
	transitions: Mutex<HashMap<String, Vec<Transition>>>,

	/// Keys whose work log posts are rejected
	rejecting: Mutex<HashSet<String>>,

	work_logs: Mutex<Vec<WorkLogCall>>,

	/// `{"fields": ..}` bodies of every create request
	created_payloads: Mutex<Vec<Value>>,

	/// Call log for assertions
	call_log: Mutex<Vec<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
	m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found(key: &str) -> color_eyre::eyre::Report {
	RemoteRequestError::NotFound { what: format!("issue {key}") }.into()
}

impl Default for MockTrackerClient {
	fn default() -> Self {
		Self::new("https://jira.example.com")
	}
}

impl MockTrackerClient {
	pub fn new(base_url: &str) -> Self {
		Self {
			base_url: base_url.trim_end_matches('/').to_string(),
			issues: Mutex::new(BTreeMap::new()),
			counters: Mutex::new(HashMap::new()),
			transitions: Mutex::new(HashMap::new()),
			rejecting: Mutex::new(HashSet::new()),
			work_logs: Mutex::new(Vec::new()),
			created_payloads: Mutex::new(Vec::new()),
			call_log: Mutex::new(Vec::new()),
		}
	}

	pub fn default_transitions() -> Vec<Transition> {
		[("11", "To Do", "To Do"), ("21", "Start Progress", "In Progress"), ("31", "Done", "Done")]
			.into_iter()
			.map(|(id, action, status)| Transition {
				id: id.to_string(),
				action: action.to_string(),
				status: status.to_string(),
			})
			.collect()
	}

	/// Store `issue`, filling in `self` from the key if it is empty.
	pub fn insert_issue(&self, mut issue: IssueRecord) {
		if issue.self_url.is_empty() {
			issue.self_url = format!("{}/rest/api/2/issue/{}", self.base_url, issue.key);
		}
		lock(&self.issues).insert(issue.key.clone(), issue);
	}

	pub fn issue(&self, key: &str) -> Option<IssueRecord> {
		lock(&self.issues).get(key).cloned()
	}

	pub fn set_transitions(&self, key: &str, transitions: Vec<Transition>) {
		lock(&self.transitions).insert(key.to_string(), transitions);
	}

	/// Make work log posts to `key` fail with a 400.
	pub fn reject_work_logs_for(&self, key: &str) {
		lock(&self.rejecting).insert(key.to_string());
	}

	pub fn work_logs(&self) -> Vec<WorkLogCall> {
		lock(&self.work_logs).clone()
	}

	pub fn created_payloads(&self) -> Vec<Value> {
		lock(&self.created_payloads).clone()
	}

	pub fn get_call_log(&self) -> Vec<String> {
		lock(&self.call_log).clone()
	}

	fn log_call(&self, call: &str) {
		lock(&self.call_log).push(call.to_string());
	}

	fn next_key(&self, project: &str) -> String {
		let mut counters = lock(&self.counters);
		let n = counters.entry(project.to_string()).or_insert(0);
		*n += 1;
		format!("{project}-{n}")
	}
}

#[async_trait]
impl TrackerClient for MockTrackerClient {
	#[instrument(skip(self), name = "MockTrackerClient::fetch_issue")]
	async fn fetch_issue(&self, key: &str) -> Result<IssueRecord> {
		tracing::info!(target: "mock_tracker", key, "fetch_issue");
		self.log_call(&format!("fetch_issue({key})"));
		self.issue(key).ok_or_else(|| not_found(key))
	}

	#[instrument(skip(self, fields), name = "MockTrackerClient::create_issue")]
	async fn create_issue(&self, fields: &Map<String, Value>) -> Result<IssueRecord> {
		let payload = json!({ "fields": fields });
		tracing::info!(target: "mock_tracker", payload = %payload, "create_issue");
		self.log_call(&format!("create_issue({payload})"));
		lock(&self.created_payloads).push(payload);

		let project = fields.get("project").and_then(|p| p.get("key")).and_then(Value::as_str).unwrap_or("MOCK");
		let key = self.next_key(project);
		let mut stored = fields.clone();
		stored.entry("status").or_insert_with(|| json!({ "name": "To Do" }));
		self.insert_issue(IssueRecord::new(key.clone(), stored));
		self.issue(&key).ok_or_else(|| not_found(&key))
	}

	#[instrument(skip(self, fields), name = "MockTrackerClient::update_issue")]
	async fn update_issue(&self, key: &str, fields: &Map<String, Value>) -> Result<IssueRecord> {
		let fields_json = Value::Object(fields.clone());
		tracing::info!(target: "mock_tracker", key, fields = %fields_json, "update_issue");
		self.log_call(&format!("update_issue({key}, {fields_json})"));

		let mut issues = lock(&self.issues);
		let issue = issues.get_mut(key).ok_or_else(|| not_found(key))?;
		issue.fields.extend(fields.clone());
		Ok(issue.clone())
	}

	#[instrument(skip(self), name = "MockTrackerClient::fetch_transitions")]
	async fn fetch_transitions(&self, key: &str) -> Result<Vec<Transition>> {
		tracing::info!(target: "mock_tracker", key, "fetch_transitions");
		self.log_call(&format!("fetch_transitions({key})"));
		if self.issue(key).is_none() {
			return Err(not_found(key));
		}
		Ok(lock(&self.transitions).get(key).cloned().unwrap_or_else(Self::default_transitions))
	}

	#[instrument(skip(self), name = "MockTrackerClient::transition_issue")]
	async fn transition_issue(&self, key: &str, transition_id: &str) -> Result<()> {
		tracing::info!(target: "mock_tracker", key, transition_id, "transition_issue");
		self.log_call(&format!("transition_issue({key}, {transition_id})"));

		let transitions = self.fetch_transitions(key).await?;
		let Some(transition) = transitions.into_iter().find(|t| t.id == transition_id) else {
			return Err(RemoteRequestError::Status {
				status: 400,
				body: format!("transition {transition_id} is not valid for {key}"),
			}
			.into());
		};
		let mut issues = lock(&self.issues);
		let issue = issues.get_mut(key).ok_or_else(|| not_found(key))?;
		issue.fields.insert("status".to_string(), json!({ "name": transition.status }));
		Ok(())
	}

	#[instrument(skip(self, comment), name = "MockTrackerClient::post_work_log")]
	async fn post_work_log(&self, key: &str, time_spent: &str, started: &str, comment: &str) -> Result<()> {
		tracing::info!(target: "mock_tracker", key, time_spent, started, "post_work_log");
		self.log_call(&format!("post_work_log({key}, {time_spent}, {started})"));

		if lock(&self.rejecting).contains(key) {
			return Err(RemoteRequestError::Status {
				status: 400,
				body: "work log rejected".to_string(),
			}
			.into());
		}
		if self.issue(key).is_none() {
			return Err(not_found(key));
		}
		lock(&self.work_logs).push(WorkLogCall {
			key: key.to_string(),
			time_spent: time_spent.to_string(),
			started: started.to_string(),
			comment: comment.to_string(),
		});
		Ok(())
	}

	/// The query is not interpreted: every stored issue matches, in key order.
	#[instrument(skip(self), name = "MockTrackerClient::search_by_query")]
	async fn search_by_query(&self, query: &str, page: Pagination) -> Result<SearchPage> {
		tracing::info!(target: "mock_tracker", query, start_at = page.start_at, max_results = page.max_results, "search_by_query");
		self.log_call(&format!("search_by_query({query}, {}, {})", page.start_at, page.max_results));

		let issues = lock(&self.issues);
		Ok(SearchPage {
			total: issues.len(),
			issues: issues.values().skip(page.start_at).take(page.max_results).cloned().collect(),
		})
	}
}
