//! Shared test infrastructure for integration tests.
//!
//! Provides `TestContext`: a temporary vault on disk, an in-memory tracker, and an orchestrator
//! wired to both.
//!
//! # Example
//!
//! ```ignore
//! let ctx = TestContext::new(r#"
//! //- /jira-issues/a.md
//! ---
//! key: ABC-1
//! ---
//! "#);
//!
//! ctx.orchestrator.fetch_and_pull("jira-issues/a.md").await?;
//! ```

use std::{
	fs,
	path::{Path, PathBuf},
	sync::Arc,
};

use jira_sync::{AppConfig, IssueRecord, Orchestrator, document::FsDocumentHost, tracker::MockTrackerClient};
use serde_json::Value;
use tempfile::TempDir;

pub struct TestContext {
	pub dir: TempDir,
	pub tracker: Arc<MockTrackerClient>,
	pub orchestrator: Orchestrator,
}

impl TestContext {
	/// Create a vault from a fixture string.
	///
	/// Each file starts with a `//- /relative/path` line; the lines up to the next header are its
	/// content.
	pub fn new(fixture: &str) -> Self {
		Self::with_config(fixture, AppConfig::default())
	}

	pub fn with_config(fixture: &str, config: AppConfig) -> Self {
		let dir = tempfile::tempdir().unwrap();
		for (path, content) in parse_fixture(fixture) {
			write_file(dir.path(), &path, &content);
		}

		let tracker = Arc::new(MockTrackerClient::default());
		let host = Arc::new(FsDocumentHost::new(dir.path()));
		let orchestrator = Orchestrator::new(tracker.clone(), host, &config);
		Self { dir, tracker, orchestrator }
	}

	pub fn read(&self, path: &str) -> String {
		fs::read_to_string(self.dir.path().join(path)).unwrap_or_else(|e| panic!("failed to read {path}: {e}"))
	}

	pub fn write(&self, path: &str, content: &str) {
		write_file(self.dir.path(), path, content);
	}

	/// Every file in the vault, relative and sorted.
	pub fn files(&self) -> Vec<String> {
		let mut files = Vec::new();
		collect_files(self.dir.path(), self.dir.path(), &mut files);
		files.sort();
		files
	}

	/// Store an issue in the mock tracker.
	pub fn remote_issue(&self, key: &str, fields: Value) -> IssueRecord {
		self.tracker.insert_issue(IssueRecord::new(key, fields.as_object().cloned().unwrap()));
		self.tracker.issue(key).unwrap()
	}
}

fn parse_fixture(fixture: &str) -> Vec<(String, String)> {
	let mut files: Vec<(String, String)> = Vec::new();
	for line in fixture.trim_start_matches('\n').lines() {
		match line.strip_prefix("//- /") {
			Some(path) => files.push((path.trim().to_string(), String::new())),
			None => {
				let (_, content) = files.last_mut().expect("fixture content before the first `//- /path` header");
				content.push_str(line);
				content.push('\n');
			}
		}
	}
	files
}

fn write_file(root: &Path, path: &str, content: &str) {
	let full: PathBuf = root.join(path);
	if let Some(parent) = full.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	fs::write(full, content).unwrap();
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) {
	for entry in fs::read_dir(dir).unwrap() {
		let path = entry.unwrap().path();
		if path.is_dir() {
			collect_files(root, &path, out);
		} else {
			out.push(path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"));
		}
	}
}
