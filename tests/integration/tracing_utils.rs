//! Utilities for capturing and verifying tracing output in integration tests.
//!
//! The same JSON layout the binary writes to `JIRA_SYNC_TRACE_FILE` is captured in memory here.
//! The mock tracker emits `tracing::info!` events with target "mock_tracker" named after the
//! called method, which `has_mock_call` looks for.

use std::{
	future::Future,
	io,
	sync::{Arc, Mutex},
};

use serde::Deserialize;
use tracing::Level;

/// A single trace event from the JSON log
#[derive(Debug, Deserialize)]
pub struct TraceEvent {
	pub level: String,
	pub target: String,
	pub fields: TraceFields,
}

#[derive(Debug, Deserialize)]
pub struct TraceFields {
	pub message: Option<String>,
	/// Issue key (most tracker calls)
	pub key: Option<String>,
	/// Create payload (create_issue)
	pub payload: Option<String>,
	/// Search query (search_by_query)
	pub query: Option<String>,
	/// Field name (mapping warnings)
	pub field: Option<String>,
}

/// Parsed trace log that provides verification methods
pub struct TraceLog {
	events: Vec<TraceEvent>,
}

impl TraceLog {
	pub fn from_bytes(bytes: &[u8]) -> Self {
		let content = String::from_utf8_lossy(bytes);
		let events = content.lines().filter(|line| !line.is_empty()).filter_map(|line| serde_json::from_str(line).ok()).collect();
		Self { events }
	}

	pub fn has_mock_call(&self, method_name: &str) -> bool {
		self.mock_calls().iter().any(|e| e.fields.message.as_deref() == Some(method_name))
	}

	pub fn has_mock_call_for(&self, method_name: &str, key: &str) -> bool {
		self.mock_calls()
			.iter()
			.any(|e| e.fields.message.as_deref() == Some(method_name) && e.fields.key.as_deref() == Some(key))
	}

	pub fn mock_calls(&self) -> Vec<&TraceEvent> {
		self.events.iter().filter(|e| e.target == "mock_tracker").collect()
	}

	pub fn warnings(&self) -> Vec<&TraceEvent> {
		self.events.iter().filter(|e| e.level == "WARN").collect()
	}
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
	fn contents(&self) -> Vec<u8> {
		self.0.lock().unwrap().clone()
	}
}

impl io::Write for SharedBuf {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.lock().unwrap().extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

fn json_subscriber(buf: &SharedBuf) -> impl tracing::Subscriber + Send + Sync {
	let writer = buf.clone();
	tracing_subscriber::fmt().json().with_max_level(Level::DEBUG).with_writer(move || writer.clone()).finish()
}

/// Run `f` with every event on this thread recorded.
pub fn capture_sync<T>(f: impl FnOnce() -> T) -> (T, TraceLog) {
	let buf = SharedBuf::default();
	let output = tracing::subscriber::with_default(json_subscriber(&buf), f);
	(output, TraceLog::from_bytes(&buf.contents()))
}

/// Await `fut` with every event on this thread recorded. Needs a current-thread runtime.
pub async fn capture<F: Future>(fut: F) -> (F::Output, TraceLog) {
	let buf = SharedBuf::default();
	let output = {
		let _guard = tracing::subscriber::set_default(json_subscriber(&buf));
		fut.await
	};
	(output, TraceLog::from_bytes(&buf.contents()))
}

/// Assert that a mock method was called
#[macro_export]
macro_rules! assert_traced {
	($log:expr, $method:expr) => {
		assert!(
			$log.has_mock_call($method),
			"Expected mock call '{}' to be traced, but it wasn't. Mock calls:\n{:#?}",
			$method,
			$log.mock_calls()
		);
	};
	($log:expr, $method:expr, $key:expr) => {
		assert!(
			$log.has_mock_call_for($method, $key),
			"Expected mock call '{}' for key='{}' to be traced, but it wasn't. Mock calls:\n{:#?}",
			$method,
			$key,
			$log.mock_calls()
		);
	};
}
