//! The issue tracker, as seen by the orchestrator.

mod http;
mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use color_eyre::eyre::Result;
pub use http::HttpTrackerClient;
pub use mock::{MockTrackerClient, WorkLogCall};
use serde_json::{Map, Value};

use crate::{
	config::AppConfig,
	issue::{IssueRecord, Pagination, SearchPage, Transition},
};

//==============================================================================
// Tracker Client Trait
//==============================================================================

/// Every remote operation the sync layer needs.
/// Implemented over HTTP for real use and in memory for tests.
#[async_trait]
pub trait TrackerClient: Send + Sync {
	/// Fetch a single issue by key
	async fn fetch_issue(&self, key: &str) -> Result<IssueRecord>;

	/// Create an issue from a field bag, returning the stored record
	async fn create_issue(&self, fields: &Map<String, Value>) -> Result<IssueRecord>;

	/// Write `fields` onto an existing issue, returning the updated record
	async fn update_issue(&self, key: &str, fields: &Map<String, Value>) -> Result<IssueRecord>;

	/// Workflow transitions available from the issue's current status
	async fn fetch_transitions(&self, key: &str) -> Result<Vec<Transition>>;

	/// Move the issue through the transition with `transition_id`
	async fn transition_issue(&self, key: &str, transition_id: &str) -> Result<()>;

	/// Log time against an issue. `time_spent` is in duration-token form (`1h 30m`),
	/// `started` in the tracker's timestamp format.
	async fn post_work_log(&self, key: &str, time_spent: &str, started: &str, comment: &str) -> Result<()>;

	/// One page of the issues matching `query`
	async fn search_by_query(&self, query: &str, page: Pagination) -> Result<SearchPage>;
}

pub type BoxedTrackerClient = Arc<dyn TrackerClient>;

/// Create the HTTP client from config.
/// Returns an error if the tracker URL is not configured.
pub fn create_client(config: &AppConfig) -> Result<BoxedTrackerClient> {
	Ok(Arc::new(HttpTrackerClient::new(config)?))
}
