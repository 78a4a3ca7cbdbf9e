use async_trait::async_trait;
use color_eyre::eyre::{Result, bail};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::TrackerClient;
use crate::{
	config::AppConfig,
	error::RemoteRequestError,
	issue::{IssueRecord, Pagination, SearchPage, Transition},
};

//==============================================================================
// HTTP Tracker Client Implementation
//==============================================================================

#[derive(Clone, Debug)]
enum Credentials {
	Token(String),
	Session { username: String, password: String, cookie_name: String },
}

/// REST v2 client. Session-authenticated clients log in lazily and retry once after a 401.
pub struct HttpTrackerClient {
	http_client: Client,
	base_url: String,
	credentials: Credentials,
	session: RwLock<Option<String>>,
}

#[derive(Deserialize)]
struct CreatedIssue {
	key: String,
}

#[derive(Deserialize)]
struct RawTransition {
	id: String,
	name: String,
	to: RawStatus,
}

#[derive(Deserialize)]
struct RawStatus {
	name: String,
}

#[derive(Deserialize)]
struct TransitionsResponse {
	transitions: Vec<RawTransition>,
}

#[derive(Deserialize)]
struct SessionResponse {
	session: SessionInfo,
}

#[derive(Deserialize)]
struct SessionInfo {
	#[serde(default)]
	name: Option<String>,
	value: String,
}

impl HttpTrackerClient {
	pub fn new(config: &AppConfig) -> Result<Self> {
		let base_url = config.tracker_url()?.to_string();
		let credentials = match config.api_token.as_deref().filter(|t| !t.is_empty()) {
			Some(token) => Credentials::Token(token.to_string()),
			None => {
				if config.username.is_empty() || config.password.is_empty() {
					bail!("either `api_token` or both `username` and `password` must be configured");
				}
				Credentials::Session {
					username: config.username.clone(),
					password: config.password.clone(),
					cookie_name: config.session_cookie_name.clone(),
				}
			}
		};

		Ok(Self {
			http_client: Client::new(),
			base_url,
			credentials,
			session: RwLock::new(None),
		})
	}

	fn api_url(&self, path: &str) -> String {
		format!("{}/rest/api/2{path}", self.base_url)
	}

	async fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
		let req = req.header("Content-Type", "application/json").header("Origin", &self.base_url);
		match &self.credentials {
			Credentials::Token(token) => req.bearer_auth(token),
			Credentials::Session { .. } => match self.session.read().await.as_deref() {
				Some(cookie) => req.header("Cookie", cookie),
				None => req,
			},
		}
	}

	/// Log in and store the session cookie.
	#[instrument(skip(self))]
	async fn authenticate(&self) -> Result<()> {
		let Credentials::Session { username, password, cookie_name } = &self.credentials else {
			return Err(RemoteRequestError::Authentication {
				message: "the API token was rejected".to_string(),
			}
			.into());
		};

		let res = self
			.http_client
			.post(format!("{}/rest/auth/1/session", self.base_url))
			.header("Origin", &self.base_url)
			.json(&json!({ "username": username, "password": password }))
			.send()
			.await
			.map_err(transport)?;

		if !res.status().is_success() {
			let status = res.status();
			let body = res.text().await.unwrap_or_default();
			return Err(RemoteRequestError::Authentication {
				message: format!("{status} - {body}"),
			}
			.into());
		}

		let SessionResponse { session } = res.json().await.map_err(decode)?;
		let name = session.name.unwrap_or_else(|| cookie_name.clone());
		*self.session.write().await = Some(format!("{name}={}", session.value));
		debug!("authenticated");
		Ok(())
	}

	/// Send, re-authenticating and retrying once on 401. Non-2xx responses become
	/// [`RemoteRequestError::Status`] carrying the response body.
	async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response> {
		let url = self.api_url(path);
		let build = || {
			let req = self.http_client.request(method.clone(), &url);
			match body {
				Some(body) => req.json(body),
				None => req,
			}
		};

		let mut res = self.authorized(build()).await.send().await.map_err(transport)?;
		if res.status() == StatusCode::UNAUTHORIZED {
			warn!(%method, path, "unauthorized, re-authenticating");
			self.authenticate().await?;
			res = self.authorized(build()).await.send().await.map_err(transport)?;
		}

		if !res.status().is_success() {
			let status = res.status();
			let body = res.text().await.unwrap_or_default();
			return Err(RemoteRequestError::Status { status: status.as_u16(), body }.into());
		}
		Ok(res)
	}

	async fn send_json<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<&Value>) -> Result<T> {
		let res = self.send(method, path, body).await?;
		Ok(res.json::<T>().await.map_err(decode)?)
	}
}

fn transport(e: reqwest::Error) -> RemoteRequestError {
	RemoteRequestError::Transport { message: e.to_string() }
}

fn decode(e: reqwest::Error) -> RemoteRequestError {
	RemoteRequestError::Decode { message: e.to_string() }
}

#[async_trait]
impl TrackerClient for HttpTrackerClient {
	#[instrument(skip(self))]
	async fn fetch_issue(&self, key: &str) -> Result<IssueRecord> {
		self.send_json(Method::GET, &format!("/issue/{key}"), None).await
	}

	#[instrument(skip(self, fields))]
	async fn create_issue(&self, fields: &Map<String, Value>) -> Result<IssueRecord> {
		let created: CreatedIssue = self.send_json(Method::POST, "/issue", Some(&json!({ "fields": fields }))).await?;
		debug!(key = %created.key, "created issue");
		self.fetch_issue(&created.key).await
	}

	#[instrument(skip(self, fields))]
	async fn update_issue(&self, key: &str, fields: &Map<String, Value>) -> Result<IssueRecord> {
		// Answers 204 with no body
		self.send(Method::PUT, &format!("/issue/{key}"), Some(&json!({ "fields": fields }))).await?;
		self.fetch_issue(key).await
	}

	#[instrument(skip(self))]
	async fn fetch_transitions(&self, key: &str) -> Result<Vec<Transition>> {
		let res: TransitionsResponse = self.send_json(Method::GET, &format!("/issue/{key}/transitions"), None).await?;
		Ok(res
			.transitions
			.into_iter()
			.map(|t| Transition {
				id: t.id,
				action: t.name,
				status: t.to.name,
			})
			.collect())
	}

	#[instrument(skip(self))]
	async fn transition_issue(&self, key: &str, transition_id: &str) -> Result<()> {
		self.send(Method::POST, &format!("/issue/{key}/transitions"), Some(&json!({ "transition": { "id": transition_id } })))
			.await?;
		Ok(())
	}

	#[instrument(skip(self, comment))]
	async fn post_work_log(&self, key: &str, time_spent: &str, started: &str, comment: &str) -> Result<()> {
		let payload = json!({ "timeSpent": time_spent, "started": started, "comment": comment });
		self.send(Method::POST, &format!("/issue/{key}/worklog"), Some(&payload)).await?;
		Ok(())
	}

	#[instrument(skip(self))]
	async fn search_by_query(&self, query: &str, page: Pagination) -> Result<SearchPage> {
		let body = json!({ "jql": query, "startAt": page.start_at, "maxResults": page.max_results });
		self.send_json(Method::POST, "/search", Some(&body)).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(token: Option<&str>) -> AppConfig {
		AppConfig {
			tracker_url: "https://jira.example.com/".to_string(),
			username: "alice".to_string(),
			password: "secret".to_string(),
			api_token: token.map(str::to_string),
			..Default::default()
		}
	}

	#[test]
	fn test_api_url() {
		let client = HttpTrackerClient::new(&config(None)).unwrap();
		assert_eq!(client.api_url("/issue/ABC-1"), "https://jira.example.com/rest/api/2/issue/ABC-1");
	}

	#[test]
	fn test_credentials_choice() {
		assert!(matches!(HttpTrackerClient::new(&config(Some("tok"))).unwrap().credentials, Credentials::Token(_)));
		assert!(matches!(HttpTrackerClient::new(&config(None)).unwrap().credentials, Credentials::Session { .. }));

		let anonymous = AppConfig {
			tracker_url: "https://jira.example.com".to_string(),
			..Default::default()
		};
		assert!(HttpTrackerClient::new(&anonymous).is_err());
		assert!(HttpTrackerClient::new(&AppConfig::default()).is_err());
	}

	#[test]
	fn test_transitions_response_shape() {
		let raw: TransitionsResponse = serde_json::from_value(json!({
			"expand": "transitions",
			"transitions": [{ "id": "21", "name": "Start Progress", "to": { "name": "In Progress", "id": "3" } }]
		}))
		.unwrap();
		assert_eq!(raw.transitions[0].to.name, "In Progress");
	}
}
