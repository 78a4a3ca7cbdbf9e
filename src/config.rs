//! Settings, layered: built-in defaults, then the TOML file, then `JIRA_SYNC__<FIELD>` environment
//! variables.

use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
};

use color_eyre::eyre::{Result, bail};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use tracing::debug;

use crate::mapping::MappingSource;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct AppConfig {
	/// Base URL of the tracker, e.g. `https://jira.example.com`.
	pub tracker_url: String,
	pub username: String,
	pub password: String,
	/// When set, sent as a bearer token instead of logging in for a session cookie.
	pub api_token: Option<String>,
	#[default = "JSESSIONID"]
	pub session_cookie_name: String,
	/// Directory all document paths are relative to.
	#[default(_code = "PathBuf::from(\".\")")]
	pub vault_root: PathBuf,
	#[default = "jira-issues"]
	pub issues_folder: String,
	/// Document used as the starting content of imported issues. `.md` is appended if missing.
	pub template_path: Option<String>,
	#[default = "{summary} ({key})"]
	pub filename_template: String,
	/// Smoke-test custom mappings against a placeholder issue when compiling them.
	#[default = true]
	pub enable_field_validation: bool,
	/// Upper bound on tracker requests in flight during batch operations.
	#[default = 5]
	pub request_concurrency: usize,
	pub field_mappings: BTreeMap<String, MappingSource>,
}

impl AppConfig {
	/// Load from `path`, or from `$XDG_CONFIG_HOME/jira_sync/config.toml` when it exists.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let file = match path {
			Some(path) => {
				if !path.exists() {
					bail!("config file not found: {}", path.display());
				}
				Some(path.to_path_buf())
			}
			None => xdg::BaseDirectories::with_prefix("jira_sync").find_config_file("config.toml"),
		};
		Self::load_from(file.as_deref(), Environment::with_prefix("JIRA_SYNC").separator("__"))
	}

	fn load_from(file: Option<&Path>, env: Environment) -> Result<Self> {
		let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
		if let Some(file) = file {
			debug!(path = %file.display(), "reading config file");
			builder = builder.add_source(File::from(file).format(FileFormat::Toml));
		}
		let config: Self = builder.add_source(env).build()?.try_deserialize()?;
		if config.request_concurrency == 0 {
			bail!("request_concurrency must be at least 1");
		}
		Ok(config)
	}

	pub fn tracker_url(&self) -> Result<&str> {
		let url = self.tracker_url.trim_end_matches('/');
		if url.is_empty() {
			bail!("`tracker_url` is not configured. Set it in the config file or via JIRA_SYNC__TRACKER_URL");
		}
		Ok(url)
	}
}
