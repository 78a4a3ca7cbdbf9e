//! Error types for synchronization and expression compilation.
//!
//! Uses miette for diagnostics. Operation-level code wraps these into `eyre::Report`,
//! so callers can still `downcast_ref` to the concrete kind.

#![allow(unused_assignments)] // Fields are read by miette's derive macro via attributes

use miette::Diagnostic;

/// Input was rejected before any network call was made.
#[derive(Clone, Debug, Diagnostic, Eq, PartialEq, thiserror::Error)]
pub enum ValidationError {
	#[error("missing required fields for issue creation: {}", fields.join(", "))]
	#[diagnostic(code(jira_sync::validation::missing_required), help("set `summary`, `project` and `issuetype` in the frontmatter or in sync markers"))]
	MissingRequiredFields { fields: Vec<String> },

	#[error("no issue key found in frontmatter")]
	#[diagnostic(code(jira_sync::validation::missing_key), help("pull or create the issue first, so that `key` is written to the frontmatter"))]
	MissingIssueKey,

	// Messages of the work log variants double as batch failure reasons, so they leave the input out.
	#[error("duration must be at least 1 minute")]
	#[diagnostic(code(jira_sync::validation::duration), help("got {input:?}; durations look like `1w 2d 3h 30m`"))]
	InvalidDuration { input: String },

	#[error("invalid start time format")]
	#[diagnostic(code(jira_sync::validation::start_time), help("got {input:?}; use RFC 3339 (`2024-01-15T09:00:00Z`) or a civil date-time (`2024-01-15 09:00`)"))]
	InvalidStartTime { input: String },

	#[error("missing required fields")]
	#[diagnostic(code(jira_sync::validation::work_log_fields), help("each work log entry needs `issueKey`, `startTime` and `duration`"))]
	MissingWorkLogFields,
}

/// A user expression could not be turned into a mapping function.
#[derive(Clone, Debug, Diagnostic, Eq, PartialEq, thiserror::Error)]
pub enum CompileError {
	#[error("forbidden token `{token}`")]
	#[diagnostic(code(jira_sync::compile::forbidden))]
	Forbidden { token: String },

	#[error("syntax error at offset {offset}: {message}")]
	#[diagnostic(code(jira_sync::compile::syntax))]
	Syntax { message: String, offset: usize },

	#[error("unknown identifier `{name}`")]
	#[diagnostic(code(jira_sync::compile::unknown_identifier), help("only the function parameters and the built-in helpers are in scope"))]
	UnknownIdentifier { name: String },

	#[error("expression nests too deeply")]
	#[diagnostic(code(jira_sync::compile::too_deep))]
	TooDeep,

	#[error("smoke test failed: {message}")]
	#[diagnostic(code(jira_sync::compile::smoke_test), help("the expression failed when run against a placeholder issue"))]
	SmokeTest { message: String },
}

/// Runtime failure inside a compiled expression.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct EvalError(pub String);

/// The tracker answered with an error, or could not be reached.
#[derive(Clone, Debug, Diagnostic, Eq, PartialEq, thiserror::Error)]
pub enum RemoteRequestError {
	#[error("request failed with status {status}: {body}")]
	#[diagnostic(code(jira_sync::remote::status))]
	Status { status: u16, body: String },

	#[error("transport error: {message}")]
	#[diagnostic(code(jira_sync::remote::transport))]
	Transport { message: String },

	#[error("authentication failed: {message}")]
	#[diagnostic(code(jira_sync::remote::authentication), help("check `username`, `password` and `tracker_url` in the config"))]
	Authentication { message: String },

	#[error("could not decode response: {message}")]
	#[diagnostic(code(jira_sync::remote::decode))]
	Decode { message: String },

	#[error("not found: {what}")]
	#[diagnostic(code(jira_sync::remote::not_found))]
	NotFound { what: String },
}

/// The note store refused to create a document.
#[derive(Clone, Debug, Diagnostic, Eq, PartialEq, thiserror::Error)]
#[error("document already exists: {path}")]
#[diagnostic(code(jira_sync::document::exists))]
pub struct DocumentExists {
	pub path: String,
}
