//! Two-way sync between markdown notes and an issue tracker.
//!
//! Notes carry issue fields in their YAML frontmatter and in inline sync markers; the tracker
//! speaks wiki markup. [`sync::Orchestrator`] pushes, pulls, transitions and logs work, with
//! [`mapping::FieldMappingRegistry`] deciding how each field crosses over.

pub mod config;
pub mod document;
pub mod error;
pub mod expr;
pub mod issue;
pub mod logging;
pub mod mapping;
pub mod marker;
pub mod markup;
pub mod sync;
pub mod tracker;

pub use config::AppConfig;
pub use error::{CompileError, DocumentExists, EvalError, RemoteRequestError, ValidationError};
pub use issue::{IssueRecord, LocalSnapshot, Pagination, SearchPage, Transition};
pub use markup::{markdown_to_wiki, wiki_to_markdown};
pub use sync::{BatchReport, Orchestrator};
