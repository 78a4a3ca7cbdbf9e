//! The note store holding synced documents.
//!
//! Documents are addressed by `/`-separated paths relative to the store root.

pub mod frontmatter;
mod fs;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use color_eyre::eyre::Result;
pub use fs::FsDocumentHost;
pub use memory::MemoryDocumentHost;

use crate::issue::LocalSnapshot;

/// Whole-text edit applied by [`DocumentHost::process_document`]. Returning an error aborts the
/// edit without writing.
pub type TextEdit = Box<dyn FnOnce(String) -> Result<String> + Send>;

pub type FrontmatterEdit = Box<dyn FnOnce(&mut LocalSnapshot) + Send>;

#[async_trait]
pub trait DocumentHost: Send + Sync {
	async fn read_text(&self, path: &str) -> Result<String>;

	/// Read-modify-write as one step: no other write to `path` through this host interleaves.
	async fn process_document(&self, path: &str, edit: TextEdit) -> Result<()>;

	/// Fails if a document already exists at `path`. Missing parent folders are created.
	async fn create_document(&self, path: &str, text: &str) -> Result<()>;

	async fn exists(&self, path: &str) -> Result<bool>;

	/// Paths of all markdown documents under `folder`, recursively, sorted. A missing folder is empty.
	async fn list_documents(&self, folder: &str) -> Result<Vec<String>>;

	async fn read_frontmatter(&self, path: &str) -> Result<LocalSnapshot> {
		let text = self.read_text(path).await?;
		Ok(frontmatter::split(&text)?.0)
	}

	async fn mutate_frontmatter(&self, path: &str, edit: FrontmatterEdit) -> Result<()> {
		self.process_document(path, Box::new(move |text: String| frontmatter::rewrite(&text, edit))).await
	}
}

pub type BoxedDocumentHost = Arc<dyn DocumentHost>;

fn is_markdown(path: &str) -> bool {
	path.rsplit_once('.').is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("md"))
}
