use std::collections::BTreeMap;

use async_trait::async_trait;
use color_eyre::eyre::{Result, bail};
use tokio::sync::Mutex;
use tracing::instrument;

use super::{DocumentHost, TextEdit, is_markdown};
use crate::error::DocumentExists;

/// Documents held in memory, for tests. One lock guards the whole store, so every edit is atomic.
#[derive(Default)]
pub struct MemoryDocumentHost {
	docs: Mutex<BTreeMap<String, String>>,
}

impl MemoryDocumentHost {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_documents<'a>(docs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
		Self {
			docs: Mutex::new(docs.into_iter().map(|(path, text)| (path.to_string(), text.to_string())).collect()),
		}
	}

	pub async fn get(&self, path: &str) -> Option<String> {
		self.docs.lock().await.get(path).cloned()
	}

	pub async fn paths(&self) -> Vec<String> {
		self.docs.lock().await.keys().cloned().collect()
	}
}

#[async_trait]
impl DocumentHost for MemoryDocumentHost {
	async fn read_text(&self, path: &str) -> Result<String> {
		match self.docs.lock().await.get(path) {
			Some(text) => Ok(text.clone()),
			None => bail!("no such document: {path}"),
		}
	}

	#[instrument(skip(self, edit))]
	async fn process_document(&self, path: &str, edit: TextEdit) -> Result<()> {
		let mut docs = self.docs.lock().await;
		let Some(text) = docs.get_mut(path) else {
			bail!("no such document: {path}");
		};
		*text = edit(text.clone())?;
		Ok(())
	}

	async fn create_document(&self, path: &str, text: &str) -> Result<()> {
		let mut docs = self.docs.lock().await;
		if docs.contains_key(path) {
			return Err(DocumentExists { path: path.to_string() }.into());
		}
		docs.insert(path.to_string(), text.to_string());
		Ok(())
	}

	async fn exists(&self, path: &str) -> Result<bool> {
		Ok(self.docs.lock().await.contains_key(path))
	}

	async fn list_documents(&self, folder: &str) -> Result<Vec<String>> {
		let prefix = format!("{}/", folder.trim_end_matches('/'));
		Ok(self.docs.lock().await.keys().filter(|p| p.starts_with(&prefix) && is_markdown(p)).cloned().collect())
	}
}
