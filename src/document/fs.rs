use std::{
	collections::HashMap,
	path::{Component, Path, PathBuf},
	sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use color_eyre::eyre::{Result, WrapErr, bail};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::{DocumentHost, TextEdit, is_markdown};
use crate::error::DocumentExists;

/// Documents as files under a root directory.
///
/// Writes to one path are serialized through a per-path async lock, and land via a temp file and
/// a rename so readers never see half a document.
pub struct FsDocumentHost {
	root: PathBuf,
	locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl FsDocumentHost {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self {
			root: root.into(),
			locks: Mutex::new(HashMap::new()),
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Full path for `path`, refusing anything that would escape the root.
	fn resolve(&self, path: &str) -> Result<PathBuf> {
		let relative = Path::new(path);
		if relative.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
			bail!("document path must be relative and stay inside the root: {path}");
		}
		Ok(self.root.join(relative))
	}

	fn lock_for(&self, full: &Path) -> Arc<tokio::sync::Mutex<()>> {
		let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
		locks.entry(full.to_path_buf()).or_default().clone()
	}

	async fn collect(&self, dir: PathBuf, out: &mut Vec<String>) -> Result<()> {
		let mut pending = vec![dir];
		while let Some(dir) = pending.pop() {
			let mut entries = match tokio::fs::read_dir(&dir).await {
				Ok(entries) => entries,
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
				Err(e) => return Err(e).wrap_err_with(|| format!("failed to list {}", dir.display())),
			};
			while let Some(entry) = entries.next_entry().await? {
				let path = entry.path();
				if entry.file_type().await?.is_dir() {
					pending.push(path);
					continue;
				}
				let Ok(relative) = path.strip_prefix(&self.root) else { continue };
				let relative = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");
				if is_markdown(&relative) {
					out.push(relative);
				}
			}
		}
		Ok(())
	}
}

#[async_trait]
impl DocumentHost for FsDocumentHost {
	async fn read_text(&self, path: &str) -> Result<String> {
		let full = self.resolve(path)?;
		tokio::fs::read_to_string(&full).await.wrap_err_with(|| format!("failed to read {}", full.display()))
	}

	#[instrument(skip(self, edit))]
	async fn process_document(&self, path: &str, edit: TextEdit) -> Result<()> {
		let full = self.resolve(path)?;
		let lock = self.lock_for(&full);
		let _guard = lock.lock().await;

		let text = tokio::fs::read_to_string(&full).await.wrap_err_with(|| format!("failed to read {}", full.display()))?;
		let updated = edit(text.clone())?;
		if updated == text {
			debug!("unchanged");
			return Ok(());
		}

		let mut tmp = full.clone().into_os_string();
		tmp.push(".jira_sync.tmp");
		tokio::fs::write(&tmp, updated.as_bytes()).await.wrap_err_with(|| format!("failed to write {}", full.display()))?;
		tokio::fs::rename(&tmp, &full).await.wrap_err_with(|| format!("failed to replace {}", full.display()))?;
		debug!(bytes = updated.len(), "written");
		Ok(())
	}

	#[instrument(skip(self, text))]
	async fn create_document(&self, path: &str, text: &str) -> Result<()> {
		let full = self.resolve(path)?;
		let lock = self.lock_for(&full);
		let _guard = lock.lock().await;

		if let Some(parent) = full.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		let mut file = match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&full).await {
			Ok(file) => file,
			Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Err(DocumentExists { path: path.to_string() }.into()),
			Err(e) => return Err(e).wrap_err_with(|| format!("failed to create {}", full.display())),
		};
		file.write_all(text.as_bytes()).await?;
		file.flush().await?;
		Ok(())
	}

	async fn exists(&self, path: &str) -> Result<bool> {
		let full = self.resolve(path)?;
		Ok(tokio::fs::try_exists(&full).await?)
	}

	async fn list_documents(&self, folder: &str) -> Result<Vec<String>> {
		let dir = self.resolve(folder)?;
		let mut out = Vec::new();
		self.collect(dir, &mut out).await?;
		out.sort();
		Ok(out)
	}
}
