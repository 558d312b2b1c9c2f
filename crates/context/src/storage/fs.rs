use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{
	Checkpoint, ContentType, ContentsModel, FetchOptions, SaveRequest, Storage, decode_content, encode_content,
	guess_format, guess_mimetype,
};
use crate::{StorageError, paths};

/// Directory, next to each file, that holds its checkpoint.
const CHECKPOINT_DIR: &str = ".checkpoints";
/// The single checkpoint id this backend hands out.
const CHECKPOINT_ID: &str = "checkpoint";

/// [`Storage`] backed by a directory on the local filesystem.
///
/// Keeps at most one checkpoint per file, stored as
/// `<dir>/.checkpoints/<stem>-checkpoint<ext>`.
#[derive(Debug, Clone)]
pub struct FsStorage {
	root: PathBuf,
}

impl FsStorage {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn resolve(&self, path: &str) -> Result<(String, PathBuf), StorageError> {
		match paths::normalize(path) {
			Some(normal) if !normal.is_empty() => {
				let full = self.root.join(&normal);
				Ok((normal, full))
			}
			_ => Err(StorageError::InvalidPath(path.to_string())),
		}
	}

	fn checkpoint_path(&self, normal: &str) -> PathBuf {
		let name = paths::basename(normal);
		let (stem, ext) = match name.rfind('.') {
			Some(idx) if idx > 0 => name.split_at(idx),
			_ => (name, ""),
		};
		self.root
			.join(paths::dirname(normal))
			.join(CHECKPOINT_DIR)
			.join(format!("{stem}-{CHECKPOINT_ID}{ext}"))
	}

	async fn metadata(&self, normal: &str, full: &Path) -> Result<ContentsModel, StorageError> {
		let meta = tokio::fs::metadata(full)
			.await
			.map_err(|e| StorageError::from_io(normal, &e))?;
		let last_modified: DateTime<Utc> = meta
			.modified()
			.map(DateTime::from)
			.map_err(|e| StorageError::from_io(normal, &e))?;
		let created = meta.created().map(DateTime::from).unwrap_or(last_modified);

		let content_type = if meta.is_dir() {
			ContentType::Directory
		} else if paths::extension(normal).as_deref() == Some(".ipynb") {
			ContentType::Notebook
		} else {
			ContentType::File
		};

		Ok(ContentsModel {
			path: normal.to_string(),
			name: paths::basename(normal).to_string(),
			content_type,
			format: guess_format(normal),
			content: None,
			mimetype: guess_mimetype(normal),
			writable: !meta.permissions().readonly(),
			created,
			last_modified,
		})
	}
}

#[async_trait]
impl Storage for FsStorage {
	async fn get(&self, path: &str, options: FetchOptions) -> Result<ContentsModel, StorageError> {
		let (normal, full) = self.resolve(path)?;
		let mut model = self.metadata(&normal, &full).await?;
		if options.content && model.content_type != ContentType::Directory {
			let bytes = tokio::fs::read(&full)
				.await
				.map_err(|e| StorageError::from_io(&normal, &e))?;
			let format = options.format.unwrap_or(model.format);
			model.format = format;
			model.content = Some(encode_content(&bytes, format)?);
		}
		Ok(model)
	}

	async fn save(&self, path: &str, request: SaveRequest) -> Result<ContentsModel, StorageError> {
		let (normal, full) = self.resolve(path)?;
		let bytes = decode_content(&request.content, request.format)?;
		if let Some(parent) = full.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::from_io(&normal, &e))?;
		}
		tokio::fs::write(&full, &bytes)
			.await
			.map_err(|e| StorageError::from_io(&normal, &e))?;
		debug!(path = %normal, len = bytes.len(), "file written");

		let mut model = self.metadata(&normal, &full).await?;
		model.format = request.format;
		model.content_type = request.content_type;
		Ok(model)
	}

	async fn rename(&self, from: &str, to: &str) -> Result<ContentsModel, StorageError> {
		let (from_normal, from_full) = self.resolve(from)?;
		let (to_normal, to_full) = self.resolve(to)?;
		if from_normal != to_normal && tokio::fs::try_exists(&to_full).await.unwrap_or(false) {
			return Err(StorageError::Conflict(to_normal));
		}
		if let Some(parent) = to_full.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::from_io(&to_normal, &e))?;
		}
		tokio::fs::rename(&from_full, &to_full)
			.await
			.map_err(|e| StorageError::from_io(&from_normal, &e))?;
		self.metadata(&to_normal, &to_full).await
	}

	async fn create_checkpoint(&self, path: &str) -> Result<Checkpoint, StorageError> {
		let (normal, full) = self.resolve(path)?;
		let target = self.checkpoint_path(&normal);
		if let Some(parent) = target.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::from_io(&normal, &e))?;
		}
		tokio::fs::copy(&full, &target)
			.await
			.map_err(|e| StorageError::from_io(&normal, &e))?;
		checkpoint_at(&normal, &target).await
	}

	async fn delete_checkpoint(&self, path: &str, id: &str) -> Result<(), StorageError> {
		let (normal, _) = self.resolve(path)?;
		if id != CHECKPOINT_ID {
			return Err(missing_checkpoint(&normal, id));
		}
		tokio::fs::remove_file(self.checkpoint_path(&normal))
			.await
			.map_err(|e| match StorageError::from_io(&normal, &e) {
				StorageError::NotFound(_) => missing_checkpoint(&normal, id),
				other => other,
			})
	}

	async fn list_checkpoints(&self, path: &str) -> Result<Vec<Checkpoint>, StorageError> {
		let (normal, full) = self.resolve(path)?;
		if !tokio::fs::try_exists(&full).await.unwrap_or(false) {
			return Err(StorageError::NotFound(normal));
		}
		let target = self.checkpoint_path(&normal);
		if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
			return Ok(Vec::new());
		}
		Ok(vec![checkpoint_at(&normal, &target).await?])
	}

	async fn restore_checkpoint(&self, path: &str, id: &str) -> Result<(), StorageError> {
		let (normal, full) = self.resolve(path)?;
		let source = self.checkpoint_path(&normal);
		if id != CHECKPOINT_ID || !tokio::fs::try_exists(&source).await.unwrap_or(false) {
			return Err(missing_checkpoint(&normal, id));
		}
		tokio::fs::copy(&source, &full)
			.await
			.map_err(|e| StorageError::from_io(&normal, &e))?;
		Ok(())
	}
}

async fn checkpoint_at(normal: &str, target: &Path) -> Result<Checkpoint, StorageError> {
	let meta = tokio::fs::metadata(target)
		.await
		.map_err(|e| StorageError::from_io(normal, &e))?;
	let created = meta
		.modified()
		.map(DateTime::from)
		.map_err(|e| StorageError::from_io(normal, &e))?;
	Ok(Checkpoint {
		id: CHECKPOINT_ID.to_string(),
		created,
	})
}

fn missing_checkpoint(path: &str, id: &str) -> StorageError {
	StorageError::CheckpointNotFound {
		path: path.to_string(),
		id: id.to_string(),
	}
}
