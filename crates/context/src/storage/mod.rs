//! Storage collaborator contract and the data it exchanges.
//!
//! A context never caches anything beyond the last [`ContentsModel`] snapshot:
//! checkpoints are listed on demand and content is re-fetched on revert.

mod fs;
mod memory;


use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use self::fs::FsStorage;
pub use self::memory::MemoryStorage;
use crate::StorageError;

/// Serialization format of a stored file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
	#[default]
	Text,
	Base64,
	Json,
}

/// Kind of object a storage path refers to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
	#[default]
	File,
	Notebook,
	Directory,
}

/// Content payload in its transfer form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
	/// Text, or base64 text for binary files.
	Text(String),
	Json(Value),
}

/// Metadata snapshot (and optionally content) of one stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentsModel {
	pub path: String,
	pub name: String,
	#[serde(rename = "type")]
	pub content_type: ContentType,
	pub format: FileFormat,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<Content>,
	#[serde(default)]
	pub mimetype: Option<String>,
	pub writable: bool,
	pub created: DateTime<Utc>,
	pub last_modified: DateTime<Utc>,
}

impl ContentsModel {
	/// Copy of the snapshot with the payload dropped.
	pub fn without_content(&self) -> Self {
		Self {
			content: None,
			..self.clone()
		}
	}
}

/// What [`Storage::get`] should return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
	/// Include the payload; `false` fetches metadata only.
	pub content: bool,
	/// Requested payload format; `None` keeps the stored format.
	pub format: Option<FileFormat>,
}

impl FetchOptions {
	pub fn metadata() -> Self {
		Self::default()
	}

	pub fn content(format: FileFormat) -> Self {
		Self {
			content: true,
			format: Some(format),
		}
	}
}

/// Payload written by [`Storage::save`].
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
	pub content_type: ContentType,
	pub format: FileFormat,
	pub content: Content,
}

/// Backend-held immutable snapshot of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
	/// Backend-assigned, opaque identifier.
	pub id: String,
	pub created: DateTime<Utc>,
}

/// Persistent storage backend consumed by document contexts.
///
/// Paths are `/`-separated and relative to the backend root. Timeouts and
/// retries, if any, belong to the implementation.
#[async_trait]
pub trait Storage: Send + Sync {
	async fn get(&self, path: &str, options: FetchOptions) -> Result<ContentsModel, StorageError>;

	/// Writes `request` to `path`, creating the file if needed, and returns
	/// the new metadata (without content).
	async fn save(&self, path: &str, request: SaveRequest) -> Result<ContentsModel, StorageError>;

	/// Moves `from` to `to`. Fails with [`StorageError::Conflict`] if `to` exists.
	async fn rename(&self, from: &str, to: &str) -> Result<ContentsModel, StorageError>;

	async fn create_checkpoint(&self, path: &str) -> Result<Checkpoint, StorageError>;

	async fn delete_checkpoint(&self, path: &str, id: &str) -> Result<(), StorageError>;

	async fn list_checkpoints(&self, path: &str) -> Result<Vec<Checkpoint>, StorageError>;

	async fn restore_checkpoint(&self, path: &str, id: &str) -> Result<(), StorageError>;
}

/// Encodes raw file bytes into the transfer form for `format`.
pub fn encode_content(bytes: &[u8], format: FileFormat) -> Result<Content, StorageError> {
	match format {
		FileFormat::Text => String::from_utf8(bytes.to_vec())
			.map(Content::Text)
			.map_err(|_| StorageError::InvalidContent("file is not valid UTF-8".into())),
		FileFormat::Base64 => Ok(Content::Text(BASE64.encode(bytes))),
		FileFormat::Json => serde_json::from_slice(bytes)
			.map(Content::Json)
			.map_err(|e| StorageError::InvalidContent(format!("invalid JSON: {e}"))),
	}
}

/// Decodes a transfer-form payload written as `format` back into raw bytes.
pub fn decode_content(content: &Content, format: FileFormat) -> Result<Vec<u8>, StorageError> {
	match (format, content) {
		(FileFormat::Text, Content::Text(text)) => Ok(text.as_bytes().to_vec()),
		(FileFormat::Base64, Content::Text(text)) => BASE64
			.decode(text.trim())
			.map_err(|e| StorageError::InvalidContent(format!("invalid base64: {e}"))),
		(FileFormat::Json, Content::Json(value)) => serde_json::to_vec_pretty(value)
			.map_err(|e| StorageError::InvalidContent(format!("unserializable JSON: {e}"))),
		(FileFormat::Json, Content::Text(text)) => serde_json::from_str::<Value>(text)
			.map(|_| text.as_bytes().to_vec())
			.map_err(|e| StorageError::InvalidContent(format!("invalid JSON: {e}"))),
		(_, Content::Json(_)) => Err(StorageError::InvalidContent(format!(
			"structured content cannot be written as {format:?}"
		))),
	}
}

/// Default format for a file whose stored format is unknown.
pub(crate) fn guess_format(path: &str) -> FileFormat {
	match crate::paths::extension(path).as_deref() {
		Some(".json" | ".ipynb") => FileFormat::Json,
		Some(".png" | ".jpg" | ".jpeg" | ".gif" | ".pdf" | ".zip") => FileFormat::Base64,
		_ => FileFormat::Text,
	}
}

pub(crate) fn guess_mimetype(path: &str) -> Option<String> {
	let mime = match crate::paths::extension(path).as_deref()? {
		".txt" => "text/plain",
		".md" => "text/markdown",
		".py" => "text/x-python",
		".json" => "application/json",
		".ipynb" => "application/x-ipynb+json",
		".csv" => "text/csv",
		".png" => "image/png",
		".jpg" | ".jpeg" => "image/jpeg",
		_ => return None,
	};
	Some(mime.to_string())
}
