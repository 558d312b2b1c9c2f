use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};

use super::{
	Checkpoint, ContentType, ContentsModel, FetchOptions, FileFormat, SaveRequest, Storage, decode_content,
	encode_content, guess_format, guess_mimetype,
};
use crate::{StorageError, paths};

#[derive(Debug, Clone)]
struct Entry {
	bytes: Vec<u8>,
	format: FileFormat,
	content_type: ContentType,
	mimetype: Option<String>,
	writable: bool,
	created: DateTime<Utc>,
	last_modified: DateTime<Utc>,
	checkpoints: Vec<(Checkpoint, Vec<u8>)>,
}

/// In-memory [`Storage`] with full checkpoint support.
///
/// Timestamps come from a strictly increasing clock, so two writes never
/// share a `last_modified` and checkpoint creation order is total.
pub struct MemoryStorage {
	files: RwLock<HashMap<String, Entry>>,
	clock: Mutex<DateTime<Utc>>,
	next_checkpoint: AtomicU64,
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self {
			files: RwLock::new(HashMap::new()),
			clock: Mutex::new(DateTime::<Utc>::MIN_UTC),
			next_checkpoint: AtomicU64::new(0),
		}
	}
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seeds (or overwrites) `path` with UTF-8 text, bypassing write checks.
	pub fn insert_text(&self, path: &str, text: &str) {
		self.insert_bytes(path, text.as_bytes().to_vec());
	}

	/// Seeds (or overwrites) `path` with raw bytes, bypassing write checks.
	pub fn insert_bytes(&self, path: &str, bytes: Vec<u8>) {
		let Some(path) = paths::normalize(path) else {
			return;
		};
		let now = self.tick();
		let mut files = self.files.write();
		match files.get_mut(&path) {
			Some(entry) => {
				entry.bytes = bytes;
				entry.last_modified = now;
			}
			None => {
				files.insert(path.clone(), new_entry(&path, bytes, guess_format(&path), now));
			}
		}
	}

	/// Raw stored bytes of `path` decoded as UTF-8.
	pub fn read_text(&self, path: &str) -> Option<String> {
		let path = paths::normalize(path)?;
		let files = self.files.read();
		String::from_utf8(files.get(&path)?.bytes.clone()).ok()
	}

	pub fn contains(&self, path: &str) -> bool {
		paths::normalize(path).is_some_and(|path| self.files.read().contains_key(&path))
	}

	/// Flags `path` writable or not. Returns false if the file does not exist.
	pub fn set_writable(&self, path: &str, writable: bool) -> bool {
		let Some(path) = paths::normalize(path) else {
			return false;
		};
		match self.files.write().get_mut(&path) {
			Some(entry) => {
				entry.writable = writable;
				true
			}
			None => false,
		}
	}

	/// Overrides the modification time of `path`, simulating an external write.
	pub fn touch(&self, path: &str, at: DateTime<Utc>) -> bool {
		let Some(path) = paths::normalize(path) else {
			return false;
		};
		match self.files.write().get_mut(&path) {
			Some(entry) => {
				entry.last_modified = at;
				true
			}
			None => false,
		}
	}

	fn tick(&self) -> DateTime<Utc> {
		let mut last = self.clock.lock();
		let now = Utc::now().max(*last + TimeDelta::microseconds(1));
		*last = now;
		now
	}

	fn with_entry<T>(&self, path: &str, f: impl FnOnce(&String, &mut Entry) -> Result<T, StorageError>) -> Result<T, StorageError> {
		let path = normalized(path)?;
		let mut files = self.files.write();
		let entry = files.get_mut(&path).ok_or_else(|| StorageError::NotFound(path.clone()))?;
		f(&path, entry)
	}
}

#[async_trait]
impl Storage for MemoryStorage {
	async fn get(&self, path: &str, options: FetchOptions) -> Result<ContentsModel, StorageError> {
		let path = normalized(path)?;
		let entry = self
			.files
			.read()
			.get(&path)
			.cloned()
			.ok_or_else(|| StorageError::NotFound(path.clone()))?;

		let format = options.format.unwrap_or(entry.format);
		let mut model = to_model(&path, &entry);
		if options.content {
			model.format = format;
			model.content = Some(encode_content(&entry.bytes, format)?);
		}
		Ok(model)
	}

	async fn save(&self, path: &str, request: SaveRequest) -> Result<ContentsModel, StorageError> {
		let path = normalized(path)?;
		let bytes = decode_content(&request.content, request.format)?;
		let now = self.tick();

		let mut files = self.files.write();
		if let Some(existing) = files.get(&path)
			&& !existing.writable
		{
			return Err(StorageError::PermissionDenied(path));
		}
		let entry = files
			.entry(path.clone())
			.or_insert_with(|| new_entry(&path, Vec::new(), request.format, now));
		entry.bytes = bytes;
		entry.format = request.format;
		entry.content_type = request.content_type;
		entry.last_modified = now;
		Ok(to_model(&path, entry))
	}

	async fn rename(&self, from: &str, to: &str) -> Result<ContentsModel, StorageError> {
		let from = normalized(from)?;
		let to = normalized(to)?;
		let mut files = self.files.write();
		if from != to && files.contains_key(&to) {
			return Err(StorageError::Conflict(to));
		}
		let mut entry = files.remove(&from).ok_or_else(|| StorageError::NotFound(from.clone()))?;
		entry.mimetype = guess_mimetype(&to).or(entry.mimetype);
		let model = to_model(&to, &entry);
		files.insert(to, entry);
		Ok(model)
	}

	async fn create_checkpoint(&self, path: &str) -> Result<Checkpoint, StorageError> {
		let created = self.tick();
		self.with_entry(path, |_, entry| {
			let id = self.next_checkpoint.fetch_add(1, Ordering::Relaxed) + 1;
			let checkpoint = Checkpoint {
				id: id.to_string(),
				created,
			};
			entry.checkpoints.push((checkpoint.clone(), entry.bytes.clone()));
			Ok(checkpoint)
		})
	}

	async fn delete_checkpoint(&self, path: &str, id: &str) -> Result<(), StorageError> {
		self.with_entry(path, |path, entry| {
			let before = entry.checkpoints.len();
			entry.checkpoints.retain(|(checkpoint, _)| checkpoint.id != id);
			if entry.checkpoints.len() == before {
				return Err(StorageError::CheckpointNotFound {
					path: path.clone(),
					id: id.to_string(),
				});
			}
			Ok(())
		})
	}

	async fn list_checkpoints(&self, path: &str) -> Result<Vec<Checkpoint>, StorageError> {
		self.with_entry(path, |_, entry| {
			Ok(entry.checkpoints.iter().map(|(checkpoint, _)| checkpoint.clone()).collect())
		})
	}

	async fn restore_checkpoint(&self, path: &str, id: &str) -> Result<(), StorageError> {
		let now = self.tick();
		self.with_entry(path, |path, entry| {
			let bytes = entry
				.checkpoints
				.iter()
				.find(|(checkpoint, _)| checkpoint.id == id)
				.map(|(_, bytes)| bytes.clone())
				.ok_or_else(|| StorageError::CheckpointNotFound {
					path: path.clone(),
					id: id.to_string(),
				})?;
			entry.bytes = bytes;
			entry.last_modified = now;
			Ok(())
		})
	}
}

fn normalized(path: &str) -> Result<String, StorageError> {
	match paths::normalize(path) {
		Some(normal) if !normal.is_empty() => Ok(normal),
		_ => Err(StorageError::InvalidPath(path.to_string())),
	}
}

fn new_entry(path: &str, bytes: Vec<u8>, format: FileFormat, now: DateTime<Utc>) -> Entry {
	let content_type = match paths::extension(path).as_deref() {
		Some(".ipynb") => ContentType::Notebook,
		_ => ContentType::File,
	};
	Entry {
		bytes,
		format,
		content_type,
		mimetype: guess_mimetype(path),
		writable: true,
		created: now,
		last_modified: now,
		checkpoints: Vec::new(),
	}
}

fn to_model(path: &str, entry: &Entry) -> ContentsModel {
	ContentsModel {
		path: path.to_string(),
		name: paths::basename(path).to_string(),
		content_type: entry.content_type,
		format: entry.format,
		content: None,
		mimetype: entry.mimetype.clone(),
		writable: entry.writable,
		created: entry.created,
		last_modified: entry.last_modified,
	}
}
