//! Document context: the coordinator between one model, its storage path,
//! an optional kernel session, and the views sharing it.
//!
//! # Ordering
//!
//! Storage operations that read or replace the document (`initialize`,
//! `save`, `save_as`, `revert`, `rename`, checkpoint create/restore) queue
//! FIFO behind a per-context async lock, so a revert always observes the
//! result of a save issued before it. Kernel changes are serialized by their
//! own lock and never wait on storage.
//!
//! # Disposal
//!
//! [`DocumentContext::dispose`] cancels a token every operation races
//! against. Anything in flight, or queued on a lock, resolves to
//! [`ContextError::Disposed`] instead of completing against a torn-down
//! context.

#[cfg(test)]
mod tests;

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::TimeDelta;
use folio_model::{DocumentModel, ScopedHandle, Signal};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::{KernelOptions, KernelSession, SessionManager, SessionRequest};
use crate::storage::{Checkpoint, Content, ContentType, ContentsModel, FetchOptions, FileFormat, SaveRequest, Storage};
use crate::widget::DocumentWidget;
use crate::{ContextError, KernelError, PathPrompt, StorageError, paths};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a document context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl ContextId {
	pub fn next() -> Self {
		Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
	}
}

/// Default tolerance between the snapshot and the backend's `last_modified`.
pub const DEFAULT_CHECK_MARGIN: Duration = Duration::from_millis(500);

/// Per-context settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
	pub path: String,
	/// Name of the model factory that produced the model.
	pub model_name: String,
	pub file_format: FileFormat,
	pub content_type: ContentType,
	/// Untitled documents prompt for a path on their first `save`.
	pub untitled: bool,
	pub last_modified_check_margin: Duration,
}

impl ContextOptions {
	pub fn new(path: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			model_name: "text".into(),
			file_format: FileFormat::Text,
			content_type: ContentType::File,
			untitled: false,
			last_modified_check_margin: DEFAULT_CHECK_MARGIN,
		}
	}

	pub fn with_model(mut self, name: impl Into<String>, format: FileFormat, content_type: ContentType) -> Self {
		self.model_name = name.into();
		self.file_format = format;
		self.content_type = content_type;
		self
	}

	pub fn untitled(mut self, untitled: bool) -> Self {
		self.untitled = untitled;
		self
	}

	pub fn with_check_margin(mut self, margin: Duration) -> Self {
		self.last_modified_check_margin = margin;
		self
	}
}

/// External collaborators a context talks to.
#[derive(Clone)]
pub struct ContextServices {
	pub storage: Arc<dyn Storage>,
	pub sessions: Option<Arc<dyn SessionManager>>,
	pub prompt: Option<Arc<dyn PathPrompt>>,
}

impl ContextServices {
	pub fn new(storage: Arc<dyn Storage>) -> Self {
		Self {
			storage,
			sessions: None,
			prompt: None,
		}
	}

	pub fn with_sessions(mut self, sessions: Arc<dyn SessionManager>) -> Self {
		self.sessions = Some(sessions);
		self
	}

	pub fn with_prompt(mut self, prompt: Arc<dyn PathPrompt>) -> Self {
		self.prompt = Some(prompt);
		self
	}
}

/// Payload of [`DocumentContext::path_changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChange {
	pub old_path: String,
	pub new_path: String,
}

/// Payload of [`DocumentContext::kernel_changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelChange {
	pub previous: Option<KernelSession>,
	pub current: Option<KernelSession>,
}

/// Progress of a save, reported on [`DocumentContext::save_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
	Started,
	Completed,
	Failed,
}

/// How a save request ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
	Saved,
	/// The path prompt was dismissed; nothing was written.
	Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
	/// Skip the external-modification check.
	pub force: bool,
}

struct State {
	path: String,
	contents: Option<ContentsModel>,
	session: Option<KernelSession>,
	untitled: bool,
	disposed: bool,
}

#[derive(Default)]
struct Siblings {
	next_token: u64,
	entries: Vec<(u64, Weak<dyn DocumentWidget>)>,
}

/// Binds one [`DocumentModel`] to a storage path, an optional kernel
/// session, and the views registered as its siblings.
pub struct DocumentContext {
	id: ContextId,
	model: Arc<dyn DocumentModel>,
	model_name: String,
	file_format: FileFormat,
	content_type: ContentType,
	check_margin: TimeDelta,
	services: ContextServices,
	state: RwLock<State>,
	siblings: Arc<Mutex<Siblings>>,
	io_lock: tokio::sync::Mutex<()>,
	kernel_lock: tokio::sync::Mutex<()>,
	cancel: CancellationToken,
	populated: watch::Sender<bool>,
	path_changed: Signal<PathChange>,
	kernel_changed: Signal<KernelChange>,
	save_state: Signal<SaveState>,
	file_changed: Signal<ContentsModel>,
	disposed: Signal<()>,
}

impl DocumentContext {
	/// Creates an unpopulated context owning `model`.
	///
	/// The context's signals deliver through the model's dispatcher.
	pub fn new(
		model: Arc<dyn DocumentModel>,
		options: ContextOptions,
		services: ContextServices,
	) -> Result<Self, ContextError> {
		let path = validate_path(&options.path)?;
		let dispatcher = model.content_changed().dispatcher().clone();
		let check_margin = TimeDelta::from_std(options.last_modified_check_margin).unwrap_or_else(|_| TimeDelta::zero());
		let id = ContextId::next();
		info!(context = id.0, path = %path, model = %options.model_name, "document context created");

		Ok(Self {
			id,
			model,
			model_name: options.model_name,
			file_format: options.file_format,
			content_type: options.content_type,
			check_margin,
			services,
			state: RwLock::new(State {
				path,
				contents: None,
				session: None,
				untitled: options.untitled,
				disposed: false,
			}),
			siblings: Arc::new(Mutex::new(Siblings::default())),
			io_lock: tokio::sync::Mutex::new(()),
			kernel_lock: tokio::sync::Mutex::new(()),
			cancel: CancellationToken::new(),
			populated: watch::Sender::new(false),
			path_changed: Signal::with_dispatcher(dispatcher.clone()),
			kernel_changed: Signal::with_dispatcher(dispatcher.clone()),
			save_state: Signal::with_dispatcher(dispatcher.clone()),
			file_changed: Signal::with_dispatcher(dispatcher.clone()),
			disposed: Signal::with_dispatcher(dispatcher),
		})
	}

	pub fn id(&self) -> ContextId {
		self.id
	}

	pub fn model(&self) -> &Arc<dyn DocumentModel> {
		&self.model
	}

	/// Name of the model factory that produced the model.
	pub fn model_name(&self) -> &str {
		&self.model_name
	}

	pub fn file_format(&self) -> FileFormat {
		self.file_format
	}

	pub fn content_type(&self) -> ContentType {
		self.content_type
	}

	pub fn storage(&self) -> &Arc<dyn Storage> {
		&self.services.storage
	}

	pub fn path(&self) -> String {
		self.state.read().path.clone()
	}

	/// Last metadata snapshot, `None` until the first load or save.
	pub fn contents_model(&self) -> Option<ContentsModel> {
		self.state.read().contents.clone()
	}

	pub fn kernel(&self) -> Option<KernelSession> {
		self.state.read().session.clone()
	}

	pub fn is_untitled(&self) -> bool {
		self.state.read().untitled
	}

	/// True from the first successful load or save onwards.
	pub fn is_populated(&self) -> bool {
		*self.populated.borrow()
	}

	pub fn is_disposed(&self) -> bool {
		self.cancel.is_cancelled()
	}

	pub fn path_changed(&self) -> &Signal<PathChange> {
		&self.path_changed
	}

	pub fn kernel_changed(&self) -> &Signal<KernelChange> {
		&self.kernel_changed
	}

	pub fn save_state(&self) -> &Signal<SaveState> {
		&self.save_state
	}

	/// Emits every replacement of the metadata snapshot.
	pub fn file_changed(&self) -> &Signal<ContentsModel> {
		&self.file_changed
	}

	pub fn disposed(&self) -> &Signal<()> {
		&self.disposed
	}

	/// Performs the initial population: writes the model when `is_new`,
	/// otherwise loads it from storage.
	pub async fn initialize(&self, is_new: bool) -> Result<(), ContextError> {
		self.guarded(async move {
			let _io = self.io_lock.lock().await;
			let path = self.path();
			if is_new {
				self.write_to(&path, true).await
			} else {
				self.load(&path).await
			}
		})
		.await
	}

	/// Resolves once the context is populated.
	pub async fn ready(&self) -> Result<(), ContextError> {
		let mut populated = self.populated.subscribe();
		self.guarded(async move {
			populated
				.wait_for(|populated| *populated)
				.await
				.map(|_| ())
				.map_err(|_| ContextError::Disposed)
		})
		.await
	}

	/// Saves to the current path, or behaves as [`save_as`](Self::save_as)
	/// for untitled documents.
	pub async fn save(&self) -> Result<SaveOutcome, ContextError> {
		self.save_with(SaveOptions::default()).await
	}

	pub async fn save_with(&self, options: SaveOptions) -> Result<SaveOutcome, ContextError> {
		self.ensure_live()?;
		if self.is_untitled() {
			return self.save_as().await;
		}
		self.guarded(async move {
			let _io = self.io_lock.lock().await;
			let path = self.path();
			self.write_to(&path, options.force).await?;
			Ok(SaveOutcome::Saved)
		})
		.await
	}

	/// Prompts for a new path, then saves there.
	///
	/// A dismissed prompt is [`SaveOutcome::Cancelled`], not an error.
	pub async fn save_as(&self) -> Result<SaveOutcome, ContextError> {
		self.ensure_live()?;
		let prompt = self.services.prompt.clone().ok_or(ContextError::NoPathPrompt)?;
		self.guarded(async move {
			let current = self.path();
			let Some(chosen) = prompt.prompt_for_path(&current).await else {
				debug!(path = %current, "save as cancelled");
				return Ok(SaveOutcome::Cancelled);
			};
			let target = validate_path(&chosen)?;

			let _io = self.io_lock.lock().await;
			self.write_to(&target, false).await?;
			let old_path = {
				let mut state = self.state.write();
				state.untitled = false;
				std::mem::replace(&mut state.path, target.clone())
			};
			if old_path != target {
				info!(from = %old_path, to = %target, "document saved under new path");
				self.follow_path(&target).await;
				self.path_changed.emit(PathChange {
					old_path,
					new_path: target,
				});
			}
			Ok(SaveOutcome::Saved)
		})
		.await
	}

	/// Reloads the model from storage, discarding unsaved changes.
	///
	/// Waits for any save queued before it.
	pub async fn revert(&self) -> Result<(), ContextError> {
		self.guarded(async move {
			let _io = self.io_lock.lock().await;
			let path = self.path();
			self.load(&path).await
		})
		.await
	}

	/// Moves the document to `new_path` in storage.
	pub async fn rename(&self, new_path: &str) -> Result<(), ContextError> {
		let target = validate_path(new_path)?;
		self.guarded(async move {
			let _io = self.io_lock.lock().await;
			let old_path = self.path();
			if old_path == target {
				return Ok(());
			}
			let contents = self.services.storage.rename(&old_path, &target).await?;
			{
				let mut state = self.state.write();
				state.path = target.clone();
				state.contents = Some(contents.clone());
			}
			info!(from = %old_path, to = %target, "document renamed");
			self.follow_path(&target).await;
			self.file_changed.emit(contents);
			self.path_changed.emit(PathChange {
				old_path,
				new_path: target,
			});
			Ok(())
		})
		.await
	}

	pub async fn create_checkpoint(&self) -> Result<Checkpoint, ContextError> {
		self.guarded(async move {
			let _io = self.io_lock.lock().await;
			let path = self.path();
			let checkpoint = self.services.storage.create_checkpoint(&path).await?;
			debug!(path = %path, id = %checkpoint.id, "checkpoint created");
			Ok(checkpoint)
		})
		.await
	}

	pub async fn delete_checkpoint(&self, id: &str) -> Result<(), ContextError> {
		self.guarded(async move {
			let path = self.path();
			Ok(self.services.storage.delete_checkpoint(&path, id).await?)
		})
		.await
	}

	/// Checkpoints of the current path, straight from storage.
	pub async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, ContextError> {
		self.guarded(async move {
			let path = self.path();
			Ok(self.services.storage.list_checkpoints(&path).await?)
		})
		.await
	}

	/// Restores checkpoint `id`, or the most recent one when `None`, then
	/// reloads the model as [`revert`](Self::revert) would.
	pub async fn restore_checkpoint(&self, id: Option<&str>) -> Result<(), ContextError> {
		self.guarded(async move {
			let _io = self.io_lock.lock().await;
			let path = self.path();
			let id = match id {
				Some(id) => id.to_string(),
				None => {
					let checkpoints = self.services.storage.list_checkpoints(&path).await?;
					latest_checkpoint(checkpoints)
						.map(|checkpoint| checkpoint.id)
						.ok_or_else(|| StorageError::CheckpointNotFound {
							path: path.clone(),
							id: "latest".into(),
						})?
				}
			};
			self.services.storage.restore_checkpoint(&path, &id).await?;
			info!(path = %path, id = %id, "checkpoint restored");
			self.load(&path).await
		})
		.await
	}

	/// Replaces the kernel session.
	///
	/// Any attached session is detached and shut down first. `None` leaves
	/// the context without a kernel. If establishing the new session fails
	/// the context also ends up without one.
	pub async fn change_kernel(&self, options: Option<KernelOptions>) -> Result<Option<KernelSession>, ContextError> {
		self.guarded(async move {
			let _kernel = self.kernel_lock.lock().await;
			let previous = self.state.write().session.take();
			if let Some(old) = &previous
				&& let Some(sessions) = &self.services.sessions
				&& let Err(error) = sessions.shutdown(old).await
			{
				warn!(kernel = %old.kernel_id, error = %error, "failed to shut down previous kernel");
			}

			let Some(options) = options else {
				if let Some(old) = &previous {
					info!(kernel = %old.kernel_id, "kernel detached");
					self.emit_kernel_change(previous, None);
				}
				return Ok(None);
			};

			let Some(sessions) = &self.services.sessions else {
				self.emit_kernel_change(previous, None);
				return Err(KernelError::Unavailable("no session manager configured".into()).into());
			};

			let request = SessionRequest {
				path: self.path(),
				kernel: options,
			};
			match sessions.start_or_connect(request).await {
				Ok(session) => {
					self.state.write().session = Some(session.clone());
					info!(kernel = %session.kernel_id, name = %session.kernel_name, "kernel attached");
					self.emit_kernel_change(previous, Some(session.clone()));
					Ok(Some(session))
				}
				Err(error) => {
					self.emit_kernel_change(previous, None);
					Err(error.into())
				}
			}
		})
		.await
	}

	/// Sessions known to the session manager. Empty without one.
	pub async fn list_sessions(&self) -> Result<Vec<KernelSession>, ContextError> {
		self.guarded(async move {
			match &self.services.sessions {
				Some(sessions) => Ok(sessions.list_sessions().await?),
				None => Ok(Vec::new()),
			}
		})
		.await
	}

	/// Resolves a resource reference relative to this document.
	pub fn resolve_url(&self, url: &str) -> Result<String, ContextError> {
		self.ensure_live()?;
		Ok(crate::url::resolve_url(&self.path(), url)?)
	}

	/// Registers `widget` as a view sharing this context.
	///
	/// The context only keeps a weak reference. Releasing the handle removes
	/// the registration without disposing anything.
	pub fn add_sibling(&self, widget: &Arc<dyn DocumentWidget>) -> Result<ScopedHandle, ContextError> {
		self.ensure_live()?;
		let token = {
			let mut siblings = self.siblings.lock();
			siblings.next_token += 1;
			let token = siblings.next_token;
			siblings.entries.push((token, Arc::downgrade(widget)));
			token
		};
		debug!(context = self.id.0, widget = widget.id().0, "sibling added");

		let siblings = Arc::downgrade(&self.siblings);
		Ok(ScopedHandle::new(move || {
			if let Some(siblings) = siblings.upgrade() {
				siblings.lock().entries.retain(|(entry, _)| *entry != token);
			}
		}))
	}

	/// Live views currently registered as siblings.
	pub fn siblings(&self) -> Vec<Arc<dyn DocumentWidget>> {
		self.siblings
			.lock()
			.entries
			.iter()
			.filter_map(|(_, widget)| widget.upgrade())
			.collect()
	}

	/// Disposes the context. Idempotent.
	///
	/// In-flight operations fail with [`ContextError::Disposed`]. The kernel
	/// session, if any, is shut down on the ambient tokio runtime.
	pub fn dispose(&self) {
		let session = {
			let mut state = self.state.write();
			if state.disposed {
				return;
			}
			state.disposed = true;
			state.session.take()
		};
		self.cancel.cancel();
		self.siblings.lock().entries.clear();
		self.model.dispose();

		if let Some(session) = session
			&& let Some(sessions) = self.services.sessions.clone()
		{
			match tokio::runtime::Handle::try_current() {
				Ok(runtime) => {
					runtime.spawn(async move {
						if let Err(error) = sessions.shutdown(&session).await {
							warn!(kernel = %session.kernel_id, error = %error, "kernel shutdown failed");
						}
					});
				}
				Err(_) => {
					warn!(kernel = %session.kernel_id, "no runtime to shut down kernel; session left running");
				}
			}
		}

		info!(context = self.id.0, path = %self.path(), "document context disposed");
		// Disconnects are queued behind this emit when dispose runs inside a handler.
		self.disposed.emit(());
		self.path_changed.disconnect_all();
		self.kernel_changed.disconnect_all();
		self.save_state.disconnect_all();
		self.file_changed.disconnect_all();
		self.disposed.disconnect_all();
	}

	/// Rebinds the attached kernel session, if any, to the document's new path.
	///
	/// The move has already happened in storage, so a manager that refuses
	/// is logged and the local handle still follows the document.
	async fn follow_path(&self, path: &str) {
		let Some(session) = self.kernel() else {
			return;
		};
		let mut updated = KernelSession {
			path: path.to_string(),
			..session.clone()
		};
		if let Some(sessions) = &self.services.sessions {
			match sessions.set_session_path(&session, path).await {
				Ok(rebound) => updated = rebound,
				Err(error) => warn!(kernel = %session.kernel_id, path, error = %error, "session path update failed"),
			}
		}
		let mut state = self.state.write();
		if state.session.as_ref().is_some_and(|current| current.id == session.id) {
			debug!(kernel = %updated.kernel_id, path = %updated.path, "kernel session follows document");
			state.session = Some(updated);
		}
	}

	fn ensure_live(&self) -> Result<(), ContextError> {
		if self.cancel.is_cancelled() {
			return Err(ContextError::Disposed);
		}
		Ok(())
	}

	/// Runs `operation` unless the context is, or becomes, disposed.
	async fn guarded<T>(&self, operation: impl Future<Output = Result<T, ContextError>>) -> Result<T, ContextError> {
		self.ensure_live()?;
		let result = tokio::select! {
			biased;
			_ = self.cancel.cancelled() => Err(ContextError::Disposed),
			result = operation => result,
		};
		// A handler run by the operation itself may have disposed us.
		self.ensure_live()?;
		result
	}

	async fn load(&self, path: &str) -> Result<(), ContextError> {
		let mut contents = self
			.services
			.storage
			.get(path, FetchOptions::content(self.file_format))
			.await?;
		match contents.content.take() {
			Some(Content::Json(value)) => self.model.from_json(&value)?,
			Some(Content::Text(text)) => self.model.from_text(&text)?,
			None => {
				return Err(StorageError::InvalidContent(format!("{path}: no content returned")).into());
			}
		}
		self.model.set_read_only(!contents.writable);
		self.state.write().contents = Some(contents.clone());
		info!(path = %path, "document loaded");
		self.file_changed.emit(contents);
		self.mark_populated();
		Ok(())
	}

	async fn write_to(&self, path: &str, force: bool) -> Result<(), ContextError> {
		self.save_state.emit(SaveState::Started);
		match self.try_write(path, force).await {
			Ok(contents) => {
				self.model.set_dirty(false);
				self.state.write().contents = Some(contents.clone());
				info!(path = %path, "document saved");
				self.file_changed.emit(contents);
				self.mark_populated();
				self.save_state.emit(SaveState::Completed);
				Ok(())
			}
			Err(error) => {
				warn!(path = %path, error = %error, "save failed");
				self.save_state.emit(SaveState::Failed);
				Err(error)
			}
		}
	}

	async fn try_write(&self, path: &str, force: bool) -> Result<ContentsModel, ContextError> {
		if !force {
			self.check_conflict(path).await?;
		}
		let content = match self.file_format {
			FileFormat::Json => Content::Json(self.model.to_json()),
			FileFormat::Text | FileFormat::Base64 => Content::Text(self.model.to_text()),
		};
		let request = SaveRequest {
			content_type: self.content_type,
			format: self.file_format,
			content,
		};
		let mut contents = self.services.storage.save(path, request).await?;
		contents.content = None;
		Ok(contents)
	}

	/// Fails with a conflict if `path` changed in storage after our snapshot.
	async fn check_conflict(&self, path: &str) -> Result<(), ContextError> {
		let snapshot = match &self.state.read().contents {
			Some(contents) if contents.path == path => contents.last_modified,
			_ => return Ok(()),
		};
		match self.services.storage.get(path, FetchOptions::metadata()).await {
			Ok(current) => {
				let changed = snapshot
					.checked_add_signed(self.check_margin)
					.is_some_and(|limit| current.last_modified > limit);
				if changed {
					warn!(path = %path, "file changed on disk since last load");
					return Err(StorageError::Conflict(path.to_string()).into());
				}
				Ok(())
			}
			Err(StorageError::NotFound(_)) => Ok(()),
			Err(error) => Err(error.into()),
		}
	}

	fn emit_kernel_change(&self, previous: Option<KernelSession>, current: Option<KernelSession>) {
		if previous.is_none() && current.is_none() {
			return;
		}
		self.kernel_changed.emit(KernelChange { previous, current });
	}

	fn mark_populated(&self) {
		self.populated.send_if_modified(|populated| !std::mem::replace(populated, true));
	}
}

impl Drop for DocumentContext {
	fn drop(&mut self) {
		self.dispose();
	}
}

fn validate_path(path: &str) -> Result<String, ContextError> {
	match paths::normalize(path) {
		Some(normal) if !normal.is_empty() => Ok(normal),
		_ => Err(ContextError::InvalidPath(path.to_string())),
	}
}

/// Most recent checkpoint by creation time, ties broken by id.
fn latest_checkpoint(checkpoints: Vec<Checkpoint>) -> Option<Checkpoint> {
	checkpoints
		.into_iter()
		.max_by(|a, b| a.created.cmp(&b.created).then_with(|| compare_ids(&a.id, &b.id)))
}

/// Numeric ids compare numerically, anything else lexicographically.
fn compare_ids(a: &str, b: &str) -> CmpOrdering {
	match (a.parse::<u64>(), b.parse::<u64>()) {
		(Ok(a), Ok(b)) => a.cmp(&b),
		_ => a.cmp(b),
	}
}
