use std::sync::Arc;

use chrono::Utc;
use folio_model::{DocumentModel, ModelOptions, TextModel, downcast_model};
use parking_lot::Mutex;

use super::*;
use crate::{MemorySessions, MemoryStorage, WidgetId};

struct FixedPrompt(Option<&'static str>);

#[async_trait::async_trait]
impl PathPrompt for FixedPrompt {
	async fn prompt_for_path(&self, _current: &str) -> Option<String> {
		self.0.map(str::to_string)
	}
}

fn text_context(storage: &Arc<MemoryStorage>, path: &str) -> DocumentContext {
	let model: Arc<dyn DocumentModel> = Arc::new(TextModel::new(&ModelOptions::default()));
	DocumentContext::new(model, ContextOptions::new(path), ContextServices::new(storage.clone())).unwrap()
}

fn text(context: &DocumentContext) -> &TextModel {
	downcast_model::<TextModel>(context.model().as_ref()).unwrap()
}

fn record<T: Clone + Send + 'static>(signal: &Signal<T>) -> Arc<Mutex<Vec<T>>> {
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&seen);
	signal.connect(move |value: &T| sink.lock().push(value.clone())).detach();
	seen
}

#[test]
fn rejects_invalid_paths() {
	let storage = Arc::new(MemoryStorage::new());
	let model: Arc<dyn DocumentModel> = Arc::new(TextModel::new(&ModelOptions::default()));
	for bad in ["", "/", "../up.txt"] {
		let result = DocumentContext::new(
			Arc::clone(&model),
			ContextOptions::new(bad),
			ContextServices::new(storage.clone()),
		);
		assert!(matches!(result, Err(ContextError::InvalidPath(_))), "{bad:?}");
	}
}

#[tokio::test]
async fn revert_populates_and_reports_snapshot() {
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("notes.txt", "hello");
	let context = text_context(&storage, "/notes.txt");
	let snapshots = record(context.file_changed());
	assert_eq!(context.path(), "notes.txt");
	assert!(!context.is_populated());
	assert!(context.contents_model().is_none());

	context.revert().await.unwrap();

	assert!(context.is_populated());
	assert_eq!(text(&context).text(), "hello");
	assert!(!context.model().is_dirty());
	let contents = context.contents_model().unwrap();
	assert!(contents.content.is_none());
	assert_eq!(snapshots.lock().as_slice(), &[contents]);
}

#[tokio::test]
async fn failed_revert_leaves_state_alone() {
	let storage = Arc::new(MemoryStorage::new());
	let context = text_context(&storage, "missing.txt");
	text(&context).set_text("draft").unwrap();

	let err = context.revert().await.unwrap_err();
	assert_eq!(err, ContextError::Storage(StorageError::NotFound("missing.txt".into())));
	assert_eq!(text(&context).text(), "draft");
	assert!(context.model().is_dirty());
	assert!(!context.is_populated());
}

#[tokio::test]
async fn read_only_follows_backend() {
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("locked.txt", "x");
	storage.set_writable("locked.txt", false);
	let context = text_context(&storage, "locked.txt");

	context.revert().await.unwrap();
	assert!(context.model().is_read_only());
	assert_eq!(text(&context).insert(0, "y"), Err(folio_model::ModelError::ReadOnly));
}

#[tokio::test]
async fn save_writes_and_reports_progress() {
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("a.txt", "old");
	let context = text_context(&storage, "a.txt");
	context.revert().await.unwrap();
	let states = record(context.save_state());

	text(&context).set_text("new").unwrap();
	assert!(context.model().is_dirty());
	assert_eq!(context.save().await.unwrap(), SaveOutcome::Saved);

	assert_eq!(storage.read_text("a.txt").as_deref(), Some("new"));
	assert!(!context.model().is_dirty());
	assert_eq!(states.lock().as_slice(), &[SaveState::Started, SaveState::Completed]);
}

#[tokio::test]
async fn failed_save_keeps_dirty_and_snapshot() {
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("a.txt", "old");
	let context = text_context(&storage, "a.txt");
	context.revert().await.unwrap();
	let before = context.contents_model();
	let states = record(context.save_state());

	storage.set_writable("a.txt", false);
	text(&context).set_text("new").unwrap();
	let err = context.save().await.unwrap_err();

	assert_eq!(err, ContextError::Storage(StorageError::PermissionDenied("a.txt".into())));
	assert!(context.model().is_dirty());
	assert_eq!(context.contents_model(), before);
	assert_eq!(states.lock().as_slice(), &[SaveState::Started, SaveState::Failed]);
}

#[tokio::test]
async fn external_change_is_a_conflict_unless_forced() {
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("a.txt", "v1");
	let context = text_context(&storage, "a.txt");
	context.revert().await.unwrap();

	storage.touch("a.txt", Utc::now() + TimeDelta::seconds(60));
	text(&context).set_text("mine").unwrap();
	let err = context.save().await.unwrap_err();
	assert_eq!(err, ContextError::Storage(StorageError::Conflict("a.txt".into())));
	assert_eq!(storage.read_text("a.txt").as_deref(), Some("v1"));

	context.save_with(SaveOptions { force: true }).await.unwrap();
	assert_eq!(storage.read_text("a.txt").as_deref(), Some("mine"));
}

#[tokio::test]
async fn touch_within_margin_is_not_a_conflict() {
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("a.txt", "v1");
	let context = text_context(&storage, "a.txt");
	context.revert().await.unwrap();

	let loaded = context.contents_model().unwrap().last_modified;
	storage.touch("a.txt", loaded + TimeDelta::milliseconds(100));
	context.save().await.unwrap();
}

#[tokio::test]
async fn deleted_file_is_not_a_conflict() {
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("a.txt", "v1");
	let context = text_context(&storage, "a.txt");
	context.revert().await.unwrap();

	storage.rename("a.txt", "elsewhere.txt").await.unwrap();
	context.save().await.unwrap();
	assert_eq!(storage.read_text("a.txt").as_deref(), Some("v1"));
}

#[tokio::test]
async fn save_as_moves_the_document() {
	let storage = Arc::new(MemoryStorage::new());
	let model: Arc<dyn DocumentModel> = Arc::new(TextModel::new(&ModelOptions::default()));
	let services = ContextServices::new(storage.clone()).with_prompt(Arc::new(FixedPrompt(Some("dir/b.txt"))));
	let context = DocumentContext::new(model, ContextOptions::new("untitled.txt").untitled(true), services).unwrap();
	let moves = record(context.path_changed());
	text(&context).set_text("body").unwrap();

	assert_eq!(context.save().await.unwrap(), SaveOutcome::Saved);

	assert_eq!(context.path(), "dir/b.txt");
	assert!(!context.is_untitled());
	assert_eq!(storage.read_text("dir/b.txt").as_deref(), Some("body"));
	assert!(!storage.contains("untitled.txt"));
	assert_eq!(
		moves.lock().as_slice(),
		&[PathChange {
			old_path: "untitled.txt".into(),
			new_path: "dir/b.txt".into(),
		}]
	);
}

#[tokio::test]
async fn cancelled_save_as_changes_nothing() {
	let storage = Arc::new(MemoryStorage::new());
	let model: Arc<dyn DocumentModel> = Arc::new(TextModel::new(&ModelOptions::default()));
	let services = ContextServices::new(storage.clone()).with_prompt(Arc::new(FixedPrompt(None)));
	let context = DocumentContext::new(model, ContextOptions::new("a.txt"), services).unwrap();
	let moves = record(context.path_changed());
	let states = record(context.save_state());
	text(&context).set_text("unsaved").unwrap();

	assert_eq!(context.save_as().await.unwrap(), SaveOutcome::Cancelled);
	assert_eq!(context.path(), "a.txt");
	assert!(context.model().is_dirty());
	assert!(!storage.contains("a.txt"));
	assert!(moves.lock().is_empty());
	assert!(states.lock().is_empty());
}

#[tokio::test]
async fn untitled_save_without_prompt_fails() {
	let storage = Arc::new(MemoryStorage::new());
	let model: Arc<dyn DocumentModel> = Arc::new(TextModel::new(&ModelOptions::default()));
	let context = DocumentContext::new(
		model,
		ContextOptions::new("untitled.txt").untitled(true),
		ContextServices::new(storage.clone()),
	)
	.unwrap();
	assert_eq!(context.save().await, Err(ContextError::NoPathPrompt));
}

#[tokio::test]
async fn initialize_new_writes_then_ready_resolves() {
	let storage = Arc::new(MemoryStorage::new());
	let context = text_context(&storage, "fresh.txt");
	context.initialize(true).await.unwrap();
	context.ready().await.unwrap();
	assert!(storage.contains("fresh.txt"));
	assert!(context.is_populated());
}

#[tokio::test]
async fn rename_updates_path_and_storage() {
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("a.txt", "x");
	let context = text_context(&storage, "a.txt");
	context.revert().await.unwrap();
	let moves = record(context.path_changed());

	context.rename("b.md").await.unwrap();

	assert_eq!(context.path(), "b.md");
	assert_eq!(context.contents_model().unwrap().path, "b.md");
	assert!(storage.contains("b.md"));
	assert_eq!(moves.lock().len(), 1);
}

#[tokio::test]
async fn restore_defaults_to_latest_checkpoint() {
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("a.txt", "one");
	let context = text_context(&storage, "a.txt");
	context.revert().await.unwrap();
	context.create_checkpoint().await.unwrap();
	storage.insert_text("a.txt", "two");
	context.create_checkpoint().await.unwrap();
	storage.insert_text("a.txt", "three");

	context.restore_checkpoint(None).await.unwrap();
	assert_eq!(text(&context).text(), "two");
	assert!(!context.model().is_dirty());
}

#[tokio::test]
async fn restore_without_checkpoints_fails() {
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("a.txt", "one");
	let context = text_context(&storage, "a.txt");
	let err = context.restore_checkpoint(None).await.unwrap_err();
	assert!(matches!(
		err,
		ContextError::Storage(StorageError::CheckpointNotFound { .. })
	));
}

#[test]
fn latest_checkpoint_breaks_ties_by_id() {
	let at = Utc::now();
	let make = |id: &str| Checkpoint {
		id: id.into(),
		created: at,
	};
	let latest = latest_checkpoint(vec![make("9"), make("10"), make("2")]).unwrap();
	assert_eq!(latest.id, "10");
	assert_eq!(compare_ids("b", "a"), CmpOrdering::Greater);
	assert!(latest_checkpoint(Vec::new()).is_none());
}

#[tokio::test]
async fn kernel_accessor_is_current_inside_notification() {
	let storage = Arc::new(MemoryStorage::new());
	let sessions = Arc::new(MemorySessions::new().with_kernel("python3", "python"));
	let model: Arc<dyn DocumentModel> = Arc::new(TextModel::new(&ModelOptions::default()));
	let context = Arc::new(
		DocumentContext::new(
			model,
			ContextOptions::new("a.py"),
			ContextServices::new(storage).with_sessions(sessions.clone()),
		)
		.unwrap(),
	);

	let observed = Arc::new(Mutex::new(Vec::new()));
	let weak = Arc::downgrade(&context);
	let sink = Arc::clone(&observed);
	context
		.kernel_changed()
		.connect(move |change: &KernelChange| {
			let current = weak.upgrade().and_then(|context| context.kernel());
			assert_eq!(current, change.current);
			sink.lock().push(change.clone());
		})
		.detach();

	let first = context.change_kernel(Some(KernelOptions::default())).await.unwrap().unwrap();
	let second = context
		.change_kernel(Some(KernelOptions::named("python3")))
		.await
		.unwrap()
		.unwrap();

	assert_eq!(sessions.sessions(), vec![second.clone()]);
	let observed = observed.lock();
	assert_eq!(observed.len(), 2);
	assert_eq!(observed[1].previous.as_ref(), Some(&first));
	assert_eq!(observed[1].current.as_ref(), Some(&second));
}

#[tokio::test]
async fn failed_kernel_start_leaves_no_kernel() {
	let storage = Arc::new(MemoryStorage::new());
	let sessions = Arc::new(MemorySessions::new().with_kernel("python3", "python"));
	let model: Arc<dyn DocumentModel> = Arc::new(TextModel::new(&ModelOptions::default()));
	let context = DocumentContext::new(
		model,
		ContextOptions::new("a.py"),
		ContextServices::new(storage).with_sessions(sessions.clone()),
	)
	.unwrap();
	let changes = record(context.kernel_changed());

	let old = context.change_kernel(Some(KernelOptions::default())).await.unwrap();
	let err = context
		.change_kernel(Some(KernelOptions::named("julia")))
		.await
		.unwrap_err();

	assert_eq!(err, ContextError::Kernel(KernelError::NotFound("julia".into())));
	assert!(context.kernel().is_none());
	assert!(sessions.sessions().is_empty());
	let changes = changes.lock();
	assert_eq!(changes.len(), 2);
	assert_eq!(changes[1].previous, old);
	assert_eq!(changes[1].current, None);
}

#[tokio::test]
async fn kernel_without_manager() {
	let storage = Arc::new(MemoryStorage::new());
	let context = text_context(&storage, "a.py");
	assert!(context.list_sessions().await.unwrap().is_empty());
	assert!(context.change_kernel(None).await.unwrap().is_none());
	assert!(matches!(
		context.change_kernel(Some(KernelOptions::default())).await,
		Err(ContextError::Kernel(KernelError::Unavailable(_)))
	));
}

struct View(WidgetId);

impl DocumentWidget for View {
	fn id(&self) -> WidgetId {
		self.0
	}

	fn dispose(&self) {}

	fn is_disposed(&self) -> bool {
		false
	}
}

#[tokio::test]
async fn sibling_registration_is_scoped() {
	let storage = Arc::new(MemoryStorage::new());
	let context = text_context(&storage, "a.txt");
	let first: Arc<dyn DocumentWidget> = Arc::new(View(WidgetId::next()));
	let second: Arc<dyn DocumentWidget> = Arc::new(View(WidgetId::next()));

	let mut first_handle = context.add_sibling(&first).unwrap();
	let _second_handle = context.add_sibling(&second).unwrap();
	assert_eq!(context.siblings().len(), 2);

	first_handle.release();
	first_handle.release();
	let ids: Vec<_> = context.siblings().iter().map(|view| view.id()).collect();
	assert_eq!(ids, vec![second.id()]);

	drop(second);
	assert!(context.siblings().is_empty());
}

#[tokio::test]
async fn dispose_is_terminal_and_idempotent() {
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("a.txt", "x");
	let context = text_context(&storage, "a.txt");
	let view: Arc<dyn DocumentWidget> = Arc::new(View(WidgetId::next()));
	let _sibling = context.add_sibling(&view).unwrap();
	let disposals = record(context.disposed());

	context.dispose();
	context.dispose();

	assert_eq!(disposals.lock().len(), 1);
	assert!(context.is_disposed());
	assert!(context.model().is_disposed());
	assert!(context.siblings().is_empty());
	assert_eq!(context.revert().await, Err(ContextError::Disposed));
	assert_eq!(context.save().await, Err(ContextError::Disposed));
	assert_eq!(context.list_checkpoints().await, Err(ContextError::Disposed));
	assert_eq!(context.list_sessions().await, Err(ContextError::Disposed));
	assert_eq!(context.ready().await, Err(ContextError::Disposed));
	assert_eq!(context.resolve_url("x.png"), Err(ContextError::Disposed));
	assert!(context.add_sibling(&view).is_err());
}

#[tokio::test]
async fn resolve_url_is_relative_to_document() {
	let storage = Arc::new(MemoryStorage::new());
	let context = text_context(&storage, "docs/readme.md");
	assert_eq!(context.resolve_url("img/logo.png").unwrap(), "/docs/img/logo.png");
	assert!(matches!(
		context.resolve_url("../../x"),
		Err(ContextError::Url(crate::UrlError::EscapesRoot(_)))
	));
}

#[tokio::test]
async fn dispose_from_save_handler_fails_the_save() {
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("a.txt", "x");
	let context = Arc::new(text_context(&storage, "a.txt"));
	context.revert().await.unwrap();
	let disposals = record(context.disposed());
	let weak = Arc::downgrade(&context);
	context
		.file_changed()
		.connect(move |_: &ContentsModel| {
			if let Some(context) = weak.upgrade() {
				context.dispose();
			}
		})
		.detach();
	text(&context).set_text("edited").unwrap();

	assert_eq!(context.save().await, Err(ContextError::Disposed));

	assert!(context.is_disposed());
	assert_eq!(disposals.lock().len(), 1);
	assert_eq!(context.disposed().handler_count(), 0);
	assert_eq!(context.file_changed().handler_count(), 0);
}

#[tokio::test]
async fn dispose_from_model_handler_still_notifies() {
	let storage = Arc::new(MemoryStorage::new());
	let context = Arc::new(text_context(&storage, "a.txt"));
	let disposals = record(context.disposed());
	let weak = Arc::downgrade(&context);
	context
		.model()
		.content_changed()
		.connect(move |_| {
			if let Some(context) = weak.upgrade() {
				context.dispose();
			}
		})
		.detach();

	text(&context).set_text("boom").unwrap();

	assert!(context.is_disposed());
	assert_eq!(disposals.lock().len(), 1);
}

fn kernel_context(storage: Arc<MemoryStorage>, sessions: &Arc<MemorySessions>, path: &str) -> DocumentContext {
	let model: Arc<dyn DocumentModel> = Arc::new(TextModel::new(&ModelOptions::default()));
	let services = ContextServices::new(storage)
		.with_sessions(sessions.clone())
		.with_prompt(Arc::new(FixedPrompt(Some("moved/b.py"))));
	DocumentContext::new(model, ContextOptions::new(path), services).unwrap()
}

#[tokio::test]
async fn rename_rebinds_kernel_session() {
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("a.py", "x = 1");
	let sessions = Arc::new(MemorySessions::new().with_kernel("python3", "python"));
	let context = kernel_context(storage, &sessions, "a.py");
	context.revert().await.unwrap();
	let session = context.change_kernel(Some(KernelOptions::default())).await.unwrap().unwrap();
	assert_eq!(session.path, "a.py");

	context.rename("b.py").await.unwrap();

	let current = context.kernel().unwrap();
	assert_eq!(current.id, session.id);
	assert_eq!(current.path, "b.py");
	assert_eq!(sessions.sessions(), vec![current]);
}

#[tokio::test]
async fn save_as_rebinds_kernel_session() {
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("a.py", "x = 1");
	let sessions = Arc::new(MemorySessions::new().with_kernel("python3", "python"));
	let context = kernel_context(storage, &sessions, "a.py");
	context.revert().await.unwrap();
	context.change_kernel(Some(KernelOptions::default())).await.unwrap();

	assert_eq!(context.save_as().await.unwrap(), SaveOutcome::Saved);

	assert_eq!(context.kernel().unwrap().path, "moved/b.py");
	assert_eq!(sessions.sessions()[0].path, "moved/b.py");
}
