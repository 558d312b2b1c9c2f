//! Opening documents through the registry, end to end.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use folio_context::{
	ContextError, ContextServices, DocumentContext, DocumentWidget, KernelSession, MemorySessions, MemoryStorage,
	StorageError, WidgetId,
};
use folio_model::{ScopedHandle, Subscription, TextModel, downcast_model};
use folio_registry::{
	DocumentRegistry, FileCreator, RegistryConfig, RegistryError, SelectionError, WidgetError, WidgetExtension,
	WidgetFactory, WidgetFactoryOptions,
};
use parking_lot::Mutex;

fn init_tracing() {
	let _ = tracing_subscriber::fmt::try_init();
}

/// View that counts content changes of the model it shows.
struct Editor {
	id: WidgetId,
	context: Arc<DocumentContext>,
	kernel: Option<KernelSession>,
	changes: Arc<AtomicUsize>,
	subscription: Mutex<Option<Subscription>>,
	disposed: AtomicBool,
}

impl Editor {
	fn changes(&self) -> usize {
		self.changes.load(Ordering::SeqCst)
	}
}

impl DocumentWidget for Editor {
	fn id(&self) -> WidgetId {
		self.id
	}

	fn dispose(&self) {
		self.disposed.store(true, Ordering::SeqCst);
		self.subscription.lock().take();
	}

	fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}
}

struct EditorFactory {
	options: WidgetFactoryOptions,
	created: Mutex<Vec<Arc<Editor>>>,
	fail: bool,
}

impl EditorFactory {
	fn new(options: WidgetFactoryOptions) -> Arc<Self> {
		Arc::new(Self {
			options,
			created: Mutex::new(Vec::new()),
			fail: false,
		})
	}

	fn failing(options: WidgetFactoryOptions) -> Arc<Self> {
		Arc::new(Self {
			options,
			created: Mutex::new(Vec::new()),
			fail: true,
		})
	}

	fn last(&self) -> Arc<Editor> {
		Arc::clone(self.created.lock().last().unwrap())
	}
}

impl WidgetFactory for EditorFactory {
	fn options(&self) -> &WidgetFactoryOptions {
		&self.options
	}

	fn create_widget(
		&self,
		context: &Arc<DocumentContext>,
		kernel: Option<&KernelSession>,
	) -> Result<Arc<dyn DocumentWidget>, WidgetError> {
		if self.fail {
			return Err(WidgetError::Failed(format!("{} refused", self.options.name)));
		}
		let changes = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&changes);
		let subscription = context.model().content_changed().connect(move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		});
		let editor = Arc::new(Editor {
			id: WidgetId::next(),
			context: Arc::clone(context),
			kernel: kernel.cloned(),
			changes,
			subscription: Mutex::new(Some(subscription)),
			disposed: AtomicBool::new(false),
		});
		self.created.lock().push(Arc::clone(&editor));
		Ok(editor)
	}
}

/// Extension that logs attach and detach events.
struct Toolbar {
	label: &'static str,
	log: Arc<Mutex<Vec<String>>>,
	fail: bool,
}

impl WidgetExtension for Toolbar {
	fn create_new(
		&self,
		_widget: &Arc<dyn DocumentWidget>,
		_context: &Arc<DocumentContext>,
	) -> Result<ScopedHandle, WidgetError> {
		if self.fail {
			return Err(WidgetError::Failed(format!("{} failed", self.label)));
		}
		self.log.lock().push(format!("attach {}", self.label));
		let log = Arc::clone(&self.log);
		let label = self.label;
		Ok(ScopedHandle::new(move || log.lock().push(format!("detach {label}"))))
	}
}

fn setup() -> (DocumentRegistry, Arc<MemoryStorage>) {
	init_tracing();
	let storage = Arc::new(MemoryStorage::new());
	let registry = DocumentRegistry::new(RegistryConfig::default(), ContextServices::new(storage.clone()));
	(registry, storage)
}

fn text(context: &DocumentContext) -> &TextModel {
	downcast_model::<TextModel>(context.model().as_ref()).unwrap()
}

#[tokio::test]
async fn open_builds_a_view_over_a_loaded_context() {
	let (registry, storage) = setup();
	storage.insert_text("notes.txt", "hello");
	let editor = EditorFactory::new(WidgetFactoryOptions::new("Editor").viewing(["*"]).default_for(["*"]));
	let _handle = registry.add_widget_factory(editor.clone()).unwrap();
	let created = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&created);
	let _created = registry
		.get_widget_factory("editor")
		.unwrap()
		.widget_created()
		.connect(move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		});

	let mut view = registry.open("notes.txt", None, None).await.unwrap();
	let context = Arc::clone(view.context());
	assert_eq!(view.factory_name(), "Editor");
	assert!(context.is_populated());
	assert_eq!(text(&context).text(), "hello");
	assert_eq!(context.siblings().len(), 1);
	assert_eq!(created.load(Ordering::SeqCst), 1);

	view.close();
	assert!(editor.last().is_disposed());
	assert!(context.siblings().is_empty());
	assert!(!context.is_disposed());
}

#[tokio::test]
async fn two_views_share_one_model() {
	let (registry, storage) = setup();
	storage.insert_text("notes.txt", "shared");
	let editor = EditorFactory::new(WidgetFactoryOptions::new("Editor").viewing([".txt"]).default_for([".txt"]));
	let preview = EditorFactory::new(WidgetFactoryOptions::new("Preview").viewing([".txt", ".md"]));
	let _editor = registry.add_widget_factory(editor.clone()).unwrap();
	let _preview = registry.add_widget_factory(preview.clone()).unwrap();

	let first = registry.open("notes.txt", None, None).await.unwrap();
	let second = registry.create_widget("Preview", first.context()).unwrap();
	assert!(Arc::ptr_eq(first.context(), second.context()));
	assert_eq!(first.context().siblings().len(), 2);

	text(first.context()).insert(0, "> ").unwrap();
	assert_eq!(editor.last().changes(), 1);
	assert_eq!(preview.last().changes(), 1);
	assert!(first.context().model().is_dirty());
}

#[tokio::test]
async fn read_only_factory_marks_only_its_views() {
	let (registry, storage) = setup();
	storage.insert_text("notes.txt", "shared");
	let editor = EditorFactory::new(WidgetFactoryOptions::new("Editor").viewing([".txt"]).default_for([".txt"]));
	let viewer = EditorFactory::new(WidgetFactoryOptions::new("Viewer").viewing([".txt"]).read_only(true));
	let _editor = registry.add_widget_factory(editor).unwrap();
	let _viewer = registry.add_widget_factory(viewer).unwrap();

	let editable = registry.open("notes.txt", None, None).await.unwrap();
	let frozen = registry.create_widget("Viewer", editable.context()).unwrap();
	assert!(registry.get_widget_factory("viewer").unwrap().options().read_only);
	assert!(!editable.is_read_only());
	assert!(frozen.is_read_only());
	assert!(!editable.context().model().is_read_only());

	editable.context().model().set_read_only(true);
	assert!(editable.is_read_only());
}

#[tokio::test]
async fn create_widget_checks_the_context() {
	let (registry, storage) = setup();
	storage.insert_text("notes.txt", "text");
	let editor = EditorFactory::new(WidgetFactoryOptions::new("Editor").viewing(["*"]).default_for(["*"]));
	let image = EditorFactory::new(WidgetFactoryOptions::new("Image").viewing([".png"]).with_model("base64"));
	let hex = EditorFactory::new(WidgetFactoryOptions::new("Hex").viewing(["*"]).with_model("base64"));
	let _handles = [
		registry.add_widget_factory(editor).unwrap(),
		registry.add_widget_factory(image).unwrap(),
		registry.add_widget_factory(hex).unwrap(),
	];

	let view = registry.open("notes.txt", None, None).await.unwrap();
	assert!(matches!(
		registry.create_widget("Image", view.context()),
		Err(RegistryError::Selection(SelectionError::NotApplicable { .. }))
	));
	assert!(matches!(
		registry.create_widget("Hex", view.context()),
		Err(RegistryError::Selection(SelectionError::ModelMismatch { .. }))
	));
	assert!(matches!(
		registry.create_widget("Missing", view.context()),
		Err(RegistryError::Selection(SelectionError::UnknownWidgetFactory(_)))
	));
}

#[tokio::test]
async fn extensions_detach_newest_first() {
	let (registry, storage) = setup();
	storage.insert_text("a.txt", "");
	let log = Arc::new(Mutex::new(Vec::new()));
	let editor = EditorFactory::new(WidgetFactoryOptions::new("Editor").viewing(["*"]).default_for(["*"]));
	let _editor = registry.add_widget_factory(editor).unwrap();
	let _ruler = registry
		.add_widget_extension(
			"Editor",
			Arc::new(Toolbar {
				label: "ruler",
				log: log.clone(),
				fail: false,
			}),
		)
		.unwrap();
	let minimap = registry
		.add_widget_extension(
			"editor",
			Arc::new(Toolbar {
				label: "minimap",
				log: log.clone(),
				fail: false,
			}),
		)
		.unwrap();

	let mut view = registry.open("a.txt", None, None).await.unwrap();
	assert_eq!(view.extension_count(), 2);
	view.close();
	view.close();
	assert_eq!(
		*log.lock(),
		["attach ruler", "attach minimap", "detach minimap", "detach ruler"]
	);

	drop(minimap);
	let view = registry.open("a.txt", None, None).await.unwrap();
	assert_eq!(view.extension_count(), 1);
}

#[tokio::test]
async fn failing_extension_tears_the_view_down() {
	let (registry, storage) = setup();
	storage.insert_text("a.txt", "");
	let log = Arc::new(Mutex::new(Vec::new()));
	let editor = EditorFactory::new(WidgetFactoryOptions::new("Editor").viewing(["*"]).default_for(["*"]));
	let _editor = registry.add_widget_factory(editor.clone()).unwrap();
	let _ruler = registry
		.add_widget_extension(
			"Editor",
			Arc::new(Toolbar {
				label: "ruler",
				log: log.clone(),
				fail: false,
			}),
		)
		.unwrap();
	let _broken = registry
		.add_widget_extension(
			"Editor",
			Arc::new(Toolbar {
				label: "broken",
				log: log.clone(),
				fail: true,
			}),
		)
		.unwrap();

	let err = registry.open("a.txt", None, None).await.unwrap_err();
	assert!(matches!(err, RegistryError::Widget(WidgetError::Failed(_))));
	assert_eq!(*log.lock(), ["attach ruler", "detach ruler"]);

	let widget = editor.last();
	assert!(widget.is_disposed());
	assert!(widget.context.is_disposed());
}

#[tokio::test]
async fn open_of_a_missing_file_fails_cleanly() {
	let (registry, _storage) = setup();
	let editor = EditorFactory::new(WidgetFactoryOptions::new("Editor").viewing(["*"]).default_for(["*"]));
	let _editor = registry.add_widget_factory(editor.clone()).unwrap();

	let err = registry.open("missing.txt", None, None).await.unwrap_err();
	assert!(matches!(
		err,
		RegistryError::Context(ContextError::Storage(StorageError::NotFound(_)))
	));
	assert!(editor.created.lock().is_empty());
}

#[tokio::test]
async fn failed_open_shuts_down_the_started_kernel() {
	init_tracing();
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("script.py", "print(1)");
	let sessions = Arc::new(MemorySessions::new().with_kernel("python3", "python"));
	let services = ContextServices::new(storage).with_sessions(sessions.clone());
	let registry = DocumentRegistry::new(RegistryConfig::default(), services);
	let console = EditorFactory::failing(
		WidgetFactoryOptions::new("Console")
			.viewing([".py"])
			.default_for([".py"])
			.with_kernel(true, true),
	);
	let _console = registry.add_widget_factory(console).unwrap();

	let err = registry.open("script.py", None, None).await.unwrap_err();
	assert!(matches!(err, RegistryError::Widget(WidgetError::Failed(_))));
	for _ in 0..8 {
		if sessions.sessions().is_empty() {
			break;
		}
		tokio::task::yield_now().await;
	}
	assert!(sessions.sessions().is_empty());
}

#[tokio::test]
async fn preferred_kernel_starts_on_open() {
	init_tracing();
	let storage = Arc::new(MemoryStorage::new());
	storage.insert_text("script.py", "print(1)");
	let sessions = Arc::new(MemorySessions::new().with_kernel("ir", "r").with_kernel("python3", "python"));
	let services = ContextServices::new(storage).with_sessions(sessions.clone());
	let registry = DocumentRegistry::new(RegistryConfig::default(), services);
	let console = EditorFactory::new(
		WidgetFactoryOptions::new("Console")
			.viewing([".py"])
			.default_for([".py"])
			.with_kernel(true, true),
	);
	let _console = registry.add_widget_factory(console.clone()).unwrap();

	let view = registry.open("script.py", None, None).await.unwrap();
	let kernel = view.context().kernel().unwrap();
	assert_eq!(kernel.kernel_name, "python3");
	assert_eq!(console.last().kernel.as_ref(), Some(&kernel));
	assert_eq!(sessions.sessions().len(), 1);
}

#[tokio::test]
async fn create_new_writes_the_file() {
	let (registry, storage) = setup();
	let editor = EditorFactory::new(WidgetFactoryOptions::new("Editor").viewing([".md"]).default_for([".md"]));
	let _editor = registry.add_widget_factory(editor).unwrap();

	let view = registry.create_new("docs/plan.md", None, None).await.unwrap();
	assert!(view.context().is_populated());
	assert!(storage.contains("docs/plan.md"));
	assert!(!view.context().model().is_dirty());
}

#[tokio::test]
async fn create_untitled_picks_a_free_name() {
	let (registry, storage) = setup();
	storage.insert_text("drafts/untitled.txt", "taken");
	let editor = EditorFactory::new(WidgetFactoryOptions::new("Editor").viewing([".txt"]).default_for([".txt"]));
	let _editor = registry.add_widget_factory(editor).unwrap();
	let _creator = registry.add_file_creator(FileCreator::new("Text File", "text")).unwrap();

	let view = registry.create_untitled("Text File", "drafts").await.unwrap();
	assert_eq!(view.context().path(), "drafts/untitled1.txt");
	assert!(view.context().is_untitled());
	assert!(storage.contains("drafts/untitled1.txt"));
	assert_eq!(storage.read_text("drafts/untitled.txt").as_deref(), Some("taken"));

	assert!(matches!(
		registry.create_untitled("Spreadsheet", "drafts").await,
		Err(RegistryError::Selection(SelectionError::UnknownFileCreator(_)))
	));
}

#[tokio::test]
async fn disposed_registry_refuses_to_open() {
	let (registry, storage) = setup();
	storage.insert_text("a.txt", "");
	let editor = EditorFactory::new(WidgetFactoryOptions::new("Editor").viewing(["*"]).default_for(["*"]));
	let _editor = registry.add_widget_factory(editor).unwrap();

	registry.dispose();
	assert!(matches!(
		registry.open("a.txt", None, None).await,
		Err(RegistryError::Disposed)
	));
}
