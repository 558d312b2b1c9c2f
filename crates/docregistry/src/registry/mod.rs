//! Document registry.
//!
//! Maps file extensions to model and widget factories, resolves the default
//! viewer for a path, and builds document contexts and views.
//!
//! # Default viewer resolution
//!
//! For the extension of a path, in order:
//! 1. an explicit default set with [`DocumentRegistry::set_default_widget_factory`]
//! 2. a factory whose `default_for` lists the exact extension
//! 3. a factory whose `default_for` lists `*`
//!
//! Within a step the most recent registration wins. Registering under an
//! existing name replaces the earlier registration.


use std::sync::{Arc, Weak};

use folio_context::{
	ContextError, ContextOptions, ContextServices, DocumentContext, FetchOptions, KernelOptions, StorageError, paths,
};
use folio_model::{ModelOptions, ScopedHandle, Signal};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::factory::{Base64ModelFactory, ModelFactory, TextModelFactory, WidgetExtension, WidgetFactory, WidgetFactoryOptions};
use crate::file_type::{FileCreator, FileType};
use crate::view::{DocumentView, RegisteredWidgetFactory};
use crate::{ConfigurationError, RegistryError, SelectionError};

/// Upper bound on `untitled{n}` candidates tried by `create_untitled`.
const MAX_UNTITLED: usize = 1000;

/// Kind of registration reported on [`DocumentRegistry::changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryKind {
	ModelFactory,
	WidgetFactory,
	WidgetExtension,
	FileType,
	FileCreator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
	Added,
	Removed,
}

/// Payload of [`DocumentRegistry::changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryChange {
	pub kind: RegistryKind,
	/// Normalized (lowercase) name. For widget extensions, the widget name.
	pub name: String,
	pub change: ChangeKind,
}

/// Which kernel to use for a document, and whether to start one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelPreference {
	pub name: Option<String>,
	pub id: Option<String>,
	pub language: Option<String>,
	pub should_start: bool,
	pub can_start: bool,
}

struct Entry<T> {
	token: u64,
	value: T,
}

#[derive(Default)]
struct RegistryState {
	next_token: u64,
	disposed: bool,
	model_factories: IndexMap<String, Entry<Arc<dyn ModelFactory>>>,
	widget_factories: IndexMap<String, Entry<Arc<RegisteredWidgetFactory>>>,
	widget_extensions: IndexMap<String, Vec<Entry<Arc<dyn WidgetExtension>>>>,
	file_types: IndexMap<String, Entry<FileType>>,
	file_creators: IndexMap<String, Entry<FileCreator>>,
	/// Extension to widget factory name.
	default_overrides: IndexMap<String, String>,
}

impl RegistryState {
	fn resolve_default(&self, extension: Option<&str>) -> Option<Arc<RegisteredWidgetFactory>> {
		if let Some(extension) = extension {
			if let Some(name) = self.default_overrides.get(extension)
				&& let Some(entry) = self.widget_factories.get(name)
				&& entry.value.can_view_extension(Some(extension))
			{
				return Some(Arc::clone(&entry.value));
			}
			if let Some(entry) = self
				.widget_factories
				.values()
				.rev()
				.find(|entry| entry.value.is_default_for(extension))
			{
				return Some(Arc::clone(&entry.value));
			}
		}
		self.widget_factories
			.values()
			.rev()
			.find(|entry| entry.value.is_default_for("*"))
			.map(|entry| Arc::clone(&entry.value))
	}
}

struct Inner {
	state: RwLock<RegistryState>,
	changed: Signal<RegistryChange>,
	services: ContextServices,
	config: RegistryConfig,
	/// Normalized `config.default_viewers`.
	default_viewers: Vec<(String, String)>,
}

impl Inner {
	fn unregister(&self, kind: RegistryKind, key: &str, token: u64) {
		let removed = {
			let mut state = self.state.write();
			match kind {
				RegistryKind::ModelFactory => remove_entry(&mut state.model_factories, key, token),
				RegistryKind::WidgetFactory => {
					let removed = remove_entry(&mut state.widget_factories, key, token);
					if removed {
						state.default_overrides.retain(|_, name| name != key);
					}
					removed
				}
				RegistryKind::WidgetExtension => match state.widget_extensions.get_mut(key) {
					Some(list) => {
						let before = list.len();
						list.retain(|entry| entry.token != token);
						list.len() != before
					}
					None => false,
				},
				RegistryKind::FileType => remove_entry(&mut state.file_types, key, token),
				RegistryKind::FileCreator => remove_entry(&mut state.file_creators, key, token),
			}
		};
		if removed {
			debug!(kind = ?kind, name = %key, "registration removed");
			self.changed.emit(RegistryChange {
				kind,
				name: key.to_string(),
				change: ChangeKind::Removed,
			});
		}
	}
}

/// Explicitly owned registry of document factories and file metadata.
///
/// Every registration returns a [`ScopedHandle`] that unregisters it.
/// Releasing a handle whose registration was since replaced under the same
/// name leaves the replacement in place.
pub struct DocumentRegistry {
	inner: Arc<Inner>,
}

impl DocumentRegistry {
	/// Creates a registry whose contexts use `services`.
	pub fn new(config: RegistryConfig, services: ContextServices) -> Self {
		let default_viewers = config
			.default_viewers
			.iter()
			.filter_map(|(extension, name)| match normalize_extension(extension) {
				Some(extension) if extension != "*" => Some((extension, name.trim().to_lowercase())),
				_ => {
					warn!(extension = %extension, factory = %name, "ignoring invalid default viewer setting");
					None
				}
			})
			.collect();

		let registry = Self {
			inner: Arc::new(Inner {
				state: RwLock::new(RegistryState::default()),
				changed: Signal::new(),
				services,
				config,
				default_viewers,
			}),
		};

		if registry.inner.config.register_default_model_factories {
			let defaults: [Arc<dyn ModelFactory>; 2] = [Arc::new(TextModelFactory), Arc::new(Base64ModelFactory)];
			for factory in defaults {
				match registry.add_model_factory(factory) {
					Ok(handle) => handle.detach(),
					Err(error) => warn!(error = %error, "failed to register default model factory"),
				}
			}
		}
		if registry.inner.config.initial_file_types {
			for file_type in FileType::defaults() {
				match registry.add_file_type(file_type) {
					Ok(handle) => handle.detach(),
					Err(error) => warn!(error = %error, "failed to register default file type"),
				}
			}
		}
		registry
	}

	pub fn config(&self) -> &RegistryConfig {
		&self.inner.config
	}

	/// Emits on every registration and unregistration.
	pub fn changed(&self) -> &Signal<RegistryChange> {
		&self.inner.changed
	}

	pub fn add_model_factory(&self, factory: Arc<dyn ModelFactory>) -> Result<ScopedHandle, RegistryError> {
		let key = normalize_name(factory.name(), "model factory")?;
		let entry_key = key.clone();
		self.register(RegistryKind::ModelFactory, key, move |state, token| {
			insert_entry(&mut state.model_factories, entry_key, token, factory);
		})
	}

	/// Registers a widget factory, validating its extensions.
	///
	/// Fails with [`ConfigurationError::DefaultNotViewable`] if `default_for`
	/// names an extension the factory cannot view.
	pub fn add_widget_factory(&self, factory: Arc<dyn WidgetFactory>) -> Result<ScopedHandle, RegistryError> {
		let options = normalize_widget_options(factory.options())?;
		let key = options.name.to_lowercase();
		let registered = Arc::new(RegisteredWidgetFactory::new(factory, options));
		let viewers: Vec<String> = self
			.inner
			.default_viewers
			.iter()
			.filter(|(extension, name)| *name == key && registered.can_view_extension(Some(extension)))
			.map(|(extension, _)| extension.clone())
			.collect();

		let entry_key = key.clone();
		self.register(RegistryKind::WidgetFactory, key, move |state, token| {
			for extension in viewers {
				state.default_overrides.insert(extension, entry_key.clone());
			}
			insert_entry(&mut state.widget_factories, entry_key, token, registered);
		})
	}

	/// Attaches `extension` to every view created by the widget factory `widget_name`.
	pub fn add_widget_extension(
		&self,
		widget_name: &str,
		extension: Arc<dyn WidgetExtension>,
	) -> Result<ScopedHandle, RegistryError> {
		let key = normalize_name(widget_name, "widget")?;
		let entry_key = key.clone();
		self.register(RegistryKind::WidgetExtension, key, move |state, token| {
			state.widget_extensions.entry(entry_key).or_default().push(Entry {
				token,
				value: extension,
			});
		})
	}

	pub fn add_file_type(&self, mut file_type: FileType) -> Result<ScopedHandle, RegistryError> {
		let key = normalize_name(&file_type.name, "file type")?;
		let mut extensions = Vec::with_capacity(file_type.extensions.len());
		for raw in &file_type.extensions {
			match normalize_extension(raw) {
				Some(extension) if extension != "*" => push_unique(&mut extensions, extension),
				_ => {
					return Err(ConfigurationError::InvalidExtension {
						owner: file_type.name.clone(),
						extension: raw.clone(),
					}
					.into());
				}
			}
		}
		file_type.extensions = extensions;
		let entry_key = key.clone();
		self.register(RegistryKind::FileType, key, move |state, token| {
			insert_entry(&mut state.file_types, entry_key, token, file_type);
		})
	}

	pub fn add_file_creator(&self, creator: FileCreator) -> Result<ScopedHandle, RegistryError> {
		let key = normalize_name(&creator.name, "file creator")?;
		normalize_name(&creator.file_type, "file type")?;
		let entry_key = key.clone();
		self.register(RegistryKind::FileCreator, key, move |state, token| {
			insert_entry(&mut state.file_creators, entry_key, token, creator);
		})
	}

	/// Sets (or with `None` clears) the default viewer for `extension`,
	/// overriding the factories' own `default_for`.
	pub fn set_default_widget_factory(&self, extension: &str, widget_name: Option<&str>) -> Result<(), RegistryError> {
		let normalized = match normalize_extension(extension) {
			Some(normalized) if normalized != "*" => normalized,
			_ => {
				return Err(ConfigurationError::InvalidExtension {
					owner: "default widget factory".into(),
					extension: extension.to_string(),
				}
				.into());
			}
		};

		let mut state = self.inner.state.write();
		if state.disposed {
			return Err(RegistryError::Disposed);
		}
		let Some(name) = widget_name else {
			state.default_overrides.shift_remove(&normalized);
			return Ok(());
		};
		let key = name.trim().to_lowercase();
		let entry = state
			.widget_factories
			.get(&key)
			.ok_or_else(|| ConfigurationError::UnknownWidgetFactory(name.to_string()))?;
		if !entry.value.can_view_extension(Some(&normalized)) {
			return Err(ConfigurationError::NotApplicable {
				factory: name.to_string(),
				extension: normalized,
			}
			.into());
		}
		debug!(extension = %normalized, factory = %key, "default viewer set");
		state.default_overrides.insert(normalized, key);
		Ok(())
	}

	pub fn get_model_factory(&self, name: &str) -> Option<Arc<dyn ModelFactory>> {
		let state = self.inner.state.read();
		state
			.model_factories
			.get(&name.trim().to_lowercase())
			.map(|entry| Arc::clone(&entry.value))
	}

	pub fn get_widget_factory(&self, name: &str) -> Option<Arc<RegisteredWidgetFactory>> {
		let state = self.inner.state.read();
		state
			.widget_factories
			.get(&name.trim().to_lowercase())
			.map(|entry| Arc::clone(&entry.value))
	}

	/// All widget factories, oldest registration first.
	pub fn widget_factories(&self) -> Vec<Arc<RegisteredWidgetFactory>> {
		let state = self.inner.state.read();
		state.widget_factories.values().map(|entry| Arc::clone(&entry.value)).collect()
	}

	/// Extensions registered for the widget factory `widget_name`, in registration order.
	pub fn widget_extensions(&self, widget_name: &str) -> Vec<Arc<dyn WidgetExtension>> {
		let state = self.inner.state.read();
		state
			.widget_extensions
			.get(&widget_name.trim().to_lowercase())
			.map(|list| list.iter().map(|entry| Arc::clone(&entry.value)).collect())
			.unwrap_or_default()
	}

	pub fn file_types(&self) -> Vec<FileType> {
		let state = self.inner.state.read();
		state.file_types.values().map(|entry| entry.value.clone()).collect()
	}

	pub fn get_file_type(&self, name: &str) -> Option<FileType> {
		let state = self.inner.state.read();
		state
			.file_types
			.get(&name.trim().to_lowercase())
			.map(|entry| entry.value.clone())
	}

	/// File types claiming the extension of `path`, in registration order.
	pub fn get_file_types_for_path(&self, path: &str) -> Vec<FileType> {
		let Some(extension) = paths::extension(path) else {
			return Vec::new();
		};
		let state = self.inner.state.read();
		state
			.file_types
			.values()
			.filter(|entry| entry.value.has_extension(&extension))
			.map(|entry| entry.value.clone())
			.collect()
	}

	pub fn file_creators(&self) -> Vec<FileCreator> {
		let state = self.inner.state.read();
		state.file_creators.values().map(|entry| entry.value.clone()).collect()
	}

	pub fn get_file_creator(&self, name: &str) -> Option<FileCreator> {
		let state = self.inner.state.read();
		state
			.file_creators
			.get(&name.trim().to_lowercase())
			.map(|entry| entry.value.clone())
	}

	/// Default viewer for `path`.
	pub fn default_widget_factory(&self, path: &str) -> Result<Arc<RegisteredWidgetFactory>, SelectionError> {
		let extension = paths::extension(path);
		self.inner
			.state
			.read()
			.resolve_default(extension.as_deref())
			.ok_or_else(|| SelectionError::NoDefaultViewer { path: path.to_string() })
	}

	/// Every factory that can view `path`: the default first, then exact
	/// extension matches, then wildcard factories, newest first within each.
	pub fn preferred_widget_factories(&self, path: &str) -> Vec<Arc<RegisteredWidgetFactory>> {
		let extension = paths::extension(path);
		let state = self.inner.state.read();
		let mut preferred = Vec::new();
		if let Some(default) = state.resolve_default(extension.as_deref()) {
			preferred.push(default);
		}
		let newest_first: Vec<&Arc<RegisteredWidgetFactory>> =
			state.widget_factories.values().rev().map(|entry| &entry.value).collect();
		if let Some(extension) = &extension {
			for factory in newest_first.iter().filter(|factory| factory.options().file_extensions.contains(extension)) {
				push_unique_factory(&mut preferred, factory);
			}
		}
		for factory in newest_first
			.iter()
			.filter(|factory| factory.options().file_extensions.iter().any(|own| own == "*"))
		{
			push_unique_factory(&mut preferred, factory);
		}
		preferred
	}

	/// Kernel language for `path`: the default viewer's model factory decides
	/// first, then the file types claiming the extension.
	pub fn preferred_language(&self, path: &str) -> Option<String> {
		match self.default_widget_factory(path) {
			Ok(widget) => self.language_for(path, &widget.options().model_name),
			Err(_) => self
				.get_file_types_for_path(path)
				.into_iter()
				.find_map(|file_type| file_type.language),
		}
	}

	/// Kernel preference for opening `path` with `widget_name`.
	///
	/// `None` if the widget factory is unknown.
	pub fn kernel_preference(
		&self,
		path: &str,
		widget_name: &str,
		kernel: Option<&KernelOptions>,
	) -> Option<KernelPreference> {
		let widget = self.get_widget_factory(widget_name)?;
		let options = widget.options();
		let language = kernel
			.and_then(|kernel| kernel.language.clone())
			.or_else(|| self.language_for(path, &options.model_name));
		Some(KernelPreference {
			name: kernel.and_then(|kernel| kernel.name.clone()),
			id: kernel.and_then(|kernel| kernel.id.clone()),
			language,
			should_start: options.prefer_kernel,
			can_start: options.can_start_kernel,
		})
	}

	/// Creates an unpopulated context for `path`, using `widget_name` or the
	/// default viewer to pick the model factory.
	pub fn create_context(&self, path: &str, widget_name: Option<&str>) -> Result<Arc<DocumentContext>, RegistryError> {
		self.ensure_live()?;
		let widget = self.select_widget_factory(path, widget_name)?;
		self.context_for(path, &widget, false)
	}

	/// Opens an existing file: selects factories, loads the context, starts a
	/// kernel if requested or preferred, then builds the view.
	pub async fn open(
		&self,
		path: &str,
		widget_name: Option<&str>,
		kernel: Option<KernelOptions>,
	) -> Result<DocumentView, RegistryError> {
		self.build(path, widget_name, kernel, false, false).await
	}

	/// Like [`open`](Self::open), but writes the fresh model to `path` first.
	pub async fn create_new(
		&self,
		path: &str,
		widget_name: Option<&str>,
		kernel: Option<KernelOptions>,
	) -> Result<DocumentView, RegistryError> {
		self.build(path, widget_name, kernel, true, false).await
	}

	/// Creates the first free `untitled{n}` file of the creator's type in
	/// `dir` and opens a view on its untitled context.
	pub async fn create_untitled(&self, creator_name: &str, dir: &str) -> Result<DocumentView, RegistryError> {
		self.ensure_live()?;
		let creator = self
			.get_file_creator(creator_name)
			.ok_or_else(|| SelectionError::UnknownFileCreator(creator_name.to_string()))?;
		let file_type = self
			.get_file_type(&creator.file_type)
			.ok_or_else(|| SelectionError::UnknownFileType(creator.file_type.clone()))?;
		let extension = file_type.extensions.first().cloned().unwrap_or_default();
		let path = self.untitled_path(dir, &extension).await?;
		let kernel = creator.kernel_name.clone().map(KernelOptions::named);
		self.build(&path, creator.widget_name.as_deref(), kernel, true, true).await
	}

	/// Adds another view, built by `widget_name`, to an existing context.
	pub fn create_widget(&self, widget_name: &str, context: &Arc<DocumentContext>) -> Result<DocumentView, RegistryError> {
		self.ensure_live()?;
		let widget = self
			.get_widget_factory(widget_name)
			.ok_or_else(|| SelectionError::UnknownWidgetFactory(widget_name.to_string()))?;
		let path = context.path();
		if !widget.can_view(&path) {
			return Err(SelectionError::NotApplicable {
				factory: widget.name().to_string(),
				path,
			}
			.into());
		}
		if widget.options().model_name != context.model_name() {
			return Err(SelectionError::ModelMismatch {
				factory: widget.name().to_string(),
				expected: widget.options().model_name.clone(),
				actual: context.model_name().to_string(),
			}
			.into());
		}
		self.attach_view(&widget, context)
	}

	/// Unregisters everything. Later registrations and opens fail with
	/// [`RegistryError::Disposed`]. Idempotent.
	pub fn dispose(&self) {
		{
			let mut state = self.inner.state.write();
			if state.disposed {
				return;
			}
			*state = RegistryState {
				disposed: true,
				..RegistryState::default()
			};
		}
		info!("document registry disposed");
		self.inner.changed.disconnect_all();
	}

	pub fn is_disposed(&self) -> bool {
		self.inner.state.read().disposed
	}

	fn ensure_live(&self) -> Result<(), RegistryError> {
		if self.is_disposed() {
			return Err(RegistryError::Disposed);
		}
		Ok(())
	}

	fn register(
		&self,
		kind: RegistryKind,
		key: String,
		insert: impl FnOnce(&mut RegistryState, u64),
	) -> Result<ScopedHandle, RegistryError> {
		let token = {
			let mut state = self.inner.state.write();
			if state.disposed {
				return Err(RegistryError::Disposed);
			}
			state.next_token += 1;
			let token = state.next_token;
			insert(&mut state, token);
			token
		};
		debug!(kind = ?kind, name = %key, "registered");
		self.inner.changed.emit(RegistryChange {
			kind,
			name: key.clone(),
			change: ChangeKind::Added,
		});

		let inner: Weak<Inner> = Arc::downgrade(&self.inner);
		Ok(ScopedHandle::new(move || {
			if let Some(inner) = inner.upgrade() {
				inner.unregister(kind, &key, token);
			}
		}))
	}

	fn select_widget_factory(
		&self,
		path: &str,
		widget_name: Option<&str>,
	) -> Result<Arc<RegisteredWidgetFactory>, SelectionError> {
		let Some(name) = widget_name else {
			return self.default_widget_factory(path);
		};
		let widget = self
			.get_widget_factory(name)
			.ok_or_else(|| SelectionError::UnknownWidgetFactory(name.to_string()))?;
		if !widget.can_view(path) {
			return Err(SelectionError::NotApplicable {
				factory: widget.name().to_string(),
				path: path.to_string(),
			});
		}
		Ok(widget)
	}

	fn language_for(&self, path: &str, model_name: &str) -> Option<String> {
		self.get_model_factory(model_name)
			.and_then(|factory| factory.preferred_language(path))
			.or_else(|| {
				self.get_file_types_for_path(path)
					.into_iter()
					.find_map(|file_type| file_type.language)
			})
	}

	fn context_for(
		&self,
		path: &str,
		widget: &RegisteredWidgetFactory,
		untitled: bool,
	) -> Result<Arc<DocumentContext>, RegistryError> {
		let model_name = &widget.options().model_name;
		let factory = self
			.get_model_factory(model_name)
			.ok_or_else(|| SelectionError::UnknownModelFactory(model_name.clone()))?;
		let model = factory.create_new(ModelOptions {
			language_preference: self.language_for(path, model_name),
			..ModelOptions::default()
		});
		let options = ContextOptions::new(path)
			.with_model(model_name.clone(), factory.file_format(), factory.content_type())
			.untitled(untitled)
			.with_check_margin(self.inner.config.check_margin());
		let context = DocumentContext::new(model, options, self.inner.services.clone())?;
		Ok(Arc::new(context))
	}

	/// Kernel to start when opening through `widget`: the requested one, or
	/// one matching the document's language if the factory prefers a kernel.
	fn kernel_to_start(
		&self,
		path: &str,
		widget: &RegisteredWidgetFactory,
		requested: Option<KernelOptions>,
	) -> Option<KernelOptions> {
		if requested.is_some() {
			return requested;
		}
		let options = widget.options();
		if !(options.prefer_kernel && options.can_start_kernel) || self.inner.services.sessions.is_none() {
			return None;
		}
		Some(KernelOptions {
			language: self.language_for(path, &options.model_name),
			..KernelOptions::default()
		})
	}

	async fn build(
		&self,
		path: &str,
		widget_name: Option<&str>,
		kernel: Option<KernelOptions>,
		is_new: bool,
		untitled: bool,
	) -> Result<DocumentView, RegistryError> {
		self.ensure_live()?;
		let widget = self.select_widget_factory(path, widget_name)?;
		let context = self.context_for(path, &widget, untitled)?;
		let kernel = self.kernel_to_start(path, &widget, kernel);

		match self.populate(&context, &widget, is_new, kernel).await {
			Ok(view) => {
				info!(path = %context.path(), factory = %widget.name(), "document opened");
				Ok(view)
			}
			Err(error) => {
				warn!(path = %path, factory = %widget.name(), error = %error, "document open failed");
				context.dispose();
				Err(error)
			}
		}
	}

	async fn populate(
		&self,
		context: &Arc<DocumentContext>,
		widget: &RegisteredWidgetFactory,
		is_new: bool,
		kernel: Option<KernelOptions>,
	) -> Result<DocumentView, RegistryError> {
		context.initialize(is_new).await?;
		if let Some(kernel) = kernel {
			context.change_kernel(Some(kernel)).await?;
		}
		self.attach_view(widget, context)
	}

	fn attach_view(
		&self,
		widget: &RegisteredWidgetFactory,
		context: &Arc<DocumentContext>,
	) -> Result<DocumentView, RegistryError> {
		let kernel = context.kernel();
		let mut view = widget.create_new(context, kernel.as_ref())?;
		for extension in self.widget_extensions(widget.name()) {
			let handle = extension.create_new(view.widget(), view.context())?;
			view.push_extension(handle);
		}
		Ok(view)
	}

	async fn untitled_path(&self, dir: &str, extension: &str) -> Result<String, RegistryError> {
		let storage = &self.inner.services.storage;
		for n in 0..MAX_UNTITLED {
			let name = match n {
				0 => format!("untitled{extension}"),
				n => format!("untitled{n}{extension}"),
			};
			let candidate = paths::join(dir, &name);
			match storage.get(&candidate, FetchOptions::metadata()).await {
				Err(StorageError::NotFound(_)) => return Ok(candidate),
				Ok(_) => continue,
				Err(error) => return Err(ContextError::from(error).into()),
			}
		}
		Err(SelectionError::NoUntitledName { dir: dir.to_string() }.into())
	}
}

impl std::fmt::Debug for DocumentRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.state.read();
		f.debug_struct("DocumentRegistry")
			.field("model_factories", &state.model_factories.keys().collect::<Vec<_>>())
			.field("widget_factories", &state.widget_factories.keys().collect::<Vec<_>>())
			.field("file_types", &state.file_types.len())
			.field("disposed", &state.disposed)
			.finish_non_exhaustive()
	}
}

fn normalize_name(name: &str, kind: &'static str) -> Result<String, ConfigurationError> {
	let name = name.trim();
	if name.is_empty() {
		return Err(ConfigurationError::EmptyName { kind });
	}
	Ok(name.to_lowercase())
}

/// Lowercases and dot-prefixes a literal extension. `*` passes through;
/// anything glob-like is rejected.
pub(crate) fn normalize_extension(extension: &str) -> Option<String> {
	let extension = extension.trim();
	if extension == "*" {
		return Some(extension.to_string());
	}
	let bare = extension.strip_prefix('.').unwrap_or(extension);
	if bare.is_empty() || bare.contains(['*', '?', '[', ']', '/', '.']) {
		return None;
	}
	Some(format!(".{}", bare.to_ascii_lowercase()))
}

fn normalize_widget_options(options: &WidgetFactoryOptions) -> Result<WidgetFactoryOptions, ConfigurationError> {
	let name = options.name.trim();
	if name.is_empty() {
		return Err(ConfigurationError::EmptyName { kind: "widget factory" });
	}
	let normalize_all = |list: &[String]| -> Result<Vec<String>, ConfigurationError> {
		let mut normalized = Vec::with_capacity(list.len());
		for raw in list {
			let extension = normalize_extension(raw).ok_or_else(|| ConfigurationError::InvalidExtension {
				owner: name.to_string(),
				extension: raw.clone(),
			})?;
			push_unique(&mut normalized, extension);
		}
		Ok(normalized)
	};
	let file_extensions = normalize_all(&options.file_extensions)?;
	let default_for = normalize_all(&options.default_for)?;

	if !file_extensions.iter().any(|extension| extension == "*")
		&& let Some(missing) = default_for.iter().find(|extension| !file_extensions.contains(extension))
	{
		return Err(ConfigurationError::DefaultNotViewable {
			factory: name.to_string(),
			extension: missing.clone(),
		});
	}

	Ok(WidgetFactoryOptions {
		name: name.to_string(),
		file_extensions,
		default_for,
		model_name: options.model_name.trim().to_lowercase(),
		..options.clone()
	})
}

fn insert_entry<T>(map: &mut IndexMap<String, Entry<T>>, key: String, token: u64, value: T) {
	if map.shift_remove(&key).is_some() {
		debug!(name = %key, "replacing earlier registration");
	}
	map.insert(key, Entry { token, value });
}

fn remove_entry<T>(map: &mut IndexMap<String, Entry<T>>, key: &str, token: u64) -> bool {
	if map.get(key).is_some_and(|entry| entry.token == token) {
		map.shift_remove(key);
		return true;
	}
	false
}

fn push_unique(list: &mut Vec<String>, value: String) {
	if !list.contains(&value) {
		list.push(value);
	}
}

fn push_unique_factory(list: &mut Vec<Arc<RegisteredWidgetFactory>>, factory: &Arc<RegisteredWidgetFactory>) {
	if !list.iter().any(|known| Arc::ptr_eq(known, factory)) {
		list.push(Arc::clone(factory));
	}
}
