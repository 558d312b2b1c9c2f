//! Factory contracts: models, views, and view extensions.

use std::sync::Arc;

use folio_context::{ContentType, DocumentContext, DocumentWidget, FileFormat, KernelSession};
use folio_model::{DocumentModel, ModelOptions, ScopedHandle, TextModel};

use crate::WidgetError;

/// Named constructor for document models.
pub trait ModelFactory: Send + Sync {
	/// Registry key; matched against [`WidgetFactoryOptions::model_name`].
	fn name(&self) -> &str;

	fn content_type(&self) -> ContentType;

	fn file_format(&self) -> FileFormat;

	/// Kernel language this factory would pick for `path`, if it knows better
	/// than the file type.
	fn preferred_language(&self, _path: &str) -> Option<String> {
		None
	}

	fn create_new(&self, options: ModelOptions) -> Arc<dyn DocumentModel>;
}

/// Builds [`TextModel`]s for plain text files.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextModelFactory;

impl ModelFactory for TextModelFactory {
	fn name(&self) -> &str {
		"text"
	}

	fn content_type(&self) -> ContentType {
		ContentType::File
	}

	fn file_format(&self) -> FileFormat {
		FileFormat::Text
	}

	fn create_new(&self, options: ModelOptions) -> Arc<dyn DocumentModel> {
		Arc::new(TextModel::new(&options))
	}
}

/// Builds [`TextModel`]s holding the base64 form of binary files.
#[derive(Debug, Default, Clone, Copy)]
pub struct Base64ModelFactory;

impl ModelFactory for Base64ModelFactory {
	fn name(&self) -> &str {
		"base64"
	}

	fn content_type(&self) -> ContentType {
		ContentType::File
	}

	fn file_format(&self) -> FileFormat {
		FileFormat::Base64
	}

	fn create_new(&self, options: ModelOptions) -> Arc<dyn DocumentModel> {
		Arc::new(TextModel::new(&options))
	}
}

/// Declarative part of a widget factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetFactoryOptions {
	pub name: String,
	/// Extensions this factory can view (`.txt`), or `*` for any.
	pub file_extensions: Vec<String>,
	/// Subset of `file_extensions` this factory is the default viewer for.
	pub default_for: Vec<String>,
	/// Name of the model factory whose models this factory renders.
	pub model_name: String,
	/// Views from this factory present the document without editing it.
	/// Reported by [`DocumentView::is_read_only`](crate::DocumentView::is_read_only).
	pub read_only: bool,
	/// Start a kernel when opening through this factory.
	pub prefer_kernel: bool,
	pub can_start_kernel: bool,
}

impl WidgetFactoryOptions {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			file_extensions: Vec::new(),
			default_for: Vec::new(),
			model_name: "text".into(),
			read_only: false,
			prefer_kernel: false,
			can_start_kernel: false,
		}
	}

	pub fn viewing<I, S>(mut self, extensions: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.file_extensions.extend(extensions.into_iter().map(Into::into));
		self
	}

	pub fn default_for<I, S>(mut self, extensions: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.default_for.extend(extensions.into_iter().map(Into::into));
		self
	}

	pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
		self.model_name = model_name.into();
		self
	}

	pub fn read_only(mut self, read_only: bool) -> Self {
		self.read_only = read_only;
		self
	}

	pub fn with_kernel(mut self, prefer_kernel: bool, can_start_kernel: bool) -> Self {
		self.prefer_kernel = prefer_kernel;
		self.can_start_kernel = can_start_kernel;
		self
	}
}

/// Named constructor for views of a document context.
pub trait WidgetFactory: Send + Sync {
	fn options(&self) -> &WidgetFactoryOptions;

	/// Builds a view over `context`. Registration as a sibling and the
	/// created notification are handled by the registry.
	fn create_widget(
		&self,
		context: &Arc<DocumentContext>,
		kernel: Option<&KernelSession>,
	) -> Result<Arc<dyn DocumentWidget>, WidgetError>;
}

/// Attaches extra behavior to a freshly created view.
pub trait WidgetExtension: Send + Sync {
	/// Attaches to `widget`. Releasing the returned handle fully detaches.
	fn create_new(
		&self,
		widget: &Arc<dyn DocumentWidget>,
		context: &Arc<DocumentContext>,
	) -> Result<ScopedHandle, WidgetError>;
}
