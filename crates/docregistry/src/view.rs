use std::fmt;
use std::sync::Arc;

use folio_context::{DocumentContext, DocumentWidget, KernelSession, paths};
use folio_model::{ScopedHandle, Signal};
use tracing::debug;

use crate::WidgetError;
use crate::factory::{WidgetFactory, WidgetFactoryOptions};

/// A widget factory as held by the registry, with normalized options and
/// its widget-created notification.
pub struct RegisteredWidgetFactory {
	factory: Arc<dyn WidgetFactory>,
	options: WidgetFactoryOptions,
	widget_created: Signal<Arc<dyn DocumentWidget>>,
}

impl RegisteredWidgetFactory {
	pub(crate) fn new(factory: Arc<dyn WidgetFactory>, options: WidgetFactoryOptions) -> Self {
		Self {
			factory,
			options,
			widget_created: Signal::new(),
		}
	}

	pub fn name(&self) -> &str {
		&self.options.name
	}

	/// Options with extensions lowercased and dot-prefixed.
	pub fn options(&self) -> &WidgetFactoryOptions {
		&self.options
	}

	/// Emits every view this factory creates.
	pub fn widget_created(&self) -> &Signal<Arc<dyn DocumentWidget>> {
		&self.widget_created
	}

	/// True if the factory lists `extension` or the wildcard.
	pub fn can_view_extension(&self, extension: Option<&str>) -> bool {
		self.options
			.file_extensions
			.iter()
			.any(|own| own == "*" || Some(own.as_str()) == extension)
	}

	pub fn can_view(&self, path: &str) -> bool {
		self.can_view_extension(paths::extension(path).as_deref())
	}

	pub(crate) fn is_default_for(&self, extension: &str) -> bool {
		self.options.default_for.iter().any(|own| own == extension)
	}

	/// Creates a view over `context` and registers it as a sibling.
	pub fn create_new(
		&self,
		context: &Arc<DocumentContext>,
		kernel: Option<&KernelSession>,
	) -> Result<DocumentView, WidgetError> {
		let widget = self.factory.create_widget(context, kernel)?;
		let sibling = match context.add_sibling(&widget) {
			Ok(sibling) => sibling,
			Err(error) => {
				widget.dispose();
				return Err(error.into());
			}
		};
		debug!(factory = %self.options.name, widget = widget.id().0, path = %context.path(), "widget created");
		self.widget_created.emit(Arc::clone(&widget));
		Ok(DocumentView {
			widget,
			context: Arc::clone(context),
			factory: self.options.name.clone(),
			read_only: self.options.read_only,
			sibling,
			extensions: Vec::new(),
			closed: false,
		})
	}
}

impl fmt::Debug for RegisteredWidgetFactory {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RegisteredWidgetFactory")
			.field("options", &self.options)
			.finish_non_exhaustive()
	}
}

/// One open view: the widget, the context it shows, and everything attached
/// on its behalf.
///
/// Closing (or dropping) the view releases extensions newest first, then the
/// sibling registration, then disposes the widget. The context is left alone.
pub struct DocumentView {
	widget: Arc<dyn DocumentWidget>,
	context: Arc<DocumentContext>,
	factory: String,
	read_only: bool,
	sibling: ScopedHandle,
	extensions: Vec<ScopedHandle>,
	closed: bool,
}

impl DocumentView {
	pub fn widget(&self) -> &Arc<dyn DocumentWidget> {
		&self.widget
	}

	pub fn context(&self) -> &Arc<DocumentContext> {
		&self.context
	}

	pub fn factory_name(&self) -> &str {
		&self.factory
	}

	/// True if the view came from a read-only factory or the model itself
	/// refuses edits. A read-only view leaves the shared model writable for
	/// its siblings.
	pub fn is_read_only(&self) -> bool {
		self.read_only || self.context.model().is_read_only()
	}

	pub fn extension_count(&self) -> usize {
		self.extensions.len()
	}

	pub fn is_closed(&self) -> bool {
		self.closed
	}

	pub(crate) fn push_extension(&mut self, handle: ScopedHandle) {
		self.extensions.push(handle);
	}

	/// Tears the view down. Idempotent.
	pub fn close(&mut self) {
		if self.closed {
			return;
		}
		self.closed = true;
		while let Some(mut extension) = self.extensions.pop() {
			extension.release();
		}
		self.sibling.release();
		self.widget.dispose();
		debug!(factory = %self.factory, widget = self.widget.id().0, "view closed");
	}
}

impl Drop for DocumentView {
	fn drop(&mut self) {
		self.close();
	}
}

impl fmt::Debug for DocumentView {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DocumentView")
			.field("widget", &self.widget.id())
			.field("factory", &self.factory)
			.field("read_only", &self.read_only)
			.field("extensions", &self.extensions.len())
			.field("closed", &self.closed)
			.finish_non_exhaustive()
	}
}
