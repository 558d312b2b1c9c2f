//! Registry of document factories and file types.
//!
//! A [`DocumentRegistry`] decides, for a path, which [`ModelFactory`] holds the
//! content and which [`WidgetFactory`] renders it, then builds the
//! [`DocumentContext`](folio_context::DocumentContext) and [`DocumentView`].
//! Every registration returns a [`ScopedHandle`](folio_model::ScopedHandle)
//! that undoes it.

mod config;
mod error;
mod factory;
mod file_type;
mod registry;
mod view;

pub use config::RegistryConfig;
pub use error::{ConfigurationError, RegistryError, SelectionError, WidgetError};
pub use factory::{Base64ModelFactory, ModelFactory, TextModelFactory, WidgetExtension, WidgetFactory, WidgetFactoryOptions};
pub use file_type::{FileCreator, FileType};
pub use registry::{ChangeKind, DocumentRegistry, KernelPreference, RegistryChange, RegistryKind};
pub use view::{DocumentView, RegisteredWidgetFactory};
