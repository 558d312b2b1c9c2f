use folio_context::ContextError;
use thiserror::Error;

/// Invalid registration. Fatal to the registration call only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
	#[error("{kind} name must not be empty")]
	EmptyName { kind: &'static str },
	/// Extensions are literal (`.txt`) or the wildcard `*`; globs are not supported.
	#[error("{owner:?}: invalid extension {extension:?}")]
	InvalidExtension { owner: String, extension: String },
	/// A `default_for` entry missing from the factory's `file_extensions`.
	#[error("widget factory {factory:?} is default for {extension:?} but cannot view it")]
	DefaultNotViewable { factory: String, extension: String },
	#[error("widget factory {factory:?} cannot view {extension:?}")]
	NotApplicable { factory: String, extension: String },
	#[error("unknown widget factory: {0}")]
	UnknownWidgetFactory(String),
}

/// No factory (or creator) fits the request. The caller may retry with an
/// explicit factory name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
	#[error("no default viewer for {path:?}")]
	NoDefaultViewer { path: String },
	#[error("unknown widget factory: {0}")]
	UnknownWidgetFactory(String),
	#[error("unknown model factory: {0}")]
	UnknownModelFactory(String),
	#[error("unknown file type: {0}")]
	UnknownFileType(String),
	#[error("unknown file creator: {0}")]
	UnknownFileCreator(String),
	#[error("widget factory {factory:?} cannot view {path:?}")]
	NotApplicable { factory: String, path: String },
	#[error("widget factory {factory:?} expects model {expected:?}, context holds {actual:?}")]
	ModelMismatch {
		factory: String,
		expected: String,
		actual: String,
	},
	#[error("no free untitled name in {dir:?}")]
	NoUntitledName { dir: String },
}

/// Failure while building a view or attaching an extension to it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WidgetError {
	#[error("widget creation failed: {0}")]
	Failed(String),
	#[error(transparent)]
	Context(#[from] ContextError),
}

#[derive(Error, Debug)]
pub enum RegistryError {
	#[error(transparent)]
	Configuration(#[from] ConfigurationError),
	#[error(transparent)]
	Selection(#[from] SelectionError),
	#[error(transparent)]
	Context(#[from] ContextError),
	#[error(transparent)]
	Widget(#[from] WidgetError),
	#[error("invalid registry settings: {0}")]
	Settings(#[from] serde_json::Error),
	#[error("document registry is disposed")]
	Disposed,
}
