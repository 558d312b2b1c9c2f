use folio_model::ModelError;
use thiserror::Error;

/// Failures reported by a [`Storage`](crate::Storage) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
	#[error("not found: {0}")]
	NotFound(String),
	#[error("permission denied: {0}")]
	PermissionDenied(String),
	/// The stored file changed underneath the caller, or a rename target exists.
	#[error("conflict: {0}")]
	Conflict(String),
	#[error("checkpoint not found for {path}: {id}")]
	CheckpointNotFound { path: String, id: String },
	#[error("invalid path: {0}")]
	InvalidPath(String),
	#[error("invalid content: {0}")]
	InvalidContent(String),
	#[error("I/O error: {0}")]
	Io(String),
}

impl StorageError {
	/// Maps an I/O error for `path` onto the storage taxonomy.
	pub fn from_io(path: &str, error: &std::io::Error) -> Self {
		match error.kind() {
			std::io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
			std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_string()),
			std::io::ErrorKind::AlreadyExists => Self::Conflict(path.to_string()),
			_ => Self::Io(format!("{path}: {error}")),
		}
	}
}

/// Failures reported by a [`SessionManager`](crate::SessionManager).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
	/// No session manager is configured, or it cannot serve the request.
	#[error("kernel unavailable: {0}")]
	Unavailable(String),
	#[error("no such kernel or session: {0}")]
	NotFound(String),
	#[error("kernel failure: {0}")]
	Failed(String),
}

/// Errors surfaced by [`DocumentContext`](crate::DocumentContext) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
	#[error(transparent)]
	Storage(#[from] StorageError),
	#[error(transparent)]
	Kernel(#[from] KernelError),
	#[error(transparent)]
	Model(#[from] ModelError),
	#[error(transparent)]
	Url(#[from] UrlError),
	/// The context was disposed before or during the operation.
	#[error("document context is disposed")]
	Disposed,
	/// `save_as` was requested but no path prompt is configured.
	#[error("no path prompt configured")]
	NoPathPrompt,
	#[error("invalid path: {0:?}")]
	InvalidPath(String),
}

impl ContextError {
	pub fn is_disposed(&self) -> bool {
		matches!(self, Self::Disposed)
	}
}

/// Errors from [`resolve_url`](crate::resolve_url).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
	#[error("empty url")]
	Empty,
	/// A relative reference climbed above the server root.
	#[error("url escapes the server root: {0}")]
	EscapesRoot(String),
}
