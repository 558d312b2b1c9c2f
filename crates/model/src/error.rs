use thiserror::Error;

/// Errors raised by document model operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
	/// The model is flagged read-only and refuses content mutation.
	#[error("document model is read-only")]
	ReadOnly,
	/// The model was disposed by its owning context.
	#[error("document model is disposed")]
	Disposed,
	/// Serialized content could not be interpreted by the model.
	#[error("invalid content: {0}")]
	InvalidContent(String),
	/// An edit addressed a position outside the document.
	#[error("position {index} out of range (length {len})")]
	OutOfRange { index: usize, len: usize },
}
