use std::any::Any;

use serde_json::Value;

use crate::signal::{Dispatcher, Signal};
use crate::ModelError;

/// Why a model's content changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentChange {
	/// Content was replaced by `from_text`/`from_json` (a load completed).
	Loaded,
	/// Content was mutated through the model's editing API.
	Edited,
}

/// A flag transition reported on [`DocumentModel::state_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
	Dirty(bool),
	ReadOnly(bool),
}

/// Construction options handed to a model factory.
#[derive(Debug, Clone, Default)]
pub struct ModelOptions {
	/// Preferred kernel language, if the caller has one.
	pub language_preference: Option<String>,
	/// Dispatcher shared with the owning context's signals.
	pub dispatcher: Dispatcher,
}

impl ModelOptions {
	pub fn with_language(mut self, language: impl Into<String>) -> Self {
		self.language_preference = Some(language.into());
		self
	}
}

/// Contract for document content held by a context.
///
/// Implementations use interior mutability: one model is shared by every view
/// of a document, and each of them edits through `&self`.
///
/// # Invariants
///
/// - `from_text(to_text())` and `from_json(to_json())` reproduce an equivalent
///   model state.
/// - `from_text`/`from_json` emit exactly one [`ContentChange::Loaded`], even
///   when the content is identical, and leave the model clean.
/// - Content mutation sets `dirty` and emits [`StateChange::Dirty`] only when
///   the flag actually flips.
/// - Mutation of a read-only model fails with [`ModelError::ReadOnly`].
/// - Every operation on a disposed model fails with [`ModelError::Disposed`].
pub trait DocumentModel: Any + Send + Sync {
	/// Serializes the content to its string form.
	fn to_text(&self) -> String;

	/// Replaces the content from its string form.
	fn from_text(&self, text: &str) -> Result<(), ModelError>;

	/// Serializes the content to its structured form.
	fn to_json(&self) -> Value;

	/// Replaces the content from its structured form.
	fn from_json(&self, value: &Value) -> Result<(), ModelError>;

	fn is_dirty(&self) -> bool;

	fn set_dirty(&self, dirty: bool);

	fn is_read_only(&self) -> bool;

	fn set_read_only(&self, read_only: bool);

	/// MIME type of the serialized string form.
	fn mime_type(&self) -> &str;

	/// Kernel name this model would start by default (may be empty).
	fn default_kernel_name(&self) -> &str;

	/// Kernel language this model prefers (may be empty).
	fn default_kernel_language(&self) -> &str;

	fn content_changed(&self) -> &Signal<ContentChange>;

	fn state_changed(&self) -> &Signal<StateChange>;

	/// Tears the model down. Idempotent.
	fn dispose(&self);

	fn is_disposed(&self) -> bool;
}

/// Downcasts a shared model to its concrete implementation.
pub fn downcast_model<M: DocumentModel>(model: &dyn DocumentModel) -> Option<&M> {
	let any: &dyn Any = model;
	any.downcast_ref::<M>()
}
