//! Rope-backed plain text model.


use std::ops::Range;

use parking_lot::Mutex;
use ropey::Rope;
use serde_json::{Value, json};
use tracing::debug;

use crate::model::{ContentChange, DocumentModel, ModelOptions, StateChange};
use crate::signal::Signal;
use crate::ModelError;

#[derive(Debug, Default)]
struct Flags {
	dirty: bool,
	read_only: bool,
	disposed: bool,
}

/// Plain text document model.
///
/// The string form is the text itself. The structured form is
/// `{"text": "..."}`; a bare JSON string is also accepted on load.
pub struct TextModel {
	content: Mutex<Rope>,
	flags: Mutex<Flags>,
	kernel_language: String,
	content_changed: Signal<ContentChange>,
	state_changed: Signal<StateChange>,
}

impl TextModel {
	pub fn new(options: &ModelOptions) -> Self {
		Self {
			content: Mutex::new(Rope::new()),
			flags: Mutex::new(Flags::default()),
			kernel_language: options.language_preference.clone().unwrap_or_default(),
			content_changed: Signal::with_dispatcher(options.dispatcher.clone()),
			state_changed: Signal::with_dispatcher(options.dispatcher.clone()),
		}
	}

	/// Returns a copy of the current text.
	pub fn text(&self) -> String {
		self.content.lock().to_string()
	}

	/// Length of the document in chars.
	pub fn len_chars(&self) -> usize {
		self.content.lock().len_chars()
	}

	/// Inserts `text` at char index `at`.
	pub fn insert(&self, at: usize, text: &str) -> Result<(), ModelError> {
		self.edit(|rope| {
			let len = rope.len_chars();
			if at > len {
				return Err(ModelError::OutOfRange { index: at, len });
			}
			rope.insert(at, text);
			Ok(())
		})
	}

	/// Removes the chars in `range`.
	pub fn remove(&self, range: Range<usize>) -> Result<(), ModelError> {
		self.edit(|rope| {
			let len = rope.len_chars();
			if range.start > range.end || range.end > len {
				return Err(ModelError::OutOfRange {
					index: range.end.max(range.start),
					len,
				});
			}
			rope.remove(range);
			Ok(())
		})
	}

	/// Replaces the whole text as an edit (marks the model dirty).
	pub fn set_text(&self, text: &str) -> Result<(), ModelError> {
		self.edit(|rope| {
			*rope = Rope::from_str(text);
			Ok(())
		})
	}

	fn ensure_live(&self) -> Result<(), ModelError> {
		if self.flags.lock().disposed {
			return Err(ModelError::Disposed);
		}
		Ok(())
	}

	fn edit(&self, apply: impl FnOnce(&mut Rope) -> Result<(), ModelError>) -> Result<(), ModelError> {
		{
			let flags = self.flags.lock();
			if flags.disposed {
				return Err(ModelError::Disposed);
			}
			if flags.read_only {
				return Err(ModelError::ReadOnly);
			}
		}
		apply(&mut self.content.lock())?;
		self.content_changed.emit(ContentChange::Edited);
		self.set_dirty(true);
		Ok(())
	}

	fn load(&self, rope: Rope) -> Result<(), ModelError> {
		self.ensure_live()?;
		*self.content.lock() = rope;
		self.content_changed.emit(ContentChange::Loaded);
		self.set_dirty(false);
		Ok(())
	}
}

impl DocumentModel for TextModel {
	fn to_text(&self) -> String {
		self.text()
	}

	fn from_text(&self, text: &str) -> Result<(), ModelError> {
		self.load(Rope::from_str(text))
	}

	fn to_json(&self) -> Value {
		json!({ "text": self.text() })
	}

	fn from_json(&self, value: &Value) -> Result<(), ModelError> {
		let text = match value {
			Value::String(text) => text.as_str(),
			Value::Object(map) => map
				.get("text")
				.and_then(Value::as_str)
				.ok_or_else(|| ModelError::InvalidContent("expected a \"text\" string field".into()))?,
			other => {
				return Err(ModelError::InvalidContent(format!(
					"expected a string or object, got {other}"
				)));
			}
		};
		self.load(Rope::from_str(text))
	}

	fn is_dirty(&self) -> bool {
		self.flags.lock().dirty
	}

	fn set_dirty(&self, dirty: bool) {
		{
			let mut flags = self.flags.lock();
			if flags.disposed || flags.dirty == dirty {
				return;
			}
			flags.dirty = dirty;
		}
		self.state_changed.emit(StateChange::Dirty(dirty));
	}

	fn is_read_only(&self) -> bool {
		self.flags.lock().read_only
	}

	fn set_read_only(&self, read_only: bool) {
		{
			let mut flags = self.flags.lock();
			if flags.disposed || flags.read_only == read_only {
				return;
			}
			flags.read_only = read_only;
		}
		self.state_changed.emit(StateChange::ReadOnly(read_only));
	}

	fn mime_type(&self) -> &str {
		"text/plain"
	}

	fn default_kernel_name(&self) -> &str {
		""
	}

	fn default_kernel_language(&self) -> &str {
		&self.kernel_language
	}

	fn content_changed(&self) -> &Signal<ContentChange> {
		&self.content_changed
	}

	fn state_changed(&self) -> &Signal<StateChange> {
		&self.state_changed
	}

	fn dispose(&self) {
		{
			let mut flags = self.flags.lock();
			if flags.disposed {
				return;
			}
			flags.disposed = true;
		}
		debug!("text model disposed");
		self.content_changed.disconnect_all();
		self.state_changed.disconnect_all();
	}

	fn is_disposed(&self) -> bool {
		self.flags.lock().disposed
	}
}
