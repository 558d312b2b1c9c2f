use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_WIDGET_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a view component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId(pub u64);

impl WidgetId {
	pub fn next() -> Self {
		Self(NEXT_WIDGET_ID.fetch_add(1, Ordering::Relaxed))
	}
}

/// Lifecycle surface of a view component bound to a document context.
///
/// Rendering is the implementation's business. The context only tracks
/// views by id and never owns them.
pub trait DocumentWidget: Any + Send + Sync {
	fn id(&self) -> WidgetId;

	/// Tears the view down. Idempotent.
	fn dispose(&self);

	fn is_disposed(&self) -> bool;
}
