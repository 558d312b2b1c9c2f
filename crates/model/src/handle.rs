use std::fmt;

/// Scoped registration that undoes itself on release.
///
/// Produced by anything that attaches to something it does not own: signal
/// subscriptions, sibling registrations, widget extensions. Release runs the
/// undo closure at most once, either explicitly through [`release`](Self::release)
/// or implicitly on drop, so every exit path (including `?` propagation) cleans up.
pub struct ScopedHandle {
	release: Option<Box<dyn FnOnce() + Send>>,
}

/// Handle returned by [`Signal::connect`](crate::Signal::connect).
pub type Subscription = ScopedHandle;

impl ScopedHandle {
	/// Creates a handle that runs `release` when released or dropped.
	pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
		Self {
			release: Some(Box::new(release)),
		}
	}

	/// Creates a handle with nothing to release.
	pub fn empty() -> Self {
		Self { release: None }
	}

	/// Runs the release closure if it has not run yet.
	pub fn release(&mut self) {
		if let Some(release) = self.release.take() {
			release();
		}
	}

	/// Returns true once the handle has been released (or was empty).
	pub fn is_released(&self) -> bool {
		self.release.is_none()
	}

	/// Consumes the handle without releasing, keeping the registration alive
	/// for as long as its target lives.
	pub fn detach(mut self) {
		self.release = None;
	}
}

impl Drop for ScopedHandle {
	fn drop(&mut self) {
		self.release();
	}
}

impl fmt::Debug for ScopedHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ScopedHandle")
			.field("released", &self.is_released())
			.finish()
	}
}
