//! Publish/subscribe notification channels.
//!
//! A [`Signal`] delivers each emitted value synchronously to every handler
//! connected at the moment of delivery, in connection order. Signals that share
//! a [`Dispatcher`] never interleave: an emission raised from inside a handler
//! is queued and delivered after the running handler set returns, so handlers
//! are never re-entered by their own notification group.


use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::handle::{ScopedHandle, Subscription};

type Job = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct DispatchQueue {
	/// A handler set is running on some call stack.
	draining: bool,
	pending: VecDeque<Job>,
}

/// Serializes notification delivery for a group of signals.
///
/// A document context and its model share one dispatcher so that no two of
/// their notifications are delivered interleaved with each other's handlers.
///
/// Delivery happens on whichever thread is draining the queue. When a second
/// thread emits while another thread drains, its emission is queued and the
/// call returns at once; the handlers then run on the draining thread, after
/// the handler set in progress. Callers that need delivery to have happened
/// before continuing must emit from the thread that owns the notification
/// group.
#[derive(Clone, Default)]
pub struct Dispatcher {
	queue: Arc<Mutex<DispatchQueue>>,
}

impl Dispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns true while a handler set is being delivered.
	pub fn is_dispatching(&self) -> bool {
		self.queue.lock().draining
	}

	/// Queues `job` and drains the queue unless a drain is already running.
	fn dispatch(&self, job: Job) {
		{
			let mut queue = self.queue.lock();
			queue.pending.push_back(job);
			if queue.draining {
				return;
			}
			queue.draining = true;
		}

		let mut guard = DrainGuard {
			queue: &self.queue,
			armed: true,
		};
		loop {
			let job = {
				let mut queue = self.queue.lock();
				match queue.pending.pop_front() {
					Some(job) => job,
					None => {
						queue.draining = false;
						guard.armed = false;
						return;
					}
				}
			};
			job();
		}
	}
}

impl fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let queue = self.queue.lock();
		f.debug_struct("Dispatcher")
			.field("draining", &queue.draining)
			.field("pending", &queue.pending.len())
			.finish()
	}
}

/// Reopens the queue if a handler panics mid-drain.
struct DrainGuard<'a> {
	queue: &'a Mutex<DispatchQueue>,
	armed: bool,
}

impl Drop for DrainGuard<'_> {
	fn drop(&mut self) {
		if self.armed {
			self.queue.lock().draining = false;
		}
	}
}

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slots<T> {
	next_id: u64,
	handlers: Vec<(u64, Handler<T>)>,
}

/// A notification channel with any number of independently removable handlers.
pub struct Signal<T> {
	slots: Arc<Mutex<Slots<T>>>,
	dispatcher: Dispatcher,
}

impl<T: Send + 'static> Signal<T> {
	/// Creates a signal with its own dispatcher.
	pub fn new() -> Self {
		Self::with_dispatcher(Dispatcher::new())
	}

	/// Creates a signal that delivers through a shared dispatcher.
	pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
		Self {
			slots: Arc::new(Mutex::new(Slots {
				next_id: 0,
				handlers: Vec::new(),
			})),
			dispatcher,
		}
	}

	/// Connects a handler; releasing the returned subscription disconnects it.
	pub fn connect<F>(&self, handler: F) -> Subscription
	where
		F: Fn(&T) + Send + Sync + 'static,
	{
		let id = {
			let mut slots = self.slots.lock();
			let id = slots.next_id;
			slots.next_id += 1;
			slots.handlers.push((id, Arc::new(handler)));
			id
		};

		let slots: Weak<Mutex<Slots<T>>> = Arc::downgrade(&self.slots);
		ScopedHandle::new(move || {
			if let Some(slots) = slots.upgrade() {
				slots.lock().handlers.retain(|(handler_id, _)| *handler_id != id);
			}
		})
	}

	/// Delivers `value` to every connected handler.
	///
	/// Returns after delivery unless the dispatcher is already draining,
	/// either further up this call stack or on another thread. Delivery is
	/// then deferred to the end of the running handler set. See [`Dispatcher`].
	pub fn emit(&self, value: T) {
		let slots = Arc::clone(&self.slots);
		self.dispatcher.dispatch(Box::new(move || {
			let handlers: Vec<Handler<T>> = slots
				.lock()
				.handlers
				.iter()
				.map(|(_, handler)| Arc::clone(handler))
				.collect();
			for handler in handlers {
				handler(&value);
			}
		}));
	}

	/// Number of connected handlers.
	pub fn handler_count(&self) -> usize {
		self.slots.lock().handlers.len()
	}

	/// Disconnects every handler. Outstanding subscriptions become no-ops.
	///
	/// Goes through the dispatcher like [`emit`](Self::emit): called from
	/// inside a handler, it takes effect after the emissions already queued,
	/// so those still reach the handlers connected when they were raised.
	pub fn disconnect_all(&self) {
		let slots = Arc::clone(&self.slots);
		self.dispatcher.dispatch(Box::new(move || slots.lock().handlers.clear()));
	}

	pub fn dispatcher(&self) -> &Dispatcher {
		&self.dispatcher
	}
}

impl<T: Send + 'static> Default for Signal<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> fmt::Debug for Signal<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Signal")
			.field("handlers", &self.slots.lock().handlers.len())
			.finish_non_exhaustive()
	}
}
