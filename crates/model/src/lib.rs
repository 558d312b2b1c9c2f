//! Document model contract shared by every folio crate.
//!
//! This crate holds the leaves of the document stack:
//! - [`Signal`] and [`Dispatcher`]: synchronous publish/subscribe channels
//! - [`ScopedHandle`]: acquire → handle → release values with idempotent release
//! - [`DocumentModel`]: the contract every model implementation fulfils
//! - [`TextModel`]: the built-in rope-backed text model
//!
//! Models are owned by exactly one document context and shared with views
//! through `Arc<dyn DocumentModel>`. All mutation funnels through the model's
//! own API so the dirty flag and change notifications stay consistent no
//! matter which view triggered the edit.

mod error;
mod handle;
mod model;
pub mod signal;
mod text;

pub use error::ModelError;
pub use handle::{ScopedHandle, Subscription};
pub use model::{ContentChange, DocumentModel, ModelOptions, StateChange, downcast_model};
pub use signal::{Dispatcher, Signal};
pub use text::TextModel;
