//! Document contexts and the collaborators they coordinate.
//!
//! A [`DocumentContext`] owns one [`DocumentModel`](folio_model::DocumentModel)
//! and binds it to:
//! - a path in a [`Storage`] backend, with save/revert/checkpoint operations
//! - at most one kernel session from a [`SessionManager`]
//! - any number of sibling [`DocumentWidget`] views, held weakly
//!
//! Backends shipped here: [`MemoryStorage`], [`FsStorage`], [`MemorySessions`].

mod context;
mod error;
pub mod paths;
mod prompt;
mod session;
mod storage;
mod url;
mod widget;

pub use context::{
	ContextId, ContextOptions, ContextServices, DEFAULT_CHECK_MARGIN, DocumentContext, KernelChange, PathChange,
	SaveOptions, SaveOutcome, SaveState,
};
pub use error::{ContextError, KernelError, StorageError, UrlError};
pub use prompt::PathPrompt;
pub use session::{KernelOptions, KernelSession, MemorySessions, SessionManager, SessionRequest};
pub use storage::{
	Checkpoint, Content, ContentType, ContentsModel, FetchOptions, FileFormat, FsStorage, MemoryStorage, SaveRequest,
	Storage, decode_content, encode_content,
};
pub use widget::{DocumentWidget, WidgetId};

pub use self::url::resolve_url;
