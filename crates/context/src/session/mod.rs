//! Kernel/session collaborator contract.

mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::memory::MemorySessions;
use crate::KernelError;

/// Which kernel to start or connect to.
///
/// An `id` connects to an existing kernel; otherwise a new kernel is started
/// by `name`, falling back to the manager's default when both are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelOptions {
	pub name: Option<String>,
	pub id: Option<String>,
	pub language: Option<String>,
}

impl KernelOptions {
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			name: Some(name.into()),
			..Self::default()
		}
	}

	pub fn connect(id: impl Into<String>) -> Self {
		Self {
			id: Some(id.into()),
			..Self::default()
		}
	}
}

/// Handle to a running session: one kernel bound to one document path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSession {
	pub id: String,
	pub path: String,
	pub kernel_id: String,
	pub kernel_name: String,
}

/// Request passed to [`SessionManager::start_or_connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
	/// Document path the session is bound to.
	pub path: String,
	pub kernel: KernelOptions,
}

/// Kernel session backend consumed by document contexts.
#[async_trait]
pub trait SessionManager: Send + Sync {
	async fn list_sessions(&self) -> Result<Vec<KernelSession>, KernelError>;

	async fn start_or_connect(&self, request: SessionRequest) -> Result<KernelSession, KernelError>;

	async fn shutdown(&self, session: &KernelSession) -> Result<(), KernelError>;

	/// Rebinds `session` to a new document path after a move.
	async fn set_session_path(&self, session: &KernelSession, path: &str) -> Result<KernelSession, KernelError>;
}
