use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{KernelSession, SessionManager, SessionRequest};
use crate::KernelError;

/// In-process [`SessionManager`] that tracks sessions without running anything.
///
/// Kernels are known by spec name. Sessions are listed in start order.
pub struct MemorySessions {
	specs: BTreeMap<String, String>,
	default_name: Option<String>,
	sessions: RwLock<Vec<KernelSession>>,
	next_id: AtomicU64,
}

impl MemorySessions {
	/// Creates a manager with no kernel specs; every start fails.
	pub fn new() -> Self {
		Self {
			specs: BTreeMap::new(),
			default_name: None,
			sessions: RwLock::new(Vec::new()),
			next_id: AtomicU64::new(1),
		}
	}

	/// Adds a startable kernel spec. The first spec added becomes the default.
	pub fn with_kernel(mut self, name: impl Into<String>, language: impl Into<String>) -> Self {
		let name = name.into();
		self.default_name.get_or_insert_with(|| name.clone());
		self.specs.insert(name, language.into());
		self
	}

	/// Language of the kernel spec `name`.
	pub fn language_of(&self, name: &str) -> Option<&str> {
		self.specs.get(name).map(String::as_str)
	}

	/// Snapshot of live sessions without going through the async API.
	pub fn sessions(&self) -> Vec<KernelSession> {
		self.sessions.read().clone()
	}

	fn pick_spec(&self, request: &SessionRequest) -> Result<String, KernelError> {
		if let Some(name) = &request.kernel.name {
			return self
				.specs
				.contains_key(name)
				.then(|| name.clone())
				.ok_or_else(|| KernelError::NotFound(name.clone()));
		}
		if let Some(language) = &request.kernel.language
			&& let Some((name, _)) = self.specs.iter().find(|(_, lang)| *lang == language)
		{
			return Ok(name.clone());
		}
		self.default_name
			.clone()
			.ok_or_else(|| KernelError::Unavailable("no kernel specs installed".into()))
	}
}

impl Default for MemorySessions {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl SessionManager for MemorySessions {
	async fn list_sessions(&self) -> Result<Vec<KernelSession>, KernelError> {
		Ok(self.sessions())
	}

	async fn start_or_connect(&self, request: SessionRequest) -> Result<KernelSession, KernelError> {
		if let Some(kernel_id) = &request.kernel.id {
			let mut sessions = self.sessions.write();
			let existing = sessions
				.iter()
				.find(|session| &session.kernel_id == kernel_id)
				.cloned()
				.ok_or_else(|| KernelError::NotFound(kernel_id.clone()))?;
			let session = KernelSession {
				id: format!("session-{}", self.next_id.fetch_add(1, Ordering::Relaxed)),
				path: request.path,
				..existing
			};
			sessions.push(session.clone());
			debug!(kernel = %session.kernel_id, path = %session.path, "connected to kernel");
			return Ok(session);
		}

		let kernel_name = self.pick_spec(&request)?;
		let n = self.next_id.fetch_add(1, Ordering::Relaxed);
		let session = KernelSession {
			id: format!("session-{n}"),
			path: request.path,
			kernel_id: format!("kernel-{n}"),
			kernel_name,
		};
		debug!(kernel = %session.kernel_id, name = %session.kernel_name, "kernel started");
		self.sessions.write().push(session.clone());
		Ok(session)
	}

	async fn shutdown(&self, session: &KernelSession) -> Result<(), KernelError> {
		let mut sessions = self.sessions.write();
		let before = sessions.len();
		sessions.retain(|live| live.id != session.id);
		if sessions.len() == before {
			return Err(KernelError::NotFound(session.id.clone()));
		}
		Ok(())
	}

	async fn set_session_path(&self, session: &KernelSession, path: &str) -> Result<KernelSession, KernelError> {
		let mut sessions = self.sessions.write();
		let live = sessions
			.iter_mut()
			.find(|live| live.id == session.id)
			.ok_or_else(|| KernelError::NotFound(session.id.clone()))?;
		live.path = path.to_string();
		Ok(live.clone())
	}
}
