use async_trait::async_trait;

/// User-interaction collaborator consulted by `save_as`.
#[async_trait]
pub trait PathPrompt: Send + Sync {
	/// Asks for a new path, starting from `current`. `None` means cancelled.
	async fn prompt_for_path(&self, current: &str) -> Option<String>;
}
