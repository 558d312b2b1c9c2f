use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RegistryError;

/// Settings for a [`DocumentRegistry`](crate::DocumentRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
	/// Seed the registry with [`FileType::defaults`](crate::FileType::defaults).
	#[serde(default = "default_true")]
	pub initial_file_types: bool,
	/// Register the `text` and `base64` model factories.
	#[serde(default = "default_true")]
	pub register_default_model_factories: bool,
	/// Host overrides of the default viewer, extension to widget factory name.
	#[serde(default)]
	pub default_viewers: BTreeMap<String, String>,
	/// Tolerance, in milliseconds, before a newer `last_modified` in storage
	/// counts as an external change.
	#[serde(default = "default_check_margin_ms")]
	pub last_modified_check_margin_ms: u64,
}

fn default_true() -> bool {
	true
}

fn default_check_margin_ms() -> u64 {
	500
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			initial_file_types: true,
			register_default_model_factories: true,
			default_viewers: BTreeMap::new(),
			last_modified_check_margin_ms: default_check_margin_ms(),
		}
	}
}

impl RegistryConfig {
	/// A registry with nothing pre-registered.
	pub fn empty() -> Self {
		Self {
			initial_file_types: false,
			register_default_model_factories: false,
			..Self::default()
		}
	}

	pub fn from_json_str(json: &str) -> Result<Self, RegistryError> {
		Ok(serde_json::from_str(json)?)
	}

	pub fn check_margin(&self) -> Duration {
		Duration::from_millis(self.last_modified_check_margin_ms)
	}
}
