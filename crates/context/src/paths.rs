//! Helpers for `/`-separated, root-relative storage paths.

/// Collapses empty and `.` segments and resolves `..`.
///
/// Leading slashes are dropped. Returns `None` when `..` would climb above
/// the root.
pub fn normalize(path: &str) -> Option<String> {
	let mut parts: Vec<&str> = Vec::new();
	for segment in path.split('/') {
		match segment {
			"" | "." => {}
			".." => {
				parts.pop()?;
			}
			other => parts.push(other),
		}
	}
	Some(parts.join("/"))
}

/// Final segment of `path`.
pub fn basename(path: &str) -> &str {
	let trimmed = path.trim_end_matches('/');
	trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Everything before the final segment, without a trailing slash.
pub fn dirname(path: &str) -> &str {
	let trimmed = path.trim_end_matches('/');
	match trimmed.rfind('/') {
		Some(idx) => &trimmed[..idx],
		None => "",
	}
}

pub fn join(dir: &str, name: &str) -> String {
	let dir = dir.trim_end_matches('/');
	if dir.is_empty() {
		name.to_string()
	} else {
		format!("{dir}/{name}")
	}
}

/// Lowercased extension of `path` including the dot (`"notes.TXT"` → `".txt"`).
///
/// Only the portion after the last dot counts. Dotfiles such as `.bashrc`
/// and names ending in a dot have no extension.
pub fn extension(path: &str) -> Option<String> {
	let name = basename(path);
	match name.rfind('.') {
		Some(0) | None => None,
		Some(idx) if idx + 1 == name.len() => None,
		Some(idx) => Some(name[idx..].to_ascii_lowercase()),
	}
}
