use url::Url;

use crate::UrlError;
use crate::paths;

/// Resolves a resource reference found inside the document at `document_path`.
///
/// Absolute URLs (with a scheme) and protocol-relative references are
/// returned untouched. Anything else becomes an absolute, server-relative
/// path: references starting with `/` are taken from the server root, the
/// rest from the document's directory. Query strings and fragments are kept.
pub fn resolve_url(document_path: &str, url: &str) -> Result<String, UrlError> {
	let url = url.trim();
	if url.is_empty() {
		return Err(UrlError::Empty);
	}
	if url.starts_with("//") || Url::parse(url).is_ok() {
		return Ok(url.to_string());
	}

	let split = url.find(['?', '#']).unwrap_or(url.len());
	let (path, suffix) = url.split_at(split);

	let joined = if path.is_empty() {
		document_path.to_string()
	} else if path.starts_with('/') {
		path.to_string()
	} else {
		paths::join(paths::dirname(document_path), path)
	};

	let normalized = paths::normalize(&joined).ok_or_else(|| UrlError::EscapesRoot(url.to_string()))?;
	Ok(format!("/{normalized}{suffix}"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn relative_reference_uses_document_directory() {
		assert_eq!(resolve_url("docs/guide/intro.md", "img/a.png").unwrap(), "/docs/guide/img/a.png");
		assert_eq!(resolve_url("docs/guide/intro.md", "../b.png").unwrap(), "/docs/b.png");
		assert_eq!(resolve_url("top.md", "./c.png").unwrap(), "/c.png");
	}

	#[test]
	fn root_reference_ignores_document_directory() {
		assert_eq!(resolve_url("docs/intro.md", "/static/x.css").unwrap(), "/static/x.css");
	}

	#[test]
	fn absolute_urls_pass_through() {
		assert_eq!(
			resolve_url("a.md", "https://example.com/x?y=1").unwrap(),
			"https://example.com/x?y=1"
		);
		assert_eq!(resolve_url("a.md", "//cdn.example.com/x.js").unwrap(), "//cdn.example.com/x.js");
		assert_eq!(resolve_url("a.md", "data:text/plain,hi").unwrap(), "data:text/plain,hi");
	}

	#[test]
	fn query_and_fragment_are_preserved() {
		assert_eq!(resolve_url("d/a.md", "b.md#part").unwrap(), "/d/b.md#part");
		assert_eq!(resolve_url("d/a.md", "b.csv?raw=1").unwrap(), "/d/b.csv?raw=1");
		assert_eq!(resolve_url("d/a.md", "#top").unwrap(), "/d/a.md#top");
	}

	#[test]
	fn malformed_input_fails() {
		assert_eq!(resolve_url("a.md", "   "), Err(UrlError::Empty));
		assert!(matches!(resolve_url("a.md", "../../x"), Err(UrlError::EscapesRoot(_))));
	}

	#[test]
	fn resolution_is_pure() {
		let first = resolve_url("d/a.md", "x/../y.png").unwrap();
		let second = resolve_url("d/a.md", "x/../y.png").unwrap();
		assert_eq!(first, second);
		assert_eq!(first, "/d/y.png");
	}
}
