//! Static file metadata used for matching and for creating new files.

use folio_context::{ContentType, FileFormat};
use serde::{Deserialize, Serialize};

/// A named kind of file, recognized by extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileType {
	pub name: String,
	#[serde(default)]
	pub extensions: Vec<String>,
	#[serde(default)]
	pub mime_types: Vec<String>,
	#[serde(default)]
	pub display_name: Option<String>,
	#[serde(default)]
	pub content_type: ContentType,
	#[serde(default)]
	pub file_format: FileFormat,
	/// Kernel language files of this type are written in.
	#[serde(default)]
	pub language: Option<String>,
}

impl FileType {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			extensions: Vec::new(),
			mime_types: Vec::new(),
			display_name: None,
			content_type: ContentType::File,
			file_format: FileFormat::Text,
			language: None,
		}
	}

	pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.extensions.extend(extensions.into_iter().map(Into::into));
		self
	}

	pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
		self.mime_types.push(mime.into());
		self
	}

	pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
		self.display_name = Some(name.into());
		self
	}

	pub fn with_format(mut self, format: FileFormat, content_type: ContentType) -> Self {
		self.file_format = format;
		self.content_type = content_type;
		self
	}

	pub fn with_language(mut self, language: impl Into<String>) -> Self {
		self.language = Some(language.into());
		self
	}

	/// True if `extension` (already normalized) is one of this type's.
	pub fn has_extension(&self, extension: &str) -> bool {
		self.extensions.iter().any(|own| own == extension)
	}

	/// File types a registry is seeded with by default.
	pub fn defaults() -> Vec<FileType> {
		vec![
			FileType::new("text")
				.with_display_name("Text")
				.with_extensions([".txt"])
				.with_mime_type("text/plain"),
			FileType::new("markdown")
				.with_display_name("Markdown File")
				.with_extensions([".md", ".markdown"])
				.with_mime_type("text/markdown"),
			FileType::new("python")
				.with_display_name("Python File")
				.with_extensions([".py"])
				.with_mime_type("text/x-python")
				.with_language("python"),
			FileType::new("json")
				.with_display_name("JSON File")
				.with_extensions([".json"])
				.with_mime_type("application/json")
				.with_format(FileFormat::Json, ContentType::File),
			FileType::new("notebook")
				.with_display_name("Notebook")
				.with_extensions([".ipynb"])
				.with_mime_type("application/x-ipynb+json")
				.with_format(FileFormat::Json, ContentType::Notebook),
			FileType::new("csv")
				.with_display_name("CSV File")
				.with_extensions([".csv"])
				.with_mime_type("text/csv"),
			FileType::new("png")
				.with_display_name("PNG Image")
				.with_extensions([".png"])
				.with_mime_type("image/png")
				.with_format(FileFormat::Base64, ContentType::File),
		]
	}
}

/// Recipe for creating a new, untitled file of some type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCreator {
	pub name: String,
	/// Name of the [`FileType`] to create.
	pub file_type: String,
	/// Widget factory to open the new file with; the default viewer otherwise.
	#[serde(default)]
	pub widget_name: Option<String>,
	/// Kernel to start with the new file.
	#[serde(default)]
	pub kernel_name: Option<String>,
}

impl FileCreator {
	pub fn new(name: impl Into<String>, file_type: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			file_type: file_type.into(),
			widget_name: None,
			kernel_name: None,
		}
	}

	pub fn with_widget(mut self, widget_name: impl Into<String>) -> Self {
		self.widget_name = Some(widget_name.into());
		self
	}

	pub fn with_kernel(mut self, kernel_name: impl Into<String>) -> Self {
		self.kernel_name = Some(kernel_name.into());
		self
	}
}
