//! OpenAPI document lookup.
//!
//! The Redmine OpenAPI document is loaded once at startup and never changes
//! afterwards. [`PathCatalog`] serves two views of it to the tools:
//!
//! - the list of path templates, in document order
//! - the operation definitions for a caller-chosen set of templates
//!
//! Both are memoised. Because the document is immutable, cached results
//! never go stale.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::info;

use crate::error::DocumentError;

/// The Redmine OpenAPI document shipped with the binary.
pub const EMBEDDED_DOCUMENT: &str = include_str!("../../resources/redmine_openapi.yml");

/// Path template → operation definitions, in document order.
pub type PathMap = IndexMap<String, Value>;

/// The parts of an OpenAPI document the tools need.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiDocument {
    /// Document metadata.
    #[serde(default)]
    pub info: DocumentInfo,

    /// Every path template and its operations.
    pub paths: PathMap,
}

/// The `info` block of an OpenAPI document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentInfo {
    /// API title.
    #[serde(default)]
    pub title: Option<String>,
}

impl ApiDocument {
    /// Parses a YAML (or JSON) OpenAPI document.
    ///
    /// `origin` names the source in error messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid YAML or has no `paths`
    /// mapping.
    pub fn from_yaml_str(source: &str, origin: &str) -> Result<Self, DocumentError> {
        serde_yaml::from_str(source).map_err(|e| DocumentError::ParseError {
            origin: origin.to_string(),
            source: e,
        })
    }

    /// Parses the embedded Redmine document.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded document is malformed.
    pub fn embedded() -> Result<Self, DocumentError> {
        Self::from_yaml_str(EMBEDDED_DOCUMENT, "embedded")
    }

    /// Loads the document from `path`, or the embedded one when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, DocumentError> {
        let document = match path {
            Some(path) => {
                let source = std::fs::read_to_string(path).map_err(|e| DocumentError::ReadError {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                Self::from_yaml_str(&source, &path.display().to_string())?
            }
            None => Self::embedded()?,
        };

        info!(
            title = document.info.title.as_deref().unwrap_or("<untitled>"),
            paths = document.paths.len(),
            "Loaded OpenAPI document"
        );

        Ok(document)
    }
}

/// Memoised read-only views over a [`ApiDocument`].
#[derive(Debug)]
pub struct PathCatalog {
    document: ApiDocument,
    templates: Vec<String>,
    info_cache: HashMap<Vec<String>, PathMap>,
}

impl PathCatalog {
    /// Wraps a loaded document.
    #[must_use]
    pub fn new(document: ApiDocument) -> Self {
        let templates = document.paths.keys().cloned().collect();
        Self {
            document,
            templates,
            info_cache: HashMap::new(),
        }
    }

    /// The underlying document.
    #[must_use]
    pub const fn document(&self) -> &ApiDocument {
        &self.document
    }

    /// All path templates, in document order.
    #[must_use]
    pub fn list_paths(&self) -> &[String] {
        &self.templates
    }

    /// Operation definitions for the requested templates.
    ///
    /// Unknown templates are skipped. Entries appear in request order, and
    /// a repeated template appears once. Results are cached per request
    /// list exactly as given, so the same templates in a different order are
    /// a separate entry.
    pub fn path_info(&mut self, templates: &[String]) -> &PathMap {
        let paths = &self.document.paths;
        self.info_cache
            .entry(templates.to_vec())
            .or_insert_with(|| {
                templates
                    .iter()
                    .filter_map(|t| paths.get(t).map(|ops| (t.clone(), ops.clone())))
                    .collect()
            })
    }

    /// Number of memoised `path_info` results.
    #[cfg(test)]
    fn cached_lookups(&self) -> usize {
        self.info_cache.len()
    }
}
