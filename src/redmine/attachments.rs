//! Attachment upload and download.
//!
//! Upload is a single raw-byte POST to `uploads.json`; Redmine answers with
//! a token that the caller later references when creating or updating an
//! issue. Download takes up to two round-trips:
//!
//! 1. `GET attachments/{id}.json` to learn the filename (skipped when the
//!    caller supplies one). A non-200 answer is returned as-is.
//! 2. `GET attachments/download/{id}/{filename}` for the content. A non-200
//!    or empty answer is returned as-is.
//!
//! Only after the content is on disk does the caller get a fresh
//! `{saved_to, filename}` envelope.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use super::client::{ApiRequest, RedmineClient, OCTET_STREAM};
use super::envelope::{Body, Envelope};
use super::error::ToolError;

impl RedmineClient {
    /// Uploads a local file and returns Redmine's envelope unchanged.
    ///
    /// `file_path` must be absolute (after `~` expansion) and must exist.
    /// Precondition failures are reported with `status_code = 0`.
    pub async fn upload(&self, file_path: &str, description: Option<&str>) -> Envelope {
        match self.try_upload(file_path, description).await {
            Ok(envelope) => envelope,
            Err(e) => Envelope::from_error(&e),
        }
    }

    async fn try_upload(
        &self,
        file_path: &str,
        description: Option<&str>,
    ) -> Result<Envelope, ToolError> {
        let path = resolve_local_path(file_path)?;
        if !path.exists() {
            return Err(ToolError::FileNotFound(file_path.to_string()));
        }

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let content = tokio::fs::read(&path).await.map_err(|e| ToolError::Io {
            action: "read",
            path: path.clone(),
            source: e,
        })?;

        info!(file = %path.display(), bytes = content.len(), "Uploading file to Redmine");

        let mut request = ApiRequest::post("uploads.json").with_query("filename", filename);
        if let Some(description) = description.filter(|d| !d.is_empty()) {
            request = request.with_query("description", description);
        }

        Ok(self.request(request.with_raw(content, OCTET_STREAM)).await)
    }

    /// Downloads an attachment into `save_path`.
    ///
    /// `save_path` must be absolute (after `~` expansion) and must not be an
    /// existing directory. When `filename` is `None` it is looked up from the
    /// attachment's metadata.
    pub async fn download(
        &self,
        attachment_id: u64,
        save_path: &str,
        filename: Option<&str>,
    ) -> Envelope {
        match self.try_download(attachment_id, save_path, filename).await {
            Ok(envelope) => envelope,
            Err(e) => Envelope::from_error(&e),
        }
    }

    async fn try_download(
        &self,
        attachment_id: u64,
        save_path: &str,
        filename: Option<&str>,
    ) -> Result<Envelope, ToolError> {
        let path = resolve_local_path(save_path)?;
        if path.is_dir() {
            return Err(ToolError::IsADirectory(save_path.to_string()));
        }

        let filename = match filename.filter(|f| !f.is_empty()) {
            Some(name) => name.to_string(),
            None => {
                let metadata = self
                    .request(ApiRequest::get(format!("attachments/{attachment_id}.json")))
                    .await;
                if metadata.status_code != 200 {
                    return Ok(metadata);
                }
                metadata
                    .json()
                    .and_then(attachment_filename)
                    .ok_or(ToolError::InvalidMetadata(attachment_id))?
                    .to_string()
            }
        };

        debug!(attachment_id, filename = %filename, "Fetching attachment content");

        let content = self
            .request(
                ApiRequest::get(format!("attachments/download/{attachment_id}/{filename}"))
                    .with_content_type(OCTET_STREAM)
                    .raw_response(),
            )
            .await;
        if content.status_code != 200 {
            return Ok(content);
        }
        let Some(bytes) = content
            .body
            .as_ref()
            .and_then(Body::as_bytes)
            .filter(|bytes| !bytes.is_empty())
        else {
            return Ok(content);
        };

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ToolError::Io {
                action: "write",
                path: path.clone(),
                source: e,
            })?;

        info!(
            attachment_id,
            file = %path.display(),
            bytes = bytes.len(),
            "Attachment saved"
        );

        Ok(Envelope::saved(&path, &filename))
    }
}

/// Extracts `attachment.filename` from attachment metadata.
fn attachment_filename(metadata: &Value) -> Option<&str> {
    metadata
        .get("attachment")?
        .get("filename")?
        .as_str()
        .filter(|name| !name.is_empty())
}

/// Expands a leading `~` and checks that the result is absolute.
///
/// # Errors
///
/// Returns [`ToolError::PathNotAbsolute`] for relative paths.
pub fn resolve_local_path(raw: &str) -> Result<PathBuf, ToolError> {
    let path = expand_home(raw);
    if path.is_absolute() {
        Ok(path)
    } else {
        Err(ToolError::PathNotAbsolute(raw.to_string()))
    }
}

fn expand_home(raw: &str) -> PathBuf {
    let rest = if raw == "~" {
        Some("")
    } else {
        raw.strip_prefix("~/")
    };

    match (rest, dirs::home_dir()) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => Path::new(raw).to_path_buf(),
    }
}
