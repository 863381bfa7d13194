use std::path::Path;
use std::sync::Arc;

use gems_core::SubmissionKind;
use serde_json::Value;
use tracing::debug;

use crate::endpoints::{endpoint, Endpoint};
use crate::error::UploadError;
use crate::stager::StagedImage;
use crate::transport::{HttpReply, Transport, UploadFile};

pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    }
}

fn upload_file_name(ep: &Endpoint, path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or("jpg");
    format!("{}_{}.{}", ep.domain, gems_core::unique_name(), ext)
}

fn non_empty_str<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Turns an upload reply into the public URL of the stored image.
pub fn resolve_upload_url(ep: &Endpoint, base: &str, reply: &HttpReply) -> Result<String, UploadError> {
    if !reply.is_success() {
        return Err(UploadError::Rejected {
            status: reply.status,
            message: reply.message(),
        });
    }
    let body = match reply.body.as_ref() {
        Some(Value::Array(items)) => items.first(),
        other => other,
    };
    let Some(body) = body else {
        return Err(UploadError::MissingLocation);
    };
    if let Some(url) = non_empty_str(body, "url") {
        return Ok(url.to_string());
    }
    if let Some(filename) = non_empty_str(body, "filename") {
        return Ok(ep.uploads_url(base, filename));
    }
    Err(UploadError::MissingLocation)
}

pub struct Uploader {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl Uploader {
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Uploads one staged image and returns its public URL.
    pub async fn upload(&self, kind: SubmissionKind, image: &StagedImage) -> Result<String, UploadError> {
        let ep = endpoint(kind);
        let bytes = tokio::fs::read(&image.path).await.map_err(|source| UploadError::Read {
            path: image.path.clone(),
            source,
        })?;
        let file = UploadFile {
            field: ep.image_field.to_string(),
            file_name: upload_file_name(&ep, &image.path),
            mime: mime_for(&image.path).to_string(),
            bytes,
        };
        debug!(kind = %kind, file = %file.file_name, size = file.bytes.len(), "uploading image");
        let reply = self
            .transport
            .post_multipart(&ep.upload_url(&self.base_url), file)
            .await?;
        resolve_upload_url(&ep, &self.base_url, &reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    const BASE: &str = "https://api.example.com";

    fn resto() -> Endpoint {
        endpoint(SubmissionKind::Restaurant)
    }

    #[test]
    fn url_wins_over_filename() {
        let reply = HttpReply::new(200, Some(json!({"url": "https://cdn/x1.jpg", "filename": "x1.jpg"})));
        assert_eq!(resolve_upload_url(&resto(), BASE, &reply).unwrap(), "https://cdn/x1.jpg");
    }

    #[test]
    fn filename_is_joined_to_uploads() {
        let reply = HttpReply::new(201, Some(json!({"filename": "abc.jpg"})));
        assert_eq!(
            resolve_upload_url(&resto(), BASE, &reply).unwrap(),
            "https://api.example.com/resto/uploads/abc.jpg"
        );
    }

    #[test]
    fn array_reply_uses_first_element() {
        let ep = endpoint(SubmissionKind::Post);
        let reply = HttpReply::new(200, Some(json!([{"url": "https://cdn/a.jpg"}, {"url": "https://cdn/b.jpg"}])));
        assert_eq!(resolve_upload_url(&ep, BASE, &reply).unwrap(), "https://cdn/a.jpg");
    }

    #[test]
    fn reply_without_location_fails() {
        for body in [Some(json!({"ok": true})), Some(json!({"url": ""})), Some(json!([])), None] {
            let reply = HttpReply::new(200, body);
            assert!(matches!(
                resolve_upload_url(&resto(), BASE, &reply),
                Err(UploadError::MissingLocation)
            ));
        }
    }

    #[test]
    fn error_status_carries_server_text() {
        let reply = HttpReply::new(413, Some(json!({"error": "File terlalu besar"})));
        match resolve_upload_url(&resto(), BASE, &reply) {
            Err(UploadError::Rejected { status, message }) => {
                assert_eq!(status, 413);
                assert_eq!(message, "File terlalu besar");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn mime_and_name_follow_extension() {
        assert_eq!(mime_for(&PathBuf::from("/a/b.PNG")), "image/png");
        assert_eq!(mime_for(&PathBuf::from("/a/b")), "image/jpeg");
        let name = upload_file_name(&endpoint(SubmissionKind::Dish), &PathBuf::from("/a/b.webp"));
        assert!(name.starts_with("kuliner_") && name.ends_with(".webp"));
    }
}
