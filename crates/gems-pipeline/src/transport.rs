use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

/// One file part of a multipart upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadFile {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Status plus the JSON body, if the body parsed as JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Option<Value>,
}

impl HttpReply {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `error` or `message` from the body, whichever is present first.
    pub fn server_message(&self) -> Option<String> {
        let obj = self.body.as_ref()?.as_object()?;
        ["error", "message"]
            .iter()
            .filter_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn message(&self) -> String {
        self.server_message()
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// The two request shapes the pipeline needs. Non-2xx replies are returned,
/// not raised; callers decide what a status means.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_multipart(&self, url: &str, file: UploadFile) -> Result<HttpReply, TransportError>;

    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, TransportError>;
}

#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

async fn read_reply(resp: reqwest::Response) -> Result<HttpReply, TransportError> {
    let status = resp.status().as_u16();
    let bytes = resp.bytes().await?;
    let body = serde_json::from_slice::<Value>(&bytes).ok();
    Ok(HttpReply { status, body })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_multipart(&self, url: &str, file: UploadFile) -> Result<HttpReply, TransportError> {
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.mime)?;
        let form = Form::new().part(file.field, part);
        let resp = self.client.post(url).multipart(form).send().await?;
        read_reply(resp).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, TransportError> {
        let resp = self.client.post(url).json(body).send().await?;
        read_reply(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_prefers_error_then_message() {
        let reply = HttpReply::new(400, Some(json!({"error": "bad image", "message": "ignored"})));
        assert_eq!(reply.message(), "bad image");

        let reply = HttpReply::new(409, Some(json!({"message": "Restoran sudah ada"})));
        assert_eq!(reply.message(), "Restoran sudah ada");
    }

    #[test]
    fn message_falls_back_to_status() {
        assert_eq!(HttpReply::new(500, None).message(), "HTTP 500");
        assert_eq!(HttpReply::new(502, Some(json!(["x"]))).message(), "HTTP 502");
        assert!(!HttpReply::new(500, None).is_success());
        assert!(HttpReply::new(201, None).is_success());
    }
}
