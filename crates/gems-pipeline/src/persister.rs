use std::sync::Arc;

use gems_core::{Payload, SubmissionKind};
use serde_json::Value;
use tracing::debug;

use crate::endpoints::{endpoint, Confirmation, Endpoint, UrlShape};
use crate::error::PersistError;
use crate::transport::{HttpReply, Transport};

/// Payload fields plus the kind's URL field. The URL field overrides any
/// payload key of the same name.
pub fn build_persist_body(kind: SubmissionKind, payload: &Payload, urls: &[String]) -> Value {
    let ep = endpoint(kind);
    let mut body = payload.clone();
    let urls_value = match ep.url_shape {
        UrlShape::Single => urls.first().cloned().map(Value::String).unwrap_or(Value::Null),
        UrlShape::List => Value::Array(urls.iter().cloned().map(Value::String).collect()),
    };
    body.insert(ep.url_field.to_string(), urls_value);
    Value::Object(body)
}

fn body_status(body: &Value) -> Option<u64> {
    body.get("status").and_then(Value::as_u64)
}

fn rejected(status: u16, reply: &HttpReply) -> PersistError {
    let message = reply
        .server_message()
        .unwrap_or_else(|| format!("HTTP {status}"));
    PersistError::Rejected { status, message }
}

/// Decides whether a create reply proves the record was saved. Returns the
/// body as the receipt.
pub fn check_confirmation(ep: &Endpoint, reply: &HttpReply) -> Result<Value, PersistError> {
    if !reply.is_success() {
        return Err(rejected(reply.status, reply));
    }
    let Some(body) = reply.body.as_ref() else {
        return Err(PersistError::Unconfirmed(format!(
            "HTTP {} without a JSON body",
            reply.status
        )));
    };
    let status = body_status(body);
    match ep.confirmation {
        Confirmation::HttpSuccess => match status {
            Some(s) if !(200..300).contains(&s) => Err(rejected(u16::try_from(s).unwrap_or(u16::MAX), reply)),
            _ => Ok(body.clone()),
        },
        Confirmation::StatusField => match status {
            Some(200) => Ok(body.clone()),
            Some(s) => Err(rejected(u16::try_from(s).unwrap_or(u16::MAX), reply)),
            None => Err(PersistError::Unconfirmed(
                reply
                    .server_message()
                    .unwrap_or_else(|| "server did not confirm the save".to_string()),
            )),
        },
    }
}

pub struct MetadataPersister {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl MetadataPersister {
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn persist(&self, kind: SubmissionKind, payload: &Payload, urls: &[String]) -> Result<Value, PersistError> {
        let ep = endpoint(kind);
        let body = build_persist_body(kind, payload, urls);
        debug!(kind = %kind, images = urls.len(), "creating record");
        let reply = self.transport.post_json(&ep.create_url(&self.base_url), &body).await?;
        check_confirmation(&ep, &reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(v: Value) -> Payload {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn restaurant_body_has_single_photo_or_null() {
        let p = payload(json!({"namaRestoran": "Warung X"}));
        let body = build_persist_body(SubmissionKind::Restaurant, &p, &["https://cdn/x1.jpg".into()]);
        assert_eq!(body, json!({"namaRestoran": "Warung X", "fotoRestoran": "https://cdn/x1.jpg"}));

        let body = build_persist_body(SubmissionKind::Dish, &payload(json!({"namaMakanan": "Soto"})), &[]);
        assert_eq!(body["fotoMakanan"], Value::Null);
    }

    #[test]
    fn post_body_lists_urls_in_order() {
        let urls = vec!["u1".to_string(), "u2".to_string(), "u3".to_string()];
        let body = build_persist_body(SubmissionKind::Post, &payload(json!({"content": "hi"})), &urls);
        assert_eq!(body["imageUrls"], json!(["u1", "u2", "u3"]));
        assert_eq!(body["content"], "hi");
    }

    #[test]
    fn http_success_accepts_plain_2xx_body() {
        let ep = endpoint(SubmissionKind::Restaurant);
        let receipt = check_confirmation(&ep, &HttpReply::new(201, Some(json!({"id": 42})))).unwrap();
        assert_eq!(receipt["id"], 42);
    }

    #[test]
    fn http_success_rejects_embedded_error_status() {
        let ep = endpoint(SubmissionKind::Dish);
        let reply = HttpReply::new(200, Some(json!({"status": 400, "message": "Nama makanan wajib diisi"})));
        match check_confirmation(&ep, &reply) {
            Err(PersistError::Rejected { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "Nama makanan wajib diisi");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn status_field_must_be_200() {
        let ep = endpoint(SubmissionKind::Post);
        assert!(check_confirmation(&ep, &HttpReply::new(200, Some(json!({"status": 200, "id": 7})))).is_ok());
        assert!(matches!(
            check_confirmation(&ep, &HttpReply::new(200, Some(json!({"id": 7})))),
            Err(PersistError::Unconfirmed(_))
        ));
        assert!(matches!(
            check_confirmation(&ep, &HttpReply::new(200, Some(json!({"status": 500, "message": "Gagal"})))),
            Err(PersistError::Rejected { status: 500, .. })
        ));
    }

    #[test]
    fn non_2xx_and_non_json_fail() {
        let ep = endpoint(SubmissionKind::Review);
        assert!(matches!(
            check_confirmation(&ep, &HttpReply::new(502, None)),
            Err(PersistError::Rejected { status: 502, .. })
        ));
        assert!(matches!(
            check_confirmation(&endpoint(SubmissionKind::Restaurant), &HttpReply::new(200, None)),
            Err(PersistError::Unconfirmed(_))
        ));
    }
}
