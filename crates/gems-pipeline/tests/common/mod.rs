#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gems_core::Payload;
use gems_pipeline::{
    HttpReply, ImageStager, MetadataPersister, Orchestrator, Transport, TransportError, UploadFile, Uploader,
};
use gems_queue::SubmissionQueue;
use serde_json::Value;

pub const BASE: &str = "http://api.test";

pub enum Scripted {
    Reply(HttpReply),
    Fail(TransportError),
    Hang,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Multipart { url: String, field: String, file_name: String, mime: String },
    Json { url: String, body: Value },
}

/// In-memory transport answering from per-URL scripts, in order.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, path: &str, scripted: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(format!("{BASE}{path}"))
            .or_default()
            .push_back(scripted);
    }

    pub fn reply(&self, path: &str, status: u16, body: Value) {
        self.push(path, Scripted::Reply(HttpReply::new(status, Some(body))));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn multipart_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Multipart { .. }))
            .collect()
    }

    pub fn json_bodies(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Json { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    async fn answer(&self, url: &str) -> Result<HttpReply, TransportError> {
        let next = self.scripts.lock().unwrap().get_mut(url).and_then(|q| q.pop_front());
        match next {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Err(TransportError::Network(format!("no scripted reply for {url}"))),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_multipart(&self, url: &str, file: UploadFile) -> Result<HttpReply, TransportError> {
        self.calls.lock().unwrap().push(Call::Multipart {
            url: url.to_string(),
            field: file.field,
            file_name: file.file_name,
            mime: file.mime,
        });
        self.answer(url).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, TransportError> {
        self.calls.lock().unwrap().push(Call::Json {
            url: url.to_string(),
            body: body.clone(),
        });
        self.answer(url).await
    }
}

pub fn orchestrator(transport: &Arc<ScriptedTransport>, staging: &Path, step_timeout: Option<Duration>) -> Orchestrator {
    orchestrator_with_stager(transport, ImageStager::new(staging), step_timeout)
}

pub fn orchestrator_with_stager(
    transport: &Arc<ScriptedTransport>,
    stager: ImageStager,
    step_timeout: Option<Duration>,
) -> Orchestrator {
    Orchestrator::from_parts(
        SubmissionQueue::new(),
        stager,
        Uploader::new(transport.clone(), BASE),
        MetadataPersister::new(transport.clone(), BASE),
        step_timeout,
    )
}

pub fn payload(v: Value) -> Payload {
    v.as_object().cloned().unwrap()
}

/// Writes `count` small image files and returns their `file://` references.
pub fn images(dir: &Path, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let path: PathBuf = dir.join(format!("img{}.jpg", i + 1));
            std::fs::write(&path, format!("jpeg-{i}")).unwrap();
            format!("file://{}", path.display())
        })
        .collect()
}
