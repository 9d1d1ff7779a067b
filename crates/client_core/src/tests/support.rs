use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::error::ApiError;
use tokio::sync::Notify;

use crate::transport::{ApiRequest, ApiTransport, DownloadedFile, FileUpload, TransportError};

type Probe = Box<dyn Fn(&ApiRequest) + Send + Sync>;

/// In-memory backend: replays queued responses and records every call.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<Value, TransportError>>>,
    calls: Mutex<Vec<ApiRequest>>,
    uploads: Mutex<Vec<(String, Vec<(String, String)>, FileUpload)>>,
    downloads: Mutex<VecDeque<DownloadedFile>>,
    probe: Mutex<Option<Probe>>,
    hold: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_ok(&self, value: Value) {
        self.responses.lock().expect("lock").push_back(Ok(value));
    }

    pub fn push_status(&self, status: u16, message: &str) {
        let err = ApiError::new(status, Some(message.to_string()));
        self.responses
            .lock()
            .expect("lock")
            .push_back(Err(TransportError::Api(err)));
    }

    pub fn push_download(&self, bytes: &[u8], content_type: Option<&str>) {
        self.downloads.lock().expect("lock").push_back(DownloadedFile {
            bytes: bytes.to_vec(),
            content_type: content_type.map(str::to_string),
        });
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn uploads(&self) -> Vec<(String, Vec<(String, String)>, FileUpload)> {
        self.uploads.lock().expect("lock").clone()
    }

    /// Runs `probe` while each request is "on the wire".
    pub fn set_probe(&self, probe: impl Fn(&ApiRequest) + Send + Sync + 'static) {
        *self.probe.lock().expect("lock") = Some(Box::new(probe));
    }

    /// Parks the next request until `release` is notified. `entered` fires once it is parked.
    pub fn hold_next(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.hold.lock().expect("lock") = Some((Arc::clone(&entered), Arc::clone(&release)));
        (entered, release)
    }
}

#[async_trait]
impl ApiTransport for ScriptedTransport {
    async fn execute(&self, request: ApiRequest) -> Result<Value, TransportError> {
        self.calls.lock().expect("lock").push(request.clone());
        {
            let probe = self.probe.lock().expect("lock");
            if let Some(probe) = probe.as_ref() {
                probe(&request);
            }
        }
        let hold = self.hold.lock().expect("lock").take();
        if let Some((entered, release)) = hold {
            entered.notify_one();
            release.notified().await;
        }
        self.responses
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})))
    }

    async fn upload(
        &self,
        path: &str,
        fields: Vec<(String, String)>,
        file: FileUpload,
    ) -> Result<Value, TransportError> {
        let index = {
            let mut uploads = self.uploads.lock().expect("lock");
            uploads.push((path.to_string(), fields, file));
            uploads.len()
        };
        Ok(json!({ "fileUrl": format!("https://files.example/{index}") }))
    }

    async fn download(&self, url: &str) -> Result<DownloadedFile, TransportError> {
        self.downloads
            .lock()
            .expect("lock")
            .pop_front()
            .ok_or_else(|| TransportError::Network(format!("no download scripted for {url}")))
    }
}

pub fn comment_json(id: &str, text: &str) -> Value {
    json!({
        "_id": id,
        "user": { "givenName": "Ada", "role": "student", "profileImage": "https://img/ada.png" },
        "text": text,
        "createdAt": "2024-05-01T10:00:00Z",
        "replies": []
    })
}

pub fn task_json(id: &str, status: &str, assigned: &str, comments: Vec<Value>) -> Value {
    json!({
        "_id": id,
        "title": "Upload transcripts",
        "description": "Scan and upload all semester transcripts",
        "status": status,
        "assignedUser": assigned,
        "comments": comments,
        "createdAt": "2024-04-28T09:00:00Z"
    })
}
