//! HTTP collaborator used by every portal flow.
//!
//! Flows only describe *what* to call through [`ApiRequest`]; the transport
//! owns the base url and attaches credentials, so no flow ever builds headers.

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, RequestBuilder,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shared::error::ApiError;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::credentials::CredentialContext;

/// Header carrying the second login token next to the bearer credential.
pub const INTEGRITY_HEADER: &str = "auth-token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, TransportError> {
        let value =
            serde_json::to_value(body).map_err(|err| TransportError::Encode(err.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("backend rejected request: {0}")]
    Api(#[from] ApiError),
    #[error("network failure: {0}")]
    Network(String),
    #[error("failed to decode backend response: {0}")]
    Decode(String),
    #[error("failed to encode request: {0}")]
    Encode(String),
    #[error("invalid backend url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl TransportError {
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            TransportError::Api(err) => Some(err),
            _ => None,
        }
    }

    /// Message the backend attached to its failure response, if any.
    pub fn server_message(&self) -> Option<&str> {
        self.api().and_then(|err| err.message.as_deref())
    }

    pub fn is_not_found(&self) -> bool {
        self.api().is_some_and(ApiError::is_not_found)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Runs one JSON request. An empty success body yields `Value::Null`.
    async fn execute(&self, request: ApiRequest) -> Result<Value, TransportError>;

    /// Posts one file as multipart `file` alongside plain text fields.
    async fn upload(
        &self,
        path: &str,
        fields: Vec<(String, String)>,
        file: FileUpload,
    ) -> Result<Value, TransportError>;

    /// Fetches raw bytes from an absolute url or a backend-relative path.
    async fn download(&self, url: &str) -> Result<DownloadedFile, TransportError>;
}

/// Executes `request` and decodes the JSON response into `T`.
pub async fn call<T: DeserializeOwned>(
    transport: &dyn ApiTransport,
    request: ApiRequest,
) -> Result<T, TransportError> {
    let value = transport.execute(request).await?;
    serde_json::from_value(value).map_err(|err| TransportError::Decode(err.to_string()))
}

pub struct HttpTransport {
    http: Client,
    base_url: String,
    credentials: CredentialContext,
}

impl HttpTransport {
    pub fn new(base_url: &str, credentials: CredentialContext) -> Result<Self, TransportError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed).map_err(|err| TransportError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TransportError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        Ok(Self {
            http: Client::new(),
            base_url: trimmed.to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    async fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.credentials.get().await {
            Some(credentials) => {
                let builder = builder.bearer_auth(&credentials.token);
                match credentials.uniq_token {
                    Some(uniq_token) => builder.header(INTEGRITY_HEADER, uniq_token),
                    None => builder,
                }
            }
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder) -> Result<Value, TransportError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            return Err(ApiError::from_body(status.as_u16(), &text).into());
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|err| TransportError::Decode(err.to_string()))
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<Value, TransportError> {
        let url = self.endpoint(&request.path);
        debug!(method = ?request.method, %url, "portal request");

        let builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
            Method::Put => self.http.put(&url),
            Method::Delete => self.http.delete(&url),
        };
        let builder = if request.query.is_empty() {
            builder
        } else {
            builder.query(&request.query)
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        Self::send(self.authorize(builder).await).await
    }

    async fn upload(
        &self,
        path: &str,
        fields: Vec<(String, String)>,
        file: FileUpload,
    ) -> Result<Value, TransportError> {
        let url = self.endpoint(path);
        debug!(%url, file_name = %file.file_name, size = file.bytes.len(), "portal upload");

        let mut part = Part::bytes(file.bytes).file_name(file.file_name);
        if let Some(mime_type) = &file.mime_type {
            part = part
                .mime_str(mime_type)
                .map_err(|err| TransportError::Encode(err.to_string()))?;
        }
        let form = fields
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value))
            .part("file", part);

        let builder = self.authorize(self.http.post(&url).multipart(form)).await;
        Self::send(builder).await
    }

    async fn download(&self, url: &str) -> Result<DownloadedFile, TransportError> {
        let builder = if url.starts_with('/') {
            self.authorize(self.http.get(self.endpoint(url))).await
        } else {
            self.http.get(url)
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_body(status.as_u16(), &text).into());
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        Ok(DownloadedFile {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
