//! Student profile: fetch, document upload and document download.

use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use serde_json::{Map, Value};
use shared::{
    domain::{DocumentKind, StudentProfile},
    protocol::{ProfileEnvelope, UploadResponse},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::PortalError,
    transport::{call, ApiRequest, FileUpload, TransportError},
    PortalClient,
};

const PROFILE_PATH: &str = "/api/students/profile";
const UPLOAD_PATH: &str = "/api/students/upload";
const UPDATE_PROFILE_PATH: &str = "/api/students/update-profile";

/// MIME types the portal serves documents as, with the extension each maps to.
const KNOWN_TYPES: [(&str, &str); 4] = [
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("application/pdf", "pdf"),
];

/// Editable profile fields sent alongside uploaded document urls.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileForm {
    pub name: String,
    pub age: String,
    pub gender: String,
    pub contact_numbers: Vec<String>,
    pub account_number: String,
    #[serde(skip)]
    pub confirm_account_number: String,
    pub branch_name: String,
    pub university_name: String,
    pub country_name: String,
    pub current_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    pub kind: DocumentKind,
    pub file: FileUpload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedDownload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl PortalClient {
    pub async fn fetch_profile(&self) -> Result<StudentProfile, PortalError> {
        let ProfileEnvelope { student } =
            call(self.transport.as_ref(), ApiRequest::get(PROFILE_PATH)).await?;
        student.ok_or(PortalError::NotFound("profile"))
    }

    /// Uploads every document one at a time, then saves the form with the
    /// resulting urls merged in. Returns the uploaded urls in upload order.
    pub async fn update_profile(
        &self,
        form: &ProfileForm,
        uploads: Vec<DocumentUpload>,
    ) -> Result<Vec<(DocumentKind, String)>, PortalError> {
        if form.account_number != form.confirm_account_number {
            let message = "Account numbers do not match";
            self.notifier.error(message);
            return Err(PortalError::Validation(message.to_string()));
        }
        for kind in DocumentKind::ALL.into_iter().filter(|kind| !kind.allows_multiple()) {
            if uploads.iter().filter(|upload| upload.kind == kind).count() > 1 {
                return Err(PortalError::Validation(format!(
                    "only one {} file can be uploaded",
                    kind.field_name()
                )));
            }
        }

        let result = self.upload_and_save(form, uploads).await;
        match &result {
            Ok(uploaded) => {
                info!(documents = uploaded.len(), "profile updated");
                self.notifier.success("Profile and files uploaded successfully!");
            }
            Err(err) => {
                warn!(error = %err, "profile update failed");
                self.notifier.error("Upload failed");
            }
        }
        result
    }

    async fn upload_and_save(
        &self,
        form: &ProfileForm,
        uploads: Vec<DocumentUpload>,
    ) -> Result<Vec<(DocumentKind, String)>, PortalError> {
        let mut uploaded = Vec::with_capacity(uploads.len());
        let mut documents = Map::new();
        for DocumentUpload { kind, file } in uploads {
            let field = kind.field_name();
            debug!(field, file_name = %file.file_name, "uploading document");
            let response = self
                .transport
                .upload(UPLOAD_PATH, vec![("type".to_string(), field.to_string())], file)
                .await?;
            let UploadResponse { file_url } = serde_json::from_value(response)
                .map_err(|err| TransportError::Decode(err.to_string()))?;

            if kind.allows_multiple() {
                let entry = documents
                    .entry(field)
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(urls) = entry {
                    urls.push(Value::String(file_url.clone()));
                }
            } else {
                documents.insert(field.to_string(), Value::String(file_url.clone()));
            }
            uploaded.push((kind, file_url));
        }

        let mut payload = match serde_json::to_value(form)
            .map_err(|err| TransportError::Encode(err.to_string()))?
        {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        payload.extend(documents);
        self.transport
            .execute(ApiRequest::put(UPDATE_PROFILE_PATH).json(&payload)?)
            .await?;
        Ok(uploaded)
    }

    /// Fetches a stored document and names it after its content type.
    pub async fn download_document(
        &self,
        url: &str,
        name: &str,
    ) -> Result<NamedDownload, PortalError> {
        let file = self.transport.download(url).await?;
        let file_name = resolve_download_name(name, url, file.content_type.as_deref());
        debug!(%url, %file_name, size = file.bytes.len(), "document downloaded");
        Ok(NamedDownload {
            file_name,
            bytes: file.bytes,
        })
    }
}

/// Keeps `name` if it already has an extension; otherwise appends one taken
/// from the MIME type, falling back to the url's own extension.
pub fn resolve_download_name(name: &str, url: &str, content_type: Option<&str>) -> String {
    if name.contains('.') {
        return name.to_string();
    }
    let extension = content_type
        .and_then(extension_for_mime)
        .map(str::to_string)
        .or_else(|| url_extension(url));
    match extension {
        Some(extension) => format!("{name}.{extension}"),
        None => name.to_string(),
    }
}

fn extension_for_mime(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    KNOWN_TYPES
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, extension)| *extension)
}

fn url_extension(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let segment = path.rsplit('/').next()?;
    let (stem, extension) = segment.rsplit_once('.')?;
    (!stem.is_empty() && !extension.is_empty()).then(|| extension.to_string())
}

/// Reads a local file for upload, guessing its MIME type from the extension.
pub async fn read_upload(path: &Path) -> anyhow::Result<FileUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("'{}' has no usable file name", path.display()))?
        .to_string();
    let mime_type = mime_guess::from_path(path).first_raw().map(str::to_string);
    Ok(FileUpload {
        file_name,
        mime_type,
        bytes,
    })
}

#[cfg(test)]
#[path = "tests/profile_tests.rs"]
mod tests;
