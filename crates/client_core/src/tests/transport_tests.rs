use anyhow::Result;
use axum::{
    extract::{Multipart, Query},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use shared::error::ErrorCode;
use tokio::net::TcpListener;

use super::*;
use crate::credentials::Credentials;

fn header_value(headers: &HeaderMap, name: &str) -> Value {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map_or(Value::Null, |value| Value::String(value.to_string()))
}

async fn echo_headers(
    headers: HeaderMap,
    Query(query): Query<std::collections::HashMap<String, String>>,
) -> Json<Value> {
    Json(json!({
        "authorization": header_value(&headers, "authorization"),
        "integrity": header_value(&headers, INTEGRITY_HEADER),
        "email": query.get("email"),
    }))
}

async fn echo_body(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({ "received": body }))
}

async fn missing_task() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Task not found" })),
    )
}

async fn plain_failure() -> impl IntoResponse {
    (StatusCode::BAD_GATEWAY, "upstream timed out")
}

async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn receive_upload(mut multipart: Multipart) -> Json<Value> {
    let mut file_name = None;
    let mut kind = None;
    let mut size = 0;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let uploaded_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.unwrap_or_default();
        match name.as_str() {
            "file" => {
                file_name = uploaded_name;
                size = bytes.len();
            }
            "type" => kind = Some(String::from_utf8_lossy(&bytes).into_owned()),
            _ => {}
        }
    }
    Json(json!({
        "fileUrl": format!("https://files.example/{}", file_name.unwrap_or_default()),
        "type": kind,
        "size": size,
    }))
}

async fn public_file() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/pdf")],
        b"%PDF-1.7".to_vec(),
    )
}

async fn private_file(headers: HeaderMap) -> axum::response::Response {
    if headers.get("authorization").is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "login required" })))
            .into_response();
    }
    ([(header::CONTENT_TYPE, "image/png")], vec![0x89, b'P', b'N', b'G']).into_response()
}

async fn spawn_backend() -> Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/headers", get(echo_headers))
        .route("/echo", post(echo_body))
        .route("/api/tasks/:id", get(missing_task))
        .route("/broken", get(plain_failure))
        .route("/api/tasks/:id/comments/:comment", delete(no_content))
        .route("/api/students/upload", post(receive_upload))
        .route("/files/public.pdf", get(public_file))
        .route("/files/private", get(private_file));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn signed_in() -> CredentialContext {
    CredentialContext::with_credentials(Credentials::issued(
        "bearer-123",
        Some("uniq-456".to_string()),
        "ada@example.com",
        Utc::now(),
    ))
}

#[tokio::test]
async fn attaches_bearer_and_integrity_headers() {
    let base = spawn_backend().await.expect("spawn backend");
    let transport = HttpTransport::new(&format!("{base}/"), signed_in()).expect("transport");

    let echoed = transport
        .execute(ApiRequest::get("/headers").query("email", "ada@example.com"))
        .await
        .expect("headers");

    assert_eq!(echoed["authorization"], "Bearer bearer-123");
    assert_eq!(echoed["integrity"], "uniq-456");
    assert_eq!(echoed["email"], "ada@example.com");
}

#[tokio::test]
async fn anonymous_requests_carry_no_credentials() {
    let base = spawn_backend().await.expect("spawn backend");
    let transport = HttpTransport::new(&base, CredentialContext::new()).expect("transport");

    let echoed = transport
        .execute(ApiRequest::get("headers"))
        .await
        .expect("headers");

    assert_eq!(echoed["authorization"], Value::Null);
    assert_eq!(echoed["integrity"], Value::Null);
}

#[tokio::test]
async fn json_body_round_trips_through_backend() {
    let base = spawn_backend().await.expect("spawn backend");
    let transport = HttpTransport::new(&base, CredentialContext::new()).expect("transport");

    let request = ApiRequest::post("/echo")
        .json(&json!({ "text": "hello" }))
        .expect("encode");
    let response = transport.execute(request).await.expect("echo");

    assert_eq!(response, json!({ "received": { "text": "hello" } }));
}

#[tokio::test]
async fn error_status_carries_backend_message() {
    let base = spawn_backend().await.expect("spawn backend");
    let transport = HttpTransport::new(&base, CredentialContext::new()).expect("transport");

    let err = transport
        .execute(ApiRequest::get("/api/tasks/t404"))
        .await
        .expect_err("not found");
    assert!(err.is_not_found());
    assert_eq!(err.server_message(), Some("Task not found"));

    let err = transport
        .execute(ApiRequest::get("/broken"))
        .await
        .expect_err("bad gateway");
    let api = err.api().expect("api error");
    assert_eq!(api.status, 502);
    assert_eq!(api.code, ErrorCode::Internal);
}

#[tokio::test]
async fn empty_success_body_decodes_as_null() {
    let base = spawn_backend().await.expect("spawn backend");
    let transport = HttpTransport::new(&base, signed_in()).expect("transport");

    let value = transport
        .execute(ApiRequest::delete("/api/tasks/t1/comments/c1"))
        .await
        .expect("delete");
    assert_eq!(value, Value::Null);
}

#[tokio::test]
async fn upload_sends_multipart_file_and_fields() {
    let base = spawn_backend().await.expect("spawn backend");
    let transport = HttpTransport::new(&base, signed_in()).expect("transport");

    let response = transport
        .upload(
            "/api/students/upload",
            vec![("type".to_string(), "passport".to_string())],
            FileUpload {
                file_name: "passport.pdf".to_string(),
                mime_type: Some("application/pdf".to_string()),
                bytes: b"%PDF-1.7 passport".to_vec(),
            },
        )
        .await
        .expect("upload");

    assert_eq!(response["fileUrl"], "https://files.example/passport.pdf");
    assert_eq!(response["type"], "passport");
    assert_eq!(response["size"], 17);
}

#[tokio::test]
async fn download_reports_content_type() {
    let base = spawn_backend().await.expect("spawn backend");
    let transport = HttpTransport::new(&base, CredentialContext::new()).expect("transport");

    let file = transport
        .download(&format!("{base}/files/public.pdf"))
        .await
        .expect("download");
    assert_eq!(file.bytes, b"%PDF-1.7".to_vec());
    assert_eq!(file.content_type.as_deref(), Some("application/pdf"));
}

#[tokio::test]
async fn relative_download_is_authorized() {
    let base = spawn_backend().await.expect("spawn backend");

    let anonymous = HttpTransport::new(&base, CredentialContext::new()).expect("transport");
    let err = anonymous
        .download("/files/private")
        .await
        .expect_err("login required");
    assert_eq!(err.server_message(), Some("login required"));

    let transport = HttpTransport::new(&base, signed_in()).expect("transport");
    let file = transport.download("/files/private").await.expect("download");
    assert_eq!(file.content_type.as_deref(), Some("image/png"));
}

#[test]
fn rejects_unusable_base_urls() {
    for bad in ["", "not a url", "ftp://portal.example"] {
        let err = HttpTransport::new(bad, CredentialContext::new())
            .err()
            .expect("invalid url");
        assert!(matches!(err, TransportError::InvalidBaseUrl { .. }), "{bad}");
    }

    let transport =
        HttpTransport::new(" https://portal.example/// ", CredentialContext::new()).expect("valid");
    assert_eq!(transport.base_url(), "https://portal.example");
}
