use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::{
    test_support::ScriptedTransport,
    transport::{ApiTransport, Method},
    CredentialContext,
};

fn portal(transport: &Arc<ScriptedTransport>) -> PortalClient {
    let transport: Arc<dyn ApiTransport> = transport.clone();
    PortalClient::with_transport(transport, CredentialContext::new())
}

fn form() -> ProfileForm {
    ProfileForm {
        name: "Ada Lovelace".to_string(),
        contact_numbers: vec!["+8801700000000".to_string()],
        account_number: "0042".to_string(),
        confirm_account_number: "0042".to_string(),
        university_name: "TU Munich".to_string(),
        ..ProfileForm::default()
    }
}

fn document(kind: DocumentKind, file_name: &str) -> DocumentUpload {
    DocumentUpload {
        kind,
        file: FileUpload {
            file_name: file_name.to_string(),
            mime_type: Some("application/pdf".to_string()),
            bytes: b"%PDF".to_vec(),
        },
    }
}

#[tokio::test]
async fn fetch_profile_unwraps_student() {
    let transport = ScriptedTransport::new();
    transport.push_ok(json!({ "student": { "_id": "s1", "givenName": "Ada", "surname": "Lovelace" } }));
    let profile = portal(&transport).fetch_profile().await.expect("profile");
    assert_eq!(profile.full_name(), "Ada Lovelace");

    transport.push_ok(json!({ "student": null }));
    let err = portal(&transport).fetch_profile().await.expect_err("missing");
    assert!(matches!(err, PortalError::NotFound("profile")));
}

#[tokio::test]
async fn mismatched_account_numbers_stop_before_any_upload() {
    let transport = ScriptedTransport::new();
    let mut form = form();
    form.confirm_account_number = "0043".to_string();

    let err = portal(&transport)
        .update_profile(&form, vec![document(DocumentKind::Passport, "p.pdf")])
        .await
        .expect_err("mismatch");

    assert_eq!(err.to_string(), "Account numbers do not match");
    assert!(transport.uploads().is_empty());
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn uploads_each_document_then_saves_merged_payload() {
    let transport = ScriptedTransport::new();
    let uploads = vec![
        document(DocumentKind::Passport, "passport.pdf"),
        document(DocumentKind::OfferLetter, "offer-a.pdf"),
        document(DocumentKind::OfferLetter, "offer-b.pdf"),
        document(DocumentKind::Nid, "nid.pdf"),
    ];

    let uploaded = portal(&transport)
        .update_profile(&form(), uploads)
        .await
        .expect("update");

    assert_eq!(uploaded.len(), 4);
    let sent = transport.uploads();
    let types: Vec<_> = sent.iter().map(|(_, fields, _)| fields[0].1.as_str()).collect();
    assert_eq!(types, vec!["passport", "offerLetters", "offerLetters", "nid"]);
    assert!(sent.iter().all(|(path, _, _)| path == "/api/students/upload"));

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, Method::Put);
    assert_eq!(calls[0].path, "/api/students/update-profile");
    let body = calls[0].body.clone().expect("body");
    assert_eq!(body["passport"], "https://files.example/1");
    assert_eq!(
        body["offerLetters"],
        json!(["https://files.example/2", "https://files.example/3"])
    );
    assert_eq!(body["nid"], "https://files.example/4");
    assert_eq!(body["accountNumber"], "0042");
    assert_eq!(body["universityName"], "TU Munich");
    assert!(body.get("confirmAccountNumber").is_none());
}

#[tokio::test]
async fn duplicate_single_document_is_rejected() {
    let transport = ScriptedTransport::new();
    let err = portal(&transport)
        .update_profile(
            &form(),
            vec![
                document(DocumentKind::Passport, "a.pdf"),
                document(DocumentKind::Passport, "b.pdf"),
            ],
        )
        .await
        .expect_err("duplicate");
    assert!(matches!(err, PortalError::Validation(_)));
    assert!(transport.uploads().is_empty());
}

#[tokio::test]
async fn download_names_file_after_content_type() {
    let transport = ScriptedTransport::new();
    transport.push_download(b"\xff\xd8", Some("image/jpeg"));
    let file = portal(&transport)
        .download_document("https://files.example/abc", "passport_photo")
        .await
        .expect("download");
    assert_eq!(file.file_name, "passport_photo.jpg");
    assert_eq!(file.bytes, b"\xff\xd8".to_vec());
}

#[test]
fn download_name_resolution() {
    assert_eq!(
        resolve_download_name("passport.pdf", "https://x/y.png", Some("image/png")),
        "passport.pdf"
    );
    assert_eq!(
        resolve_download_name("bill_1", "https://x/y", Some("image/webp")),
        "bill_1.webp"
    );
    assert_eq!(
        resolve_download_name("nid", "https://x/scan.tiff?sig=abc", Some("image/tiff")),
        "nid.tiff"
    );
    assert_eq!(
        resolve_download_name("nid", "https://x/scan", None),
        "nid"
    );
    assert_eq!(
        resolve_download_name("offer", "https://x/y", Some("application/pdf; charset=binary")),
        "offer.pdf"
    );
}

#[tokio::test]
async fn read_upload_guesses_mime_from_extension() {
    let dir = std::env::temp_dir().join(format!("portal_upload_{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.expect("dir");
    let path = dir.join("photo.JPEG");
    tokio::fs::write(&path, b"jpeg-bytes").await.expect("write");

    let upload = read_upload(&path).await.expect("read");
    assert_eq!(upload.file_name, "photo.JPEG");
    assert_eq!(upload.mime_type.as_deref(), Some("image/jpeg"));
    assert_eq!(upload.bytes, b"jpeg-bytes".to_vec());

    assert!(read_upload(&dir.join("missing.pdf")).await.is_err());
    tokio::fs::remove_dir_all(&dir).await.expect("cleanup");
}
