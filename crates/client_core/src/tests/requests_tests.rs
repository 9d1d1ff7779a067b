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

fn ticket(id: &str, comments: serde_json::Value) -> serde_json::Value {
    json!({
        "_id": id,
        "title": "Visa letter",
        "description": "Need a bank solvency letter",
        "status": "open",
        "comments": comments
    })
}

#[tokio::test]
async fn lists_my_tickets() {
    let transport = ScriptedTransport::new();
    transport.push_ok(json!([ticket("r1", json!([])), ticket("r2", json!(null))]));

    let requests = portal(&transport).my_requests().await.expect("list");
    assert_eq!(requests.len(), 2);
    assert!(requests[1].comments.is_empty());
    assert_eq!(transport.calls()[0].path, "/api/requests/my");
}

#[tokio::test]
async fn raising_a_ticket_refetches_the_list() {
    let transport = ScriptedTransport::new();
    transport.push_ok(json!({ "_id": "r3" }));
    transport.push_ok(json!([ticket("r3", json!([]))]));

    let requests = portal(&transport)
        .raise_request(" Visa letter ", "Need a bank solvency letter")
        .await
        .expect("raise");
    assert_eq!(requests.len(), 1);

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].method, Method::Post);
    assert_eq!(calls[0].path, "/api/requests");
    assert_eq!(
        calls[0].body,
        Some(json!({ "title": "Visa letter", "description": "Need a bank solvency letter" }))
    );
    assert_eq!(calls[1].path, "/api/requests/my");
}

#[tokio::test]
async fn ticket_needs_title_and_description() {
    let transport = ScriptedTransport::new();
    let err = portal(&transport)
        .raise_request("Visa letter", "  ")
        .await
        .expect_err("missing description");
    assert!(matches!(err, PortalError::Validation(_)));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn comments_skip_blank_drafts_and_replace_list() {
    let transport = ScriptedTransport::new();
    let portal = portal(&transport);
    let id = RequestId::new("r1");

    let mut draft = "   ".to_string();
    assert!(portal
        .comment_on_request(&id, &mut draft)
        .await
        .expect("skip")
        .is_none());
    assert!(transport.calls().is_empty());

    transport.push_ok(json!({ "ok": true }));
    transport.push_ok(json!([ticket("r1", json!([{ "user": { "givenName": "Ada" }, "text": "any update?" }]))]));
    let mut draft = "any update?".to_string();
    let refreshed = portal
        .comment_on_request(&id, &mut draft)
        .await
        .expect("comment")
        .expect("applied");

    assert!(draft.is_empty());
    assert_eq!(refreshed[0].comments[0].text, "any update?");
    let calls = transport.calls();
    assert_eq!(calls[0].path, "/api/requests/r1/comment");
    assert_eq!(calls[0].body, Some(json!({ "text": "any update?" })));
}

#[tokio::test]
async fn failed_comment_keeps_draft() {
    let transport = ScriptedTransport::new();
    transport.push_status(500, "boom");
    let mut draft = "hello".to_string();
    let err = portal(&transport)
        .comment_on_request(&RequestId::new("r1"), &mut draft)
        .await
        .expect_err("fails");
    assert!(matches!(err, PortalError::Transport(_)));
    assert_eq!(draft, "hello");
}
