use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value as Json};
use tower::util::ServiceExt;

use palisade_binding::StaticKeyFetcher;
use palisade_guard::StaticDirectory;
use palisade_protocol::{
    router, AppState, MemoryConnector, MetaEnvelopeInput, VaultConfig, VaultService,
};
use palisade_store::{EnvelopeStore, MemoryStore};

const TENANT: &str = "@alice";

fn app_state() -> (AppState, Arc<MemoryConnector>) {
    let service = Arc::new(VaultService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(StaticDirectory::default()),
        Arc::new(StaticKeyFetcher::default()),
        VaultConfig::default(),
    ));
    let connector = Arc::new(MemoryConnector::new());
    (
        AppState { service, connector: Some(connector.clone()) },
        connector,
    )
}

async fn body_json(response: axum::response::Response) -> Json {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_logs_requires_tenant_header() {
    let (state, _) = app_state();
    let response = router(state)
        .oneshot(Request::builder().uri("/logs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "X-ENAME header is required");
}

#[tokio::test]
async fn test_logs_returns_entries_for_the_tenant() {
    let (state, _) = app_state();
    let ctx = palisade_guard::CallContext::anonymous(TENANT);
    state
        .service
        .create_meta_envelope(
            MetaEnvelopeInput {
                ontology: "o1".into(),
                payload: json!({ "k": "v" }),
                acl: vec!["*".into()],
            },
            &ctx,
        )
        .await;

    let response = router(state)
        .oneshot(
            Request::builder()
                .uri("/logs?limit=10")
                .header("x-ename", TENANT)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["logs"].as_array().unwrap().len(), 1);
    assert_eq!(body["logs"][0]["operation"], "create");
    assert_eq!(body["hasMore"], false);
}

#[tokio::test]
async fn test_public_keys_round_trip() {
    let (state, _) = app_state();
    state.service.store().add_public_key(TENANT, "pk1").await.unwrap();

    let response = router(state)
        .oneshot(
            Request::builder()
                .uri("/public-keys")
                .header("x-ename", TENANT)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["publicKeys"], json!(["pk1"]));
}

#[tokio::test]
async fn test_patch_public_key_requires_a_platform_credential() {
    let (state, _) = app_state();
    let response = router(state)
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/public-key")
                .header("x-ename", TENANT)
                .header("content-type", "application/json")
                .body(Body::from(r#"{"publicKey":"pk1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_copy_migrates_and_verifies_a_tenant() {
    let (state, connector) = app_state();
    let ctx = palisade_guard::CallContext::anonymous(TENANT);
    for i in 0..3 {
        state
            .service
            .create_meta_envelope(
                MetaEnvelopeInput {
                    ontology: "o1".into(),
                    payload: json!({ "index": i }),
                    acl: vec!["*".into()],
                },
                &ctx,
            )
            .await;
    }

    let response = router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/copy")
                .header("x-ename", TENANT)
                .header("content-type", "application/json")
                .body(Body::from(r#"{"targetUri":"memory://replica"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["copied"], 3);

    let replica = connector.instance("memory://replica");
    assert_eq!(replica.all_for_tenant(TENANT).await.unwrap().len(), 3);
}
