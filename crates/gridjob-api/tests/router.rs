//! Route-level tests through the full router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use gridjob_api::build_router;
use gridjob_cluster::{LocalCluster, NoopExecutor};
use gridjob_core::{DeploymentResource, ResourceType};

fn test_router() -> axum::Router {
    let cluster = LocalCluster::in_memory(Arc::new(NoopExecutor)).unwrap();
    build_router(Arc::new(cluster))
}

fn json_request(method: &str, uri: &str, body: &impl serde::Serialize) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_is_ok() {
    let resp = test_router()
        .oneshot(empty_request("GET", "/healthz"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn full_job_lifecycle_over_routes() {
    let router = test_router();

    let resp = router
        .clone()
        .oneshot(json_request("POST", "/api/v1/jobs/wc", &json!({ "parallelism": 2 })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let input = DeploymentResource::inline("input", ResourceType::Data, b"a b c".to_vec()).unwrap();
    let resp = router
        .clone()
        .oneshot(json_request("PUT", "/api/v1/jobs/wc/resources", &vec![input]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let graph = json!({ "body": { "vertices": ["read", "count"] }, "references": ["input"] });
    let resp = router
        .clone()
        .oneshot(json_request("PUT", "/api/v1/jobs/wc/graph", &graph))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router
        .clone()
        .oneshot(empty_request("POST", "/api/v1/jobs/wc/execution"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = router
        .clone()
        .oneshot(empty_request("GET", "/api/v1/jobs/wc/execution"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["outcome"], "completed");

    let resp = router
        .clone()
        .oneshot(empty_request("GET", "/api/v1/jobs/wc/accumulators"))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["data"]["resources.deployed"]["value"], 1);

    let resp = router
        .clone()
        .oneshot(empty_request("GET", "/api/v1/jobs"))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["data"][0]["status"], "completed");

    let resp = router
        .clone()
        .oneshot(empty_request("DELETE", "/api/v1/jobs/wc"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router
        .oneshot(empty_request("GET", "/api/v1/jobs/wc/accumulators"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let resp = test_router()
        .oneshot(json_request("PUT", "/api/v1/jobs/wc/resources", &json!({ "nope": 1 })))
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn job_name_with_separator_is_a_bad_request() {
    let resp = test_router()
        .oneshot(json_request("POST", "/api/v1/jobs/a:b", &json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("invalid job name"));
}
