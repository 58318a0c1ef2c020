mod common;

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use risk_predictor::config::Config;
use risk_predictor::http::{HttpState, router};
use risk_predictor::models::{
    ForestClassifier, ForestRegressor, LoadedModels, ModelPaths, ModelProvider,
};
use serde_json::{Value, json};
use tower::ServiceExt;

fn loaded_provider() -> Arc<ModelProvider> {
    let classifier: ForestClassifier =
        serde_json::from_value(common::classifier_artifact()).unwrap();
    let regressor: ForestRegressor = serde_json::from_value(common::regressor_artifact()).unwrap();
    Arc::new(ModelProvider::with_models(LoadedModels {
        classifier: Arc::new(classifier),
        regressor: Arc::new(regressor),
    }))
}

fn missing_provider() -> Arc<ModelProvider> {
    Arc::new(ModelProvider::new(ModelPaths {
        classifier: PathBuf::from("/nonexistent/classifier.json"),
        regressor: PathBuf::from("/nonexistent/regressor.json"),
    }))
}

fn app(models: Arc<ModelProvider>) -> axum::Router {
    router(HttpState {
        config: Arc::new(Config::default()),
        models,
    })
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_predict(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn post_json(body: Value) -> Request<Body> {
    post_predict(serde_json::to_vec(&body).unwrap())
}

#[tokio::test]
async fn health_reports_no_error_when_models_are_loaded() {
    let req = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app(loaded_provider()), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "model_load_error": null}));
}

#[tokio::test]
async fn health_reports_the_startup_load_error() {
    let provider = missing_provider();
    assert!(!provider.try_initial_load().await);

    let req = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app(provider), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let err = body["model_load_error"].as_str().unwrap();
    assert!(err.contains("/nonexistent/classifier.json"), "{}", err);
}

#[tokio::test]
async fn predict_without_models_is_a_server_error() {
    let (status, body) = send(
        app(missing_provider()),
        post_json(json!({"data": {"age": 30}})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Model load error: Failed loading classifier"), "{}", detail);
}

#[tokio::test]
async fn predict_attaches_input_ids_by_default() {
    let (status, body) = send(
        app(loaded_provider()),
        post_json(json!({"data": [
            {"id": 7, "age": 40, "haemoglobin": 12.5},
            {"external_id": "ext-9", "age": 22, "haemoglobin": 9.8}
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    assert_eq!(body["input_ids"], json!([7, "ext-9"]));
    assert_eq!(body["predictions"][0]["_input_id"], json!(7));
    assert_eq!(body["probabilities"][1]["_input_id"], json!("ext-9"));

    assert_eq!(body["predictions"][0]["flag_0"], json!(1));
    assert_eq!(body["predictions"][1]["flag_1"], json!(1));
    assert_eq!(body["risk"], json!([0.75, 0.25]));
    assert_eq!(
        body["columns"],
        json!({
            "flags": ["flag_0", "flag_1"],
            "probabilities": ["flag_0", "flag_1"]
        })
    );
}

#[tokio::test]
async fn include_id_false_leaves_records_untouched() {
    let (status, body) = send(
        app(loaded_provider()),
        post_json(json!({"data": {"id": 7, "age": 40}, "include_id": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("input_ids").is_none());
    assert!(body["predictions"][0].get("_input_id").is_none());
}

#[tokio::test]
async fn data_may_be_a_json_string() {
    let (status, body) = send(
        app(loaded_provider()),
        post_json(json!({"data": "[{\"age\": 50}]", "include_id": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["risk"], json!([0.75]));
    assert!(body.get("input_ids").is_none());
}

#[tokio::test]
async fn bad_records_are_client_errors() {
    let (status, body) = send(app(loaded_provider()), post_json(json!({"data": [1, 2]}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Prediction failed: Invalid input: record 0"), "{}", detail);

    let (status, body) = send(app(loaded_provider()), post_json(json!({"data": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().starts_with("Prediction failed:"));
}

#[tokio::test]
async fn malformed_bodies_are_rejected() {
    let (status, body) = send(app(loaded_provider()), post_predict("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().starts_with("Invalid request body"));

    let (status, _) = send(app(loaded_provider()), post_json(json!({"records": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cors_preflight_allows_configured_origins() {
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/predict")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();
    let resp = app(loaded_provider()).oneshot(req).await.unwrap();
    let headers = resp.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/predict")
        .header(header::ORIGIN, "http://evil.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let resp = app(loaded_provider()).oneshot(req).await.unwrap();
    assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}
