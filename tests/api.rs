mod common;

use std::sync::{atomic::Ordering, Arc};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use common::{model_settings, FakeLoader, FakeQa};
use nlp_service::{
    api::{router, AppState},
    config::Settings,
    nlp::{models::QaInput, registry::ModelRegistry},
};
use serde_json::{json, Value};
use tower::ServiceExt;

struct Harness {
    router: Router,
    qa: Arc<FakeQa>,
    _root: tempfile::TempDir,
}

fn harness(load: bool) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let mut settings = Settings::from_lookup(|_| None).unwrap();
    settings.nlp_root = root.path().to_path_buf();
    settings.models = model_settings(root.path(), load);
    let loader = FakeLoader::default();
    let qa = loader.qa.clone();
    let registry = ModelRegistry::build(&settings.models, &loader).unwrap();
    Harness {
        router: router(AppState::new(settings, registry)),
        qa,
        _root: root,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn ping_pongs() {
    let h = harness(false);
    let (status, body) = send(&h.router, "GET", "/ping", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Pong!"}));
}

#[tokio::test]
async fn disabled_ner_reports_not_loaded() {
    let h = harness(false);
    let (status, body) = send(
        &h.router,
        "POST",
        "/nlp/entity-recognition",
        Some(json!(["Alice went home."])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Model not loaded."}));
}

#[tokio::test]
async fn every_task_route_reports_not_loaded() {
    let h = harness(false);
    let cases = [
        ("/nlp/translate/standard", json!({"text": "hi"})),
        ("/nlp/question-answering", json!({"question": "Who?", "context": "Alice."})),
        ("/nlp/zero-shot", json!({"documents": "doc", "topics": ["a", "b"]})),
        ("/nlp/binary-zero-shot", json!({"documents": ["doc"], "topic": "a"})),
    ];
    for (uri, payload) in cases {
        let (status, body) = send(&h.router, "POST", uri, Some(payload)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body, json!({"message": "Model not loaded."}), "{uri}");
    }
}

#[tokio::test]
async fn question_answering_returns_raw_answer() {
    let h = harness(true);
    let input = QaInput {
        question: "Who?".into(),
        context: "Alice went home.".into(),
    };
    let (status, body) = send(
        &h.router,
        "POST",
        "/nlp/question-answering",
        Some(json!({"question": "Who?", "context": "Alice went home."})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::to_value(FakeQa::answer_for(&input)).unwrap());
    assert_eq!(h.qa.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn entity_recognition_merges_spans() {
    let h = harness(true);
    let (_, body) = send(
        &h.router,
        "POST",
        "/nlp/entity-recognition",
        Some(json!(["Alice went home."])),
    )
    .await;
    assert_eq!(
        body,
        json!([[
            {"entity_group": "PER", "word": "Alice", "start": 0, "end": 5, "score": 0.9},
            {"entity_group": "LOC", "word": "home", "start": 11, "end": 15, "score": 0.7},
        ]])
    );
}

#[tokio::test]
async fn zero_shot_formats_unless_declined() {
    let h = harness(true);
    let payload = json!({"documents": "doc", "topics": ["a", "b"]});
    let (_, body) = send(&h.router, "POST", "/nlp/zero-shot", Some(payload.clone())).await;
    assert_eq!(body, json!([{"a": 0.7, "b": 0.3}]));

    let (_, body) = send(
        &h.router,
        "POST",
        "/nlp/zero-shot?format_results=false",
        Some(payload),
    )
    .await;
    assert_eq!(
        body,
        json!([{"sequence": "doc", "labels": ["a", "b"], "scores": [0.7, 0.3]}])
    );
}

#[tokio::test]
async fn binary_zero_shot_thresholds() {
    let h = harness(true);
    let payload = json!({"documents": ["one", "two"], "topic": "a"});
    let (_, body) = send(&h.router, "POST", "/nlp/binary-zero-shot", Some(payload.clone())).await;
    assert_eq!(body, json!([true, true]));

    let (_, body) = send(
        &h.router,
        "POST",
        "/nlp/binary-zero-shot?threshold=0.6",
        Some(payload.clone()),
    )
    .await;
    assert_eq!(body, json!([false, false]));

    let (_, body) = send(
        &h.router,
        "POST",
        "/nlp/binary-zero-shot?raw_scores=true",
        Some(payload),
    )
    .await;
    assert_eq!(body, json!([0.6, 0.6]));
}

#[tokio::test]
async fn translation_joins_lines() {
    let h = harness(true);
    let (_, body) = send(
        &h.router,
        "POST",
        "/nlp/translate/standard?num_beams=2",
        Some(json!({"text": "one\n\n  two 😀\nthree"})),
    )
    .await;
    assert_eq!(body, json!("ONE\n\nTWO\n\nTHREE"));

    let (_, body) = send(
        &h.router,
        "POST",
        "/nlp/translate/ensemble",
        Some(json!({"text": "ab\ncd"})),
    )
    .await;
    assert_eq!(body, json!("ba\n\ndc"));
}

#[tokio::test]
async fn oversized_beam_width_is_rejected() {
    let h = harness(true);
    let request = Request::builder()
        .method("POST")
        .uri("/nlp/translate/standard?num_beams=18446744073709551615")
        .header("content-type", "application/json")
        .body(Body::from(json!({"text": "hi"}).to_string()))
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &h.router,
        "POST",
        "/nlp/translate/standard?num_beams=256",
        Some(json!({"text": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("HI"));
}

#[tokio::test]
async fn lists_model_directories() {
    let h = harness(false);
    let (_, body) = send(&h.router, "GET", "/nlp/models", None).await;
    assert_eq!(
        body,
        json!(["ensemble", "ner", "question-answering", "standard", "zero-shot"])
    );
}
