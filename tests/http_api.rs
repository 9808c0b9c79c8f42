//! End-to-end scenarios against the HTTP router, with the index built from
//! a temporary document directory.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use diagnosys::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    provider: Arc<MockProvider>,
    _dir: TempDir,
}

async fn setup(provider: MockProvider, mode: ResponseMode) -> anyhow::Result<TestApp> {
    let dir = tempfile::tempdir()?;
    let data = dir.path().join("md");
    std::fs::create_dir_all(&data)?;
    std::fs::write(
        data.join("letters.md"),
        "# Dimensional Standards for Letters\n\nLetters must be rectangular, at least 3-1/2 inches high and 5 inches long.",
    )?;
    std::fs::write(
        data.join("asthma.md"),
        "# Acute asthma\n\nGive salbutamol via spacer and oxygen to maintain saturations.",
    )?;

    let mut config = Config::default();
    config.storage.storage_dir = dir.path().join("storage");
    config.storage.data_dir = data;
    config.server.response_mode = mode;
    config.server.cors = false;

    let provider = Arc::new(provider);
    let server = Server::with_provider(config, provider.clone()).await?;

    Ok(TestApp {
        router: server.router(),
        provider,
        _dir: dir,
    })
}

fn post_chat(body: Value) -> Request<Body> {
    Request::post("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

async fn body_text(response: axum::response::Response) -> anyhow::Result<String> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn form_data() -> Value {
    json!({
        "introduction": "Amira Khan, 27F, nurse",
        "presentingComplaint": "Wheeze and breathlessness",
        "socrates": "Started this morning after a cold",
        "specificSystemsReview": "Productive cough",
        "generalSystemsReview": "No fever",
        "ice": "Concerned about missing work",
        "pastMedicalHistory": "Childhood asthma",
        "medicationHistory": "Salbutamol PRN",
        "socialHistory": "Lives with partner, never smoked",
        "familyHistory": "Brother with eczema"
    })
}

#[tokio::test]
async fn test_dimensional_standards_question_streams_answer() -> anyhow::Result<()> {
    let app = setup(
        MockProvider::new().with_reply("Letters must be rectangular and at least 5 inches long."),
        ResponseMode::Streaming,
    )
    .await?;

    let response = app
        .router
        .oneshot(post_chat(json!({
            "messages": [{"role": "user", "content": "What are Dimensional Standards for Letters?"}]
        })))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await?;
    assert!(!text.is_empty());
    assert_eq!(text, "Letters must be rectangular and at least 5 inches long.");

    // The question went out with the letters document as context.
    let requests = app.provider.requests();
    let prompt = &requests[0].messages.last().expect("prompt").content;
    assert!(prompt.contains("Dimensional Standards for Letters"));
    assert!(prompt.contains("Query: What are Dimensional Standards for Letters?"));
    Ok(())
}

#[tokio::test]
async fn test_empty_messages() -> anyhow::Result<()> {
    let app = setup(MockProvider::new(), ResponseMode::Streaming).await?;

    let response = app.router.oneshot(post_chat(json!({"messages": []}))).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body_text(response).await?)?;
    assert_eq!(body, json!({"detail": "No messages provided"}));
    Ok(())
}

#[tokio::test]
async fn test_assistant_last_turn() -> anyhow::Result<()> {
    let app = setup(MockProvider::new(), ResponseMode::Streaming).await?;

    let response = app
        .router
        .oneshot(post_chat(json!({
            "messages": [{"role": "assistant", "content": "hi"}]
        })))
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body_text(response).await?)?;
    assert_eq!(body, json!({"detail": "Last message must be from user"}));
    assert!(app.provider.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_form_turn_is_queried_as_rendered_history() -> anyhow::Result<()> {
    let app = setup(MockProvider::new(), ResponseMode::EvaluatedSync).await?;

    let response = app
        .router
        .oneshot(post_chat(json!({
            "messages": [{
                "role": "user",
                "content": "ignored",
                "data": {"form": true, "formData": form_data()}
            }]
        })))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await?;
    assert!(text.ends_with('\n'));

    let requests = app.provider.requests();
    let prompt = &requests[0].messages.last().expect("prompt").content;
    assert!(!prompt.contains("Query: ignored"));
    for value in form_data().as_object().expect("object").values() {
        assert!(prompt.contains(value.as_str().expect("string")));
    }
    assert!(prompt.contains("Provide a list of Management and Further treatment options for this patient."));
    Ok(())
}

#[tokio::test]
async fn test_index_is_reused_across_restarts() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let data = dir.path().join("md");
    std::fs::create_dir_all(&data)?;
    std::fs::write(data.join("letters.md"), "Dimensional Standards for Letters")?;

    let mut config = Config::default();
    config.storage.storage_dir = dir.path().join("storage");
    config.storage.data_dir = data.clone();

    let first = Arc::new(MockProvider::new());
    Server::with_provider(config.clone(), first.clone()).await?;
    assert!(first.embed_calls() > 0);

    std::fs::remove_dir_all(&data)?;
    let second = Arc::new(MockProvider::new());
    let server = Server::with_provider(config, second.clone()).await?;
    assert_eq!(second.embed_calls(), 0);

    let response = server
        .router()
        .oneshot(Request::get("/api/health").body(Body::empty())?)
        .await?;
    let body: Value = serde_json::from_str(&body_text(response).await?)?;
    assert_eq!(body, json!({"status": "ok", "passages": 1}));
    Ok(())
}
