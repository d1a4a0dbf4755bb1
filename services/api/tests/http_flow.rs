mod common;

use api_lib::web::build_router;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use common::{build_state, fast_settings, FakeChat, FakeParser, InMemoryDb};
use resume_review_core::domain::{DocumentStatus, ParseJobStatus};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "resume-review-test-boundary";

struct TestApp {
    router: Router,
    db: Arc<InMemoryDb>,
    parser: Arc<FakeParser>,
    chat: Arc<FakeChat>,
}

impl TestApp {
    fn new() -> Self {
        let db = InMemoryDb::new();
        let parser = FakeParser::new();
        let chat = FakeChat::replying("Your Rust experience stands out.");
        let state = build_state(db.clone(), parser.clone(), chat.clone(), fast_settings());
        Self {
            router: build_router(state),
            db,
            parser,
            chat,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        let request = Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn upload(&self, token: &str, filename: &str, contents: &[u8]) -> (StatusCode, Value) {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::post("/resume/upload")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Registers a user and returns a bearer token for them.
    async fn login(&self, email: &str) -> String {
        let credentials = json!({"email": email, "password": "correct horse"});
        let (status, _) = self.post_json("/auth/register", None, credentials.clone()).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self.post_json("/auth/token", None, credentials).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        body["access_token"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn upload_parse_and_chat_end_to_end() {
    let app = TestApp::new();
    let token = app.login("ada@example.com").await;

    let (status, body) = app.upload(&token, "resume.pdf", b"%PDF-1.4 resume").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processing");
    let resume_id = body["resume_id"].as_str().unwrap().to_string();

    let (status, body) = app.get(&format!("/resume/status/{resume_id}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processing");
    assert!(body.get("parsed_data").is_none());

    app.parser
        .finish(ParseJobStatus::Completed(json!({"summary": "x"})));

    let mut done = Value::Null;
    for _ in 0..300 {
        let (_, body) = app.get(&format!("/resume/status/{resume_id}"), &token).await;
        if body["status"] == "done" {
            done = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(done["parsed_data"], json!({"summary": "x"}));

    let (status, body) = app
        .post_json(
            "/chat/completions",
            Some(&token),
            json!({"resume_id": resume_id, "user_message": "What are my strengths?"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resume_id"], resume_id.as_str());
    assert_eq!(body["resume_name"], "resume.pdf");
    assert_eq!(
        body["messages"],
        json!([
            {"message_type": "user", "content": "What are my strengths?"},
            {"message_type": "assistant", "content": "Your Rust experience stands out."}
        ])
    );
    assert_eq!(app.db.chat_count(), 2);
    assert_eq!(app.chat.prompts().len(), 1);

    let (status, body) = app.get("/chat/resume-chats", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["resume_id"], resume_id.as_str());
    assert_eq!(body[0]["last_message"], "Your Rust experience stands out.");

    let (status, body) = app.get(&format!("/chat/history/{resume_id}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parsed_data"], json!({"summary": "x"}));
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = TestApp::new();

    let request = Request::get("/chat/resume-chats")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:3000"
    );

    let (status, body) = app.get("/chat/resume-chats", "not-a-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn credentials_are_checked() {
    let app = TestApp::new();
    app.login("ada@example.com").await;

    let (status, body) = app
        .post_json(
            "/auth/register",
            None,
            json!({"email": "ADA@example.com", "password": "another"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, _) = app
        .post_json(
            "/auth/token",
            None,
            json!({"email": "ada@example.com", "password": "wrong"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post_json(
            "/auth/token",
            None,
            json!({"email": "nobody@example.com", "password": "correct horse"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post_json(
            "/auth/register",
            None,
            json!({"email": "not-an-email", "password": "pw"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_on_unparsed_resume_is_rejected() {
    let app = TestApp::new();
    let token = app.login("ada@example.com").await;

    let (_, body) = app.upload(&token, "resume.pdf", b"%PDF").await;
    let resume_id = body["resume_id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post_json(
            "/chat/completions",
            Some(&token),
            json!({"resume_id": resume_id, "user_message": "Hi"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "RESUME_NOT_READY");

    let (status, _) = app
        .post_json(
            "/chat/completions",
            Some(&token),
            json!({"resume_id": resume_id, "user_message": "   "}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.db.chat_count(), 0);
}

#[tokio::test]
async fn resumes_are_private_to_their_owner() {
    let app = TestApp::new();
    let owner = app.login("ada@example.com").await;
    let stranger = app.login("bob@example.com").await;

    let (_, body) = app.upload(&owner, "resume.pdf", b"%PDF").await;
    let resume_id = body["resume_id"].as_str().unwrap().to_string();

    let (status, body) = app.get(&format!("/resume/status/{resume_id}"), &stranger).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = app.get(&format!("/chat/history/{resume_id}"), &stranger).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get(&format!("/resume/status/{}", Uuid::new_v4()), &owner).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_without_a_file_part_is_rejected() {
    let app = TestApp::new();
    let token = app.login("ada@example.com").await;

    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
    );
    let request = Request::post("/resume/upload")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, _) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.db.document_count(), 0);
}

#[tokio::test]
async fn status_stream_uses_the_query_token() {
    let app = TestApp::new();
    let token = app.login("ada@example.com").await;

    let (_, body) = app.upload(&token, "resume.pdf", b"%PDF").await;
    let resume_id = body["resume_id"].as_str().unwrap().to_string();

    let request = Request::get(format!("/resume/stream/{resume_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::get(format!("/resume/stream/{resume_id}?token=garbage"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.parser.finish(ParseJobStatus::Failed("unreadable".to_string()));

    let request = Request::get(format!("/resume/stream/{resume_id}?token={token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");
    assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache");

    // The stream ends after the terminal event, so the whole body can be read.
    let bytes = tokio::time::timeout(
        Duration::from_secs(5),
        to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("stream should end after the error event")
    .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let events: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:").map(str::trim_start))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    let last = events.last().unwrap();
    assert_eq!(last["status"], "error");
    assert!(last["error"].as_str().unwrap().contains("unreadable"));
    assert!(events
        .iter()
        .all(|e| e["status"] == "processing" || e == last));

    assert_eq!(
        app.db.document(resume_id.parse().unwrap()).unwrap().status,
        DocumentStatus::Error
    );
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new();
    let request = Request::get("/openapi.json").body(Body::empty()).unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].get("/chat/completions").is_some());
}
