//! End-to-end tests of the HTTP surface over the in-memory database, the real
//! PDF renderer and scripted inference upstreams.

use api_lib::{
    adapters::{FsReportStore, InMemoryDb, PdfReportRenderer, ReportAssets},
    config::Config,
    web::{
        self,
        auth::TokenKeys,
        message_task::{UNEXPECTED_REPLY, UNREACHABLE_REPLY},
        rest::{NO_TRANSCRIPTION, TRANSCRIPTION_FAILED},
        AppState, ChatLocks,
    },
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use mindspark_core::{
    domain::{ModelTier, Treatment},
    ports::{ClinicalAnalysisService, InterviewService, SpeechToTextService, UpstreamError, UpstreamResult},
};
use serde_json::{json, Value};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;
use tower::ServiceExt;

//=========================================================================================
// Scripted upstreams
//=========================================================================================

struct ScriptedInterview {
    reply: UpstreamResult<String>,
    delay: Duration,
    seen: Mutex<Vec<(ModelTier, Vec<String>)>>,
}

#[async_trait]
impl InterviewService for ScriptedInterview {
    async fn next_question(&self, tier: ModelTier, history: &[String]) -> UpstreamResult<String> {
        self.seen.lock().unwrap().push((tier, history.to_vec()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone()
    }
}

struct ScriptedAnalysis {
    disorders: UpstreamResult<Vec<String>>,
    treatments: UpstreamResult<Vec<Treatment>>,
    summary: UpstreamResult<String>,
    treated: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl ClinicalAnalysisService for ScriptedAnalysis {
    async fn detect_disorders(&self, _tier: ModelTier, _history: &[String]) -> UpstreamResult<Vec<String>> {
        self.disorders.clone()
    }

    async fn recommend_treatments(
        &self,
        _tier: ModelTier,
        disorders: &[String],
    ) -> UpstreamResult<Vec<Treatment>> {
        self.treated.lock().unwrap().push(disorders.to_vec());
        self.treatments.clone()
    }

    async fn summarize(&self, _tier: ModelTier, _history: &[String]) -> UpstreamResult<String> {
        self.summary.clone()
    }
}

struct ScriptedSst {
    result: UpstreamResult<String>,
}

#[async_trait]
impl SpeechToTextService for ScriptedSst {
    async fn transcribe_audio(&self, _audio_data: &[u8]) -> UpstreamResult<String> {
        self.result.clone()
    }
}

fn healthy_interview() -> ScriptedInterview {
    ScriptedInterview {
        reply: Ok("How long have you felt this way?".to_string()),
        delay: Duration::ZERO,
        seen: Mutex::new(Vec::new()),
    }
}

fn healthy_analysis() -> ScriptedAnalysis {
    ScriptedAnalysis {
        disorders: Ok(vec!["Generalized Anxiety Disorder".to_string()]),
        treatments: Ok(vec![Treatment {
            disorder: "Generalized Anxiety Disorder".to_string(),
            recommendation: Some("Cognitive behavioural therapy".to_string()),
        }]),
        summary: Ok("Patient reports persistent worry.".to_string()),
        treated: Mutex::new(Vec::new()),
    }
}

//=========================================================================================
// Harness
//=========================================================================================

struct TestApp {
    router: Router,
    interview: Arc<ScriptedInterview>,
    analysis: Arc<ScriptedAnalysis>,
    locks: ChatLocks,
    reports: TempDir,
}

struct Upstreams {
    interview: ScriptedInterview,
    analysis: ScriptedAnalysis,
    sst: ScriptedSst,
    policy: &'static str,
}

impl Default for Upstreams {
    fn default() -> Self {
        Self {
            interview: healthy_interview(),
            analysis: healthy_analysis(),
            sst: ScriptedSst {
                result: Ok("I have trouble sleeping".to_string()),
            },
            policy: "fallback",
        }
    }
}

fn test_app(upstreams: Upstreams) -> TestApp {
    let reports = tempfile::tempdir().unwrap();
    let reports_dir = reports.path().to_string_lossy().into_owned();
    let config = Config::from_lookup(|key| match key {
        "JWT_SECRET" => Some("integration-secret".to_string()),
        "UPSTREAM_FAILURE_POLICY" => Some(upstreams.policy.to_string()),
        "REPORTS_DIR" => Some(reports_dir.clone()),
        "ASSETS_DIR" => Some(reports_dir.clone()),
        _ => None,
    })
    .unwrap();

    let interview = Arc::new(upstreams.interview);
    let analysis = Arc::new(upstreams.analysis);
    let locks = ChatLocks::new();
    let state = Arc::new(AppState {
        db: Arc::new(InMemoryDb::new()),
        tokens: TokenKeys::from_secret(config.jwt_secret.as_bytes()),
        sst_adapter: Arc::new(upstreams.sst),
        interview_adapter: interview.clone(),
        analysis_adapter: analysis.clone(),
        report_renderer: Arc::new(PdfReportRenderer::new(ReportAssets::under(&config.assets_dir))),
        report_store: Arc::new(FsReportStore::new(config.reports_dir.clone())),
        config: Arc::new(config),
        chat_locks: locks.clone(),
    });

    TestApp {
        router: web::router(state),
        interview,
        analysis,
        locks,
        reports,
    }
}

impl TestApp {
    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.expect("router call");
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn json(&self, method: &str, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.call(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.call(builder.body(Body::empty()).unwrap()).await
    }

    /// Registers a fresh clinician and returns the bearer token.
    async fn register(&self, email: &str) -> String {
        let (status, body) = self
            .json(
                "POST",
                "/api/auth/register",
                None,
                json!({ "fullName": "Dr. Grey", "email": email, "password": "s3cret!", "age": 41 }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().unwrap().to_string()
    }

    async fn create_chat(&self, token: &str, name: &str) -> String {
        let (status, body) = self
            .json("POST", "/api/chat", Some(token), json!({ "patientName": name, "patientAge": 34 }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["_id"].as_str().unwrap().to_string()
    }

    async fn post_message(&self, token: &str, chat_id: &str, text: &str) -> (StatusCode, Value) {
        self.json(
            "POST",
            "/api/chat/message",
            Some(token),
            json!({ "chatId": chat_id, "text": text, "sender": "user" }),
        )
        .await
    }
}

fn multipart(field: &str, payload: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--XBOUNDARY\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"clip.webm\"\r\nContent-Type: audio/webm\r\n\r\n",
        field
    )
    .into_bytes();
    body.extend_from_slice(payload);
    body.extend_from_slice(b"\r\n--XBOUNDARY--\r\n");
    Request::builder()
        .method("POST")
        .uri("/api/chat/speech-to-text")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
        .body(Body::from(body))
        .unwrap()
}

//=========================================================================================
// Accounts
//=========================================================================================

#[tokio::test]
async fn root_reports_liveness() {
    let app = test_app(Upstreams::default());
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"API is running...");
}

#[tokio::test]
async fn openapi_document_lists_the_routes() {
    let app = test_app(Upstreams::default());
    let (status, doc) = app.get("/api-docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    for path in [
        "/api/auth/register",
        "/api/chat",
        "/api/chat/message",
        "/api/chat/download-pdf/{chatId}",
        "/api/chat/share/{chatId}",
    ] {
        assert!(doc["paths"].get(path).is_some(), "missing {}", path);
    }
    assert_eq!(doc["components"]["securitySchemes"]["bearer"]["scheme"], "bearer");
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let app = test_app(Upstreams::default());
    app.register("grey@example.com").await;

    let (status, body) = app
        .json(
            "POST",
            "/api/auth/register",
            None,
            json!({ "fullName": "Someone Else", "email": "grey@example.com", "password": "x", "age": 30 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User already exists");
}

#[tokio::test]
async fn login_returns_chats_oldest_first() {
    let app = test_app(Upstreams::default());
    let token = app.register("grey@example.com").await;
    let first = app.create_chat(&token, "Jane").await;
    let second = app.create_chat(&token, "John").await;

    let (status, body) = app
        .json(
            "POST",
            "/api/auth/login",
            None,
            json!({ "email": "grey@example.com", "password": "s3cret!" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fullName"], "Dr. Grey");
    let chats = body["chats"].as_array().unwrap();
    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0]["_id"], first.as_str());
    assert_eq!(chats[1]["_id"], second.as_str());

    let fresh = body["token"].as_str().unwrap();
    let (status, _) = app.get("/api/chat", Some(fresh)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let app = test_app(Upstreams::default());
    app.register("grey@example.com").await;

    let (status, body) = app
        .json("POST", "/api/auth/login", None, json!({ "email": "grey@example.com", "password": "nope" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid email or password");

    let (status, body) = app
        .json("POST", "/api/auth/login", None, json!({ "email": "nobody@example.com", "password": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User not found");
}

#[tokio::test]
async fn malformed_bodies_get_json_errors() {
    let app = test_app(Upstreams::default());

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "fullName": "A", "email": "a@x.com", "password": "p" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["message"].as_str().unwrap().contains("age"));

    let token = app.register("grey@example.com").await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = app.call(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn message_without_chat_id_is_not_found() {
    let app = test_app(Upstreams::default());
    let token = app.register("grey@example.com").await;

    let (status, body) = app
        .json("POST", "/api/chat/message", Some(&token), json!({ "text": "hi" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "message": "Chat not found" }));
}

#[tokio::test]
async fn chat_routes_require_a_valid_token() {
    let app = test_app(Upstreams::default());

    let (status, body) = app.get("/api/chat", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Not authorized, no token");

    let (status, body) = app.get("/api/chat", Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Not authorized, token failed");
}

//=========================================================================================
// Chats
//=========================================================================================

#[tokio::test]
async fn created_chat_shows_up_in_the_list() {
    let app = test_app(Upstreams::default());
    let token = app.register("grey@example.com").await;

    let (status, created) = app
        .json("POST", "/api/chat", Some(&token), json!({ "patientName": "Jane", "patientAge": "34" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["patientName"], "Jane");
    assert_eq!(created["patientAge"], "34");
    assert_eq!(created["messages"], json!([]));

    let (status, listed) = app.get("/api/chat", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["_id"], created["_id"]);
    assert_eq!(listed[0]["patientName"], "Jane");

    let other = app.register("other@example.com").await;
    let (_, theirs) = app.get("/api/chat", Some(&other)).await;
    assert_eq!(theirs, json!([]));
}

#[tokio::test]
async fn chat_creation_needs_name_and_age() {
    let app = test_app(Upstreams::default());
    let token = app.register("grey@example.com").await;

    let (status, body) = app
        .json("POST", "/api/chat", Some(&token), json!({ "patientName": "Jane" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Patient name and age are required.");
}

#[tokio::test]
async fn unknown_or_malformed_chat_ids_are_not_found() {
    let app = test_app(Upstreams::default());
    let token = app.register("grey@example.com").await;

    let (status, body) = app.get(&format!("/api/chat/{}", uuid::Uuid::new_v4()), Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Chat not found");

    let (status, _) = app.get("/api/chat/not-a-uuid", Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.post_message(&token, &uuid::Uuid::new_v4().to_string(), "hello").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Chat not found");
}

//=========================================================================================
// Messages
//=========================================================================================

#[tokio::test]
async fn message_gets_exactly_one_ai_reply() {
    let app = test_app(Upstreams::default());
    let token = app.register("grey@example.com").await;
    let chat_id = app.create_chat(&token, "Jane").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/chat/message")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header("selected-model", "premium")
        .body(Body::from(json!({ "chatId": chat_id, "text": "I feel anxious" }).to_string()))
        .unwrap();
    let (status, chat) = app.call(request).await;
    assert_eq!(status, StatusCode::OK);

    let messages = chat["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["sender"], "user");
    assert_eq!(messages[0]["text"], "I feel anxious");
    assert_eq!(messages[1]["sender"], "ai");
    assert_eq!(messages[1]["text"], "How long have you felt this way?");

    let seen = app.interview.seen.lock().unwrap().clone();
    assert_eq!(seen, vec![(ModelTier::Premium, vec!["I feel anxious".to_string()])]);

    let (_, stored) = app.get(&format!("/api/chat/{}", chat_id), Some(&token)).await;
    assert_eq!(stored.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn message_validation() {
    let app = test_app(Upstreams::default());
    let token = app.register("grey@example.com").await;
    let chat_id = app.create_chat(&token, "Jane").await;

    let (status, body) = app.post_message(&token, &chat_id, "   ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Message text is required.");

    let (status, _) = app
        .json(
            "POST",
            "/api/chat/message",
            Some(&token),
            json!({ "chatId": chat_id, "text": "hi", "sender": "robot" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.interview.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_interview_falls_back() {
    let app = test_app(Upstreams {
        interview: ScriptedInterview {
            reply: Err(UpstreamError::Transport("connection refused".into())),
            ..healthy_interview()
        },
        ..Upstreams::default()
    });
    let token = app.register("grey@example.com").await;
    let chat_id = app.create_chat(&token, "Jane").await;

    let (status, chat) = app.post_message(&token, &chat_id, "hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat["messages"][1]["text"], UNREACHABLE_REPLY);
}

#[tokio::test]
async fn odd_interview_reply_falls_back() {
    let app = test_app(Upstreams {
        interview: ScriptedInterview {
            reply: Err(UpstreamError::UnexpectedShape("{}".into())),
            ..healthy_interview()
        },
        ..Upstreams::default()
    });
    let token = app.register("grey@example.com").await;
    let chat_id = app.create_chat(&token, "Jane").await;

    let (_, chat) = app.post_message(&token, &chat_id, "hello").await;
    assert_eq!(chat["messages"][1]["text"], UNEXPECTED_REPLY);
}

#[tokio::test]
async fn blank_question_is_never_stored() {
    let app = test_app(Upstreams {
        interview: ScriptedInterview {
            reply: api_lib::adapters::interview::decode_question(&json!({ "questions": [""] })),
            ..healthy_interview()
        },
        ..Upstreams::default()
    });
    let token = app.register("grey@example.com").await;
    let chat_id = app.create_chat(&token, "Jane").await;

    let (status, chat) = app.post_message(&token, &chat_id, "hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat["messages"][1]["text"], UNEXPECTED_REPLY);
}

#[tokio::test]
async fn surface_policy_turns_interview_failure_into_bad_gateway() {
    let app = test_app(Upstreams {
        interview: ScriptedInterview {
            reply: Err(UpstreamError::Transport("timeout".into())),
            ..healthy_interview()
        },
        policy: "surface",
        ..Upstreams::default()
    });
    let token = app.register("grey@example.com").await;
    let chat_id = app.create_chat(&token, "Jane").await;

    let (status, body) = app.post_message(&token, &chat_id, "hello").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["stage"], "get_questions");

    // The failed exchange stores neither the message nor a reply.
    let (status, messages) = app.get(&format!("/api/chat/{}", chat_id), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages, json!([]));
}

#[tokio::test]
async fn concurrent_messages_on_one_chat_alternate() {
    let app = test_app(Upstreams {
        interview: ScriptedInterview {
            delay: Duration::from_millis(50),
            ..healthy_interview()
        },
        ..Upstreams::default()
    });
    let token = app.register("grey@example.com").await;
    let chat_id = app.create_chat(&token, "Jane").await;

    let (a, b) = tokio::join!(
        app.post_message(&token, &chat_id, "first"),
        app.post_message(&token, &chat_id, "second"),
    );
    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);

    let (_, messages) = app.get(&format!("/api/chat/{}", chat_id), Some(&token)).await;
    let senders: Vec<&str> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["sender"].as_str().unwrap())
        .collect();
    assert_eq!(senders, vec!["user", "ai", "user", "ai"]);
    assert!(app.locks.is_empty());
}

#[tokio::test]
async fn chat_locks_are_released_after_each_exchange() {
    let app = test_app(Upstreams::default());
    let token = app.register("grey@example.com").await;

    for name in ["Ann", "Ben", "Cal", "Dee", "Eve"] {
        let chat_id = app.create_chat(&token, name).await;
        let (status, _) = app.post_message(&token, &chat_id, "hello").await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = app.post_message(&token, &uuid::Uuid::new_v4().to_string(), "hello").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(app.locks.is_empty());
}

//=========================================================================================
// Closeout and reports
//=========================================================================================

#[tokio::test]
async fn quit_produces_a_downloadable_report() {
    let app = test_app(Upstreams::default());
    let token = app.register("grey@example.com").await;
    let chat_id = app.create_chat(&token, "Jane").await;
    app.post_message(&token, &chat_id, "I worry all the time").await;

    let (status, body) = app.get(&format!("/api/chat/download-pdf/{}", chat_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "PDF not found");

    let (status, chat) = app.post_message(&token, &chat_id, "Quit").await;
    assert_eq!(status, StatusCode::OK);
    let messages = chat["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    let link = messages[3]["text"].as_str().unwrap();
    assert_eq!(
        link,
        format!("[Download PDF Report](http://localhost:5000/api/chat/download-pdf/{})", chat_id)
    );
    assert_eq!(
        app.analysis.treated.lock().unwrap().clone(),
        vec![vec!["Generalized Anxiety Disorder".to_string()]]
    );

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/chat/download-pdf/{}", chat_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.contains(&format!("{}-ChatSummary.pdf", chat_id)));
    let pdf = response.into_body().collect().await.unwrap().to_bytes();
    assert!(pdf.starts_with(b"%PDF"));
}

#[tokio::test]
async fn closeout_survives_failing_analysis() {
    let app = test_app(Upstreams {
        analysis: ScriptedAnalysis {
            disorders: Err(UpstreamError::Transport("down".into())),
            treatments: Err(UpstreamError::Transport("down".into())),
            summary: Err(UpstreamError::UnexpectedShape("[]".into())),
            treated: Mutex::new(Vec::new()),
        },
        ..Upstreams::default()
    });
    let token = app.register("grey@example.com").await;
    let chat_id = app.create_chat(&token, "Jane").await;

    let (status, chat) = app.post_message(&token, &chat_id, "end").await;
    assert_eq!(status, StatusCode::OK);
    assert!(chat["messages"][1]["text"].as_str().unwrap().contains(&chat_id));
    assert!(app.reports.path().join(format!("{}.pdf", chat_id)).exists());
    assert_eq!(app.analysis.treated.lock().unwrap().clone(), vec![Vec::<String>::new()]);
}

#[tokio::test]
async fn surface_policy_names_the_failed_closeout_stage() {
    let app = test_app(Upstreams {
        analysis: ScriptedAnalysis {
            disorders: Err(UpstreamError::Transport("down".into())),
            ..healthy_analysis()
        },
        policy: "surface",
        ..Upstreams::default()
    });
    let token = app.register("grey@example.com").await;
    let chat_id = app.create_chat(&token, "Jane").await;

    let (status, body) = app.post_message(&token, &chat_id, "quit").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["message"], "Upstream service failed");
    assert_eq!(body["stage"], "detect_disorders");
    assert!(!app.reports.path().join(format!("{}.pdf", chat_id)).exists());

    let (_, messages) = app.get(&format!("/api/chat/{}", chat_id), Some(&token)).await;
    assert_eq!(messages, json!([]));
}

//=========================================================================================
// Rename, share, delete
//=========================================================================================

#[tokio::test]
async fn rename_changes_the_patient_name() {
    let app = test_app(Upstreams::default());
    let token = app.register("grey@example.com").await;
    let chat_id = app.create_chat(&token, "Jane").await;

    let uri = format!("/api/chat/rename/{}", chat_id);
    let (status, body) = app.json("PUT", &uri, None, json!({ "newChatName": "Jane D." })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Chat renamed successfully");
    assert_eq!(body["chat"]["patientName"], "Jane D.");

    let (status, body) = app.json("PUT", &uri, None, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "New chat name is required.");
}

#[tokio::test]
async fn share_builds_a_frontend_link() {
    let app = test_app(Upstreams::default());
    let token = app.register("grey@example.com").await;
    let chat_id = app.create_chat(&token, "Jane").await;

    let (status, body) = app.get(&format!("/api/chat/share/{}", chat_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Chat is now sharable");
    assert_eq!(body["shareableLink"], format!("http://localhost:3000/share/{}", chat_id));

    let (status, _) = app.get(&format!("/api/chat/share/{}", uuid::Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_removes_chat_and_report() {
    let app = test_app(Upstreams::default());
    let token = app.register("grey@example.com").await;
    let chat_id = app.create_chat(&token, "Jane").await;
    app.post_message(&token, &chat_id, "quit").await;
    let report = app.reports.path().join(format!("{}.pdf", chat_id));
    assert!(report.exists());

    let uri = format!("/api/chat/delete/{}", chat_id);
    let (status, body) = app.json("DELETE", &uri, None, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Chat deleted successfully");
    assert!(!report.exists());

    let (status, _) = app.get(&format!("/api/chat/{}", chat_id), Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.json("DELETE", &uri, None, json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//=========================================================================================
// Speech to text
//=========================================================================================

#[tokio::test]
async fn speech_to_text_transcribes_the_audio_field() {
    let app = test_app(Upstreams::default());
    let (status, body) = app.call(multipart("audio", b"RIFF....WAVE")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transcription"], "I have trouble sleeping");
}

#[tokio::test]
async fn speech_to_text_without_audio_is_rejected() {
    let app = test_app(Upstreams::default());
    let (status, body) = app.call(multipart("recording", b"RIFF")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No audio file uploaded");
}

#[tokio::test]
async fn speech_to_text_failures_still_answer() {
    let unreachable = test_app(Upstreams {
        sst: ScriptedSst {
            result: Err(UpstreamError::Transport("timeout".into())),
        },
        ..Upstreams::default()
    });
    let (status, body) = unreachable.call(multipart("audio", b"RIFF")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transcription"], TRANSCRIPTION_FAILED);

    let silent = test_app(Upstreams {
        sst: ScriptedSst {
            result: Err(UpstreamError::UnexpectedShape("{}".into())),
        },
        ..Upstreams::default()
    });
    let (_, body) = silent.call(multipart("audio", b"RIFF")).await;
    assert_eq!(body["transcription"], NO_TRANSCRIPTION);
}
