use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{header, Request, StatusCode},
    response::Response,
    routing::get,
    Extension, Router,
};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use tracing_subscriber::fmt::MakeWriter;

use plugcast::config::{ServerConfig, StatusPageConfig};
use plugcast::models::{Phase, PluginInfo, PluginOptions, DEFAULT_PRIORITY};
use plugcast::plugins::{Assigns, Plugin, PluginCatalog, PluginOutcome, PluginRegistry, Pipeline, RequestState};
use plugcast::server::{build_router, AppContext};
use plugcast::status::{ConfiguredStatusPages, StatusPageResolver};
use plugcast::RegistryError;

/// Aborts without a reply in pre-request, fails in post-request
struct Misbehaving;

#[async_trait]
impl Plugin for Misbehaving {
    async fn pre_request(&self, state: RequestState, _: &PluginOptions) -> PluginOutcome {
        PluginOutcome::Abort(state)
    }

    async fn post_request(&self, _: RequestState, _: &PluginOptions) -> PluginOutcome {
        PluginOutcome::Fail("boom".to_string())
    }

    fn plugin_info(&self) -> PluginInfo {
        PluginInfo {
            title: "Misbehaving".to_string(),
            version: "0".to_string(),
            author: "tests".to_string(),
            description: String::new(),
            options: Vec::new(),
        }
    }
}

/// Fails in pre-request, passes post-request through
struct Failing;

#[async_trait]
impl Plugin for Failing {
    async fn pre_request(&self, _: RequestState, _: &PluginOptions) -> PluginOutcome {
        PluginOutcome::Fail("database down".to_string())
    }

    async fn post_request(&self, state: RequestState, _: &PluginOptions) -> PluginOutcome {
        PluginOutcome::Continue(state)
    }

    fn plugin_info(&self) -> PluginInfo {
        PluginInfo {
            title: "Failing".to_string(),
            version: "0".to_string(),
            author: "tests".to_string(),
            description: String::new(),
            options: Vec::new(),
        }
    }
}

/// Log sink shared with a test subscriber
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

struct Harness {
    app: Router,
    registry: PluginRegistry,
}

fn routes() -> Router {
    Router::new()
        .route("/hello", get(|| async { "hello" }))
        .route("/gone", get(|| async { StatusCode::NOT_FOUND }))
        .route(
            "/whoami",
            get(|Extension(assigns): Extension<Assigns>| async move {
                assigns
                    .get("request_id")
                    .and_then(Value::as_str)
                    .unwrap_or("none")
                    .to_string()
            }),
        )
        .route(
            "/stream",
            get(|| async {
                Body::from_stream(futures::stream::iter(vec![
                    Ok::<_, std::io::Error>(Bytes::from_static(b"0123456789")),
                    Ok(Bytes::from_static(b"abcdefghij")),
                ]))
            }),
        )
        .route(
            "/events",
            get(|| async {
                Response::builder()
                    .header(header::CONTENT_TYPE, "text/event-stream")
                    .body(Body::from_stream(futures::stream::repeat_with(|| {
                        Ok::<_, std::io::Error>(Bytes::from_static(b"data: tick\n\n"))
                    })))
                    .unwrap()
            }),
        )
}

fn harness(pages: Vec<StatusPageConfig>) -> Harness {
    harness_with(pages, &ServerConfig::default())
}

fn harness_with(pages: Vec<StatusPageConfig>, server: &ServerConfig) -> Harness {
    let dir = std::env::temp_dir().join("plugcast-tests");
    let catalog = Arc::new(
        PluginCatalog::with_builtins(dir)
            .with("misbehaving", Arc::new(Misbehaving))
            .with("failing", Arc::new(Failing)),
    );
    let registry = PluginRegistry::spawn(catalog.clone());
    let pipeline = Pipeline::new(registry.clone(), catalog);
    let resolver: Arc<dyn StatusPageResolver> =
        Arc::new(ConfiguredStatusPages::from_config(&pages, None).unwrap());

    let ctx = AppContext::new(pipeline, resolver, server).with_admin(true);
    Harness {
        app: build_router(routes(), &ctx),
        registry,
    }
}

fn options(value: Value) -> PluginOptions {
    value.as_object().cloned().unwrap()
}

async fn get_path(app: &Router, path: &str) -> Response {
    app.clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn not_found_page() -> StatusPageConfig {
    StatusPageConfig::inline(404, "<h1>{{status}} {{reason}}</h1>{{path}}")
}

#[tokio::test]
async fn configured_page_replaces_router_404() {
    let h = harness(vec![not_found_page()]);

    let response = get_path(&h.app, "/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/html; charset=utf-8"
    );
    assert_eq!(body_string(response).await, "<h1>404 Not Found</h1>/nope");
}

#[tokio::test]
async fn configured_page_replaces_handler_404() {
    let h = harness(vec![not_found_page()]);
    let response = get_path(&h.app, "/gone").await;
    assert_eq!(body_string(response).await, "<h1>404 Not Found</h1>/gone");
}

#[tokio::test]
async fn successful_response_is_untouched() {
    let h = harness(vec![not_found_page()]);
    let response = get_path(&h.app, "/hello").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "hello");
}

#[tokio::test]
async fn request_id_is_assigned_and_echoed() {
    let h = harness(Vec::new());
    h.registry
        .register_and_wait(Phase::PreRequest, "request_id", PluginOptions::new(), 10)
        .await
        .unwrap();
    h.registry
        .register_and_wait(Phase::PostRequest, "request_id", PluginOptions::new(), 10)
        .await
        .unwrap();

    let request = Request::get("/whoami")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers().get("x-request-id").unwrap(), "abc-123");
    assert_eq!(body_string(response).await, "abc-123");
}

#[tokio::test]
async fn response_headers_are_added() {
    let h = harness(Vec::new());
    h.registry
        .register_and_wait(
            Phase::PostRequest,
            "response_headers",
            options(json!({ "headers": { "x-frame-options": "DENY" } })),
            DEFAULT_PRIORITY,
        )
        .await
        .unwrap();

    let response = get_path(&h.app, "/hello").await;
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    assert_eq!(body_string(response).await, "hello");
}

#[tokio::test]
async fn maintenance_aborts_before_handler() {
    let h = harness(Vec::new());
    h.registry
        .register_and_wait(
            Phase::PreRequest,
            "maintenance",
            options(json!({ "enabled": true, "message": "back soon", "allow": ["/whoami"] })),
            DEFAULT_PRIORITY,
        )
        .await
        .unwrap();

    let response = get_path(&h.app, "/hello").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_string(response).await, "back soon");

    let allowed = get_path(&h.app, "/whoami").await;
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn early_error_uses_status_pages() {
    let h = harness(vec![StatusPageConfig::inline(503, "maintenance page")]);
    h.registry
        .register_and_wait(
            Phase::PreRequest,
            "maintenance",
            options(json!({ "enabled": true })),
            DEFAULT_PRIORITY,
        )
        .await
        .unwrap();

    let response = get_path(&h.app, "/hello").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_string(response).await, "maintenance page");
}

#[tokio::test]
async fn abort_without_reply_is_500() {
    let h = harness(Vec::new());
    h.registry
        .register_and_wait(Phase::PreRequest, "misbehaving", PluginOptions::new(), 0)
        .await
        .unwrap();

    let response = get_path(&h.app, "/hello").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn post_request_failure_is_500() {
    let h = harness(Vec::new());
    h.registry
        .register_and_wait(Phase::PostRequest, "misbehaving", PluginOptions::new(), 0)
        .await
        .unwrap();

    let response = get_path(&h.app, "/hello").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn pre_request_failure_is_500() {
    let h = harness(Vec::new());
    h.registry
        .register_and_wait(Phase::PreRequest, "failing", PluginOptions::new(), 0)
        .await
        .unwrap();

    let response = get_path(&h.app, "/hello").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_ne!(body_string(response).await, "hello");
}

#[tokio::test]
async fn pre_request_failure_uses_status_pages() {
    let h = harness(vec![StatusPageConfig::inline(500, "<p>{{status}} at {{path}}</p>")]);
    h.registry
        .register_and_wait(Phase::PreRequest, "failing", PluginOptions::new(), 0)
        .await
        .unwrap();

    let response = get_path(&h.app, "/hello").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "<p>500 at /hello</p>");
}

#[tokio::test]
async fn abort_is_logged_with_adopted_request_id() {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let h = harness(Vec::new());
    h.registry
        .register_and_wait(Phase::PreRequest, "request_id", PluginOptions::new(), 1)
        .await
        .unwrap();
    h.registry
        .register_and_wait(
            Phase::PreRequest,
            "maintenance",
            options(json!({ "enabled": true })),
            50,
        )
        .await
        .unwrap();

    let request = Request::get("/hello")
        .header("x-request-id", "adopted-42")
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(captured
        .contents()
        .contains("Request adopted-42 aborted with 503"));
}

#[tokio::test]
async fn streamed_body_over_limit_keeps_status_and_gets_headers() {
    let server = ServerConfig {
        max_body_bytes: 16,
        ..ServerConfig::default()
    };
    let h = harness_with(Vec::new(), &server);
    h.registry
        .register_and_wait(
            Phase::PostRequest,
            "response_headers",
            options(json!({ "headers": { "x-frame-options": "DENY" } })),
            DEFAULT_PRIORITY,
        )
        .await
        .unwrap();

    let response = get_path(&h.app, "/stream").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    assert_eq!(body_string(response).await, "0123456789abcdefghij");

    let buffered = get_path(&h.app, "/hello").await;
    assert_eq!(buffered.headers().get("x-frame-options").unwrap(), "DENY");
    assert_eq!(body_string(buffered).await, "hello");
}

#[tokio::test]
async fn endless_stream_is_not_buffered() {
    let h = harness(Vec::new());
    h.registry
        .register_and_wait(Phase::PostRequest, "request_id", PluginOptions::new(), 10)
        .await
        .unwrap();

    let request = Request::get("/events")
        .header("x-request-id", "sse-1")
        .body(Body::empty())
        .unwrap();
    let response = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        h.app.clone().oneshot(request),
    )
    .await
    .expect("response headers should arrive without reading the body")
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn unknown_module_is_rejected_when_acknowledged() {
    let h = harness(Vec::new());
    let err = h
        .registry
        .register_and_wait(Phase::PreRequest, "nope", PluginOptions::new(), 1)
        .await
        .unwrap_err();
    assert_eq!(err, RegistryError::UnknownModule("nope".to_string()));
    assert!(h.registry.get_all_plugins().await.unwrap().is_empty());
}

#[tokio::test]
async fn admin_register_list_unregister() {
    let h = harness(Vec::new());

    let request = Request::post("/_plugins")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "phase": "post_request", "module": "response_headers", "priority": 5 }).to_string(),
        ))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let created: Value = serde_json::from_str(&body_string(response).await).unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let listing: Value =
        serde_json::from_str(&body_string(get_path(&h.app, "/_plugins").await).await).unwrap();
    assert_eq!(listing["post_request"][0]["id"], id.as_str());
    assert_eq!(listing["post_request"][0]["priority"], 5);
    assert_eq!(listing["pre_request"], json!([]));

    let request = Request::delete(format!("/_plugins/{}", id))
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(h.registry.get_all_plugins().await.unwrap().is_empty());
}

#[tokio::test]
async fn admin_accepts_phase_aliases() {
    let h = harness(Vec::new());

    for phase in ["pre", "pre-request"] {
        let request = Request::post("/_plugins")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "phase": phase, "module": "maintenance" }).to_string()))
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let listing: Value =
        serde_json::from_str(&body_string(get_path(&h.app, "/_plugins").await).await).unwrap();
    assert_eq!(listing["pre_request"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn admin_rejects_bad_input() {
    let h = harness(Vec::new());

    let request = Request::post("/_plugins")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "phase": "pre_request", "module": "nope" }).to_string()))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let request = Request::post("/_plugins")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "phase": "during", "module": "maintenance" }).to_string()))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());

    let request = Request::delete("/_plugins/not-a-uuid")
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_catalog_lists_modules() {
    let h = harness(Vec::new());
    let catalog: Value =
        serde_json::from_str(&body_string(get_path(&h.app, "/_plugins/catalog").await).await)
            .unwrap();
    let names: Vec<&str> = catalog
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "failing",
            "file_logger",
            "maintenance",
            "misbehaving",
            "request_id",
            "response_headers"
        ]
    );
}
