//! Folio Gateway: portfolio assistant HTTP surface.
//! Grounded chat (JSON or SSE), knowledge index publishing, contact intake and admin inbox.

mod handlers;
mod state;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderValue, Method, Request},
    middleware::Next,
    response::Response,
    routing::{get, patch, post},
    Router,
};
use folio_core::GatewayConfig;
use state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to read .env: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::load().unwrap_or_else(|e| {
        tracing::warn!("Gateway config unreadable ({}); using defaults", e);
        GatewayConfig::default()
    });

    let state = match AppState::from_config(&config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!("Failed to initialise gateway state: {}", e);
            std::process::exit(1);
        }
    };

    let app = build_app(state, &config.cors_origins);

    let addr = config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Folio gateway listening on {}", addr);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("Server error: {}", e);
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let cors = if allowed.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(allowed))
    };
    cors.allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([axum::http::HeaderName::from_static(
            handlers::chat::THREAD_ID_HEADER,
        )])
}

fn build_app(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(handlers::chat::chat))
        .route(
            "/api/index-portfolio",
            get(handlers::knowledge::index_status).post(handlers::knowledge::index_portfolio),
        )
        .route("/api/contact", post(handlers::contact::submit))
        .route("/api/admin/contacts", get(handlers::contact::list))
        .route("/api/admin/contacts/stats", get(handlers::contact::stats))
        .route(
            "/api/admin/contacts/:id",
            patch(handlers::contact::update_status).delete(handlers::contact::delete),
        )
        .with_state(state)
        .layer(cors_layer(cors_origins))
        .layer(axum::middleware::from_fn(log_request))
}

async fn log_request(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    tracing::info!(
        peer = %addr,
        %method,
        path = %path,
        status = response.status().as_u16(),
        "request"
    );
    response
}

async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::StatusCode;
    use folio_core::backend::RagBackend;
    use folio_core::{
        ChatService, ContactNotifier, ContactStore, CorpusPublisher, LocalRagBackend,
        MailSettings, PortfolioProfile, RagSettings,
    };
    use tower::ServiceExt;

    fn test_app(dir: &tempfile::TempDir, grounded: bool) -> Router {
        let settings = RagSettings::local();
        let backend: Option<Arc<dyn RagBackend>> = if grounded {
            Some(Arc::new(LocalRagBackend::new()))
        } else {
            None
        };
        let state = Arc::new(AppState {
            chat: ChatService::new(backend.clone(), &settings),
            publisher: CorpusPublisher::new(backend, &settings),
            profile: PortfolioProfile::default(),
            contacts: ContactStore::new(dir.path().join("contacts.db")).unwrap(),
            notifier: ContactNotifier::new(MailSettings::default()),
        });
        build_app(state, &[]).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let res = test_app(&dir, false).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "OK");
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_message() {
        let dir = tempfile::tempdir().unwrap();
        let req = json_request("POST", "/api/chat", serde_json::json!({ "message": "   " }));
        let res = test_app(&dir, false).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["success"], false);
    }

    #[tokio::test]
    async fn test_chat_missing_message_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let req = json_request("POST", "/api/chat", serde_json::json!({ "threadId": "t1" }));
        let res = test_app(&dir, false).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let json = body_json(res).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Invalid request: message is required");
    }

    #[tokio::test]
    async fn test_chat_without_rag_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let req = json_request("POST", "/api/chat", serde_json::json!({ "message": "Hello there" }));
        let res = test_app(&dir, false).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["response"], folio_core::fallback("hello there"));
        assert_eq!(json["model"], "fallback");
        assert_eq!(json["rag"]["enabled"], false);
        assert_eq!(json["rag"]["threadBased"], false);
        assert!(json["thread_id"].is_null());
    }

    #[tokio::test]
    async fn test_publish_then_grounded_chat() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir, true);

        let status_req = Request::builder().uri("/api/index-portfolio").body(Body::empty()).unwrap();
        let json = body_json(app.clone().oneshot(status_req).await.unwrap()).await;
        assert_eq!(json["status"], "not_indexed");

        let publish = json_request("POST", "/api/index-portfolio", serde_json::json!({ "clearFirst": true }));
        let res = app.clone().oneshot(publish).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["stats"]["filesUploaded"], json["stats"]["totalFiles"]);

        let status_req = Request::builder().uri("/api/index-portfolio").body(Body::empty()).unwrap();
        let json = body_json(app.clone().oneshot(status_req).await.unwrap()).await;
        assert_eq!(json["status"], "indexed");

        let chat = json_request("POST", "/api/chat", serde_json::json!({ "message": "What projects have you built?" }));
        let json = body_json(app.oneshot(chat).await.unwrap()).await;
        assert_eq!(json["rag"]["enabled"], true);
        assert_eq!(json["rag"]["threadBased"], true);
        assert!(json["thread_id"].as_str().is_some());
        assert_eq!(json["rag"]["citations"].as_array().map(|c| c.len()), Some(1));
    }

    #[tokio::test]
    async fn test_chat_stream_frames_and_thread_header() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir, true);
        let publish = json_request("POST", "/api/index-portfolio", serde_json::json!({}));
        app.clone().oneshot(publish).await.unwrap();

        let req = json_request(
            "POST",
            "/api/chat",
            serde_json::json!({ "message": "frontend skills", "stream": true }),
        );
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream")));
        assert!(res.headers().contains_key(handlers::chat::THREAD_ID_HEADER));

        let body = body_text(res).await;
        assert!(body.contains("data: {\"text\":"));
        assert!(body.trim_end().ends_with("data: [DONE]"));
    }

    #[tokio::test]
    async fn test_publish_without_backend_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let req = json_request("POST", "/api/index-portfolio", serde_json::json!({}));
        let res = test_app(&dir, false).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_contact_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir, false);

        let bad = json_request(
            "POST",
            "/api/contact",
            serde_json::json!({ "name": "Ada", "email": "not-an-email", "subject": "Hi", "message": "Hello" }),
        );
        let res = app.clone().oneshot(bad).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "Invalid email format");

        let good = json_request(
            "POST",
            "/api/contact",
            serde_json::json!({ "name": "Ada", "email": "ada@example.com", "subject": "Hi", "message": "Hello" }),
        );
        let res = app.clone().oneshot(good).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let id = body_json(res).await["id"].as_i64().unwrap();

        let update = json_request(
            "PATCH",
            &format!("/api/admin/contacts/{}", id),
            serde_json::json!({ "status": "replied" }),
        );
        assert_eq!(app.clone().oneshot(update).await.unwrap().status(), StatusCode::OK);

        let invalid = json_request(
            "PATCH",
            &format!("/api/admin/contacts/{}", id),
            serde_json::json!({ "status": "archived" }),
        );
        assert_eq!(app.clone().oneshot(invalid).await.unwrap().status(), StatusCode::BAD_REQUEST);

        let list = Request::builder()
            .uri("/api/admin/contacts?status=replied")
            .body(Body::empty())
            .unwrap();
        let json = body_json(app.clone().oneshot(list).await.unwrap()).await;
        assert_eq!(json["data"].as_array().map(|rows| rows.len()), Some(1));

        let stats = Request::builder().uri("/api/admin/contacts/stats").body(Body::empty()).unwrap();
        let json = body_json(app.clone().oneshot(stats).await.unwrap()).await;
        assert_eq!(json["data"]["total"], 1);
        assert_eq!(json["data"]["replied"], 1);

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/admin/contacts/{}", id))
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.clone().oneshot(delete).await.unwrap().status(), StatusCode::OK);

        let again = Request::builder()
            .method("DELETE")
            .uri(format!("/api/admin/contacts/{}", id))
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.oneshot(again).await.unwrap().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_contact_submissions() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir, false);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let req = json_request(
                "POST",
                "/api/contact",
                serde_json::json!({
                    "name": format!("Sender {}", i),
                    "email": format!("sender{}@example.com", i),
                    "subject": "Hi",
                    "message": "Hello",
                }),
            );
            tasks.spawn(app.clone().oneshot(req));
        }
        while let Some(res) = tasks.join_next().await {
            assert_eq!(res.unwrap().unwrap().status(), StatusCode::OK);
        }

        let stats = Request::builder().uri("/api/admin/contacts/stats").body(Body::empty()).unwrap();
        let json = body_json(app.oneshot(stats).await.unwrap()).await;
        assert_eq!(json["data"]["total"], 8);
        assert_eq!(json["data"]["new"], 8);
    }
}
