use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::{future::Future, net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};

use crate::{
    client_ip::{client_ip_middleware, TrustedProxyHops},
    db::WordStore,
    handlers::{
        self,
        words::{check_word, get_word},
    },
    middleware::{create_cors_layer, handle_panic, security_headers},
    rate_limit::{rate_limit_middleware, RateLimiter},
};

/// JSON request bodies larger than this are rejected.
const JSON_BODY_LIMIT: usize = 100 * 1024;

/// Create the Axum router with all endpoints and middleware
///
/// Layers run outermost first: panic catcher, tracing, client address
/// resolution, rate limiting, CORS, body limit, security headers.
pub fn create_router<S>(store: Arc<S>, limiter: RateLimiter, trusted_proxy_hops: usize) -> Router
where
    S: WordStore + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(handlers::root))
        .route("/ip", get(handlers::client_ip))
        .route("/getword", get(get_word::<S>))
        .route("/checkword", post(check_word::<S>))
        .fallback(handlers::not_found)
        .with_state(store)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(from_fn_with_state(
                    TrustedProxyHops(trusted_proxy_hops),
                    client_ip_middleware,
                ))
                .layer(from_fn_with_state(limiter, rate_limit_middleware))
                .layer(create_cors_layer())
                .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
                .layer(from_fn(security_headers)),
        )
}

/// Serves `app` until `shutdown` resolves, drains in-flight requests,
/// then closes the store.
///
/// The listener stops accepting as soon as `shutdown` fires; the store is
/// closed only after every open connection has finished.
pub async fn serve<S, F>(
    listener: TcpListener,
    app: Router,
    store: Arc<S>,
    shutdown: F,
) -> std::io::Result<()>
where
    S: WordStore + Send + Sync + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await;

    match &result {
        Ok(()) => info!("HTTP server closed"),
        Err(e) => error!("Server error: {}", e),
    }

    store.close().await;
    result
}

/// Graceful shutdown signal handler
/// Listens for SIGTERM and SIGINT signals
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received: closing HTTP server");
        },
        _ = terminate => {
            info!("SIGTERM signal received: closing HTTP server");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::error::{ApiError, ApiResult};
    use crate::handlers::BANNER;
    use crate::test_support::MemoryStore;
    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::{oneshot, Notify};
    use tower::ServiceExt;

    fn app_with(store: Arc<MemoryStore>, max_requests: usize) -> Router {
        let limiter = RateLimiter::new(RateLimitConfig {
            window: Duration::from_secs(15 * 60),
            max_requests,
        });
        create_router(store, limiter, 3)
    }

    fn app() -> Router {
        let store = Arc::new(MemoryStore::new(&[
            ("apple", true),
            ("cat", false),
            ("crane", true),
            ("slate", true),
        ]));
        app_with(store, 500)
    }

    fn request(method: Method, uri: &str, body: Body) -> Request<Body> {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 40000))));
        request
    }

    fn check_word_request(body: &str) -> Request<Body> {
        request(Method::POST, "/checkword", Body::from(body.to_string()))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_root_banner() {
        let response = app()
            .oneshot(request(Method::GET, "/", Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, BANNER);
    }

    #[tokio::test]
    async fn test_ip_honours_trusted_hops() {
        let mut req = request(Method::GET, "/ip", Body::empty());
        req.headers_mut().insert(
            "x-forwarded-for",
            "203.0.113.7, 198.51.100.2, 192.0.2.9, 10.0.0.5".parse().unwrap(),
        );

        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "198.51.100.2");
    }

    #[tokio::test]
    async fn test_ip_without_connection_info() {
        let req = Request::builder().uri("/ip").body(Body::empty()).unwrap();

        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "unknown");
    }

    #[tokio::test]
    async fn test_getword_returns_only_winning_words() {
        let app = app();
        let winning: HashSet<&str> = ["apple", "crane", "slate"].into_iter().collect();
        let mut seen = HashSet::new();

        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(request(Method::GET, "/getword", Body::empty()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let body = body_json(response).await;
            let word = body["word"].as_str().unwrap().to_string();
            assert!(winning.contains(word.as_str()), "{} is not a winning word", word);
            seen.insert(word);
        }

        // Every winning word shows up eventually
        assert_eq!(seen.len(), winning.len());
    }

    #[tokio::test]
    async fn test_getword_failure_is_generic_500() {
        let store = Arc::new(MemoryStore::new(&[("cat", false)]));
        let response = app_with(store, 500)
            .oneshot(request(Method::GET, "/getword", Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({ "error": "Internal server error" }));
    }

    #[tokio::test]
    async fn test_checkword_matches_after_normalization() {
        let response = app()
            .oneshot(check_word_request(r#"{"word":"Cat"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "message": true }));
    }

    #[tokio::test]
    async fn test_checkword_unknown_word() {
        let response = app()
            .oneshot(check_word_request(r#"{"word":"zzzzz"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "message": false }));
    }

    #[tokio::test]
    async fn test_checkword_invalid_input() {
        let bodies = [
            "{}",
            r#"{"word":""}"#,
            r#"{"word":"  "}"#,
            r#"{"word":null}"#,
            r#"{"word":42}"#,
            r#"["cat"]"#,
            "not json",
        ];

        for body in bodies {
            let response = app().oneshot(check_word_request(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
            assert_eq!(body_json(response).await, json!({ "error": "Invalid input" }));
        }
    }

    #[tokio::test]
    async fn test_checkword_oversized_body() {
        let body = format!(r#"{{"word":"{}"}}"#, "a".repeat(200 * 1024));
        let response = app().oneshot(check_word_request(&body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(response).await, json!({ "error": "Payload too large" }));
    }

    #[tokio::test]
    async fn test_checkword_body_under_limit() {
        let body = format!(r#"{{"word":"{}"}}"#, "a".repeat(90 * 1024));
        let response = app().oneshot(check_word_request(&body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "message": false }));
    }

    #[tokio::test]
    async fn test_checkword_without_json_content_type() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/checkword")
            .body(Body::from(r#"{"word":"cat"}"#))
            .unwrap();

        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = app()
            .oneshot(request(Method::GET, "/nope", Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_security_and_rate_limit_headers() {
        let response = app()
            .oneshot(request(Method::GET, "/", Body::empty()))
            .await
            .unwrap();
        let headers = response.headers();

        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
        assert_eq!(headers["strict-transport-security"], "max-age=31536000; includeSubDomains");
        assert!(headers.contains_key("content-security-policy"));
        assert!(!headers.contains_key("x-powered-by"));

        assert_eq!(headers["ratelimit-limit"], "500");
        assert_eq!(headers["ratelimit-remaining"], "499");
        assert_eq!(headers["ratelimit-policy"], "500;w=900");
        assert!(headers.contains_key("ratelimit-reset"));
        assert!(!headers.contains_key("x-ratelimit-limit"));
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let mut req = request(Method::GET, "/", Body::empty());
        req.headers_mut()
            .insert(header::ORIGIN, "https://example.com".parse().unwrap());

        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_after_ceiling() {
        let store = Arc::new(MemoryStore::new(&[("apple", true)]));
        let app = app_with(store, 2);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request(Method::GET, "/getword", Body::empty()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/getword", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["ratelimit-remaining"], "0");
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        // A different client behind the same proxies has its own budget
        let mut other = request(Method::GET, "/getword", Body::empty());
        other
            .headers_mut()
            .insert("x-forwarded-for", "203.0.113.50".parse().unwrap());
        let response = app.oneshot(other).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_serve_closes_store_after_shutdown() {
        let store = Arc::new(MemoryStore::new(&[("apple", true)]));
        let app = app_with(store.clone(), 500);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        tokio::time::timeout(
            Duration::from_secs(5),
            serve(listener, app, store.clone(), async {}),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(store.is_closed());
    }

    /// Store whose `random_word` parks until released, to hold a request in flight.
    struct GatedStore {
        entered: Notify,
        release: Notify,
        closed: AtomicBool,
    }

    impl WordStore for GatedStore {
        async fn random_word(&self) -> ApiResult<String> {
            self.entered.notify_one();
            self.release.notified().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(ApiError::query("store closed while a request was in flight"));
            }
            Ok("apple".to_string())
        }

        async fn word_exists(&self, _word: &str) -> ApiResult<bool> {
            Ok(false)
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_before_closing_store() {
        let store = Arc::new(GatedStore {
            entered: Notify::new(),
            release: Notify::new(),
            closed: AtomicBool::new(false),
        });
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let app = create_router(store.clone(), limiter, 0);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(serve(listener, app, store.clone(), async move {
            shutdown_rx.await.ok();
        }));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /getword HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        // Request is inside the handler; begin draining
        store.entered.notified().await;
        shutdown_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!store.closed.load(Ordering::SeqCst));

        store.release.notify_one();

        let mut raw = Vec::new();
        client.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8(raw).unwrap();
        assert!(raw.starts_with("HTTP/1.1 200"), "unexpected response: {}", raw);
        assert!(raw.contains(r#"{"word":"apple"}"#));

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(store.closed.load(Ordering::SeqCst));

        // Listener is gone
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
