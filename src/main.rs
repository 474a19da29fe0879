mod config;
mod error;
mod middleware;
mod models;
mod services;
#[cfg(test)]
mod test_utils;

use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    middleware::from_fn_with_state,
    response::Json,
    routing::{get, post},
};
use chrono::{SecondsFormat, Utc};
use http::{Method, header};
use std::{sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{EnvFilter, fmt};

use config::Config;
use error::AppError;
use models::{BookRequest, BookResponse, HealthResponse};

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    llm_client: Arc<services::llm::LLMClient>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if there is one
    dotenvy::dotenv().ok();

    // Initialize tracing
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    if let Err(e) = config.token_secret() {
        tracing::warn!("{}; /generate-book will answer 500", e);
    }
    if let Err(e) = config.api_key() {
        tracing::warn!("{}; /generate-book will answer 500", e);
    }
    tracing::debug!(?config, "Configuration loaded");

    // Create the LLM client
    let llm_client = Arc::new(services::llm::LLMClient::from_config(&config)?);

    let addr = format!("{}:{}", config.host, config.port);
    let app_state = AppState {
        config: Arc::new(config),
        llm_client,
    };

    let app = app(app_state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/generate-book", post(generate_book))
        .route_layer(from_fn_with_state(state.clone(), middleware::auth::require_auth));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::HEAD,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutting down");
}

async fn index() -> &'static str {
    "Hello There!"
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

async fn generate_book(
    State(state): State<AppState>,
    payload: Result<Json<BookRequest>, JsonRejection>,
) -> Result<Json<BookResponse>, AppError> {
    let Json(request) = payload
        .map_err(|rejection| AppError::Validation(format!("Invalid request body: {}", rejection.body_text())))?;

    if !request.is_complete() {
        return Err(AppError::Validation(
            "Title, description, and chapters are required".to_string(),
        ));
    }

    let api_key = state.config.api_key()?;

    let started = Instant::now();
    let book = state
        .llm_client
        .generate_book(&request, api_key)
        .await
        .map_err(|source| AppError::Generation {
            source,
            elapsed: started.elapsed(),
        })?;

    Ok(Json(BookResponse { book }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::models::ErrorResponse;
    use crate::test_utils::{auth_token, test_config};

    /// App whose upstream points at a closed port, so any request that gets
    /// past validation fails with a transport error instead of a 400.
    async fn app_without_upstream(config: Config) -> Router {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = config;
        config.api_url = format!("http://{addr}/generation");
        build_app(config)
    }

    fn build_app(config: Config) -> Router {
        let llm_client = services::llm::LLMClient::from_config(&config).unwrap();
        app(AppState {
            config: Arc::new(config),
            llm_client: Arc::new(llm_client),
        })
    }

    async fn app_with_upstream(upstream: Router) -> Router {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, upstream).await.unwrap();
        });

        let mut config = test_config();
        config.api_url = format!("http://{addr}/generation");
        build_app(config)
    }

    fn generate_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/generate-book")
            .header(header::AUTHORIZATION, format!("Bearer {}", auth_token()))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn index_greets() {
        let sut = build_app(test_config());

        let response = sut
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Hello There!");
    }

    #[tokio::test]
    async fn health_reports_status_and_rfc3339_timestamp() {
        let sut = build_app(test_config());

        let response = sut
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        let timestamp = body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[tokio::test]
    async fn health_needs_no_secrets() {
        let sut = build_app(Config::from_lookup(|_| None).unwrap());

        let response = sut
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn generates_book_through_upstream() {
        let upstream = Router::new().route(
            "/generation",
            post(|| async {
                axum::Json(json!({ "output": { "finish_reason": "stop", "text": "Chapter 1..." } }))
            }),
        );
        let sut = app_with_upstream(upstream).await;

        let response = sut
            .oneshot(generate_request(
                r#"{"title":"The Lighthouse","description":"A keeper's last night","chapters":3}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = json_body(response).await;
        assert_eq!(body, json!({ "book": "Chapter 1..." }));
    }

    #[tokio::test]
    async fn zero_chapters_is_rejected_before_forwarding() {
        let sut = app_without_upstream(test_config()).await;

        let response = sut
            .oneshot(generate_request(
                r#"{"title":"The Lighthouse","description":"A keeper's last night","chapters":0}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = json_body(response).await;
        assert_eq!(body.error, "Title, description, and chapters are required");
    }

    #[tokio::test]
    async fn empty_title_is_rejected_before_forwarding() {
        let sut = app_without_upstream(test_config()).await;

        let response = sut
            .oneshot(generate_request(
                r#"{"title":"","description":"A keeper's last night","chapters":3}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let sut = app_without_upstream(test_config()).await;

        let response = sut.oneshot(generate_request("{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = json_body(response).await;
        assert!(body.error.starts_with("Invalid request body: "));
    }

    #[tokio::test]
    async fn missing_api_key_is_server_error() {
        let config = Config::from_lookup(|_| None)
            .unwrap()
            .with_token_secret(crate::test_utils::TEST_SECRET);
        let sut = app_without_upstream(config).await;

        let response = sut
            .oneshot(generate_request(
                r#"{"title":"The Lighthouse","description":"A keeper's last night","chapters":3}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorResponse = json_body(response).await;
        assert_eq!(body.error, "Server configuration error (missing AI API key)");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_server_error() {
        let sut = app_without_upstream(test_config()).await;

        let response = sut
            .oneshot(generate_request(
                r#"{"title":"The Lighthouse","description":"A keeper's last night","chapters":3}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorResponse = json_body(response).await;
        assert_eq!(
            body.error,
            "Failed to generate book: generation service is unreachable"
        );
    }

    #[tokio::test]
    async fn generate_requires_token() {
        let sut = app_without_upstream(test_config()).await;
        let request = Request::builder()
            .method("POST")
            .uri("/generate-book")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"title":"t","description":"d","chapters":1}"#))
            .unwrap();

        let response = sut.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn cors_preflight_allows_authorization_header() {
        let sut = build_app(test_config());
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/generate-book")
            .header(header::ORIGIN, "http://localhost:4321")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
            .body(Body::empty())
            .unwrap();

        let response = sut.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        let allowed = response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS]
            .to_str()
            .unwrap()
            .to_ascii_lowercase();
        assert!(allowed.contains("authorization"));
        assert!(allowed.contains("origin"));
    }
}
