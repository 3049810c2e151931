//! API middleware.

use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderValue, Request, Response};
use axum::middleware::Next;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

/// Create CORS layer.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    use axum::http::{header, Method};

    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_origin(Any)
            .max_age(std::time::Duration::from_secs(600))
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::RANGE])
            .expose_headers([header::CONTENT_LENGTH, header::CONTENT_RANGE])
            .allow_origin(origins)
            .max_age(std::time::Duration::from_secs(600))
    }
}

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id of one HTTP request, available as a request extension.
#[derive(Debug, Clone)]
pub struct HttpRequestId(pub String);

/// Tag each request with an id (the caller's `X-Request-ID` or a fresh
/// UUID), echo it back, and log one line per completed request.
///
/// Health checks are not logged.
pub async fn request_context(mut request: Request<Body>, next: Next) -> Response<Body> {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    request.extensions_mut().insert(HttpRequestId(id.clone()));

    let started = Instant::now();
    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    if path != "/health" {
        info!(
            request_id = %id,
            method = %method,
            path = %path,
            query = query.as_deref().unwrap_or(""),
            status = response.status().as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "HTTP request served"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::{Extension, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/echo",
                get(|Extension(id): Extension<HttpRequestId>| async move { id.0 }),
            )
            .layer(axum::middleware::from_fn(request_context))
    }

    #[tokio::test]
    async fn test_caller_id_is_kept() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header("X-Request-ID", "cam-refresh-7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[REQUEST_ID_HEADER], "cam-refresh-7");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"cam-refresh-7");
    }

    #[tokio::test]
    async fn test_missing_id_is_generated() {
        let response = app()
            .oneshot(Request::builder().uri("/echo").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }
}
