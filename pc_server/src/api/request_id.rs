//! Request correlation ids.
//!
//! Each request is served inside a `request` span carrying its id, so every
//! event logged while handling it (library `log` records included) can be
//! tied back to one `x-request-id`. The id is echoed on the response.

use axum::{
    extract::{MatchedPath, Request},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::metrics;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Client ids longer than this are replaced rather than logged
const MAX_CLIENT_ID_LEN: usize = 128;

/// Route label for requests no route matched
const UNMATCHED_ROUTE: &str = "unmatched";

/// The client's id when it is usable, otherwise a fresh UUID
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_CLIENT_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Wrap the request in a span, echo the id and record request metrics.
///
/// Metrics are labelled by route template (`/api/users/{user_id}`), never by
/// the raw path.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let id = request_id(request.headers());
    let method = request.method().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());

    let span = tracing::info_span!("request", request_id = %id, %method, route = %route);

    async move {
        let started = Instant::now();
        let mut response = next.run(request).await;
        let status = response.status();
        let elapsed = started.elapsed();

        if let Ok(value) = HeaderValue::from_str(&id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), ?elapsed, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), ?elapsed, "Request served");
        }
        metrics::http_request(method.as_str(), &route, status.as_u16(), elapsed);

        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, routing::get};
    use tower::ServiceExt;

    fn headers_with(id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(id).unwrap());
        headers
    }

    #[test]
    fn test_client_id_is_kept() {
        assert_eq!(request_id(&headers_with(" deploy-7 ")), "deploy-7");
    }

    #[test]
    fn test_missing_blank_or_oversized_id_is_replaced() {
        for headers in [
            HeaderMap::new(),
            headers_with("   "),
            headers_with(&"x".repeat(MAX_CLIENT_ID_LEN + 1)),
        ] {
            assert!(Uuid::parse_str(&request_id(&headers)).is_ok());
        }
    }

    #[tokio::test]
    async fn test_generated_id_is_echoed() {
        let app: Router = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(axum::middleware::from_fn(request_id_middleware));

        let response = app
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let echoed = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        assert!(Uuid::parse_str(echoed).is_ok());
    }
}
