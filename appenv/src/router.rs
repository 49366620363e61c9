//! HTTP router setup

use axum::Router;
use tower_http::trace::TraceLayer;

/// Prefix every API route is mounted under.
pub const API_PREFIX: &str = "/api";

/// Mount `api` under [`API_PREFIX`] on `router`, with request tracing.
pub fn mount_api(router: Router, api: Router) -> Router {
    router
        .nest(API_PREFIX, api)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_routes_live_under_api_prefix() {
        let api = Router::new().route("/ping", get(|| async { "pong" }));
        let app = mount_api(Router::new(), api);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"pong");

        let response = app
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
