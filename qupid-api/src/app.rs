use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;

use qupid_shared::middleware::metrics_middleware;

use crate::config::AppConfig;
use crate::routes::{
    admin, auth, conversations, discovery, email_auth, files, health, likes, messages, rate_limit, safety, skips,
    tags, users, ws,
};
use crate::AppState;

/// Multipart framing on top of the file itself.
const UPLOAD_OVERHEAD_BYTES: usize = 1024 * 1024;

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins = config.cors_origin_list();
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_credentials(true)
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_bytes + UPLOAD_OVERHEAD_BYTES;

    Router::new()
        // Platform
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        // Password auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        // Email-code auth
        .route("/auth/email/send-code", post(email_auth::send_code))
        .route("/auth/email/verify-code", post(email_auth::verify_code))
        .route("/auth/email/resend-code", post(email_auth::resend_code))
        .route("/auth/email/reset-password", post(email_auth::reset_password))
        // Profiles
        .route("/users/me", get(users::get_me).put(users::update_me))
        .route("/users/me/privacy", put(users::update_privacy))
        .route("/users/me/initial-profile", post(users::initial_profile))
        .route("/users/me/tags", get(users::my_tags).post(users::add_my_tag))
        .route("/users/me/tags/:tag_id", delete(users::remove_my_tag))
        .route("/users/search", get(discovery::search))
        .route("/users/suggestions", get(discovery::suggestions))
        .route("/users/:id", get(users::get_user))
        // Tags
        .route("/tags", get(tags::list_tags).post(tags::create_tag))
        .route("/tags/:id", get(tags::get_tag).delete(tags::delete_tag))
        // Likes and matches
        .route("/likes", post(likes::send_like))
        .route("/likes/sent", get(likes::sent_likes))
        .route("/likes/received", get(likes::received_likes))
        .route("/likes/:user_id", delete(likes::remove_like))
        .route("/matches", get(likes::list_matches))
        .route("/matches/:user_id", get(likes::match_status))
        // Skips
        .route("/skips", get(skips::list_skips).post(skips::skip_user))
        .route("/skips/:user_id", delete(skips::unskip_user))
        // Blocks and reports
        .route("/blocks", post(safety::block_user))
        .route("/blocks/my", get(safety::my_blocks))
        .route("/blocks/:user_id", delete(safety::unblock_user))
        .route("/reports", post(safety::create_report))
        .route("/reports/my", get(safety::my_reports))
        .route("/reports/:id", get(safety::get_my_report))
        // Moderation
        .route("/admin/reports", get(admin::list_reports))
        .route("/admin/reports/stats", get(admin::report_stats))
        .route("/admin/reports/:id", get(admin::get_report).put(admin::update_report))
        // Chat
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route("/conversations/unread-count", get(conversations::total_unread))
        .route("/conversations/:id", get(conversations::get_conversation))
        .route("/conversations/:id/unread-count", get(conversations::conversation_unread))
        .route("/conversations/:id/read", put(conversations::mark_conversation_read))
        .route(
            "/conversations/:id/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route("/conversations/:id/messages/:message_id/read", put(messages::mark_message_read))
        // Realtime
        .route("/ws", get(ws::ws_handler))
        // Files
        .route(
            "/files/upload/:kind",
            post(files::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/files/download/*path", get(files::download))
        .route("/files/*path", delete(files::delete_file))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::api_rate_limit))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(cors_layer(&state.config))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use qupid_shared::clients::db::create_lazy_pool;
    use qupid_shared::middleware::detached_metrics_handle;
    use tower::ServiceExt;

    fn app() -> Router {
        let config = AppConfig::default();
        let db = create_lazy_pool(&config.database_url);
        build_router(Arc::new(AppState::new(config, db, detached_metrics_handle())))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_database_check() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["service"], "qupid-api");
        assert_eq!(body["checks"][0]["name"], "database");
    }

    #[tokio::test]
    async fn profile_requires_token() {
        let response = app()
            .oneshot(Request::builder().uri("/users/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "E0004");
    }

    #[tokio::test]
    async fn websocket_rejects_missing_and_bad_tokens() {
        let missing = app()
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let bad = app()
            .oneshot(Request::builder().uri("/ws?token=not-a-jwt").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn metrics_is_plain_text() {
        let response = app()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_limit_answers_429_with_retry_after() {
        let config = AppConfig { api_rate_limit_per_minute: 2, ..AppConfig::default() };
        let db = create_lazy_pool(&config.database_url);
        let app = build_router(Arc::new(AppState::new(config, db, detached_metrics_handle())));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/users/me").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        let limited = app
            .oneshot(Request::builder().uri("/users/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(limited.headers().contains_key(header::RETRY_AFTER));
    }

    async fn status_from(app: &Router, forwarded: &str) -> StatusCode {
        app.clone()
            .oneshot(
                Request::builder()
                    .uri("/users/me")
                    .header("X-Forwarded-For", forwarded)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn rotating_forwarded_for_does_not_reset_limit() {
        let config = AppConfig { api_rate_limit_per_minute: 2, ..AppConfig::default() };
        let db = create_lazy_pool(&config.database_url);
        let app = build_router(Arc::new(AppState::new(config, db, detached_metrics_handle())));

        assert_eq!(status_from(&app, "10.0.0.1").await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_from(&app, "10.0.0.2").await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_from(&app, "10.0.0.3").await, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn trusted_proxy_limits_per_forwarded_client() {
        let config = AppConfig {
            api_rate_limit_per_minute: 1,
            trust_forwarded_for: true,
            ..AppConfig::default()
        };
        let db = create_lazy_pool(&config.database_url);
        let app = build_router(Arc::new(AppState::new(config, db, detached_metrics_handle())));

        assert_eq!(status_from(&app, "10.0.0.1").await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_from(&app, "10.0.0.2").await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_from(&app, "10.0.0.1").await, StatusCode::TOO_MANY_REQUESTS);
    }
}
