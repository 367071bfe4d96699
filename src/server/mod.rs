mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::error::{AppError, RequestError};
pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::analyze_handler,
        api::analyze_base64_handler,
        api::search_handler,
        api::get_image_handler,
        api::ask_handler,
        api::health_handler,
        api::metrics_handler,
    ),
    components(schemas(
        types::AnalyzeForm,
        types::AnalyzeBase64Request,
        types::AnalyzeResponse,
        types::SearchRequest,
        types::SearchResponse,
        types::ImageResponse,
        types::AskRequest,
        types::AskResponse,
        types::HealthResponse,
    ))
)]
pub struct ApiDoc;

/// 构建API服务器，`body_limit` 为请求体的最大字节数
pub fn create_app(state: Arc<AppState>, body_limit: usize) -> Router {
    Router::new()
        .route("/analyze", post(api::analyze_handler))
        .route("/analyze-base64", post(api::analyze_base64_handler))
        .route("/search", post(api::search_handler))
        .route("/image/{id}", get(api::get_image_handler))
        .route("/ask", post(api::ask_handler))
        .route("/health", get(api::health_handler))
        .route("/metrics", get(api::metrics_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
