use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum_typed_multipart::TypedMultipart;
use log::{info, warn};
use tokio::task::spawn_blocking;
use uuid::Uuid;

use super::error::{RequestError, Result};
use super::state::AppState;
use super::types::*;
use crate::qa::Prompt;
use crate::{metrics, utils};

/// 逐个分析上传的图片，单个文件失败不影响其他文件，失败的文件记录在 `errors` 中
async fn analyze_files(
    state: &AppState,
    files: Vec<(String, Vec<u8>)>,
) -> Result<Json<AnalyzeResponse>> {
    state.store.gate().require_initialized()?;
    if files.is_empty() {
        return Err(RequestError::BadRequest("No files were uploaded".to_string()).into());
    }

    let mut response = AnalyzeResponse::default();
    for (filename, bytes) in files {
        info!("正在分析 {}", filename);
        match state.store.ingest(bytes).await {
            Ok(result) => {
                let image = state.store.get(&result.id).await?;
                response.results.push(AnalyzeResult::new(result, &image));
            }
            Err(e) => {
                warn!("无法处理 {}: {}", filename, e);
                let message = format!("Failed to process {filename}: {e}");
                response.errors.push(FileError { filename, message });
            }
        }
    }
    Ok(Json(response))
}

/// 分析上传的图片并保存
#[utoipa::path(
    post,
    path = "/analyze",
    request_body(content = AnalyzeForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = AnalyzeResponse),
        (status = 400, description = "没有上传文件"),
        (status = 503, description = "模型仍在加载中"),
    )
)]
pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>> {
    let files = data
        .0
        .file
        .into_iter()
        .map(|file| {
            let filename = file.metadata.file_name.unwrap_or_else(|| "unknown".to_string());
            (filename, file.contents.to_vec())
        })
        .collect();
    analyze_files(&state, files).await
}

/// 分析 base64 编码的图片并保存
#[utoipa::path(
    post,
    path = "/analyze-base64",
    request_body = AnalyzeBase64Request,
    responses(
        (status = 200, body = AnalyzeResponse),
        (status = 400, description = "base64 数据无效"),
        (status = 503, description = "模型仍在加载中"),
    )
)]
pub async fn analyze_base64_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<AnalyzeBase64Request>,
) -> Result<Json<AnalyzeResponse>> {
    state.store.gate().require_initialized()?;
    let bytes = utils::decode_base64(&data.image)
        .map_err(|e| RequestError::BadRequest(format!("Invalid base64 image data: {e}")))?;
    let filename = data.filename.unwrap_or_else(|| "image".to_string());
    analyze_files(&state, vec![(filename, bytes)]).await
}

/// 使用文本搜索相似的图片
#[utoipa::path(
    post,
    path = "/search",
    request_body = SearchRequest,
    responses(
        (status = 200, body = SearchResponse),
        (status = 503, description = "模型仍在加载中，或向量模型不可用"),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    state.store.gate().require_initialized()?;
    let query = data.query.trim();
    if query.is_empty() {
        return Err(RequestError::BadRequest("Query must not be empty".to_string()).into());
    }
    let top_k = state.search.clamp_top_k(data.top_k);

    let start = Instant::now();
    let hits = state.store.search(query, top_k).await?;

    Ok(Json(SearchResponse {
        time: start.elapsed().as_millis() as u64,
        results: hits.into_iter().map(SearchResult::from).collect(),
    }))
}

/// 获取已保存的图片
#[utoipa::path(
    get,
    path = "/image/{id}",
    params(("id" = String, Path, description = "图片 ID")),
    responses(
        (status = 200, body = ImageResponse),
        (status = 404, description = "图片不存在"),
    )
)]
pub async fn get_image_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ImageResponse>> {
    let id = parse_id(&id)?;
    let image = state.store.get(&id).await?;
    Ok(Json(ImageResponse::from(image.as_ref())))
}

/// 根据图片的分析结果回答问题
#[utoipa::path(
    post,
    path = "/ask",
    request_body = AskRequest,
    responses(
        (status = 200, body = AskResponse),
        (status = 404, description = "图片不存在"),
    )
)]
pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<AskRequest>,
) -> Result<Json<AskResponse>> {
    let id = parse_id(&data.image_id)?;
    if data.question.trim().is_empty() {
        return Err(RequestError::BadRequest("Question must not be empty".to_string()).into());
    }
    let image = state.store.get(&id).await?;
    let prompt = Prompt::new(&image, &data.question);

    let answer = spawn_blocking({
        let state = state.clone();
        let prompt = prompt.clone();
        move || state.answerer.answer(&prompt)
    })
    .await??;

    Ok(Json(AskResponse { answer, prompt: prompt.render() }))
}

/// 获取模型加载状态和存储统计
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let readiness = state.store.gate().snapshot();
    let stats = state.store.stats().await;
    Json(HealthResponse {
        initialized: readiness.initialized,
        stages: StagesResponse {
            detection: readiness.detection,
            caption: readiness.caption,
            embedding: readiness.embedding,
        },
        stage_errors: readiness.errors,
        images: stats.images,
        vectors: stats.vectors,
    })
}

/// prometheus 指标
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, body = String, content_type = "text/plain"),
    )
)]
pub async fn metrics_handler() -> Result<impl IntoResponse> {
    let body = metrics::gather_text()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

/// 无法解析的 ID 不可能对应任何图片
fn parse_id(id: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(id).map_err(|_| RequestError::NotFound(format!("image not found: {id}")))?)
}
