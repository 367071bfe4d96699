use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::analysis::{Detection, StageErrors};
use crate::readiness::StageState;
use crate::registry::StoredImage;
use crate::store::{IngestResult, SearchHit};
use crate::utils::data_url;

/// 分析请求参数
#[derive(TryFromMultipart)]
pub struct AnalyzeRequest {
    #[form_data(limit = "unlimited")]
    pub file: Vec<FieldData<Bytes>>,
}

/// 分析表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct AnalyzeForm {
    /// 上传的图片文件，可以是多张图片
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
}

/// base64 图片分析请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeBase64Request {
    /// base64 编码的图片，可以带 `data:` 前缀
    pub image: String,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    pub id: String,
    /// `data:` URL 形式的原图
    pub image_url: String,
    pub detections: Vec<Detection>,
    pub caption: String,
    /// 各阶段的错误，成功的阶段为 null
    pub stage_errors: StageErrors,
}

impl AnalyzeResult {
    pub fn new(result: IngestResult, image: &StoredImage) -> Self {
        Self {
            id: result.id.to_string(),
            image_url: data_url(image.mime_type, &image.raw_bytes),
            detections: result.detections,
            caption: result.caption,
            stage_errors: result.stage_errors,
        }
    }
}

/// 无法处理的文件
#[derive(Debug, Serialize, ToSchema)]
pub struct FileError {
    pub filename: String,
    pub message: String,
}

/// 分析响应，部分文件失败不影响其他文件
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct AnalyzeResponse {
    pub results: Vec<AnalyzeResult>,
    pub errors: Vec<FileError>,
}

/// 文本搜索请求
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    /// 返回的结果数量，超过服务端上限时会被截断
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    /// 相似度，范围 (0, 1]
    pub similarity: f32,
    pub caption: String,
    pub detections: Vec<Detection>,
    pub image_url: String,
}

impl From<SearchHit> for SearchResult {
    fn from(hit: SearchHit) -> Self {
        Self {
            id: hit.id.to_string(),
            similarity: hit.similarity,
            caption: hit.image.caption.clone(),
            detections: hit.image.detections.clone(),
            image_url: data_url(hit.image.mime_type, &hit.image.raw_bytes),
        }
    }
}

/// 搜索响应
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    /// 搜索耗时，单位为毫秒
    pub time: u64,
    /// 按相似度从高到低排列
    pub results: Vec<SearchResult>,
}

/// 已保存的图片
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub id: String,
    pub image_url: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    /// 图片内容的 blake3 哈希
    pub hash: String,
    pub detections: Vec<Detection>,
    pub caption: String,
    pub embedding: Option<Vec<f32>>,
    pub stage_errors: StageErrors,
}

impl From<&StoredImage> for ImageResponse {
    fn from(image: &StoredImage) -> Self {
        Self {
            id: image.id.to_string(),
            image_url: data_url(image.mime_type, &image.raw_bytes),
            mime_type: image.mime_type.to_string(),
            width: image.width,
            height: image.height,
            hash: image.hash.clone(),
            detections: image.detections.clone(),
            caption: image.caption.clone(),
            embedding: image.embedding.clone(),
            stage_errors: image.stage_errors.clone(),
        }
    }
}

/// 图片问答请求
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub image_id: String,
    pub question: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AskResponse {
    pub answer: String,
    /// 生成答案时使用的提示词
    pub prompt: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StagesResponse {
    pub detection: StageState,
    pub caption: StageState,
    pub embedding: StageState,
}

/// 服务状态
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// 所有模型是否都已加载结束（无论成功与否）
    pub initialized: bool,
    pub stages: StagesResponse,
    /// 模型加载失败的原因
    pub stage_errors: Vec<String>,
    pub images: usize,
    pub vectors: usize,
}
