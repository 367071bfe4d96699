use uuid::Uuid;

use crate::analysis::StageError;

/// 图片存储相关的错误
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// 图片无法解码，整张图片被丢弃，不会生成 ID
    #[error("failed to decode image: {0}")]
    HardFailure(String),
    /// 模型仍在加载中，或者所需的模型不可用
    #[error("{0}")]
    NotReady(String),
    #[error("image not found: {0}")]
    NotFound(Uuid),
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("vector contains non-finite values")]
    InvalidVector,
    #[error("internal error: {0}")]
    Internal(String),
    /// 查询阶段的模型调用失败
    #[error(transparent)]
    Stage(#[from] StageError),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
