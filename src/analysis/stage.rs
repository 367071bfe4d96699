use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 单个阶段的结果，失败不会影响其他阶段
pub type StageResult<T> = Result<T, StageError>;

/// 三个相互独立的分析阶段
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// 目标检测
    Detection,
    /// 图片描述
    Caption,
    /// 图片向量
    Embedding,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Detection, Stage::Caption, Stage::Embedding];

    pub fn name(self) -> &'static str {
        match self {
            Self::Detection => "detection",
            Self::Caption => "caption",
            Self::Embedding => "embedding",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{stage} stage failed: {message}")]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self { stage, message: message.into() }
    }

    /// 模型尚未就绪时，阶段直接跳过
    pub fn not_initialized(stage: Stage) -> Self {
        Self::new(stage, format!("{stage} model not initialized"))
    }
}

/// 每个阶段的错误信息，`None` 表示该阶段成功
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default, PartialEq)]
pub struct StageErrors {
    pub detection: Option<String>,
    pub caption: Option<String>,
    pub embedding: Option<String>,
}

impl StageErrors {
    pub fn get(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Detection => self.detection.as_deref(),
            Stage::Caption => self.caption.as_deref(),
            Stage::Embedding => self.embedding.as_deref(),
        }
    }

    pub fn set(&mut self, stage: Stage, message: String) {
        let slot = match stage {
            Stage::Detection => &mut self.detection,
            Stage::Caption => &mut self.caption,
            Stage::Embedding => &mut self.embedding,
        };
        *slot = Some(message);
    }

    pub fn is_empty(&self) -> bool {
        Stage::ALL.iter().all(|&stage| self.get(stage).is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_initialized_message() {
        let err = StageError::not_initialized(Stage::Caption);
        assert_eq!(err.message, "caption model not initialized");
        assert_eq!(err.stage, Stage::Caption);
    }

    #[test]
    fn test_stage_errors_set_get() {
        let mut errors = StageErrors::default();
        assert!(errors.is_empty());

        errors.set(Stage::Embedding, "boom".to_string());
        assert_eq!(errors.get(Stage::Embedding), Some("boom"));
        assert_eq!(errors.get(Stage::Detection), None);
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_stage_errors_serialize() {
        let mut errors = StageErrors::default();
        errors.set(Stage::Detection, "x".to_string());
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["detection"], "x");
        assert!(json["caption"].is_null());
    }
}
