use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;
use serde_json::json;

use crate::error::StoreError;

/// 请求本身有问题，或请求的资源不存在
#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
}

/// API错误类型
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        if let Some(e) = self.0.downcast_ref::<StoreError>() {
            return match e {
                StoreError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::HardFailure(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }
        match self.0.downcast_ref::<RequestError>() {
            Some(RequestError::BadRequest(_)) => StatusCode::BAD_REQUEST,
            Some(RequestError::NotFound(_)) => StatusCode::NOT_FOUND,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!("请求处理失败: {:#}", self.0);
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let status = |e: anyhow::Error| AppError(e).status();
        assert_eq!(status(StoreError::NotReady("x".into()).into()), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(StoreError::NotFound(Uuid::nil()).into()), StatusCode::NOT_FOUND);
        assert_eq!(status(StoreError::HardFailure("x".into()).into()), StatusCode::BAD_REQUEST);
        assert_eq!(status(StoreError::InvalidVector.into()), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status(RequestError::BadRequest("x".into()).into()), StatusCode::BAD_REQUEST);
        assert_eq!(status(RequestError::NotFound("x".into()).into()), StatusCode::NOT_FOUND);
        assert_eq!(status(anyhow::anyhow!("boom")), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
