use std::sync::Arc;

use crate::config::SearchOptions;
use crate::qa::{Answerer, ExtractiveAnswerer};
use crate::store::ImageStore;

/// 应用状态
pub struct AppState {
    /// 图片表和向量索引
    pub store: ImageStore,
    /// 图片问答
    pub answerer: Box<dyn Answerer>,
    /// 搜索配置选项
    pub search: SearchOptions,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(store: ImageStore, search: SearchOptions) -> Arc<Self> {
        Self::with_answerer(store, search, Box::new(ExtractiveAnswerer))
    }

    pub fn with_answerer(
        store: ImageStore,
        search: SearchOptions,
        answerer: Box<dyn Answerer>,
    ) -> Arc<Self> {
        Arc::new(Self { store, answerer, search })
    }
}
