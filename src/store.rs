//! 图片表与向量索引的协调者
//!
//! 所有修改都经过同一把写锁：先追加图片表，再在向量生成成功时追加向量索引，
//! 同时记录「向量位置 -> 图片 ID」的映射。由于向量失败的图片不占用索引位置，
//! 搜索结果必须通过这个映射而不是图片表的位置来还原图片 ID。

use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info};
use tokio::sync::RwLock;
use tokio::task::spawn_blocking;
use uuid::Uuid;

use crate::analysis::{Analyzer, CAPTION_UNAVAILABLE, Detection, Stage, StageErrors};
use crate::decode::decode;
use crate::error::{Result, StoreError};
use crate::index::VectorIndex;
use crate::metrics;
use crate::readiness::ReadinessGate;
use crate::registry::{ImageRegistry, NewImage, StoredImage};

/// 入库结果
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub id: Uuid,
    pub detections: Vec<Detection>,
    pub caption: String,
    pub stage_errors: StageErrors,
    /// 是否已加入向量索引
    pub embedded: bool,
}

/// 单条搜索结果
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: Uuid,
    /// 相似度，范围 (0, 1]
    pub similarity: f32,
    pub distance: f32,
    pub image: Arc<StoredImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub images: usize,
    pub vectors: usize,
}

struct StoreInner {
    registry: ImageRegistry,
    index: VectorIndex,
    /// 第 p 个元素为向量索引中第 p 个向量所属的图片 ID
    vector_ids: Vec<Uuid>,
}

pub struct ImageStore {
    analyzer: Arc<Analyzer>,
    inner: Arc<RwLock<StoreInner>>,
}

impl ImageStore {
    pub fn new(analyzer: Arc<Analyzer>) -> Self {
        let inner = StoreInner {
            registry: ImageRegistry::new(),
            index: VectorIndex::new(analyzer.dimension()),
            vector_ids: vec![],
        };
        Self { analyzer, inner: Arc::new(RwLock::new(inner)) }
    }

    pub fn analyzer(&self) -> &Arc<Analyzer> {
        &self.analyzer
    }

    pub fn gate(&self) -> &Arc<ReadinessGate> {
        self.analyzer.gate()
    }

    /// 分析并保存一张图片
    ///
    /// 模型调用在锁外进行；图片表和向量索引的追加在同一个写锁内完成。
    pub async fn ingest(&self, raw_bytes: Vec<u8>) -> Result<IngestResult> {
        self.gate().require_initialized()?;

        let analyzer = self.analyzer.clone();
        let prepared = spawn_blocking(move || -> Result<_> {
            let image = decode(&raw_bytes)?;
            let analysis = analyzer.analyze(&image);
            let hash = blake3::hash(&raw_bytes).to_hex().to_string();
            Ok((image.mime_type(), image.width(), image.height(), hash, analysis, raw_bytes))
        })
        .await
        .map_err(|e| StoreError::HardFailure(format!("image decoder crashed: {e}")))?;

        let (mime_type, width, height, hash, analysis, raw_bytes) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                metrics::inc_hard_failure_count();
                return Err(e);
            }
        };

        let stage_errors = analysis.stage_errors();
        for stage in Stage::ALL {
            if stage_errors.get(stage).is_some() {
                metrics::inc_stage_failure_count(stage.name());
            }
        }

        let detections = analysis.detections.unwrap_or_default();
        let caption = analysis.caption.unwrap_or_else(|_| CAPTION_UNAVAILABLE.to_string());
        let embedding = analysis.embedding.ok();
        let image = NewImage {
            raw_bytes,
            mime_type,
            width,
            height,
            hash,
            detections: detections.clone(),
            caption: caption.clone(),
            embedding: embedding.clone(),
            stage_errors: stage_errors.clone(),
        };

        let (id, position, total) = {
            let mut inner = self.inner.write().await;
            // 先插入向量：失败时不会修改任何状态
            let position = match &embedding {
                Some(vector) => Some(inner.index.insert(vector)?),
                None => None,
            };
            let id = inner.registry.append(image);
            if position.is_some() {
                inner.vector_ids.push(id);
            }
            debug_assert_eq!(inner.vector_ids.len(), inner.index.len());
            (id, position, inner.index.len())
        };

        metrics::inc_ingest_count(position.is_some());
        metrics::set_index_size(total);
        match position {
            Some(position) => info!("图片 {} 已入库，向量位置 {}", id, position),
            None => info!("图片 {} 已入库，未生成向量: {:?}", id, stage_errors.embedding),
        }

        Ok(IngestResult { id, detections, caption, stage_errors, embedded: position.is_some() })
    }

    /// 使用文本搜索相似图片，按相似度从高到低排列
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        self.gate().require_initialized()?;
        if !self.gate().is_ready(Stage::Embedding) {
            return Err(StoreError::NotReady(format!("{} model not initialized", Stage::Embedding)));
        }

        let start = Instant::now();
        let analyzer = self.analyzer.clone();
        let text = query.to_string();
        let vector = spawn_blocking(move || analyzer.embed_text(&text))
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))??;

        let inner = self.inner.clone().read_owned().await;
        let hits = spawn_blocking(move || -> Result<_> {
            let neighbors = inner.index.search_k_nearest(&vector, top_k)?;
            let hits = neighbors
                .into_iter()
                .filter_map(|neighbor| {
                    let image = inner
                        .vector_ids
                        .get(neighbor.position)
                        .and_then(|id| inner.registry.get(id));
                    if image.is_none() {
                        error!("向量位置 {} 没有对应的图片", neighbor.position);
                    }
                    image.map(|image| SearchHit {
                        id: image.id,
                        similarity: neighbor.similarity(),
                        distance: neighbor.distance,
                        image,
                    })
                })
                .collect::<Vec<_>>();
            Ok(hits)
        })
        .await
        .map_err(|e| StoreError::Internal(e.to_string()))??;

        let elapsed = start.elapsed().as_secs_f32();
        metrics::observe_search_duration(elapsed);
        debug!("搜索 {:?} 返回 {} 条结果，耗时 {:.2}ms", query, hits.len(), elapsed * 1000.);

        Ok(hits)
    }

    pub async fn get(&self, id: &Uuid) -> Result<Arc<StoredImage>> {
        self.inner.read().await.registry.get(id).ok_or(StoreError::NotFound(*id))
    }

    /// 按插入顺序返回所有图片
    pub async fn list(&self) -> Vec<Arc<StoredImage>> {
        self.inner.read().await.registry.list_ordered().cloned().collect()
    }

    /// 按向量位置返回每个向量所属的图片 ID
    pub async fn vector_ids(&self) -> Vec<Uuid> {
        self.inner.read().await.vector_ids.clone()
    }

    pub async fn stats(&self) -> StoreStats {
        let inner = self.inner.read().await;
        StoreStats { images: inner.registry.len(), vectors: inner.index.len() }
    }
}
