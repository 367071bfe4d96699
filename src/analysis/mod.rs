//! 分析流水线：把检测、描述、向量三个阶段包装成统一的「结果或错误」形式

mod stage;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::spawn_blocking;
use utoipa::ToSchema;

pub use self::stage::*;
use crate::decode::DecodedImage;
use crate::index::validate_vector;
use crate::models::{Captioner, Detector, Embedder, ModelSet};
use crate::readiness::ReadinessGate;

/// 描述生成失败时使用的占位描述
pub const CAPTION_UNAVAILABLE: &str = "Failed to generate caption";

/// 检测到的目标
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    /// 置信度，范围 [0, 1]
    pub confidence: f32,
    /// `[x1, y1, x2, y2]`
    #[schema(value_type = Vec<f32>)]
    pub bbox: [f32; 4],
}

/// 一张图片三个阶段的分析结果
#[derive(Debug, Clone)]
pub struct Analysis {
    pub detections: StageResult<Vec<Detection>>,
    pub caption: StageResult<String>,
    pub embedding: StageResult<Vec<f32>>,
}

impl Analysis {
    pub fn stage_errors(&self) -> StageErrors {
        let mut errors = StageErrors::default();
        if let Err(e) = &self.detections {
            errors.set(e.stage, e.message.clone());
        }
        if let Err(e) = &self.caption {
            errors.set(e.stage, e.message.clone());
        }
        if let Err(e) = &self.embedding {
            errors.set(e.stage, e.message.clone());
        }
        errors
    }
}

/// 分析流水线
///
/// 每个阶段只有在模型就绪时才会被调用，否则直接记为 `"<stage> model not initialized"`。
pub struct Analyzer {
    gate: Arc<ReadinessGate>,
    dimension: usize,
    detector: OnceLock<Arc<dyn Detector>>,
    captioner: OnceLock<Arc<dyn Captioner>>,
    embedder: OnceLock<Arc<dyn Embedder>>,
}

impl Analyzer {
    /// # Arguments
    ///
    /// * `gate` - 模型就绪状态
    /// * `dimension` - 向量维数，向量模型的输出必须与之一致
    pub fn new(gate: Arc<ReadinessGate>, dimension: usize) -> Self {
        Self {
            gate,
            dimension,
            detector: OnceLock::new(),
            captioner: OnceLock::new(),
            embedder: OnceLock::new(),
        }
    }

    pub fn gate(&self) -> &Arc<ReadinessGate> {
        &self.gate
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 在阻塞线程池中并发加载三个模型，全部结束后 `initialized` 变为 true
    pub async fn load(self: Arc<Self>, models: ModelSet) {
        let ModelSet { detector, captioner, embedder } = models;
        let start = Instant::now();

        let this = self.clone();
        let detector = spawn_blocking(move || {
            this.load_stage(Stage::Detection, || this.install(&this.detector, detector()?))
        });
        let this = self.clone();
        let captioner = spawn_blocking(move || {
            this.load_stage(Stage::Caption, || this.install(&this.captioner, captioner()?))
        });
        let this = self.clone();
        let embedder = spawn_blocking(move || {
            this.load_stage(Stage::Embedding, || this.install_embedder(embedder()?))
        });

        let (r1, r2, r3) = tokio::join!(detector, captioner, embedder);
        for (stage, r) in Stage::ALL.into_iter().zip([r1, r2, r3]) {
            if let Err(e) = r {
                // load_stage 内部已经捕获 panic，这里只会是运行时被关闭之类的情况
                self.gate.mark_failed(stage, format!("Failed to load {stage} model: {e}"));
            }
        }

        info!("模型加载结束，耗时 {:.2}s", start.elapsed().as_secs_f32());
    }

    /// 在当前线程中依次加载三个模型
    pub fn load_blocking(&self, models: ModelSet) {
        let ModelSet { detector, captioner, embedder } = models;
        self.load_stage(Stage::Detection, || self.install(&self.detector, detector()?));
        self.load_stage(Stage::Caption, || self.install(&self.captioner, captioner()?));
        self.load_stage(Stage::Embedding, || self.install_embedder(embedder()?));
    }

    fn load_stage(&self, stage: Stage, f: impl FnOnce() -> Result<()>) {
        if !self.gate.begin_loading(stage) {
            return;
        }
        info!("正在加载 {} 模型", stage);
        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(f))
            .unwrap_or_else(|payload| Err(anyhow!(panic_message(payload.as_ref()))));
        match result {
            Ok(()) => {
                info!("{} 模型加载成功，耗时 {:.2}s", stage, start.elapsed().as_secs_f32());
                self.gate.mark_ready(stage);
            }
            Err(e) => {
                let message = format!("Failed to load {stage} model: {e:#}");
                error!("{}", message);
                self.gate.mark_failed(stage, message);
            }
        }
    }

    fn install<T: ?Sized>(&self, slot: &OnceLock<Arc<T>>, model: Arc<T>) -> Result<()> {
        slot.set(model).map_err(|_| anyhow!("model already loaded"))
    }

    fn install_embedder(&self, model: Arc<dyn Embedder>) -> Result<()> {
        if model.dimension() != self.dimension {
            return Err(anyhow!(
                "embedder outputs {} dimensions, index expects {}",
                model.dimension(),
                self.dimension
            ));
        }
        self.install(&self.embedder, model)
    }

    /// 对图片执行三个阶段，单个阶段的失败不会影响其他阶段
    pub fn analyze(&self, image: &DecodedImage) -> Analysis {
        let pixels = &image.pixels;

        let detections = self.run_stage(Stage::Detection, &self.detector, |m| m.detect(pixels)).map(
            |detections| {
                detections
                    .into_iter()
                    .map(|d| Detection { confidence: d.confidence.clamp(0., 1.), ..d })
                    .collect::<Vec<_>>()
            },
        );

        let caption = self
            .run_stage(Stage::Caption, &self.captioner, |m| m.caption(pixels))
            .and_then(|caption| match caption.trim() {
                "" => Err(StageError::new(Stage::Caption, "Empty caption result")),
                caption => Ok(caption.to_string()),
            });

        let embedding = self
            .run_stage(Stage::Embedding, &self.embedder, |m| m.embed_image(pixels))
            .and_then(|v| self.check_vector(v));

        let analysis = Analysis { detections, caption, embedding };
        debug!("分析结果: {:?}", analysis.stage_errors());
        analysis
    }

    /// 把查询文本编码到图片所在的向量空间
    pub fn embed_text(&self, text: &str) -> StageResult<Vec<f32>> {
        self.run_stage(Stage::Embedding, &self.embedder, |m| m.embed_text(text))
            .and_then(|v| self.check_vector(v))
    }

    fn check_vector(&self, vector: Vec<f32>) -> StageResult<Vec<f32>> {
        match validate_vector(self.dimension, &vector) {
            Ok(()) => Ok(vector),
            Err(e) => Err(StageError::new(Stage::Embedding, e.to_string())),
        }
    }

    fn run_stage<M: ?Sized, T>(
        &self,
        stage: Stage,
        slot: &OnceLock<Arc<M>>,
        f: impl FnOnce(&M) -> Result<T>,
    ) -> StageResult<T> {
        let model = match slot.get() {
            Some(model) if self.gate.is_ready(stage) => model,
            _ => return Err(StageError::not_initialized(stage)),
        };
        match panic::catch_unwind(AssertUnwindSafe(|| f(model.as_ref()))) {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => {
                warn!("{} 阶段失败: {:#}", stage, e);
                Err(StageError::new(stage, format!("{e:#}")))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("{} 阶段 panic: {}", stage, message);
                Err(StageError::new(stage, message))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "model panicked".to_string()
    }
}
