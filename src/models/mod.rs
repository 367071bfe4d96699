//! 分析阶段依赖的模型
//!
//! 模型对核心逻辑来说是黑盒：输入解码后的图片（或文本），输出检测结果、描述或向量。
//! 所有调用都是同步阻塞的，调用方负责把它们放到阻塞线程池中执行。

mod caption;
mod hashing;
pub mod palette;
mod palette_detector;

use std::sync::Arc;

use anyhow::{Result, anyhow};
use image::DynamicImage;

pub use self::caption::SummaryCaptioner;
pub use self::hashing::HashingEmbedder;
pub use self::palette_detector::PaletteDetector;
use crate::analysis::{Detection, Stage};
use crate::config::ModelOptions;

/// 目标检测模型
pub trait Detector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>>;
}

/// 图片描述模型
pub trait Captioner: Send + Sync {
    fn caption(&self, image: &DynamicImage) -> Result<String>;
}

/// 向量模型，需要同时支持图片和文本，并将两者映射到同一个向量空间
pub trait Embedder: Send + Sync {
    /// 输出向量的维数
    fn dimension(&self) -> usize;

    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>>;

    fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
}

pub type DetectorLoader = Box<dyn FnOnce() -> Result<Arc<dyn Detector>> + Send>;
pub type CaptionerLoader = Box<dyn FnOnce() -> Result<Arc<dyn Captioner>> + Send>;
pub type EmbedderLoader = Box<dyn FnOnce() -> Result<Arc<dyn Embedder>> + Send>;

/// 每个阶段各自的模型加载函数，加载失败只影响对应的阶段
pub struct ModelSet {
    pub detector: DetectorLoader,
    pub captioner: CaptionerLoader,
    pub embedder: EmbedderLoader,
}

impl ModelSet {
    /// 内置的模型实现，不需要下载任何权重
    pub fn builtin(opts: &ModelOptions) -> Self {
        let detector: DetectorLoader = if opts.is_disabled(Stage::Detection) {
            disabled_loader(Stage::Detection)
        } else {
            let (min_coverage, max_detections) = (opts.min_coverage, opts.max_detections);
            Box::new(move || {
                Ok(Arc::new(PaletteDetector::new(min_coverage, max_detections)) as Arc<dyn Detector>)
            })
        };

        let captioner: CaptionerLoader = if opts.is_disabled(Stage::Caption) {
            disabled_loader(Stage::Caption)
        } else {
            Box::new(|| Ok(Arc::new(SummaryCaptioner) as Arc<dyn Captioner>))
        };

        let embedder: EmbedderLoader = if opts.is_disabled(Stage::Embedding) {
            disabled_loader(Stage::Embedding)
        } else {
            let dimension = opts.dimension as usize;
            Box::new(move || Ok(Arc::new(HashingEmbedder::new(dimension)) as Arc<dyn Embedder>))
        };

        Self { detector, captioner, embedder }
    }
}

fn disabled_loader<T: ?Sized + 'static>(
    stage: Stage,
) -> Box<dyn FnOnce() -> Result<Arc<T>> + Send> {
    Box::new(move || Err(anyhow!("{stage} model disabled by configuration")))
}
