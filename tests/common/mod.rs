#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Result, bail};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use insightd::analysis::{Analyzer, Detection};
use insightd::models::*;
use insightd::readiness::ReadinessGate;
use insightd::store::ImageStore;

pub const DIMENSION: usize = 64;

pub const RED: [u8; 3] = [220, 20, 20];
pub const BLUE: [u8; 3] = [20, 40, 220];
pub const GREEN: [u8; 3] = [30, 200, 40];

/// 纯色 PNG 图片
pub fn png(rgb: [u8; 3], width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)));
    let mut bytes = Cursor::new(vec![]);
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

/// 宽度为 13 的图片无法生成向量，其余与 [`HashingEmbedder`] 相同
pub struct FlakyEmbedder(pub HashingEmbedder);

pub const FLAKY_WIDTH: u32 = 13;

impl Embedder for FlakyEmbedder {
    fn dimension(&self) -> usize {
        self.0.dimension()
    }

    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        if image.width() == FLAKY_WIDTH {
            bail!("embedding backend unavailable");
        }
        self.0.embed_image(image)
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.0.embed_text(text)
    }
}

/// 声明的维数正确，但图片向量少一维的向量模型
pub struct TruncatingEmbedder(pub HashingEmbedder);

impl Embedder for TruncatingEmbedder {
    fn dimension(&self) -> usize {
        self.0.dimension()
    }

    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let mut vector = self.0.embed_image(image)?;
        vector.pop();
        Ok(vector)
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.0.embed_text(text)
    }
}

/// 调用时直接 panic 的检测模型
pub struct PanickingDetector;

impl Detector for PanickingDetector {
    fn detect(&self, _image: &DynamicImage) -> Result<Vec<Detection>> {
        panic!("detector crashed")
    }
}

pub fn models(
    detector: Arc<dyn Detector>,
    captioner: Arc<dyn Captioner>,
    embedder: Arc<dyn Embedder>,
) -> ModelSet {
    ModelSet {
        detector: Box::new(move || Ok(detector)),
        captioner: Box::new(move || Ok(captioner)),
        embedder: Box::new(move || Ok(embedder)),
    }
}

pub fn builtin_models() -> ModelSet {
    models(
        Arc::new(PaletteDetector::new(0.05, 10)),
        Arc::new(SummaryCaptioner),
        Arc::new(HashingEmbedder::new(DIMENSION)),
    )
}

/// 模型已经加载完成的存储
pub fn loaded_store(models: ModelSet) -> ImageStore {
    let analyzer = Analyzer::new(Arc::new(ReadinessGate::new()), DIMENSION);
    analyzer.load_blocking(models);
    assert!(analyzer.gate().is_initialized());
    ImageStore::new(Arc::new(analyzer))
}

/// 模型尚未加载的存储
pub fn unloaded_store() -> ImageStore {
    ImageStore::new(Arc::new(Analyzer::new(Arc::new(ReadinessGate::new()), DIMENSION)))
}
