use anyhow::Result;
use image::DynamicImage;

use super::{Embedder, palette};

/// 不参与向量计算的常见词
const STOP_WORDS: [&str; 14] = [
    "a", "an", "the", "of", "with", "and", "in", "on", "image", "images", "photo", "picture",
    "show", "me",
];

/// 图片方向词在图片向量中的权重
const ORIENTATION_WEIGHT: f32 = 0.25;

/// 特征哈希向量模型
///
/// 文本和图片都被转换为词，再通过 blake3 哈希到固定维数的向量上，最后做 L2 归一化。
/// 图片的词来自调色板颜色名（按覆盖率加权）和图片方向，所以 "red" 这样的查询会靠近红色图片。
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn accumulate(&self, vector: &mut [f32], token: &str, weight: f32) {
        let hash = blake3::hash(token.as_bytes());
        let bytes = hash.as_bytes();
        let mut head = [0u8; 8];
        head.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(head) % self.dimension as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1. } else { -1. };
        vector[bucket] += sign * weight;
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let palette = palette::analyze(image);
        let mut vector = vec![0.; self.dimension];
        for region in &palette.regions {
            self.accumulate(&mut vector, region.name, region.coverage);
        }
        self.accumulate(&mut vector, palette.orientation(), ORIENTATION_WEIGHT);
        normalize(&mut vector);
        Ok(vector)
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.; self.dimension];
        for token in tokenize(text) {
            self.accumulate(&mut vector, &token, 1.);
        }
        normalize(&mut vector);
        Ok(vector)
    }
}

/// 小写化并切分为词，同时合并常见的同义颜色词
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .map(|token| match token.as_str() {
            "grey" => "gray".to_string(),
            "violet" => "purple".to_string(),
            "magenta" => "pink".to_string(),
            "landscape" | "horizontal" => "wide".to_string(),
            "portrait" | "vertical" => "tall".to_string(),
            _ => token,
        })
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0. {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}
