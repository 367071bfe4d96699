use anyhow::Result;
use image::DynamicImage;

use super::{Detector, palette};
use crate::analysis::Detection;

/// 基于调色板的检测器，每种覆盖率足够高的颜色视为一个目标
pub struct PaletteDetector {
    min_coverage: f32,
    max_detections: usize,
}

impl PaletteDetector {
    pub fn new(min_coverage: f32, max_detections: usize) -> Self {
        Self { min_coverage, max_detections }
    }
}

impl Detector for PaletteDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let detections = palette::analyze(image)
            .regions
            .into_iter()
            .filter(|region| region.coverage >= self.min_coverage)
            .take(self.max_detections)
            .map(|region| Detection {
                label: region.name.to_string(),
                confidence: region.coverage,
                bbox: region.bbox,
            })
            .collect();
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn striped() -> DynamicImage {
        // 70% 黄色，28% 绿色，2% 黑色
        let img = RgbImage::from_fn(100, 10, |x, _| match x {
            0..70 => Rgb([240, 230, 20]),
            70..98 => Rgb([20, 200, 40]),
            _ => Rgb([0, 0, 0]),
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_detect_filters_by_coverage() {
        let detections = PaletteDetector::new(0.05, 10).detect(&striped()).unwrap();
        let labels = detections.iter().map(|d| d.label.as_str()).collect::<Vec<_>>();
        assert_eq!(labels, ["yellow", "green"]);
        assert!((detections[0].confidence - 0.7).abs() < 1e-6);
        assert_eq!(detections[1].bbox, [70., 0., 98., 10.]);
    }

    #[test]
    fn test_detect_limit() {
        let detections = PaletteDetector::new(0.0, 1).detect(&striped()).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "yellow");
    }
}
