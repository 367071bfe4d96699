use anyhow::Result;
use image::DynamicImage;

use super::{Captioner, palette};

/// 颜色需要达到的覆盖率才会出现在描述中
const CAPTION_COVERAGE: f32 = 0.2;

/// 根据图片方向和主要颜色生成模板描述
pub struct SummaryCaptioner;

impl Captioner for SummaryCaptioner {
    fn caption(&self, image: &DynamicImage) -> Result<String> {
        let palette = palette::analyze(image);
        let orientation = palette.orientation();
        let mut colors = palette
            .regions
            .iter()
            .filter(|region| region.coverage >= CAPTION_COVERAGE)
            .map(|region| region.name);

        let caption = match (colors.next(), colors.next()) {
            (Some(first), Some(second)) => {
                format!("a {orientation} image mostly {first} and {second}")
            }
            (Some(first), None) => format!("a {orientation} image mostly {first}"),
            _ => format!("a {orientation} image with mixed colors"),
        };
        Ok(caption)
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    #[test]
    fn test_caption_single_color() {
        let img = RgbImage::from_pixel(10, 30, Rgb([20, 40, 220]));
        let caption = SummaryCaptioner.caption(&DynamicImage::ImageRgb8(img)).unwrap();
        assert_eq!(caption, "a tall image mostly blue");
    }

    #[test]
    fn test_caption_two_colors() {
        let img = RgbImage::from_fn(20, 20, |x, _| {
            if x < 12 { Rgb([230, 20, 20]) } else { Rgb([255, 255, 255]) }
        });
        let caption = SummaryCaptioner.caption(&DynamicImage::ImageRgb8(img)).unwrap();
        assert_eq!(caption, "a square image mostly red and white");
    }
}
