use image::{DynamicImage, ImageFormat};

use crate::error::{Result, StoreError};

/// 允许上传的图片格式
const SUPPORTED_FORMATS: [ImageFormat; 5] =
    [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Gif, ImageFormat::WebP, ImageFormat::Bmp];

/// 解码后的图片
pub struct DecodedImage {
    pub pixels: DynamicImage,
    pub format: ImageFormat,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// 从内存中解码图片，无法识别或者不支持的格式视为 `HardFailure`
pub fn decode(bytes: &[u8]) -> Result<DecodedImage> {
    if bytes.is_empty() {
        return Err(StoreError::HardFailure("empty file".to_string()));
    }
    let format =
        image::guess_format(bytes).map_err(|e| StoreError::HardFailure(e.to_string()))?;
    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(StoreError::HardFailure(format!("Unsupported image format: {format:?}")));
    }
    let pixels = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| StoreError::HardFailure(e.to_string()))?;
    if pixels.width() == 0 || pixels.height() == 0 {
        return Err(StoreError::HardFailure("image has no pixels".to_string()));
    }
    Ok(DecodedImage { pixels, format })
}
