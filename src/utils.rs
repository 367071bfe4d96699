use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use indicatif::ProgressStyle;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .expect("invalid progress bar template")
        .progress_chars("#>-")
}

/// 将图片编码为 `data:` URL
pub fn data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// 解码 base64 字符串，允许带 `data:...;base64,` 前缀
pub fn decode_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match input.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => input,
    };
    STANDARD.decode(payload.trim())
}
