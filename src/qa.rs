//! 基于已有分析结果的图片问答

use anyhow::Result;

use crate::registry::StoredImage;

/// 根据提示词回答问题
pub trait Answerer: Send + Sync {
    fn answer(&self, prompt: &Prompt) -> Result<String>;
}

/// 问答提示词
#[derive(Debug, Clone)]
pub struct Prompt {
    pub caption: String,
    pub labels: Vec<(String, f32)>,
    pub question: String,
}

impl Prompt {
    pub fn new(image: &StoredImage, question: &str) -> Self {
        Self {
            caption: image.caption.clone(),
            labels: image.detections.iter().map(|d| (d.label.clone(), d.confidence)).collect(),
            question: question.trim().to_string(),
        }
    }

    pub fn context(&self) -> String {
        let labels = self.labels.iter().map(|(label, _)| label.as_str()).collect::<Vec<_>>();
        format!("Image Caption: {}\nDetected Objects: {}", self.caption, labels.join(", "))
    }

    /// 完整的提示词文本
    pub fn render(&self) -> String {
        format!(
            "Based on the following image analysis:\n{}\n\nPlease answer this question: {}\n\nAnswer:",
            self.context(),
            self.question
        )
    }
}

/// 只取回答部分，去掉模型可能重复的提示词
pub fn clean_answer(response: &str) -> String {
    response.rsplit("Answer:").next().unwrap_or(response).trim().to_string()
}

/// 从描述和检测结果中抽取答案，不依赖外部语言模型
pub struct ExtractiveAnswerer;

impl Answerer for ExtractiveAnswerer {
    fn answer(&self, prompt: &Prompt) -> Result<String> {
        let question = prompt.question.to_lowercase();
        let words = question
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>();

        let mentioned = prompt
            .labels
            .iter()
            .filter(|(label, _)| words.contains(&label.to_lowercase().as_str()))
            .collect::<Vec<_>>();

        let answer = if question.starts_with("how many") {
            match prompt.labels.len() {
                0 => "No objects were detected in this image.".to_string(),
                1 => "One object was detected in this image.".to_string(),
                n => format!("{n} objects were detected in this image."),
            }
        } else if !mentioned.is_empty() {
            let found = mentioned
                .iter()
                .map(|(label, confidence)| format!("{label} ({:.0}% confidence)", confidence * 100.))
                .collect::<Vec<_>>();
            format!("Yes, the image contains {}.", found.join(" and "))
        } else if words.iter().any(|w| matches!(*w, "objects" | "detected" | "contain" | "colors"))
        {
            match prompt.labels.is_empty() {
                true => "No objects were detected in this image.".to_string(),
                false => {
                    let labels = prompt.labels.iter().map(|(l, _)| l.as_str()).collect::<Vec<_>>();
                    format!("The image contains {}.", labels.join(", "))
                }
            }
        } else {
            format!("The image shows {}.", prompt.caption)
        };

        Ok(clean_answer(&answer))
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::analysis::{Detection, StageErrors};

    fn stored(caption: &str, labels: &[&str]) -> StoredImage {
        StoredImage {
            id: Uuid::new_v4(),
            raw_bytes: vec![],
            mime_type: "image/png",
            width: 1,
            height: 1,
            hash: String::new(),
            detections: labels
                .iter()
                .map(|l| Detection { label: l.to_string(), confidence: 0.5, bbox: [0.; 4] })
                .collect(),
            caption: caption.to_string(),
            embedding: None,
            stage_errors: StageErrors::default(),
        }
    }

    #[test]
    fn test_render_prompt() {
        let prompt = Prompt::new(&stored("a wide image mostly red", &["red", "white"]), " Is it red? ");
        let text = prompt.render();
        assert!(text.contains("Image Caption: a wide image mostly red"));
        assert!(text.contains("Detected Objects: red, white"));
        assert!(text.contains("Please answer this question: Is it red?"));
        assert!(text.ends_with("Answer:"));
    }

    #[test]
    fn test_clean_answer() {
        assert_eq!(clean_answer("blah\nAnswer:  a cat "), "a cat");
        assert_eq!(clean_answer(" plain "), "plain");
    }

    #[test]
    fn test_answer_mentioned_label() {
        let prompt = Prompt::new(&stored("x", &["red", "white"]), "Is there any red?");
        let answer = ExtractiveAnswerer.answer(&prompt).unwrap();
        assert_eq!(answer, "Yes, the image contains red (50% confidence).");
    }

    #[test]
    fn test_answer_how_many() {
        let prompt = Prompt::new(&stored("x", &["red", "white"]), "How many things are there?");
        assert_eq!(
            ExtractiveAnswerer.answer(&prompt).unwrap(),
            "2 objects were detected in this image."
        );
    }

    #[test]
    fn test_answer_falls_back_to_caption() {
        let prompt = Prompt::new(&stored("a tall image mostly blue", &[]), "What is this?");
        assert_eq!(
            ExtractiveAnswerer.answer(&prompt).unwrap(),
            "The image shows a tall image mostly blue."
        );
    }
}
