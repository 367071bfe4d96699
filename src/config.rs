use clap::{Parser, Subcommand, ValueEnum};

use crate::analysis::Stage;
use crate::cli::*;

#[derive(Parser, Debug, Clone)]
pub struct ModelOptions {
    /// 向量维度
    #[arg(long, value_name = "D", default_value_t = 512, value_parser = clap::value_parser!(u32).range(1..))]
    pub dimension: u32,
    /// 颜色占比不低于该值时才会被检测为一个目标
    #[arg(long, value_name = "RATIO", default_value_t = 0.05)]
    pub min_coverage: f32,
    /// 每张图片最多保留的检测结果数量
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub max_detections: usize,
    /// 禁用指定阶段的模型，该阶段会被标记为加载失败，可以重复使用
    #[arg(long, value_name = "STAGE", value_enum)]
    pub disable: Vec<Stage>,
}

impl ModelOptions {
    pub fn is_disabled(&self, stage: Stage) -> bool {
        self.disable.contains(&stage)
    }
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self { dimension: 512, min_coverage: 0.05, max_detections: 10, disable: vec![] }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 默认返回的结果数量
    #[arg(long, value_name = "K", default_value_t = 5)]
    pub top_k: usize,
    /// 单次搜索最多返回的结果数量，超过时会被截断
    #[arg(long, value_name = "K", default_value_t = 100)]
    pub max_top_k: usize,
}

impl SearchOptions {
    /// 将请求的数量限制在 [1, max_top_k] 内，未指定时使用默认值
    pub fn clamp_top_k(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.top_k).clamp(1, self.max_top_k.max(1))
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { top_k: 5, max_top_k: 100 }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "insightd", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 启动 HTTP 分析服务
    Server(ServerCommand),
    /// 分析本地图片，并可以在分析结果中搜索
    Analyze(AnalyzeCommand),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_top_k() {
        let opts = SearchOptions { top_k: 5, max_top_k: 10 };
        assert_eq!(opts.clamp_top_k(None), 5);
        assert_eq!(opts.clamp_top_k(Some(0)), 1);
        assert_eq!(opts.clamp_top_k(Some(3)), 3);
        assert_eq!(opts.clamp_top_k(Some(1000)), 10);
    }

    #[test]
    fn test_parse_disable() {
        let opts = Opts::parse_from([
            "insightd",
            "server",
            "--disable",
            "caption",
            "--disable",
            "embedding",
            "--dimension",
            "64",
        ]);
        let SubCommand::Server(server) = opts.subcmd else { panic!("expected server") };
        assert!(server.model.is_disabled(Stage::Caption));
        assert!(server.model.is_disabled(Stage::Embedding));
        assert!(!server.model.is_disabled(Stage::Detection));
        assert_eq!(server.model.dimension, 64);
    }

    #[test]
    fn test_reject_zero_dimension() {
        let result = Opts::try_parse_from(["insightd", "server", "--dimension", "0"]);
        assert!(result.is_err());
    }
}
