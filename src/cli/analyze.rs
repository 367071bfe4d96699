use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use indicatif::ProgressBar;
use log::{info, warn};
use regex::Regex;
use serde_json::{Value, json};
use walkdir::WalkDir;

use crate::analysis::{Analyzer, Stage};
use crate::cli::SubCommandExtend;
use crate::config::{ModelOptions, Opts, OutputFormat, SearchOptions};
use crate::models::ModelSet;
use crate::readiness::ReadinessGate;
use crate::store::{ImageStore, IngestResult, SearchHit};
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct AnalyzeCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 图片文件或图片所在目录
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    /// 扫描目录时使用的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png,gif")]
    pub suffix: String,
    /// 分析完成后使用该文本搜索图片
    #[arg(short, long)]
    pub query: Option<String>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for AnalyzeCommand {
    async fn run(&self, _opts: &Opts) -> anyhow::Result<()> {
        let files = self.collect_files()?;
        info!("共找到 {} 张图片", files.len());

        let gate = Arc::new(ReadinessGate::new());
        let analyzer = Arc::new(Analyzer::new(gate, self.model.dimension as usize));
        analyzer.clone().load(ModelSet::builtin(&self.model)).await;
        for error in analyzer.gate().errors() {
            warn!("{}", error);
        }
        let store = ImageStore::new(analyzer);

        let pb = ProgressBar::new(files.len() as u64).with_style(pb_style());
        let mut outcomes = vec![];
        for path in files {
            pb.set_message(path.display().to_string());
            let outcome = match tokio::fs::read(&path).await {
                Ok(bytes) => store.ingest(bytes).await.map_err(anyhow::Error::from),
                Err(e) => Err(e.into()),
            };
            outcomes.push((path, outcome));
            pb.inc(1);
        }
        pb.finish_and_clear();

        let hits = match &self.query {
            Some(query) => Some(store.search(query, self.search.clamp_top_k(None)).await?),
            None => None,
        };

        match self.output_format {
            OutputFormat::Json => print_json(&outcomes, hits.as_deref())?,
            OutputFormat::Table => print_table(&outcomes, hits.as_deref()),
        }
        Ok(())
    }
}

impl AnalyzeCommand {
    /// 展开目录，按路径排序
    fn collect_files(&self) -> Result<Vec<PathBuf>> {
        let re_suf = Regex::new(&format!("(?i)^({})$", self.suffix.replace(',', "|")))?;
        let mut files = vec![];
        for path in &self.paths {
            if path.is_file() {
                files.push(path.clone());
                continue;
            }
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry?;
                let matched = entry
                    .path()
                    .extension()
                    .is_some_and(|ext| re_suf.is_match(&ext.to_string_lossy()));
                if entry.file_type().is_file() && matched {
                    files.push(entry.into_path());
                }
            }
        }
        Ok(files)
    }
}

type Outcome = (PathBuf, Result<IngestResult>);

fn print_table(outcomes: &[Outcome], hits: Option<&[SearchHit]>) {
    let mut paths = HashMap::new();
    for (path, outcome) in outcomes {
        match outcome {
            Ok(result) => {
                paths.insert(result.id, path);
                let labels = result.detections.iter().map(|d| d.label.as_str()).collect::<Vec<_>>();
                let labels = labels.join(", ");
                println!("[OK] {}\t{}\t{}\t[{}]", path.display(), result.id, result.caption, labels);
                for stage in Stage::ALL {
                    if let Some(error) = result.stage_errors.get(stage) {
                        println!("     {stage}: {error}");
                    }
                }
            }
            Err(e) => println!("[ERR] {}: {}", path.display(), e),
        }
    }

    if let Some(hits) = hits {
        println!();
        for hit in hits {
            let path = paths.get(&hit.id).map(|p| p.display().to_string()).unwrap_or_default();
            println!("{:.4}\t{}\t{}", hit.similarity, hit.id, path);
        }
    }
}

fn print_json(outcomes: &[Outcome], hits: Option<&[SearchHit]>) -> Result<()> {
    let mut paths = HashMap::new();
    let images = outcomes
        .iter()
        .map(|(path, outcome)| match outcome {
            Ok(result) => {
                paths.insert(result.id, path);
                json!({
                    "path": path,
                    "id": result.id,
                    "caption": result.caption,
                    "detections": result.detections,
                    "stageErrors": result.stage_errors,
                    "embedded": result.embedded,
                })
            }
            Err(e) => json!({ "path": path, "error": e.to_string() }),
        })
        .collect::<Vec<_>>();

    let mut output = json!({ "images": images });
    if let Some(hits) = hits {
        let hits = hits
            .iter()
            .map(|hit| {
                json!({
                    "id": hit.id,
                    "similarity": hit.similarity,
                    "path": paths.get(&hit.id),
                    "caption": hit.image.caption,
                })
            })
            .collect::<Vec<Value>>();
        output["search"] = Value::Array(hits);
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
