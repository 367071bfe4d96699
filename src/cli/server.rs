use std::sync::Arc;

use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use crate::analysis::Analyzer;
use crate::cli::SubCommandExtend;
use crate::config::{ModelOptions, SearchOptions};
use crate::models::ModelSet;
use crate::readiness::ReadinessGate;
use crate::store::ImageStore;
use crate::{Opts, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// 请求体大小限制，单位为 MiB
    #[arg(long, value_name = "MIB", default_value_t = 10)]
    pub body_limit: usize,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, _opts: &Opts) -> anyhow::Result<()> {
        let gate = Arc::new(ReadinessGate::new());
        let analyzer = Arc::new(Analyzer::new(gate, self.model.dimension as usize));

        // 模型在后台加载，加载完成前请求会返回 503
        let models = ModelSet::builtin(&self.model);
        tokio::spawn(analyzer.clone().load(models));

        let store = ImageStore::new(analyzer);
        let state = server::AppState::new(store, self.search.clone());
        let app = server::create_app(state, self.body_limit * 1024 * 1024);

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
