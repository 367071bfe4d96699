use clap::Parser;
use insightd::Opts;
use insightd::cli::SubCommandExtend;
use insightd::config::SubCommand;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Server(config) => config.run(&opts).await,
        SubCommand::Analyze(config) => config.run(&opts).await,
    }
}
