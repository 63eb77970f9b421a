//! cc-monitor 二进制入口：本机 Claude Code 会话采集。

mod app;
mod collector;
mod config;
mod hooks;
mod routes;
mod scanner;
mod state;

use toolbox_common::cli::{CliDispatch, dispatch};

const BINARY_NAME: &str = "toolbox-cc-monitor";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env();
    let args = std::env::args().skip(1).collect::<Vec<String>>();
    match dispatch(BINARY_NAME, &args, &config.doctor_entries())? {
        CliDispatch::Run => {}
        CliDispatch::Exit => return Ok(()),
    }

    let _log_runtime = toolbox_common::logging::init("cc-monitor")?;
    app::run(config).await
}
