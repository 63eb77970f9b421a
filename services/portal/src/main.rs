//! portal 二进制入口：工具注册表与存活引擎。

mod app;
mod config;
mod registry;
mod routes;
mod state;

use toolbox_common::cli::{CliDispatch, dispatch};

const BINARY_NAME: &str = "toolbox-portal";

/// 启动 portal 服务。
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env();
    let args = std::env::args().skip(1).collect::<Vec<String>>();
    match dispatch(BINARY_NAME, &args, &config.doctor_entries())? {
        CliDispatch::Run => {}
        CliDispatch::Exit => return Ok(()),
    }

    let _log_runtime = toolbox_common::logging::init("portal")?;
    app::run(config).await
}
