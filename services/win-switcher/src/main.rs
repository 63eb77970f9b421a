//! win-switcher 二进制入口：窗口列表、缩略图与聚焦。

mod app;
mod cache;
mod config;
mod native;
mod routes;
mod state;

use toolbox_common::cli::{CliDispatch, dispatch};

const BINARY_NAME: &str = "toolbox-win-switcher";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env();
    let args = std::env::args().skip(1).collect::<Vec<String>>();
    match dispatch(BINARY_NAME, &args, &config.doctor_entries())? {
        CliDispatch::Run => {}
        CliDispatch::Exit => return Ok(()),
    }

    let _log_runtime = toolbox_common::logging::init("win-switcher")?;
    app::run(config).await
}
