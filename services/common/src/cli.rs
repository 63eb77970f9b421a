//! 服务 CLI 分发：`run`、`doctor`、`version`、`help`。

use anyhow::anyhow;
use serde_json::{Map, Value};

/// CLI 分发结果。
pub enum CliDispatch {
    /// 继续进入服务主循环。
    Run,
    /// 命令已处理完成，主程序应退出。
    Exit,
}

/// `doctor` 输出格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DoctorFormat {
    Text,
    Json,
}

/// 解析并执行服务 CLI；`doctor` 输出由调用方提供的生效配置。
pub fn dispatch(
    binary: &str,
    args: &[String],
    doctor_entries: &[(&'static str, String)],
) -> anyhow::Result<CliDispatch> {
    let Some(first) = args.first() else {
        return Ok(CliDispatch::Run);
    };
    let cmd = first.trim();
    if cmd.is_empty() || cmd == "run" {
        return Ok(CliDispatch::Run);
    }

    match cmd {
        "-h" | "--help" | "help" => {
            print_help(binary);
            Ok(CliDispatch::Exit)
        }
        "doctor" => {
            let format = parse_doctor_format(binary, &args[1..])?;
            println!("{}", render_doctor(format, doctor_entries));
            Ok(CliDispatch::Exit)
        }
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(CliDispatch::Exit)
        }
        other => Err(anyhow!(
            "unknown command: {other}; run `{binary} --help` for usage"
        )),
    }
}

fn parse_doctor_format(binary: &str, args: &[String]) -> anyhow::Result<DoctorFormat> {
    if args.is_empty() {
        return Ok(DoctorFormat::Text);
    }
    if args.len() == 2 && args[0] == "--format" {
        return match args[1].as_str() {
            "text" => Ok(DoctorFormat::Text),
            "json" => Ok(DoctorFormat::Json),
            other => Err(anyhow!("unsupported doctor format: {other}")),
        };
    }
    Err(anyhow!("usage: {binary} doctor [--format text|json]"))
}

fn render_doctor(format: DoctorFormat, entries: &[(&'static str, String)]) -> String {
    match format {
        DoctorFormat::Text => entries
            .iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect::<Vec<_>>()
            .join("\n"),
        DoctorFormat::Json => {
            let payload = entries
                .iter()
                .map(|(key, value)| ((*key).to_string(), Value::String(value.clone())))
                .collect::<Map<String, Value>>();
            serde_json::to_string_pretty(&Value::Object(payload))
                .unwrap_or_else(|_| "{}".to_string())
        }
    }
}

fn print_help(binary: &str) {
    println!("{binary} usage:");
    println!("  {binary} run");
    println!("  {binary} doctor [--format text|json]");
    println!("  {binary} version");
}
