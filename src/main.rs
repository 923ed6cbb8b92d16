//! Universal Notifier CLI
//!
//! 一条消息扇出到语音助手、聊天机器人和手机推送

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use universal_notifier::cli::{
    handle_check, handle_policy, handle_send, CheckArgs, PolicyArgs, SendArgs,
};

#[derive(Parser)]
#[command(name = "uninotify")]
#[command(about = "Universal Notifier - 通知扇出路由")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 发送通知到一个或多个渠道
    Send(SendArgs),
    /// 校验配置并列出渠道
    Check(CheckArgs),
    /// 查看当前（或指定时刻）的时段、音量和勿扰状态
    Policy(PolicyArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug uninotify send --dry-run ...
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("universal_notifier=info,uninotify=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Send(args) => handle_send(args).await?,
        Commands::Check(args) => handle_check(args)?,
        Commands::Policy(args) => handle_policy(args)?,
    }

    Ok(())
}
