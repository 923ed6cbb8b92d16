//! Policy 命令 - 查看某一时刻的时段、音量和勿扰状态

use anyhow::Result;
use chrono::Local;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use super::load_config;
use super::output::format_output;
use crate::notification::config::PRIORITY_VOLUME;
use crate::notification::time_policy::{self, parse_time, TimePolicy};

/// Policy 命令参数
#[derive(Args, Debug, Default)]
pub struct PolicyArgs {
    /// 配置文件路径
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// 查询时刻 HH:MM（默认当前时间）
    #[arg(long)]
    pub at: Option<String>,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct PolicyOutput {
    pub time: String,
    #[serde(flatten)]
    pub policy: TimePolicy,
    pub priority_volume: f64,
}

/// 处理 policy 命令
pub fn handle_policy(args: PolicyArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let now = match &args.at {
        Some(at) => parse_time(at)?,
        None => Local::now().time(),
    };

    let output = PolicyOutput {
        time: now.format("%H:%M:%S").to_string(),
        policy: time_policy::resolve(now, &config.slots, &config.dnd),
        priority_volume: PRIORITY_VOLUME,
    };

    if args.json {
        println!("{}", format_output(&output));
    } else {
        println!("时间: {}", output.time);
        println!("时段: {} (音量 {})", output.policy.slot, output.policy.volume);
        println!(
            "勿扰: {}",
            if output.policy.dnd_active { "生效中，语音渠道仅 priority 或显式音量时发送" } else { "未生效" }
        );
    }

    Ok(())
}
