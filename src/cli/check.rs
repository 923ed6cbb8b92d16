//! Check 命令 - 校验配置并打印渠道表

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use super::load_config;
use super::output::format_output;
use crate::notification::{NotifierConfig, ServiceId};

/// Check 命令参数
#[derive(Args, Debug, Default)]
pub struct CheckArgs {
    /// 配置文件路径
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// 单个渠道摘要
#[derive(Debug, Serialize)]
pub struct ChannelSummary {
    pub alias: String,
    pub service: String,
    pub is_voice: bool,
    /// 服务标识能否拆成 domain.service；不合法的渠道在发送时被跳过
    pub valid_service: bool,
    pub alternates: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckOutput {
    pub assistant_name: String,
    pub slots: Vec<String>,
    pub dnd: String,
    pub channels: Vec<ChannelSummary>,
}

pub fn summarize(config: &NotifierConfig) -> CheckOutput {
    let channels = config
        .channels
        .iter()
        .map(|c| {
            let mut alternates: Vec<String> = c.alt_services.keys().cloned().collect();
            alternates.sort();
            ChannelSummary {
                alias: c.alias.clone(),
                service: c.service.clone(),
                is_voice: c.is_voice,
                valid_service: ServiceId::parse(&c.service).is_some()
                    && c.alt_services.values().all(|a| ServiceId::parse(&a.service).is_some()),
                alternates,
            }
        })
        .collect();

    let dnd = if config.dnd.is_disabled() {
        "disabled".to_string()
    } else {
        format!("{}-{}", config.dnd.start.format("%H:%M"), config.dnd.end.format("%H:%M"))
    };

    CheckOutput {
        assistant_name: config.assistant_name.clone(),
        slots: config
            .slots
            .slots()
            .iter()
            .map(|s| format!("{} {} vol={}", s.name, s.start.format("%H:%M"), s.volume))
            .collect(),
        dnd,
        channels,
    }
}

/// 处理 check 命令
pub fn handle_check(args: CheckArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let output = summarize(&config);

    if args.json {
        println!("{}", format_output(&output));
        return Ok(());
    }

    println!("配置有效，助手名: {}", output.assistant_name);
    println!("时段: {}", output.slots.join(", "));
    println!("勿扰: {}", output.dnd);
    println!("\n{} 个渠道:", output.channels.len());
    for channel in &output.channels {
        let mut line = format!(
            "  {:<16} {:<32} {}",
            channel.alias,
            channel.service,
            if channel.is_voice { "voice" } else { "visual" }
        );
        if !channel.alternates.is_empty() {
            line.push_str(&format!(" alt=[{}]", channel.alternates.join(",")));
        }
        if !channel.valid_service {
            line.push_str("  (malformed service, will be skipped)");
        }
        println!("{}", line);
    }

    Ok(())
}
