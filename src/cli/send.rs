//! Send 命令 - 发送一条通知到多个渠道
//!
//! 请求可以完全由参数构造，也可以用 `--request` 读取完整 JSON 调用体；
//! 两者同时出现时，显式参数覆盖 JSON 中的同名字段。

use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde_json::{Map, Value};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::load_config;
use super::output::{format_output, render_report};
use crate::notification::hosts::{HttpHost, RecordingHost};
use crate::notification::{NotificationDispatcher, NotificationRequest, ServiceHost};

/// Send 命令参数
#[derive(Args, Debug, Default)]
pub struct SendArgs {
    /// 配置文件路径
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// 消息正文
    #[arg(long, short, required_unless_present = "request")]
    pub message: Option<String>,

    /// 目标 alias（可重复）
    #[arg(long = "target", short, required_unless_present = "request")]
    pub targets: Vec<String>,

    /// 标题
    #[arg(long)]
    pub title: Option<String>,

    /// 全局附加数据（JSON 对象）
    #[arg(long)]
    pub data: Option<String>,

    /// 单目标覆盖数据（JSON 对象：alias -> 对象）
    #[arg(long)]
    pub target_data: Option<String>,

    /// 高优先级：固定高音量并绕过勿扰
    #[arg(long)]
    pub priority: bool,

    /// 不加问候语
    #[arg(long)]
    pub skip_greeting: bool,

    /// 是否在前缀中显示时间
    #[arg(long)]
    pub include_time: Option<bool>,

    /// 覆盖助手名
    #[arg(long)]
    pub assistant_name: Option<String>,

    /// 前缀加粗
    #[arg(long)]
    pub bold_prefix: Option<bool>,

    /// 问候语覆盖（JSON 对象：slot -> 字符串或列表）
    #[arg(long)]
    pub override_greetings: Option<String>,

    /// 完整 JSON 请求体文件，`-` 表示 stdin
    #[arg(long)]
    pub request: Option<String>,

    /// 只打印调用，不真正发送
    #[arg(long)]
    pub dry_run: bool,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,

    /// 所有调用的截止时间（秒）
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// 处理 send 命令
pub async fn handle_send(args: SendArgs) -> Result<()> {
    let config = Arc::new(load_config(args.config.as_deref())?);
    let request = build_request(&args)?;

    let host: Arc<dyn ServiceHost> = if args.dry_run {
        Arc::new(RecordingHost::new())
    } else {
        let gateway = config
            .gateway
            .clone()
            .ok_or_else(|| anyhow!("config has no `gateway` section (use --dry-run to preview)"))?;
        Arc::new(HttpHost::connect(gateway).await?)
    };

    let dispatcher = NotificationDispatcher::new(config, host);
    let report = dispatcher
        .send_with_deadline(&request, args.timeout.map(Duration::from_secs))
        .await?;

    info!(complete = report.is_complete(), "Send finished");

    if args.json {
        println!("{}", format_output(&report));
    } else {
        println!("{}", render_report(&report, args.dry_run));
    }

    Ok(())
}

/// 合并 `--request` 请求体和显式参数
pub fn build_request(args: &SendArgs) -> Result<NotificationRequest> {
    let mut body = match &args.request {
        Some(source) => read_request_body(source)?,
        None => Map::new(),
    };

    if let Some(message) = &args.message {
        body.insert("message".to_string(), Value::from(message.as_str()));
    }
    if !args.targets.is_empty() {
        body.insert("targets".to_string(), Value::from(args.targets.clone()));
    }
    if let Some(title) = &args.title {
        body.insert("title".to_string(), Value::from(title.as_str()));
    }
    if let Some(data) = &args.data {
        body.insert("data".to_string(), parse_json_object("--data", data)?);
    }
    if let Some(target_data) = &args.target_data {
        body.insert("target_data".to_string(), parse_json_object("--target-data", target_data)?);
    }
    if let Some(greetings) = &args.override_greetings {
        body.insert(
            "override_greetings".to_string(),
            parse_json_object("--override-greetings", greetings)?,
        );
    }
    if args.priority {
        body.insert("priority".to_string(), Value::Bool(true));
    }
    if args.skip_greeting {
        body.insert("skip_greeting".to_string(), Value::Bool(true));
    }
    if let Some(include_time) = args.include_time {
        body.insert("include_time".to_string(), Value::Bool(include_time));
    }
    if let Some(name) = &args.assistant_name {
        body.insert("assistant_name".to_string(), Value::from(name.as_str()));
    }
    if let Some(bold) = args.bold_prefix {
        body.insert("bold_prefix".to_string(), Value::Bool(bold));
    }

    Ok(NotificationRequest::from_value(Value::Object(body))?)
}

fn read_request_body(source: &str) -> Result<Map<String, Value>> {
    let content = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read request file {}", source))?
    };

    match serde_json::from_str(&content).context("Request body is not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow!("request body must be a JSON object")),
    }
}

fn parse_json_object(flag: &str, raw: &str) -> Result<Value> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("{} is not valid JSON", flag))?;
    if !value.is_object() {
        return Err(anyhow!("{} must be a JSON object", flag));
    }
    Ok(value)
}
