//! 消息组装 - 问候语、前缀和正文按渠道形态拼接
//!
//! - 指令消息（Companion App 指令）原样透传
//! - 语音渠道：`<问候>. <正文>`，全部做 TTS 清洗
//! - 可视渠道：`[助手名 - 时间] <问候>. <正文>`，各部分独立转义

use super::sanitizer::{
    apply_emphasis, clean_for_voice, sanitize_for_visual, EmphasisStyle, MarkupDialect,
};

/// Companion App 指令词表，命中时消息原样下发
pub const COMMAND_VOCABULARY: &[&str] = &[
    "TTS",
    "request_location_update",
    "clear_badge",
    "ble_write",
    "close_notifications",
    "clear_notification",
    "remove_channel",
    "stop_tts",
    "app_launch",
    "update_sensors",
];

/// 指令前缀
pub const COMMAND_PREFIX: &str = "command_";

/// 是否为指令消息
pub fn is_command(message: &str) -> bool {
    COMMAND_VOCABULARY.contains(&message) || message.starts_with(COMMAND_PREFIX)
}

/// 可视前缀的组成部分
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrefixParts {
    pub assistant_name: String,
    /// 已格式化的时间戳；`None` 表示不显示时间
    pub timestamp: Option<String>,
}

/// 单个渠道的组装参数
#[derive(Debug, Clone)]
pub struct ComposeInput<'a> {
    pub raw_message: &'a str,
    pub is_voice: bool,
    pub greeting: &'a str,
    pub prefix: &'a PrefixParts,
    pub dialect: MarkupDialect,
    pub bold_prefix: bool,
}

/// 组装最终文本
pub fn compose(input: &ComposeInput<'_>) -> String {
    if is_command(input.raw_message) {
        return input.raw_message.to_string();
    }

    if input.is_voice {
        return compose_voice(input.raw_message, input.greeting);
    }

    compose_visual(input)
}

fn compose_voice(message: &str, greeting: &str) -> String {
    let message = clean_for_voice(message);
    let greeting = clean_for_voice(greeting);
    if greeting.is_empty() {
        message
    } else {
        format!("{}. {}", greeting, message)
    }
}

fn compose_visual(input: &ComposeInput<'_>) -> String {
    let dialect = input.dialect;
    let style = if input.bold_prefix {
        EmphasisStyle::Bold
    } else {
        EmphasisStyle::None
    };
    let literal = |s: &str| sanitize_for_visual(s, dialect);
    let emphasized = |s: &str| apply_emphasis(&sanitize_for_visual(s, dialect), dialect, style);

    let mut text = literal("[");
    text.push_str(&emphasized(&input.prefix.assistant_name));
    if let Some(ts) = &input.prefix.timestamp {
        text.push_str(&literal(" - "));
        text.push_str(&emphasized(ts));
    }
    text.push_str(&literal("] "));

    let greeting = sanitize_for_visual(input.greeting, dialect);
    if !greeting.is_empty() {
        text.push_str(&greeting);
        text.push_str(&literal(". "));
    }

    text.push_str(&sanitize_for_visual(input.raw_message, dialect));
    text
}
