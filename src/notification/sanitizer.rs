//! 文本清洗模块 - 按输出形态处理消息文本
//!
//! 主要功能：
//! - 语音渠道：移除 HTML、URL、Markdown 强调符号和 emoji，合并空白
//! - 可视渠道：按 markup 方言转义（Telegram MarkdownV2 / HTML）
//! - 前缀加粗：按方言包裹 `<b>` 或 `*`

use regex::Regex;
use std::sync::LazyLock;

/// Markdown V2 保留字符
pub const MARKDOWN_V2_RESERVED: &str = r"_*[]()~`>#+-=|{}.!";

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:[A-Za-z][A-Za-z0-9+.\-]*://|http)\S*").unwrap());
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[*_`~]").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
/// Unicode "Symbol, other"：emoji、象形符号、装饰符号
static SYMBOL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{So}").unwrap());
/// ZWJ / 变体选择符，emoji 序列去掉符号后的残留部件
static EMOJI_JOINER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{200D}\x{FE0F}]").unwrap());

/// 可视渠道的 markup 方言
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupDialect {
    Plain,
    Html,
    MarkdownV2,
}

impl MarkupDialect {
    /// 从 `parse_mode` 字符串解析（大小写不敏感，包含匹配）
    pub fn from_parse_mode(parse_mode: Option<&str>) -> Self {
        let mode = parse_mode.unwrap_or("").to_lowercase();
        if mode.contains("markdown") {
            MarkupDialect::MarkdownV2
        } else if mode.contains("html") {
            MarkupDialect::Html
        } else {
            MarkupDialect::Plain
        }
    }
}

/// 强调样式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmphasisStyle {
    None,
    Bold,
}

/// 清洗语音文本（TTS 引擎读不了的内容全部去掉）
///
/// 结果是幂等的：`clean_for_voice(clean_for_voice(x)) == clean_for_voice(x)`
pub fn clean_for_voice(text: &str) -> String {
    let mut current = text.to_string();
    // 删除可能拼出新的 token（如 "ht*tp"），跑到不动点为止
    loop {
        let next = clean_voice_pass(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn clean_voice_pass(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = HTML_TAG.replace_all(text, "");
    let text = URL.replace_all(&text, "");
    let text = EMPHASIS.replace_all(&text, "");
    let text = SYMBOL.replace_all(&text, "");
    let text = EMOJI_JOINER.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");

    text.trim().to_string()
}

/// 可视渠道文本转义
pub fn sanitize_for_visual(text: &str, dialect: MarkupDialect) -> String {
    match dialect {
        MarkupDialect::MarkdownV2 => escape_markdown_v2(text),
        MarkupDialect::Html => escape_html(text),
        MarkupDialect::Plain => text.to_string(),
    }
}

/// 按方言加粗；空文本或非 Bold 样式原样返回
pub fn apply_emphasis(text: &str, dialect: MarkupDialect, style: EmphasisStyle) -> String {
    if text.is_empty() || style != EmphasisStyle::Bold {
        return text.to_string();
    }
    match dialect {
        MarkupDialect::Html => format!("<b>{}</b>", text),
        MarkupDialect::MarkdownV2 => format!("*{}*", text),
        MarkupDialect::Plain => text.to_string(),
    }
}

/// 转义 MarkdownV2 保留字符。已转义的反斜杠会被再次转义（已知限制）。
fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if MARKDOWN_V2_RESERVED.contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// 只转义 `&` `<` `>`，不处理引号；已有实体不重复转义
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for (idx, c) in text.char_indices() {
        match c {
            '&' if !starts_with_entity(&text[idx..]) => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn starts_with_entity(s: &str) -> bool {
    ["&amp;", "&lt;", "&gt;"].iter().any(|e| s.starts_with(e))
}
