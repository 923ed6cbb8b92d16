//! Payload 构建模块 - 把解析后的渠道和最终文本变成服务调用
//!
//! 各 domain 的差异（消息字段、目标注入、附加数据位置）由一组固定的
//! `TransportStrategy` 表达；新增传输方式只需要新增一个 strategy。
//!
//! 构建顺序：
//! 1. 复制 base payload
//! 2. 写入 `message` / `caption`
//! 3. 写入 `title`
//! 4. 注入目标（notify: `target`，tts: `entity_id`，telegram: `target`，多目标时拆分广播）
//! 5. 合并附加数据（notify 放在 `data` 下，其余平铺）
//! 6. 生成调用

use serde_json::{Map, Value};

use super::channel::ResolvedTarget;
use super::invocation::ServiceInvocation;

/// 附加数据放置位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessoryPlacement {
    /// 嵌套在 `data` 字段下
    Nested,
    /// 平铺到顶层
    Flat,
}

/// 目标注入结果
#[derive(Debug, Clone, PartialEq)]
pub enum Targeting {
    /// 已写入 payload（或无需目标）
    Single,
    /// 传输层不支持多目标：每个 id 一次调用
    Broadcast(Vec<Value>),
}

/// 构建策略开关
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadPolicy {
    /// notify 类 domain 是否也注入 `entity_id`
    pub notify_entity_injection: bool,
}

/// 单个 domain 家族的 payload 规则
pub trait TransportStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn matches(&self, domain: &str) -> bool;

    /// 正文字段名
    fn message_field(&self, _requested_type: Option<&str>) -> &'static str {
        "message"
    }

    /// 没有显式 parse_mode 时使用的默认值
    fn default_parse_mode(&self) -> Option<&'static str> {
        None
    }

    /// 是否把 parse_mode 写进 payload
    fn carries_parse_mode(&self) -> bool {
        false
    }

    fn inject_targeting(
        &self,
        resolved: &ResolvedTarget,
        policy: &PayloadPolicy,
        payload: &mut Map<String, Value>,
    ) -> Targeting;

    fn accessory_placement(&self) -> AccessoryPlacement {
        AccessoryPlacement::Flat
    }
}

/// notify.*（mobile_app、alexa_media 等）
pub struct NotifyTransport;

impl TransportStrategy for NotifyTransport {
    fn name(&self) -> &'static str {
        "notify"
    }

    fn matches(&self, domain: &str) -> bool {
        domain == "notify"
    }

    fn inject_targeting(
        &self,
        resolved: &ResolvedTarget,
        policy: &PayloadPolicy,
        payload: &mut Map<String, Value>,
    ) -> Targeting {
        if let Some(target) = &resolved.target {
            payload.insert("target".to_string(), target.to_value());
        }
        if policy.notify_entity_injection {
            if let Some(entity) = &resolved.entity_id {
                payload.insert("entity_id".to_string(), entity.to_value());
            }
        }
        Targeting::Single
    }

    fn accessory_placement(&self) -> AccessoryPlacement {
        AccessoryPlacement::Nested
    }
}

/// telegram_bot.*
pub struct ChatBotTransport;

impl TransportStrategy for ChatBotTransport {
    fn name(&self) -> &'static str {
        "chat_bot"
    }

    fn matches(&self, domain: &str) -> bool {
        domain == "telegram_bot"
    }

    fn message_field(&self, requested_type: Option<&str>) -> &'static str {
        match requested_type {
            Some("photo") | Some("video") => "caption",
            _ => "message",
        }
    }

    fn default_parse_mode(&self) -> Option<&'static str> {
        Some("html")
    }

    fn carries_parse_mode(&self) -> bool {
        true
    }

    fn inject_targeting(
        &self,
        resolved: &ResolvedTarget,
        _policy: &PayloadPolicy,
        payload: &mut Map<String, Value>,
    ) -> Targeting {
        match &resolved.target {
            Some(target) if target.len() > 1 => Targeting::Broadcast(target.items().to_vec()),
            Some(target) => {
                payload.insert("target".to_string(), target.to_value());
                Targeting::Single
            }
            None => Targeting::Single,
        }
    }
}

/// tts.* / media_player.*：`entity_id` 是服务商实体，播放设备在 base payload 里
pub struct VoiceTransport;

impl TransportStrategy for VoiceTransport {
    fn name(&self) -> &'static str {
        "voice"
    }

    fn matches(&self, domain: &str) -> bool {
        matches!(domain, "tts" | "media_player")
    }

    fn inject_targeting(
        &self,
        resolved: &ResolvedTarget,
        _policy: &PayloadPolicy,
        payload: &mut Map<String, Value>,
    ) -> Targeting {
        if let Some(provider) = resolved.target.as_ref().or(resolved.entity_id.as_ref()) {
            payload.insert("entity_id".to_string(), provider.to_value());
        }
        Targeting::Single
    }
}

/// 其他 domain（script、input_text ...）
pub struct GenericTransport;

impl TransportStrategy for GenericTransport {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn matches(&self, _domain: &str) -> bool {
        true
    }

    fn inject_targeting(
        &self,
        resolved: &ResolvedTarget,
        _policy: &PayloadPolicy,
        payload: &mut Map<String, Value>,
    ) -> Targeting {
        if let Some(entity) = &resolved.entity_id {
            payload.insert("entity_id".to_string(), entity.to_value());
        }
        Targeting::Single
    }
}

/// 按顺序匹配，`GenericTransport` 兜底
static STRATEGIES: [&dyn TransportStrategy; 4] = [
    &NotifyTransport,
    &ChatBotTransport,
    &VoiceTransport,
    &GenericTransport,
];

pub fn strategy_for(domain: &str) -> &'static dyn TransportStrategy {
    STRATEGIES
        .iter()
        .copied()
        .find(|s| s.matches(domain))
        .unwrap_or(&GenericTransport)
}

/// 有效 parse_mode：请求覆盖 > base payload > strategy 默认
pub fn resolve_parse_mode(
    strategy: &dyn TransportStrategy,
    requested: Option<&str>,
    base_payload: &Map<String, Value>,
) -> Option<String> {
    requested
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .or_else(|| {
            base_payload
                .get("parse_mode")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| strategy.default_parse_mode().map(str::to_string))
}

/// 单次构建输入
#[derive(Debug, Clone)]
pub struct PayloadInput<'a> {
    pub resolved: &'a ResolvedTarget,
    pub text: &'a str,
    pub title: Option<&'a str>,
    pub accessory: &'a Map<String, Value>,
    pub requested_type: Option<&'a str>,
    pub parse_mode: Option<&'a str>,
}

/// Payload 构建器
#[derive(Debug, Clone, Default)]
pub struct PayloadBuilder {
    policy: PayloadPolicy,
}

impl PayloadBuilder {
    pub fn new(policy: PayloadPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PayloadPolicy {
        &self.policy
    }

    /// 生成一个或多个消息调用
    pub fn build(&self, input: &PayloadInput<'_>) -> Vec<ServiceInvocation> {
        let resolved = input.resolved;
        let strategy = strategy_for(&resolved.service.domain);

        let mut payload = resolved.base_payload.clone();

        if strategy.carries_parse_mode() {
            if let Some(mode) = input.parse_mode {
                payload.insert("parse_mode".to_string(), Value::from(mode));
            }
        }
        payload.insert(
            strategy.message_field(input.requested_type).to_string(),
            Value::from(input.text),
        );

        if let Some(title) = input.title {
            payload.insert("title".to_string(), Value::from(title));
        }

        let targeting = strategy.inject_targeting(resolved, &self.policy, &mut payload);

        merge_accessory(&mut payload, input.accessory, strategy.accessory_placement());

        let invocation = |payload: Map<String, Value>| {
            ServiceInvocation::message(
                resolved.alias.clone(),
                resolved.service.domain.clone(),
                resolved.service.service.clone(),
                payload,
            )
        };

        match targeting {
            Targeting::Single => vec![invocation(payload)],
            Targeting::Broadcast(ids) => ids
                .into_iter()
                .map(|id| {
                    let mut copy = payload.clone();
                    copy.insert("target".to_string(), id);
                    invocation(copy)
                })
                .collect(),
        }
    }
}

fn merge_accessory(
    payload: &mut Map<String, Value>,
    accessory: &Map<String, Value>,
    placement: AccessoryPlacement,
) {
    if accessory.is_empty() {
        return;
    }
    match placement {
        AccessoryPlacement::Flat => {
            for (k, v) in accessory {
                payload.insert(k.clone(), v.clone());
            }
        }
        AccessoryPlacement::Nested => {
            let data = payload
                .entry("data")
                .or_insert_with(|| Value::Object(Map::new()));
            if !data.is_object() {
                *data = Value::Object(Map::new());
            }
            if let Value::Object(data) = data {
                for (k, v) in accessory {
                    data.insert(k.clone(), v.clone());
                }
            }
        }
    }
}
