//! 渠道定义与解析
//!
//! 每个 alias 对应一个静态 `ChannelDefinition`。请求可以按 `type` 选中备用服务
//! （如 Telegram 的 photo/video），选中后 `is_voice` 强制为 false。
//! 解析结果 `ResolvedTarget` 每次请求重新计算，不做缓存。

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::error::NotifyError;

/// base payload 中列出实际播放设备的字段
pub const DEVICE_LIST_FIELD: &str = "media_player_entity_id";
/// 可以调节音量的实体前缀
const PLAYABLE_PREFIX: &str = "media_player.";

/// entity / target 引用：单个值或列表（字符串或数字 chat id）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TargetRef(Vec<Value>);

impl TargetRef {
    pub fn from_value(value: Value) -> Option<Self> {
        let items = match value {
            Value::Null => Vec::new(),
            Value::Array(items) => items.into_iter().filter(|v| !v.is_null()).collect(),
            other => vec![other],
        };
        if items.is_empty() {
            None
        } else {
            Some(Self(items))
        }
    }

    pub fn single(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    pub fn items(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 单个值原样输出，多个值输出为列表
    pub fn to_value(&self) -> Value {
        match self.0.as_slice() {
            [one] => one.clone(),
            many => Value::Array(many.to_vec()),
        }
    }

    /// 字符串形式（数字 id 转为字符串）
    pub fn as_strings(&self) -> Vec<String> {
        self.0.iter().map(value_to_string).collect()
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `domain.service` 服务标识
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceId {
    pub domain: String,
    pub service: String,
}

impl ServiceId {
    /// 按第一个 `.` 拆分，两段都不能为空
    pub fn parse(raw: &str) -> Option<Self> {
        let (domain, service) = raw.trim().split_once('.')?;
        if domain.is_empty() || service.is_empty() {
            return None;
        }
        Some(Self {
            domain: domain.to_string(),
            service: service.to_string(),
        })
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.domain, self.service)
    }
}

/// 备用服务（按请求 type 选中）
#[derive(Debug, Clone, PartialEq)]
pub struct AlternateService {
    pub service: String,
    pub service_data: Map<String, Value>,
}

/// 静态渠道定义
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDefinition {
    pub alias: String,
    pub service: String,
    pub is_voice: bool,
    /// 服务商实体（如 tts.google）或基础 target
    pub entity_id: Option<TargetRef>,
    /// notify/telegram 的目标，TTS 场景下也可以是服务商实体
    pub target: Option<TargetRef>,
    pub volume_entity: Option<TargetRef>,
    pub service_data: Map<String, Value>,
    pub alt_services: HashMap<String, AlternateService>,
}

/// 主服务 / 备用服务
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "variant", content = "type", rename_all = "snake_case")]
pub enum ServiceVariant {
    Primary,
    Alternate(String),
}

/// 单个 alias 的解析结果
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub alias: String,
    pub variant: ServiceVariant,
    pub service: ServiceId,
    pub base_payload: Map<String, Value>,
    pub is_voice: bool,
    pub entity_id: Option<TargetRef>,
    pub target: Option<TargetRef>,
    /// 需要调节音量的播放设备
    pub volume_targets: Vec<String>,
}

/// alias -> 渠道定义，进程生命周期内只读
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
    channels: BTreeMap<String, ChannelDefinition>,
}

impl ChannelTable {
    pub fn new(channels: impl IntoIterator<Item = ChannelDefinition>) -> Self {
        Self {
            channels: channels.into_iter().map(|c| (c.alias.clone(), c)).collect(),
        }
    }

    pub fn get(&self, alias: &str) -> Option<&ChannelDefinition> {
        self.channels.get(alias)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelDefinition> {
        self.channels.values()
    }

    /// 解析 alias。`is_available` 是 host 的 domain 查询能力。
    pub fn resolve(
        &self,
        alias: &str,
        requested_type: Option<&str>,
        is_available: &dyn Fn(&str) -> bool,
    ) -> Result<ResolvedTarget, NotifyError> {
        let channel = self
            .get(alias)
            .ok_or_else(|| NotifyError::UnknownTarget(alias.to_string()))?;

        let (variant, raw_service, base_payload, is_voice) = match requested_type
            .filter(|t| !t.is_empty())
            .and_then(|t| channel.alt_services.get_key_value(t))
        {
            Some((kind, alt)) => (
                ServiceVariant::Alternate(kind.clone()),
                alt.service.as_str(),
                alt.service_data.clone(),
                false,
            ),
            None => (
                ServiceVariant::Primary,
                channel.service.as_str(),
                channel.service_data.clone(),
                channel.is_voice,
            ),
        };

        let service = ServiceId::parse(raw_service).ok_or_else(|| NotifyError::MalformedServiceId {
            alias: alias.to_string(),
            service: raw_service.to_string(),
        })?;

        if !is_available(&service.domain) {
            return Err(NotifyError::UnavailableDomain {
                alias: alias.to_string(),
                domain: service.domain,
            });
        }

        let volume_targets = if is_voice {
            volume_targets(channel, &base_payload)
        } else {
            Vec::new()
        };

        debug!(target = %alias, service = %service, ?variant, is_voice, "Resolved channel");

        Ok(ResolvedTarget {
            alias: alias.to_string(),
            variant,
            service,
            base_payload,
            is_voice,
            entity_id: channel.entity_id.clone(),
            target: channel.target.clone(),
            volume_targets,
        })
    }
}

/// 音量目标：显式 volume_entity 优先，否则合并设备列表和可播放的 target/entity
fn volume_targets(channel: &ChannelDefinition, base_payload: &Map<String, Value>) -> Vec<String> {
    if let Some(explicit) = &channel.volume_entity {
        return dedup(explicit.as_strings());
    }

    let mut found = base_payload
        .get(DEVICE_LIST_FIELD)
        .cloned()
        .and_then(TargetRef::from_value)
        .map(|r| r.as_strings())
        .unwrap_or_default();

    for reference in [&channel.target, &channel.entity_id].into_iter().flatten() {
        found.extend(
            reference
                .as_strings()
                .into_iter()
                .filter(|e| e.starts_with(PLAYABLE_PREFIX)),
        );
    }

    dedup(found)
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
