//! `send` 请求结构
//!
//! 一次调用构造一个 `NotificationRequest`，处理完即丢弃。未知字段直接忽略。

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::error::NotifyError;
use super::greeting::GreetingOverride;

/// 内部控制字段，合并附加数据前剔除
pub const CONTROL_KEYS: &[&str] = &["volume", "type", "parse_mode"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationRequest {
    pub message: String,
    #[serde(deserialize_with = "one_or_many")]
    pub targets: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// 全局附加数据
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Map<String, Value>,
    /// alias -> 单目标覆盖数据
    #[serde(default, deserialize_with = "null_as_default")]
    pub target_data: HashMap<String, Map<String, Value>>,
    #[serde(default)]
    pub priority: bool,
    #[serde(default)]
    pub skip_greeting: bool,
    #[serde(default)]
    pub include_time: Option<bool>,
    #[serde(default)]
    pub assistant_name: Option<String>,
    #[serde(default)]
    pub bold_prefix: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub override_greetings: HashMap<String, GreetingOverride>,
}

/// 单个 target 的有效覆盖值（已和全局 data 合并）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetOverride {
    pub message: Option<String>,
    pub service_type: Option<String>,
    pub volume: Option<Value>,
    pub parse_mode: Option<String>,
    /// 合并后的附加数据，已剔除控制字段
    pub accessory: Map<String, Value>,
}

impl NotificationRequest {
    pub fn new(
        message: impl Into<String>,
        targets: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            message: message.into(),
            targets: targets.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// 从调用 payload 解析并校验
    pub fn from_value(value: Value) -> Result<Self, NotifyError> {
        let request: NotificationRequest = serde_json::from_value(value)
            .map_err(|e| NotifyError::InvalidRequest(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), NotifyError> {
        if self.targets.is_empty() {
            return Err(NotifyError::InvalidRequest("targets must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data.as_object().cloned().unwrap_or_default();
        self
    }

    pub fn with_target_data(mut self, alias: impl Into<String>, data: Value) -> Self {
        self.target_data
            .insert(alias.into(), data.as_object().cloned().unwrap_or_default());
        self
    }

    pub fn with_priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_skip_greeting(mut self, skip: bool) -> Self {
        self.skip_greeting = skip;
        self
    }

    pub fn with_include_time(mut self, include: bool) -> Self {
        self.include_time = Some(include);
        self
    }

    pub fn with_assistant_name(mut self, name: impl Into<String>) -> Self {
        self.assistant_name = Some(name.into());
        self
    }

    pub fn with_bold_prefix(mut self, bold: bool) -> Self {
        self.bold_prefix = Some(bold);
        self
    }

    pub fn with_override_greeting(
        mut self,
        slot: impl Into<String>,
        value: GreetingOverride,
    ) -> Self {
        self.override_greetings.insert(slot.into(), value);
        self
    }

    /// 计算 alias 的有效覆盖：单目标数据优先于全局 data
    pub fn overrides_for(&self, alias: &str) -> TargetOverride {
        let specific = self.target_data.get(alias);
        let lookup = |key: &str| {
            specific
                .and_then(|m| m.get(key))
                .or_else(|| self.data.get(key))
                .filter(|v| !v.is_null())
        };

        let message = specific
            .and_then(|m| m.get("message"))
            .filter(|v| !v.is_null())
            .map(value_as_text);

        let mut accessory = self.data.clone();
        if let Some(specific) = specific {
            for (k, v) in specific {
                if k != "message" {
                    accessory.insert(k.clone(), v.clone());
                }
            }
        }
        for key in CONTROL_KEYS {
            accessory.remove(*key);
        }

        TargetOverride {
            message,
            service_type: lookup("type").map(value_as_text),
            volume: lookup("volume").cloned(),
            parse_mode: lookup("parse_mode").map(value_as_text),
            accessory,
        }
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(list) => list,
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
