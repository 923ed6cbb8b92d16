//! 静态配置 - 启动时加载一次，之后只读
//!
//! 文件格式为 JSON（`.yaml` / `.yml` 扩展名按 YAML 解析）：
//! ```json
//! {
//!   "assistant_name": "Hal9000",
//!   "date_format": "%H:%M:%S",
//!   "include_time": true,
//!   "time_slots": {"morning": {"start": "07:00", "volume": 0.35}},
//!   "dnd": {"start": "23:00", "end": "06:00"},
//!   "greetings": {"morning": ["Buongiorno"]},
//!   "channels": {
//!     "alexa": {"service": "notify.alexa_media", "is_voice": true, "target": "media_player.echo"}
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::channel::{
    AlternateService, ChannelDefinition, ChannelTable, TargetRef, DEVICE_LIST_FIELD,
};
use super::error::NotifyError;
use super::greeting::{GreetingOverride, GreetingTable};
use super::hosts::GatewayConfig;
use super::payload::PayloadPolicy;
use super::time_policy::{parse_time, DndWindow, SlotTable, TimeSlot};

pub const DEFAULT_ASSISTANT_NAME: &str = "Hal9000";
pub const DEFAULT_DATE_FORMAT: &str = "%H:%M:%S";
pub const DEFAULT_INCLUDE_TIME: bool = true;
/// priority=true 时的固定音量
pub const PRIORITY_VOLUME: f64 = 0.9;
/// slot 未指定音量时的默认值
pub const DEFAULT_SLOT_VOLUME: f64 = 0.5;

const DEFAULT_TIME_SLOTS: &[(&str, &str, f64)] = &[
    ("morning", "07:00", 0.35),
    ("afternoon", "12:00", 0.4),
    ("evening", "19:00", 0.3),
    ("night", "22:00", 0.1),
];

const DEFAULT_DND: (&str, &str) = ("23:00", "06:00");

const DEFAULT_GREETINGS: &[(&str, &[&str])] = &[
    ("morning", &["Buongiorno", "Ben alzato", "Salve", "Buondì"]),
    ("afternoon", &["Buon pomeriggio", "Ciao", "Ben ritrovato"]),
    ("evening", &["Buonasera", "Buona serata", "Ben tornato a casa"]),
    ("night", &["Buonanotte", "Sogni d'oro", "È tardi"]),
];

/// DND 作用范围
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DndScope {
    /// 只静音语音渠道
    #[default]
    VoiceOnly,
    /// 可视渠道同样跳过
    AllChannels,
}

/// 分发策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DispatchPolicy {
    #[serde(default)]
    pub dnd_scope: DndScope,
    #[serde(default)]
    pub notify_entity_injection: bool,
}

impl DispatchPolicy {
    pub fn payload_policy(&self) -> PayloadPolicy {
        PayloadPolicy {
            notify_entity_injection: self.notify_entity_injection,
        }
    }
}

/// 校验后的完整配置
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub assistant_name: String,
    pub date_format: String,
    pub include_time: bool,
    pub bold_prefix: bool,
    pub greetings: GreetingTable,
    pub slots: SlotTable,
    pub dnd: DndWindow,
    pub channels: ChannelTable,
    pub policy: DispatchPolicy,
    pub gateway: Option<GatewayConfig>,
}

// ---- 文件格式 ----

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default = "default_assistant_name")]
    assistant_name: String,
    #[serde(default = "default_date_format")]
    date_format: String,
    #[serde(default = "default_include_time")]
    include_time: bool,
    #[serde(default)]
    bold_prefix: bool,
    #[serde(default)]
    greetings: HashMap<String, GreetingOverride>,
    #[serde(default)]
    time_slots: Option<BTreeMap<String, SlotEntry>>,
    #[serde(default)]
    dnd: Option<DndEntry>,
    channels: BTreeMap<String, ChannelEntry>,
    #[serde(default)]
    policy: DispatchPolicy,
    #[serde(default)]
    gateway: Option<GatewayConfig>,
}

#[derive(Debug, Deserialize)]
struct SlotEntry {
    start: String,
    #[serde(default = "default_slot_volume")]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct DndEntry {
    #[serde(default = "default_dnd_start")]
    start: String,
    #[serde(default = "default_dnd_end")]
    end: String,
}

#[derive(Debug, Deserialize)]
struct ChannelEntry {
    service: String,
    #[serde(default)]
    is_voice: bool,
    #[serde(default)]
    entity_id: Option<Value>,
    #[serde(default)]
    target: Option<Value>,
    #[serde(default)]
    volume_entity: Option<Value>,
    #[serde(default)]
    service_data: Option<Map<String, Value>>,
    #[serde(default)]
    alt_services: HashMap<String, AltServiceEntry>,
}

#[derive(Debug, Deserialize)]
struct AltServiceEntry {
    service: String,
    #[serde(default)]
    service_data: Option<Map<String, Value>>,
}

fn default_assistant_name() -> String {
    DEFAULT_ASSISTANT_NAME.to_string()
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

fn default_include_time() -> bool {
    DEFAULT_INCLUDE_TIME
}

fn default_slot_volume() -> f64 {
    DEFAULT_SLOT_VOLUME
}

fn default_dnd_start() -> String {
    DEFAULT_DND.0.to_string()
}

fn default_dnd_end() -> String {
    DEFAULT_DND.1.to_string()
}

impl NotifierConfig {
    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("universal-notifier")
            .join("config.json")
    }

    /// 从文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config = if is_yaml {
            Self::from_yaml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
        .with_context(|| format!("Invalid config {}", path.display()))?;

        info!(
            path = %path.display(),
            channels = config.channels.len(),
            slots = config.slots.slots().len(),
            "Loaded notifier config"
        );
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, NotifyError> {
        let file: ConfigFile =
            serde_json::from_str(content).map_err(|e| NotifyError::config(e.to_string()))?;
        Self::from_file(file)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, NotifyError> {
        let file: ConfigFile =
            serde_yaml::from_str(content).map_err(|e| NotifyError::config(e.to_string()))?;
        Self::from_file(file)
    }

    pub fn from_value(value: Value) -> Result<Self, NotifyError> {
        let file: ConfigFile =
            serde_json::from_value(value).map_err(|e| NotifyError::config(e.to_string()))?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, NotifyError> {
        validate_date_format(&file.date_format)?;

        let mut slots = default_slots();
        for (name, entry) in file.time_slots.unwrap_or_default() {
            let slot = TimeSlot {
                start: parse_time(&entry.start)?,
                volume: entry.volume,
                name,
            };
            // 同名覆盖默认 slot，新名字追加
            match slots.iter_mut().find(|s| s.name == slot.name) {
                Some(existing) => *existing = slot,
                None => slots.push(slot),
            }
        }
        let slots = SlotTable::new(slots)?;

        let dnd = match file.dnd {
            Some(entry) => DndWindow::new(parse_time(&entry.start)?, parse_time(&entry.end)?),
            None => default_dnd()?,
        };

        let greetings = default_greetings().with_overrides(&file.greetings);

        if file.channels.is_empty() {
            return Err(NotifyError::config("no channels configured"));
        }
        let channels = file
            .channels
            .into_iter()
            .map(|(alias, entry)| build_channel(alias, entry))
            .collect::<Result<Vec<_>, NotifyError>>()?;

        Ok(Self {
            assistant_name: file.assistant_name,
            date_format: file.date_format,
            include_time: file.include_time,
            bold_prefix: file.bold_prefix,
            greetings,
            slots,
            dnd,
            channels: ChannelTable::new(channels),
            policy: file.policy,
            gateway: file.gateway,
        })
    }
}

fn default_slots() -> Vec<TimeSlot> {
    DEFAULT_TIME_SLOTS
        .iter()
        .filter_map(|(name, start, volume)| {
            Some(TimeSlot {
                name: name.to_string(),
                start: parse_time(start).ok()?,
                volume: *volume,
            })
        })
        .collect()
}

fn default_dnd() -> Result<DndWindow, NotifyError> {
    Ok(DndWindow::new(parse_time(DEFAULT_DND.0)?, parse_time(DEFAULT_DND.1)?))
}

fn default_greetings() -> GreetingTable {
    GreetingTable::new(
        DEFAULT_GREETINGS
            .iter()
            .map(|(slot, list)| {
                (slot.to_string(), list.iter().map(|s| s.to_string()).collect())
            })
            .collect(),
    )
}

fn validate_date_format(format: &str) -> Result<(), NotifyError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(NotifyError::config(format!("invalid date_format '{}'", format)));
    }
    Ok(())
}

fn build_channel(alias: String, entry: ChannelEntry) -> Result<ChannelDefinition, NotifyError> {
    let entity_id = entity_ref(&alias, "entity_id", entry.entity_id)?;
    let volume_entity = entity_ref(&alias, "volume_entity", entry.volume_entity)?;
    let target = match entry.target {
        Some(value) => {
            let target = TargetRef::from_value(value);
            if let Some(t) = &target {
                if t.items().iter().any(|v| !(v.is_string() || v.is_number())) {
                    return Err(NotifyError::config(format!(
                        "channel '{}': target must be a string, number or list of those",
                        alias
                    )));
                }
            }
            target
        }
        None => None,
    };

    let service_data = entry.service_data.unwrap_or_default();
    if let Some(devices) = service_data.get(DEVICE_LIST_FIELD) {
        entity_ref(&alias, DEVICE_LIST_FIELD, Some(devices.clone()))?;
    }

    let alt_services = entry
        .alt_services
        .into_iter()
        .map(|(kind, alt)| {
            (
                kind,
                AlternateService {
                    service: alt.service,
                    service_data: alt.service_data.unwrap_or_default(),
                },
            )
        })
        .collect();

    Ok(ChannelDefinition {
        alias,
        service: entry.service,
        is_voice: entry.is_voice,
        entity_id,
        target,
        volume_entity,
        service_data,
        alt_services,
    })
}

/// entity 引用必须是 `domain.object_id` 形式的字符串（或列表）
fn entity_ref(
    alias: &str,
    field: &str,
    value: Option<Value>,
) -> Result<Option<TargetRef>, NotifyError> {
    let Some(reference) = value.and_then(TargetRef::from_value) else {
        return Ok(None);
    };
    let valid = reference.items().iter().all(|v| {
        v.as_str()
            .and_then(|s| s.split_once('.'))
            .map(|(d, o)| !d.is_empty() && !o.is_empty())
            .unwrap_or(false)
    });
    if !valid {
        return Err(NotifyError::config(format!(
            "channel '{}': {} must be entity ids like 'domain.name'",
            alias, field
        )));
    }
    Ok(Some(reference))
}
