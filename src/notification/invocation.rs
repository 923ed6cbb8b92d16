//! 服务调用与分发结果

use serde::Serialize;
use serde_json::{Map, Value};

/// 调用用途
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    /// 调节播放设备音量
    Volume,
    /// 发送消息 / caption
    Message,
}

/// 一次 host 服务调用
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceInvocation {
    /// 产生该调用的 alias
    pub alias: String,
    pub kind: InvocationKind,
    pub domain: String,
    pub service: String,
    pub payload: Map<String, Value>,
}

impl ServiceInvocation {
    pub fn message(
        alias: impl Into<String>,
        domain: impl Into<String>,
        service: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            alias: alias.into(),
            kind: InvocationKind::Message,
            domain: domain.into(),
            service: service.into(),
            payload,
        }
    }

    pub fn volume(alias: impl Into<String>, entities: &[String], level: f64) -> Self {
        let mut payload = Map::new();
        payload.insert("entity_id".to_string(), Value::from(entities.to_vec()));
        payload.insert("volume_level".to_string(), Value::from(level));
        Self {
            alias: alias.into(),
            kind: InvocationKind::Volume,
            domain: "media_player".to_string(),
            service: "volume_set".to_string(),
            payload,
        }
    }

    /// `domain.service`
    pub fn service_name(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（未知 alias、DND、domain 不可用等）
    Skipped(String),
    /// 发送失败
    Failed(String),
}

impl SendResult {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendResult::Sent)
    }
}

/// 单个请求 target 的处理结果（同一 alias 出现多次时各自独立记录）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetOutcome {
    pub alias: String,
    pub result: SendResult,
    /// 为该 target 生成的调用数
    pub invocations: usize,
}

/// 单次调用的执行结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationOutcome {
    pub invocation: ServiceInvocation,
    pub result: SendResult,
}

/// 一次 `send` 的汇总报告
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub targets: Vec<TargetOutcome>,
    pub invocations: Vec<InvocationOutcome>,
}

impl DispatchReport {
    pub fn sent_count(&self) -> usize {
        self.invocations.iter().filter(|o| o.result.is_sent()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &InvocationOutcome> {
        self.invocations
            .iter()
            .filter(|o| matches!(o.result, SendResult::Failed(_)))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.targets
            .iter()
            .filter(|t| matches!(t.result, SendResult::Skipped(_)))
    }

    /// 某个 alias 的全部调用
    pub fn invocations_for<'a>(
        &'a self,
        alias: &'a str,
    ) -> impl Iterator<Item = &'a ServiceInvocation> {
        self.invocations
            .iter()
            .map(|o| &o.invocation)
            .filter(move |i| i.alias == alias)
    }

    /// 所有调用都成功且没有跳过的 target
    pub fn is_complete(&self) -> bool {
        self.skipped().next().is_none() && self.failed().next().is_none()
    }
}
