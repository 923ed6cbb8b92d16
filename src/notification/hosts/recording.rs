//! 内存 host：记录调用而不真正发送
//!
//! 用于 `--dry-run` 和测试。支持固定时钟、限定可用 domain、按 domain 注入失败和延迟。

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

use crate::notification::host::ServiceHost;

/// 一次被记录的调用
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedCall {
    pub domain: String,
    pub service: String,
    pub payload: Map<String, Value>,
}

#[derive(Debug, Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<RecordedCall>>,
    /// `None` 表示所有 domain 可用
    available: Option<HashSet<String>>,
    /// 调用必定失败的 domain 或 `domain.service`
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    clock: Option<NaiveDateTime>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// 固定 `now()`
    pub fn with_clock(mut self, now: NaiveDateTime) -> Self {
        self.clock = Some(now);
        self
    }

    /// 只有列出的 domain 可用
    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available = Some(domains.into_iter().map(Into::into).collect());
        self
    }

    /// 让 `domain` 或 `domain.service` 的调用失败
    pub fn failing(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    /// 让 `domain` 或 `domain.service` 的调用延迟完成
    pub fn delayed(mut self, name: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(name.into(), delay);
        self
    }

    /// 已记录的调用（按完成顺序）
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_to(&self, domain: &str, service: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.domain == domain && c.service == service)
            .collect()
    }

    fn lookup<'a, T>(map: &'a HashMap<String, T>, domain: &str, service: &str) -> Option<&'a T> {
        map.get(&format!("{}.{}", domain, service))
            .or_else(|| map.get(domain))
    }
}

#[async_trait]
impl ServiceHost for RecordingHost {
    async fn invoke(
        &self,
        domain: &str,
        service: &str,
        payload: &Map<String, Value>,
    ) -> Result<()> {
        let full_name = format!("{}.{}", domain, service);

        if let Some(delay) = Self::lookup(&self.delays, domain, service) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing.contains(domain) || self.failing.contains(&full_name) {
            return Err(anyhow!("injected failure for {}", full_name));
        }

        info!(
            service = %full_name,
            payload = %serde_json::Value::Object(payload.clone()),
            "Recorded invocation"
        );
        self.calls
            .lock()
            .map_err(|_| anyhow!("recording host lock poisoned"))?
            .push(RecordedCall {
                domain: domain.to_string(),
                service: service.to_string(),
                payload: payload.clone(),
            });
        Ok(())
    }

    fn is_domain_available(&self, domain: &str) -> bool {
        self.available
            .as_ref()
            .map(|set| set.contains(domain))
            .unwrap_or(true)
    }

    fn now(&self) -> NaiveDateTime {
        self.clock.unwrap_or_else(|| Local::now().naive_local())
    }
}
