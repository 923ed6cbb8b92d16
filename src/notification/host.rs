//! Host 能力抽象
//!
//! 路由核心只依赖三件事：调用服务、查询 domain 是否可用、读取本地时间。

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::{Map, Value};

#[async_trait]
pub trait ServiceHost: Send + Sync {
    /// 调用 `domain.service`，只关心成功与否
    async fn invoke(&self, domain: &str, service: &str, payload: &Map<String, Value>) -> Result<()>;

    /// host 当前是否加载了该 domain
    fn is_domain_available(&self, domain: &str) -> bool;

    /// 当前本地时间
    fn now(&self) -> NaiveDateTime;
}
