//! REST 网关 host
//!
//! 通过家庭自动化网关的 REST API 调用服务：
//! - `POST {url}/api/services/{domain}/{service}`，payload 作为 JSON body
//! - `GET {url}/api/config` 的 `components` 列表作为可用 domain

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::notification::host::ServiceHost;

/// 未配置 token 时读取的环境变量
pub const TOKEN_ENV: &str = "UNINOTIFY_TOKEN";

/// 网关配置
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// 网关地址（如 http://homeassistant.local:8123）
    pub url: String,
    /// 长期访问 token
    #[serde(default)]
    pub token: Option<String>,
    /// 超时时间（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    /// 配置中的 token，缺省时读环境变量
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct GatewayInfo {
    #[serde(default)]
    components: Vec<String>,
}

/// REST 网关 host
#[derive(Debug)]
pub struct HttpHost {
    client: Client,
    config: GatewayConfig,
    token: String,
    components: HashSet<String>,
}

impl HttpHost {
    /// 建立连接并拉取可用 domain
    pub async fn connect(config: GatewayConfig) -> Result<Self> {
        let token = config
            .resolve_token()
            .ok_or_else(|| {
                anyhow!(
                    "gateway token is required (config `gateway.token` or {})",
                    TOKEN_ENV
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let info: GatewayInfo = client
            .get(config.endpoint("api/config"))
            .bearer_auth(&token)
            .send()
            .await
            .context("Failed to reach gateway")?
            .error_for_status()
            .context("Gateway rejected config request")?
            .json()
            .await
            .context("Failed to parse gateway config")?;

        info!(url = %config.url, components = info.components.len(), "Connected to gateway");

        Ok(Self {
            client,
            config,
            token,
            components: info.components.into_iter().collect(),
        })
    }
}

#[async_trait]
impl ServiceHost for HttpHost {
    async fn invoke(
        &self,
        domain: &str,
        service: &str,
        payload: &Map<String, Value>,
    ) -> Result<()> {
        let url = self.config.endpoint(&format!("api/services/{}/{}", domain, service));
        debug!(%url, "Calling gateway service");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("HTTP request to {}.{} failed", domain, service))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(anyhow!("{}.{} returned {}: {}", domain, service, status, body))
        }
    }

    fn is_domain_available(&self, domain: &str) -> bool {
        self.components.contains(domain)
    }

    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
