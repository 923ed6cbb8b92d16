//! 通知路由错误分类
//!
//! `Config` 在启动阶段返回，`InvalidRequest` 在请求入口返回；其余都是单个 target 级别的错误，
//! 记录日志并写入 `DispatchReport`，不会中断同一请求中的其他 target。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// 静态配置非法（空 slot 表、时间格式错误等）
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `send` 请求本身不合法（缺少 message、targets 为空）
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// 请求中的 alias 不在 channel 表中
    #[error("unknown target '{0}'")]
    UnknownTarget(String),

    /// host 当前没有加载该 domain
    #[error("domain '{domain}' is not available (target '{alias}')")]
    UnavailableDomain { alias: String, domain: String },

    /// service 标识无法拆分为 domain.service
    #[error("malformed service identifier '{service}' (target '{alias}')")]
    MalformedServiceId { alias: String, service: String },

    /// host 调用失败
    #[error("invocation {domain}.{service} failed: {reason}")]
    Invocation {
        domain: String,
        service: String,
        reason: String,
    },
}

impl NotifyError {
    pub fn config(message: impl Into<String>) -> Self {
        NotifyError::Config(message.into())
    }

    /// 是否为单个 target 级别的错误（只跳过该 target）
    pub fn is_per_target(&self) -> bool {
        !matches!(self, NotifyError::Config(_) | NotifyError::InvalidRequest(_))
    }
}
