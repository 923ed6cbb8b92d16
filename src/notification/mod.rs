//! 通知路由核心 - 把一条逻辑消息扇出到多个渠道
//!
//! # 模块划分
//! 1. `sanitizer` / `time_policy` / `greeting`：纯函数
//! 2. `channel`：alias 解析，主服务 / 备用服务选择
//! 3. `composer`：问候语、前缀和正文拼接
//! 4. `payload`：按 domain 策略构建服务调用
//! 5. `dispatcher`：逐 target 状态机 + 并发执行
//!
//! # 使用示例
//! ```ignore
//! use universal_notifier::notification::{
//!     NotificationDispatcher, NotificationRequest, NotifierConfig,
//! };
//! use universal_notifier::notification::hosts::RecordingHost;
//!
//! let config = Arc::new(NotifierConfig::load(&path)?);
//! let dispatcher = NotificationDispatcher::new(config, Arc::new(RecordingHost::new()));
//! let request = NotificationRequest::new("Porta aperta", ["alexa", "telegram"]);
//! let report = dispatcher.send(&request).await?;
//! ```

pub mod channel;
pub mod composer;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod greeting;
pub mod host;
pub mod hosts;
pub mod invocation;
pub mod payload;
pub mod request;
pub mod sanitizer;
pub mod time_policy;

pub use channel::{
    ChannelDefinition, ChannelTable, ResolvedTarget, ServiceId, ServiceVariant, TargetRef,
};
pub use config::{DispatchPolicy, DndScope, NotifierConfig};
pub use dispatcher::{DispatchPlan, NotificationDispatcher, PlannedTarget};
pub use error::NotifyError;
pub use greeting::{GreetingOverride, GreetingTable};
pub use host::ServiceHost;
pub use invocation::{DispatchReport, InvocationKind, SendResult, ServiceInvocation, TargetOutcome};
pub use payload::{PayloadBuilder, PayloadPolicy, TransportStrategy};
pub use request::NotificationRequest;
pub use sanitizer::{clean_for_voice, sanitize_for_visual, EmphasisStyle, MarkupDialect};
pub use time_policy::{DndWindow, SlotTable, TimePolicy, TimeSlot};
