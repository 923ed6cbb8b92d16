//! 通知分发器 - 把一次 `send` 请求展开成各渠道的服务调用并并发执行
//!
//! 每个请求 target 的处理流程：
//! 1. 解析 alias（未知 / domain 不可用 / 服务标识非法 -> 跳过）
//! 2. DND 门控（默认只作用于语音渠道）
//! 3. 计算音量：显式覆盖 > priority > slot 音量
//! 4. 组装文本并构建 payload
//!
//! 解析阶段是同步的纯计算；所有调用在同一个 barrier 上并发等待，
//! 单个调用失败不影响其他调用。

use chrono::{NaiveDateTime, NaiveTime};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::composer::{compose, ComposeInput, PrefixParts};
use super::config::{DndScope, NotifierConfig, DEFAULT_DATE_FORMAT, PRIORITY_VOLUME};
use super::error::NotifyError;
use super::greeting;
use super::host::ServiceHost;
use super::invocation::{
    DispatchReport, InvocationOutcome, SendResult, ServiceInvocation, TargetOutcome,
};
use super::payload::{resolve_parse_mode, strategy_for, PayloadBuilder, PayloadInput};
use super::request::NotificationRequest;
use super::sanitizer::MarkupDialect;
use super::time_policy::{self, TimePolicy};

/// 调用超时后的失败原因
pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// 同步解析阶段的产物
#[derive(Debug, Clone, Serialize)]
pub struct DispatchPlan {
    pub policy: TimePolicy,
    pub greeting: String,
    pub targets: Vec<PlannedTarget>,
}

/// 单个请求 target 的计划
#[derive(Debug, Clone, Serialize)]
pub struct PlannedTarget {
    pub alias: String,
    /// 跳过原因；`None` 表示有调用待执行
    pub skipped: Option<String>,
    pub invocations: Vec<ServiceInvocation>,
}

impl PlannedTarget {
    fn skipped(alias: &str, reason: impl Into<String>) -> Self {
        Self {
            alias: alias.to_string(),
            skipped: Some(reason.into()),
            invocations: Vec::new(),
        }
    }
}

impl DispatchPlan {
    pub fn invocation_count(&self) -> usize {
        self.targets.iter().map(|t| t.invocations.len()).sum()
    }
}

/// 请求级公共参数（所有 target 共享）
struct RequestContext<'a> {
    request: &'a NotificationRequest,
    policy: &'a TimePolicy,
    greeting: &'a str,
    prefix: PrefixParts,
    bold_prefix: bool,
}

/// 通知分发器
///
/// 配置只读共享；随机源加锁，可以被多个请求并发调用。
pub struct NotificationDispatcher {
    config: Arc<NotifierConfig>,
    host: Arc<dyn ServiceHost>,
    builder: PayloadBuilder,
    rng: Mutex<StdRng>,
}

impl NotificationDispatcher {
    pub fn new(config: Arc<NotifierConfig>, host: Arc<dyn ServiceHost>) -> Self {
        let builder = PayloadBuilder::new(config.policy.payload_policy());
        Self {
            config,
            host,
            builder,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// 固定随机源（测试用）
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// 指定时刻的时段策略
    pub fn policy_at(&self, now: NaiveTime) -> TimePolicy {
        time_policy::resolve(now, &self.config.slots, &self.config.dnd)
    }

    /// 解析请求，生成全部调用但不执行
    pub fn plan(&self, request: &NotificationRequest) -> Result<DispatchPlan, NotifyError> {
        request.validate()?;

        let now = self.host.now();
        let policy = self.policy_at(now.time());

        let greeting = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            greeting::select(
                &policy.slot,
                &self.config.greetings,
                Some(&request.override_greetings),
                request.skip_greeting,
                &mut *rng,
            )
        };

        let include_time = request.include_time.unwrap_or(self.config.include_time);
        let prefix = PrefixParts {
            assistant_name: request
                .assistant_name
                .clone()
                .unwrap_or_else(|| self.config.assistant_name.clone()),
            timestamp: include_time.then(|| format_timestamp(now, &self.config.date_format)),
        };

        info!(
            targets = request.targets.len(),
            slot = %policy.slot,
            volume = policy.volume,
            dnd = policy.dnd_active,
            priority = request.priority,
            "Dispatching notification"
        );

        let ctx = RequestContext {
            request,
            policy: &policy,
            greeting: &greeting,
            prefix,
            bold_prefix: request.bold_prefix.unwrap_or(self.config.bold_prefix),
        };

        let targets = request
            .targets
            .iter()
            .map(|alias| self.plan_target(alias, &ctx))
            .collect();

        Ok(DispatchPlan {
            policy,
            greeting,
            targets,
        })
    }

    fn plan_target(&self, alias: &str, ctx: &RequestContext<'_>) -> PlannedTarget {
        let overrides = ctx.request.overrides_for(alias);
        let host = &self.host;

        let resolved = match self.config.channels.resolve(
            alias,
            overrides.service_type.as_deref(),
            &|domain: &str| host.is_domain_available(domain),
        ) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(target = %alias, error = %e, "Skipping target");
                return PlannedTarget::skipped(alias, e.to_string());
            }
        };

        let volume_supplied = overrides.volume.is_some();
        let gated = resolved.is_voice || self.config.policy.dnd_scope == DndScope::AllChannels;
        if gated && ctx.policy.dnd_active && !ctx.request.priority && !volume_supplied {
            info!(target = %alias, "Do-not-disturb active, skipping target");
            return PlannedTarget::skipped(alias, "do not disturb");
        }

        let mut invocations = Vec::new();

        if resolved.is_voice {
            let level = effective_volume(
                overrides.volume.as_ref(),
                ctx.request.priority,
                ctx.policy.volume,
            );
            if resolved.volume_targets.is_empty() {
                debug!(target = %alias, "No playback devices, volume unchanged");
            } else if !self.host.is_domain_available("media_player") {
                warn!(target = %alias, "media_player domain unavailable, volume unchanged");
            } else {
                debug!(
                    target = %alias,
                    level,
                    devices = ?resolved.volume_targets,
                    "Setting volume"
                );
                invocations.push(ServiceInvocation::volume(alias, &resolved.volume_targets, level));
            }
        }

        let strategy = strategy_for(&resolved.service.domain);
        let parse_mode = resolve_parse_mode(
            strategy,
            overrides.parse_mode.as_deref(),
            &resolved.base_payload,
        );

        let raw_message = overrides.message.as_deref().unwrap_or(&ctx.request.message);
        let text = compose(&ComposeInput {
            raw_message,
            is_voice: resolved.is_voice,
            greeting: ctx.greeting,
            prefix: &ctx.prefix,
            dialect: MarkupDialect::from_parse_mode(parse_mode.as_deref()),
            bold_prefix: ctx.bold_prefix,
        });

        invocations.extend(self.builder.build(&PayloadInput {
            resolved: &resolved,
            text: &text,
            title: ctx.request.title.as_deref(),
            accessory: &overrides.accessory,
            requested_type: overrides.service_type.as_deref(),
            parse_mode: parse_mode.as_deref(),
        }));

        debug!(
            target = %alias,
            service = %resolved.service,
            invocations = invocations.len(),
            "Planned target"
        );

        PlannedTarget {
            alias: alias.to_string(),
            skipped: None,
            invocations,
        }
    }

    /// 解析并发送，等待全部调用完成
    pub async fn send(&self, request: &NotificationRequest) -> Result<DispatchReport, NotifyError> {
        self.send_with_deadline(request, None).await
    }

    /// 同 `send`，所有调用共用一个截止时间
    pub async fn send_with_deadline(
        &self,
        request: &NotificationRequest,
        timeout: Option<Duration>,
    ) -> Result<DispatchReport, NotifyError> {
        let plan = self.plan(request)?;
        Ok(self.execute(plan, timeout).await)
    }

    /// 并发执行计划中的全部调用
    pub async fn execute(&self, plan: DispatchPlan, timeout: Option<Duration>) -> DispatchReport {
        let deadline = timeout.map(|t| Instant::now() + t);

        let invocations: Vec<ServiceInvocation> = plan
            .targets
            .iter()
            .flat_map(|t| t.invocations.iter().cloned())
            .collect();

        let results = join_all(invocations.iter().map(|inv| self.run(inv, deadline))).await;

        let mut outcomes = invocations.into_iter().zip(results);
        let mut report = DispatchReport::default();

        for target in plan.targets {
            let result = match target.skipped {
                Some(reason) => SendResult::Skipped(reason),
                None => {
                    let mut result = SendResult::Sent;
                    for (invocation, outcome) in outcomes.by_ref().take(target.invocations.len()) {
                        if result.is_sent() && !outcome.is_sent() {
                            result = outcome.clone();
                        }
                        report.invocations.push(InvocationOutcome {
                            invocation,
                            result: outcome,
                        });
                    }
                    result
                }
            };
            report.targets.push(TargetOutcome {
                alias: target.alias,
                result,
                invocations: target.invocations.len(),
            });
        }

        info!(
            sent = report.sent_count(),
            failed = report.failed().count(),
            skipped = report.skipped().count(),
            "Dispatch complete"
        );

        report
    }

    async fn run(&self, invocation: &ServiceInvocation, deadline: Option<Instant>) -> SendResult {
        let call = self
            .host
            .invoke(&invocation.domain, &invocation.service, &invocation.payload);

        let outcome = match deadline {
            Some(deadline) => match timeout_at(deadline, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        target = %invocation.alias,
                        service = %invocation.service_name(),
                        "Invocation did not finish before the deadline"
                    );
                    return SendResult::Failed(DEADLINE_EXCEEDED.to_string());
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(()) => {
                debug!(
                    target = %invocation.alias,
                    service = %invocation.service_name(),
                    "Invocation sent"
                );
                SendResult::Sent
            }
            Err(e) => {
                let err = NotifyError::Invocation {
                    domain: invocation.domain.clone(),
                    service: invocation.service.clone(),
                    reason: format!("{:#}", e),
                };
                warn!(target = %invocation.alias, error = %err, "Invocation failed");
                SendResult::Failed(err.to_string())
            }
        }
    }
}

/// 音量优先级：显式覆盖 > priority > slot 音量。无法解析的覆盖值按未提供处理。
fn effective_volume(override_value: Option<&Value>, priority: bool, slot_volume: f64) -> f64 {
    if let Some(raw) = override_value {
        match parse_volume(raw) {
            Some(level) => return level.clamp(0.0, 1.0),
            None => warn!(value = %raw, "Ignoring unparsable volume override"),
        }
    }
    if priority {
        PRIORITY_VOLUME
    } else {
        slot_volume
    }
}

fn parse_volume(value: &Value) -> Option<f64> {
    let level = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    level.is_finite().then_some(level)
}

fn format_timestamp(now: NaiveDateTime, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", now.format(format)).is_err() {
        out.clear();
        let _ = write!(out, "{}", now.format(DEFAULT_DATE_FORMAT));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::hosts::RecordingHost;
    use chrono::NaiveDate;
    use serde_json::json;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn dispatcher(host: RecordingHost) -> NotificationDispatcher {
        let config = NotifierConfig::from_value(json!({
            "greetings": {"morning": ["Buongiorno"], "night": ["Buonanotte"]},
            "channels": {
                "alexa": {"service": "notify.alexa_media", "is_voice": true, "target": "media_player.echo"},
                "telefono": {"service": "notify.mobile_app_pixel"}
            }
        }))
        .unwrap();
        NotificationDispatcher::new(Arc::new(config), Arc::new(host))
            .with_rng(StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_effective_volume_precedence() {
        assert_eq!(effective_volume(Some(&json!(0.6)), true, 0.3), 0.6);
        assert_eq!(effective_volume(Some(&json!("0.25")), false, 0.3), 0.25);
        assert_eq!(effective_volume(Some(&json!(3)), false, 0.3), 1.0);
        assert_eq!(effective_volume(Some(&json!("loud")), true, 0.3), PRIORITY_VOLUME);
        assert_eq!(effective_volume(Some(&json!("loud")), false, 0.3), 0.3);
        assert_eq!(effective_volume(None, true, 0.3), PRIORITY_VOLUME);
        assert_eq!(effective_volume(None, false, 0.3), 0.3);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(at(8, 5), "%H:%M:%S"), "08:05:00");
        assert_eq!(format_timestamp(at(8, 5), "%d/%m %H:%M"), "14/03 08:05");
    }

    #[test]
    fn test_plan_morning() {
        let d = dispatcher(RecordingHost::new().with_clock(at(8, 15)));
        let plan = d
            .plan(&NotificationRequest::new("Porta aperta", ["alexa", "telefono"]))
            .unwrap();

        assert_eq!(plan.policy.slot, "morning");
        assert_eq!(plan.greeting, "Buongiorno");
        assert_eq!(plan.invocation_count(), 3);

        let alexa = &plan.targets[0];
        assert_eq!(alexa.invocations[0].service_name(), "media_player.volume_set");
        assert_eq!(alexa.invocations[0].payload["volume_level"], json!(0.35));
        assert_eq!(alexa.invocations[1].payload["message"], json!("Buongiorno. Porta aperta"));

        let phone = &plan.targets[1];
        assert_eq!(
            phone.invocations[0].payload["message"],
            json!("[Hal9000 - 08:15:00] Buongiorno. Porta aperta")
        );
    }

    #[test]
    fn test_plan_rejects_empty_targets() {
        let d = dispatcher(RecordingHost::new());
        let empty: [&str; 0] = [];
        assert!(matches!(
            d.plan(&NotificationRequest::new("x", empty)),
            Err(NotifyError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_policy_at() {
        let d = dispatcher(RecordingHost::new());
        let policy = d.policy_at(NaiveTime::from_hms_opt(23, 30, 0).unwrap());
        assert_eq!(policy.slot, "night");
        assert!(policy.dnd_active);
    }

    #[tokio::test]
    async fn test_execute_aggregates_per_target() {
        let host = RecordingHost::new()
            .with_clock(at(12, 30))
            .failing("media_player.volume_set");
        let d = dispatcher(host);
        let report = d
            .send(&NotificationRequest::new("Pranzo pronto", ["alexa", "telefono"]))
            .await
            .unwrap();

        assert_eq!(report.targets[0].alias, "alexa");
        assert!(matches!(report.targets[0].result, SendResult::Failed(_)));
        assert_eq!(report.targets[0].invocations, 2);
        assert_eq!(report.targets[1].result, SendResult::Sent);
        assert_eq!(report.sent_count(), 2);
    }
}
