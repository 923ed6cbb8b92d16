//! Output formatting for CLI commands

use serde::Serialize;

use crate::notification::{DispatchReport, SendResult};

/// Format output as pretty JSON
pub fn format_output<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

pub fn describe_result(result: &SendResult) -> String {
    match result {
        SendResult::Sent => "sent".to_string(),
        SendResult::Skipped(reason) => format!("skipped ({})", reason),
        SendResult::Failed(reason) => format!("failed ({})", reason),
    }
}

/// 人类可读的分发报告
pub fn render_report(report: &DispatchReport, dry_run: bool) -> String {
    let mut lines = Vec::new();
    if dry_run {
        lines.push("[DRY-RUN] nothing was delivered".to_string());
    }

    // 调用按目标顺序连续排列，同一 alias 可能出现多次
    let mut outcomes = report.invocations.iter();
    for target in &report.targets {
        lines.push(format!(
            "{:<16} {}",
            target.alias,
            describe_result(&target.result)
        ));
        for outcome in outcomes.by_ref().take(target.invocations) {
            let payload = serde_json::Value::Object(outcome.invocation.payload.clone());
            lines.push(format!(
                "  -> {} {} [{}]",
                outcome.invocation.service_name(),
                payload,
                describe_result(&outcome.result)
            ));
        }
    }

    lines.push(format!(
        "{} sent, {} failed, {} skipped",
        report.sent_count(),
        report.failed().count(),
        report.skipped().count()
    ));
    lines.join("\n")
}
