//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use super::ObservabilityConfig;
use crate::error::{GuardError, Result};

/// 初始化 Prometheus 指标导出
///
/// 在指定端口启动 HTTP 监听，暴露 `/metrics` 端点。需要在 tokio 运行时内调用。
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| GuardError::Observability(format!("指标导出器启动失败 {}: {}", addr, e)))?;

    register_common_metrics(&config.service_name);
    info!("Metrics exporter listening on {}", addr);

    Ok(())
}

/// 注册指标描述，这些描述会出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "username_rule_evaluations_total",
        "Total number of username admission evaluations"
    );
    metrics::describe_histogram!(
        "username_rule_evaluation_duration_seconds",
        "Username evaluation duration in seconds"
    );
    metrics::describe_counter!(
        "username_rule_changes_total",
        "Total number of username rule creations and removals"
    );
    metrics::describe_counter!(
        "rule_sync_messages_total",
        "Total number of rule sync messages pushed to admin channels"
    );
    metrics::describe_counter!(
        "username_enforcement_kicks_total",
        "Total number of connected sessions disconnected by a new rule"
    );
    metrics::describe_counter!(
        "rule_cache_restarts_total",
        "Total number of rule cache rebuilds"
    );
    metrics::describe_gauge!("username_rules_cached", "Number of live rules in the cache");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录用户名评估
///
/// outcome 取值：allowed / restricted / whitelisted
#[inline]
pub fn record_rule_evaluation(outcome: &'static str, duration_secs: f64) {
    metrics::counter!("username_rule_evaluations_total", "outcome" => outcome).increment(1);
    metrics::histogram!("username_rule_evaluation_duration_seconds").record(duration_secs);
}

/// 记录规则变更（created / removed）
#[inline]
pub fn record_rule_change(action: &'static str) {
    metrics::counter!("username_rule_changes_total", "action" => action).increment(1);
}

/// 记录同步消息推送（delta / reset / detail）
#[inline]
pub fn record_sync_messages(kind: &'static str, count: u64) {
    metrics::counter!("rule_sync_messages_total", "kind" => kind).increment(count);
}

/// 记录因新规则被断开的在线会话
#[inline]
pub fn record_enforcement_kick() {
    metrics::counter!("username_enforcement_kicks_total").increment(1);
}

/// 记录缓存重建结果（ok / failed）
#[inline]
pub fn record_cache_restart(result: &'static str) {
    metrics::counter!("rule_cache_restarts_total", "result" => result).increment(1);
}

/// 更新缓存规则数
#[inline]
pub fn set_cached_rules(count: usize) {
    metrics::gauge!("username_rules_cached").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_recorder() {
        // 未安装 recorder 时记录指标是空操作，不应 panic
        record_rule_evaluation("allowed", 0.001);
        record_rule_change("created");
        record_sync_messages("reset", 3);
        record_enforcement_kick();
        record_cache_restart("ok");
        set_cached_rules(2);
    }
}
