//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_metrics();
    metrics::counter!("service_starts_total", "service" => config.service_name.clone())
        .increment(1);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 描述决策引擎使用的指标，HELP 注释出现在 /metrics 输出中
pub fn describe_metrics() {
    metrics::describe_counter!(
        "decision_evaluations_total",
        "Total number of transaction decisions"
    );
    metrics::describe_histogram!(
        "decision_evaluation_duration_seconds",
        "Rule catalog evaluation duration in seconds"
    );
    metrics::describe_counter!("rule_triggers_total", "Total number of matched rules");
    metrics::describe_counter!(
        "rule_evaluation_errors_total",
        "Clause and action errors swallowed during evaluation"
    );
    metrics::describe_counter!("catalog_loads_total", "Total number of catalog publications");
    metrics::describe_counter!(
        "catalog_rules_rejected_total",
        "Malformed rules excluded at catalog load"
    );
    metrics::describe_gauge!("catalog_rules", "Rules in the currently published catalog");
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次交易决策
#[inline]
pub fn record_decision(domain: &str, decision: &str, duration_secs: f64) {
    metrics::counter!(
        "decision_evaluations_total",
        "domain" => domain.to_string(),
        "decision" => decision.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "decision_evaluation_duration_seconds",
        "domain" => domain.to_string()
    )
    .record(duration_secs);
}

/// 记录规则命中
#[inline]
pub fn record_rule_trigger(domain: &str, rule_id: &str) {
    metrics::counter!(
        "rule_triggers_total",
        "domain" => domain.to_string(),
        "rule_id" => rule_id.to_string()
    )
    .increment(1);
}

/// 记录评估期间被吞掉的错误（clause / action）
#[inline]
pub fn record_evaluation_error(stage: &str) {
    metrics::counter!("rule_evaluation_errors_total", "stage" => stage.to_string()).increment(1);
}

/// 记录目录发布
#[inline]
pub fn record_catalog_load(domain: &str, loaded: usize, rejected: usize) {
    metrics::counter!("catalog_loads_total", "domain" => domain.to_string()).increment(1);
    metrics::counter!(
        "catalog_rules_rejected_total",
        "domain" => domain.to_string()
    )
    .increment(rejected as u64);
    metrics::gauge!("catalog_rules", "domain" => domain.to_string()).set(loaded as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        describe_metrics();
        record_decision("bank", "DENY", 0.001);
        record_rule_trigger("bank", "R-001");
        record_evaluation_error("clause");
        record_catalog_load("bank", 3, 1);
    }
}
