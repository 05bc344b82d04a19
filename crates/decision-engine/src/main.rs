//! 决策引擎宿主进程
//!
//! 从 stdin 读取 JSON 行请求，每行输出一个决策结果或错误，日志写到 stderr。

use anyhow::{Context, Result};
use decision_engine::watcher::load_catalog_dir;
use decision_engine::{
    CatalogBundle, CatalogWatcher, DecisionRequest, DecisionService, FileCatalogWatcher,
};
use fraud_shared::config::AppConfig;
use fraud_shared::observability;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load("decision-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(environment = %config.environment, "Starting decision-engine...");
    if config.is_production() && config.engine.trace {
        warn!("生产环境开启了评估追踪，每笔决策都会携带追踪信息");
    }

    let service = Arc::new(DecisionService::new(config.engine.clone()));

    if let Some(bundle_file) = &config.catalog.bundle_file {
        match load_bundle_file(&service, Path::new(bundle_file)) {
            Ok(domains) => info!("Loaded bundle {} ({} domains)", bundle_file, domains),
            Err(e) => warn!(error = %e, "Failed to load catalog bundle"),
        }
    }

    let catalog_dir = Path::new(&config.catalog.dir);
    if catalog_dir.is_dir() {
        load_catalog_dir(&service, catalog_dir)?;
    } else {
        warn!(dir = %catalog_dir.display(), "Catalog directory not found");
    }

    let watcher = if config.catalog.watch && catalog_dir.is_dir() {
        let watcher = FileCatalogWatcher::new(
            catalog_dir,
            Duration::from_millis(config.catalog.debounce_ms),
            Arc::clone(&service),
        );
        watcher.start().await?;
        Some(watcher)
    } else {
        None
    };

    let stats = service.store().stats();
    info!(
        domains = stats.domains,
        rules = stats.total_rules,
        enabled = stats.enabled_rules,
        "Decision service ready"
    );

    tokio::select! {
        result = serve_stdin(&service) => result?,
        _ = shutdown_signal() => {}
    }

    if let Some(watcher) = watcher {
        watcher.stop().await?;
    }
    service.shutdown();

    info!("Service shutdown complete");
    Ok(())
}

/// 加载远程配置负载文件，返回加载的域数量
fn load_bundle_file(service: &DecisionService, path: &Path) -> Result<usize> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("读取配置负载失败: {}", path.display()))?;
    let bundle = CatalogBundle::from_json(&json)?;
    let reports = service.load_bundle(bundle)?;
    Ok(reports.len())
}

/// 逐行处理 stdin 请求，直到 EOF
async fn serve_stdin(service: &DecisionService) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match handle_line(service, &line) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "请求处理失败");
                json!({ "error": e.to_string() })
            }
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    info!("stdin closed");
    Ok(())
}

fn handle_line(service: &DecisionService, line: &str) -> Result<serde_json::Value> {
    let request: DecisionRequest = serde_json::from_str(line).context("请求格式错误")?;
    let output = service.evaluate(request)?;
    Ok(serde_json::to_value(output)?)
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
