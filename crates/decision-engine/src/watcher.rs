//! 规则目录热更新
//!
//! 目录文件夹中每个 `<domain>.json` 是一个域的规则列表。`FileCatalogWatcher`
//! 监听文件变化，经 debounce 窗口去抖后重新加载变更的文件并发布；
//! 加载失败时保留当前目录。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::catalog::CatalogLoadReport;
use crate::service::DecisionService;

/// 目录监听器抽象
#[async_trait]
pub trait CatalogWatcher: Send + Sync {
    /// 启动监听，目录变更时自动发布
    async fn start(&self) -> Result<()>;

    /// 停止监听并释放资源
    async fn stop(&self) -> Result<()>;
}

/// 是否是目录文件（`*.json`）
fn is_catalog_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// 把目录文件的变更送入重载队列，返回是否入队
fn forward_change(tx: &mpsc::Sender<PathBuf>, path: PathBuf) -> bool {
    if !is_catalog_file(&path) {
        return false;
    }
    match tx.try_send(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "目录变更事件入队失败，已丢弃");
            false
        }
    }
}

/// 加载单个目录文件，文件名（不含扩展名）即域名
pub fn load_catalog_file(service: &DecisionService, path: &Path) -> Result<CatalogLoadReport> {
    let domain = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("无法从文件名推断域: {}", path.display()))?;
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("读取目录文件失败: {}", path.display()))?;
    let report = service
        .load_catalog_json(domain, &json)
        .with_context(|| format!("加载目录失败: {}", path.display()))?;
    Ok(report)
}

/// 加载文件夹中的全部目录文件
///
/// 单个文件失败只记录日志，不影响其他文件。
pub fn load_catalog_dir(service: &DecisionService, dir: &Path) -> Result<Vec<CatalogLoadReport>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("读取目录文件夹失败: {}", dir.display()))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_catalog_file(path))
        .collect();
    paths.sort();

    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        match load_catalog_file(service, &path) {
            Ok(report) => reports.push(report),
            Err(e) => error!(path = %path.display(), error = %e, "目录文件加载失败"),
        }
    }

    info!(dir = %dir.display(), loaded = reports.len(), "目录文件夹加载完成");
    Ok(reports)
}

/// 基于文件系统事件的目录监听器
pub struct FileCatalogWatcher {
    /// 监听的目录文件夹
    dir: PathBuf,
    /// debounce 窗口，避免文件连续写入触发多次重载
    debounce: Duration,
    service: Arc<DecisionService>,
    /// notify watcher 需要在监听期间保持存活
    watcher: Mutex<Option<RecommendedWatcher>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl FileCatalogWatcher {
    pub fn new(dir: impl AsRef<Path>, debounce: Duration, service: Arc<DecisionService>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            dir: dir.as_ref().to_path_buf(),
            debounce,
            service,
            watcher: Mutex::new(None),
            shutdown_tx,
            shutdown_rx,
        }
    }
}

#[async_trait]
impl CatalogWatcher for FileCatalogWatcher {
    async fn start(&self) -> Result<()> {
        let (event_tx, mut event_rx) = mpsc::channel::<PathBuf>(64);

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    // 只关心写入/创建事件，删除文件不撤销已发布的目录
                    if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        for path in event.paths {
                            forward_change(&event_tx, path);
                        }
                    }
                }
                Err(e) => warn!(error = %e, "文件监听器事件错误"),
            })
            .context("创建文件监听器失败")?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .context("启动文件监听失败")?;
        *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(watcher);
        info!(dir = %self.dir.display(), "目录文件监听已启动");

        let debounce = self.debounce;
        let service = Arc::clone(&self.service);
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(first) = event_rx.recv() => {
                        // Debounce：等待窗口期，合并窗口内的重复事件
                        tokio::time::sleep(debounce).await;
                        let mut changed = HashSet::from([first]);
                        while let Ok(path) = event_rx.try_recv() {
                            changed.insert(path);
                        }

                        for path in changed {
                            if !path.is_file() {
                                continue;
                            }
                            match load_catalog_file(&service, &path) {
                                Ok(report) => info!(
                                    domain = %report.domain,
                                    loaded = report.loaded,
                                    rejected = report.rejected.len(),
                                    "目录文件变更，已重新加载"
                                ),
                                Err(e) => error!(
                                    path = %path.display(),
                                    error = %e,
                                    "目录重新加载失败，保留当前目录"
                                ),
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("目录文件监听已停止");
                            break;
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fraud_shared::config::EngineSettings;

    fn service() -> Arc<DecisionService> {
        Arc::new(DecisionService::new(EngineSettings::default()))
    }

    #[test]
    fn test_forward_change_reports_dropped_events() {
        let (tx, mut rx) = mpsc::channel::<PathBuf>(1);

        assert!(!forward_change(&tx, PathBuf::from("/catalogs/notes.md")));
        assert!(forward_change(&tx, PathBuf::from("/catalogs/bank.json")));
        // 队列已满
        assert!(!forward_change(&tx, PathBuf::from("/catalogs/ecommerce.json")));

        assert_eq!(rx.try_recv().unwrap(), PathBuf::from("/catalogs/bank.json"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_load_catalog_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bank.json"), r#"[{"ruleId": "B-1"}]"#).unwrap();
        std::fs::write(dir.path().join("ecommerce.json"), "not json").unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let service = service();
        let reports = load_catalog_dir(&service, dir.path()).unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].domain, "bank");
        assert_eq!(service.store().domains(), vec!["bank"]);
    }

    #[test]
    fn test_load_missing_dir() {
        let service = service();
        assert!(load_catalog_dir(&service, Path::new("/nonexistent-catalog-dir")).is_err());
    }

    #[tokio::test]
    async fn test_watcher_reloads_changed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.json");
        std::fs::write(&path, r#"[{"ruleId": "B-1"}]"#).unwrap();

        let service = service();
        load_catalog_dir(&service, dir.path()).unwrap();
        assert_eq!(service.store().get("bank").unwrap().len(), 1);

        let watcher =
            FileCatalogWatcher::new(dir.path(), Duration::from_millis(50), service.clone());
        watcher.start().await.unwrap();

        std::fs::write(&path, r#"[{"ruleId": "B-1"}, {"ruleId": "B-2"}]"#).unwrap();

        let mut reloaded = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if service.store().get("bank").map(|c| c.len()) == Some(2) {
                reloaded = true;
                break;
            }
        }
        assert!(reloaded, "目录应在文件变更后重新加载");

        // 非法内容不替换当前目录
        std::fs::write(&path, "{broken").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(service.store().get("bank").unwrap().len(), 2);

        watcher.stop().await.unwrap();
    }
}
