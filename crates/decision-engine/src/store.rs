//! 规则目录存储
//!
//! 每个业务域一份不可变的 `Arc<RuleCatalog>`，整张映射通过 ArcSwap 原子替换。
//! 读者无锁，评估期间持有的目录快照不会被半途修改。

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::catalog::{RuleCatalog, normalize_domain};

type CatalogMap = HashMap<String, Arc<RuleCatalog>>;

/// 目录存储
#[derive(Clone)]
pub struct CatalogStore {
    catalogs: Arc<ArcSwap<CatalogMap>>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self {
            catalogs: Arc::new(ArcSwap::from_pointee(HashMap::new())),
        }
    }

    /// 已发布目录的域数量
    pub fn len(&self) -> usize {
        self.catalogs.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.load().is_empty()
    }

    /// 发布目录，替换同域的旧目录
    ///
    /// 返回被替换的旧目录。
    #[instrument(skip(self, catalog), fields(domain = %catalog.domain(), rules = catalog.len()))]
    pub fn publish(&self, catalog: RuleCatalog) -> Option<Arc<RuleCatalog>> {
        let domain = catalog.domain().to_string();
        let catalog = Arc::new(catalog);

        let previous = self.catalogs.rcu(|current| {
            let mut next = CatalogMap::clone(current);
            next.insert(domain.clone(), Arc::clone(&catalog));
            next
        });

        info!(loaded_at = %catalog.loaded_at(), "目录已发布: {}", domain);
        previous.get(&domain).cloned()
    }

    /// 获取域目录快照
    pub fn get(&self, domain: &str) -> Option<Arc<RuleCatalog>> {
        self.catalogs.load().get(&normalize_domain(domain)).cloned()
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.catalogs.load().contains_key(&normalize_domain(domain))
    }

    /// 移除域目录
    #[instrument(skip(self))]
    pub fn remove(&self, domain: &str) -> Option<Arc<RuleCatalog>> {
        let key = normalize_domain(domain);
        let previous = self.catalogs.rcu(|current| {
            let mut next = CatalogMap::clone(current);
            next.remove(&key);
            next
        });

        let removed = previous.get(&key).cloned();
        if removed.is_some() {
            info!("目录已移除: {}", key);
        } else {
            warn!("移除不存在的目录: {}", key);
        }
        removed
    }

    /// 所有已发布的域
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.catalogs.load().keys().cloned().collect();
        domains.sort();
        domains
    }

    /// 清空所有目录
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let previous = self.catalogs.swap(Arc::new(HashMap::new()));
        info!("已清空 {} 个目录", previous.len());
    }

    /// 获取存储统计信息
    pub fn stats(&self) -> CatalogStoreStats {
        let snapshot = self.catalogs.load();
        let domains = snapshot.len();
        let total_rules: usize = snapshot.values().map(|c| c.len()).sum();
        let enabled_rules: usize = snapshot.values().map(|c| c.enabled_count()).sum();
        let total_fields: usize = snapshot.values().map(|c| c.referenced_fields().len()).sum();

        CatalogStoreStats {
            domains,
            total_rules,
            enabled_rules,
            avg_fields_per_catalog: if domains > 0 {
                total_fields as f64 / domains as f64
            } else {
                0.0
            },
        }
    }
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 目录存储统计信息
#[derive(Debug, Clone)]
pub struct CatalogStoreStats {
    /// 已发布目录的域数量
    pub domains: usize,
    /// 规则总数
    pub total_rules: usize,
    /// 启用的规则数
    pub enabled_rules: usize,
    /// 平均每个目录引用的字段数
    pub avg_fields_per_catalog: f64,
}
