//! 决策服务
//!
//! 宿主显式创建并持有的引擎实例：加载目录、评估交易、关闭。
//! 目录通过 [`CatalogStore`] 原子发布，评估路径无锁。

use fraud_shared::config::EngineSettings;
use fraud_shared::observability::metrics as engine_metrics;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::actions::ScorePolicy;
use crate::catalog::{CatalogBundle, CatalogLoadReport, RuleCatalog};
use crate::context::{ClientContextMap, EvaluationContext};
use crate::engine::{EngineOptions, RuleEngine};
use crate::error::{EngineError, Result};
use crate::features::preprocess;
use crate::models::DecisionOutput;
use crate::record::{Domain, TransactionRecord};
use crate::store::CatalogStore;
use crate::value::FeatureMap;

/// 评估请求（与宿主的 JSON 行格式一致）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub domain: String,
    pub transaction: serde_json::Value,
    pub ml_score: f64,
    /// 调用方已算好的特征；缺省时由服务预处理
    #[serde(default)]
    pub features: Option<FeatureMap>,
    #[serde(default)]
    pub client_context: Option<ClientContextMap>,
}

/// 决策服务
pub struct DecisionService {
    store: CatalogStore,
    engine: RuleEngine,
    settings: EngineSettings,
    closed: AtomicBool,
}

impl DecisionService {
    pub fn new(settings: EngineSettings) -> Self {
        let engine = RuleEngine::new(EngineOptions {
            score_policy: ScorePolicy::Unclamped,
            trace: settings.trace,
            root_aliases: settings.root_aliases.clone(),
        });

        Self {
            store: CatalogStore::new(),
            engine,
            settings,
            closed: AtomicBool::new(false),
        }
    }

    /// 共享的目录存储
    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(EngineError::ServiceClosed);
        }
        Ok(())
    }

    /// 按配置决定域的分数策略，目录自带的策略优先
    fn apply_domain_policy(&self, catalog: RuleCatalog) -> RuleCatalog {
        if catalog.score_policy().is_none() && self.settings.clamps_domain(catalog.domain()) {
            let policy = ScorePolicy::Clamped {
                min: self.settings.score_min,
                max: self.settings.score_max,
            };
            return catalog.with_score_policy(policy);
        }
        catalog
    }

    /// 发布一个已构建的目录
    #[instrument(skip(self, catalog), fields(domain = %catalog.domain()))]
    pub fn load_catalog(&self, catalog: RuleCatalog) -> Result<()> {
        self.ensure_open()?;
        engine_metrics::record_catalog_load(catalog.domain(), catalog.len(), 0);
        self.publish(catalog)
    }

    /// 从 JSON 文本加载并发布单个域的目录
    pub fn load_catalog_json(&self, domain: &str, json: &str) -> Result<CatalogLoadReport> {
        self.ensure_open()?;
        let (catalog, report) = RuleCatalog::from_json(domain, json)?;
        self.publish_with_report(catalog, &report)?;
        Ok(report)
    }

    /// 加载远程配置负载中的全部目录
    #[instrument(skip(self, bundle), fields(catalogs = bundle.catalogs.len()))]
    pub fn load_bundle(&self, bundle: CatalogBundle) -> Result<Vec<CatalogLoadReport>> {
        self.ensure_open()?;
        for (catalog, report) in bundle.catalogs.into_iter().zip(bundle.reports.iter()) {
            self.publish_with_report(catalog, report)?;
        }
        info!("配置负载加载完成，当前域: {:?}", self.store.domains());
        Ok(bundle.reports)
    }

    fn publish_with_report(&self, catalog: RuleCatalog, report: &CatalogLoadReport) -> Result<()> {
        if !report.is_clean() {
            warn!(
                domain = %report.domain,
                rejected = report.rejected.len(),
                "目录中有规则被剔除"
            );
        }
        engine_metrics::record_catalog_load(&report.domain, report.loaded, report.rejected.len());
        self.publish(catalog)
    }

    /// 发布目录；与 `shutdown` 并发时撤回，关闭后的存储保持为空
    fn publish(&self, catalog: RuleCatalog) -> Result<()> {
        let domain = catalog.domain().to_string();
        self.store.publish(self.apply_domain_policy(catalog));
        if self.is_closed() {
            self.store.remove(&domain);
            return Err(EngineError::ServiceClosed);
        }
        Ok(())
    }

    /// 评估一笔 JSON 形式的交易
    pub fn evaluate(&self, request: DecisionRequest) -> Result<DecisionOutput> {
        self.ensure_open()?;
        let domain: Domain = request.domain.parse()?;
        let record = TransactionRecord::from_json(domain, request.transaction)?;

        self.evaluate_record(
            domain,
            &record,
            request.ml_score,
            request.features.as_ref(),
            request.client_context.as_ref(),
        )
    }

    /// 评估一笔已解析的交易
    ///
    /// `features` 为 None 时按记录所属业务域预处理。
    pub fn evaluate_record(
        &self,
        domain: Domain,
        record: &TransactionRecord,
        ml_score: f64,
        features: Option<&FeatureMap>,
        client_context: Option<&ClientContextMap>,
    ) -> Result<DecisionOutput> {
        self.ensure_open()?;
        if record.domain() != domain {
            return Err(EngineError::DomainMismatch {
                expected: domain.to_string(),
                actual: record.domain().to_string(),
            });
        }
        // 先确认目录存在，避免无谓的预处理
        if !self.store.contains(domain.as_str()) {
            return Err(EngineError::DomainNotInitialized(domain.to_string()));
        }

        let derived;
        let features = match features {
            Some(f) => f,
            None => {
                derived = preprocess(record)?;
                &derived
            }
        };

        let mut context = EvaluationContext::new(record.as_holder(), ml_score, features);
        if let Some(client_context) = client_context {
            context = context.with_client_context(client_context);
        }

        self.evaluate_context(domain.as_str(), &context)
    }

    /// 使用任意记录的上下文评估指定域的目录
    pub fn evaluate_context(
        &self,
        domain: &str,
        context: &EvaluationContext<'_>,
    ) -> Result<DecisionOutput> {
        self.ensure_open()?;
        let catalog = self
            .store
            .get(domain)
            .ok_or_else(|| EngineError::DomainNotInitialized(domain.to_string()))?;

        let start = Instant::now();
        let output = self.engine.evaluate_catalog(&catalog, context);
        let elapsed = start.elapsed().as_secs_f64();

        let decision = output.decision().unwrap_or_default();
        engine_metrics::record_decision(catalog.domain(), decision, elapsed);
        for rule_id in &output.triggered_rule_ids {
            engine_metrics::record_rule_trigger(catalog.domain(), rule_id);
        }

        debug!(
            domain = %catalog.domain(),
            decision,
            adjusted_score = output.final_adjusted_score,
            triggered = ?output.triggered_rule_ids,
            "交易决策完成"
        );
        Ok(output)
    }

    /// 关闭服务：清空目录，此后的评估返回 `ServiceClosed`
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.store.clear();
        info!("决策服务已关闭");
    }
}
