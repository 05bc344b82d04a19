//! 规则目录加载
//!
//! 目录的顶层必须是 JSON 数组；每条规则独立反序列化和校验，失败的规则被剔除并
//! 记录在 [`CatalogLoadReport`] 中，其余规则照常可用。

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument, warn};

use crate::actions::ScorePolicy;
use crate::error::{EngineError, Result};
use crate::models::{ConditionGroup, ConditionNode, RuleDefinition};

/// 单个业务域的规则目录，加载后不可变
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    domain: String,
    /// 按 priority 稳定升序
    rules: Vec<RuleDefinition>,
    score_policy: Option<ScorePolicy>,
    /// 规则引用的全部字段路径
    referenced_fields: HashSet<String>,
    loaded_at: DateTime<Utc>,
}

impl RuleCatalog {
    pub fn new(domain: &str, mut rules: Vec<RuleDefinition>) -> Self {
        rules.sort_by_key(|r| r.priority);

        let mut referenced_fields = HashSet::new();
        for rule in &rules {
            if let Some(group) = &rule.conditions {
                collect_fields(group, &mut referenced_fields);
            }
        }

        Self {
            domain: normalize_domain(domain),
            rules,
            score_policy: None,
            referenced_fields,
            loaded_at: Utc::now(),
        }
    }

    pub fn empty(domain: &str) -> Self {
        Self::new(domain, Vec::new())
    }

    /// 目录级分数策略，覆盖引擎默认值
    pub fn with_score_policy(mut self, policy: ScorePolicy) -> Self {
        self.score_policy = Some(policy);
        self
    }

    /// 从 JSON 文本加载目录
    pub fn from_json(domain: &str, json: &str) -> Result<(Self, CatalogLoadReport)> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| EngineError::ParseError(format!("目录 {} 不是合法 JSON: {}", domain, e)))?;
        Self::from_value(domain, value)
    }

    /// 从 JSON 值加载目录，逐条校验
    #[instrument(skip(value))]
    pub fn from_value(domain: &str, value: Value) -> Result<(Self, CatalogLoadReport)> {
        let entries = match value {
            Value::Array(entries) => entries,
            other => {
                return Err(EngineError::ParseError(format!(
                    "目录 {} 顶层必须是数组, 实际 {}",
                    domain,
                    json_kind(&other)
                )));
            }
        };

        let mut report = CatalogLoadReport::new(domain);
        let mut rules = Vec::with_capacity(entries.len());
        let mut seen_ids = HashSet::new();

        for (index, entry) in entries.into_iter().enumerate() {
            let raw_id = entry
                .get("ruleId")
                .and_then(Value::as_str)
                .map(str::to_string);

            let parsed = serde_json::from_value::<RuleDefinition>(entry)
                .map_err(|e| EngineError::ParseError(e.to_string()))
                .and_then(|rule| validate_rule(&rule).map(|_| rule));

            match parsed {
                Ok(rule) => {
                    if !seen_ids.insert(rule.rule_id.clone()) {
                        warn!(rule_id = %rule.rule_id, "规则 ID 重复");
                    }
                    rules.push(rule);
                }
                Err(e) => {
                    warn!(
                        index,
                        rule_id = raw_id.as_deref().unwrap_or("<unknown>"),
                        error = %e,
                        "规则格式错误，已剔除"
                    );
                    report.rejected.push(RejectedRule {
                        index,
                        rule_id: raw_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.loaded = rules.len();
        info!(
            "目录加载完成: {} 成功, {} 失败",
            report.loaded,
            report.rejected.len()
        );

        Ok((Self::new(domain, rules), report))
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn rules(&self) -> &[RuleDefinition] {
        &self.rules
    }

    pub fn score_policy(&self) -> Option<ScorePolicy> {
        self.score_policy
    }

    pub fn referenced_fields(&self) -> &HashSet<String> {
        &self.referenced_fields
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|r| r.is_enabled).count()
    }
}

/// 目录加载报告
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogLoadReport {
    pub domain: String,
    pub loaded: usize,
    pub rejected: Vec<RejectedRule>,
}

impl CatalogLoadReport {
    fn new(domain: &str) -> Self {
        Self {
            domain: normalize_domain(domain),
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// 被剔除的规则
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRule {
    /// 在目录数组中的下标
    pub index: usize,
    pub rule_id: Option<String>,
    pub reason: String,
}

/// 远程配置负载中的全部目录
///
/// 负载形如 `{"rules": {"<domain>": [...]}, ...}`，其他顶层键忽略。
#[derive(Debug, Clone, Default)]
pub struct CatalogBundle {
    pub catalogs: Vec<RuleCatalog>,
    pub reports: Vec<CatalogLoadReport>,
}

impl CatalogBundle {
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    #[instrument(skip(value))]
    pub fn from_value(value: Value) -> Result<Self> {
        let mut root = match value {
            Value::Object(map) => map,
            other => {
                return Err(EngineError::ParseError(format!(
                    "配置负载必须是对象, 实际 {}",
                    json_kind(&other)
                )));
            }
        };

        let domains: HashMap<String, Value> = match root.remove("rules") {
            None | Some(Value::Null) => HashMap::new(),
            Some(Value::Object(map)) => map.into_iter().collect(),
            Some(other) => {
                return Err(EngineError::ParseError(format!(
                    "rules 必须是对象, 实际 {}",
                    json_kind(&other)
                )));
            }
        };

        let mut bundle = Self::default();
        for (domain, rules) in domains {
            // 单个域失败不影响其他域
            match RuleCatalog::from_value(&domain, rules) {
                Ok((catalog, report)) => {
                    bundle.catalogs.push(catalog);
                    bundle.reports.push(report);
                }
                Err(e) => warn!(domain = %domain, error = %e, "域目录加载失败，已跳过"),
            }
        }

        Ok(bundle)
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }
}

/// 校验单条规则
pub fn validate_rule(rule: &RuleDefinition) -> Result<()> {
    if rule.rule_id.trim().is_empty() {
        return Err(EngineError::InvalidRule {
            rule_id: String::new(),
            reason: "ruleId 不能为空".to_string(),
        });
    }

    if let Some(group) = &rule.conditions {
        validate_group(&rule.rule_id, group)?;
    }

    Ok(())
}

fn validate_group(rule_id: &str, group: &ConditionGroup) -> Result<()> {
    for node in &group.clauses {
        match node {
            ConditionNode::Clause(clause) => {
                if clause.field.trim().is_empty() {
                    return Err(EngineError::InvalidRule {
                        rule_id: rule_id.to_string(),
                        reason: "子句 field 不能为空".to_string(),
                    });
                }
            }
            ConditionNode::Group(inner) => validate_group(rule_id, inner)?,
        }
    }
    Ok(())
}

fn collect_fields(group: &ConditionGroup, fields: &mut HashSet<String>) {
    for node in &group.clauses {
        match node {
            ConditionNode::Clause(clause) => {
                fields.insert(clause.field.clone());
            }
            ConditionNode::Group(inner) => collect_fields(inner, fields),
        }
    }
}

pub(crate) fn normalize_domain(domain: &str) -> String {
    domain.trim().to_ascii_lowercase()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
