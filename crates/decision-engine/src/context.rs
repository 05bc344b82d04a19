//! 评估上下文与字段解析

use std::collections::HashMap;
use tracing::trace;

use crate::record::{FieldHolder, FieldRef};
use crate::value::{FeatureMap, FieldValue};

/// 机器学习分数的保留路径（大小写不敏感）
pub const ML_SCORE_PATH: &str = "mlScore";
/// 特征映射前缀（大小写敏感）
pub const PREPROCESSED_PREFIX: &str = "preprocessed.";
/// 默认的原始记录根别名
pub const DEFAULT_ROOT_ALIAS: &str = "rawInput";

/// 调用方附带的额外上下文，只随上下文传递，不参与字段解析
pub type ClientContextMap = HashMap<String, serde_json::Value>;

/// 评估上下文 - 单次评估期间只读
pub struct EvaluationContext<'a> {
    record: &'a dyn FieldHolder,
    ml_score: f64,
    features: &'a FeatureMap,
    client_context: Option<&'a ClientContextMap>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(record: &'a dyn FieldHolder, ml_score: f64, features: &'a FeatureMap) -> Self {
        Self {
            record,
            ml_score,
            features,
            client_context: None,
        }
    }

    pub fn with_client_context(mut self, client_context: &'a ClientContextMap) -> Self {
        self.client_context = Some(client_context);
        self
    }

    pub fn record(&self) -> &'a dyn FieldHolder {
        self.record
    }

    pub fn ml_score(&self) -> f64 {
        self.ml_score
    }

    pub fn features(&self) -> &'a FeatureMap {
        self.features
    }

    pub fn client_context(&self) -> Option<&'a ClientContextMap> {
        self.client_context
    }
}

/// 字段解析器
///
/// 解析顺序：
/// 1. `mlScore`（大小写不敏感）-> 上下文分数
/// 2. `preprocessed.<key>` -> 特征映射
/// 3. 其余按 `.` 切分，多段时去掉根别名，再逐段访问原始记录
///
/// 任何一步未命中都返回 `FieldValue::Null`。
#[derive(Debug, Clone)]
pub struct FieldResolver {
    root_aliases: Vec<String>,
}

impl Default for FieldResolver {
    fn default() -> Self {
        Self {
            root_aliases: vec![DEFAULT_ROOT_ALIAS.to_string()],
        }
    }
}

impl FieldResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 自定义根别名（大小写不敏感匹配）
    pub fn with_root_aliases<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root_aliases: aliases.into_iter().map(Into::into).collect(),
        }
    }

    pub fn root_aliases(&self) -> &[String] {
        &self.root_aliases
    }

    pub fn resolve(&self, path: &str, context: &EvaluationContext<'_>) -> FieldValue {
        if path.trim().is_empty() {
            return FieldValue::Null;
        }

        if path.eq_ignore_ascii_case(ML_SCORE_PATH) {
            return FieldValue::Number(context.ml_score());
        }

        if let Some(key) = path.strip_prefix(PREPROCESSED_PREFIX) {
            return context.features().get(key).cloned().unwrap_or_default();
        }

        let mut segments: Vec<&str> = path.split('.').collect();
        if segments.len() > 1 && self.is_root_alias(segments[0]) {
            segments.remove(0);
        }

        let resolved = Self::traverse(context.record(), &segments);
        if resolved.is_null() {
            trace!(path, "字段未解析，按 null 处理");
        }
        resolved
    }

    fn is_root_alias(&self, segment: &str) -> bool {
        self.root_aliases
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case(segment))
    }

    fn traverse(root: &dyn FieldHolder, segments: &[&str]) -> FieldValue {
        let mut current = root;
        let last = segments.len().saturating_sub(1);

        for (i, segment) in segments.iter().enumerate() {
            match Self::probe(current, segment) {
                None => return FieldValue::Null,
                Some(FieldRef::Nested(holder)) => {
                    if i == last {
                        return FieldValue::String(holder.type_name().to_string());
                    }
                    current = holder;
                }
                // 标量或 null 只能出现在路径末尾
                Some(FieldRef::Value(v)) => {
                    return if i == last { v } else { FieldValue::Null };
                }
            }
        }

        FieldValue::Null
    }

    /// 依次尝试 `getX`、`isX`、`X`
    fn probe<'h>(holder: &'h dyn FieldHolder, segment: &str) -> Option<FieldRef<'h>> {
        if segment.is_empty() {
            return None;
        }
        let capitalized = capitalize(segment);
        holder
            .accessor(&format!("get{}", capitalized))
            .or_else(|| holder.accessor(&format!("is{}", capitalized)))
            .or_else(|| holder.accessor(segment))
    }
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BankClientContext, BankTransaction};

    fn bank_record() -> BankTransaction {
        BankTransaction {
            user_id: Some("u-42".to_string()),
            transaction_amount: 100.0,
            transaction_type: Some("transfer".to_string()),
            currency: None,
            client_context: Some(BankClientContext {
                balance_before: 5000.0,
                is_new_device: true,
                hour_of_day: 23,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn features() -> FeatureMap {
        let mut map = FeatureMap::new();
        map.insert("is_night".to_string(), FieldValue::Bool(true));
        map.insert("amount_to_balance_ratio".to_string(), FieldValue::Number(0.02));
        map
    }

    #[test]
    fn test_ml_score_case_insensitive() {
        let record = bank_record();
        let features = features();
        let ctx = EvaluationContext::new(&record, 0.73, &features);
        let resolver = FieldResolver::new();

        assert_eq!(resolver.resolve("mlScore", &ctx), FieldValue::Number(0.73));
        assert_eq!(resolver.resolve("MLSCORE", &ctx), FieldValue::Number(0.73));
    }

    #[test]
    fn test_preprocessed_lookup() {
        let record = bank_record();
        let features = features();
        let ctx = EvaluationContext::new(&record, 0.1, &features);
        let resolver = FieldResolver::new();

        assert_eq!(
            resolver.resolve("preprocessed.is_night", &ctx),
            FieldValue::Bool(true)
        );
        assert!(resolver.resolve("preprocessed.unknown", &ctx).is_null());
        // 前缀大小写敏感，落入原始记录解析
        assert!(resolver.resolve("Preprocessed.is_night", &ctx).is_null());
    }

    #[test]
    fn test_raw_record_paths() {
        let record = bank_record();
        let features = features();
        let ctx = EvaluationContext::new(&record, 0.1, &features);
        let resolver = FieldResolver::new();

        assert_eq!(
            resolver.resolve("rawInput.transactionAmount", &ctx),
            FieldValue::Number(100.0)
        );
        assert_eq!(
            resolver.resolve("RAWINPUT.transactionAmount", &ctx),
            FieldValue::Number(100.0)
        );
        assert_eq!(
            resolver.resolve("transactionType", &ctx),
            FieldValue::from("transfer")
        );
        assert_eq!(
            resolver.resolve("rawInput.clientContext.newDevice", &ctx),
            FieldValue::Bool(true)
        );
        assert_eq!(
            resolver.resolve("clientContext.isNewDevice", &ctx),
            FieldValue::Bool(true)
        );
        assert_eq!(
            resolver.resolve("rawInput.clientContext.hourOfDay", &ctx),
            FieldValue::Number(23.0)
        );
    }

    #[test]
    fn test_unresolved_paths_are_null() {
        let record = bank_record();
        let features = features();
        let ctx = EvaluationContext::new(&record, 0.1, &features);
        let resolver = FieldResolver::new();

        assert!(resolver.resolve("", &ctx).is_null());
        assert!(resolver.resolve("   ", &ctx).is_null());
        assert!(resolver.resolve("rawInput", &ctx).is_null());
        assert!(resolver.resolve("rawInput.noSuchField", &ctx).is_null());
        assert!(resolver.resolve("rawInput.currency", &ctx).is_null());
        // 标量中间值无法继续下钻
        assert!(resolver.resolve("transactionAmount.value", &ctx).is_null());
    }

    #[test]
    fn test_path_ending_on_nested_record() {
        let record = bank_record();
        let features = features();
        let ctx = EvaluationContext::new(&record, 0.1, &features);

        assert_eq!(
            FieldResolver::new().resolve("rawInput.clientContext", &ctx),
            FieldValue::from("BankClientContext")
        );
    }

    #[test]
    fn test_missing_nested_record() {
        let record = BankTransaction::default();
        let features = FeatureMap::new();
        let ctx = EvaluationContext::new(&record, 0.1, &features);

        assert!(
            FieldResolver::new()
                .resolve("rawInput.clientContext.newDevice", &ctx)
                .is_null()
        );
    }

    #[test]
    fn test_custom_root_alias() {
        let record = bank_record();
        let features = features();
        let ctx = EvaluationContext::new(&record, 0.1, &features);
        let resolver = FieldResolver::with_root_aliases(["txn"]);

        assert_eq!(
            resolver.resolve("txn.transactionAmount", &ctx),
            FieldValue::Number(100.0)
        );
        assert!(resolver.resolve("rawInput.transactionAmount", &ctx).is_null());
    }
}
