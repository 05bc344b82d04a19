//! 条件组执行器
//!
//! 递归评估 AND/OR 条件树，按短路语义执行，可选记录评估追踪。
//! 子句错误在这里被吞掉：记录日志后按不匹配处理，不向上传播。

use fraud_shared::observability::metrics as engine_metrics;
use tracing::warn;

use crate::context::{EvaluationContext, FieldResolver};
use crate::evaluator::ClauseEvaluator;
use crate::models::{Clause, ConditionGroup, ConditionNode};
use crate::operators::LogicalOperator;

/// 条件组执行器
#[derive(Debug, Clone, Default)]
pub struct ConditionExecutor {
    resolver: FieldResolver,
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl ConditionExecutor {
    pub fn new(resolver: FieldResolver) -> Self {
        Self {
            resolver,
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace_enabled
    }

    pub fn resolver(&self) -> &FieldResolver {
        &self.resolver
    }

    /// 评估规则的条件根节点，缺省或空条件组无条件匹配
    pub fn evaluate(
        &self,
        group: Option<&ConditionGroup>,
        context: &EvaluationContext<'_>,
        trace: &mut Vec<String>,
    ) -> bool {
        match group {
            None => {
                self.push_trace(trace, || "root: 无条件，直接匹配".to_string());
                true
            }
            Some(group) => self.evaluate_group(group, context, trace, "root"),
        }
    }

    fn evaluate_node(
        &self,
        node: &ConditionNode,
        context: &EvaluationContext<'_>,
        trace: &mut Vec<String>,
        path: &str,
    ) -> bool {
        match node {
            ConditionNode::Clause(clause) => self.evaluate_clause(clause, context, trace, path),
            ConditionNode::Group(group) => self.evaluate_group(group, context, trace, path),
        }
    }

    /// 评估单个子句
    fn evaluate_clause(
        &self,
        clause: &Clause,
        context: &EvaluationContext<'_>,
        trace: &mut Vec<String>,
        path: &str,
    ) -> bool {
        let actual = self.resolver.resolve(&clause.field, context);

        let matched = match ClauseEvaluator::evaluate(&actual, &clause.operator, &clause.value) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(
                    field = %clause.field,
                    operator = %clause.operator,
                    error = %e,
                    "子句评估失败，按不匹配处理"
                );
                engine_metrics::record_evaluation_error("clause");
                false
            }
        };

        self.push_trace(trace, || {
            format!(
                "{}: {} ({}) {} {} => {}",
                path,
                clause.field,
                actual,
                clause.operator,
                clause.value,
                if matched { "MATCHED" } else { "NOT_MATCHED" }
            )
        });

        matched
    }

    /// 评估条件组（短路求值）
    fn evaluate_group(
        &self,
        group: &ConditionGroup,
        context: &EvaluationContext<'_>,
        trace: &mut Vec<String>,
        path: &str,
    ) -> bool {
        if group.is_empty() {
            self.push_trace(trace, || format!("{}: 空条件组，直接匹配", path));
            return true;
        }

        self.push_trace(trace, || {
            format!(
                "{}: 开始评估 {} 组 (共 {} 个子节点)",
                path,
                group.logical_operator,
                group.clauses.len()
            )
        });

        match group.logical_operator {
            LogicalOperator::And => {
                // AND: 遇到 false 立即返回
                for (i, child) in group.clauses.iter().enumerate() {
                    let child_path = format!("{}.clauses[{}]", path, i);
                    if !self.evaluate_node(child, context, trace, &child_path) {
                        self.push_trace(trace, || {
                            format!("{}: AND 短路 - 子节点 {} 不匹配", path, i)
                        });
                        return false;
                    }
                }
                self.push_trace(trace, || format!("{}: AND 组全部匹配", path));
                true
            }
            LogicalOperator::Or => {
                // OR: 遇到 true 立即返回
                for (i, child) in group.clauses.iter().enumerate() {
                    let child_path = format!("{}.clauses[{}]", path, i);
                    if self.evaluate_node(child, context, trace, &child_path) {
                        self.push_trace(trace, || format!("{}: OR 短路 - 子节点 {} 匹配", path, i));
                        return true;
                    }
                }
                self.push_trace(trace, || format!("{}: OR 组无匹配", path));
                false
            }
        }
    }

    fn push_trace<F>(&self, trace: &mut Vec<String>, entry: F)
    where
        F: FnOnce() -> String,
    {
        if self.trace_enabled {
            trace.push(entry());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldHolder, FieldRef};
    use crate::value::{FeatureMap, FieldValue};
    use crate::operators::Operator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 记录访问次数的测试记录：字段 a/b/c 分别取固定布尔值
    struct CountingRecord {
        reads: AtomicUsize,
        c_reads: AtomicUsize,
    }

    impl CountingRecord {
        fn new() -> Self {
            Self {
                reads: AtomicUsize::new(0),
                c_reads: AtomicUsize::new(0),
            }
        }
    }

    impl FieldHolder for CountingRecord {
        fn accessor(&self, name: &str) -> Option<FieldRef<'_>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let value = match name {
                "getA" => true,
                "getB" => false,
                "getC" => {
                    self.c_reads.fetch_add(1, Ordering::SeqCst);
                    true
                }
                "getT" => true,
                _ => return None,
            };
            Some(FieldRef::Value(FieldValue::Bool(value)))
        }

        fn type_name(&self) -> &'static str {
            "CountingRecord"
        }
    }

    fn is_true(field: &str) -> ConditionNode {
        Clause::new(field, Operator::Equals, true).into()
    }

    #[test]
    fn test_and_short_circuit() {
        let record = CountingRecord::new();
        let features = FeatureMap::new();
        let ctx = EvaluationContext::new(&record, 0.0, &features);
        let executor = ConditionExecutor::default();

        let group = ConditionGroup::and(vec![is_true("a"), is_true("b"), is_true("c")]);
        let mut trace = Vec::new();

        assert!(!executor.evaluate(Some(&group), &ctx, &mut trace));
        assert_eq!(record.c_reads.load(Ordering::SeqCst), 0);
        assert!(trace.is_empty());
    }

    #[test]
    fn test_or_short_circuit() {
        let record = CountingRecord::new();
        let features = FeatureMap::new();
        let ctx = EvaluationContext::new(&record, 0.0, &features);
        let executor = ConditionExecutor::default().with_trace();

        let group = ConditionGroup::or(vec![
            Clause::new("b", Operator::Equals, true).into(),
            is_true("a"),
            is_true("c"),
        ]);
        let mut trace = Vec::new();

        assert!(executor.evaluate(Some(&group), &ctx, &mut trace));
        assert_eq!(record.c_reads.load(Ordering::SeqCst), 0);
        assert!(trace.iter().any(|t| t.contains("OR 短路")));
    }

    #[test]
    fn test_empty_and_absent_groups_match() {
        let record = CountingRecord::new();
        let features = FeatureMap::new();
        let ctx = EvaluationContext::new(&record, 0.0, &features);
        let executor = ConditionExecutor::default();
        let mut trace = Vec::new();

        assert!(executor.evaluate(None, &ctx, &mut trace));
        assert!(executor.evaluate(Some(&ConditionGroup::and(vec![])), &ctx, &mut trace));
        assert!(executor.evaluate(Some(&ConditionGroup::or(vec![])), &ctx, &mut trace));
        assert_eq!(record.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_nested_groups() {
        let record = CountingRecord::new();
        let features = FeatureMap::new();
        let ctx = EvaluationContext::new(&record, 0.9, &features);
        let executor = ConditionExecutor::default().with_trace();

        // mlScore > 0.8 AND (b OR t)
        let group = ConditionGroup::and(vec![
            Clause::new("mlScore", Operator::GreaterThan, 0.8).into(),
            ConditionGroup::or(vec![is_true("b"), is_true("t")]).into(),
        ]);
        let mut trace = Vec::new();

        assert!(executor.evaluate(Some(&group), &ctx, &mut trace));
        assert!(trace.iter().any(|t| t.starts_with("root.clauses[1]")));
    }

    #[test]
    fn test_clause_error_is_not_match() {
        let record = CountingRecord::new();
        let features = FeatureMap::new();
        let ctx = EvaluationContext::new(&record, 0.5, &features);
        let executor = ConditionExecutor::default();

        let group = ConditionGroup::or(vec![
            Clause::new("mlScore", Operator::from("REGEX"), ".*").into(),
            Clause::new("a", Operator::GreaterThan, 1).into(),
        ]);
        let mut trace = Vec::new();

        assert!(!executor.evaluate(Some(&group), &ctx, &mut trace));
    }
}
