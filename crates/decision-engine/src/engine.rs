//! 规则引擎编排
//!
//! 按优先级遍历启用的规则，命中后依次应用动作，最后补默认决策。
//! 评估是同步、确定性的，不做任何 I/O。

use std::time::Instant;
use tracing::debug;

use crate::actions::{ActionApplier, ScorePolicy};
use crate::catalog::RuleCatalog;
use crate::context::{DEFAULT_ROOT_ALIAS, EvaluationContext, FieldResolver};
use crate::executor::ConditionExecutor;
use crate::models::{
    DEFAULT_ALLOW_NO_DECISIVE_RULES, DEFAULT_ALLOW_NO_RULES, DecisionOutput, RuleDefinition,
};

/// 引擎选项
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// 默认分数策略，目录级策略优先
    pub score_policy: ScorePolicy,
    /// 是否在输出中记录评估追踪
    pub trace: bool,
    /// 原始记录的根别名
    pub root_aliases: Vec<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            score_policy: ScorePolicy::Unclamped,
            trace: false,
            root_aliases: vec![DEFAULT_ROOT_ALIAS.to_string()],
        }
    }
}

/// 规则引擎
#[derive(Debug, Clone)]
pub struct RuleEngine {
    executor: ConditionExecutor,
    score_policy: ScorePolicy,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl RuleEngine {
    pub fn new(options: EngineOptions) -> Self {
        let mut executor =
            ConditionExecutor::new(FieldResolver::with_root_aliases(options.root_aliases));
        if options.trace {
            executor = executor.with_trace();
        }

        Self {
            executor,
            score_policy: options.score_policy,
        }
    }

    pub fn score_policy(&self) -> ScorePolicy {
        self.score_policy
    }

    /// 使用引擎默认分数策略评估规则列表
    pub fn evaluate(
        &self,
        rules: &[RuleDefinition],
        context: &EvaluationContext<'_>,
    ) -> DecisionOutput {
        self.evaluate_with_policy(rules, context, self.score_policy)
    }

    /// 评估目录，目录级分数策略优先于引擎默认值
    pub fn evaluate_catalog(
        &self,
        catalog: &RuleCatalog,
        context: &EvaluationContext<'_>,
    ) -> DecisionOutput {
        let policy = catalog.score_policy().unwrap_or(self.score_policy);
        self.evaluate_with_policy(catalog.rules(), context, policy)
    }

    fn evaluate_with_policy(
        &self,
        rules: &[RuleDefinition],
        context: &EvaluationContext<'_>,
        policy: ScorePolicy,
    ) -> DecisionOutput {
        let start = Instant::now();
        let mut output = DecisionOutput::new(context.ml_score());

        if rules.is_empty() {
            output.default_allow(DEFAULT_ALLOW_NO_RULES);
            return output;
        }

        let mut ordered: Vec<&RuleDefinition> = rules.iter().collect();
        ordered.sort_by_key(|r| r.priority);

        let mut trace = Vec::new();
        for rule in ordered {
            if !rule.is_enabled {
                continue;
            }

            let matched = self
                .executor
                .evaluate(rule.conditions.as_ref(), context, &mut trace);

            if self.executor.trace_enabled() {
                trace.push(format!(
                    "rule {}: {}",
                    rule.rule_id,
                    if matched { "TRIGGERED" } else { "SKIPPED" }
                ));
            }

            if matched {
                debug!(rule_id = %rule.rule_id, priority = rule.priority, "规则命中");
                output.triggered_rule_ids.push(rule.rule_id.clone());
                ActionApplier::apply_all(&rule.rule_id, &rule.actions, &mut output, policy);
            }
        }

        if output.decision.is_none() {
            output.default_allow(DEFAULT_ALLOW_NO_DECISIVE_RULES);
        }

        output.evaluation_trace = trace;
        debug!(
            decision = output.decision().unwrap_or_default(),
            triggered = output.triggered_rule_ids.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "规则评估完成"
        );
        output
    }
}
