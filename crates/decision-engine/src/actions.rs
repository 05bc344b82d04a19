//! 动作应用
//!
//! 规则命中后按列表顺序对决策输出应用动作。单个动作失败只跳过该动作。

use fraud_shared::observability::metrics as engine_metrics;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::models::{ActionDefinition, DecisionOutput};
use crate::operators::ActionType;

/// 调整后分数的约束策略
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScorePolicy {
    /// 不截断
    #[default]
    Unclamped,
    /// 截断到 [min, max]
    Clamped { min: f64, max: f64 },
}

impl ScorePolicy {
    /// 常用的 [0, 1] 截断
    pub fn unit_interval() -> Self {
        Self::Clamped { min: 0.0, max: 1.0 }
    }

    pub fn apply(&self, score: f64) -> f64 {
        match *self {
            Self::Unclamped => score,
            // 不用 f64::clamp：配置错误（min > max）时它会 panic
            Self::Clamped { min, max } => score.max(min).min(max),
        }
    }
}

/// 动作应用器
pub struct ActionApplier;

impl ActionApplier {
    /// 依次应用规则的全部动作
    pub fn apply_all(
        rule_id: &str,
        actions: &[ActionDefinition],
        output: &mut DecisionOutput,
        policy: ScorePolicy,
    ) {
        for action in actions {
            if let Err(e) = Self::apply(action, output, policy) {
                warn!(
                    rule_id = %rule_id,
                    action = %action.action_type,
                    error = %e,
                    "动作应用失败，已跳过"
                );
                engine_metrics::record_evaluation_error("action");
            }
        }
    }

    /// 应用单个动作
    pub fn apply(
        action: &ActionDefinition,
        output: &mut DecisionOutput,
        policy: ScorePolicy,
    ) -> Result<()> {
        match &action.action_type {
            ActionType::SetDecision => {
                if action.value.is_null() {
                    return Err(EngineError::InvalidOperand(
                        "SET_DECISION 缺少决策值".to_string(),
                    ));
                }
                let decision = action.value.to_display_string();
                debug!(decision = %decision, "设置决策");
                output.decision = Some(decision);
                if let Some(reason) = &action.reason_code {
                    output.reason_codes.push(reason.clone());
                }
                Ok(())
            }
            ActionType::AddFlag => {
                if action.value.is_null() {
                    return Err(EngineError::InvalidOperand("ADD_FLAG 缺少标记值".to_string()));
                }
                output.flags.push(action.value.to_display_string());
                Ok(())
            }
            ActionType::AdjustMlScoreRelativePoints => {
                let points = action
                    .value
                    .as_number()
                    .ok_or_else(|| EngineError::TypeMismatch {
                        expected: "number".to_string(),
                        actual: action.value.type_name().to_string(),
                    })?;
                output.final_adjusted_score = policy.apply(output.final_adjusted_score + points);
                Ok(())
            }
            ActionType::Unknown(name) => Err(EngineError::UnsupportedAction(name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldValue;

    #[test]
    fn test_set_decision_overwrites() {
        let mut output = DecisionOutput::new(0.4);
        ActionApplier::apply(
            &ActionDefinition::set_decision("REVIEW", "HIGH_VELOCITY"),
            &mut output,
            ScorePolicy::Unclamped,
        )
        .unwrap();
        ActionApplier::apply(
            &ActionDefinition::new(ActionType::SetDecision, "DENY"),
            &mut output,
            ScorePolicy::Unclamped,
        )
        .unwrap();

        assert_eq!(output.decision(), Some("DENY"));
        assert_eq!(output.reason_codes, vec!["HIGH_VELOCITY".to_string()]);
    }

    #[test]
    fn test_adjust_accumulates_unclamped() {
        let mut output = DecisionOutput::new(0.5);
        let actions = vec![
            ActionDefinition::adjust_score(0.10),
            ActionDefinition::adjust_score(-0.05),
        ];
        ActionApplier::apply_all("R-1", &actions, &mut output, ScorePolicy::Unclamped);

        assert!((output.final_adjusted_score - 0.55).abs() < 1e-9);
        assert_eq!(output.original_ml_score, 0.5);
    }

    #[test]
    fn test_adjust_clamped() {
        let mut output = DecisionOutput::new(0.95);
        ActionApplier::apply_all(
            "R-1",
            &[ActionDefinition::adjust_score(0.2)],
            &mut output,
            ScorePolicy::unit_interval(),
        );
        assert_eq!(output.final_adjusted_score, 1.0);

        let mut output = DecisionOutput::new(0.95);
        ActionApplier::apply_all(
            "R-1",
            &[ActionDefinition::adjust_score(0.2)],
            &mut output,
            ScorePolicy::Unclamped,
        );
        assert!(output.final_adjusted_score > 1.0);
    }

    #[test]
    fn test_invalid_actions_are_skipped() {
        let mut output = DecisionOutput::new(0.5);
        let actions = vec![
            ActionDefinition::new(ActionType::from("SEND_SMS"), "x"),
            ActionDefinition::new(ActionType::AdjustMlScoreRelativePoints, "lots"),
            ActionDefinition::new(ActionType::SetDecision, FieldValue::Null),
            ActionDefinition::add_flag("NEW_DEVICE"),
        ];
        ActionApplier::apply_all("R-1", &actions, &mut output, ScorePolicy::Unclamped);

        assert_eq!(output.decision(), None);
        assert_eq!(output.final_adjusted_score, 0.5);
        assert_eq!(output.flags, vec!["NEW_DEVICE".to_string()]);
    }

    #[test]
    fn test_unknown_action_error() {
        let mut output = DecisionOutput::new(0.5);
        let err = ActionApplier::apply(
            &ActionDefinition::new(ActionType::from("NOTIFY"), true),
            &mut output,
            ScorePolicy::Unclamped,
        )
        .unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_ACTION");
    }
}
