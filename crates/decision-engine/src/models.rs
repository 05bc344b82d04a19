//! 规则引擎领域模型
//!
//! 与远程下发的规则目录格式一一对应（camelCase），未知字段一律忽略。

use crate::operators::{ActionType, LogicalOperator, Operator};
use crate::value::FieldValue;
use serde::{Deserialize, Deserializer, Serialize};

pub const DECISION_ALLOW: &str = "ALLOW";
pub const DECISION_DENY: &str = "DENY";
pub const DECISION_REVIEW: &str = "REVIEW";

/// 目录为空时的默认原因码
pub const DEFAULT_ALLOW_NO_RULES: &str = "DEFAULT_ALLOW_NO_RULES";
/// 没有规则设置决策时的默认原因码
pub const DEFAULT_ALLOW_NO_DECISIVE_RULES: &str = "DEFAULT_ALLOW_NO_DECISIVE_RULES";

fn default_enabled() -> bool {
    true
}

/// 显式 `null` 与缺省键同样取默认值
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn null_as_enabled<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<bool>::deserialize(deserializer).map(|v| v.unwrap_or_else(default_enabled))
}

/// 规则定义
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    #[serde(default, deserialize_with = "null_as_default")]
    pub rule_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default = "default_enabled", deserialize_with = "null_as_enabled")]
    pub is_enabled: bool,
    /// 越小越先执行
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: i32,
    #[serde(default)]
    pub conditions: Option<ConditionGroup>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub actions: Vec<ActionDefinition>,
}

impl RuleDefinition {
    pub fn new(rule_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            description: None,
            domain: None,
            is_enabled: true,
            priority: 0,
            conditions: None,
            actions: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_conditions(mut self, conditions: ConditionGroup) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn with_action(mut self, action: ActionDefinition) -> Self {
        self.actions.push(action);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.is_enabled = false;
        self
    }
}

/// 条件组
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionGroup {
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    #[serde(default, deserialize_with = "null_as_default")]
    pub clauses: Vec<ConditionNode>,
}

impl ConditionGroup {
    pub fn new(logical_operator: LogicalOperator, clauses: Vec<ConditionNode>) -> Self {
        Self {
            logical_operator,
            clauses,
        }
    }

    pub fn and(clauses: Vec<ConditionNode>) -> Self {
        Self::new(LogicalOperator::And, clauses)
    }

    pub fn or(clauses: Vec<ConditionNode>) -> Self {
        Self::new(LogicalOperator::Or, clauses)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// 条件组的子节点：单个子句或嵌套条件组
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ConditionNode {
    Group(ConditionGroup),
    Clause(Clause),
}

impl<'de> Deserialize<'de> for ConditionNode {
    /// 带有 `logicalOperator` 键的对象是嵌套组，其余按子句解析
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let raw = serde_json::Value::deserialize(deserializer)?;
        let is_group = raw
            .as_object()
            .is_some_and(|obj| obj.contains_key("logicalOperator"));

        if is_group {
            ConditionGroup::deserialize(raw)
                .map(ConditionNode::Group)
                .map_err(D::Error::custom)
        } else {
            Clause::deserialize(raw)
                .map(ConditionNode::Clause)
                .map_err(D::Error::custom)
        }
    }
}

impl From<Clause> for ConditionNode {
    fn from(clause: Clause) -> Self {
        Self::Clause(clause)
    }
}

impl From<ConditionGroup> for ConditionNode {
    fn from(group: ConditionGroup) -> Self {
        Self::Group(group)
    }
}

/// 子句：字段 - 操作符 - 字面量
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clause {
    #[serde(default, deserialize_with = "null_as_default")]
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: FieldValue,
    /// 声明的数据类型，仅作为元数据保留
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl Clause {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            data_type: None,
        }
    }
}

/// 动作定义
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub value: FieldValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
}

impl ActionDefinition {
    pub fn new(action_type: ActionType, value: impl Into<FieldValue>) -> Self {
        Self {
            action_type,
            value: value.into(),
            reason_code: None,
        }
    }

    pub fn set_decision(decision: &str, reason_code: &str) -> Self {
        Self::new(ActionType::SetDecision, decision).with_reason(reason_code)
    }

    pub fn add_flag(flag: &str) -> Self {
        Self::new(ActionType::AddFlag, flag)
    }

    pub fn adjust_score(points: f64) -> Self {
        Self::new(ActionType::AdjustMlScoreRelativePoints, points)
    }

    pub fn with_reason(mut self, reason_code: impl Into<String>) -> Self {
        self.reason_code = Some(reason_code.into());
        self
    }
}

/// 决策输出
///
/// 每笔交易新建一个，仅在该交易评估期间被修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutput {
    pub decision: Option<String>,
    pub original_ml_score: f64,
    pub final_adjusted_score: f64,
    pub reason_codes: Vec<String>,
    pub flags: Vec<String>,
    pub triggered_rule_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evaluation_trace: Vec<String>,
}

impl DecisionOutput {
    pub fn new(ml_score: f64) -> Self {
        Self {
            decision: None,
            original_ml_score: ml_score,
            final_adjusted_score: ml_score,
            reason_codes: Vec::new(),
            flags: Vec::new(),
            triggered_rule_ids: Vec::new(),
            evaluation_trace: Vec::new(),
        }
    }

    pub fn decision(&self) -> Option<&str> {
        self.decision.as_deref()
    }

    /// 设置默认 ALLOW 决策并追加原因码
    pub(crate) fn default_allow(&mut self, reason_code: &str) {
        self.decision = Some(DECISION_ALLOW.to_string());
        self.reason_codes.push(reason_code.to_string());
    }
}
