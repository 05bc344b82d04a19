//! 规则操作符定义
//!
//! 操作符与动作类型按名称大小写不敏感解析，无法识别的名称原样保留，
//! 评估时按不支持处理，而不是在解析阶段拒绝整个规则。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// 条件操作符
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    // 空值检查
    IsNull,

    // 相等比较（布尔或字符串形式）
    Equals,
    NotEquals,

    // 数值比较
    GreaterThan,
    LessThan,
    Between,

    // 包含检查
    InList,

    /// 未识别的操作符名称
    Unknown(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Self::IsNull => "IS_NULL",
            Self::Equals => "EQUALS",
            Self::NotEquals => "NOT_EQUALS",
            Self::GreaterThan => "GREATER_THAN",
            Self::LessThan => "LESS_THAN",
            Self::Between => "BETWEEN",
            Self::InList => "IN_LIST",
            Self::Unknown(name) => name,
        }
    }
}

impl From<&str> for Operator {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "IS_NULL" => Self::IsNull,
            "EQUALS" => Self::Equals,
            "NOT_EQUALS" => Self::NotEquals,
            "GREATER_THAN" => Self::GreaterThan,
            "LESS_THAN" => Self::LessThan,
            "BETWEEN" => Self::Between,
            "IN_LIST" => Self::InList,
            _ => Self::Unknown(name.to_string()),
        }
    }
}

impl From<String> for Operator {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 逻辑操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    /// 缺省为 OR
    #[default]
    Or,
}

impl FromStr for LogicalOperator {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            _ => Err(EngineError::UnsupportedOperator(format!(
                "logicalOperator '{}'",
                s
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for LogicalOperator {
    /// null 视为 OR，无法识别的名称是反序列化错误
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(Self::Or),
            Some(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

/// 动作类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    SetDecision,
    AddFlag,
    AdjustMlScoreRelativePoints,
    /// 未识别的动作名称
    Unknown(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SetDecision => "SET_DECISION",
            Self::AddFlag => "ADD_FLAG",
            Self::AdjustMlScoreRelativePoints => "ADJUST_ML_SCORE_RELATIVE_POINTS",
            Self::Unknown(name) => name,
        }
    }
}

impl From<&str> for ActionType {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "SET_DECISION" => Self::SetDecision,
            "ADD_FLAG" => Self::AddFlag,
            "ADJUST_ML_SCORE_RELATIVE_POINTS" => Self::AdjustMlScoreRelativePoints,
            _ => Self::Unknown(name.to_string()),
        }
    }
}

impl From<String> for ActionType {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<ActionType> for String {
    fn from(action: ActionType) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_case_insensitive() {
        assert_eq!(Operator::from("between"), Operator::Between);
        assert_eq!(Operator::from("In_List"), Operator::InList);
        assert_eq!(
            Operator::from("CONTAINS"),
            Operator::Unknown("CONTAINS".to_string())
        );

        let op: Operator = serde_json::from_value(json!("greater_than")).unwrap();
        assert_eq!(op, Operator::GreaterThan);
        assert_eq!(serde_json::to_value(&op).unwrap(), json!("GREATER_THAN"));
    }

    #[test]
    fn test_logical_operator() {
        let op: LogicalOperator = serde_json::from_value(json!("and")).unwrap();
        assert_eq!(op, LogicalOperator::And);

        let op: LogicalOperator = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(op, LogicalOperator::Or);

        assert!(serde_json::from_value::<LogicalOperator>(json!("XOR")).is_err());
    }

    #[test]
    fn test_action_type() {
        assert_eq!(
            ActionType::from("adjust_ml_score_relative_points"),
            ActionType::AdjustMlScoreRelativePoints
        );
        let unknown = ActionType::from("SEND_EMAIL");
        assert_eq!(unknown.to_string(), "SEND_EMAIL");
    }
}
