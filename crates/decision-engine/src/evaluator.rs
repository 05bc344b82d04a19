//! 子句评估器
//!
//! 对解析后的字段值和规则字面量应用单个操作符。类型不符、操作数格式
//! 错误和未知操作符以 `Err` 返回，由条件组执行器记录日志并按不匹配处理。

use crate::error::{EngineError, Result};
use crate::operators::Operator;
use crate::value::FieldValue;

/// 子句评估器
pub struct ClauseEvaluator;

impl ClauseEvaluator {
    /// 评估子句
    ///
    /// # Arguments
    /// * `actual` - 从上下文解析出的字段值
    /// * `operator` - 操作符
    /// * `expected` - 规则中定义的字面量
    pub fn evaluate(
        actual: &FieldValue,
        operator: &Operator,
        expected: &FieldValue,
    ) -> Result<bool> {
        if let Operator::Unknown(name) = operator {
            return Err(EngineError::UnsupportedOperator(name.clone()));
        }

        // IS_NULL 是唯一可能对 null 成立的操作符
        if *operator == Operator::IsNull {
            return Ok(actual.is_null());
        }
        if actual.is_null() {
            return Ok(false);
        }

        match operator {
            Operator::Equals => Ok(Self::equals(actual, expected)),
            Operator::NotEquals => Ok(!Self::equals(actual, expected)),
            Operator::GreaterThan => Self::compare(actual, expected, |a, b| a > b),
            Operator::LessThan => Self::compare(actual, expected, |a, b| a < b),
            Operator::InList => Self::in_list(actual, expected),
            Operator::Between => Self::between(actual, expected),
            Operator::IsNull | Operator::Unknown(_) => Ok(false),
        }
    }

    /// 相等比较：布尔值按布尔比较，其余按字符串形式比较
    fn equals(actual: &FieldValue, expected: &FieldValue) -> bool {
        if let Some(b) = actual.as_bool() {
            return expected.as_bool() == Some(b);
        }
        actual.matches_text(&expected.to_display_string())
    }

    /// 数值比较
    fn compare<F>(actual: &FieldValue, expected: &FieldValue, cmp: F) -> Result<bool>
    where
        F: Fn(f64, f64) -> bool,
    {
        match (actual.as_number(), expected.as_number()) {
            (Some(a), Some(b)) => Ok(cmp(a, b)),
            (None, _) => Err(EngineError::TypeMismatch {
                expected: "number".to_string(),
                actual: actual.type_name().to_string(),
            }),
            (_, None) => Err(EngineError::TypeMismatch {
                expected: "number".to_string(),
                actual: expected.type_name().to_string(),
            }),
        }
    }

    /// 列表包含：字面量为逗号分隔字符串或列表
    fn in_list(actual: &FieldValue, expected: &FieldValue) -> Result<bool> {
        match expected {
            FieldValue::String(csv) => {
                Ok(csv.split(',').any(|item| actual.matches_text(item.trim())))
            }
            FieldValue::List(items) => Ok(items
                .iter()
                .any(|item| actual.matches_text(&item.to_display_string()))),
            other => Err(EngineError::InvalidOperand(format!(
                "IN_LIST 需要字符串或列表, 实际 {}",
                other.type_name()
            ))),
        }
    }

    /// 区间判断：`[lo, hi]`，lo > hi 时视为环绕区间（如 22 点到次日 5 点）
    fn between(actual: &FieldValue, expected: &FieldValue) -> Result<bool> {
        let v = actual.as_number().ok_or_else(|| EngineError::TypeMismatch {
            expected: "number".to_string(),
            actual: actual.type_name().to_string(),
        })?;

        let (lo, hi) = match expected.as_list() {
            Some([lo, hi]) => match (lo.as_number(), hi.as_number()) {
                (Some(lo), Some(hi)) => (lo, hi),
                _ => {
                    return Err(EngineError::InvalidOperand(
                        "BETWEEN 边界必须是数值".to_string(),
                    ));
                }
            },
            _ => {
                return Err(EngineError::InvalidOperand(format!(
                    "BETWEEN 需要两个元素的列表, 实际 {}",
                    expected
                )));
            }
        };

        if lo <= hi {
            Ok(lo <= v && v <= hi)
        } else {
            Ok(v >= lo || v <= hi)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(
        actual: impl Into<FieldValue>,
        op: Operator,
        expected: impl Into<FieldValue>,
    ) -> Result<bool> {
        ClauseEvaluator::evaluate(&actual.into(), &op, &expected.into())
    }

    #[test]
    fn test_is_null() {
        assert!(eval(FieldValue::Null, Operator::IsNull, FieldValue::Null).unwrap());
        assert!(!eval("x", Operator::IsNull, FieldValue::Null).unwrap());
    }

    #[test]
    fn test_null_fails_every_other_operator() {
        for op in [
            Operator::Equals,
            Operator::NotEquals,
            Operator::GreaterThan,
            Operator::LessThan,
            Operator::InList,
            Operator::Between,
        ] {
            assert!(!eval(FieldValue::Null, op, "null").unwrap());
        }
    }

    #[test]
    fn test_equals() {
        assert!(eval("GB", Operator::Equals, "GB").unwrap());
        assert!(!eval("GB", Operator::Equals, "gb").unwrap());
        assert!(eval(100.0, Operator::Equals, "100").unwrap());
        assert!(eval(100.0, Operator::Equals, 100).unwrap());
        assert!(eval(100.0, Operator::Equals, "100.0").unwrap());
        assert!(!eval(100.5, Operator::Equals, "100").unwrap());
        assert!(eval("transfer", Operator::NotEquals, "cash_in").unwrap());
    }

    #[test]
    fn test_equals_boolean() {
        assert!(eval(true, Operator::Equals, true).unwrap());
        assert!(!eval(true, Operator::Equals, false).unwrap());
        // 布尔字段只和布尔字面量相等
        assert!(!eval(true, Operator::Equals, "true").unwrap());
        assert!(eval(true, Operator::NotEquals, "true").unwrap());
    }

    #[test]
    fn test_numeric_compare() {
        assert!(eval(0.9, Operator::GreaterThan, 0.8).unwrap());
        assert!(!eval(0.8, Operator::GreaterThan, 0.8).unwrap());
        assert!(eval(3, Operator::LessThan, 5).unwrap());

        let err = eval("high", Operator::GreaterThan, 0.8).unwrap_err();
        assert_eq!(err.code(), "TYPE_MISMATCH");
        assert!(eval(1.0, Operator::LessThan, "5").is_err());
    }

    #[test]
    fn test_in_list() {
        assert!(eval("GB", Operator::InList, "US,GB,FR").unwrap());
        assert!(eval("FR", Operator::InList, "US, GB , FR").unwrap());
        assert!(!eval("DE", Operator::InList, "US,GB,FR").unwrap());
        assert!(eval("GB", Operator::InList, vec!["US", "GB"]).unwrap());
        assert!(eval(3, Operator::InList, vec![1, 2, 3]).unwrap());
        assert!(eval(200.0, Operator::InList, "100.0,200.0").unwrap());
        assert!(eval(200.0, Operator::InList, "100,200").unwrap());
        assert!(!eval(250.0, Operator::InList, "100.0,200.0").unwrap());
        assert!(eval("GB", Operator::InList, 42).is_err());
    }

    #[test]
    fn test_between() {
        assert!(eval(10, Operator::Between, vec![5, 15]).unwrap());
        assert!(eval(5, Operator::Between, vec![5, 15]).unwrap());
        assert!(!eval(16, Operator::Between, vec![5, 15]).unwrap());
    }

    #[test]
    fn test_between_wraparound() {
        assert!(eval(23, Operator::Between, vec![22, 5]).unwrap());
        assert!(eval(2, Operator::Between, vec![22, 5]).unwrap());
        assert!(!eval(10, Operator::Between, vec![22, 5]).unwrap());
    }

    #[test]
    fn test_between_malformed() {
        assert!(eval(10, Operator::Between, vec![5]).is_err());
        assert!(eval(10, Operator::Between, vec!["a", "b"]).is_err());
        assert!(eval(10, Operator::Between, "5,15").is_err());
        assert!(eval("10", Operator::Between, vec![5, 15]).is_err());
    }

    #[test]
    fn test_unknown_operator() {
        let err = eval(1, Operator::from("CONTAINS"), 1).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_OPERATOR");
    }
}
