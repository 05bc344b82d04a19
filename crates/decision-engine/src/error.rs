//! 决策引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("规则解析失败: {0}")]
    ParseError(String),

    #[error("规则 {rule_id} 无效: {reason}")]
    InvalidRule { rule_id: String, reason: String },

    #[error("类型不匹配: 期望 {expected}, 实际 {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("无效的操作数: {0}")]
    InvalidOperand(String),

    #[error("不支持的操作符: {0}")]
    UnsupportedOperator(String),

    #[error("不支持的动作类型: {0}")]
    UnsupportedAction(String),

    #[error("未知的业务域: {0}")]
    UnknownDomain(String),

    #[error("业务域未初始化: {0}")]
    DomainNotInitialized(String),

    #[error("交易记录与业务域不匹配: 期望 {expected}, 实际 {actual}")]
    DomainMismatch { expected: String, actual: String },

    #[error("特征预处理失败: {0}")]
    Preprocess(String),

    #[error("决策服务已关闭")]
    ServiceClosed,

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseError(_) => "PARSE_ERROR",
            Self::InvalidRule { .. } => "INVALID_RULE",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::InvalidOperand(_) => "INVALID_OPERAND",
            Self::UnsupportedOperator(_) => "UNSUPPORTED_OPERATOR",
            Self::UnsupportedAction(_) => "UNSUPPORTED_ACTION",
            Self::UnknownDomain(_) => "UNKNOWN_DOMAIN",
            Self::DomainNotInitialized(_) => "DOMAIN_NOT_INITIALIZED",
            Self::DomainMismatch { .. } => "DOMAIN_MISMATCH",
            Self::Preprocess(_) => "PREPROCESS_FAILED",
            Self::ServiceClosed => "SERVICE_CLOSED",
            Self::Json(_) => "JSON_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
