//! 交易风控决策引擎
//!
//! 把模型分数和交易属性转换为业务决策（ALLOW / DENY / REVIEW），支持：
//! - 远程下发的 JSON 规则目录，逐条容错加载
//! - 跨银行、电商、移动支付记录的统一字段解析
//! - AND/OR 条件树短路求值
//! - 按优先级顺序应用动作，分数累加调整
//! - 目录原子热替换

pub mod actions;
pub mod catalog;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod features;
pub mod models;
pub mod operators;
pub mod record;
pub mod service;
pub mod store;
pub mod value;
pub mod watcher;

pub use actions::{ActionApplier, ScorePolicy};
pub use catalog::{CatalogBundle, CatalogLoadReport, RejectedRule, RuleCatalog};
pub use context::{ClientContextMap, EvaluationContext, FieldResolver};
pub use engine::{EngineOptions, RuleEngine};
pub use error::{EngineError, Result};
pub use evaluator::ClauseEvaluator;
pub use executor::ConditionExecutor;
pub use features::preprocess;
pub use models::{
    ActionDefinition, Clause, ConditionGroup, ConditionNode, DecisionOutput, RuleDefinition,
};
pub use operators::{ActionType, LogicalOperator, Operator};
pub use record::{Domain, FieldHolder, FieldRef, TransactionRecord};
pub use service::{DecisionRequest, DecisionService};
pub use store::{CatalogStore, CatalogStoreStats};
pub use value::{FeatureMap, FieldValue};
pub use watcher::{CatalogWatcher, FileCatalogWatcher};
