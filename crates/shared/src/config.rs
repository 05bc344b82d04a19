//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::observability::ObservabilityConfig;

/// 决策引擎配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// 调整后的分数是否截断到 [score_min, score_max]
    pub clamp_adjusted_score: bool,
    pub score_min: f64,
    pub score_max: f64,
    /// 单独启用截断的域（优先于全局开关）
    pub clamp_domains: Vec<String>,
    /// 原始记录的根别名，路径首段命中时被忽略
    pub root_aliases: Vec<String>,
    /// 是否记录条件评估追踪
    pub trace: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            clamp_adjusted_score: false,
            score_min: 0.0,
            score_max: 1.0,
            clamp_domains: Vec::new(),
            root_aliases: vec!["rawInput".to_string()],
            trace: false,
        }
    }
}

impl EngineSettings {
    /// 指定域是否需要截断调整后的分数
    pub fn clamps_domain(&self, domain: &str) -> bool {
        self.clamp_adjusted_score
            || self
                .clamp_domains
                .iter()
                .any(|d| d.eq_ignore_ascii_case(domain))
    }
}

/// 规则目录来源配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogSourceConfig {
    /// 目录文件夹，按 `<domain>.json` 存放规则列表
    pub dir: String,
    /// 远程配置下发的完整负载（`{"rules": {"<domain>": [...]}}`），可选
    pub bundle_file: Option<String>,
    /// 是否监听目录变化并热替换
    pub watch: bool,
    pub debounce_ms: u64,
}

impl Default for CatalogSourceConfig {
    fn default() -> Self {
        Self {
            dir: "catalogs".to_string(),
            bundle_file: None,
            watch: false,
            debounce_ms: 2000,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub engine: EngineSettings,
    pub catalog: CatalogSourceConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（FRAUD_ 前缀，层级用双下划线，如 FRAUD_ENGINE__TRACE -> engine.trace）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("FRAUD_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("FRAUD")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("engine.clamp_domains")
                    .with_list_parse_key("engine.root_aliases")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(!config.engine.clamp_adjusted_score);
        assert_eq!(config.engine.root_aliases, vec!["rawInput".to_string()]);
        assert_eq!(config.catalog.dir, "catalogs");
        assert_eq!(config.catalog.debounce_ms, 2000);
        assert!(!config.is_production());
    }

    #[test]
    fn test_is_production() {
        let config = AppConfig {
            environment: "production".to_string(),
            ..Default::default()
        };
        assert!(config.is_production());
    }

    #[test]
    fn test_clamps_domain() {
        let mut settings = EngineSettings {
            clamp_domains: vec!["ecommerce".to_string()],
            ..Default::default()
        };
        assert!(settings.clamps_domain("ECommerce"));
        assert!(!settings.clamps_domain("bank"));

        settings.clamp_adjusted_score = true;
        assert!(settings.clamps_domain("bank"));
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        // SAFETY: 测试中仅设置本测试专用的目录变量
        unsafe {
            std::env::set_var("CONFIG_DIR", "/nonexistent-config-dir");
        }

        let config = AppConfig::load("decision-engine").unwrap();
        assert_eq!(config.service_name, "decision-engine");
        assert_eq!(config.engine.score_max, 1.0);

        unsafe {
            std::env::remove_var("CONFIG_DIR");
        }
    }

    #[test]
    fn test_partial_section_deserialization() {
        let config: AppConfig = Config::builder()
            .set_override("engine.clamp_adjusted_score", true)
            .unwrap()
            .set_override("catalog.watch", true)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(config.engine.clamp_adjusted_score);
        assert_eq!(config.engine.score_min, 0.0);
        assert!(config.catalog.watch);
        assert_eq!(config.catalog.debounce_ms, 2000);
    }
}
