//! 配置管理
//!
//! 追踪引擎的运行配置，支持 默认值 -> 配置文件 -> 环境变量 三层覆盖。
//! 环境变量前缀为 `LESION_TRACKER`，如 `LESION_TRACKER__CRITERIA__IRRC_MIN_TOTAL_BURDEN`。

use config::{Config, Environment, File};
use lesion_core::{Result, TrackerError};
use serde::{Deserialize, Serialize};

/// 试验标准数值策略
///
/// 总负荷阈值在原始规则定义中是未经确认的占位值，按策略配置处理
/// 而不是写死的生理常量。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriteriaPolicy {
    /// RECIST 1.1 组级总病灶负荷下限 (mm)
    pub recist_min_total_burden: f64,
    /// irRC 组级总病灶负荷下限 (SPD, mm²)
    pub irrc_min_total_burden: f64,
}

impl Default for CriteriaPolicy {
    fn default() -> Self {
        Self {
            recist_min_total_burden: 2.0,
            irrc_min_total_burden: 100.0,
        }
    }
}

/// 追踪引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// 本地写入者标识（同步回路防护用）
    pub client_id: String,
    /// 当前启用的试验标准名称 (RECIST / irRC)
    pub active_criteria: String,
    /// 标准数值策略
    pub criteria: CriteriaPolicy,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            client_id: "local".to_string(),
            active_criteria: "RECIST".to_string(),
            criteria: CriteriaPolicy::default(),
        }
    }
}

impl TrackingConfig {
    /// 加载配置：默认值 + 可选配置文件 + 环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults =
            Config::try_from(&Self::default()).map_err(|e| TrackerError::Config(e.to_string()))?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        builder = builder.add_source(Environment::with_prefix("LESION_TRACKER").separator("__"));

        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| TrackerError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_thresholds() {
        let policy = CriteriaPolicy::default();
        assert_eq!(policy.recist_min_total_burden, 2.0);
        assert_eq!(policy.irrc_min_total_burden, 100.0);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = TrackingConfig::load(None).unwrap();
        assert_eq!(config.client_id, "local");
        assert_eq!(config.active_criteria, "RECIST");
    }
}
