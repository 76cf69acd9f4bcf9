//! 错误定义模块

use thiserror::Error;

/// 病灶追踪系统统一错误类型
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效状态转换: 从 {from} 到 {to}")]
    InvalidTransition { from: String, to: String },

    #[error("未注册的试验标准: {0}")]
    UnknownCriteriaSet(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 病灶追踪系统统一结果类型
pub type Result<T> = std::result::Result<T, TrackerError>;
