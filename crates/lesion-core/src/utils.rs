//! 通用工具函数

use chrono::Utc;
use uuid::Uuid;

/// 解析测量数值文本
///
/// 径线数值以测量时的字符串原文存储，解析失败返回 NaN 并沿计算
/// 链路传播，使畸形数据在验证阶段显式失败而不是被静默归零。
pub fn parse_measured_value(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// 生成唯一的DICOM标识符
///
/// UID 只允许数字与点号，总长不超过 64 字符。
pub fn generate_dicom_uid() -> String {
    let entropy = Uuid::new_v4().as_u128() % 10_u128.pow(24);
    format!(
        "{}.{}.{}",
        "1.2.826.0.1.3680043.9.7382", // 企业根标识符
        Utc::now().timestamp(),
        entropy
    )
}

/// 验证DICOM UID格式
pub fn is_valid_dicom_uid(uid: &str) -> bool {
    // 简单的DICOM UID验证逻辑
    !uid.is_empty() && uid.len() <= 64 && uid.chars().all(|c| c.is_numeric() || c == '.')
}
