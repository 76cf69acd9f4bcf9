//! 测量结果导出
//!
//! 把测量记录铺平成报告生成层需要的形状。序列化目标（结构化报告
//! 的具体编码）由外部导出层负责，这里只暴露约定字段。

use crate::store::MeasurementStore;
use lesion_core::{Handle, ToolType};
use serde::{Deserialize, Serialize};

/// 单条导出测量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedMeasurement {
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
    pub handles: Vec<Handle>,
    /// 单径线工具取 length，双径线工具取长径
    pub measured_value: Option<String>,
    pub tool_type: ToolType,
    pub lesion_number: u32,
}

/// 铺平全部测量记录，每个 (病灶, 时间点) 一条
pub fn exported_measurements(store: &MeasurementStore) -> Vec<ExportedMeasurement> {
    let mut result = Vec::new();

    for measurement in store.all() {
        for entry in measurement.timepoints.values() {
            let measured_value = entry
                .values
                .length()
                .or_else(|| entry.values.longest_diameter())
                .map(str::to_string);

            result.push(ExportedMeasurement {
                study_instance_uid: entry.study_instance_uid.clone(),
                series_instance_uid: entry.series_instance_uid.clone(),
                sop_instance_uid: entry.sop_instance_uid.clone(),
                handles: entry.handles.clone(),
                measured_value,
                tool_type: measurement.tool_type,
                lesion_number: measurement.lesion_number,
            });
        }
    }

    result.sort_by(|a, b| {
        (a.lesion_number, &a.study_instance_uid).cmp(&(b.lesion_number, &b.study_instance_uid))
    });
    result
}
