//! 核心数据模型定义

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// 标注工具类型
///
/// 决定测量记录中哪些数值字段有意义（见 `MeasurementValues`）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ToolType {
    Bidirectional, // 双径线测量（目标病灶）
    NonTarget,     // 非目标病灶
    CrTool,        // 完全缓解 (CR)
    UnTool,        // 未知 (UN)
    ExTool,        // 排除 (EX)
    Length,        // 单径线测量
    EllipticalRoi, // 椭圆感兴趣区
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bidirectional => "bidirectional",
            Self::NonTarget => "nonTarget",
            Self::CrTool => "crTool",
            Self::UnTool => "unTool",
            Self::ExTool => "exTool",
            Self::Length => "length",
            Self::EllipticalRoi => "ellipticalRoi",
        }
    }

    /// 是否为病灶类工具（携带病灶编号并参与追踪）
    pub fn is_lesion_bearing(&self) -> bool {
        matches!(
            self,
            Self::Bidirectional | Self::NonTarget | Self::CrTool | Self::UnTool | Self::ExTool
        )
    }

    /// 定性评估工具对应的响应代码
    pub fn response_code(&self) -> Option<&'static str> {
        match self {
            Self::CrTool => Some("CR"),
            Self::UnTool => Some("UN"),
            Self::ExTool => Some("EX"),
            _ => None,
        }
    }

    /// 所有病灶类工具类型
    pub fn lesion_bearing_types() -> [ToolType; 5] {
        [
            Self::Bidirectional,
            Self::NonTarget,
            Self::CrTool,
            Self::UnTool,
            Self::ExTool,
        ]
    }
}

impl std::fmt::Display for ToolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 按工具类型划分的测量数值
///
/// 每个变体只携带该工具类型有意义的字段。径线数值保留为测量时的
/// 字符串原文，数值解析在评估阶段显式进行（解析失败产生 NaN）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MeasurementValues {
    Bidirectional {
        longest_diameter: String,  // 长径 (mm)
        shortest_diameter: String, // 短径 (mm)
    },
    Response {
        response: String, // 响应代码 (Present / CR / UN / EX / NE / 空)
    },
    Length {
        length: String,
    },
    EllipticalRoi {
        area: f64,
        mean: f64,
        stdev: f64,
    },
}

impl MeasurementValues {
    pub fn longest_diameter(&self) -> Option<&str> {
        match self {
            Self::Bidirectional { longest_diameter, .. } => Some(longest_diameter),
            _ => None,
        }
    }

    pub fn shortest_diameter(&self) -> Option<&str> {
        match self {
            Self::Bidirectional { shortest_diameter, .. } => Some(shortest_diameter),
            _ => None,
        }
    }

    pub fn response(&self) -> Option<&str> {
        match self {
            Self::Response { response } => Some(response),
            _ => None,
        }
    }

    pub fn length(&self) -> Option<&str> {
        match self {
            Self::Length { length } => Some(length),
            _ => None,
        }
    }

    /// 数值字段是否与工具类型匹配
    pub fn matches_tool(&self, tool_type: ToolType) -> bool {
        match (self, tool_type) {
            (Self::Bidirectional { .. }, ToolType::Bidirectional) => true,
            (
                Self::Response { .. },
                ToolType::NonTarget | ToolType::CrTool | ToolType::UnTool | ToolType::ExTool,
            ) => true,
            (Self::Length { .. }, ToolType::Length) => true,
            (Self::EllipticalRoi { .. }, ToolType::EllipticalRoi) => true,
            _ => false,
        }
    }
}

/// 标注几何控制点（图像坐标）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Handle {
    pub x: f64,
    pub y: f64,
}

impl Handle {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// 单个时间点的测量子记录
///
/// 记录该病灶在某一时间点的标注来源图像与数值。深度相等比较
/// （`PartialEq`）是同步回路的短路条件。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimepointEntry {
    pub timepoint_id: String,
    pub study_instance_uid: String,  // DICOM Study Instance UID
    pub series_instance_uid: String, // DICOM Series Instance UID
    pub sop_instance_uid: String,    // DICOM SOP Instance UID
    pub image_id: String,
    pub handles: Vec<Handle>,
    pub values: MeasurementValues,
}

impl TimepointEntry {
    /// 是否引用了真实图像（占位记录的 UID 为空字符串）
    pub fn has_image_reference(&self) -> bool {
        !self.image_id.is_empty()
            && !self.study_instance_uid.is_empty()
            && !self.series_instance_uid.is_empty()
    }
}

/// 病灶测量记录（持久化，每个病灶一条）
///
/// 纵向记录：`timepoints` 以时间点ID为键，每个时间点至多一条子记录。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub id: Uuid,
    pub lesion_number: u32, // 病灶编号，在 (is_target, 时间点) 分区内唯一
    pub is_target: bool,    // 目标病灶 / 非目标病灶
    pub tool_type: ToolType,
    pub location: Option<String>, // 解剖部位（来自部位查找表的冗余拷贝）
    pub location_id: Option<Uuid>,
    pub is_nodal: bool, // 是否淋巴结病灶，创建时从部位信息拷贝
    pub patient_id: String,
    pub client_id: String,           // 最后一次写入者标识（回路防护）
    pub lesion_number_absolute: u64, // 全局单调序号，仅用于审计排序，从不复用
    pub timepoints: HashMap<String, TimepointEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Measurement {
    pub fn timepoint(&self, timepoint_id: &str) -> Option<&TimepointEntry> {
        self.timepoints.get(timepoint_id)
    }

    /// 该记录在指定时间点是否已有数据
    pub fn has_timepoint(&self, timepoint_id: &str) -> bool {
        self.timepoints.contains_key(timepoint_id)
    }
}

/// 屏上标注条目（瞬态，按图像 + 工具类型存放）
///
/// 始终可以由对应的 `Measurement` 重新生成，不携带不可再生信息。
/// `id` 为空表示该标注尚未持久化为测量记录。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayEntry {
    pub id: Option<Uuid>, // 指回 Measurement 的反向引用
    pub image_id: String,
    pub tool_type: ToolType,
    pub lesion_number: u32,
    pub is_target: bool,
    pub location: Option<String>, // 冗余拷贝，供屏上查找避免关联查询
    pub location_id: Option<Uuid>,
    pub is_nodal: bool,
    pub patient_id: String,
    pub timepoint_id: String,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
    pub handles: Vec<Handle>,
    pub values: MeasurementValues,
    pub measurement_text: String, // 屏上显示的测量文本
    pub label: String,
    pub active: bool,
    pub visible: bool,
    pub is_deleted: bool,
}

/// 时间点类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TimepointType {
    Baseline, // 基线
    Followup, // 随访
}

impl TimepointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Followup => "followup",
        }
    }
}

/// 时间点信息（由外部时间点目录提供）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimepointInfo {
    pub timepoint_id: String,
    pub timepoint_type: TimepointType,
    pub latest_date: NaiveDate, // 该时间点最近的检查日期
    pub patient_id: String,
}

/// 病灶解剖部位（由外部部位查找表提供）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LesionLocation {
    pub id: Uuid,
    pub location: String,
    pub is_nodal: bool,
}
