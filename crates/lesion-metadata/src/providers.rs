//! 外部协作系统接口定义
//!
//! 核心引擎只依赖这些抽象接口：
//! - 图像元数据提供者：按图像ID解析检查/系列/实例元数据
//! - 部位查找表：按部位ID解析解剖部位与淋巴结标志
//! - 时间点目录：按时间点ID解析类型与日期，支持按日期枚举
//! - 显示面板控制器：查询/切换面板当前显示的图像（异步加载）

use async_trait::async_trait;
use chrono::NaiveDate;
use lesion_core::{LesionLocation, TimepointInfo};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 系列级元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub series_instance_uid: String,
    pub study_instance_uid: String,
    pub modality: String, // 检查设备类型 (CT, MR, CR等)
}

/// 实例级元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceMetadata {
    pub sop_instance_uid: String,
    pub slice_thickness: Option<f64>, // 采集层厚 (mm)
}

/// 检查级元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyMetadata {
    pub study_instance_uid: String,
    pub study_date: Option<NaiveDate>,
    pub timepoint_id: Option<String>, // 该检查关联的时间点
}

/// 图像元数据提供者
///
/// 所有查询返回 `Option`，缺失的元数据由调用方按"失败即关闭"
/// 原则处理，不做默认值回退。
pub trait ImageMetadataProvider: Send + Sync {
    fn series_metadata(&self, image_id: &str) -> Option<SeriesMetadata>;
    fn instance_metadata(&self, image_id: &str) -> Option<InstanceMetadata>;
    fn study_metadata(&self, image_id: &str) -> Option<StudyMetadata>;
}

/// 病灶部位查找表
pub trait LocationLookup: Send + Sync {
    fn lookup(&self, location_id: &Uuid) -> Option<LesionLocation>;
}

/// 时间点目录
pub trait TimepointDirectory: Send + Sync {
    fn get(&self, timepoint_id: &str) -> Option<TimepointInfo>;

    /// 按最近检查日期升序枚举全部时间点
    fn ordered(&self) -> Vec<TimepointInfo>;
}

/// 面板当前显示的系列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayedSeries {
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub image_id: String,
}

/// 切换显示请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayRequest {
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub image_id: String,
}

/// 显示面板控制器
///
/// 图像加载是本核心唯一的异步边界；`display_image` 在图像渲染
/// 完成后才返回。
#[async_trait]
pub trait DisplaySurfaceProvider: Send + Sync {
    /// 可用显示面板数量
    fn surface_count(&self) -> usize;

    /// 面板当前显示的检查/系列，面板为空时返回 None
    fn displayed_series(&self, surface_index: usize) -> Option<DisplayedSeries>;

    /// 请求面板加载并显示指定图像，返回实际显示的图像ID
    async fn display_image(
        &mut self,
        surface_index: usize,
        request: DisplayRequest,
    ) -> anyhow::Result<String>;
}
