//! # Lesion Metadata
//!
//! 外部协作系统的接口抽象与内存参考实现，包括：
//! - 图像/检查元数据提供者
//! - 病灶部位查找表
//! - 时间点目录
//! - 显示面板控制器（异步图像加载边界）

pub mod memory;
pub mod providers;

// 重新导出主要类型
pub use memory::{
    ImageRecord, InMemoryLocationLookup, InMemoryMetadataProvider, InMemoryTimepointDirectory,
    ScriptedDisplaySurfaces,
};
pub use providers::{
    DisplayRequest, DisplaySurfaceProvider, DisplayedSeries, ImageMetadataProvider,
    InstanceMetadata, LocationLookup, SeriesMetadata, StudyMetadata, TimepointDirectory,
};
