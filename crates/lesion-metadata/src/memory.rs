//! 内存参考实现
//!
//! 供演示程序与测试使用的内存版协作系统实现

use crate::providers::{
    DisplayRequest, DisplaySurfaceProvider, DisplayedSeries, ImageMetadataProvider,
    InstanceMetadata, LocationLookup, SeriesMetadata, StudyMetadata, TimepointDirectory,
};
use async_trait::async_trait;
use lesion_core::{LesionLocation, TimepointInfo};
use std::collections::HashMap;
use uuid::Uuid;

/// 单个图像的全部元数据
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub series: SeriesMetadata,
    pub instance: InstanceMetadata,
    pub study: StudyMetadata,
}

/// 内存图像元数据提供者
#[derive(Debug, Default)]
pub struct InMemoryMetadataProvider {
    images: HashMap<String, ImageRecord>,
}

impl InMemoryMetadataProvider {
    pub fn new() -> Self {
        Self {
            images: HashMap::new(),
        }
    }

    /// 注册一个图像的元数据
    pub fn register_image(&mut self, image_id: impl Into<String>, record: ImageRecord) {
        self.images.insert(image_id.into(), record);
    }
}

impl ImageMetadataProvider for InMemoryMetadataProvider {
    fn series_metadata(&self, image_id: &str) -> Option<SeriesMetadata> {
        self.images.get(image_id).map(|r| r.series.clone())
    }

    fn instance_metadata(&self, image_id: &str) -> Option<InstanceMetadata> {
        self.images.get(image_id).map(|r| r.instance.clone())
    }

    fn study_metadata(&self, image_id: &str) -> Option<StudyMetadata> {
        self.images.get(image_id).map(|r| r.study.clone())
    }
}

/// 内存部位查找表
#[derive(Debug, Default)]
pub struct InMemoryLocationLookup {
    locations: HashMap<Uuid, LesionLocation>,
}

impl InMemoryLocationLookup {
    pub fn new() -> Self {
        Self {
            locations: HashMap::new(),
        }
    }

    /// 添加部位定义并返回其ID
    pub fn add_location(&mut self, location: impl Into<String>, is_nodal: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.locations.insert(
            id,
            LesionLocation {
                id,
                location: location.into(),
                is_nodal,
            },
        );
        id
    }
}

impl LocationLookup for InMemoryLocationLookup {
    fn lookup(&self, location_id: &Uuid) -> Option<LesionLocation> {
        self.locations.get(location_id).cloned()
    }
}

/// 内存时间点目录
#[derive(Debug, Default)]
pub struct InMemoryTimepointDirectory {
    timepoints: HashMap<String, TimepointInfo>,
}

impl InMemoryTimepointDirectory {
    pub fn new() -> Self {
        Self {
            timepoints: HashMap::new(),
        }
    }

    pub fn add_timepoint(&mut self, info: TimepointInfo) {
        self.timepoints.insert(info.timepoint_id.clone(), info);
    }
}

impl TimepointDirectory for InMemoryTimepointDirectory {
    fn get(&self, timepoint_id: &str) -> Option<TimepointInfo> {
        self.timepoints.get(timepoint_id).cloned()
    }

    fn ordered(&self) -> Vec<TimepointInfo> {
        let mut all: Vec<TimepointInfo> = self.timepoints.values().cloned().collect();
        all.sort_by_key(|tp| tp.latest_date);
        all
    }
}

/// 脚本化显示面板控制器
///
/// 确定性的面板实现：`display_image` 立即完成并记录加载请求，
/// 可通过 `fail_display` 开关模拟加载失败路径。
#[derive(Debug)]
pub struct ScriptedDisplaySurfaces {
    surfaces: Vec<Option<DisplayedSeries>>,
    fail_display: bool,
    load_log: Vec<(usize, String)>, // (面板索引, 图像ID)
}

impl ScriptedDisplaySurfaces {
    pub fn new(surface_count: usize) -> Self {
        Self {
            surfaces: vec![None; surface_count],
            fail_display: false,
            load_log: Vec::new(),
        }
    }

    /// 预置面板当前显示的系列
    pub fn set_displayed(&mut self, surface_index: usize, series: DisplayedSeries) {
        if let Some(slot) = self.surfaces.get_mut(surface_index) {
            *slot = Some(series);
        }
    }

    /// 让后续的 display_image 请求失败
    pub fn set_fail_display(&mut self, fail: bool) {
        self.fail_display = fail;
    }

    /// 已执行的加载请求记录
    pub fn load_log(&self) -> &[(usize, String)] {
        &self.load_log
    }
}

#[async_trait]
impl DisplaySurfaceProvider for ScriptedDisplaySurfaces {
    fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    fn displayed_series(&self, surface_index: usize) -> Option<DisplayedSeries> {
        self.surfaces.get(surface_index).and_then(|s| s.clone())
    }

    async fn display_image(
        &mut self,
        surface_index: usize,
        request: DisplayRequest,
    ) -> anyhow::Result<String> {
        if self.fail_display {
            anyhow::bail!("display-set change failed for surface {}", surface_index);
        }

        if surface_index >= self.surfaces.len() {
            anyhow::bail!("no such display surface: {}", surface_index);
        }

        self.surfaces[surface_index] = Some(DisplayedSeries {
            study_instance_uid: request.study_instance_uid.clone(),
            series_instance_uid: request.series_instance_uid.clone(),
            image_id: request.image_id.clone(),
        });
        self.load_log.push((surface_index, request.image_id.clone()));

        Ok(request.image_id)
    }
}
