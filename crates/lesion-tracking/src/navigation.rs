//! 病灶激活导航
//!
//! 从病灶列表选中某个病灶后，为每个显示面板解析应当展示的时间点
//! 图像：时间点多于面板时从最早的开始丢弃，只保留最近的 N 个；
//! 面板已显示目标检查/系列时立即激活，否则先请求外部切换显示
//! （异步，渲染完成后续接激活）。面板按序逐个处理，同一次激活
//! 请求不会产生并发加载。

use crate::store::{MeasurementStore, OverlayStateStore};
use lesion_core::{TimepointEntry, ToolType};
use lesion_metadata::{DisplayRequest, DisplaySurfaceProvider, TimepointDirectory};
use uuid::Uuid;

/// 病灶激活导航器
#[derive(Debug, Default)]
pub struct ActivationNavigator;

impl ActivationNavigator {
    pub fn new() -> Self {
        Self
    }

    /// 激活选中的病灶
    ///
    /// 返回成功激活标注的面板数量。显示切换失败只影响对应面板
    /// （记录日志后跳过），不影响其他面板。
    pub async fn activate_lesion(
        &self,
        store: &MeasurementStore,
        overlays: &mut OverlayStateStore,
        timepoints: &dyn TimepointDirectory,
        surfaces: &mut dyn DisplaySurfaceProvider,
        measurement_id: Uuid,
    ) -> usize {
        let Some(measurement) = store.get(&measurement_id) else {
            tracing::warn!("No measurement associated to the selected lesion");
            return 0;
        };

        // 只保留引用了真实图像的时间点，按采集日期升序排列
        let mut entries: Vec<(&TimepointEntry, chrono::NaiveDate)> = measurement
            .timepoints
            .values()
            .filter(|entry| entry.has_image_reference())
            .filter_map(|entry| {
                match timepoints.get(&entry.timepoint_id) {
                    Some(info) => Some((entry, info.latest_date)),
                    None => {
                        tracing::warn!(
                            "Timepoint {} missing from directory, entry skipped",
                            entry.timepoint_id
                        );
                        None
                    }
                }
            })
            .collect();
        entries.sort_by_key(|(_, date)| *date);

        if entries.is_empty() {
            return 0;
        }

        // 时间点多于面板时丢弃最早的，保留最近的 N 个
        let surface_count = surfaces.surface_count();
        if entries.len() > surface_count {
            entries.drain(..entries.len() - surface_count);
        }

        let lesion_number = measurement.lesion_number;
        let is_target = measurement.is_target;

        let mut activated = 0;
        for surface_index in 0..surface_count {
            let Some((entry, _)) = entries.get(surface_index) else {
                // 没有剩余时间点的面板只做去高亮
                if let Some(displayed) = surfaces.displayed_series(surface_index) {
                    overlays.deactivate_image(&displayed.image_id);
                }
                continue;
            };

            let displayed = surfaces.displayed_series(surface_index);
            let already_showing = displayed.as_ref().is_some_and(|d| {
                d.study_instance_uid == entry.study_instance_uid
                    && d.series_instance_uid == entry.series_instance_uid
            });

            if !already_showing {
                let request = DisplayRequest {
                    study_instance_uid: entry.study_instance_uid.clone(),
                    series_instance_uid: entry.series_instance_uid.clone(),
                    image_id: entry.image_id.clone(),
                };
                match surfaces.display_image(surface_index, request).await {
                    Ok(_) => {}
                    Err(error) => {
                        tracing::warn!(
                            "Display-set change failed for surface {}: {}",
                            surface_index,
                            error
                        );
                        continue;
                    }
                }
            } else if let Some(displayed) = &displayed {
                // 同一系列但可能停在别的图像上，先清掉该图像的高亮
                if displayed.image_id != entry.image_id {
                    overlays.deactivate_image(&displayed.image_id);
                }
            }

            if activate_entry(overlays, entry, lesion_number, is_target) {
                activated += 1;
            }
        }

        activated
    }
}

/// 在图像上激活与病灶匹配的那一条标注
///
/// 先取消该图像上全部病灶类标注的激活，再把 (系列, 检查, 编号,
/// 分区) 匹配的一条置为激活。
fn activate_entry(
    overlays: &mut OverlayStateStore,
    entry: &TimepointEntry,
    lesion_number: u32,
    is_target: bool,
) -> bool {
    overlays.deactivate_image(&entry.image_id);

    for tool_type in ToolType::lesion_bearing_types() {
        for overlay in overlays.entries_mut(&entry.image_id, tool_type) {
            if overlay.series_instance_uid == entry.series_instance_uid
                && overlay.study_instance_uid == entry.study_instance_uid
                && overlay.lesion_number == lesion_number
                && overlay.is_target == is_target
            {
                overlay.active = true;
                return true;
            }
        }
    }

    tracing::warn!(
        "No overlay entry to activate on image {} for lesion {}",
        entry.image_id,
        lesion_number
    );
    false
}
