//! 测量记录与屏上标注的双向同步
//!
//! 两个方向都满足幂等性：
//! - 标注 -> 记录（`commit_overlay_edit`）：把标注编辑持久化为测量
//!   记录，内容未变化时短路为空操作，这是防止响应回路的关键。
//! - 记录 -> 标注（`hydrate_overlay`）：由持久化记录重建或原地刷新
//!   屏上标注。
//!
//! 另含唯一的删除路径 `clear_measurement_timepoint_data`：删除时间点
//! 数据并在子记录集为空时级联删除整条记录，保证编号复用正确。

use crate::store::{
    MeasurementEvent, MeasurementEventKind, MeasurementStore, OverlayStateStore, TimepointRemoval,
};
use lesion_core::{Measurement, MeasurementValues, OverlayEntry, TimepointEntry};
use lesion_metadata::LocationLookup;
use std::collections::HashMap;
use uuid::Uuid;

/// 标注提交结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// 新建了测量记录
    Created(Uuid),
    /// 替换了已有记录的时间点数据
    Updated(Uuid),
    /// 深度相等，未产生写入
    Unchanged(Uuid),
}

impl CommitOutcome {
    pub fn measurement_id(&self) -> Uuid {
        match self {
            Self::Created(id) | Self::Updated(id) | Self::Unchanged(id) => *id,
        }
    }
}

/// 双向同步引擎
#[derive(Debug)]
pub struct SyncEngine {
    client_id: String,
}

impl SyncEngine {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// 标注 -> 记录：持久化一次标注编辑
    ///
    /// 先按反向引用 `id` 定位记录，退而按（编号, 分区）定位；都不存在
    /// 时新建记录（标注是新病灶的入口）。候选时间点数据与已有数据
    /// 深度相等时不产生任何写入。
    pub fn commit_overlay_edit(
        &self,
        store: &mut MeasurementStore,
        locations: &dyn LocationLookup,
        entry: &OverlayEntry,
    ) -> CommitOutcome {
        let candidate = TimepointEntry {
            timepoint_id: entry.timepoint_id.clone(),
            study_instance_uid: entry.study_instance_uid.clone(),
            series_instance_uid: entry.series_instance_uid.clone(),
            sop_instance_uid: entry.sop_instance_uid.clone(),
            image_id: entry.image_id.clone(),
            handles: entry.handles.clone(),
            values: entry.values.clone(),
        };

        let existing_id = entry
            .id
            .filter(|id| store.get(id).is_some())
            .or_else(|| {
                store
                    .find_by_lesion_number(entry.lesion_number, entry.is_target)
                    .map(|m| m.id)
            });

        let Some(measurement_id) = existing_id else {
            return CommitOutcome::Created(self.create_measurement(store, locations, entry, candidate));
        };

        let unchanged = store
            .get(&measurement_id)
            .and_then(|m| m.timepoint(&candidate.timepoint_id))
            .map(|current| *current == candidate)
            .unwrap_or(false);

        if unchanged {
            tracing::debug!(
                "Measurement {} timepoint {} unchanged, skipping write",
                measurement_id,
                candidate.timepoint_id
            );
            return CommitOutcome::Unchanged(measurement_id);
        }

        store.update_timepoint(measurement_id, candidate, &self.client_id);
        CommitOutcome::Updated(measurement_id)
    }

    fn create_measurement(
        &self,
        store: &mut MeasurementStore,
        locations: &dyn LocationLookup,
        entry: &OverlayEntry,
        candidate: TimepointEntry,
    ) -> Uuid {
        // 部位信息在创建时从查找表拷贝，查不到时沿用标注上的冗余值
        let location = entry.location_id.and_then(|lid| locations.lookup(&lid));
        let (location_name, is_nodal) = match &location {
            Some(l) => (Some(l.location.clone()), l.is_nodal),
            None => (entry.location.clone(), entry.is_nodal),
        };

        let now = chrono::Utc::now();
        let mut timepoints = HashMap::new();
        timepoints.insert(candidate.timepoint_id.clone(), candidate);

        let measurement = Measurement {
            id: Uuid::new_v4(),
            lesion_number: entry.lesion_number,
            is_target: entry.is_target,
            tool_type: entry.tool_type,
            location: location_name,
            location_id: entry.location_id,
            is_nodal,
            patient_id: entry.patient_id.clone(),
            client_id: self.client_id.clone(),
            lesion_number_absolute: store.next_absolute_number(),
            timepoints,
            created_at: now,
            updated_at: now,
        };

        let id = measurement.id;
        store.insert(measurement);
        id
    }

    /// 记录 -> 标注：由测量记录重建屏上标注
    ///
    /// 优先按反向引用原地覆盖；其次认领同编号同分区、尚未关联记录的
    /// 标注（新建记录后的首次回填）；都不存在时构造新标注追加。
    pub fn hydrate_overlay(
        &self,
        overlays: &mut OverlayStateStore,
        measurement: &Measurement,
        timepoint_id: &str,
    ) {
        let Some(entry) = measurement.timepoint(timepoint_id) else {
            tracing::warn!(
                "Measurement {} has no data at timepoint {}, nothing to hydrate",
                measurement.id,
                timepoint_id
            );
            return;
        };

        let text = format_measurement_text(&entry.values);

        if let Some(existing) =
            overlays.entry_by_measurement_mut(&entry.image_id, measurement.tool_type, measurement.id)
        {
            overwrite_drawable_fields(existing, measurement, entry, text);
            return;
        }

        // 认领尚未回填反向引用的标注
        let unclaimed = overlays
            .entries_mut(&entry.image_id, measurement.tool_type)
            .find(|e| {
                e.id.is_none()
                    && e.lesion_number == measurement.lesion_number
                    && e.is_target == measurement.is_target
            });
        if let Some(existing) = unclaimed {
            existing.id = Some(measurement.id);
            overwrite_drawable_fields(existing, measurement, entry, text);
            return;
        }

        overlays.push_entry(OverlayEntry {
            id: Some(measurement.id),
            image_id: entry.image_id.clone(),
            tool_type: measurement.tool_type,
            lesion_number: measurement.lesion_number,
            is_target: measurement.is_target,
            location: measurement.location.clone(),
            location_id: measurement.location_id,
            is_nodal: measurement.is_nodal,
            patient_id: measurement.patient_id.clone(),
            timepoint_id: entry.timepoint_id.clone(),
            study_instance_uid: entry.study_instance_uid.clone(),
            series_instance_uid: entry.series_instance_uid.clone(),
            sop_instance_uid: entry.sop_instance_uid.clone(),
            handles: entry.handles.clone(),
            values: entry.values.clone(),
            measurement_text: text,
            label: measurement.location.clone().unwrap_or_default(),
            active: false,
            visible: true,
            is_deleted: false,
        });
    }

    /// 删除某测量记录在指定时间点的数据
    ///
    /// 唯一的删除路径：先移除屏上标注，再删除时间点子记录，子记录集
    /// 为空时级联删除整条记录。所有分类转换与显式删除都必须走这里，
    /// 编号复用（见 numbering 模块）才能保持正确。
    pub fn clear_measurement_timepoint_data(
        &self,
        store: &mut MeasurementStore,
        overlays: &mut OverlayStateStore,
        measurement_id: Uuid,
        timepoint_id: &str,
    ) -> TimepointRemoval {
        let Some(measurement) = store.get(&measurement_id) else {
            tracing::warn!("Measurement {} not found, nothing to clear", measurement_id);
            return TimepointRemoval::NotPresent;
        };

        let Some(entry) = measurement.timepoint(timepoint_id) else {
            return TimepointRemoval::NotPresent;
        };

        let image_id = entry.image_id.clone();
        let tool_type = measurement.tool_type;
        overlays.remove_measurement_entries(&image_id, tool_type, measurement_id);

        store.remove_timepoint(measurement_id, timepoint_id)
    }

    /// 消费测量记录变更事件
    ///
    /// 自身发起的写入直接跳过（`client_id` 匹配），其余的 新建/更新
    /// 事件触发 记录 -> 标注 回填。返回是否执行了回填。
    pub fn handle_event(
        &self,
        store: &MeasurementStore,
        overlays: &mut OverlayStateStore,
        event: &MeasurementEvent,
    ) -> bool {
        if event.client_id == self.client_id {
            tracing::debug!(
                "Skipping self-originated update for measurement {}",
                event.measurement_id
            );
            return false;
        }

        match event.kind {
            MeasurementEventKind::Created | MeasurementEventKind::TimepointUpdated => {
                let Some(measurement) = store.get(&event.measurement_id) else {
                    tracing::warn!(
                        "Measurement {} vanished before hydration",
                        event.measurement_id
                    );
                    return false;
                };

                match &event.timepoint_id {
                    Some(timepoint_id) => {
                        self.hydrate_overlay(overlays, measurement, timepoint_id);
                    }
                    None => {
                        let timepoint_ids: Vec<String> =
                            measurement.timepoints.keys().cloned().collect();
                        for timepoint_id in timepoint_ids {
                            self.hydrate_overlay(overlays, measurement, &timepoint_id);
                        }
                    }
                }
                true
            }
            // 删除路径已同步清理标注，无需处理
            MeasurementEventKind::TimepointRemoved | MeasurementEventKind::Deleted => false,
        }
    }
}

fn overwrite_drawable_fields(
    overlay: &mut OverlayEntry,
    measurement: &Measurement,
    entry: &TimepointEntry,
    text: String,
) {
    overlay.handles = entry.handles.clone();
    overlay.values = entry.values.clone();
    overlay.lesion_number = measurement.lesion_number;
    overlay.is_target = measurement.is_target;
    overlay.location = measurement.location.clone();
    overlay.location_id = measurement.location_id;
    overlay.is_nodal = measurement.is_nodal;
    overlay.measurement_text = text;
    overlay.visible = true;
    overlay.is_deleted = false;
}

/// 屏上显示的测量文本
pub fn format_measurement_text(values: &MeasurementValues) -> String {
    match values {
        MeasurementValues::Bidirectional {
            longest_diameter,
            shortest_diameter,
        } => format!("{} x {} mm", longest_diameter, shortest_diameter),
        MeasurementValues::Response { response } => response.clone(),
        MeasurementValues::Length { length } => format!("{} mm", length),
        MeasurementValues::EllipticalRoi { area, mean, stdev } => {
            format!("Area: {:.2} mm² Mean: {:.2} StdDev: {:.2}", area, mean, stdev)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lesion_core::{Handle, ToolType};
    use lesion_metadata::InMemoryLocationLookup;

    fn overlay_entry(lesion_number: u32, is_target: bool) -> OverlayEntry {
        OverlayEntry {
            id: None,
            image_id: "image-1".to_string(),
            tool_type: if is_target {
                ToolType::Bidirectional
            } else {
                ToolType::NonTarget
            },
            lesion_number,
            is_target,
            location: Some("Lung".to_string()),
            location_id: None,
            is_nodal: false,
            patient_id: "patient-1".to_string(),
            timepoint_id: "tp-1".to_string(),
            study_instance_uid: "1.2.3".to_string(),
            series_instance_uid: "1.2.3.4".to_string(),
            sop_instance_uid: "1.2.3.4.5".to_string(),
            handles: vec![Handle::new(1.0, 2.0), Handle::new(3.0, 4.0)],
            values: if is_target {
                MeasurementValues::Bidirectional {
                    longest_diameter: "20".to_string(),
                    shortest_diameter: "10".to_string(),
                }
            } else {
                MeasurementValues::Response {
                    response: "Present".to_string(),
                }
            },
            measurement_text: String::new(),
            label: String::new(),
            active: false,
            visible: true,
            is_deleted: false,
        }
    }

    #[test]
    fn test_commit_creates_measurement() {
        let mut store = MeasurementStore::new();
        let locations = InMemoryLocationLookup::new();
        let sync = SyncEngine::new("writer-a");

        let outcome = sync.commit_overlay_edit(&mut store, &locations, &overlay_entry(1, true));
        let id = match outcome {
            CommitOutcome::Created(id) => id,
            other => panic!("expected Created, got {:?}", other),
        };

        let measurement = store.get(&id).unwrap();
        assert_eq!(measurement.lesion_number, 1);
        assert!(measurement.is_target);
        assert_eq!(measurement.lesion_number_absolute, 1);
        assert_eq!(measurement.client_id, "writer-a");
        assert!(measurement.has_timepoint("tp-1"));
    }

    #[test]
    fn test_commit_is_idempotent() {
        let mut store = MeasurementStore::new();
        let locations = InMemoryLocationLookup::new();
        let sync = SyncEngine::new("writer-a");
        let entry = overlay_entry(1, true);

        let first = sync.commit_overlay_edit(&mut store, &locations, &entry);
        let writes_after_first = store.write_count();

        // 内容未变的二次提交必须是空操作
        let second = sync.commit_overlay_edit(&mut store, &locations, &entry);
        assert_eq!(store.write_count(), writes_after_first);
        assert_eq!(second, CommitOutcome::Unchanged(first.measurement_id()));
    }

    #[test]
    fn test_commit_updates_changed_entry() {
        let mut store = MeasurementStore::new();
        let locations = InMemoryLocationLookup::new();
        let sync = SyncEngine::new("writer-a");

        let entry = overlay_entry(1, true);
        let outcome = sync.commit_overlay_edit(&mut store, &locations, &entry);

        let mut edited = entry.clone();
        edited.handles = vec![Handle::new(5.0, 6.0), Handle::new(7.0, 8.0)];
        edited.values = MeasurementValues::Bidirectional {
            longest_diameter: "25".to_string(),
            shortest_diameter: "12".to_string(),
        };

        let updated = sync.commit_overlay_edit(&mut store, &locations, &edited);
        assert_eq!(updated, CommitOutcome::Updated(outcome.measurement_id()));

        let measurement = store.get(&outcome.measurement_id()).unwrap();
        let stored = measurement.timepoint("tp-1").unwrap();
        assert_eq!(stored.values.longest_diameter(), Some("25"));
    }

    #[test]
    fn test_commit_locates_by_lesion_identity() {
        let mut store = MeasurementStore::new();
        let locations = InMemoryLocationLookup::new();
        let sync = SyncEngine::new("writer-a");

        let first = sync.commit_overlay_edit(&mut store, &locations, &overlay_entry(1, true));

        // 同编号同分区、另一时间点的标注落到同一条记录上
        let mut followup = overlay_entry(1, true);
        followup.timepoint_id = "tp-2".to_string();
        followup.image_id = "image-2".to_string();
        let outcome = sync.commit_overlay_edit(&mut store, &locations, &followup);

        assert_eq!(outcome, CommitOutcome::Updated(first.measurement_id()));
        assert_eq!(store.len(), 1);
        let measurement = store.get(&first.measurement_id()).unwrap();
        assert!(measurement.has_timepoint("tp-1"));
        assert!(measurement.has_timepoint("tp-2"));
    }

    #[test]
    fn test_commit_copies_location_from_lookup() {
        let mut store = MeasurementStore::new();
        let mut locations = InMemoryLocationLookup::new();
        let location_id = locations.add_location("Mediastinum", true);
        let sync = SyncEngine::new("writer-a");

        let mut entry = overlay_entry(1, true);
        entry.location_id = Some(location_id);
        entry.location = None;

        let outcome = sync.commit_overlay_edit(&mut store, &locations, &entry);
        let measurement = store.get(&outcome.measurement_id()).unwrap();
        assert_eq!(measurement.location.as_deref(), Some("Mediastinum"));
        assert!(measurement.is_nodal);
    }

    #[test]
    fn test_round_trip_preserves_annotation() {
        let mut store = MeasurementStore::new();
        let mut overlays = OverlayStateStore::new();
        let locations = InMemoryLocationLookup::new();
        let sync = SyncEngine::new("writer-a");

        let entry = overlay_entry(3, true);
        let outcome = sync.commit_overlay_edit(&mut store, &locations, &entry);

        let measurement = store.get(&outcome.measurement_id()).unwrap().clone();
        sync.hydrate_overlay(&mut overlays, &measurement, "tp-1");

        // 提交再回填必须逐位还原几何与身份
        let hydrated = overlays
            .entry_by_measurement("image-1", ToolType::Bidirectional, measurement.id)
            .unwrap();
        assert_eq!(hydrated.handles, entry.handles);
        assert_eq!(hydrated.lesion_number, entry.lesion_number);
        assert_eq!(hydrated.is_target, entry.is_target);
    }

    #[test]
    fn test_hydrate_claims_unlinked_entry() {
        let mut store = MeasurementStore::new();
        let mut overlays = OverlayStateStore::new();
        let locations = InMemoryLocationLookup::new();
        let sync = SyncEngine::new("writer-a");

        // 屏上已有尚未关联记录的标注
        overlays.push_entry(overlay_entry(1, true));

        let outcome = sync.commit_overlay_edit(&mut store, &locations, &overlay_entry(1, true));
        let measurement = store.get(&outcome.measurement_id()).unwrap().clone();
        sync.hydrate_overlay(&mut overlays, &measurement, "tp-1");

        // 回填认领已有标注而不是追加重复条目
        assert_eq!(overlays.entries("image-1", ToolType::Bidirectional).len(), 1);
        let entry = &overlays.entries("image-1", ToolType::Bidirectional)[0];
        assert_eq!(entry.id, Some(measurement.id));
    }

    #[test]
    fn test_hydrate_is_idempotent() {
        let mut store = MeasurementStore::new();
        let mut overlays = OverlayStateStore::new();
        let locations = InMemoryLocationLookup::new();
        let sync = SyncEngine::new("writer-a");

        let outcome = sync.commit_overlay_edit(&mut store, &locations, &overlay_entry(1, true));
        let measurement = store.get(&outcome.measurement_id()).unwrap().clone();

        sync.hydrate_overlay(&mut overlays, &measurement, "tp-1");
        sync.hydrate_overlay(&mut overlays, &measurement, "tp-1");
        assert_eq!(overlays.entries("image-1", ToolType::Bidirectional).len(), 1);
    }

    #[test]
    fn test_clear_timepoint_cascades_and_removes_overlay() {
        let mut store = MeasurementStore::new();
        let mut overlays = OverlayStateStore::new();
        let locations = InMemoryLocationLookup::new();
        let sync = SyncEngine::new("writer-a");

        let outcome = sync.commit_overlay_edit(&mut store, &locations, &overlay_entry(1, true));
        let id = outcome.measurement_id();
        let measurement = store.get(&id).unwrap().clone();
        sync.hydrate_overlay(&mut overlays, &measurement, "tp-1");

        let removal = sync.clear_measurement_timepoint_data(&mut store, &mut overlays, id, "tp-1");
        assert_eq!(removal, TimepointRemoval::MeasurementDeleted);
        assert!(store.is_empty());
        assert_eq!(overlays.total_entries(), 0);
    }

    #[test]
    fn test_event_loop_breaker() {
        let mut store = MeasurementStore::new();
        let mut overlays = OverlayStateStore::new();
        let locations = InMemoryLocationLookup::new();
        let sync = SyncEngine::new("writer-a");
        let mut receiver = store.subscribe();

        sync.commit_overlay_edit(&mut store, &locations, &overlay_entry(1, true));

        // 自身发起的写入不触发回填
        let event = receiver.try_recv().unwrap();
        assert!(!sync.handle_event(&store, &mut overlays, &event));
        assert_eq!(overlays.total_entries(), 0);

        // 其他写入者的事件正常回填
        let remote = SyncEngine::new("writer-b");
        assert!(remote.handle_event(&store, &mut overlays, &event));
        assert_eq!(overlays.total_entries(), 1);
    }
}
