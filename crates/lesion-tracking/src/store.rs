//! 测量记录与标注状态存储
//!
//! - `MeasurementStore`：持久化的测量记录仓库，每个病灶一条记录。
//!   所有变更通过显式的广播事件通道对外通知，取代隐式的响应式重算。
//! - `OverlayStateStore`：瞬态的屏上标注状态，按（图像ID，工具类型）
//!   存放，随图像加载/卸载创建与销毁。

use lesion_core::{Measurement, OverlayEntry, TimepointEntry, ToolType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

/// 事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 测量记录变更类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MeasurementEventKind {
    Created,          // 新建记录
    TimepointUpdated, // 时间点子记录被替换
    TimepointRemoved, // 时间点子记录被删除
    Deleted,          // 整条记录被删除（级联）
}

/// 测量记录变更事件
///
/// `client_id` 标识触发写入的一方，消费方据此跳过自身发起的更新，
/// 避免 标注编辑 -> 持久化 -> 回写标注 的无限回路。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementEvent {
    pub measurement_id: Uuid,
    pub timepoint_id: Option<String>,
    pub client_id: String,
    pub kind: MeasurementEventKind,
}

/// 时间点子记录删除结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimepointRemoval {
    NotPresent,         // 该时间点本来就没有数据
    EntryRemoved,       // 子记录已删除，测量记录仍保留
    MeasurementDeleted, // 最后一个子记录被删除，整条记录级联删除
}

/// 测量记录仓库
#[derive(Debug)]
pub struct MeasurementStore {
    measurements: HashMap<Uuid, Measurement>,
    absolute_sequence: u64, // 全局单调序号，删除后不回退
    write_count: u64,
    events: broadcast::Sender<MeasurementEvent>,
}

impl MeasurementStore {
    /// 创建空仓库
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            measurements: HashMap::new(),
            absolute_sequence: 0,
            write_count: 0,
            events,
        }
    }

    /// 订阅变更事件
    pub fn subscribe(&self) -> broadcast::Receiver<MeasurementEvent> {
        self.events.subscribe()
    }

    /// 分配下一个全局序号
    pub fn next_absolute_number(&mut self) -> u64 {
        self.absolute_sequence += 1;
        self.absolute_sequence
    }

    /// 插入新的测量记录
    pub fn insert(&mut self, measurement: Measurement) {
        let event = MeasurementEvent {
            measurement_id: measurement.id,
            timepoint_id: None,
            client_id: measurement.client_id.clone(),
            kind: MeasurementEventKind::Created,
        };

        tracing::info!(
            "Created measurement {} (lesion {} target={})",
            measurement.id,
            measurement.lesion_number,
            measurement.is_target
        );

        self.measurements.insert(measurement.id, measurement);
        self.write_count += 1;
        let _ = self.events.send(event);
    }

    /// 替换某时间点的子记录并标记写入者
    pub fn update_timepoint(
        &mut self,
        measurement_id: Uuid,
        entry: TimepointEntry,
        client_id: &str,
    ) -> bool {
        let Some(measurement) = self.measurements.get_mut(&measurement_id) else {
            tracing::warn!("Measurement {} not found for timepoint update", measurement_id);
            return false;
        };

        let timepoint_id = entry.timepoint_id.clone();
        measurement.timepoints.insert(timepoint_id.clone(), entry);
        measurement.client_id = client_id.to_string();
        measurement.updated_at = chrono::Utc::now();
        self.write_count += 1;

        let _ = self.events.send(MeasurementEvent {
            measurement_id,
            timepoint_id: Some(timepoint_id),
            client_id: client_id.to_string(),
            kind: MeasurementEventKind::TimepointUpdated,
        });
        true
    }

    /// 更新记录的解剖部位字段
    pub fn update_location(
        &mut self,
        measurement_id: Uuid,
        location: Option<String>,
        location_id: Option<Uuid>,
        is_nodal: bool,
    ) -> bool {
        let Some(measurement) = self.measurements.get_mut(&measurement_id) else {
            return false;
        };

        measurement.location = location;
        measurement.location_id = location_id;
        measurement.is_nodal = is_nodal;
        measurement.updated_at = chrono::Utc::now();
        self.write_count += 1;
        true
    }

    /// 删除某时间点的子记录，子记录集为空时级联删除整条记录
    pub fn remove_timepoint(&mut self, measurement_id: Uuid, timepoint_id: &str) -> TimepointRemoval {
        let Some(measurement) = self.measurements.get_mut(&measurement_id) else {
            return TimepointRemoval::NotPresent;
        };

        if measurement.timepoints.remove(timepoint_id).is_none() {
            return TimepointRemoval::NotPresent;
        }

        let client_id = measurement.client_id.clone();
        self.write_count += 1;

        if measurement.timepoints.is_empty() {
            self.measurements.remove(&measurement_id);
            tracing::info!(
                "Measurement {} deleted, last timepoint {} removed",
                measurement_id,
                timepoint_id
            );
            let _ = self.events.send(MeasurementEvent {
                measurement_id,
                timepoint_id: Some(timepoint_id.to_string()),
                client_id,
                kind: MeasurementEventKind::Deleted,
            });
            return TimepointRemoval::MeasurementDeleted;
        }

        measurement.updated_at = chrono::Utc::now();
        let _ = self.events.send(MeasurementEvent {
            measurement_id,
            timepoint_id: Some(timepoint_id.to_string()),
            client_id,
            kind: MeasurementEventKind::TimepointRemoved,
        });
        TimepointRemoval::EntryRemoved
    }

    /// 按ID获取测量记录
    pub fn get(&self, measurement_id: &Uuid) -> Option<&Measurement> {
        self.measurements.get(measurement_id)
    }

    /// 按病灶身份（编号 + 目标分区）查找存活记录
    pub fn find_by_lesion_number(&self, lesion_number: u32, is_target: bool) -> Option<&Measurement> {
        self.measurements
            .values()
            .find(|m| m.lesion_number == lesion_number && m.is_target == is_target)
    }

    /// 获取某分区的全部记录，按病灶编号升序
    pub fn all_by_target(&self, is_target: bool) -> Vec<&Measurement> {
        let mut result: Vec<&Measurement> = self
            .measurements
            .values()
            .filter(|m| m.is_target == is_target)
            .collect();
        result.sort_by_key(|m| m.lesion_number);
        result
    }

    /// 获取全部记录
    pub fn all(&self) -> Vec<&Measurement> {
        let mut result: Vec<&Measurement> = self.measurements.values().collect();
        result.sort_by_key(|m| (m.lesion_number_absolute, m.lesion_number));
        result
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// 累计写入次数（幂等性验证用）
    pub fn write_count(&self) -> u64 {
        self.write_count
    }
}

impl Default for MeasurementStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 屏上标注状态存储
#[derive(Debug, Default)]
pub struct OverlayStateStore {
    entries: HashMap<(String, ToolType), Vec<OverlayEntry>>,
}

impl OverlayStateStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// 追加一条标注
    pub fn push_entry(&mut self, entry: OverlayEntry) {
        let key = (entry.image_id.clone(), entry.tool_type);
        self.entries.entry(key).or_default().push(entry);
    }

    /// 某图像上某工具类型的全部标注
    pub fn entries(&self, image_id: &str, tool_type: ToolType) -> Vec<&OverlayEntry> {
        self.entries
            .get(&(image_id.to_string(), tool_type))
            .map(|v| v.iter().collect())
            .unwrap_or_default()
    }

    pub fn entries_mut(
        &mut self,
        image_id: &str,
        tool_type: ToolType,
    ) -> impl Iterator<Item = &mut OverlayEntry> {
        self.entries
            .get_mut(&(image_id.to_string(), tool_type))
            .into_iter()
            .flat_map(|v| v.iter_mut())
    }

    /// 按反向引用查找标注
    pub fn entry_by_measurement(
        &self,
        image_id: &str,
        tool_type: ToolType,
        measurement_id: Uuid,
    ) -> Option<&OverlayEntry> {
        self.entries
            .get(&(image_id.to_string(), tool_type))
            .and_then(|v| v.iter().find(|e| e.id == Some(measurement_id)))
    }

    pub fn entry_by_measurement_mut(
        &mut self,
        image_id: &str,
        tool_type: ToolType,
        measurement_id: Uuid,
    ) -> Option<&mut OverlayEntry> {
        self.entries
            .get_mut(&(image_id.to_string(), tool_type))
            .and_then(|v| v.iter_mut().find(|e| e.id == Some(measurement_id)))
    }

    /// 删除某测量记录在该图像上的标注
    pub fn remove_measurement_entries(
        &mut self,
        image_id: &str,
        tool_type: ToolType,
        measurement_id: Uuid,
    ) {
        if let Some(entries) = self.entries.get_mut(&(image_id.to_string(), tool_type)) {
            entries.retain(|e| e.id != Some(measurement_id));
        }
    }

    /// 取消某图像上全部病灶类标注的激活状态
    pub fn deactivate_image(&mut self, image_id: &str) {
        for tool_type in ToolType::lesion_bearing_types() {
            for entry in self.entries_mut(image_id, tool_type) {
                entry.active = false;
            }
        }
    }

    /// 图像卸载时清空其全部标注
    pub fn clear_image(&mut self, image_id: &str) {
        self.entries.retain(|(image, _), _| image != image_id);
    }

    /// 某图像上处于激活状态的标注
    pub fn active_entries(&self, image_id: &str) -> Vec<&OverlayEntry> {
        ToolType::lesion_bearing_types()
            .iter()
            .flat_map(|tool| self.entries(image_id, *tool))
            .filter(|e| e.active)
            .collect()
    }

    /// 标注总数
    pub fn total_entries(&self) -> usize {
        self.entries.values().map(|v| v.len()).sum()
    }
}
