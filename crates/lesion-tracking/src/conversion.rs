//! 病灶分类转换状态机
//!
//! 管理病灶在 目标 / 非目标 / CR / EX / UN 分类之间的转换。转换不是
//! 原地修改：总是以新编号创建新的测量记录，并从旧记录上剥离被转换
//! 的时间点数据（旧记录因此可能级联删除）。`is_target` 从不被原地
//! 改写。
//!
//! 转换由界面操作触发，属于顾问性操作而非事务性业务操作：前置条件
//! 不满足时记录日志并静默跳过，只保证剥离一定发生在新记录持久化
//! 之后。

use crate::numbering::next_lesion_number;
use crate::store::{MeasurementStore, OverlayStateStore};
use crate::sync::SyncEngine;
use lesion_core::{Handle, Measurement, MeasurementValues, OverlayEntry, TimepointType, ToolType};
use lesion_metadata::{LocationLookup, TimepointDirectory};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// 病灶分类
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LesionClass {
    Target,
    NonTarget,
    CompleteResponse, // CR
    Excluded,         // EX
    Unknown,          // UN
}

impl LesionClass {
    /// 由测量记录推断当前分类
    pub fn of(measurement: &Measurement) -> Self {
        if measurement.is_target {
            return Self::Target;
        }
        match measurement.tool_type {
            ToolType::CrTool => Self::CompleteResponse,
            ToolType::ExTool => Self::Excluded,
            ToolType::UnTool => Self::Unknown,
            _ => Self::NonTarget,
        }
    }
}

/// 分类转换状态机
///
/// 转换规则以（当前分类, 目标工具类型）为键查表。
#[derive(Debug)]
pub struct ConversionStateMachine {
    transitions: HashMap<(LesionClass, ToolType), LesionClass>,
}

impl ConversionStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 定义转换规则
        transitions.insert((LesionClass::Target, ToolType::NonTarget), LesionClass::NonTarget);
        transitions.insert((LesionClass::NonTarget, ToolType::CrTool), LesionClass::CompleteResponse);
        transitions.insert((LesionClass::NonTarget, ToolType::ExTool), LesionClass::Excluded);
        transitions.insert((LesionClass::NonTarget, ToolType::UnTool), LesionClass::Unknown);

        Self { transitions }
    }

    /// 检查转换是否有效
    pub fn can_convert(&self, from: LesionClass, via_tool: ToolType) -> bool {
        self.transitions.contains_key(&(from, via_tool))
    }

    /// 目标 -> 非目标 转换
    ///
    /// 已是非目标时为空操作。新标注几何为原两点几何的中点 + 半幅
    /// 变换；基线时间点的响应置为 `Present`，随访置空。新记录持久化
    /// 成功后才从源记录剥离该时间点。返回新记录的ID，任一前置条件
    /// 缺失时返回 `None`。
    #[allow(clippy::too_many_arguments)]
    pub fn convert_to_non_target(
        &self,
        store: &mut MeasurementStore,
        overlays: &mut OverlayStateStore,
        sync: &SyncEngine,
        locations: &dyn LocationLookup,
        timepoints: &dyn TimepointDirectory,
        measurement_id: Uuid,
        timepoint_id: &str,
    ) -> Option<Uuid> {
        let Some(source) = store.get(&measurement_id).cloned() else {
            tracing::warn!("Measurement {} not found, conversion skipped", measurement_id);
            return None;
        };

        if !self.can_convert(LesionClass::of(&source), ToolType::NonTarget) {
            tracing::debug!(
                "Measurement {} is already non-target, nothing to convert",
                measurement_id
            );
            return None;
        }

        let Some(timepoint) = timepoints.get(timepoint_id) else {
            tracing::warn!("Timepoint {} unknown, conversion skipped", timepoint_id);
            return None;
        };

        // LT-112: 非目标响应在基线默认为 Present，随访留空待评估
        let response = match timepoint.timepoint_type {
            TimepointType::Baseline => "Present".to_string(),
            TimepointType::Followup => String::new(),
        };

        self.convert(
            store,
            overlays,
            sync,
            locations,
            &source,
            timepoint_id,
            ToolType::NonTarget,
            response,
        )
    }

    /// 非目标 -> 定性评估（CR / EX / UN）转换
    ///
    /// 仅允许 `nonTarget` 工具的记录在随访时间点转换；基线时间点的
    /// 转换请求被拒绝（记录日志，不抛错）。
    #[allow(clippy::too_many_arguments)]
    pub fn convert_non_target(
        &self,
        store: &mut MeasurementStore,
        overlays: &mut OverlayStateStore,
        sync: &SyncEngine,
        locations: &dyn LocationLookup,
        timepoints: &dyn TimepointDirectory,
        measurement_id: Uuid,
        timepoint_id: &str,
        new_tool_type: ToolType,
    ) -> Option<Uuid> {
        let Some(source) = store.get(&measurement_id).cloned() else {
            tracing::warn!("Measurement {} not found, conversion skipped", measurement_id);
            return None;
        };

        let from = LesionClass::of(&source);
        if source.tool_type != ToolType::NonTarget || !self.can_convert(from, new_tool_type) {
            tracing::warn!(
                "Invalid conversion from {:?} via {} for measurement {}",
                from,
                new_tool_type,
                measurement_id
            );
            return None;
        }

        let Some(timepoint) = timepoints.get(timepoint_id) else {
            tracing::warn!("Timepoint {} unknown, conversion skipped", timepoint_id);
            return None;
        };

        if timepoint.timepoint_type != TimepointType::Followup {
            tracing::warn!(
                "Qualitative conversion is follow-up only, rejected at baseline timepoint {}",
                timepoint_id
            );
            return None;
        }

        // 转换表保证这里只会是定性工具
        let Some(code) = new_tool_type.response_code() else {
            return None;
        };
        let response = code.to_string();

        self.convert(
            store,
            overlays,
            sync,
            locations,
            &source,
            timepoint_id,
            new_tool_type,
            response,
        )
    }

    /// 共用的转换主体：新建记录、拷贝部位、回填标注、剥离源时间点
    #[allow(clippy::too_many_arguments)]
    fn convert(
        &self,
        store: &mut MeasurementStore,
        overlays: &mut OverlayStateStore,
        sync: &SyncEngine,
        locations: &dyn LocationLookup,
        source: &Measurement,
        timepoint_id: &str,
        new_tool_type: ToolType,
        response: String,
    ) -> Option<Uuid> {
        let Some(entry) = source.timepoint(timepoint_id) else {
            tracing::warn!(
                "Measurement {} has no data at timepoint {}, conversion skipped",
                source.id,
                timepoint_id
            );
            return None;
        };

        let Some(handles) = non_target_handles(&entry.handles) else {
            tracing::warn!(
                "Measurement {} has malformed handles at timepoint {}, conversion skipped",
                source.id,
                timepoint_id
            );
            return None;
        };

        let new_number = next_lesion_number(store, timepoint_id, false);

        let candidate = OverlayEntry {
            id: None,
            image_id: entry.image_id.clone(),
            tool_type: new_tool_type,
            lesion_number: new_number,
            is_target: false,
            location: source.location.clone(),
            location_id: source.location_id,
            is_nodal: source.is_nodal,
            patient_id: source.patient_id.clone(),
            timepoint_id: entry.timepoint_id.clone(),
            study_instance_uid: entry.study_instance_uid.clone(),
            series_instance_uid: entry.series_instance_uid.clone(),
            sop_instance_uid: entry.sop_instance_uid.clone(),
            handles,
            values: MeasurementValues::Response {
                response: response.clone(),
            },
            measurement_text: response,
            label: source.location.clone().unwrap_or_default(),
            active: false,
            visible: true,
            is_deleted: false,
        };

        let outcome = sync.commit_overlay_edit(store, locations, &candidate);
        let new_id = outcome.measurement_id();

        // 部位沿用源记录的登记值
        store.update_location(new_id, source.location.clone(), source.location_id, source.is_nodal);

        if let Some(new_measurement) = store.get(&new_id).cloned() {
            sync.hydrate_overlay(overlays, &new_measurement, timepoint_id);
        }

        // 新记录已持久化，此时才能剥离源时间点
        sync.clear_measurement_timepoint_data(store, overlays, source.id, timepoint_id);

        tracing::info!(
            "Converted measurement {} to {} lesion {} at timepoint {}",
            source.id,
            new_tool_type,
            new_number,
            timepoint_id
        );
        Some(new_id)
    }
}

impl Default for ConversionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// 非目标标注的几何变换
///
/// 新起点 = 原两点中点，新终点 = 两点坐标的分量最小值。
fn non_target_handles(handles: &[Handle]) -> Option<Vec<Handle>> {
    let first = handles.first()?;
    let second = handles.get(1)?;

    let center = Handle::new((first.x + second.x) / 2.0, (first.y + second.y) / 2.0);
    let corner = Handle::new(first.x.min(second.x), first.y.min(second.y));
    Some(vec![center, corner])
}
