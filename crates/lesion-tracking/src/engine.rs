//! 病灶追踪引擎
//!
//! 协调存储、同步、分类转换、试验标准验证与激活导航的核心引擎，
//! 对外提供统一的入口：标注增改删、事件泵、分类转换、病灶激活、
//! 合规检查与结果导出。

use crate::config::TrackingConfig;
use crate::conversion::ConversionStateMachine;
use crate::criteria::TrialCriteriaEngine;
use crate::export::{exported_measurements, ExportedMeasurement};
use crate::navigation::ActivationNavigator;
use crate::numbering;
use crate::store::{MeasurementEvent, MeasurementStore, OverlayStateStore};
use crate::sync::{CommitOutcome, SyncEngine};
use crate::validation::{self, ConformanceError};
use lesion_core::{OverlayEntry, Result, ToolType};
use lesion_metadata::{
    DisplaySurfaceProvider, ImageMetadataProvider, LocationLookup, TimepointDirectory,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// 一次标注提交的结果：存储结果 + 顾问性合规错误
#[derive(Debug)]
pub struct MeasurementUpdate {
    pub outcome: CommitOutcome,
    pub conformance: Vec<ConformanceError>,
}

/// 病灶追踪引擎
///
/// 协调所有追踪组件，提供统一的管理接口
pub struct LesionTrackingEngine {
    config: TrackingConfig,
    measurements: MeasurementStore,
    overlays: OverlayStateStore,
    events: broadcast::Receiver<MeasurementEvent>,
    sync: SyncEngine,
    conversion: ConversionStateMachine,
    criteria: TrialCriteriaEngine,
    navigator: ActivationNavigator,
    metadata: Arc<dyn ImageMetadataProvider>,
    locations: Arc<dyn LocationLookup>,
    timepoints: Arc<dyn TimepointDirectory>,
}

impl LesionTrackingEngine {
    /// 创建新的追踪引擎
    pub fn new(
        config: TrackingConfig,
        metadata: Arc<dyn ImageMetadataProvider>,
        locations: Arc<dyn LocationLookup>,
        timepoints: Arc<dyn TimepointDirectory>,
    ) -> Self {
        let measurements = MeasurementStore::new();
        let events = measurements.subscribe();
        let sync = SyncEngine::new(config.client_id.clone());
        let criteria = TrialCriteriaEngine::new(config.criteria.clone());

        Self {
            config,
            measurements,
            overlays: OverlayStateStore::new(),
            events,
            sync,
            conversion: ConversionStateMachine::new(),
            criteria,
            navigator: ActivationNavigator::new(),
            metadata,
            locations,
            timepoints,
        }
    }

    /// 处理新增标注
    ///
    /// 提交编辑并对所在图像做一次顾问性合规检查。标准名称未注册时
    /// 返回错误（提交本身已持久化，存储状态不受影响）。
    pub fn handle_measurement_added(&mut self, entry: &OverlayEntry) -> Result<MeasurementUpdate> {
        let outcome =
            self.sync
                .commit_overlay_edit(&mut self.measurements, self.locations.as_ref(), entry);
        let conformance = self.conformance_check_image(&entry.image_id)?;

        tracing::info!(
            "Measurement commit for lesion {} on image {}: {:?}, {} conformance finding(s)",
            entry.lesion_number,
            entry.image_id,
            outcome,
            conformance.len()
        );
        Ok(MeasurementUpdate { outcome, conformance })
    }

    /// 处理标注修改（与新增同路径，提交是幂等的）
    pub fn handle_measurement_modified(&mut self, entry: &OverlayEntry) -> Result<MeasurementUpdate> {
        self.handle_measurement_added(entry)
    }

    /// 处理标注删除：剥离该时间点数据，必要时级联删除记录
    pub fn handle_measurement_removed(&mut self, measurement_id: Uuid, timepoint_id: &str) {
        self.sync.clear_measurement_timepoint_data(
            &mut self.measurements,
            &mut self.overlays,
            measurement_id,
            timepoint_id,
        );
    }

    /// 泵出并处理积压的存储变更事件
    ///
    /// 非本地发起的 新建/更新 事件触发 记录 -> 标注 回填；本地事件被
    /// 跳过（回路防护）。返回执行了回填的事件数。
    pub fn process_pending_events(&mut self) -> usize {
        let mut hydrated = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if self.sync.handle_event(&self.measurements, &mut self.overlays, &event) {
                        hydrated += 1;
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!("Event receiver lagged, {} event(s) dropped", missed);
                }
                Err(_) => break,
            }
        }
        hydrated
    }

    /// 由测量记录回填屏上标注
    pub fn hydrate_lesion(&mut self, measurement_id: Uuid, timepoint_id: &str) {
        let Some(measurement) = self.measurements.get(&measurement_id).cloned() else {
            tracing::warn!("Measurement {} not found, nothing to hydrate", measurement_id);
            return;
        };
        self.sync
            .hydrate_overlay(&mut self.overlays, &measurement, timepoint_id);
    }

    /// 图像加载完成后回填该图像上的全部标注
    pub fn hydrate_image(&mut self, image_id: &str) {
        let pairs: Vec<(Uuid, String)> = self
            .measurements
            .all()
            .iter()
            .flat_map(|measurement| {
                measurement
                    .timepoints
                    .values()
                    .filter(|entry| entry.image_id == image_id)
                    .map(move |entry| (measurement.id, entry.timepoint_id.clone()))
            })
            .collect();

        for (measurement_id, timepoint_id) in pairs {
            self.hydrate_lesion(measurement_id, &timepoint_id);
        }
    }

    /// 目标 -> 非目标 转换
    pub fn convert_to_non_target(&mut self, measurement_id: Uuid, timepoint_id: &str) -> Option<Uuid> {
        self.conversion.convert_to_non_target(
            &mut self.measurements,
            &mut self.overlays,
            &self.sync,
            self.locations.as_ref(),
            self.timepoints.as_ref(),
            measurement_id,
            timepoint_id,
        )
    }

    /// 非目标 -> 定性评估（CR / EX / UN）转换
    pub fn convert_non_target(
        &mut self,
        measurement_id: Uuid,
        timepoint_id: &str,
        new_tool_type: ToolType,
    ) -> Option<Uuid> {
        self.conversion.convert_non_target(
            &mut self.measurements,
            &mut self.overlays,
            &self.sync,
            self.locations.as_ref(),
            self.timepoints.as_ref(),
            measurement_id,
            timepoint_id,
            new_tool_type,
        )
    }

    /// 激活选中的病灶，返回激活的面板数量
    pub async fn activate_lesion(
        &mut self,
        surfaces: &mut dyn DisplaySurfaceProvider,
        measurement_id: Uuid,
    ) -> usize {
        self.navigator
            .activate_lesion(
                &self.measurements,
                &mut self.overlays,
                self.timepoints.as_ref(),
                surfaces,
                measurement_id,
            )
            .await
    }

    /// 对某图像做合规检查
    ///
    /// 元数据或时间点缺失时返回空列表（失败即关闭）；当前启用的
    /// 标准名称未注册时返回错误。
    pub fn conformance_check_image(&self, image_id: &str) -> Result<Vec<ConformanceError>> {
        let Some(resolved) = self.criteria.criteria_for_image(
            &self.config.active_criteria,
            image_id,
            self.metadata.as_ref(),
            self.timepoints.as_ref(),
        )?
        else {
            return Ok(Vec::new());
        };

        let phase = resolved.tree.phase(resolved.timepoint_type);
        let mut errors = Vec::new();

        for measurement in self.measurements.all() {
            if !measurement.has_timepoint(&resolved.timepoint_id) {
                continue;
            }
            let is_new = validation::is_new_lesion_at(
                measurement,
                &resolved.timepoint_id,
                self.timepoints.as_ref(),
            );
            errors.extend(validation::validate_measurement(
                measurement,
                &resolved.timepoint_id,
                phase,
                is_new,
            ));
        }

        errors.extend(validation::assess_group(
            &self.measurements,
            &resolved.timepoint_id,
            &resolved.tree,
            resolved.timepoint_type,
            self.timepoints.as_ref(),
        ));

        Ok(errors)
    }

    /// 下一个可用的病灶编号
    pub fn next_lesion_number(&self, timepoint_id: &str, is_target: bool) -> u32 {
        numbering::next_lesion_number(&self.measurements, timepoint_id, is_target)
    }

    /// 同编号病灶已登记的部位（用于锁定部位选择）
    pub fn existing_location_for_number(&self, lesion_number: u32, is_target: bool) -> Option<Uuid> {
        numbering::existing_location_for_number(&self.measurements, lesion_number, is_target)
    }

    /// 导出全部测量结果
    pub fn exported_measurements(&self) -> Vec<ExportedMeasurement> {
        exported_measurements(&self.measurements)
    }

    /// 获取测量仓库
    pub fn measurements(&self) -> &MeasurementStore {
        &self.measurements
    }

    /// 获取可变测量仓库
    pub fn measurements_mut(&mut self) -> &mut MeasurementStore {
        &mut self.measurements
    }

    /// 获取标注存储
    pub fn overlays(&self) -> &OverlayStateStore {
        &self.overlays
    }

    /// 获取可变标注存储
    pub fn overlays_mut(&mut self) -> &mut OverlayStateStore {
        &mut self.overlays
    }

    /// 获取标准引擎
    pub fn criteria(&self) -> &TrialCriteriaEngine {
        &self.criteria
    }

    /// 获取配置
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }
}
