//! 测量数据合规性验证
//!
//! 把约束树应用到测量记录上，产出顾问性的合规错误列表。验证永远
//! 不中断同步/转换流程。数值字段解析失败产生 NaN 并使对应的数值
//! 约束显式失败，畸形数据不会被静默放过。

use crate::criteria::{
    response_label, Constraint, ConstraintField, CriteriaTree, CriteriaType, FieldConstraint,
    PhaseCriteria,
};
use crate::store::MeasurementStore;
use lesion_core::utils::parse_measured_value;
use lesion_core::{Measurement, TimepointType};
use lesion_metadata::TimepointDirectory;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 合规错误归属
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConformanceKind {
    Target,
    NonTarget,
    PerOrgan,
    Group,
}

impl ConformanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Target => "target",
            Self::NonTarget => "nonTarget",
            Self::PerOrgan => "perOrgan",
            Self::Group => "group",
        }
    }
}

/// 单条合规错误
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConformanceError {
    pub kind: ConformanceKind,
    pub field: ConstraintField,
    pub message: String,
    pub value: String,
    /// 错误定位前缀，如 "Target 1" 或器官名
    pub prefix: String,
}

/// 验证单条测量记录在某时间点的数据
///
/// 目标病灶按淋巴结属性选用 nodal / extra_nodal 约束组，再叠加
/// 通用组；非目标病灶只应用其通用组。组级字段在这里跳过，由
/// `assess_group` 统一计算。
pub fn validate_measurement(
    measurement: &Measurement,
    timepoint_id: &str,
    phase: &PhaseCriteria,
    is_new_lesion: bool,
) -> Vec<ConformanceError> {
    let Some(entry) = measurement.timepoint(timepoint_id) else {
        return Vec::new();
    };

    let (kind, prefix) = if measurement.is_target {
        (ConformanceKind::Target, format!("Target {}", measurement.lesion_number))
    } else {
        (
            ConformanceKind::NonTarget,
            format!("Non-Target {}", measurement.lesion_number),
        )
    };

    let mut sets: Vec<&[FieldConstraint]> = Vec::new();
    if measurement.is_target {
        if measurement.is_nodal {
            sets.push(&phase.target.nodal);
        } else {
            sets.push(&phase.target.extra_nodal);
        }
        sets.push(&phase.target.all);
        if is_new_lesion {
            sets.push(&phase.new_lesion_target);
        }
    } else {
        sets.push(&phase.non_target.all);
    }

    let mut errors = Vec::new();
    for field_constraint in sets.into_iter().flatten() {
        let raw = match field_constraint.field {
            ConstraintField::LongestDiameter => entry.values.longest_diameter(),
            ConstraintField::ShortestDiameter => entry.values.shortest_diameter(),
            ConstraintField::Response => entry.values.response(),
            // 组级字段不在单条记录上评估
            _ => continue,
        };

        match &field_constraint.constraint {
            Constraint::GreaterThanOrEqualTo { .. } | Constraint::LessThanOrEqualTo { .. } => {
                let Some(raw) = raw else {
                    continue;
                };
                let value = parse_measured_value(raw);
                if let Some(message) = check_numeric(value, &field_constraint.constraint) {
                    errors.push(ConformanceError {
                        kind,
                        field: field_constraint.field,
                        message,
                        value: raw.to_string(),
                        prefix: prefix.clone(),
                    });
                }
            }
            _ => {
                if let Some(message) = check_text(raw, &field_constraint.constraint) {
                    errors.push(ConformanceError {
                        kind,
                        field: field_constraint.field,
                        message,
                        value: raw.unwrap_or("").to_string(),
                        prefix: prefix.clone(),
                    });
                }
            }
        }
    }

    errors
}

/// 组级合规检查
///
/// 统计该时间点的目标病灶总数、每器官数量与总病灶负荷，应用组级
/// 与每器官约束。
pub fn assess_group(
    store: &MeasurementStore,
    timepoint_id: &str,
    tree: &CriteriaTree,
    timepoint_type: TimepointType,
    timepoints: &dyn TimepointDirectory,
) -> Vec<ConformanceError> {
    let phase = tree.phase(timepoint_type);
    let mut errors = Vec::new();

    let targets: Vec<&Measurement> = store
        .all_by_target(true)
        .into_iter()
        .filter(|m| m.has_timepoint(timepoint_id))
        .collect();

    // 总数约束
    let total = targets.len() as f64;
    for field_constraint in &phase.group {
        if field_constraint.field != ConstraintField::TotalNumberOfLesions {
            continue;
        }
        if let Some(message) = check_numeric(total, &field_constraint.constraint) {
            errors.push(ConformanceError {
                kind: ConformanceKind::Group,
                field: field_constraint.field,
                message,
                value: format!("{}", targets.len()),
                prefix: String::new(),
            });
        }
    }

    // 每器官约束
    let mut per_organ: HashMap<String, usize> = HashMap::new();
    for measurement in &targets {
        let organ = measurement
            .location
            .clone()
            .unwrap_or_else(|| "Unspecified".to_string());
        *per_organ.entry(organ).or_insert(0) += 1;
    }
    for field_constraint in &phase.per_organ {
        if field_constraint.field != ConstraintField::NumberOfLesionsPerOrgan {
            continue;
        }
        for (organ, count) in &per_organ {
            if let Some(message) = check_numeric(*count as f64, &field_constraint.constraint) {
                errors.push(ConformanceError {
                    kind: ConformanceKind::PerOrgan,
                    field: field_constraint.field,
                    message,
                    value: format!("{}", count),
                    prefix: organ.clone(),
                });
            }
        }
    }

    // 总负荷约束（挂在 target.all 或不分阶段的组级约束上）
    let burden_constraints: Vec<&FieldConstraint> = phase
        .target
        .all
        .iter()
        .chain(tree.all.group.iter())
        .filter(|fc| fc.field == ConstraintField::TotalLesionBurden)
        .collect();
    if !burden_constraints.is_empty() {
        let burden =
            calculate_total_lesion_burden(tree.criteria_type, store, timepoint_id, timepoints);
        for field_constraint in burden_constraints {
            if let Some(message) = check_numeric(burden, &field_constraint.constraint) {
                errors.push(ConformanceError {
                    kind: ConformanceKind::Group,
                    field: field_constraint.field,
                    message,
                    value: format!("{}", burden),
                    prefix: String::new(),
                });
            }
        }
    }

    errors
}

/// 计算某时间点的总病灶负荷
///
/// RECIST：非淋巴结目标病灶长径之和 + 淋巴结目标病灶短径之和。
/// irRC：全部目标病灶的长短径乘积（SPD）之和，按新发/既有分桶
/// 累加后求和。NaN 沿加法传播。
pub fn calculate_total_lesion_burden(
    criteria_type: CriteriaType,
    store: &MeasurementStore,
    timepoint_id: &str,
    timepoints: &dyn TimepointDirectory,
) -> f64 {
    let targets = store.all_by_target(true);

    match criteria_type {
        CriteriaType::Recist => {
            let mut total = 0.0;
            for measurement in targets {
                let Some(entry) = measurement.timepoint(timepoint_id) else {
                    continue;
                };
                let raw = if measurement.is_nodal {
                    entry.values.shortest_diameter()
                } else {
                    entry.values.longest_diameter()
                };
                let Some(raw) = raw else {
                    continue;
                };
                total += parse_measured_value(raw);
            }
            total
        }
        CriteriaType::IrRc => {
            let mut new_burden = 0.0;
            let mut prior_burden = 0.0;
            for measurement in targets {
                let Some(entry) = measurement.timepoint(timepoint_id) else {
                    continue;
                };
                let (Some(longest), Some(shortest)) = (
                    entry.values.longest_diameter(),
                    entry.values.shortest_diameter(),
                ) else {
                    continue;
                };
                let product = parse_measured_value(longest) * parse_measured_value(shortest);
                if is_new_lesion_at(measurement, timepoint_id, timepoints) {
                    new_burden += product;
                } else {
                    prior_burden += product;
                }
            }
            tracing::debug!(
                "irRC burden at {}: new={} prior={}",
                timepoint_id,
                new_burden,
                prior_burden
            );
            new_burden + prior_burden
        }
    }
}

/// 病灶在该时间点是否为新发
///
/// 新发 = 该病灶有数据的最早时间点（按时间点目录的日期序）恰好是
/// 被评估的时间点。
pub fn is_new_lesion_at(
    measurement: &Measurement,
    timepoint_id: &str,
    timepoints: &dyn TimepointDirectory,
) -> bool {
    let order: HashMap<String, usize> = timepoints
        .ordered()
        .into_iter()
        .enumerate()
        .map(|(index, info)| (info.timepoint_id, index))
        .collect();

    let earliest = measurement
        .timepoints
        .keys()
        .filter_map(|tp| order.get(tp))
        .min();

    match (earliest, order.get(timepoint_id)) {
        (Some(earliest), Some(current)) => earliest == current,
        _ => false,
    }
}

fn check_numeric(value: f64, constraint: &Constraint) -> Option<String> {
    match constraint {
        Constraint::GreaterThanOrEqualTo { limit, message } => {
            // NaN 不满足任何比较，畸形数据在这里显式失败
            if value >= *limit {
                None
            } else {
                Some(message.clone())
            }
        }
        Constraint::LessThanOrEqualTo { limit, message } => {
            if value <= *limit {
                None
            } else {
                Some(message.clone())
            }
        }
        _ => None,
    }
}

fn check_text(value: Option<&str>, constraint: &Constraint) -> Option<String> {
    match constraint {
        Constraint::ExclusionWithin { codes, message } => {
            let value = value?;
            if codes.iter().any(|code| code == value) {
                Some(message.replace("{value}", &response_label(value)))
            } else {
                None
            }
        }
        Constraint::InclusionWithin { codes, message } => {
            let value = value.unwrap_or("");
            if codes.iter().any(|code| code == value) {
                None
            } else {
                Some(message.clone())
            }
        }
        Constraint::Presence { message } => {
            if value.map(str::trim).unwrap_or("").is_empty() {
                Some(message.clone())
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CriteriaPolicy;
    use crate::criteria::TrialCriteriaEngine;
    use chrono::NaiveDate;
    use lesion_core::{Handle, MeasurementValues, TimepointEntry, TimepointInfo, ToolType};
    use lesion_metadata::InMemoryTimepointDirectory;
    use std::collections::HashMap as StdHashMap;
    use uuid::Uuid;

    fn directory() -> InMemoryTimepointDirectory {
        let mut directory = InMemoryTimepointDirectory::new();
        directory.add_timepoint(TimepointInfo {
            timepoint_id: "tp-baseline".to_string(),
            timepoint_type: TimepointType::Baseline,
            latest_date: NaiveDate::from_ymd_opt(2016, 11, 20).unwrap(),
            patient_id: "patient-1".to_string(),
        });
        directory.add_timepoint(TimepointInfo {
            timepoint_id: "tp-followup".to_string(),
            timepoint_type: TimepointType::Followup,
            latest_date: NaiveDate::from_ymd_opt(2017, 3, 1).unwrap(),
            patient_id: "patient-1".to_string(),
        });
        directory
    }

    fn target_lesion(
        lesion_number: u32,
        longest: &str,
        shortest: &str,
        nodal: bool,
        location: &str,
        timepoint_ids: &[&str],
    ) -> Measurement {
        let mut tps = StdHashMap::new();
        for tp in timepoint_ids {
            tps.insert(
                tp.to_string(),
                TimepointEntry {
                    timepoint_id: tp.to_string(),
                    study_instance_uid: "1.2.3".to_string(),
                    series_instance_uid: "1.2.3.4".to_string(),
                    sop_instance_uid: "1.2.3.4.5".to_string(),
                    image_id: format!("image-{}", tp),
                    handles: vec![Handle::new(0.0, 0.0), Handle::new(4.0, 4.0)],
                    values: MeasurementValues::Bidirectional {
                        longest_diameter: longest.to_string(),
                        shortest_diameter: shortest.to_string(),
                    },
                },
            );
        }
        Measurement {
            id: Uuid::new_v4(),
            lesion_number,
            is_target: true,
            tool_type: ToolType::Bidirectional,
            location: Some(location.to_string()),
            location_id: None,
            is_nodal: nodal,
            patient_id: "patient-1".to_string(),
            client_id: "test".to_string(),
            lesion_number_absolute: lesion_number as u64,
            timepoints: tps,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn non_target_lesion(lesion_number: u32, response: &str) -> Measurement {
        let mut measurement = target_lesion(lesion_number, "0", "0", false, "Lung", &[]);
        measurement.is_target = false;
        measurement.tool_type = ToolType::NonTarget;
        measurement.timepoints.insert(
            "tp-baseline".to_string(),
            TimepointEntry {
                timepoint_id: "tp-baseline".to_string(),
                study_instance_uid: "1.2.3".to_string(),
                series_instance_uid: "1.2.3.4".to_string(),
                sop_instance_uid: "1.2.3.4.5".to_string(),
                image_id: "image-tp-baseline".to_string(),
                handles: vec![Handle::new(0.0, 0.0), Handle::new(4.0, 4.0)],
                values: MeasurementValues::Response {
                    response: response.to_string(),
                },
            },
        );
        measurement
    }

    #[test]
    fn test_recist_burden_concrete_case() {
        let mut store = MeasurementStore::new();
        store.insert(target_lesion(1, "20", "10", false, "Lung", &["tp-baseline"]));
        store.insert(target_lesion(2, "8", "18", true, "Mediastinum", &["tp-baseline"]));
        let directory = directory();

        // 非淋巴结取长径 20，淋巴结取短径 18
        let burden = calculate_total_lesion_burden(
            CriteriaType::Recist,
            &store,
            "tp-baseline",
            &directory,
        );
        assert_eq!(burden, 38.0);
    }

    #[test]
    fn test_burden_nan_propagates() {
        let mut store = MeasurementStore::new();
        store.insert(target_lesion(1, "20", "10", false, "Lung", &["tp-baseline"]));
        store.insert(target_lesion(2, "not-a-number", "18", false, "Liver", &["tp-baseline"]));
        let directory = directory();

        let burden = calculate_total_lesion_burden(
            CriteriaType::Recist,
            &store,
            "tp-baseline",
            &directory,
        );
        assert!(burden.is_nan());
    }

    #[test]
    fn test_irrc_burden_sums_spd() {
        let mut store = MeasurementStore::new();
        store.insert(target_lesion(1, "20", "10", false, "Lung", &["tp-baseline", "tp-followup"]));
        store.insert(target_lesion(2, "10", "10", true, "Mediastinum", &["tp-followup"]));
        let directory = directory();

        // 病灶1 为既有（基线起），病灶2 为随访新发；SPD 求和 200 + 100
        let burden = calculate_total_lesion_burden(
            CriteriaType::IrRc,
            &store,
            "tp-followup",
            &directory,
        );
        assert_eq!(burden, 300.0);
    }

    #[test]
    fn test_is_new_lesion_at() {
        let directory = directory();
        let prior = target_lesion(1, "20", "10", false, "Lung", &["tp-baseline", "tp-followup"]);
        let fresh = target_lesion(2, "10", "10", false, "Liver", &["tp-followup"]);

        assert!(!is_new_lesion_at(&prior, "tp-followup", &directory));
        assert!(is_new_lesion_at(&fresh, "tp-followup", &directory));
        assert!(is_new_lesion_at(&prior, "tp-baseline", &directory));
    }

    #[test]
    fn test_validate_nodal_target_short_axis() {
        let engine = TrialCriteriaEngine::default();
        let context = crate::criteria::ImagingContext {
            acquisition_slice_thickness: Some(6.0),
            is_chest_xray: false,
        };
        let tree = engine.build_criteria(CriteriaType::Recist, Some(&context));

        // 淋巴结短径 8 < 15，违反基线约束
        let lesion = target_lesion(1, "30", "8", true, "Mediastinum", &["tp-baseline"]);
        let errors = validate_measurement(&lesion, "tp-baseline", &tree.baseline, false);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, ConstraintField::ShortestDiameter);
        assert_eq!(errors[0].prefix, "Target 1");
    }

    #[test]
    fn test_validate_malformed_diameter_fails() {
        let engine = TrialCriteriaEngine::default();
        let tree = engine.build_criteria(CriteriaType::Recist, None);

        let lesion = target_lesion(1, "??", "20", false, "Lung", &["tp-baseline"]);
        let errors = validate_measurement(&lesion, "tp-baseline", &tree.baseline, false);
        assert!(errors
            .iter()
            .any(|e| e.field == ConstraintField::LongestDiameter));
    }

    #[test]
    fn test_validate_non_target_present_only() {
        let engine = TrialCriteriaEngine::default();
        let tree = engine.build_criteria(CriteriaType::Recist, None);

        let present = non_target_lesion(1, "Present");
        assert!(validate_measurement(&present, "tp-baseline", &tree.baseline, false).is_empty());

        let empty = non_target_lesion(2, "");
        let errors = validate_measurement(&empty, "tp-baseline", &tree.baseline, false);
        assert!(!errors.is_empty());
        assert!(errors.iter().all(|e| e.kind == ConformanceKind::NonTarget));
    }

    #[test]
    fn test_exclusion_message_expands_code_label() {
        let engine = TrialCriteriaEngine::default();
        let tree = engine.build_criteria(CriteriaType::Recist, None);

        let mut lesion = target_lesion(1, "20", "10", false, "Lung", &[]);
        lesion.timepoints.insert(
            "tp-baseline".to_string(),
            TimepointEntry {
                timepoint_id: "tp-baseline".to_string(),
                study_instance_uid: "1.2.3".to_string(),
                series_instance_uid: "1.2.3.4".to_string(),
                sop_instance_uid: "1.2.3.4.5".to_string(),
                image_id: "image-1".to_string(),
                handles: vec![],
                values: MeasurementValues::Response {
                    response: "CR".to_string(),
                },
            },
        );

        let errors = validate_measurement(&lesion, "tp-baseline", &tree.baseline, false);
        assert!(errors
            .iter()
            .any(|e| e.message.contains("Complete Response (CR)")));
    }

    #[test]
    fn test_assess_group_counts_and_organs() {
        let engine = TrialCriteriaEngine::default();
        let tree = engine.build_criteria(CriteriaType::Recist, None);
        let directory = directory();

        let mut store = MeasurementStore::new();
        for n in 1..=6 {
            // 3 个病灶挤在同一器官，总数也超过 5 个
            let organ = if n <= 3 { "Liver" } else { "Lung" };
            store.insert(target_lesion(n, "20", "10", false, organ, &["tp-baseline"]));
        }

        let errors = assess_group(
            &store,
            "tp-baseline",
            &tree,
            TimepointType::Baseline,
            &directory,
        );

        assert!(errors
            .iter()
            .any(|e| e.kind == ConformanceKind::Group
                && e.field == ConstraintField::TotalNumberOfLesions));
        assert!(errors
            .iter()
            .any(|e| e.kind == ConformanceKind::PerOrgan && e.prefix == "Liver"));
        assert!(!errors
            .iter()
            .any(|e| e.kind == ConformanceKind::PerOrgan && e.prefix == "Lung"));
    }

    #[test]
    fn test_assess_group_burden_threshold() {
        let engine = TrialCriteriaEngine::new(CriteriaPolicy {
            recist_min_total_burden: 50.0,
            irrc_min_total_burden: 100.0,
        });
        let tree = engine.build_criteria(CriteriaType::Recist, None);
        let directory = directory();

        let mut store = MeasurementStore::new();
        store.insert(target_lesion(1, "20", "10", false, "Lung", &["tp-baseline"]));

        // 负荷 20 < 50
        let errors = assess_group(
            &store,
            "tp-baseline",
            &tree,
            TimepointType::Baseline,
            &directory,
        );
        assert!(errors
            .iter()
            .any(|e| e.field == ConstraintField::TotalLesionBurden));
    }
}
