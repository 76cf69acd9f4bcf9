//! 试验标准规则引擎
//!
//! 以声明式约束树表达 RECIST 1.1 与 irRC 两套入组标准。约束树是
//! 采集层厚与设备类型的纯函数，按时间点阶段（基线/随访）与病灶
//! 类别（目标/非目标/每器官/组级）分组。
//!
//! 按图像解析标准时，设备类型、层厚、时间点类型任一查找失败都
//! 返回空结果（失败即关闭），绝不静默回退到默认阈值。

use crate::config::CriteriaPolicy;
use lesion_core::{Result, TimepointType, TrackerError};
use lesion_metadata::{ImageMetadataProvider, TimepointDirectory};
use serde::{Deserialize, Serialize};

/// 图像采集上下文
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagingContext {
    pub acquisition_slice_thickness: Option<f64>, // 采集层厚 (mm)
    pub is_chest_xray: bool,
}

/// 试验标准类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CriteriaType {
    Recist,
    IrRc,
}

impl CriteriaType {
    /// 按注册名称解析标准类型
    ///
    /// 未注册的名称是配置错误，对本次验证调用是致命的。
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "RECIST" => Ok(Self::Recist),
            "irRC" => Ok(Self::IrRc),
            other => Err(TrackerError::UnknownCriteriaSet(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recist => "RECIST",
            Self::IrRc => "irRC",
        }
    }
}

/// 被约束的字段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConstraintField {
    LongestDiameter,
    ShortestDiameter,
    Response,
    TotalLesionBurden,
    NumberOfLesionsPerOrgan,
    TotalNumberOfLesions,
}

impl ConstraintField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LongestDiameter => "longestDiameter",
            Self::ShortestDiameter => "shortestDiameter",
            Self::Response => "response",
            Self::TotalLesionBurden => "totalLesionBurden",
            Self::NumberOfLesionsPerOrgan => "numberOfLesionsPerOrgan",
            Self::TotalNumberOfLesions => "totalNumberOfLesions",
        }
    }
}

/// 叶级约束
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Constraint {
    GreaterThanOrEqualTo { limit: f64, message: String },
    LessThanOrEqualTo { limit: f64, message: String },
    /// 值不得落在给定代码集合内；消息中的 `{value}` 以代码全称替换
    ExclusionWithin { codes: Vec<String>, message: String },
    /// 值必须落在给定代码集合内
    InclusionWithin { codes: Vec<String>, message: String },
    /// 值必须非空
    Presence { message: String },
}

/// 字段 + 约束
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldConstraint {
    pub field: ConstraintField,
    pub constraint: Constraint,
}

impl FieldConstraint {
    fn new(field: ConstraintField, constraint: Constraint) -> Self {
        Self { field, constraint }
    }
}

/// 按淋巴结属性细分的病灶类别约束
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClassCriteria {
    pub nodal: Vec<FieldConstraint>,       // 仅淋巴结病灶
    pub extra_nodal: Vec<FieldConstraint>, // 仅非淋巴结病灶
    pub all: Vec<FieldConstraint>,         // 该类别全部病灶
}

/// 某一阶段（基线/随访）的全部约束
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhaseCriteria {
    pub target: ClassCriteria,
    pub non_target: ClassCriteria,
    pub new_lesion_target: Vec<FieldConstraint>, // 随访期新发目标病灶
    pub per_organ: Vec<FieldConstraint>,
    pub group: Vec<FieldConstraint>,
}

/// 完整约束树
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriteriaTree {
    pub criteria_type: CriteriaType,
    pub baseline: PhaseCriteria,
    pub followup: PhaseCriteria,
    /// 不分阶段的组级约束
    pub all: PhaseCriteria,
}

impl CriteriaTree {
    pub fn phase(&self, timepoint_type: TimepointType) -> &PhaseCriteria {
        match timepoint_type {
            TimepointType::Baseline => &self.baseline,
            TimepointType::Followup => &self.followup,
        }
    }
}

/// 响应代码全称（用于约束消息）
pub fn response_label(code: &str) -> String {
    match code {
        "CR" => "Complete Response (CR)".to_string(),
        "UN" => "Unknown (UN)".to_string(),
        "NE" => "Non-evaluable (NE)".to_string(),
        "EX" => "Excluded (EX)".to_string(),
        other => other.to_string(),
    }
}

/// 按图像解析出的约束与上下文
#[derive(Debug, Clone)]
pub struct ResolvedCriteria {
    pub tree: CriteriaTree,
    pub timepoint_id: String,
    pub timepoint_type: TimepointType,
    pub context: ImagingContext,
}

/// 试验标准引擎
#[derive(Debug)]
pub struct TrialCriteriaEngine {
    policy: CriteriaPolicy,
}

impl TrialCriteriaEngine {
    pub fn new(policy: CriteriaPolicy) -> Self {
        Self { policy }
    }

    /// 按名称构建约束树
    pub fn build_by_name(&self, name: &str, image: Option<&ImagingContext>) -> Result<CriteriaTree> {
        let criteria_type = CriteriaType::from_name(name)?;
        Ok(self.build_criteria(criteria_type, image))
    }

    /// 构建约束树（层厚与设备类型的纯函数）
    pub fn build_criteria(
        &self,
        criteria_type: CriteriaType,
        image: Option<&ImagingContext>,
    ) -> CriteriaTree {
        match criteria_type {
            CriteriaType::Recist => self.recist(image),
            CriteriaType::IrRc => self.irrc(image),
        }
    }

    /// 按图像解析约束
    ///
    /// 依次解析系列元数据（设备类型）、实例元数据（CT/MR 的层厚）、
    /// 检查元数据与时间点目录；任一环节缺失即返回 `Ok(None)`。
    pub fn criteria_for_image(
        &self,
        name: &str,
        image_id: &str,
        metadata: &dyn ImageMetadataProvider,
        timepoints: &dyn TimepointDirectory,
    ) -> Result<Option<ResolvedCriteria>> {
        let criteria_type = CriteriaType::from_name(name)?;

        let Some(series) = metadata.series_metadata(image_id) else {
            return Ok(None);
        };

        let mut context = ImagingContext::default();
        // 层厚只对断层成像有意义
        if series.modality == "CT" || series.modality == "MR" {
            context.acquisition_slice_thickness = metadata
                .instance_metadata(image_id)
                .and_then(|instance| instance.slice_thickness);
        }

        let Some(study) = metadata.study_metadata(image_id) else {
            return Ok(None);
        };
        let Some(timepoint_id) = study.timepoint_id else {
            return Ok(None);
        };
        let Some(timepoint) = timepoints.get(&timepoint_id) else {
            tracing::warn!("Timepoint related to study is missing.");
            return Ok(None);
        };

        let tree = self.build_criteria(criteria_type, Some(&context));
        Ok(Some(ResolvedCriteria {
            tree,
            timepoint_id,
            timepoint_type: timepoint.timepoint_type,
            context,
        }))
    }

    /// RECIST 1.1 标准
    ///
    /// 基线检查项：
    /// - 非淋巴结病灶长径 >= 10 mm 且 >= 2 倍采集层厚（CT/MR）
    /// - 非淋巴结病灶在胸部X光上 >= 20 mm
    /// - 淋巴结病灶短径 >= 15 mm 且 >= 2 倍采集层厚（CT/MR）
    /// - 每器官至多 2 个目标病灶，总共至多 5 个
    /// - 非目标病灶只能评估为 Present
    /// - 目标病灶必须有测量值（不得评估为 CR / UN / NE / EX）
    fn recist(&self, image: Option<&ImagingContext>) -> CriteriaTree {
        let thickness = image.and_then(|i| i.acquisition_slice_thickness);
        let is_chest_xray = image.map(|i| i.is_chest_xray).unwrap_or(false);

        let mut baseline = PhaseCriteria::default();

        match thickness {
            Some(t) => baseline.target.nodal.push(FieldConstraint::new(
                ConstraintField::ShortestDiameter,
                Constraint::GreaterThanOrEqualTo {
                    limit: f64::max(15.0, 2.0 * t),
                    message: format!(
                        "Nodal lesions must be >= 15 mm short axis AND >= double the \
                         acquisition slice thickness ({} mm) for CT and MR.",
                        t
                    ),
                },
            )),
            None => baseline.target.nodal.push(FieldConstraint::new(
                ConstraintField::ShortestDiameter,
                Constraint::GreaterThanOrEqualTo {
                    limit: 15.0,
                    message: "Nodal target lesions must be >= 15 mm short axis.".to_string(),
                },
            )),
        }

        if let Some(t) = thickness {
            baseline.target.extra_nodal.push(FieldConstraint::new(
                ConstraintField::LongestDiameter,
                Constraint::GreaterThanOrEqualTo {
                    limit: f64::max(10.0, 2.0 * t),
                    message: format!(
                        "Extranodal lesions must be >= 10 mm long axis AND >= double the \
                         acquisition slice thickness ({} mm) for CT and MR.",
                        t
                    ),
                },
            ));
        } else if is_chest_xray {
            baseline.target.extra_nodal.push(FieldConstraint::new(
                ConstraintField::LongestDiameter,
                Constraint::GreaterThanOrEqualTo {
                    limit: 20.0,
                    message: "Extranodal lesions must be >= 20 mm on chest X-ray.".to_string(),
                },
            ));
        } else {
            baseline.target.extra_nodal.push(FieldConstraint::new(
                ConstraintField::LongestDiameter,
                Constraint::GreaterThanOrEqualTo {
                    limit: 10.0,
                    message: "Extranodal target lesions must be >= 10 mm long axis.".to_string(),
                },
            ));
        }

        baseline.target.all.push(FieldConstraint::new(
            ConstraintField::Response,
            Constraint::ExclusionWithin {
                codes: qualitative_codes(),
                message: "Target lesions must have a length and cannot be marked as {value} \
                          at baseline."
                    .to_string(),
            },
        ));
        baseline.target.all.push(FieldConstraint::new(
            ConstraintField::TotalLesionBurden,
            Constraint::GreaterThanOrEqualTo {
                limit: self.policy.recist_min_total_burden,
                message: format!(
                    "Total lesion burden should be greater than or equal to {}.",
                    self.policy.recist_min_total_burden
                ),
            },
        ));

        baseline.non_target.all = present_only_constraints();

        baseline.per_organ.push(FieldConstraint::new(
            ConstraintField::NumberOfLesionsPerOrgan,
            Constraint::LessThanOrEqualTo {
                limit: 2.0,
                message: "A maximum of 2 target lesions per organ are allowed at Baseline."
                    .to_string(),
            },
        ));
        baseline.group.push(FieldConstraint::new(
            ConstraintField::TotalNumberOfLesions,
            Constraint::LessThanOrEqualTo {
                limit: 5.0,
                message: "A maximum of 5 target lesions total are allowed at Baseline.".to_string(),
            },
        ));

        CriteriaTree {
            criteria_type: CriteriaType::Recist,
            baseline,
            followup: PhaseCriteria::default(),
            all: PhaseCriteria::default(),
        }
    }

    /// irRC 标准
    ///
    /// 基线检查项：
    /// - 目标病灶双径均 >= 10 mm（且 >= 采集层厚）
    /// - 每器官至多 5 个目标病灶，总共至多 10 个
    /// - 非目标病灶只能评估为 Present
    /// - 目标病灶必须有测量值（不得评估为 CR / UN / NE / EX）
    ///
    /// 随访检查项：
    /// - 新发目标病灶双径均 >= 5 mm 且 >= 2 倍采集层厚
    /// - 每器官至多 5 个，总共至多 10 个
    fn irrc(&self, image: Option<&ImagingContext>) -> CriteriaTree {
        let thickness = image.and_then(|i| i.acquisition_slice_thickness);

        let mut baseline = PhaseCriteria::default();
        let mut followup = PhaseCriteria::default();
        let mut all = PhaseCriteria::default();

        let baseline_limit = thickness.map(|t| f64::max(10.0, t)).unwrap_or(10.0);
        for (field, axis) in [
            (ConstraintField::LongestDiameter, "long"),
            (ConstraintField::ShortestDiameter, "short"),
        ] {
            let message = match thickness {
                Some(t) => format!(
                    "Target lesions must be >= 10 mm {} axis AND >= the acquisition slice \
                     thickness ({} mm) for CT and MR.",
                    axis, t
                ),
                None => format!("Target lesions must be >= 10 mm {} axis.", axis),
            };
            baseline.target.all.push(FieldConstraint::new(
                field,
                Constraint::GreaterThanOrEqualTo {
                    limit: baseline_limit,
                    message,
                },
            ));
        }

        baseline.target.all.push(FieldConstraint::new(
            ConstraintField::Response,
            Constraint::ExclusionWithin {
                codes: qualitative_codes(),
                message: "Target lesions must have a length and cannot be marked as {value} \
                          at baseline."
                    .to_string(),
            },
        ));

        baseline.non_target.all = present_only_constraints();

        baseline.per_organ.push(FieldConstraint::new(
            ConstraintField::NumberOfLesionsPerOrgan,
            Constraint::LessThanOrEqualTo {
                limit: 5.0,
                message: "A maximum of 5 target lesions per organ are allowed at Baseline."
                    .to_string(),
            },
        ));
        baseline.group.push(FieldConstraint::new(
            ConstraintField::TotalNumberOfLesions,
            Constraint::LessThanOrEqualTo {
                limit: 10.0,
                message: "A maximum of 10 target lesions total are allowed at Baseline.".to_string(),
            },
        ));

        let new_lesion_limit = thickness.map(|t| f64::max(5.0, 2.0 * t)).unwrap_or(5.0);
        for (field, axis) in [
            (ConstraintField::LongestDiameter, "long"),
            (ConstraintField::ShortestDiameter, "short"),
        ] {
            let message = match thickness {
                Some(t) => format!(
                    "New target lesions must be >= 5 mm {} axis AND >= double the acquisition \
                     slice thickness ({} mm) for CT and MR.",
                    axis, t
                ),
                None => format!("New target lesions must be >= 5 mm {} axis.", axis),
            };
            followup.new_lesion_target.push(FieldConstraint::new(
                field,
                Constraint::GreaterThanOrEqualTo {
                    limit: new_lesion_limit,
                    message,
                },
            ));
        }

        followup.per_organ.push(FieldConstraint::new(
            ConstraintField::NumberOfLesionsPerOrgan,
            Constraint::LessThanOrEqualTo {
                limit: 5.0,
                message: "A maximum of 5 target lesions per organ are allowed at Followup."
                    .to_string(),
            },
        ));
        followup.group.push(FieldConstraint::new(
            ConstraintField::TotalNumberOfLesions,
            Constraint::LessThanOrEqualTo {
                limit: 10.0,
                message: "A maximum of 10 target lesions total are allowed at Followup.".to_string(),
            },
        ));

        all.group.push(FieldConstraint::new(
            ConstraintField::TotalLesionBurden,
            Constraint::GreaterThanOrEqualTo {
                limit: self.policy.irrc_min_total_burden,
                message: format!(
                    "Total lesion burden (SPD target lesions + SPD new lesions) should be \
                     greater than or equal to {}.",
                    self.policy.irrc_min_total_burden
                ),
            },
        ));

        CriteriaTree {
            criteria_type: CriteriaType::IrRc,
            baseline,
            followup,
            all,
        }
    }
}

impl Default for TrialCriteriaEngine {
    fn default() -> Self {
        Self::new(CriteriaPolicy::default())
    }
}

fn qualitative_codes() -> Vec<String> {
    ["CR", "UN", "NE", "EX"].iter().map(|c| c.to_string()).collect()
}

fn present_only_constraints() -> Vec<FieldConstraint> {
    let message = "Non-target lesions can only be assessed as 'Present' at Baseline".to_string();
    vec![
        FieldConstraint::new(
            ConstraintField::Response,
            Constraint::Presence {
                message: message.clone(),
            },
        ),
        FieldConstraint::new(
            ConstraintField::Response,
            Constraint::InclusionWithin {
                codes: vec!["Present".to_string()],
                message,
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use lesion_core::TimepointInfo;
    use lesion_metadata::{
        ImageRecord, InMemoryMetadataProvider, InMemoryTimepointDirectory, InstanceMetadata,
        SeriesMetadata, StudyMetadata,
    };

    fn limit_of(constraints: &[FieldConstraint], field: ConstraintField) -> f64 {
        constraints
            .iter()
            .find_map(|fc| match (&fc.constraint, fc.field == field) {
                (Constraint::GreaterThanOrEqualTo { limit, .. }, true) => Some(*limit),
                (Constraint::LessThanOrEqualTo { limit, .. }, true) => Some(*limit),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_unknown_criteria_name_is_fatal() {
        let engine = TrialCriteriaEngine::default();
        let result = engine.build_by_name("WHO", None);
        assert!(matches!(result, Err(TrackerError::UnknownCriteriaSet(_))));
    }

    #[test]
    fn test_recist_thresholds_with_slice_thickness() {
        let engine = TrialCriteriaEngine::default();
        let context = ImagingContext {
            acquisition_slice_thickness: Some(6.0),
            is_chest_xray: false,
        };
        let tree = engine.build_criteria(CriteriaType::Recist, Some(&context));

        // max(15, 12) = 15；max(10, 12) = 12
        assert_eq!(
            limit_of(&tree.baseline.target.nodal, ConstraintField::ShortestDiameter),
            15.0
        );
        assert_eq!(
            limit_of(&tree.baseline.target.extra_nodal, ConstraintField::LongestDiameter),
            12.0
        );
    }

    #[test]
    fn test_recist_thresholds_thick_slices() {
        let engine = TrialCriteriaEngine::default();
        let context = ImagingContext {
            acquisition_slice_thickness: Some(10.0),
            is_chest_xray: false,
        };
        let tree = engine.build_criteria(CriteriaType::Recist, Some(&context));

        assert_eq!(
            limit_of(&tree.baseline.target.nodal, ConstraintField::ShortestDiameter),
            20.0
        );
        assert_eq!(
            limit_of(&tree.baseline.target.extra_nodal, ConstraintField::LongestDiameter),
            20.0
        );
    }

    #[test]
    fn test_recist_flat_thresholds_without_thickness() {
        let engine = TrialCriteriaEngine::default();
        let tree = engine.build_criteria(CriteriaType::Recist, None);

        assert_eq!(
            limit_of(&tree.baseline.target.nodal, ConstraintField::ShortestDiameter),
            15.0
        );
        assert_eq!(
            limit_of(&tree.baseline.target.extra_nodal, ConstraintField::LongestDiameter),
            10.0
        );
        assert_eq!(
            limit_of(&tree.baseline.per_organ, ConstraintField::NumberOfLesionsPerOrgan),
            2.0
        );
        assert_eq!(
            limit_of(&tree.baseline.group, ConstraintField::TotalNumberOfLesions),
            5.0
        );
    }

    #[test]
    fn test_recist_chest_xray_threshold() {
        let engine = TrialCriteriaEngine::default();
        let context = ImagingContext {
            acquisition_slice_thickness: None,
            is_chest_xray: true,
        };
        let tree = engine.build_criteria(CriteriaType::Recist, Some(&context));

        assert_eq!(
            limit_of(&tree.baseline.target.extra_nodal, ConstraintField::LongestDiameter),
            20.0
        );
    }

    #[test]
    fn test_irrc_thresholds() {
        let engine = TrialCriteriaEngine::default();
        let context = ImagingContext {
            acquisition_slice_thickness: Some(6.0),
            is_chest_xray: false,
        };
        let tree = engine.build_criteria(CriteriaType::IrRc, Some(&context));

        // 基线双径：max(10, 6) = 10；新发病灶：max(5, 12) = 12
        assert_eq!(
            limit_of(&tree.baseline.target.all, ConstraintField::LongestDiameter),
            10.0
        );
        assert_eq!(
            limit_of(&tree.baseline.target.all, ConstraintField::ShortestDiameter),
            10.0
        );
        assert_eq!(
            limit_of(&tree.followup.new_lesion_target, ConstraintField::LongestDiameter),
            12.0
        );
        assert_eq!(
            limit_of(&tree.followup.per_organ, ConstraintField::NumberOfLesionsPerOrgan),
            5.0
        );
        assert_eq!(
            limit_of(&tree.all.group, ConstraintField::TotalLesionBurden),
            100.0
        );
    }

    #[test]
    fn test_policy_overrides_burden_threshold() {
        let engine = TrialCriteriaEngine::new(CriteriaPolicy {
            recist_min_total_burden: 7.0,
            irrc_min_total_burden: 250.0,
        });

        let recist = engine.build_criteria(CriteriaType::Recist, None);
        assert_eq!(
            limit_of(&recist.baseline.target.all, ConstraintField::TotalLesionBurden),
            7.0
        );

        let irrc = engine.build_criteria(CriteriaType::IrRc, None);
        assert_eq!(limit_of(&irrc.all.group, ConstraintField::TotalLesionBurden), 250.0);
    }

    fn registered_provider(modality: &str, thickness: Option<f64>) -> InMemoryMetadataProvider {
        let mut provider = InMemoryMetadataProvider::new();
        provider.register_image(
            "image-1",
            ImageRecord {
                series: SeriesMetadata {
                    series_instance_uid: "1.2.3.4".to_string(),
                    study_instance_uid: "1.2.3".to_string(),
                    modality: modality.to_string(),
                },
                instance: InstanceMetadata {
                    sop_instance_uid: "1.2.3.4.5".to_string(),
                    slice_thickness: thickness,
                },
                study: StudyMetadata {
                    study_instance_uid: "1.2.3".to_string(),
                    study_date: NaiveDate::from_ymd_opt(2016, 11, 20),
                    timepoint_id: Some("tp-baseline".to_string()),
                },
            },
        );
        provider
    }

    fn baseline_directory() -> InMemoryTimepointDirectory {
        let mut directory = InMemoryTimepointDirectory::new();
        directory.add_timepoint(TimepointInfo {
            timepoint_id: "tp-baseline".to_string(),
            timepoint_type: TimepointType::Baseline,
            latest_date: NaiveDate::from_ymd_opt(2016, 11, 20).unwrap(),
            patient_id: "patient-1".to_string(),
        });
        directory
    }

    #[test]
    fn test_criteria_for_image_resolves_thickness() {
        let engine = TrialCriteriaEngine::default();
        let provider = registered_provider("CT", Some(6.0));
        let directory = baseline_directory();

        let resolved = engine
            .criteria_for_image("RECIST", "image-1", &provider, &directory)
            .unwrap()
            .unwrap();

        assert_eq!(resolved.timepoint_type, TimepointType::Baseline);
        assert_eq!(resolved.context.acquisition_slice_thickness, Some(6.0));
        assert_eq!(
            limit_of(
                &resolved.tree.baseline.target.extra_nodal,
                ConstraintField::LongestDiameter
            ),
            12.0
        );
    }

    #[test]
    fn test_criteria_for_image_ignores_thickness_outside_ct_mr() {
        let engine = TrialCriteriaEngine::default();
        let provider = registered_provider("US", Some(6.0));
        let directory = baseline_directory();

        let resolved = engine
            .criteria_for_image("RECIST", "image-1", &provider, &directory)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.context.acquisition_slice_thickness, None);
    }

    #[test]
    fn test_criteria_for_image_fails_closed_on_missing_metadata() {
        let engine = TrialCriteriaEngine::default();
        let provider = InMemoryMetadataProvider::new();
        let directory = baseline_directory();

        // 未注册的图像：没有可用元数据，必须返回空而不是默认阈值
        let resolved = engine
            .criteria_for_image("RECIST", "image-unknown", &provider, &directory)
            .unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn test_criteria_for_image_fails_closed_on_missing_timepoint() {
        let engine = TrialCriteriaEngine::default();
        let provider = registered_provider("CT", Some(6.0));
        let directory = InMemoryTimepointDirectory::new();

        let resolved = engine
            .criteria_for_image("RECIST", "image-1", &provider, &directory)
            .unwrap();
        assert!(resolved.is_none());
    }
}
