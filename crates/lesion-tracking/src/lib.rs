//! # 病灶追踪模块
//!
//! 提供肿瘤病灶测量的纵向追踪与试验标准验证功能，包括：
//! - 测量仓库与标注存储：持久记录与屏上状态的双表示
//! - 双向同步引擎：标注编辑持久化与记录回填，带回路防护
//! - 病灶编号分配：时间点内密集复用的编号规则
//! - 分类转换状态机：目标 / 非目标 / CR / EX / UN 之间的转换
//! - 试验标准引擎：RECIST 1.1 与 irRC 的声明式约束与合规验证
//! - 激活导航：病灶列表选中后的面板定位与标注高亮

pub mod config;
pub mod conversion;
pub mod criteria;
pub mod engine;
pub mod export;
pub mod navigation;
pub mod numbering;
pub mod store;
pub mod sync;
pub mod validation;

// 重新导出主要类型
pub use config::{CriteriaPolicy, TrackingConfig};
pub use conversion::{ConversionStateMachine, LesionClass};
pub use criteria::{
    Constraint, ConstraintField, CriteriaTree, CriteriaType, FieldConstraint, ImagingContext,
    PhaseCriteria, ResolvedCriteria, TrialCriteriaEngine,
};
pub use engine::{LesionTrackingEngine, MeasurementUpdate};
pub use export::{exported_measurements, ExportedMeasurement};
pub use navigation::ActivationNavigator;
pub use numbering::{existing_location_for_number, next_lesion_number};
pub use store::{
    MeasurementEvent, MeasurementEventKind, MeasurementStore, OverlayStateStore, TimepointRemoval,
};
pub use sync::{CommitOutcome, SyncEngine};
pub use validation::{
    assess_group, calculate_total_lesion_burden, is_new_lesion_at, validate_measurement,
    ConformanceError, ConformanceKind,
};
