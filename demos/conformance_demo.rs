//! 试验标准合规检查演示程序
//!
//! 展示 RECIST 1.1 / irRC 约束树的构建、阈值随采集层厚的变化，
//! 以及测量数据的合规验证与总负荷计算

use chrono::NaiveDate;
use lesion_core::{Handle, Measurement, MeasurementValues, TimepointEntry, TimepointInfo, TimepointType, ToolType};
use lesion_metadata::InMemoryTimepointDirectory;
use lesion_tracking::{
    assess_group, calculate_total_lesion_burden, validate_measurement, CriteriaPolicy,
    CriteriaType, ImagingContext, MeasurementStore, TrialCriteriaEngine,
};
use std::collections::HashMap;
use uuid::Uuid;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🚀 试验标准合规检查演示\n");

    let engine = TrialCriteriaEngine::new(CriteriaPolicy::default());

    // 1. 阈值随层厚变化
    for thickness in [None, Some(5.0), Some(8.0)] {
        let context = thickness.map(|t| ImagingContext {
            acquisition_slice_thickness: Some(t),
            is_chest_xray: false,
        });
        let tree = engine.build_criteria(CriteriaType::Recist, context.as_ref());
        println!(
            "📐 RECIST 层厚 {:?}: 淋巴结短径 >= {:?} mm，非淋巴结长径 >= {:?} mm",
            thickness,
            first_limit(&tree.baseline.target.nodal),
            first_limit(&tree.baseline.target.extra_nodal)
        );
    }

    // 2. 未注册标准名称是配置错误
    if let Err(error) = engine.build_by_name("WHO", None) {
        println!("⛔ 未注册标准: {}", error);
    }

    // 3. 验证测量数据
    let mut timepoints = InMemoryTimepointDirectory::new();
    timepoints.add_timepoint(TimepointInfo {
        timepoint_id: "tp-baseline".to_string(),
        timepoint_type: TimepointType::Baseline,
        latest_date: NaiveDate::from_ymd_opt(2016, 11, 20).unwrap(),
        patient_id: "patient-1".to_string(),
    });

    let mut store = MeasurementStore::new();
    store.insert(lesion(1, "20", "10", false, "Lung"));
    store.insert(lesion(2, "8", "18", true, "Mediastinum"));
    store.insert(lesion(3, "7", "4", false, "Liver"));

    let context = ImagingContext {
        acquisition_slice_thickness: Some(6.0),
        is_chest_xray: false,
    };
    let tree = engine.build_criteria(CriteriaType::Recist, Some(&context));

    println!("\n🔍 基线合规检查:");
    for measurement in store.all() {
        let errors = validate_measurement(measurement, "tp-baseline", &tree.baseline, false);
        for error in &errors {
            println!("   ⚠️ {}: {}", error.prefix, error.message);
        }
        if errors.is_empty() {
            println!("   ✅ Target {} 合规", measurement.lesion_number);
        }
    }

    let group_errors = assess_group(&store, "tp-baseline", &tree, TimepointType::Baseline, &timepoints);
    println!("   组级发现 {} 条", group_errors.len());

    // 4. 总负荷计算
    let recist_burden =
        calculate_total_lesion_burden(CriteriaType::Recist, &store, "tp-baseline", &timepoints);
    let irrc_burden =
        calculate_total_lesion_burden(CriteriaType::IrRc, &store, "tp-baseline", &timepoints);
    println!("\n📊 总病灶负荷: RECIST = {} mm, irRC (SPD) = {} mm²", recist_burden, irrc_burden);

    println!("\n✅ 演示完成");
    Ok(())
}

fn first_limit(constraints: &[lesion_tracking::FieldConstraint]) -> Option<f64> {
    constraints.iter().find_map(|fc| match &fc.constraint {
        lesion_tracking::Constraint::GreaterThanOrEqualTo { limit, .. } => Some(*limit),
        _ => None,
    })
}

fn lesion(number: u32, longest: &str, shortest: &str, nodal: bool, organ: &str) -> Measurement {
    let mut timepoints = HashMap::new();
    timepoints.insert(
        "tp-baseline".to_string(),
        TimepointEntry {
            timepoint_id: "tp-baseline".to_string(),
            study_instance_uid: "1.2.3".to_string(),
            series_instance_uid: "1.2.3.4".to_string(),
            sop_instance_uid: "1.2.3.4.5".to_string(),
            image_id: "image-baseline".to_string(),
            handles: vec![Handle::new(0.0, 0.0), Handle::new(30.0, 20.0)],
            values: MeasurementValues::Bidirectional {
                longest_diameter: longest.to_string(),
                shortest_diameter: shortest.to_string(),
            },
        },
    );
    Measurement {
        id: Uuid::new_v4(),
        lesion_number: number,
        is_target: true,
        tool_type: ToolType::Bidirectional,
        location: Some(organ.to_string()),
        location_id: None,
        is_nodal: nodal,
        patient_id: "patient-1".to_string(),
        client_id: "demo".to_string(),
        lesion_number_absolute: number as u64,
        timepoints,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    }
}
