//! 病灶追踪引擎演示程序
//!
//! 展示追踪引擎的核心功能，包括标注提交、编号分配、分类转换、
//! 事件回填与病灶激活

use chrono::NaiveDate;
use lesion_core::utils::generate_dicom_uid;
use lesion_core::{Handle, MeasurementValues, OverlayEntry, TimepointInfo, TimepointType, ToolType};
use lesion_metadata::{
    ImageRecord, InMemoryLocationLookup, InMemoryMetadataProvider, InMemoryTimepointDirectory,
    InstanceMetadata, ScriptedDisplaySurfaces, SeriesMetadata, StudyMetadata,
};
use lesion_tracking::{LesionTrackingEngine, TrackingConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🚀 病灶追踪引擎演示\n");

    // 1. 准备外部协作系统
    let baseline_study = generate_dicom_uid();
    let followup_study = generate_dicom_uid();
    let mut metadata = InMemoryMetadataProvider::new();
    register_image(&mut metadata, "image-baseline", &baseline_study, "tp-baseline");
    register_image(&mut metadata, "image-followup", &followup_study, "tp-followup");

    let mut locations = InMemoryLocationLookup::new();
    let lung = locations.add_location("Lung", false);
    let mediastinum = locations.add_location("Mediastinum", true);

    let mut timepoints = InMemoryTimepointDirectory::new();
    timepoints.add_timepoint(TimepointInfo {
        timepoint_id: "tp-baseline".to_string(),
        timepoint_type: TimepointType::Baseline,
        latest_date: NaiveDate::from_ymd_opt(2016, 11, 20).unwrap(),
        patient_id: "patient-1".to_string(),
    });
    timepoints.add_timepoint(TimepointInfo {
        timepoint_id: "tp-followup".to_string(),
        timepoint_type: TimepointType::Followup,
        latest_date: NaiveDate::from_ymd_opt(2017, 3, 1).unwrap(),
        patient_id: "patient-1".to_string(),
    });
    println!("✅ 元数据、部位与时间点目录就绪");

    // 2. 创建追踪引擎
    let mut engine = LesionTrackingEngine::new(
        TrackingConfig::default(),
        Arc::new(metadata),
        Arc::new(locations),
        Arc::new(timepoints),
    );

    // 3. 提交基线标注
    let first = annotation(
        "image-baseline",
        &baseline_study,
        "tp-baseline",
        engine.next_lesion_number("tp-baseline", true),
        Some(lung),
        "32",
        "18",
    );
    let update = engine.handle_measurement_added(&first)?;
    let first_id = update.outcome.measurement_id();
    engine.hydrate_lesion(first_id, "tp-baseline");
    println!(
        "📋 病灶 1 提交: {:?}，合规发现 {} 条",
        update.outcome,
        update.conformance.len()
    );

    let second = annotation(
        "image-baseline",
        &baseline_study,
        "tp-baseline",
        engine.next_lesion_number("tp-baseline", true),
        Some(mediastinum),
        "22",
        "16",
    );
    let update = engine.handle_measurement_added(&second)?;
    let second_id = update.outcome.measurement_id();
    engine.hydrate_lesion(second_id, "tp-baseline");
    println!(
        "📋 病灶 2 提交: {:?}，合规发现 {} 条",
        update.outcome,
        update.conformance.len()
    );

    // 4. 幂等性：重复提交不产生写入
    let repeat = engine.handle_measurement_modified(&OverlayEntry {
        id: Some(first_id),
        ..first.clone()
    })?;
    println!("🔁 重复提交: {:?}（深度相等短路）", repeat.outcome);

    // 5. 分类转换：病灶 2 转为非目标
    if let Some(converted) = engine.convert_to_non_target(second_id, "tp-baseline") {
        let measurement = engine.measurements().get(&converted).unwrap();
        println!(
            "🔄 病灶 2 已转换: 新编号 {}，响应 {:?}",
            measurement.lesion_number,
            measurement
                .timepoint("tp-baseline")
                .and_then(|e| e.values.response())
        );
    }

    // 6. 激活病灶：两个显示面板
    let mut surfaces = ScriptedDisplaySurfaces::new(2);
    let activated = engine.activate_lesion(&mut surfaces, first_id).await;
    println!("🎯 病灶 1 激活: {} 个面板高亮", activated);

    // 7. 导出
    let exported = engine.exported_measurements();
    println!("\n📊 导出测量 {} 条:", exported.len());
    for item in &exported {
        println!(
            "   - 病灶 {} ({}): {:?}",
            item.lesion_number,
            item.tool_type,
            item.measured_value.as_deref().unwrap_or("-")
        );
    }

    println!("\n✅ 演示完成");
    Ok(())
}

fn register_image(
    metadata: &mut InMemoryMetadataProvider,
    image_id: &str,
    study_uid: &str,
    timepoint_id: &str,
) {
    metadata.register_image(
        image_id,
        ImageRecord {
            series: SeriesMetadata {
                series_instance_uid: format!("{}.4", study_uid),
                study_instance_uid: study_uid.to_string(),
                modality: "CT".to_string(),
            },
            instance: InstanceMetadata {
                sop_instance_uid: format!("{}.4.5", study_uid),
                slice_thickness: Some(5.0),
            },
            study: StudyMetadata {
                study_instance_uid: study_uid.to_string(),
                study_date: NaiveDate::from_ymd_opt(2016, 11, 20),
                timepoint_id: Some(timepoint_id.to_string()),
            },
        },
    );
}

#[allow(clippy::too_many_arguments)]
fn annotation(
    image_id: &str,
    study_uid: &str,
    timepoint_id: &str,
    lesion_number: u32,
    location_id: Option<uuid::Uuid>,
    longest: &str,
    shortest: &str,
) -> OverlayEntry {
    OverlayEntry {
        id: None,
        image_id: image_id.to_string(),
        tool_type: ToolType::Bidirectional,
        lesion_number,
        is_target: true,
        location: None,
        location_id,
        is_nodal: false,
        patient_id: "patient-1".to_string(),
        timepoint_id: timepoint_id.to_string(),
        study_instance_uid: study_uid.to_string(),
        series_instance_uid: format!("{}.4", study_uid),
        sop_instance_uid: format!("{}.4.5", study_uid),
        handles: vec![Handle::new(100.0, 120.0), Handle::new(150.0, 160.0)],
        values: MeasurementValues::Bidirectional {
            longest_diameter: longest.to_string(),
            shortest_diameter: shortest.to_string(),
        },
        measurement_text: String::new(),
        label: String::new(),
        active: false,
        visible: true,
        is_deleted: false,
    }
}
