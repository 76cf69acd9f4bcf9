//! 病灶编号分配
//!
//! 编号在 (目标分区, 时间点) 内唯一。分配时优先复用在该时间点
//! 空缺的已有编号，保证编号密集；全部被占用时才追加新号。

use crate::store::MeasurementStore;
use uuid::Uuid;

/// 计算指定时间点与分区的下一个病灶编号
///
/// 按编号升序扫描该分区的存活记录，第一条在该时间点没有数据的
/// 记录让出它自己的编号；全部占用则返回 记录数 + 1。空分区从 1
/// 开始，永不返回 0。
pub fn next_lesion_number(store: &MeasurementStore, timepoint_id: &str, is_target: bool) -> u32 {
    let existing = store.all_by_target(is_target);
    if existing.is_empty() {
        return 1;
    }

    for measurement in &existing {
        if !measurement.has_timepoint(timepoint_id) {
            return measurement.lesion_number;
        }
    }

    existing.len() as u32 + 1
}

/// 查找同编号病灶在其他时间点已登记的部位
///
/// 同一病灶在新时间点补录测量时，部位必须沿用首次登记的值；
/// 返回已有记录的部位ID供界面锁定选择。
pub fn existing_location_for_number(
    store: &MeasurementStore,
    lesion_number: u32,
    is_target: bool,
) -> Option<Uuid> {
    store
        .find_by_lesion_number(lesion_number, is_target)
        .and_then(|m| m.location_id)
}
