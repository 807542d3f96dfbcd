use std::collections::BTreeSet;

use fleet_core::{FleetError, FleetResult};
use tracing::info;

/// 计算本Worker实际执行的任务类型：`available ∩ requested`
///
/// 未指定 `requested` 时使用全部可用类型。结果为空时按原因返回三种不同的错误。
pub fn resolve_active_task_types(
    available: &BTreeSet<String>,
    requested: Option<&BTreeSet<String>>,
) -> FleetResult<BTreeSet<String>> {
    let requested_types = requested.cloned().unwrap_or_else(|| available.clone());
    let active: BTreeSet<String> = available.intersection(&requested_types).cloned().collect();

    info!("Requested tasks: {:?}", requested_types);
    info!("Available plugins: {:?}", available);
    info!("Active tasks: {:?}", active);

    if !active.is_empty() {
        return Ok(active);
    }

    match (requested_types.is_empty(), available.is_empty()) {
        (false, true) => Err(FleetError::NoPluginsAvailable {
            requested: requested_types.into_iter().collect(),
        }),
        (false, false) => Err(FleetError::NoMatchingPlugins {
            requested: requested_types.into_iter().collect(),
            available: available.iter().cloned().collect(),
        }),
        _ => Err(FleetError::NoTaskTypes),
    }
}
