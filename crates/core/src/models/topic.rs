//! 能力广播主题命名：`<prefix>/<worker_id>`，聚合端订阅 `<prefix>/+`

pub fn worker_topic(prefix: &str, worker_id: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), worker_id)
}

pub fn wildcard_topic(prefix: &str) -> String {
    worker_topic(prefix, "+")
}

/// 从主题的最后一段提取worker_id
///
/// 段数少于 `prefix` 段数加一、或最后一段为空的主题视为格式错误。
pub fn worker_id_from_topic<'a>(prefix: &str, topic: &'a str) -> Option<&'a str> {
    let prefix_segments = prefix.trim_end_matches('/').split('/').count();
    let segments: Vec<&str> = topic.split('/').collect();
    if segments.len() < prefix_segments + 1 {
        return None;
    }
    segments.last().copied().filter(|id| !id.is_empty())
}

/// MQTT风格的主题过滤匹配，支持 `+`（单层）和 `#`（多层，仅末尾）
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
