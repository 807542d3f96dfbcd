use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Worker能力广播消息
///
/// 每次发布都是完整快照，消费端整体替换而不是合并。线上格式为
/// `{"id": ..., "capabilities": [...], "idle_count": 0|1, "timestamp": ms}`，
/// `idle_count` 保持整数以兼容已有的生产者。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityMessage {
    #[serde(rename = "id")]
    pub worker_id: String,
    #[serde(rename = "capabilities")]
    pub task_types: BTreeSet<String>,
    #[serde(rename = "idle_count", with = "idle_flag")]
    pub idle: bool,
    /// 发布时刻（毫秒时间戳），仅用于诊断
    pub timestamp: i64,
}

impl CapabilityMessage {
    pub fn new(
        worker_id: impl Into<String>,
        task_types: BTreeSet<String>,
        idle: bool,
        timestamp: i64,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            task_types,
            idle,
            timestamp,
        }
    }

    /// 空载荷表示Worker已离线（遗嘱消息或主动清理）
    pub fn is_absence_payload(payload: &[u8]) -> bool {
        payload.iter().all(|b| b.is_ascii_whitespace())
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn idle_count(&self) -> u32 {
        u32::from(self.idle)
    }
}

/// `idle_count` 在线上是整数；任何非零值都视为空闲
mod idle_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(idle: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(u8::from(*idle))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let count = i64::deserialize(deserializer)?;
        Ok(count != 0)
    }
}
