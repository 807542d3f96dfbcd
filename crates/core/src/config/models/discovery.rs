use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 能力发现配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub topic_prefix: String,
    pub heartbeat_interval_seconds: u64,
    pub ready_timeout_seconds: u64,
    /// 单次广播（发布、清理、断开）的最长等待时间，超时视为失败
    pub publish_timeout_seconds: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            topic_prefix: "fleet/workers".to_string(),
            heartbeat_interval_seconds: 30,
            ready_timeout_seconds: 5,
            publish_timeout_seconds: 5,
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let prefix = self.topic_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return Err(anyhow::anyhow!("能力广播主题前缀不能为空"));
        }

        if prefix.contains('+') || prefix.contains('#') {
            return Err(anyhow::anyhow!(
                "能力广播主题前缀不能包含通配符: {}",
                self.topic_prefix
            ));
        }

        if self.heartbeat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }

        if self.publish_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("广播超时时间必须大于0"));
        }

        Ok(())
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_seconds)
    }
}
