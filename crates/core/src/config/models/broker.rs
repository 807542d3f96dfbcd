use serde::{Deserialize, Serialize};

/// 传输后端类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    #[default]
    Mqtt,
    /// 不连接任何broker，能力发现以降级模式运行
    Disabled,
}

/// Broker连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    #[serde(rename = "type")]
    pub r#type: TransportType,
    pub host: String,
    pub port: u16,
    pub keep_alive_seconds: u64,
    pub connection_timeout_seconds: u64,
    pub client_id_prefix: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            r#type: TransportType::Mqtt,
            host: "localhost".to_string(),
            port: 1883,
            keep_alive_seconds: 30,
            connection_timeout_seconds: 5,
            client_id_prefix: "fleet".to_string(),
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.r#type == TransportType::Disabled {
            return Ok(());
        }

        if self.host.is_empty() {
            return Err(anyhow::anyhow!("Broker主机地址不能为空"));
        }

        if self.port == 0 {
            return Err(anyhow::anyhow!("Broker端口必须大于0"));
        }

        if self.keep_alive_seconds == 0 {
            return Err(anyhow::anyhow!("Broker心跳保活时间必须大于0"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Broker连接超时时间必须大于0"));
        }

        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
