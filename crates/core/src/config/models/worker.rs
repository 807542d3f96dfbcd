use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 为空时根据主机名自动生成
    pub worker_id: String,
    /// 为空表示执行所有可用的任务类型
    pub supported_task_types: Vec<String>,
    pub poll_interval_ms: u64,
    pub runner_command: String,
    pub runner_args: Vec<String>,
    pub no_job_exit_code: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: String::new(),
            supported_task_types: Vec::new(),
            poll_interval_ms: 1000,
            runner_command: "fleet-task-runner".to_string(),
            runner_args: Vec::new(),
            no_job_exit_code: 100,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.contains('/') || self.worker_id.contains('+') || self.worker_id.contains('#')
        {
            return Err(anyhow::anyhow!(
                "Worker ID不能包含主题分隔符或通配符: {}",
                self.worker_id
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("任务轮询间隔必须大于0"));
        }

        if self.runner_command.is_empty() {
            return Err(anyhow::anyhow!("任务执行程序不能为空"));
        }

        if self.no_job_exit_code == 0 {
            return Err(anyhow::anyhow!("无任务退出码不能为0（0表示任务已处理）"));
        }

        Ok(())
    }

    /// 配置的worker_id，未配置时生成 `<hostname>-<8位随机>`
    pub fn resolved_worker_id(&self) -> String {
        if !self.worker_id.is_empty() {
            return self.worker_id.clone();
        }

        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "worker".to_string());
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", host.replace(['/', '+', '#'], "_"), &suffix[..8])
    }

    /// 请求的任务类型过滤器，`None` 表示不过滤
    pub fn requested_task_types(&self) -> Option<BTreeSet<String>> {
        let requested: BTreeSet<String> = self
            .supported_task_types
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        if requested.is_empty() {
            None
        } else {
            Some(requested)
        }
    }
}
