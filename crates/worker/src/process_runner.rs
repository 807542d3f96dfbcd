use std::collections::BTreeSet;
use std::process::Stdio;

use async_trait::async_trait;
use fleet_core::config::WorkerConfig;
use fleet_core::{FleetError, Result, TaskRunner};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// 通过外部程序执行任务的 [`TaskRunner`]
///
/// - `<command> <args..> list-task-types`：每行输出一个已注册的任务类型
/// - `<command> <args..> run-once --task-types a,b`：退出码 0 表示处理了一个任务，
///   `no_job_exit_code` 表示当前没有任务，其他退出码视为执行失败
pub struct ProcessTaskRunner {
    command: String,
    args: Vec<String>,
    no_job_exit_code: i32,
}

impl ProcessTaskRunner {
    pub fn new(command: impl Into<String>, args: Vec<String>, no_job_exit_code: i32) -> Self {
        Self {
            command: command.into(),
            args,
            no_job_exit_code,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(
            config.runner_command.clone(),
            config.runner_args.clone(),
            config.no_job_exit_code,
        )
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        cmd.arg(subcommand);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl TaskRunner for ProcessTaskRunner {
    async fn supported_task_types(&self) -> Result<BTreeSet<String>> {
        let output = self
            .command("list-task-types")
            .output()
            .await
            .map_err(|e| {
                FleetError::TaskExecution(format!("启动任务执行程序失败 {}: {e}", self.command))
            })?;

        if !output.status.success() {
            return Err(FleetError::TaskExecution(format!(
                "列出任务类型失败，退出码: {:?}, stderr: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let task_types: BTreeSet<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        info!("Task runner {} reports task types: {:?}", self.command, task_types);
        Ok(task_types)
    }

    async fn run_once(&self, task_types: &BTreeSet<String>) -> Result<bool> {
        let joined = task_types.iter().cloned().collect::<Vec<_>>().join(",");
        debug!("Running {} run-once --task-types {}", self.command, joined);

        let mut cmd = self.command("run-once");
        cmd.arg("--task-types").arg(&joined);
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        let status = cmd.status().await.map_err(|e| {
            FleetError::TaskExecution(format!("启动任务执行程序失败 {}: {e}", self.command))
        })?;

        match status.code() {
            Some(0) => Ok(true),
            Some(code) if code == self.no_job_exit_code => Ok(false),
            Some(code) => Err(FleetError::TaskExecution(format!(
                "任务执行失败，退出码: {code}"
            ))),
            None => {
                warn!("Task runner {} terminated by signal", self.command);
                Err(FleetError::TaskExecution(
                    "任务执行程序被信号终止".to_string(),
                ))
            }
        }
    }
}
