use std::process::ExitCode;

use fleet::app::AppMode;
use fleet::common::{run_cli, worker_args};

#[tokio::main]
async fn main() -> ExitCode {
    run_cli(
        "fleet-worker",
        "计算集群 - Worker服务：轮询执行任务并广播本机能力",
        worker_args(),
        Some(AppMode::Worker),
    )
    .await
}
