use std::process::ExitCode;

use fleet::app::AppMode;
use fleet::common::run_cli;

#[tokio::main]
async fn main() -> ExitCode {
    run_cli(
        "fleet-server",
        "计算集群 - 能力聚合服务：汇总Worker广播并提供只读HTTP接口",
        Vec::new(),
        Some(AppMode::Server),
    )
    .await
}
