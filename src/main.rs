use std::process::ExitCode;

use clap::Arg;
use fleet::common::{run_cli, worker_args};

#[tokio::main]
async fn main() -> ExitCode {
    let mut custom_args = vec![Arg::new("mode")
        .short('m')
        .long("mode")
        .value_name("MODE")
        .help("运行模式")
        .value_parser(["worker", "server"])
        .default_value("worker")];
    custom_args.extend(worker_args());

    run_cli(
        "fleet",
        "计算集群能力发现与轮询Worker系统",
        custom_args,
        None,
    )
    .await
}
