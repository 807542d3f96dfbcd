use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use fleet_core::{init_logging, AppConfig, FleetError, ShutdownSignal, SignalListener};
use tracing::{error, info};

use crate::app::{AppMode, Application};

/// 命令行中可覆盖配置文件的启动参数
#[derive(Debug, Clone, Default)]
pub struct StartupConfig {
    pub config_path: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub worker_id: Option<String>,
    pub tasks: Option<Vec<String>>,
}

impl StartupConfig {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let get = |id: &str| {
            matches
                .try_get_one::<String>(id)
                .ok()
                .flatten()
                .cloned()
        };

        Self {
            config_path: get("config"),
            log_level: get("log-level"),
            log_format: get("log-format"),
            worker_id: get("worker-id"),
            tasks: get("tasks").map(|tasks| parse_task_list(&tasks)),
        }
    }
}

/// 逗号分隔的任务类型列表，忽略空项
pub fn parse_task_list(tasks: &str) -> Vec<String> {
    tasks
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// 加载配置并应用命令行覆盖
pub fn load_config(startup_config: &StartupConfig) -> Result<AppConfig> {
    let mut config = AppConfig::load(startup_config.config_path.as_deref())
        .context("加载配置失败")?;

    if let Some(worker_id) = &startup_config.worker_id {
        config.worker.worker_id = worker_id.clone();
    }
    if let Some(tasks) = &startup_config.tasks {
        config.worker.supported_task_types = tasks.clone();
    }
    if let Some(level) = &startup_config.log_level {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = &startup_config.log_format {
        config.observability.log_format = format.clone();
    }

    config.validate()?;
    Ok(config)
}

/// 所有二进制共享的通用参数
pub fn common_args() -> Vec<Arg> {
    vec![
        Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("配置文件路径（默认查找 config/fleet.toml）"),
        Arg::new("log-level")
            .short('l')
            .long("log-level")
            .value_name("LEVEL")
            .help("日志级别")
            .value_parser(["trace", "debug", "info", "warn", "error"]),
        Arg::new("log-format")
            .long("log-format")
            .value_name("FORMAT")
            .help("日志格式")
            .value_parser(["json", "pretty"]),
    ]
}

/// Worker模式特有参数
pub fn worker_args() -> Vec<Arg> {
    vec![
        Arg::new("worker-id")
            .short('w')
            .long("worker-id")
            .value_name("ID")
            .help("Worker唯一标识（默认根据主机名生成）"),
        Arg::new("tasks")
            .short('t')
            .long("tasks")
            .value_name("TYPES")
            .help("逗号分隔的任务类型过滤器（默认执行所有可用类型）"),
    ]
}

/// 解析命令行、初始化日志、加载配置并运行应用，返回进程退出码
pub async fn run_cli(
    name: &'static str,
    about: &'static str,
    custom_args: Vec<Arg>,
    mode: Option<AppMode>,
) -> ExitCode {
    let command = Command::new(name)
        .version(env!("CARGO_PKG_VERSION"))
        .about(about)
        .args(common_args())
        .args(custom_args);
    let matches = command.get_matches();

    match run(&matches, mode).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<FleetError>()
                .map(FleetError::exit_code)
                .unwrap_or(1);
            error!("{name} 退出: {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(matches: &ArgMatches, mode: Option<AppMode>) -> Result<()> {
    let startup_config = StartupConfig::from_matches(matches);
    let config = load_config(&startup_config)?;
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;

    let mode = match mode {
        Some(mode) => mode,
        None => {
            let mode = matches
                .try_get_one::<String>("mode")
                .ok()
                .flatten()
                .map(String::as_str)
                .unwrap_or("worker");
            AppMode::parse(mode)?
        }
    };

    info!("启动集群能力发现系统，模式: {:?}", mode);
    if let Some(path) = &startup_config.config_path {
        info!("配置文件: {}", path);
    }

    let shutdown = ShutdownSignal::new();
    let signals = SignalListener::install().context("安装信号处理器失败")?;
    let listener = tokio::spawn(signals.run(shutdown.clone()));

    let app = Application::new(config, mode);
    let result = app.run(shutdown).await;
    listener.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_task_list() {
        assert_eq!(
            parse_task_list("resize, convert,,ocr "),
            vec!["resize", "convert", "ocr"]
        );
        assert!(parse_task_list(" , ").is_empty());
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [worker]
            worker_id = "from-file"
            supported_task_types = ["a"]
            "#
        )
        .unwrap();

        let command = Command::new("fleet-worker")
            .args(common_args())
            .args(worker_args());
        let matches = command
            .try_get_matches_from([
                "fleet-worker",
                "--config",
                file.path().to_str().unwrap(),
                "--worker-id",
                "cli-01",
                "--tasks",
                "b,c",
                "--log-format",
                "json",
            ])
            .unwrap();

        let config = load_config(&StartupConfig::from_matches(&matches)).unwrap();
        assert_eq!(config.worker.worker_id, "cli-01");
        assert_eq!(config.worker.supported_task_types, vec!["b", "c"]);
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_server_args_have_no_worker_flags() {
        let command = Command::new("fleet-server").args(common_args());
        let matches = command.try_get_matches_from(["fleet-server"]).unwrap();
        let startup = StartupConfig::from_matches(&matches);
        assert!(startup.worker_id.is_none());
        assert!(startup.tasks.is_none());
    }
}
