use thiserror::Error;

/// 强制退出（第二次关闭信号）时使用的进程退出码
pub const FORCED_EXIT_CODE: i32 = 130;

/// 集群能力发现与Worker运行时的错误类型定义
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("消息传输不可用: {0}")]
    TransportUnavailable(String),

    #[error("消息传输错误: {0}")]
    Transport(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error(
        "No compute plugins found: the task-execution component registered no task types \
         (requested: {requested:?})"
    )]
    NoPluginsAvailable { requested: Vec<String> },

    #[error("No matching plugins found. Requested: {requested:?}, Available: {available:?}")]
    NoMatchingPlugins {
        requested: Vec<String>,
        available: Vec<String>,
    },

    #[error("No task types specified and no plugins available")]
    NoTaskTypes,

    #[error("收到第二次关闭信号，强制退出")]
    ForcedShutdown,
}

impl FleetError {
    /// 启动阶段的任务类型解析失败（致命错误）
    pub fn is_startup_resolution(&self) -> bool {
        matches!(
            self,
            FleetError::NoPluginsAvailable { .. }
                | FleetError::NoMatchingPlugins { .. }
                | FleetError::NoTaskTypes
        )
    }

    /// 进程应使用的退出码
    pub fn exit_code(&self) -> i32 {
        match self {
            FleetError::ForcedShutdown => FORCED_EXIT_CODE,
            _ => 1,
        }
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_errors_are_distinct() {
        let no_plugins = FleetError::NoPluginsAvailable {
            requested: vec!["resize".to_string()],
        };
        let no_match = FleetError::NoMatchingPlugins {
            requested: vec!["x".to_string()],
            available: vec!["a".to_string(), "b".to_string()],
        };

        assert!(no_plugins.to_string().contains("No compute plugins found"));
        assert!(no_match.to_string().contains("No matching plugins found"));
        assert!(FleetError::NoTaskTypes
            .to_string()
            .contains("No task types specified"));

        assert!(no_plugins.is_startup_resolution());
        assert!(no_match.is_startup_resolution());
        assert!(!FleetError::Transport("down".to_string()).is_startup_resolution());
    }

    #[test]
    fn test_forced_shutdown_exit_code() {
        assert_eq!(FleetError::ForcedShutdown.exit_code(), FORCED_EXIT_CODE);
        assert_eq!(FleetError::NoTaskTypes.exit_code(), 1);
    }
}
