use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::Result;

/// 外部任务执行组件
///
/// 负责任务的选择、执行和持久化；Worker只关心它支持哪些任务类型，
/// 以及每轮是否真正处理了一个任务。
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// 已注册（可执行）的任务类型
    async fn supported_task_types(&self) -> Result<BTreeSet<String>>;

    /// 认领并执行一个限定在 `task_types` 内的任务
    ///
    /// 返回 `Ok(true)` 表示处理了一个任务，`Ok(false)` 表示当前没有可用任务。
    async fn run_once(&self, task_types: &BTreeSet<String>) -> Result<bool>;
}
