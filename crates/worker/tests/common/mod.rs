#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::{
    CapabilityMessage, FleetError, FleetResult, LastWill, MessageHandler, PubSubTransport,
    ShutdownSignal, TaskRunner, TransportConnector,
};
use tokio::sync::Notify;

/// 传输调用和任务执行按发生顺序记录在同一条时间线上
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Connected { will: Option<LastWill> },
    Publish { topic: String, payload: Vec<u8>, retain: bool },
    Disconnect,
    Abort,
    JobStarted,
    JobFinished,
}

impl Record {
    /// 能力消息中的空闲标志；空载荷返回 `None`
    pub fn published_idle(&self) -> Option<bool> {
        match self {
            Record::Publish { payload, .. } if !payload.is_empty() => {
                CapabilityMessage::from_payload(payload).ok().map(|m| m.idle)
            }
            _ => None,
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, Record::Publish { payload, .. } if payload.is_empty())
    }
}

pub type Timeline = Arc<Mutex<Vec<Record>>>;

pub fn timeline() -> Timeline {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn snapshot(timeline: &Timeline) -> Vec<Record> {
    timeline.lock().unwrap().clone()
}

/// 已建立连接上发布调用的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    Accept,
    /// 每次发布都返回错误
    Fail,
    /// 发布永远不返回（broker无响应）
    Stall,
}

pub struct RecordingConnector {
    pub timeline: Timeline,
    pub available: bool,
    pub publish_mode: PublishMode,
}

impl RecordingConnector {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            available: true,
            publish_mode: PublishMode::Accept,
        }
    }

    pub fn with_publish_mode(mut self, publish_mode: PublishMode) -> Self {
        self.publish_mode = publish_mode;
        self
    }
}

#[async_trait]
impl TransportConnector for RecordingConnector {
    async fn connect(
        &self,
        _client_id: &str,
        last_will: Option<LastWill>,
    ) -> FleetResult<Arc<dyn PubSubTransport>> {
        if !self.available {
            return Err(FleetError::TransportUnavailable("recording".to_string()));
        }
        self.timeline
            .lock()
            .unwrap()
            .push(Record::Connected { will: last_will });
        Ok(Arc::new(RecordingTransport {
            timeline: Arc::clone(&self.timeline),
            publish_mode: self.publish_mode,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

pub struct RecordingTransport {
    timeline: Timeline,
    publish_mode: PublishMode,
}

#[async_trait]
impl PubSubTransport for RecordingTransport {
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> FleetResult<()> {
        match self.publish_mode {
            PublishMode::Accept => {}
            PublishMode::Fail => {
                return Err(FleetError::Transport("broker rejected publish".to_string()))
            }
            PublishMode::Stall => std::future::pending::<()>().await,
        }
        self.timeline.lock().unwrap().push(Record::Publish {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, _filter: &str, _handler: MessageHandler) -> FleetResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> FleetResult<()> {
        self.timeline.lock().unwrap().push(Record::Disconnect);
        Ok(())
    }

    async fn abort(&self) {
        self.timeline.lock().unwrap().push(Record::Abort);
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Job(Duration),
    NoJob,
    Fail,
    Panic,
    /// 永不结束的任务
    Hang,
}

/// 按脚本返回结果的任务执行组件；脚本耗尽后触发关闭并报告无任务
pub struct ScriptedRunner {
    available: BTreeSet<String>,
    steps: Mutex<VecDeque<Step>>,
    timeline: Timeline,
    shutdown_when_exhausted: Option<ShutdownSignal>,
    pub started: Arc<Notify>,
    pub requested_types: Mutex<Vec<BTreeSet<String>>>,
}

impl ScriptedRunner {
    pub fn new(available: &[&str], steps: Vec<Step>, timeline: Timeline) -> Self {
        Self {
            available: available.iter().map(|s| s.to_string()).collect(),
            steps: Mutex::new(steps.into()),
            timeline,
            shutdown_when_exhausted: None,
            started: Arc::new(Notify::new()),
            requested_types: Mutex::new(Vec::new()),
        }
    }

    pub fn shutdown_when_exhausted(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown_when_exhausted = Some(shutdown);
        self
    }
}

#[async_trait]
impl TaskRunner for ScriptedRunner {
    async fn supported_task_types(&self) -> FleetResult<BTreeSet<String>> {
        Ok(self.available.clone())
    }

    async fn run_once(&self, task_types: &BTreeSet<String>) -> FleetResult<bool> {
        self.requested_types.lock().unwrap().push(task_types.clone());
        let step = self.steps.lock().unwrap().pop_front();
        let Some(step) = step else {
            if let Some(shutdown) = &self.shutdown_when_exhausted {
                if !shutdown.is_requested() {
                    shutdown.trigger();
                }
            }
            return Ok(false);
        };

        self.timeline.lock().unwrap().push(Record::JobStarted);
        self.started.notify_one();
        let result = match step {
            Step::Job(duration) => {
                tokio::time::sleep(duration).await;
                Ok(true)
            }
            Step::NoJob => Ok(false),
            Step::Fail => Err(FleetError::TaskExecution("job exploded".to_string())),
            Step::Panic => panic!("runner bug"),
            Step::Hang => std::future::pending().await,
        };
        self.timeline.lock().unwrap().push(Record::JobFinished);
        result
    }
}
