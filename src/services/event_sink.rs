//! 状态事件汇聚 - 业务能力层
//!
//! 所有槽位往同一条 channel 里写，由一个分发任务按顺序回调给调用方

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::{BatchEvent, StatusEvent, TaskReport};

type StatusCallback = Box<dyn Fn(&str, &StatusEvent) + Send + Sync>;
type TaskCallback = Box<dyn Fn(&TaskReport) + Send + Sync>;

/// 事件写入端
///
/// 可以随意 clone，接收端关闭后发送静默失败
#[derive(Clone)]
pub struct EventSink {
    tx: UnboundedSender<BatchEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, UnboundedReceiver<BatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// 不需要回调时使用，事件只进日志
    pub fn detached() -> Self {
        let (sink, _rx) = Self::channel();
        sink
    }

    pub fn status(&self, event: StatusEvent) {
        if event.is_warning() {
            warn!("[会话 {}] {}", event.session_id(), event);
        } else {
            info!("[会话 {}] {}", event.session_id(), event);
        }
        let _ = self.tx.send(BatchEvent::Status(event));
    }

    pub fn task_complete(&self, report: TaskReport) {
        debug!(
            "#{} 结束: {:?}",
            report.work_item_index + 1,
            report.status
        );
        let _ = self.tx.send(BatchEvent::TaskComplete(report));
    }
}

/// 调用方提供的回调
pub struct BatchCallbacks {
    on_status: StatusCallback,
    on_task_complete: TaskCallback,
}

impl BatchCallbacks {
    pub fn new<S, T>(on_status: S, on_task_complete: T) -> Self
    where
        S: Fn(&str, &StatusEvent) + Send + Sync + 'static,
        T: Fn(&TaskReport) + Send + Sync + 'static,
    {
        Self {
            on_status: Box::new(on_status),
            on_task_complete: Box::new(on_task_complete),
        }
    }

    /// 什么都不做的回调
    pub fn silent() -> Self {
        Self::new(|_, _| {}, |_| {})
    }
}

/// 启动分发任务，所有发送端释放后结束
pub fn spawn_dispatcher(
    mut rx: UnboundedReceiver<BatchEvent>,
    callbacks: BatchCallbacks,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                BatchEvent::Status(status) => (callbacks.on_status)(status.session_id(), &status),
                BatchEvent::TaskComplete(report) => (callbacks.on_task_complete)(&report),
            }
        }
    })
}
