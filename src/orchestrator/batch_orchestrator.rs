//! 批次编排
//!
//! 入口：`start_batch` 返回句柄，`stop_batch` 或 `BatchHandle::wait` 拿到全部终态 Task

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, ErrorReason};
use crate::infrastructure::SessionProvider;
use crate::models::{Credential, Task, TaskStatus, WorkItem};
use crate::orchestrator::worker_pool::{PoolSettings, SessionWorkerPool};
use crate::services::{
    spawn_dispatcher, BatchCallbacks, ChallengeResolver, ClearanceCache, EventSink, WorkDriver,
    WorkQueue,
};
use crate::workflow::{SlotEnv, SlotPolicy};

/// 批次结果，按 sequence_index 排序，每个 WorkItem 恰好一个终态 Task
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub tasks: Vec<Task>,
    pub stopped: bool,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    pub fn completed(&self) -> usize {
        self.count(TaskStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(TaskStatus::Failed)
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}

/// 正在运行的批次
pub struct BatchHandle {
    cancel: CancellationToken,
    join: JoinHandle<BatchReport>,
}

impl BatchHandle {
    /// 通知所有循环在下一个安全点退出
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 等待批次结束（包括所有会话关闭）
    pub async fn wait(self) -> AppResult<BatchReport> {
        self.join
            .await
            .map_err(|e| AppError::Other(format!("批次任务异常退出: {}", e)))
    }
}

/// 停止批次并等待所有会话关闭
pub async fn stop_batch(handle: BatchHandle) -> AppResult<BatchReport> {
    handle.stop();
    handle.wait().await
}

/// 批次编排器
///
/// 持有进程级的共享组件（会话来源、页面驱动、clearance 缓存），每次 `start_batch`
/// 新建队列和工作池
pub struct BatchOrchestrator {
    config: Config,
    provider: Arc<dyn SessionProvider>,
    driver: Arc<dyn WorkDriver>,
    cache: Arc<ClearanceCache>,
}

impl BatchOrchestrator {
    pub fn new(
        config: Config,
        provider: Arc<dyn SessionProvider>,
        driver: Arc<dyn WorkDriver>,
        cache: Arc<ClearanceCache>,
    ) -> Self {
        Self {
            config,
            provider,
            driver,
            cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 启动一个批次，立即返回句柄
    pub fn start_batch(
        &self,
        work_items: Vec<WorkItem>,
        sessions: Vec<Credential>,
        slots_per_session: usize,
        max_retries: u32,
        callbacks: BatchCallbacks,
    ) -> BatchHandle {
        let slots = slots_per_session.clamp(1, 3);
        if slots != slots_per_session {
            warn!("⚠️ 每个会话槽位数 {} 超出范围，改为 {}", slots_per_session, slots);
        }

        let cancel = CancellationToken::new();
        let run = BatchRun {
            config: self.config.clone(),
            provider: Arc::clone(&self.provider),
            driver: Arc::clone(&self.driver),
            cache: Arc::clone(&self.cache),
            slots_per_session: slots,
            max_retries,
            cancel: cancel.clone(),
        };
        let join = tokio::spawn(run.execute(work_items, sessions, callbacks));
        BatchHandle { cancel, join }
    }
}

struct BatchRun {
    config: Config,
    provider: Arc<dyn SessionProvider>,
    driver: Arc<dyn WorkDriver>,
    cache: Arc<ClearanceCache>,
    slots_per_session: usize,
    max_retries: u32,
    cancel: CancellationToken,
}

impl BatchRun {
    async fn execute(
        self,
        work_items: Vec<WorkItem>,
        sessions: Vec<Credential>,
        callbacks: BatchCallbacks,
    ) -> BatchReport {
        let (events, rx) = EventSink::channel();
        let dispatcher = spawn_dispatcher(rx, callbacks);

        info!(
            "📋 批次开始: {} 个任务, {} 个会话",
            work_items.len(),
            sessions.len()
        );
        let queue = Arc::new(WorkQueue::seeded(work_items));

        let policy = SlotPolicy {
            max_retries: self.max_retries,
            ..SlotPolicy::from_config(&self.config)
        };
        let settings = PoolSettings {
            slots_per_session: self.slots_per_session,
            ..PoolSettings::from_config(&self.config)
        };
        let env = Arc::new(SlotEnv {
            queue: Arc::clone(&queue),
            driver: Arc::clone(&self.driver),
            resolver: Arc::new(ChallengeResolver::new(
                self.config.challenge.clone(),
                Arc::clone(&self.cache),
                events.clone(),
            )),
            cache: Arc::clone(&self.cache),
            events: events.clone(),
            policy,
            cancel: self.cancel.clone(),
        });

        let mut pool = SessionWorkerPool::new(Arc::clone(&self.provider), env, settings);
        pool.start(sessions);
        let summary = pool.finish().await;

        // 没有被任何会话处理完的 WorkItem
        let stopped = self.cancel.is_cancelled();
        let leftover = queue.drain_remaining();
        if !leftover.is_empty() {
            let reason = if stopped {
                ErrorReason::Cancelled
            } else if summary.any_challenge_timeout() {
                ErrorReason::ChallengeTimeout
            } else {
                ErrorReason::SessionUnavailable
            };
            warn!("⚠️ {} 个任务未能处理: {}", leftover.len(), reason);
            for item in leftover {
                let task = Task::unattempted(&item, reason.clone());
                events.task_complete(task.report());
                queue.finalize(task);
            }
        }

        let mut tasks = queue.take_finished();
        tasks.sort_by_key(|t| t.work_item.sequence_index);

        // 所有发送端释放后分发任务才会结束
        drop(events);
        if let Err(e) = dispatcher.await {
            warn!("事件分发任务异常退出: {}", e);
        }

        let report = BatchReport { tasks, stopped };
        info!(
            "📊 批次结束: 成功 {} / 失败 {} / 共 {}",
            report.completed(),
            report.failed(),
            report.total()
        );
        report
    }
}
