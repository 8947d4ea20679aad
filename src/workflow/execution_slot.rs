//! 执行槽位 - 流程层
//!
//! 核心职责：定义"一个槽位"的完整处理循环
//!
//! 循环顺序：
//! 1. 取任务（队列空时退避）
//! 2. 确保会话已过验证关卡
//! 3. 重置页面 → 提交 → 轮询就绪 → 取产物
//! 4. 失败时在重试预算和总时限内重新入队，否则记为终态

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, ReadinessConfig};
use crate::error::{ErrorReason, WorkError};
use crate::infrastructure::ExecutionContext;
use crate::models::{ArtifactRef, StatusEvent, Task, WorkItem};
use crate::services::{
    ChallengeResolver, ClearanceCache, EventSink, PollOutcome, ReadinessPoller, WorkDriver,
    WorkQueue,
};
use crate::utils::logging::truncate_text;
use crate::workflow::session_record::SessionRecord;
use crate::workflow::slot_ctx::SlotCtx;

/// 重试和节奏相关的参数
#[derive(Debug, Clone)]
pub struct SlotPolicy {
    pub max_retries: u32,
    pub item_deadline: Duration,
    pub retry_delay: Duration,
    pub dequeue_backoff: Duration,
    pub transport_failure_threshold: u32,
    pub readiness: ReadinessConfig,
}

impl SlotPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            item_deadline: config.item_deadline,
            retry_delay: config.retry_delay,
            dequeue_backoff: config.dequeue_backoff,
            transport_failure_threshold: config.transport_failure_threshold,
            readiness: config.readiness.clone(),
        }
    }
}

/// 所有槽位共享的依赖
pub struct SlotEnv {
    pub queue: Arc<WorkQueue>,
    pub driver: Arc<dyn WorkDriver>,
    pub resolver: Arc<ChallengeResolver>,
    pub cache: Arc<ClearanceCache>,
    pub events: EventSink,
    pub policy: SlotPolicy,
    pub cancel: CancellationToken,
}

/// 一个槽位，独占一个执行上下文
///
/// - 同一时间只处理一个 WorkItem
/// - 自己的错误自己消化，不影响其他槽位
pub struct ExecutionSlot {
    ctx: SlotCtx,
    session: Arc<SessionRecord>,
    context: Arc<dyn ExecutionContext>,
    env: Arc<SlotEnv>,
}

impl ExecutionSlot {
    pub fn new(
        slot: usize,
        session: Arc<SessionRecord>,
        context: Arc<dyn ExecutionContext>,
        env: Arc<SlotEnv>,
    ) -> Self {
        Self {
            ctx: SlotCtx::new(session.session_id.clone(), slot),
            session,
            context,
            env,
        }
    }

    /// 运行直到队列排空、会话不可用或收到停止信号
    pub async fn run(self) {
        let env = Arc::clone(&self.env);
        debug!("{} 开始取任务", self.ctx);

        loop {
            if env.cancel.is_cancelled() || self.session.is_retired() {
                break;
            }

            let Some(mut item) = env.queue.pop_next() else {
                if env.queue.is_drained() {
                    break;
                }
                tokio::select! {
                    _ = env.cancel.cancelled() => {}
                    _ = sleep(env.policy.dequeue_backoff) => {}
                }
                continue;
            };

            if let Err(e) = self
                .session
                .gate
                .ensure_cleared(
                    &env.resolver,
                    self.session.handle.as_ref(),
                    self.context.as_ref(),
                    &env.cancel,
                )
                .await
            {
                warn!("{} ⚠️ 会话不可用，归还 #{}: {}", self.ctx, item.sequence_index + 1, e);
                env.queue.push_front(item);
                break;
            }

            if env.cancel.is_cancelled() {
                env.queue.push_front(item);
                break;
            }

            item.mark_dispatched();
            let task = Task::start(&item, &self.ctx.session_id);
            env.events.status(StatusEvent::AttemptStarted {
                session_id: self.ctx.session_id.clone(),
                slot: self.ctx.slot,
                sequence_index: item.sequence_index,
                retry_count: item.retry_count,
            });

            let result = self.attempt(&item).await;
            self.settle(item, task, result).await;
        }

        env.events.status(StatusEvent::SlotStopped {
            session_id: self.ctx.session_id.clone(),
            slot: self.ctx.slot,
        });
    }

    /// 一次完整的尝试
    async fn attempt(&self, item: &WorkItem) -> Result<Vec<ArtifactRef>, WorkError> {
        let env = &self.env;
        let driver: &dyn WorkDriver = env.driver.as_ref();
        let ctx: &dyn ExecutionContext = self.context.as_ref();

        driver.reset(ctx).await?;

        info!(
            "{} 📤 提交 #{}: {}",
            self.ctx,
            item.sequence_index + 1,
            truncate_text(&item.payload.prompt, 30)
        );
        let submission = driver.submit(ctx, item).await?;
        let submission = &submission;

        let poller = ReadinessPoller::new(
            env.policy.readiness.interval,
            item.payload.class.readiness_timeout(&env.policy.readiness),
        );
        let artifact = match poller
            .wait(&env.cancel, move || driver.check_ready(ctx, submission))
            .await?
        {
            PollOutcome::Ready(artifact) => artifact,
            PollOutcome::TimedOut => {
                return Err(WorkError::ReadinessTimeout {
                    waited: poller.timeout(),
                })
            }
            PollOutcome::Cancelled => return Err(WorkError::Cancelled),
        };

        info!("{} ✓ #{} 产物已就绪", self.ctx, item.sequence_index + 1);
        driver.fetch(ctx, item, artifact).await
    }

    /// 根据结果决定完成、重新入队还是终止
    async fn settle(
        &self,
        mut item: WorkItem,
        mut task: Task,
        result: Result<Vec<ArtifactRef>, WorkError>,
    ) {
        let env = &self.env;
        let err = match result {
            Ok(refs) => {
                self.session.record_success();
                info!(
                    "{} ✅ #{} 完成，{} 个产物",
                    self.ctx,
                    item.sequence_index + 1,
                    refs.len()
                );
                task.complete(refs);
                self.finish(task);
                return;
            }
            Err(err) => err,
        };

        if matches!(err, WorkError::Transport(_)) {
            self.note_transport_failure();
        }

        let reason = err.reason();
        let stopping = env.cancel.is_cancelled() || matches!(err, WorkError::Cancelled);
        let within_budget = item.retry_count < env.policy.max_retries;
        let within_deadline = !item.deadline_passed(env.policy.item_deadline);
        let will_retry = !stopping && within_budget && within_deadline;

        env.events.status(StatusEvent::AttemptFailed {
            session_id: self.ctx.session_id.clone(),
            slot: self.ctx.slot,
            sequence_index: item.sequence_index,
            retry_count: item.retry_count,
            reason: reason.clone(),
            will_retry,
        });

        if will_retry {
            item.retry_count += 1;
            env.queue.requeue(item);
            tokio::select! {
                _ = env.cancel.cancelled() => {}
                _ = sleep(env.policy.retry_delay) => {}
            }
            return;
        }

        let final_reason = if stopping {
            ErrorReason::Cancelled
        } else if !within_budget {
            ErrorReason::RetryBudgetExhausted {
                last: Box::new(reason),
            }
        } else {
            ErrorReason::DeadlineExceeded {
                last: Box::new(reason),
            }
        };
        task.fail(final_reason);
        self.finish(task);
    }

    fn finish(&self, task: Task) {
        self.env.events.task_complete(task.report());
        self.env.queue.finalize(task);
    }

    /// 连续传输错误达到阈值时让会话退役
    fn note_transport_failure(&self) {
        let failures = self.session.record_transport_failure();
        if failures >= self.env.policy.transport_failure_threshold && self.session.retire() {
            self.env.events.status(StatusEvent::SessionUnhealthy {
                session_id: self.ctx.session_id.clone(),
                consecutive_failures: failures,
            });
            self.env.cache.invalidate(&self.session.credential_ref);
        }
    }
}
