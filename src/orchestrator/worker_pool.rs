//! 会话工作池 - 编排层
//!
//! 每个凭据一个会话，每个会话若干槽位。会话错开启动，
//! 启动失败或过关失败只影响自己，不影响其他会话

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{BrowserError, SessionError};
use crate::infrastructure::{ExecutionContext, RemoteSession, SessionProvider};
use crate::models::{Credential, SessionSpec, StatusEvent};
use crate::services::ChallengeState;
use crate::workflow::{ExecutionSlot, SessionRecord, SlotEnv};

/// 两次启动尝试之间的间隔
const START_RETRY_DELAY: Duration = Duration::from_secs(2);

/// 工作池参数
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub slots_per_session: usize,
    pub session_stagger: Duration,
    pub session_start_attempts: u32,
    pub target_url: String,
    pub clearance_cookie: String,
}

impl PoolSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            slots_per_session: config.slots_per_session,
            session_stagger: config.session_stagger,
            session_start_attempts: config.session_start_attempts,
            target_url: config.target_url.clone(),
            clearance_cookie: config.challenge.clearance_cookie.clone(),
        }
    }
}

/// 工作池结束时的会话情况
#[derive(Debug, Default)]
pub struct PoolSummary {
    pub sessions_started: usize,
    /// 启动失败或过关失败的会话
    pub session_failures: Vec<SessionError>,
}

impl PoolSummary {
    pub fn any_challenge_timeout(&self) -> bool {
        self.session_failures
            .iter()
            .any(|e| matches!(e, SessionError::ChallengeTimeout { .. }))
    }
}

/// 会话工作池
///
/// 职责：
/// - 持有所有会话（SessionRecord）
/// - 错开启动会话并为每个槽位打开执行上下文
/// - 结束时关闭所有会话，关闭失败只记录不上抛
pub struct SessionWorkerPool {
    provider: Arc<dyn SessionProvider>,
    env: Arc<SlotEnv>,
    settings: PoolSettings,
    sessions: Arc<Mutex<Vec<Arc<SessionRecord>>>>,
    start_failures: Arc<Mutex<Vec<SessionError>>>,
    handles: Vec<JoinHandle<()>>,
}

impl SessionWorkerPool {
    pub fn new(provider: Arc<dyn SessionProvider>, env: Arc<SlotEnv>, settings: PoolSettings) -> Self {
        Self {
            provider,
            env,
            settings,
            sessions: Arc::new(Mutex::new(Vec::new())),
            start_failures: Arc::new(Mutex::new(Vec::new())),
            handles: Vec::new(),
        }
    }

    /// 为每个凭据启动一个会话，立即返回
    pub fn start(&mut self, credentials: Vec<Credential>) {
        info!(
            "🚀 启动 {} 个会话，每个会话 {} 个槽位",
            credentials.len(),
            self.settings.slots_per_session
        );

        for (index, credential) in credentials.into_iter().enumerate() {
            let bring_up = SessionBringUp {
                index,
                credential,
                provider: Arc::clone(&self.provider),
                env: Arc::clone(&self.env),
                settings: self.settings.clone(),
                sessions: Arc::clone(&self.sessions),
                start_failures: Arc::clone(&self.start_failures),
            };
            self.handles.push(tokio::spawn(bring_up.run()));
        }
    }

    /// 通知所有槽位停止，并等待会话全部关闭
    pub async fn stop(self) -> PoolSummary {
        info!("⏹ 正在停止所有会话...");
        self.env.cancel.cancel();
        self.finish().await
    }

    /// 等待所有槽位自然结束，然后关闭会话
    pub async fn finish(self) -> PoolSummary {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("会话任务异常退出: {}", e);
            }
        }

        let sessions: Vec<Arc<SessionRecord>> = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        let mut summary = PoolSummary {
            sessions_started: sessions.len(),
            session_failures: std::mem::take(
                &mut *self.start_failures.lock().unwrap_or_else(|e| e.into_inner()),
            ),
        };

        for record in sessions {
            if let ChallengeState::Failed(err) = record.gate.state().await {
                summary.session_failures.push(err);
            }
            teardown(&record, &self.env).await;
        }
        summary
    }
}

/// 关闭一个会话，失败只记录
async fn teardown(record: &SessionRecord, env: &SlotEnv) {
    let session_id = record.session_id.clone();
    match record.handle.close().await {
        Ok(()) => env.events.status(StatusEvent::SessionClosed { session_id }),
        Err(e) => env.events.status(StatusEvent::TeardownFailed {
            session_id,
            reason: e.to_string(),
        }),
    }
}

/// 一个会话从启动到所有槽位退出的过程
struct SessionBringUp {
    index: usize,
    credential: Credential,
    provider: Arc<dyn SessionProvider>,
    env: Arc<SlotEnv>,
    settings: PoolSettings,
    sessions: Arc<Mutex<Vec<Arc<SessionRecord>>>>,
    start_failures: Arc<Mutex<Vec<SessionError>>>,
}

impl SessionBringUp {
    async fn run(self) {
        let delay = self.settings.session_stagger * self.index as u32;
        if !delay.is_zero() {
            tokio::select! {
                _ = self.env.cancel.cancelled() => return,
                _ = sleep(delay) => {}
            }
        }

        let Some(handle) = self.open_with_retry().await else {
            return;
        };

        let record = Arc::new(SessionRecord::new(
            self.credential.label.clone(),
            self.settings.slots_per_session,
            Arc::clone(&handle),
        ));
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&record));

        let mut contexts = Vec::with_capacity(self.settings.slots_per_session);
        for slot in 0..self.settings.slots_per_session {
            match self.open_slot(handle.as_ref(), slot).await {
                Ok(context) => contexts.push((slot, context)),
                Err(e) => warn!(
                    "[会话 {}] ⚠️ 槽位 {} 打开失败: {}",
                    record.session_id,
                    slot + 1,
                    e
                ),
            }
        }

        if contexts.is_empty() {
            self.record_start_failure("没有可用的槽位".to_string());
            return;
        }

        self.env.events.status(StatusEvent::SessionReady {
            session_id: record.session_id.clone(),
            slots: contexts.len(),
        });

        let slot_handles: Vec<_> = contexts
            .into_iter()
            .map(|(slot, context)| {
                let slot_task =
                    ExecutionSlot::new(slot, Arc::clone(&record), context, Arc::clone(&self.env));
                tokio::spawn(slot_task.run())
            })
            .collect();

        for slot_handle in slot_handles {
            if let Err(e) = slot_handle.await {
                error!("[会话 {}] 槽位任务异常退出: {}", record.session_id, e);
            }
        }
    }

    /// 按配置次数尝试启动会话
    async fn open_with_retry(&self) -> Option<Arc<dyn RemoteSession>> {
        let spec = self.session_spec();
        let attempts = self.settings.session_start_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if self.env.cancel.is_cancelled() {
                return None;
            }
            self.env.events.status(StatusEvent::SessionStarting {
                session_id: spec.session_id.clone(),
                attempt,
            });

            match self.provider.open(&spec).await {
                Ok(handle) => return Some(handle),
                Err(e) => {
                    warn!(
                        "[会话 {}] ⚠️ 第 {}/{} 次启动失败: {}",
                        spec.session_id, attempt, attempts, e
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = self.env.cancel.cancelled() => return None,
                    _ = sleep(START_RETRY_DELAY) => {}
                }
            }
        }

        self.record_start_failure(last_error);
        None
    }

    /// 凭据自带的 cookie，加上缓存中未过期的 clearance
    fn session_spec(&self) -> SessionSpec {
        let mut seed_cookies = self.credential.cookies.clone();
        if let Some(token) = self.env.cache.get(&self.credential.label) {
            seed_cookies.insert(self.settings.clearance_cookie.clone(), token);
        }
        SessionSpec {
            session_id: self.credential.label.clone(),
            credential: self.credential.clone(),
            seed_cookies,
            target_url: self.settings.target_url.clone(),
        }
    }

    async fn open_slot(
        &self,
        handle: &dyn RemoteSession,
        slot: usize,
    ) -> Result<Arc<dyn ExecutionContext>, BrowserError> {
        let context = handle.open_context(slot).await?;
        context.navigate(&self.settings.target_url).await?;
        Ok(context)
    }

    fn record_start_failure(&self, reason: String) {
        self.env.events.status(StatusEvent::SessionStartFailed {
            session_id: self.credential.label.clone(),
            reason: reason.clone(),
        });
        self.start_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SessionError::StartFailed {
                session_id: self.credential.label.clone(),
                reason,
            });
    }
}
