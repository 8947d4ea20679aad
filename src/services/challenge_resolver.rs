//! 验证关卡处理 - 业务能力层
//!
//! `ChallengeResolver` 负责一次完整的"检测 → 点击 → 等待 clearance"过程，
//! `SessionGate` 保证每个会话只过一次关

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ChallengeConfig;
use crate::error::SessionError;
use crate::infrastructure::{ExecutionContext, RemoteSession};
use crate::models::{ChallengeKind, StatusEvent};
use crate::services::clearance_cache::ClearanceCache;
use crate::services::event_sink::EventSink;

/// 等待期间多久报告一次进度
const WAITING_REPORT_EVERY: Duration = Duration::from_secs(10);

/// 一次过关的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    Cleared { elapsed: Duration },
    TimedOut { waited: Duration },
    Cancelled,
}

/// 会话的过关状态
#[derive(Debug, Clone)]
pub enum ChallengeState {
    NotChecked,
    Checking,
    Cleared,
    /// 直到会话重启前都不会再尝试
    Failed(SessionError),
}

/// 验证关卡处理器
///
/// 不认识页面结构，只通过标记集合和组件位置判断进度
pub struct ChallengeResolver {
    config: ChallengeConfig,
    cache: Arc<ClearanceCache>,
    events: EventSink,
}

impl ChallengeResolver {
    pub fn new(config: ChallengeConfig, cache: Arc<ClearanceCache>, events: EventSink) -> Self {
        Self {
            config,
            cache,
            events,
        }
    }

    /// 页面标记对应的最强关卡类型
    pub fn classify<'a>(&self, markers: impl IntoIterator<Item = &'a String>) -> Option<ChallengeKind> {
        markers
            .into_iter()
            .filter_map(|token| {
                self.config
                    .markers
                    .iter()
                    .find(|m| &m.token == token)
                    .map(|m| m.kind)
            })
            .max()
    }

    /// 在 `ctx` 所在页面上等待关卡通过
    ///
    /// clearance 缓存按 `credential_ref` 读写，和会话 id 无关
    pub async fn resolve(
        &self,
        session: &dyn RemoteSession,
        credential_ref: &str,
        ctx: &dyn ExecutionContext,
        cancel: &CancellationToken,
    ) -> ChallengeOutcome {
        let session_id = session.session_id().to_string();
        let started = Instant::now();
        let mut detected: Option<ChallengeKind> = None;
        let mut last_click: Option<Instant> = None;
        let mut next_report = WAITING_REPORT_EVERY;

        loop {
            if cancel.is_cancelled() {
                return ChallengeOutcome::Cancelled;
            }

            let elapsed = started.elapsed();
            if elapsed >= self.config.timeout {
                return self.fail(&session_id, credential_ref, elapsed);
            }

            // 页面还在跳转时读不到标记，当作"还没好"
            match ctx.get_page_markers().await {
                Ok(markers) if markers.is_empty() => {
                    self.remember_clearance(session, credential_ref).await;
                    return self.clear(&session_id, elapsed);
                }
                Ok(markers) => {
                    let kind = self.classify(&markers);
                    if kind.is_some() && kind > detected {
                        detected = kind;
                        if let Some(challenge) = kind {
                            self.events.status(StatusEvent::ChallengeDetected {
                                session_id: session_id.clone(),
                                challenge,
                            });
                        }
                    }
                }
                Err(e) => debug!("[会话 {}] 读取页面标记失败: {}", session_id, e),
            }

            if self.remember_clearance(session, credential_ref).await {
                return self.clear(&session_id, started.elapsed());
            }

            let cooled_down = last_click
                .map(|at| at.elapsed() >= self.config.click_cooldown)
                .unwrap_or(true);
            if cooled_down && self.try_click(&session_id, ctx).await {
                last_click = Some(Instant::now());
                self.events.status(StatusEvent::ChallengeInteraction {
                    session_id: session_id.clone(),
                    elapsed_secs: started.elapsed().as_secs(),
                });
            }

            if started.elapsed() >= next_report {
                next_report += WAITING_REPORT_EVERY;
                self.events.status(StatusEvent::ChallengeWaiting {
                    session_id: session_id.clone(),
                    elapsed_secs: started.elapsed().as_secs(),
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return ChallengeOutcome::Cancelled,
                _ = sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// 找到可见的组件就点一下中心，找不到不算错误
    async fn try_click(&self, session_id: &str, ctx: &dyn ExecutionContext) -> bool {
        let bounds = match ctx.locate_challenge_widget().await {
            Ok(Some(bounds)) if bounds.visible => bounds,
            Ok(_) => return false,
            Err(e) => {
                debug!("[会话 {}] 定位验证组件失败: {}", session_id, e);
                return false;
            }
        };

        let (x, y) = bounds.center();
        if let Err(e) = ctx.synthesize_pointer_click(x, y).await {
            debug!("[会话 {}] 点击验证组件失败: {}", session_id, e);
        }
        true
    }

    /// cookie 里出现 clearance 时写入缓存
    async fn remember_clearance(&self, session: &dyn RemoteSession, credential_ref: &str) -> bool {
        let cookies = match session.get_cookies().await {
            Ok(cookies) => cookies,
            Err(e) => {
                debug!("[会话 {}] 读取 cookie 失败: {}", session.session_id(), e);
                return false;
            }
        };
        match cookies.get(&self.config.clearance_cookie) {
            Some(token) => {
                self.cache.store(credential_ref, token.clone());
                true
            }
            None => false,
        }
    }

    fn clear(&self, session_id: &str, elapsed: Duration) -> ChallengeOutcome {
        self.events.status(StatusEvent::ChallengeCleared {
            session_id: session_id.to_string(),
            elapsed_secs: elapsed.as_secs(),
        });
        ChallengeOutcome::Cleared { elapsed }
    }

    fn fail(&self, session_id: &str, credential_ref: &str, waited: Duration) -> ChallengeOutcome {
        self.cache.invalidate(credential_ref);
        self.events.status(StatusEvent::ChallengeFailed {
            session_id: session_id.to_string(),
            reason: crate::error::ErrorReason::ChallengeTimeout,
        });
        ChallengeOutcome::TimedOut { waited }
    }
}

/// 每个会话一个，所有槽位共享
///
/// 第一个到达的槽位负责过关，其余槽位在锁上等待结果
pub struct SessionGate {
    session_id: String,
    credential_ref: String,
    state: Mutex<ChallengeState>,
    cleared: AtomicBool,
}

impl SessionGate {
    pub fn new(session_id: impl Into<String>, credential_ref: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            credential_ref: credential_ref.into(),
            state: Mutex::new(ChallengeState::NotChecked),
            cleared: AtomicBool::new(false),
        }
    }

    /// 一旦为 true 就不会再变回 false
    pub fn is_cleared(&self) -> bool {
        self.cleared.load(Ordering::Acquire)
    }

    pub async fn state(&self) -> ChallengeState {
        self.state.lock().await.clone()
    }

    /// 确保会话已过关，已过关时直接返回
    pub async fn ensure_cleared(
        &self,
        resolver: &ChallengeResolver,
        session: &dyn RemoteSession,
        ctx: &dyn ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        if self.is_cleared() {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        match &*state {
            ChallengeState::Cleared => return Ok(()),
            ChallengeState::Failed(err) => return Err(err.clone()),
            ChallengeState::NotChecked | ChallengeState::Checking => {}
        }

        *state = ChallengeState::Checking;
        match resolver
            .resolve(session, &self.credential_ref, ctx, cancel)
            .await
        {
            ChallengeOutcome::Cleared { .. } => {
                *state = ChallengeState::Cleared;
                self.cleared.store(true, Ordering::Release);
                Ok(())
            }
            ChallengeOutcome::TimedOut { waited } => {
                let err = SessionError::ChallengeTimeout {
                    session_id: self.session_id.clone(),
                    waited,
                };
                *state = ChallengeState::Failed(err.clone());
                Err(err)
            }
            ChallengeOutcome::Cancelled => {
                *state = ChallengeState::NotChecked;
                Err(SessionError::Unavailable {
                    session_id: self.session_id.clone(),
                })
            }
        }
    }
}
