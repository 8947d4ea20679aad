//! 核心与界面之间的状态事件
//!
//! 界面层按 `kind` 分派，不再从日志字符串里找关键字

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ErrorReason;
use crate::models::task::TaskReport;

/// 验证关卡类型，按交互强度排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    /// 纯脚本校验，等待即可
    Passive,
    Managed,
    /// 需要点击的组件
    Interactive,
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChallengeKind::Passive => "non-interactive",
            ChallengeKind::Managed => "managed",
            ChallengeKind::Interactive => "interactive",
        };
        f.write_str(name)
    }
}

/// 带会话标识的状态事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEvent {
    SessionStarting {
        session_id: String,
        attempt: u32,
    },
    SessionReady {
        session_id: String,
        slots: usize,
    },
    SessionStartFailed {
        session_id: String,
        reason: String,
    },
    ChallengeDetected {
        session_id: String,
        challenge: ChallengeKind,
    },
    ChallengeInteraction {
        session_id: String,
        elapsed_secs: u64,
    },
    ChallengeWaiting {
        session_id: String,
        elapsed_secs: u64,
    },
    ChallengeCleared {
        session_id: String,
        elapsed_secs: u64,
    },
    ChallengeFailed {
        session_id: String,
        reason: ErrorReason,
    },
    AttemptStarted {
        session_id: String,
        slot: usize,
        sequence_index: usize,
        retry_count: u32,
    },
    AttemptFailed {
        session_id: String,
        slot: usize,
        sequence_index: usize,
        retry_count: u32,
        reason: ErrorReason,
        will_retry: bool,
    },
    SessionUnhealthy {
        session_id: String,
        consecutive_failures: u32,
    },
    SlotStopped {
        session_id: String,
        slot: usize,
    },
    SessionClosed {
        session_id: String,
    },
    TeardownFailed {
        session_id: String,
        reason: String,
    },
}

impl StatusEvent {
    pub fn session_id(&self) -> &str {
        match self {
            StatusEvent::SessionStarting { session_id, .. }
            | StatusEvent::SessionReady { session_id, .. }
            | StatusEvent::SessionStartFailed { session_id, .. }
            | StatusEvent::ChallengeDetected { session_id, .. }
            | StatusEvent::ChallengeInteraction { session_id, .. }
            | StatusEvent::ChallengeWaiting { session_id, .. }
            | StatusEvent::ChallengeCleared { session_id, .. }
            | StatusEvent::ChallengeFailed { session_id, .. }
            | StatusEvent::AttemptStarted { session_id, .. }
            | StatusEvent::AttemptFailed { session_id, .. }
            | StatusEvent::SessionUnhealthy { session_id, .. }
            | StatusEvent::SlotStopped { session_id, .. }
            | StatusEvent::SessionClosed { session_id }
            | StatusEvent::TeardownFailed { session_id, .. } => session_id,
        }
    }

    /// 是否属于需要引起注意的事件
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            StatusEvent::SessionStartFailed { .. }
                | StatusEvent::ChallengeFailed { .. }
                | StatusEvent::AttemptFailed { .. }
                | StatusEvent::SessionUnhealthy { .. }
                | StatusEvent::TeardownFailed { .. }
        )
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::SessionStarting { attempt, .. } => {
                write!(f, "🚀 正在启动会话 (第 {} 次)", attempt)
            }
            StatusEvent::SessionReady { slots, .. } => {
                write!(f, "✅ 会话就绪，{} 个槽位", slots)
            }
            StatusEvent::SessionStartFailed { reason, .. } => {
                write!(f, "❌ 会话启动失败: {}", reason)
            }
            StatusEvent::ChallengeDetected { challenge, .. } => {
                write!(f, "🔐 检测到验证关卡 [{}]", challenge)
            }
            StatusEvent::ChallengeInteraction { elapsed_secs, .. } => {
                write!(f, "   点击验证组件... ({}s)", elapsed_secs)
            }
            StatusEvent::ChallengeWaiting { elapsed_secs, .. } => {
                write!(f, "⏳ 等待验证通过... ({}s)", elapsed_secs)
            }
            StatusEvent::ChallengeCleared { elapsed_secs, .. } => {
                write!(f, "✅ 验证通过 ({}s)", elapsed_secs)
            }
            StatusEvent::ChallengeFailed { reason, .. } => {
                write!(f, "❌ 验证失败: {}", reason)
            }
            StatusEvent::AttemptStarted {
                slot,
                sequence_index,
                retry_count,
                ..
            } => {
                if *retry_count == 0 {
                    write!(f, "[槽位 {}] ▶️ 开始 #{}", slot + 1, sequence_index + 1)
                } else {
                    write!(
                        f,
                        "[槽位 {}] 🔄 重试 #{} (第 {} 次)",
                        slot + 1,
                        sequence_index + 1,
                        retry_count
                    )
                }
            }
            StatusEvent::AttemptFailed {
                slot,
                sequence_index,
                reason,
                will_retry,
                ..
            } => {
                let next = if *will_retry { "重新入队" } else { "不再重试" };
                write!(
                    f,
                    "[槽位 {}] ⚠️ #{} 失败: {}，{}",
                    slot + 1,
                    sequence_index + 1,
                    reason,
                    next
                )
            }
            StatusEvent::SessionUnhealthy {
                consecutive_failures,
                ..
            } => write!(
                f,
                "⚠️ 连续 {} 次传输错误，会话停止接收新任务",
                consecutive_failures
            ),
            StatusEvent::SlotStopped { slot, .. } => write!(f, "[槽位 {}] ⏹ 已停止", slot + 1),
            StatusEvent::SessionClosed { .. } => write!(f, "🔒 会话已关闭"),
            StatusEvent::TeardownFailed { reason, .. } => {
                write!(f, "⚠️ 关闭会话失败: {}", reason)
            }
        }
    }
}

/// 所有槽位汇聚到同一条流中的事件
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Status(StatusEvent),
    TaskComplete(TaskReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged_with_kind() {
        let event = StatusEvent::ChallengeDetected {
            session_id: "acc-1".into(),
            challenge: ChallengeKind::Interactive,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "challenge_detected");
        assert_eq!(json["challenge"], "interactive");
        assert_eq!(event.session_id(), "acc-1");
    }

    #[test]
    fn test_attempt_started_message_mentions_retry() {
        let event = StatusEvent::AttemptStarted {
            session_id: "s".into(),
            slot: 0,
            sequence_index: 2,
            retry_count: 1,
        };
        assert!(event.to_string().contains("重试 #3"));
        assert!(!event.is_warning());
    }

    #[test]
    fn test_challenge_kind_ordering() {
        assert!(ChallengeKind::Interactive > ChallengeKind::Managed);
        assert!(ChallengeKind::Managed > ChallengeKind::Passive);
    }
}
