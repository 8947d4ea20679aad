use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 单个任务的错误（可重试）
    #[error("任务错误: {0}")]
    Work(#[from] WorkError),
    /// 会话级错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// 浏览器相关错误
///
/// 会话能力接口（导航、执行脚本、读取 cookie、点击）的所有失败都归到这里
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 启动或连接浏览器失败
    #[error("无法启动浏览器: {reason}")]
    LaunchFailed { reason: String },
    /// 创建页面失败
    #[error("创建页面失败: {reason}")]
    PageCreationFailed { reason: String },
    /// 导航失败
    #[error("导航到 {url} 失败: {reason}")]
    NavigationFailed { url: String, reason: String },
    /// 执行脚本失败
    #[error("执行脚本失败: {reason}")]
    ScriptFailed { reason: String },
    /// 读取或写入 cookie 失败
    #[error("cookie 操作失败: {reason}")]
    CookieFailed { reason: String },
    /// 模拟鼠标事件失败
    #[error("点击 ({x:.0}, {y:.0}) 失败: {reason}")]
    InputFailed { x: f64, y: f64, reason: String },
    /// 向文件输入框设置文件失败
    #[error("上传文件到 {selector} 失败: {reason}")]
    UploadFailed { selector: String, reason: String },
    /// 会话已关闭
    #[error("会话已关闭")]
    Closed,
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::ScriptFailed {
            reason: err.to_string(),
        }
    }
}

/// 单个 WorkItem 的错误
///
/// 除 `Cancelled` 外都可以通过重新入队恢复
#[derive(Debug, Error)]
pub enum WorkError {
    /// 输入或交互失败
    #[error("提交失败: {reason}")]
    Submission { reason: String },
    /// 产物始终没有通过就绪判断
    #[error("等待产物超时 ({}s)", waited.as_secs())]
    ReadinessTimeout { waited: Duration },
    /// 下载产物失败
    #[error("获取产物失败: {reason}")]
    ArtifactFetch { reason: String },
    /// 会话在操作中途不可用
    #[error("传输错误: {0}")]
    Transport(#[from] BrowserError),
    /// 批次被停止
    #[error("已取消")]
    Cancelled,
}

impl WorkError {
    pub fn submission(reason: impl Into<String>) -> Self {
        WorkError::Submission {
            reason: reason.into(),
        }
    }

    pub fn artifact_fetch(reason: impl Into<String>) -> Self {
        WorkError::ArtifactFetch {
            reason: reason.into(),
        }
    }

    /// 转换为可持久化的失败原因
    pub fn reason(&self) -> ErrorReason {
        match self {
            WorkError::Submission { reason } => ErrorReason::SubmissionError(reason.clone()),
            WorkError::ReadinessTimeout { .. } => ErrorReason::ReadinessTimeout,
            WorkError::ArtifactFetch { reason } => ErrorReason::ArtifactFetchError(reason.clone()),
            WorkError::Transport(e) => ErrorReason::TransportError(e.to_string()),
            WorkError::Cancelled => ErrorReason::Cancelled,
        }
    }
}

/// 会话级错误
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// 验证关卡在时限内没有通过
    #[error("会话 {session_id} 验证超时 ({}s)", waited.as_secs())]
    ChallengeTimeout {
        session_id: String,
        waited: Duration,
    },
    /// 会话启动失败
    #[error("会话 {session_id} 启动失败: {reason}")]
    StartFailed { session_id: String, reason: String },
    /// 会话已退役或被停止
    #[error("会话 {session_id} 不可用")]
    Unavailable { session_id: String },
}

impl SessionError {
    pub fn reason(&self) -> ErrorReason {
        match self {
            SessionError::ChallengeTimeout { .. } => ErrorReason::ChallengeTimeout,
            SessionError::StartFailed { .. } | SessionError::Unavailable { .. } => {
                ErrorReason::SessionUnavailable
            }
        }
    }
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    Invalid { field: String, reason: String },
}

/// 终态 Task 上记录的失败原因
///
/// 交给外部的历史记录组件，所以必须是纯数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ErrorReason {
    ChallengeTimeout,
    ReadinessTimeout,
    SubmissionError(String),
    ArtifactFetchError(String),
    TransportError(String),
    RetryBudgetExhausted { last: Box<ErrorReason> },
    DeadlineExceeded { last: Box<ErrorReason> },
    SessionUnavailable,
    Cancelled,
}

impl ErrorReason {
    /// 重试耗尽时，取出最后一次尝试的原因
    pub fn last_attempt(&self) -> &ErrorReason {
        match self {
            ErrorReason::RetryBudgetExhausted { last } | ErrorReason::DeadlineExceeded { last } => {
                last.last_attempt()
            }
            other => other,
        }
    }
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorReason::ChallengeTimeout => write!(f, "ChallengeTimeout"),
            ErrorReason::ReadinessTimeout => write!(f, "ReadinessTimeout"),
            ErrorReason::SubmissionError(msg) => write!(f, "SubmissionError: {}", msg),
            ErrorReason::ArtifactFetchError(msg) => write!(f, "ArtifactFetchError: {}", msg),
            ErrorReason::TransportError(msg) => write!(f, "TransportError: {}", msg),
            ErrorReason::RetryBudgetExhausted { last } => {
                write!(f, "RetryBudgetExhausted (last: {})", last)
            }
            ErrorReason::DeadlineExceeded { last } => {
                write!(f, "DeadlineExceeded (last: {})", last)
            }
            ErrorReason::SessionUnavailable => write!(f, "SessionUnavailable"),
            ErrorReason::Cancelled => write!(f, "Cancelled"),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_error_maps_to_reason() {
        assert_eq!(
            WorkError::ReadinessTimeout {
                waited: Duration::from_secs(90)
            }
            .reason(),
            ErrorReason::ReadinessTimeout
        );
        assert_eq!(
            WorkError::submission("输入框不存在").reason(),
            ErrorReason::SubmissionError("输入框不存在".to_string())
        );
        assert!(matches!(
            WorkError::Transport(BrowserError::Closed).reason(),
            ErrorReason::TransportError(_)
        ));
    }

    #[test]
    fn test_last_attempt_unwraps_nested_reason() {
        let reason = ErrorReason::RetryBudgetExhausted {
            last: Box::new(ErrorReason::ReadinessTimeout),
        };
        assert_eq!(reason.last_attempt(), &ErrorReason::ReadinessTimeout);
        assert_eq!(
            reason.to_string(),
            "RetryBudgetExhausted (last: ReadinessTimeout)"
        );
    }

    #[test]
    fn test_reason_serializes_with_kind_tag() {
        let json = serde_json::to_value(ErrorReason::SubmissionError("x".into())).unwrap();
        assert_eq!(json["kind"], "submission_error");
        assert_eq!(json["detail"], "x");
    }
}
