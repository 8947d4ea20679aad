use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::ChallengeKind;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 每个会话的并发槽位数（1-3）
    pub slots_per_session: usize,
    /// 单个 WorkItem 最多重试次数
    pub max_retries: u32,
    /// 会话之间的启动间隔
    pub session_stagger: Duration,
    /// 单个 WorkItem 从第一次派发开始的总时限（跨所有重试）
    pub item_deadline: Duration,
    /// 一次尝试失败后槽位的冷却时间
    pub retry_delay: Duration,
    /// 队列为空但仍有在途任务时的轮询间隔
    pub dequeue_backoff: Duration,
    /// 连续多少次传输错误后判定会话不健康
    pub transport_failure_threshold: u32,
    /// 启动会话的最多尝试次数
    pub session_start_attempts: u32,
    pub challenge: ChallengeConfig,
    pub readiness: ReadinessConfig,
    /// 通过验证后 clearance 凭据的缓存时长
    pub clearance_ttl: Duration,
    // --- 浏览器配置 ---
    pub headless: bool,
    pub chrome_executable: Option<String>,
    /// 设置后连接已有浏览器，而不是为每个账号启动新浏览器
    pub browser_debug_port: Option<u16>,
    /// 目标URL
    pub target_url: String,
    // --- 文件配置 ---
    pub job_file: String,
    pub output_dir: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

/// 验证关卡相关配置
#[derive(Clone, Debug)]
pub struct ChallengeConfig {
    pub poll_interval: Duration,
    /// 两次点击之间的最小间隔
    pub click_cooldown: Duration,
    pub timeout: Duration,
    pub clearance_cookie: String,
    pub markers: Vec<ChallengeMarker>,
    pub widget_selector: String,
}

/// 页面上可识别的验证关卡标记
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeMarker {
    pub token: String,
    pub kind: ChallengeKind,
}

impl ChallengeMarker {
    pub fn new(token: impl Into<String>, kind: ChallengeKind) -> Self {
        Self {
            token: token.into(),
            kind,
        }
    }
}

/// 产物就绪轮询配置
#[derive(Clone, Debug)]
pub struct ReadinessConfig {
    pub interval: Duration,
    pub image_timeout: Duration,
    pub video_timeout: Duration,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            click_cooldown: Duration::from_secs(10),
            timeout: Duration::from_secs(90),
            clearance_cookie: "cf_clearance".to_string(),
            markers: vec![
                ChallengeMarker::new("cType: 'non-interactive'", ChallengeKind::Passive),
                ChallengeMarker::new("cType: 'managed'", ChallengeKind::Managed),
                ChallengeMarker::new("cType: 'interactive'", ChallengeKind::Interactive),
                ChallengeMarker::new("cf-turnstile", ChallengeKind::Interactive),
                ChallengeMarker::new("challenge-platform", ChallengeKind::Managed),
                ChallengeMarker::new("Just a moment", ChallengeKind::Passive),
                ChallengeMarker::new("Checking your browser", ChallengeKind::Passive),
            ],
            widget_selector: r#"iframe[src*="challenges.cloudflare.com"], .cf-turnstile iframe"#
                .to_string(),
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            image_timeout: Duration::from_secs(90),
            video_timeout: Duration::from_secs(600),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slots_per_session: 3,
            max_retries: 3,
            session_stagger: Duration::from_secs(3),
            item_deadline: Duration::from_secs(30 * 60),
            retry_delay: Duration::from_secs(2),
            dequeue_backoff: Duration::from_millis(500),
            transport_failure_threshold: 3,
            session_start_attempts: 2,
            challenge: ChallengeConfig::default(),
            readiness: ReadinessConfig::default(),
            clearance_ttl: Duration::from_secs(30 * 60),
            headless: true,
            chrome_executable: None,
            browser_debug_port: None,
            target_url: "https://grok.com/imagine".to_string(),
            job_file: "job.toml".to_string(),
            output_dir: "output".to_string(),
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从环境变量读取配置，未设置的项使用默认值
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();
        let config = Self {
            slots_per_session: env_or("SLOTS_PER_SESSION", default.slots_per_session)?,
            max_retries: env_or("MAX_RETRIES", default.max_retries)?,
            session_stagger: env_secs("SESSION_STAGGER_SECS", default.session_stagger)?,
            item_deadline: env_secs("ITEM_DEADLINE_SECS", default.item_deadline)?,
            retry_delay: env_secs("RETRY_DELAY_SECS", default.retry_delay)?,
            dequeue_backoff: Duration::from_millis(env_or(
                "DEQUEUE_BACKOFF_MS",
                default.dequeue_backoff.as_millis() as u64,
            )?),
            transport_failure_threshold: env_or(
                "TRANSPORT_FAILURE_THRESHOLD",
                default.transport_failure_threshold,
            )?,
            session_start_attempts: env_or(
                "SESSION_START_ATTEMPTS",
                default.session_start_attempts,
            )?,
            challenge: ChallengeConfig {
                poll_interval: env_secs(
                    "CHALLENGE_POLL_INTERVAL_SECS",
                    default.challenge.poll_interval,
                )?,
                click_cooldown: env_secs(
                    "CHALLENGE_CLICK_COOLDOWN_SECS",
                    default.challenge.click_cooldown,
                )?,
                timeout: env_secs("CHALLENGE_TIMEOUT_SECS", default.challenge.timeout)?,
                clearance_cookie: std::env::var("CLEARANCE_COOKIE")
                    .unwrap_or(default.challenge.clearance_cookie),
                markers: default.challenge.markers,
                widget_selector: std::env::var("CHALLENGE_WIDGET_SELECTOR")
                    .unwrap_or(default.challenge.widget_selector),
            },
            readiness: ReadinessConfig {
                interval: env_secs("READINESS_INTERVAL_SECS", default.readiness.interval)?,
                image_timeout: env_secs(
                    "READINESS_IMAGE_TIMEOUT_SECS",
                    default.readiness.image_timeout,
                )?,
                video_timeout: env_secs(
                    "READINESS_VIDEO_TIMEOUT_SECS",
                    default.readiness.video_timeout,
                )?,
            },
            clearance_ttl: env_secs("CLEARANCE_TTL_SECS", default.clearance_ttl)?,
            headless: env_or("HEADLESS", default.headless)?,
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok(),
            browser_debug_port: match std::env::var("BROWSER_DEBUG_PORT") {
                Ok(v) => Some(parse_value("BROWSER_DEBUG_PORT", &v)?),
                Err(_) => None,
            },
            target_url: std::env::var("TARGET_URL").unwrap_or(default.target_url),
            job_file: std::env::var("JOB_FILE").unwrap_or(default.job_file),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or(default.output_dir),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            verbose_logging: env_or("VERBOSE_LOGGING", default.verbose_logging)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// 检查配置之间的约束
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3).contains(&self.slots_per_session) {
            return Err(invalid("slots_per_session", "必须在 1 到 3 之间"));
        }
        if self.challenge.poll_interval.is_zero() || self.readiness.interval.is_zero() {
            return Err(invalid("interval", "轮询间隔不能为 0"));
        }
        if self.challenge.timeout < self.challenge.poll_interval {
            return Err(invalid("challenge.timeout", "不能小于轮询间隔"));
        }
        if self.session_start_attempts == 0 {
            return Err(invalid("session_start_attempts", "至少为 1"));
        }
        if self.transport_failure_threshold == 0 {
            return Err(invalid("transport_failure_threshold", "至少为 1"));
        }
        if self.challenge.clearance_cookie.is_empty() {
            return Err(invalid("challenge.clearance_cookie", "不能为空"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value<T: FromStr>(var_name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            value: value.to_string(),
            expected_type: std::any::type_name::<T>().to_string(),
        })
}

fn env_or<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var_name) {
        Ok(v) => parse_value(var_name, &v),
        Err(_) => Ok(default),
    }
}

fn env_secs(var_name: &str, default: Duration) -> Result<Duration, ConfigError> {
    env_or(var_name, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        tokio_test::assert_ok!(Config::default().validate());
    }

    #[test]
    fn test_slots_out_of_range_rejected() {
        let config = Config {
            slots_per_session: 4,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "slots_per_session"));
    }

    #[test]
    fn test_parse_value_reports_var_name() {
        let err = parse_value::<u32>("MAX_RETRIES", "three").unwrap_err();
        assert!(err.to_string().contains("MAX_RETRIES"));
        assert_eq!(parse_value::<u32>("MAX_RETRIES", " 5 ").unwrap(), 5);
    }
}
