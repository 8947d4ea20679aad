use std::path::PathBuf;

use chromiumoxide::{Browser, BrowserConfig};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::browser::connection::drive_handler;
use crate::config::Config;
use crate::error::BrowserError;

/// 启动浏览器的参数
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    /// 每个账号在其下使用独立的 profile 目录
    pub profile_root: PathBuf,
}

impl LaunchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            headless: config.headless,
            chrome_executable: config.chrome_executable.as_ref().map(PathBuf::from),
            profile_root: PathBuf::from(&config.output_dir).join("profiles"),
        }
    }

    fn profile_dir(&self, session_id: &str) -> PathBuf {
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.profile_root.join(safe)
    }
}

/// 为一个会话启动独立的浏览器
pub async fn launch_browser(
    options: &LaunchOptions,
    session_id: &str,
) -> Result<(Browser, JoinHandle<()>), BrowserError> {
    info!(
        "[会话 {}] 🚀 启动{}浏览器...",
        session_id,
        if options.headless { "无头" } else { "" }
    );

    let mut builder = BrowserConfig::builder();
    builder = if options.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(executable) = &options.chrome_executable {
        builder = builder.chrome_executable(executable);
    }

    let config = builder
        .user_data_dir(options.profile_dir(session_id))
        .window_size(1920, 1080)
        .args(vec![
            "--disable-blink-features=AutomationControlled",
            "--mute-audio",
            "--disable-dev-shm-usage",
            "--no-first-run",
        ])
        .build()
        .map_err(|e| {
            error!("配置浏览器失败: {}", e);
            BrowserError::LaunchFailed {
                reason: format!("配置浏览器失败: {}", e),
            }
        })?;

    let (browser, handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        BrowserError::LaunchFailed {
            reason: e.to_string(),
        }
    })?;
    debug!("[会话 {}] 浏览器启动成功", session_id);

    let handler_task = drive_handler(handler).await;
    Ok((browser, handler_task))
}
