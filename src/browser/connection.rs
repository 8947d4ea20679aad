use std::time::Duration;

use chromiumoxide::{Browser, Handler};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::BrowserError;

/// 浏览器刚连上时给 CDP 状态同步的时间
const SETTLE_DELAY: Duration = Duration::from_millis(300);

/// 连接到已经打开调试端口的浏览器
///
/// 返回浏览器和后台事件处理任务
pub async fn connect_to_browser(port: u16) -> Result<(Browser, JoinHandle<()>), BrowserError> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        BrowserError::LaunchFailed {
            reason: format!("无法连接到浏览器 (端口: {}): {}", port, e),
        }
    })?;
    debug!("浏览器连接成功");

    Ok((browser, drive_handler(handler).await))
}

/// 在后台消费 CDP 事件，连接断开时结束
pub(crate) async fn drive_handler(mut handler: Handler) -> JoinHandle<()> {
    let task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("浏览器事件流结束: {}", e);
                break;
            }
        }
    });
    sleep(SETTLE_DELAY).await;
    task
}
