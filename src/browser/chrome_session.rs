//! 基于 chromiumoxide 的会话实现
//!
//! 一个账号一个浏览器，一个槽位一个标签页

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::{Browser, Page};
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::connection::connect_to_browser;
use crate::browser::headless::{launch_browser, LaunchOptions};
use crate::config::Config;
use crate::error::BrowserError;
use crate::infrastructure::{
    ExecutionContext, JsExecutor, RemoteSession, SessionProvider, WidgetBounds,
};
use crate::models::SessionSpec;

/// 按账号启动浏览器会话
pub struct ChromeSessionProvider {
    launch: LaunchOptions,
    debug_port: Option<u16>,
    markers: Arc<Vec<String>>,
    widget_selector: Arc<String>,
}

impl ChromeSessionProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            launch: LaunchOptions::from_config(config),
            debug_port: config.browser_debug_port,
            markers: Arc::new(
                config
                    .challenge
                    .markers
                    .iter()
                    .map(|m| m.token.clone())
                    .collect(),
            ),
            widget_selector: Arc::new(config.challenge.widget_selector.clone()),
        }
    }

    /// 先打开目标站点的轻量页面，再写入 cookie
    async fn inject_cookies(
        executor: &JsExecutor,
        spec: &SessionSpec,
    ) -> Result<(), BrowserError> {
        let url = reqwest::Url::parse(&spec.target_url).map_err(|e| {
            BrowserError::NavigationFailed {
                url: spec.target_url.clone(),
                reason: e.to_string(),
            }
        })?;
        let host = url.host_str().unwrap_or_default().to_string();
        let favicon = format!("{}/favicon.ico", url.origin().ascii_serialization());

        if let Err(e) = executor.goto(&favicon).await {
            warn!("[会话 {}] ⚠️ 打开 {} 失败: {}", spec.session_id, favicon, e);
        }

        let mut params = Vec::with_capacity(spec.seed_cookies.len());
        for (name, value) in &spec.seed_cookies {
            let param = CookieParam::builder()
                .name(name.clone())
                .value(value.clone())
                .domain(format!(".{}", host.trim_start_matches("www.")))
                .path("/")
                .secure(true)
                .build()
                .map_err(|reason| BrowserError::CookieFailed { reason })?;
            params.push(param);
        }
        executor.set_cookies(params).await?;
        info!(
            "[会话 {}] 🍪 已注入 {} 个 cookie",
            spec.session_id,
            spec.seed_cookies.len()
        );
        Ok(())
    }
}

#[async_trait]
impl SessionProvider for ChromeSessionProvider {
    async fn open(&self, spec: &SessionSpec) -> Result<Arc<dyn RemoteSession>, BrowserError> {
        let (browser, handler_task) = match self.debug_port {
            Some(port) => connect_to_browser(port).await?,
            None => launch_browser(&self.launch, &spec.session_id).await?,
        };

        let page = browser.new_page("about:blank").await.map_err(|e| {
            BrowserError::PageCreationFailed {
                reason: e.to_string(),
            }
        })?;
        let executor = JsExecutor::new(page.clone());

        if !spec.seed_cookies.is_empty() {
            Self::inject_cookies(&executor, spec).await?;
        }

        Ok(Arc::new(ChromeSession {
            session_id: spec.session_id.clone(),
            browser: tokio::sync::Mutex::new(Some(browser)),
            handler_task: Mutex::new(Some(handler_task)),
            cookie_page: page.clone(),
            main_page: Mutex::new(Some(page)),
            markers: Arc::clone(&self.markers),
            widget_selector: Arc::clone(&self.widget_selector),
        }))
    }
}

/// 一个账号对应的浏览器
pub struct ChromeSession {
    session_id: String,
    browser: tokio::sync::Mutex<Option<Browser>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    cookie_page: Page,
    /// 第一个槽位直接复用启动时的页面
    main_page: Mutex<Option<Page>>,
    markers: Arc<Vec<String>>,
    widget_selector: Arc<String>,
}

#[async_trait]
impl RemoteSession for ChromeSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn get_cookies(&self) -> Result<HashMap<String, String>, BrowserError> {
        let cookies = self
            .cookie_page
            .get_cookies()
            .await
            .map_err(|e| BrowserError::CookieFailed {
                reason: e.to_string(),
            })?;
        Ok(cookies.into_iter().map(|c| (c.name, c.value)).collect())
    }

    async fn open_context(&self, slot: usize) -> Result<Arc<dyn ExecutionContext>, BrowserError> {
        let reused = if slot == 0 {
            self.main_page.lock().unwrap_or_else(|e| e.into_inner()).take()
        } else {
            None
        };

        let page = match reused {
            Some(page) => page,
            None => {
                let guard = self.browser.lock().await;
                let browser = guard.as_ref().ok_or(BrowserError::Closed)?;
                browser.new_page("about:blank").await.map_err(|e| {
                    BrowserError::PageCreationFailed {
                        reason: e.to_string(),
                    }
                })?
            }
        };
        debug!("[会话 {}] 📑 槽位 {} 页面已创建", self.session_id, slot + 1);

        Ok(Arc::new(ChromeTab {
            executor: JsExecutor::new(page),
            markers: Arc::clone(&self.markers),
            widget_selector: Arc::clone(&self.widget_selector),
        }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let browser = self.browser.lock().await.take();
        let result = match browser {
            Some(mut browser) => match browser.close().await {
                Ok(_) => {
                    let _ = browser.wait().await;
                    Ok(())
                }
                Err(e) => Err(BrowserError::ScriptFailed {
                    reason: format!("关闭浏览器失败: {}", e),
                }),
            },
            None => Ok(()),
        };

        if let Some(task) = self
            .handler_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        result
    }
}

/// 一个标签页
pub struct ChromeTab {
    executor: JsExecutor,
    markers: Arc<Vec<String>>,
    widget_selector: Arc<String>,
}

impl ChromeTab {
    fn widget_script(selector: &str) -> Result<String, BrowserError> {
        let selector_json =
            serde_json::to_string(selector).map_err(|e| BrowserError::ScriptFailed {
                reason: e.to_string(),
            })?;
        // 组件可能在 shadow root 里，逐层向下找
        Ok(format!(
            r#"
            (() => {{
                const selector = {};
                const find = (root) => {{
                    const hit = root.querySelector(selector);
                    if (hit) return hit;
                    for (const el of root.querySelectorAll('*')) {{
                        if (el.shadowRoot) {{
                            const inner = find(el.shadowRoot);
                            if (inner) return inner;
                        }}
                    }}
                    return null;
                }};
                const el = find(document);
                if (!el) return null;
                const r = el.getBoundingClientRect();
                const style = window.getComputedStyle(el);
                return {{
                    x: r.x, y: r.y, width: r.width, height: r.height,
                    visible: style.display !== 'none' && style.visibility !== 'hidden'
                        && r.width > 0 && r.height > 0
                }};
            }})()
            "#,
            selector_json
        ))
    }
}

#[async_trait]
impl ExecutionContext for ChromeTab {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.executor.goto(url).await
    }

    async fn evaluate(&self, script: &str) -> Result<JsonValue, BrowserError> {
        self.executor.eval(script).await
    }

    async fn get_page_markers(&self) -> Result<HashSet<String>, BrowserError> {
        let html: String = self
            .executor
            .eval_as("document.documentElement ? document.documentElement.outerHTML : ''")
            .await?;
        Ok(self
            .markers
            .iter()
            .filter(|marker| html.contains(marker.as_str()))
            .cloned()
            .collect())
    }

    async fn locate_challenge_widget(&self) -> Result<Option<WidgetBounds>, BrowserError> {
        let value = self
            .executor
            .eval(Self::widget_script(&self.widget_selector)?)
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| BrowserError::ScriptFailed {
                reason: format!("组件位置无法解析: {}", e),
            })
    }

    async fn synthesize_pointer_click(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.executor.click_at(x, y).await
    }

    async fn set_input_files(&self, selector: &str, files: &[PathBuf]) -> Result<(), BrowserError> {
        self.executor.set_input_files(selector, files).await
    }
}
