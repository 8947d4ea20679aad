//! 单元测试用的内存会话

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::time::Instant;

use crate::error::BrowserError;
use crate::infrastructure::{ExecutionContext, RemoteSession, WidgetBounds};

pub(crate) struct FakeContext {
    markers: Option<HashSet<String>>,
    widget: Option<WidgetBounds>,
    pub marker_calls: AtomicU32,
    clicks: Mutex<Vec<(f64, f64)>>,
    eval_result: JsonValue,
    calls: Mutex<Vec<String>>,
}

impl FakeContext {
    pub fn clean() -> Self {
        Self::with_markers(Some(HashSet::new()))
    }

    pub fn challenged(tokens: &[&str]) -> Self {
        Self::with_markers(Some(tokens.iter().map(|t| t.to_string()).collect()))
    }

    /// 读取标记总是失败
    pub fn broken() -> Self {
        Self::with_markers(None)
    }

    fn with_markers(markers: Option<HashSet<String>>) -> Self {
        Self {
            markers,
            widget: None,
            marker_calls: AtomicU32::new(0),
            clicks: Mutex::new(Vec::new()),
            eval_result: JsonValue::Null,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_eval_result(mut self, value: JsonValue) -> Self {
        self.eval_result = value;
        self
    }

    /// 按顺序记录的 evaluate / upload 调用
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn with_widget(mut self, widget: WidgetBounds) -> Self {
        self.widget = Some(widget);
        self
    }

    pub fn clicks(&self) -> Vec<(f64, f64)> {
        self.clicks.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionContext for FakeContext {
    async fn navigate(&self, _url: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<JsonValue, BrowserError> {
        self.calls.lock().unwrap().push("evaluate".to_string());
        Ok(self.eval_result.clone())
    }

    async fn get_page_markers(&self) -> Result<HashSet<String>, BrowserError> {
        self.marker_calls.fetch_add(1, Ordering::SeqCst);
        self.markers.clone().ok_or(BrowserError::ScriptFailed {
            reason: "document not ready".into(),
        })
    }

    async fn locate_challenge_widget(&self) -> Result<Option<WidgetBounds>, BrowserError> {
        match &self.markers {
            Some(_) => Ok(self.widget),
            None => Err(BrowserError::ScriptFailed {
                reason: "document not ready".into(),
            }),
        }
    }

    async fn synthesize_pointer_click(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.clicks.lock().unwrap().push((x, y));
        Ok(())
    }

    async fn set_input_files(&self, selector: &str, files: &[PathBuf]) -> Result<(), BrowserError> {
        if self.markers.is_none() {
            return Err(BrowserError::UploadFailed {
                selector: selector.to_string(),
                reason: "node not found".into(),
            });
        }
        let files: Vec<String> = files.iter().map(|f| f.display().to_string()).collect();
        self.calls
            .lock()
            .unwrap()
            .push(format!("upload {} {}", selector, files.join(",")));
        Ok(())
    }
}

pub(crate) struct FakeSession {
    id: String,
    created: Instant,
    cookie_after: Option<(Duration, String, String)>,
}

impl FakeSession {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            created: Instant::now(),
            cookie_after: None,
        }
    }

    /// `after` 之后 cookie 中出现 `name=value`
    pub fn with_cookie_after(mut self, after: Duration, name: &str, value: &str) -> Self {
        self.cookie_after = Some((after, name.to_string(), value.to_string()));
        self
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    async fn get_cookies(&self) -> Result<HashMap<String, String>, BrowserError> {
        let mut cookies = HashMap::new();
        if let Some((after, name, value)) = &self.cookie_after {
            if self.created.elapsed() >= *after {
                cookies.insert(name.clone(), value.clone());
            }
        }
        Ok(cookies)
    }

    async fn open_context(&self, _slot: usize) -> Result<Arc<dyn ExecutionContext>, BrowserError> {
        Ok(Arc::new(FakeContext::clean()))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}
