//! 远程会话能力接口
//!
//! 调度核心只通过这几个 trait 操作会话，不关心页面结构

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::BrowserError;
use crate::models::SessionSpec;

/// 验证组件在页面上的位置
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WidgetBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub visible: bool,
}

impl WidgetBounds {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// 一个独立的执行上下文（标签页），只属于一个槽位
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    async fn evaluate(&self, script: &str) -> Result<JsonValue, BrowserError>;

    /// 当前页面上出现的验证关卡标记
    async fn get_page_markers(&self) -> Result<HashSet<String>, BrowserError>;

    /// 验证组件的位置，找不到时返回 None
    async fn locate_challenge_widget(&self) -> Result<Option<WidgetBounds>, BrowserError>;

    async fn synthesize_pointer_click(&self, x: f64, y: f64) -> Result<(), BrowserError>;

    /// 把本地文件交给页面上的文件输入框
    async fn set_input_files(&self, selector: &str, files: &[PathBuf]) -> Result<(), BrowserError>;
}

/// 一个已登录的远程会话，可以容纳多个执行上下文
#[async_trait]
pub trait RemoteSession: Send + Sync {
    fn session_id(&self) -> &str;

    async fn get_cookies(&self) -> Result<HashMap<String, String>, BrowserError>;

    /// 为槽位打开执行上下文，同一个 slot 只会调用一次
    async fn open_context(&self, slot: usize) -> Result<Arc<dyn ExecutionContext>, BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// 按凭据创建会话
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn open(&self, spec: &SessionSpec) -> Result<Arc<dyn RemoteSession>, BrowserError>;
}
