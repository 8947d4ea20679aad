//! JS 执行器 - 基础设施层
//!
//! 持有一个 page 资源，只暴露"执行 JS"和最基本的页面操作

use std::path::PathBuf;

use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::layout::Point;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::BrowserError;

/// JS 执行器
///
/// 职责：
/// - 持有一个 Page 资源（一个槽位一个）
/// - 暴露 eval() / goto() / click() / 上传文件能力
/// - 不认识 WorkItem / Task
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 执行 JS 代码并返回 JSON 结果
    ///
    /// 脚本返回 undefined 时得到 `JsonValue::Null`
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue, BrowserError> {
        let result = self
            .page
            .evaluate(js_code.into())
            .await
            .map_err(|e| BrowserError::ScriptFailed {
                reason: e.to_string(),
            })?;
        Ok(result.value().cloned().unwrap_or(JsonValue::Null))
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(
        &self,
        js_code: impl Into<String>,
    ) -> Result<T, BrowserError> {
        let json_value = self.eval(js_code).await?;
        serde_json::from_value(json_value).map_err(|e| BrowserError::ScriptFailed {
            reason: format!("脚本返回值无法解析: {}", e),
        })
    }

    /// 导航到指定 URL 并等待加载
    pub async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// 在指定坐标模拟一次鼠标点击
    pub async fn click_at(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.page
            .click(Point::new(x, y))
            .await
            .map_err(|e| BrowserError::InputFailed {
                x,
                y,
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// 写入 cookie
    pub async fn set_cookies(&self, cookies: Vec<CookieParam>) -> Result<(), BrowserError> {
        self.page
            .set_cookies(cookies)
            .await
            .map_err(|e| BrowserError::CookieFailed {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// 给匹配 selector 的文件输入框设置本地文件
    ///
    /// 路径先转成绝对路径，浏览器进程的工作目录不一定和这里相同
    pub async fn set_input_files(
        &self,
        selector: &str,
        files: &[PathBuf],
    ) -> Result<(), BrowserError> {
        let upload_err = |reason: String| BrowserError::UploadFailed {
            selector: selector.to_string(),
            reason,
        };

        let mut absolute = Vec::with_capacity(files.len());
        for file in files {
            let path = tokio::fs::canonicalize(file)
                .await
                .map_err(|e| upload_err(format!("{}: {}", file.display(), e)))?;
            absolute.push(path.display().to_string());
        }

        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        let params = SetFileInputFilesParams::builder()
            .files(absolute)
            .node_id(element.node_id)
            .build()
            .map_err(upload_err)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        Ok(())
    }
}
