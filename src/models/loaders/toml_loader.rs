use std::path::Path;

use serde::Deserialize;
use tokio::fs;

use crate::error::FileError;
use crate::models::session::Credential;
use crate::models::work_item::{Payload, WorkItem};

/// 批次任务文件
///
/// ```toml
/// batch_tag = "2026-10-15"
///
/// [driver]
/// baseline_url = "https://example.com/create"
/// submit_js = "..."
/// ready_js = "..."
/// fetch_js = "..."
/// upload_selector = "input[type=file]"
///
/// [[credentials]]
/// label = "a@example.com"
/// cookies = { sso = "..." }
///
/// [[items]]
/// prompt = "a red fox"
/// class = "video"
///
/// [[items]]
/// prompt = "make it move"
/// attachment = "inputs/fox.png"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    #[serde(default = "default_batch_tag")]
    pub batch_tag: String,
    pub driver: DriverScripts,
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub items: Vec<Payload>,
}

/// 页面脚本，`{{payload}}` / `{{submission}}` 会被替换为 JSON
#[derive(Debug, Clone, Deserialize)]
pub struct DriverScripts {
    /// 每次尝试前回到的页面
    pub baseline_url: String,
    /// 提交内容，返回 `{ok, id?, error?}`
    pub submit_js: String,
    /// 就绪判断，未就绪返回 null，被拒绝返回 `{rejected: true}`
    pub ready_js: String,
    /// 返回产物 URL 数组
    pub fetch_js: String,
    /// 带附件的任务在提交前把文件设置到这个输入框
    #[serde(default)]
    pub upload_selector: Option<String>,
}

fn default_batch_tag() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

impl JobFile {
    /// 按文件中的顺序生成 WorkItem
    pub fn work_items(&self) -> Vec<WorkItem> {
        self.items
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, payload)| WorkItem::new(index, payload, self.batch_tag.clone()))
            .collect()
    }
}

/// 从 TOML 文件加载批次任务
pub async fn load_job_file(path: &Path) -> Result<JobFile, FileError> {
    let path_text = path.display().to_string();
    if !path.exists() {
        return Err(FileError::NotFound { path: path_text });
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|source| FileError::ReadFailed {
            path: path_text.clone(),
            source,
        })?;

    let job: JobFile = toml::from_str(&content).map_err(|source| FileError::TomlParseFailed {
        path: path_text.clone(),
        source,
    })?;

    tracing::info!(
        "成功加载任务文件 {}: {} 个账号, {} 个任务",
        path_text,
        job.credentials.len(),
        job.items.len()
    );

    Ok(job)
}
