//! 产物下载 - 业务能力层
//!
//! 只负责把 URL 下载到输出目录，每个 URL 自带少量重试

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::WorkError;
use crate::models::ArtifactRef;

/// 每个 URL 的下载次数（首次 + 2 次重试）
const DOWNLOAD_ATTEMPTS: u32 = 3;

pub struct ArtifactFetcher {
    client: reqwest::Client,
    output_dir: PathBuf,
    retry_delay: Duration,
}

impl ArtifactFetcher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            output_dir: output_dir.into(),
            retry_delay: Duration::from_secs(2),
        }
    }

    /// 下载全部 URL，返回本地路径
    ///
    /// 任意一个 URL 重试后仍失败，整体返回 `ArtifactFetch`
    pub async fn fetch_all(&self, urls: &[String], stem: &str) -> Result<Vec<ArtifactRef>, WorkError> {
        if urls.is_empty() {
            return Err(WorkError::artifact_fetch("没有可下载的产物"));
        }

        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| WorkError::artifact_fetch(format!("创建输出目录失败: {}", e)))?;

        let mut saved = Vec::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            let dest = self.output_dir.join(file_name(stem, index, url));
            self.download_with_retry(url, &dest).await?;
            info!("💾 已保存: {}", dest.display());
            saved.push(ArtifactRef(dest.display().to_string()));
        }
        Ok(saved)
    }

    async fn download_with_retry(&self, url: &str, dest: &Path) -> Result<(), WorkError> {
        let mut last_error = String::new();
        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            match self.download(url, dest).await {
                Ok(bytes) => {
                    debug!("下载完成 {} ({} 字节)", url, bytes);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "⚠️ 下载失败 (第 {}/{} 次) {}: {}",
                        attempt, DOWNLOAD_ATTEMPTS, url, e
                    );
                    last_error = e;
                }
            }
            if attempt < DOWNLOAD_ATTEMPTS {
                sleep(self.retry_delay).await;
            }
        }
        Err(WorkError::artifact_fetch(format!("{}: {}", url, last_error)))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<usize, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| e.to_string())?;
        if body.is_empty() {
            return Err("响应为空".to_string());
        }

        fs::write(dest, &body)
            .await
            .map_err(|e| format!("写入 {} 失败: {}", dest.display(), e))?;
        Ok(body.len())
    }
}

/// `<stem>_<n>.<ext>`，扩展名取自 URL 路径，取不到时用 bin
fn file_name(stem: &str, index: usize, url: &str) -> String {
    let ext = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .and_then(|last| {
            last.rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
        })
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    format!("{}_{}.{}", stem, index + 1, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_uses_url_extension() {
        assert_eq!(
            file_name("b1_003", 0, "https://cdn.example.com/a/b/video.MP4?sig=1"),
            "b1_003_1.mp4"
        );
        assert_eq!(
            file_name("b1_003", 1, "https://cdn.example.com/render"),
            "b1_003_2.bin"
        );
        assert_eq!(file_name("x", 0, "not a url"), "x_1.bin");
    }

    #[tokio::test]
    async fn test_empty_url_list_is_fetch_error() {
        let fetcher = ArtifactFetcher::new(std::env::temp_dir());
        let err = fetcher.fetch_all(&[], "x").await.unwrap_err();
        assert!(matches!(err, WorkError::ArtifactFetch { .. }));
    }
}
