//! 待处理的工作单元

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::ReadinessConfig;

/// 产物类型，决定就绪等待的时长
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactClass {
    Image,
    #[default]
    Video,
}

impl ArtifactClass {
    /// 该类产物的就绪超时
    pub fn readiness_timeout(self, config: &ReadinessConfig) -> Duration {
        match self {
            ArtifactClass::Image => config.image_timeout,
            ArtifactClass::Video => config.video_timeout,
        }
    }
}

/// 提交内容（不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub prompt: String,
    #[serde(default)]
    pub class: ArtifactClass,
    /// 图生视频等模式下需要上传的文件
    #[serde(default)]
    pub attachment: Option<PathBuf>,
    /// 画幅、时长等附加参数
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl Payload {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            class: ArtifactClass::default(),
            attachment: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_class(mut self, class: ArtifactClass) -> Self {
        self.class = class;
        self
    }
}

/// 队列中的一个工作单元
///
/// payload 在整个生命周期内不变，只有 `retry_count` 随重新入队递增
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub sequence_index: usize,
    pub payload: Arc<Payload>,
    pub retry_count: u32,
    pub batch_tag: String,
    first_dispatched_at: Option<Instant>,
}

impl WorkItem {
    pub fn new(sequence_index: usize, payload: Payload, batch_tag: impl Into<String>) -> Self {
        Self {
            sequence_index,
            payload: Arc::new(payload),
            retry_count: 0,
            batch_tag: batch_tag.into(),
            first_dispatched_at: None,
        }
    }

    /// 记录第一次派发的时间，之后的调用不会覆盖
    pub fn mark_dispatched(&mut self) -> Instant {
        *self.first_dispatched_at.get_or_insert_with(Instant::now)
    }

    pub fn first_dispatched_at(&self) -> Option<Instant> {
        self.first_dispatched_at
    }

    /// 从第一次派发起是否已超过总时限
    pub fn deadline_passed(&self, deadline: Duration) -> bool {
        self.first_dispatched_at
            .map(|at| at.elapsed() >= deadline)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_dispatch_is_sticky() {
        let mut item = WorkItem::new(0, Payload::new("a cat"), "batch");
        assert!(!item.deadline_passed(Duration::from_secs(1)));

        let first = item.mark_dispatched();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(item.mark_dispatched(), first);
        assert!(item.deadline_passed(Duration::from_secs(5)));
        assert!(!item.deadline_passed(Duration::from_secs(6)));
    }

    #[test]
    fn test_payload_defaults_from_toml() {
        let payload: Payload = toml::from_str(r#"prompt = "sunset""#).unwrap();
        assert_eq!(payload.class, ArtifactClass::Video);
        assert!(payload.attachment.is_none());

        let image: Payload = toml::from_str(
            r#"
            prompt = "logo"
            class = "image"
            options = { aspect_ratio = "1:1" }
            "#,
        )
        .unwrap();
        assert_eq!(image.class, ArtifactClass::Image);
        assert_eq!(image.options["aspect_ratio"], "1:1");
    }

    #[test]
    fn test_readiness_timeout_by_class() {
        let config = ReadinessConfig::default();
        assert_eq!(
            ArtifactClass::Image.readiness_timeout(&config),
            Duration::from_secs(90)
        );
        assert_eq!(
            ArtifactClass::Video.readiness_timeout(&config),
            Duration::from_secs(600)
        );
    }
}
