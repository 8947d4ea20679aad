//! 单次尝试的页面操作接口
//!
//! 槽位只负责调度，"怎么提交、怎么判断好了、怎么取产物"都交给实现方

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::WorkError;
use crate::infrastructure::ExecutionContext;
use crate::models::{ArtifactRef, WorkItem};

/// 提交后页面返回的信息
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub id: Option<String>,
    pub raw: JsonValue,
}

/// 通过就绪判断的产物描述
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub raw: JsonValue,
}

#[async_trait]
pub trait WorkDriver: Send + Sync {
    /// 把执行上下文恢复到已知的初始页面
    async fn reset(&self, ctx: &dyn ExecutionContext) -> Result<(), WorkError>;

    async fn submit(
        &self,
        ctx: &dyn ExecutionContext,
        item: &WorkItem,
    ) -> Result<Submission, WorkError>;

    /// 就绪判断，未就绪返回 `Ok(None)`
    ///
    /// 内容被拒绝时返回 `Submission` 错误
    async fn check_ready(
        &self,
        ctx: &dyn ExecutionContext,
        submission: &Submission,
    ) -> Result<Option<Artifact>, WorkError>;

    async fn fetch(
        &self,
        ctx: &dyn ExecutionContext,
        item: &WorkItem,
        artifact: Artifact,
    ) -> Result<Vec<ArtifactRef>, WorkError>;
}
