//! 单次处理记录

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorReason;
use crate::models::work_item::WorkItem;

/// Task 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// 产物引用（URL 或本地路径）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(pub String);

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 指向 WorkItem 的快照，`retry_count` 是本次尝试时的值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemRef {
    pub sequence_index: usize,
    pub retry_count: u32,
    pub batch_tag: String,
}

impl From<&WorkItem> for WorkItemRef {
    fn from(item: &WorkItem) -> Self {
        Self {
            sequence_index: item.sequence_index,
            retry_count: item.retry_count,
            batch_tag: item.batch_tag.clone(),
        }
    }
}

/// 一次处理尝试及其结果
///
/// 只由持有它的槽位修改；`completed` 或不再重试的 `failed` 即为终态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub work_item: WorkItemRef,
    /// 未经任何会话处理就结束的 Task 为 None
    pub session_id: Option<String>,
    pub status: TaskStatus,
    pub artifact_refs: Vec<ArtifactRef>,
    pub error_reason: Option<ErrorReason>,
    pub created_at: DateTime<Local>,
    pub completed_at: Option<DateTime<Local>>,
}

impl Task {
    /// 槽位取出 WorkItem 时创建
    pub fn start(item: &WorkItem, session_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            work_item: WorkItemRef::from(item),
            session_id: Some(session_id.to_string()),
            status: TaskStatus::Running,
            artifact_refs: Vec::new(),
            error_reason: None,
            created_at: Local::now(),
            completed_at: None,
        }
    }

    /// 批次结束时仍留在队列中的 WorkItem
    pub fn unattempted(item: &WorkItem, reason: ErrorReason) -> Self {
        let mut task = Self {
            id: Uuid::new_v4(),
            work_item: WorkItemRef::from(item),
            session_id: None,
            status: TaskStatus::Pending,
            artifact_refs: Vec::new(),
            error_reason: None,
            created_at: Local::now(),
            completed_at: None,
        };
        task.fail(reason);
        task
    }

    pub fn complete(&mut self, artifact_refs: Vec<ArtifactRef>) {
        self.status = TaskStatus::Completed;
        self.artifact_refs = artifact_refs;
        self.error_reason = None;
        self.completed_at = Some(Local::now());
    }

    pub fn fail(&mut self, reason: ErrorReason) {
        self.status = TaskStatus::Failed;
        self.error_reason = Some(reason);
        self.completed_at = Some(Local::now());
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// 交给调用方的完成通知
    pub fn report(&self) -> TaskReport {
        let outcome = match (&self.status, &self.error_reason) {
            (TaskStatus::Failed, Some(reason)) => TaskOutcome::Error(reason.clone()),
            _ => TaskOutcome::Artifacts(self.artifact_refs.clone()),
        };
        TaskReport {
            work_item_index: self.work_item.sequence_index,
            status: self.status,
            outcome,
        }
    }
}

/// 任务完成通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub work_item_index: usize,
    pub status: TaskStatus,
    pub outcome: TaskOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Artifacts(Vec<ArtifactRef>),
    Error(ErrorReason),
}
