//! 场景测试用的内存会话和驱动
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio::time::{sleep, Instant};

use session_batch::error::{BrowserError, WorkError};
use session_batch::infrastructure::{
    ExecutionContext, ManualClock, RemoteSession, SessionProvider, WidgetBounds,
};
use session_batch::models::{ArtifactRef, Credential, Payload, SessionSpec, StatusEvent, WorkItem};
use session_batch::services::{Artifact, BatchCallbacks, ClearanceCache, Submission, WorkDriver};
use session_batch::Config;

// ========== 会话 ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// 页面上没有验证标记
    Open,
    /// 验证标记一直存在，cookie 永远不出现
    Stuck,
}

pub struct FakeContext {
    gate: Gate,
}

#[async_trait]
impl ExecutionContext for FakeContext {
    async fn navigate(&self, _url: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<JsonValue, BrowserError> {
        Ok(JsonValue::Null)
    }

    async fn get_page_markers(&self) -> Result<HashSet<String>, BrowserError> {
        Ok(match self.gate {
            Gate::Open => HashSet::new(),
            Gate::Stuck => HashSet::from(["cf-turnstile".to_string()]),
        })
    }

    async fn locate_challenge_widget(&self) -> Result<Option<WidgetBounds>, BrowserError> {
        Ok(Some(WidgetBounds {
            x: 0.0,
            y: 0.0,
            width: 300.0,
            height: 65.0,
            visible: true,
        }))
    }

    async fn synthesize_pointer_click(&self, _x: f64, _y: f64) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn set_input_files(
        &self,
        _selector: &str,
        _files: &[PathBuf],
    ) -> Result<(), BrowserError> {
        Ok(())
    }
}

pub struct FakeSession {
    id: String,
    gate: Gate,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl RemoteSession for FakeSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    async fn get_cookies(&self) -> Result<HashMap<String, String>, BrowserError> {
        Ok(HashMap::new())
    }

    async fn open_context(&self, _slot: usize) -> Result<Arc<dyn ExecutionContext>, BrowserError> {
        Ok(Arc::new(FakeContext { gate: self.gate }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 按凭据 label 决定会话行为
#[derive(Default)]
pub struct FakeProvider {
    gates: HashMap<String, Gate>,
    broken: HashSet<String>,
    pub opened: Mutex<Vec<SessionSpec>>,
    pub closed: Arc<AtomicUsize>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate(mut self, label: &str, gate: Gate) -> Self {
        self.gates.insert(label.to_string(), gate);
        self
    }

    /// 该凭据每次启动都失败
    pub fn with_broken(mut self, label: &str) -> Self {
        self.broken.insert(label.to_string());
        self
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn open(&self, spec: &SessionSpec) -> Result<Arc<dyn RemoteSession>, BrowserError> {
        self.opened.lock().unwrap().push(spec.clone());
        if self.broken.contains(&spec.session_id) {
            return Err(BrowserError::LaunchFailed {
                reason: "profile locked".into(),
            });
        }
        Ok(Arc::new(FakeSession {
            id: spec.session_id.clone(),
            gate: self
                .gates
                .get(&spec.session_id)
                .copied()
                .unwrap_or(Gate::Open),
            closed: Arc::clone(&self.closed),
        }))
    }
}

// ========== 驱动 ==========

/// 可编排失败方式的驱动
///
/// 提交时把 WorkItem 放进 in_flight，取完产物或失败时移除；
/// 同一个 WorkItem 同时出现两次即记为冲突
#[derive(Default)]
pub struct FakeDriver {
    /// 每个 WorkItem 前 N 次提交失败
    pub submit_failures: u32,
    /// 前 N 次提交返回传输错误
    pub transport_failures: u32,
    /// 每次尝试前 N 次就绪判断返回未就绪
    pub pending_checks: u32,
    /// 就绪判断永远返回未就绪
    pub never_ready: bool,
    /// 就绪判断返回"被拒绝"
    pub reject_first: bool,

    pub submits: AtomicU32,
    pub checks: AtomicU32,
    pub submit_counts: Mutex<HashMap<usize, u32>>,
    pub check_counts: Mutex<HashMap<usize, u32>>,
    pub attempts: Mutex<Vec<(usize, u32)>>,
    pub in_flight: Mutex<HashSet<usize>>,
    pub max_in_flight: AtomicUsize,
    pub overlap_detected: AtomicBool,
    pub submitted_at: Mutex<HashMap<usize, Instant>>,
    pub fetched_at: Mutex<HashMap<usize, Instant>>,
}

impl FakeDriver {
    fn enter(&self, index: usize) {
        let mut in_flight = self.in_flight.lock().unwrap();
        if !in_flight.insert(index) {
            self.overlap_detected.store(true, Ordering::SeqCst);
        }
        self.max_in_flight
            .fetch_max(in_flight.len(), Ordering::SeqCst);
    }

    fn leave(&self, index: usize) {
        self.in_flight.lock().unwrap().remove(&index);
    }

    fn index_of(submission: &Submission) -> usize {
        submission.raw["index"].as_u64().unwrap_or_default() as usize
    }
}

#[async_trait]
impl WorkDriver for FakeDriver {
    async fn reset(&self, _ctx: &dyn ExecutionContext) -> Result<(), WorkError> {
        Ok(())
    }

    async fn submit(
        &self,
        _ctx: &dyn ExecutionContext,
        item: &WorkItem,
    ) -> Result<Submission, WorkError> {
        let total = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        let index = item.sequence_index;
        self.attempts.lock().unwrap().push((index, item.retry_count));
        self.enter(index);

        if total <= self.transport_failures {
            self.leave(index);
            return Err(WorkError::Transport(BrowserError::Closed));
        }

        let count = {
            let mut counts = self.submit_counts.lock().unwrap();
            let count = counts.entry(index).or_insert(0);
            *count += 1;
            *count
        };
        if count <= self.submit_failures {
            self.leave(index);
            return Err(WorkError::submission("prompt box missing"));
        }

        self.check_counts.lock().unwrap().insert(index, 0);
        self.submitted_at.lock().unwrap().insert(index, Instant::now());
        Ok(Submission {
            id: Some(format!("job-{}", index)),
            raw: json!({ "index": index }),
        })
    }

    async fn check_ready(
        &self,
        _ctx: &dyn ExecutionContext,
        submission: &Submission,
    ) -> Result<Option<Artifact>, WorkError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let index = Self::index_of(submission);

        if self.reject_first && self.attempts.lock().unwrap().len() == 1 {
            self.leave(index);
            return Err(WorkError::submission("artifact rejected"));
        }
        if self.never_ready {
            return Ok(None);
        }

        let seen = {
            let mut counts = self.check_counts.lock().unwrap();
            let seen = counts.entry(index).or_insert(0);
            *seen += 1;
            *seen
        };
        if seen <= self.pending_checks {
            return Ok(None);
        }
        Ok(Some(Artifact {
            raw: json!({ "url": format!("https://cdn.test/{}.mp4", index) }),
        }))
    }

    async fn fetch(
        &self,
        _ctx: &dyn ExecutionContext,
        item: &WorkItem,
        artifact: Artifact,
    ) -> Result<Vec<ArtifactRef>, WorkError> {
        // 留出时间让其他槽位交错执行
        sleep(Duration::from_millis(200)).await;
        self.fetched_at
            .lock()
            .unwrap()
            .insert(item.sequence_index, Instant::now());
        self.leave(item.sequence_index);
        let url = artifact.raw["url"].as_str().unwrap_or_default().to_string();
        Ok(vec![ArtifactRef(url)])
    }
}

// ========== 构造辅助 ==========

pub fn test_config() -> Config {
    Config::default()
}

pub fn cache() -> Arc<ClearanceCache> {
    Arc::new(ClearanceCache::new(
        Arc::new(ManualClock::new()),
        Duration::from_secs(1800),
    ))
}

pub fn work_items(n: usize) -> Vec<WorkItem> {
    (0..n)
        .map(|i| WorkItem::new(i, Payload::new(format!("prompt {}", i)), "test"))
        .collect()
}

pub fn credentials(labels: &[&str]) -> Vec<Credential> {
    labels.iter().map(|l| Credential::new(*l)).collect()
}

/// 记录所有回调
#[derive(Clone, Default)]
pub struct Recorder {
    pub statuses: Arc<Mutex<Vec<StatusEvent>>>,
    pub completions: Arc<Mutex<Vec<usize>>>,
}

impl Recorder {
    pub fn callbacks(&self) -> BatchCallbacks {
        let statuses = Arc::clone(&self.statuses);
        let completions = Arc::clone(&self.completions);
        BatchCallbacks::new(
            move |_, event| statuses.lock().unwrap().push(event.clone()),
            move |report| completions.lock().unwrap().push(report.work_item_index),
        )
    }

    pub fn count(&self, predicate: impl Fn(&StatusEvent) -> bool) -> usize {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|e| predicate(e))
            .count()
    }
}
