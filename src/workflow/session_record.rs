//! 会话记录
//!
//! 由 worker pool 在启动时创建，槽位只读，退役标记和健康计数除外

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::infrastructure::RemoteSession;
use crate::services::SessionGate;

pub struct SessionRecord {
    pub session_id: String,
    /// 对应凭据的 label，也是 clearance 缓存的 key
    pub credential_ref: String,
    pub slot_count: usize,
    pub handle: Arc<dyn RemoteSession>,
    pub gate: SessionGate,
    consecutive_transport_failures: AtomicU32,
    retired: AtomicBool,
}

impl SessionRecord {
    pub fn new(
        credential_ref: impl Into<String>,
        slot_count: usize,
        handle: Arc<dyn RemoteSession>,
    ) -> Self {
        let session_id = handle.session_id().to_string();
        let credential_ref = credential_ref.into();
        Self {
            gate: SessionGate::new(session_id.clone(), credential_ref.clone()),
            session_id,
            credential_ref,
            slot_count,
            handle,
            consecutive_transport_failures: AtomicU32::new(0),
            retired: AtomicBool::new(false),
        }
    }

    pub fn challenge_cleared(&self) -> bool {
        self.gate.is_cleared()
    }

    /// 记录一次传输错误，返回当前连续次数
    pub fn record_transport_failure(&self) -> u32 {
        self.consecutive_transport_failures
            .fetch_add(1, Ordering::AcqRel)
            + 1
    }

    pub fn record_success(&self) {
        self.consecutive_transport_failures
            .store(0, Ordering::Release);
    }

    /// 标记为退役，只有第一次调用返回 true
    pub fn retire(&self) -> bool {
        !self.retired.swap(true, Ordering::AcqRel)
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}
