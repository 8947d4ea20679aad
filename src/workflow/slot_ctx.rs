//! 槽位上下文
//!
//! 封装"我是哪个会话的第几个槽位"这一信息

use std::fmt::Display;

/// 槽位上下文，只用于日志和事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotCtx {
    pub session_id: String,

    /// 槽位索引（从 0 开始，显示时加 1）
    pub slot: usize,
}

impl SlotCtx {
    pub fn new(session_id: impl Into<String>, slot: usize) -> Self {
        Self {
            session_id: session_id.into(),
            slot,
        }
    }
}

impl Display for SlotCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[会话 {}][槽位 {}]", self.session_id, self.slot + 1)
    }
}
