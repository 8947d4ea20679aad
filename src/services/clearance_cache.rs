//! clearance 凭据缓存
//!
//! 按账号保存通过验证后拿到的 cookie，新会话启动时直接注入

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::infrastructure::Clock;

/// 带过期时间的 clearance 缓存
pub struct ClearanceCache {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl ClearanceCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self, credential: &str, token: impl Into<String>) {
        let now = self.clock.now();
        self.lock().insert(credential.to_string(), (token.into(), now));
        debug!("[会话 {}] 缓存 clearance", credential);
    }

    /// 取出未过期的凭据，过期的顺便清掉
    pub fn get(&self, credential: &str) -> Option<String> {
        let now = self.clock.now();
        let mut entries = self.lock();
        match entries.get(credential) {
            Some((token, stored_at)) if now.duration_since(*stored_at) < self.ttl => {
                Some(token.clone())
            }
            Some(_) => {
                entries.remove(credential);
                None
            }
            None => None,
        }
    }

    pub fn invalidate(&self, credential: &str) {
        if self.lock().remove(credential).is_some() {
            debug!("[会话 {}] 清除 clearance 缓存", credential);
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
