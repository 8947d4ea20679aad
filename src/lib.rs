//! # Session Batch
//!
//! 用多个已登录的浏览器会话并发处理一批生成任务
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 会话能力接口（导航、执行脚本、读 cookie、点击）
//! - `browser/` - 基于 chromiumoxide 的实现，一个凭据一个浏览器，一个槽位一个标签页
//! - `JsExecutor` - 持有 page，提供 eval() 能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心调度顺序
//! - `ChallengeResolver` / `SessionGate` - 验证关卡，每个会话只过一次
//! - `ReadinessPoller` - 有上限的就绪轮询
//! - `ClearanceCache` - 带过期时间的 clearance 缓存
//! - `WorkQueue` - 所有槽位共享的 FIFO 队列
//! - `ScriptedDriver` / `ArtifactFetcher` - 提交、判断就绪、下载产物
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个槽位"的完整处理循环
//! - `ExecutionSlot` - 取任务 → 过关 → 提交 → 轮询 → 重试
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/worker_pool` - 会话工作池，错开启动和统一关闭
//! - `orchestrator/batch_orchestrator` - 批次入口，`start_batch` / `stop_batch`
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, ErrorReason};
pub use models::{Credential, Payload, StatusEvent, Task, TaskReport, TaskStatus, WorkItem};
pub use orchestrator::{stop_batch, App, BatchHandle, BatchOrchestrator, BatchReport};
pub use services::{BatchCallbacks, ClearanceCache, WorkDriver};
