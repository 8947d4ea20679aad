//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批次调度和会话生命周期，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_orchestrator` - 批次编排器
//! - 播种 WorkQueue，启动工作池
//! - 等待队列和在途任务全部排空
//! - 为没能处理的 WorkItem 补上终态 Task
//! - 提供 `start_batch` / `stop_batch`
//!
//! ### `worker_pool` - 会话工作池
//! - 每个凭据一个会话，错开启动
//! - 每个会话若干 ExecutionSlot
//! - 结束时关闭所有会话
//!
//! ### `batch_processor` - 命令行应用
//! - 加载配置和任务文件，处理 Ctrl-C，输出统计
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (App)
//!     ↓
//! batch_orchestrator (处理 Vec<WorkItem>)
//!     ↓
//! worker_pool (Vec<会话> × 槽位)
//!     ↓
//! workflow::ExecutionSlot (一个槽位的循环)
//!     ↓
//! services (能力层：gate / poller / driver / queue)
//!     ↓
//! infrastructure (基础设施：会话能力接口)
//! ```

pub mod batch_orchestrator;
pub mod batch_processor;
pub mod worker_pool;

// 重新导出主要类型
pub use batch_orchestrator::{stop_batch, BatchHandle, BatchOrchestrator, BatchReport};
pub use batch_processor::App;
pub use worker_pool::{PoolSettings, PoolSummary, SessionWorkerPool};
