//! 命令行入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：写日志文件头、加载任务文件、创建浏览器会话来源和脚本驱动
//! 2. **运行批次**：把任务文件交给 `BatchOrchestrator`，Ctrl-C 时停止批次
//! 3. **结果落盘**：每个状态事件和任务结果追加到日志文件
//! 4. **全局统计**：批次结束后打印成功 / 失败汇总
//!
//! ## 设计特点
//!
//! - **资源所有者**：唯一创建 `ChromeSessionProvider` 和 `ClearanceCache` 的地方
//! - **向下委托**：调度细节全部交给 `BatchOrchestrator`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::browser::ChromeSessionProvider;
use crate::config::Config;
use crate::infrastructure::SystemClock;
use crate::models::{load_job_file, JobFile, TaskOutcome, TaskReport};
use crate::orchestrator::batch_orchestrator::{BatchOrchestrator, BatchReport};
use crate::services::{ArtifactFetcher, BatchCallbacks, ClearanceCache, ScriptedDriver};
use crate::utils::logging::{append_log_line, init_log_file, log_startup, print_final_stats};

/// 应用主结构
pub struct App {
    config: Config,
    job: JobFile,
    orchestrator: BatchOrchestrator,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        info!("\n📁 正在加载任务文件...");
        let job = load_job_file(Path::new(&config.job_file))
            .await
            .with_context(|| format!("无法加载任务文件 {}", config.job_file))?;

        check_shared_browser(&config, &job)?;
        log_startup(&config, job.credentials.len(), job.items.len());

        let cache = Arc::new(ClearanceCache::new(
            Arc::new(SystemClock),
            config.clearance_ttl,
        ));
        let fetcher = ArtifactFetcher::new(PathBuf::from(&config.output_dir).join(&job.batch_tag));
        let driver = ScriptedDriver::new(job.driver.clone(), fetcher).context("任务脚本占位符无效")?;
        let provider = ChromeSessionProvider::new(&config);

        let orchestrator = BatchOrchestrator::new(
            config.clone(),
            Arc::new(provider),
            Arc::new(driver),
            cache,
        );

        Ok(Self {
            config,
            job,
            orchestrator,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<BatchReport> {
        let items = self.job.work_items();
        if items.is_empty() {
            warn!("⚠️ 任务文件中没有待处理的任务，程序结束");
            return Ok(BatchReport {
                tasks: Vec::new(),
                stopped: false,
            });
        }
        if self.job.credentials.is_empty() {
            bail!("任务文件中没有账号凭据");
        }

        let handle = self.orchestrator.start_batch(
            items,
            self.job.credentials.clone(),
            self.config.slots_per_session,
            self.config.max_retries,
            self.callbacks(),
        );

        // Ctrl-C 只负责发出停止信号，收尾仍由批次自己完成
        let stopper = handle.cancel_token();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("⏹ 收到 Ctrl-C，正在停止批次...");
                stopper.cancel();
            }
        });

        let report = handle.wait().await?;
        watcher.abort();

        print_final_stats(&report, &self.config.output_log_file);
        Ok(report)
    }

    /// 状态事件和任务结果都追加到日志文件
    fn callbacks(&self) -> BatchCallbacks {
        let status_log = self.config.output_log_file.clone();
        let task_log = self.config.output_log_file.clone();

        BatchCallbacks::new(
            move |session_id, event| {
                let line = format!("[会话 {}] {}", session_id, event);
                if let Err(e) = append_log_line(&status_log, &line) {
                    warn!("写入日志文件失败: {}", e);
                }
            },
            move |report| {
                if let Err(e) = append_log_line(&task_log, &report_line(report)) {
                    warn!("写入日志文件失败: {}", e);
                }
            },
        )
    }
}

/// 连接已有浏览器时所有会话共用一个 cookie 存储，只能跑一个账号
fn check_shared_browser(config: &Config, job: &JobFile) -> Result<()> {
    if let Some(port) = config.browser_debug_port {
        if job.credentials.len() > 1 {
            bail!(
                "BROWSER_DEBUG_PORT={} 时只能使用一个账号，任务文件中有 {} 个",
                port,
                job.credentials.len()
            );
        }
    }
    Ok(())
}

fn report_line(report: &TaskReport) -> String {
    match &report.outcome {
        TaskOutcome::Artifacts(refs) => format!(
            "#{} ✅ {}",
            report.work_item_index + 1,
            refs.iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        TaskOutcome::Error(reason) => format!("#{} ❌ {}", report.work_item_index + 1, reason),
    }
}
