/// 日志工具模块
///
/// 提供日志初始化和批次横幅的辅助函数
use std::fs;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::error::{AppError, AppResult, FileError};
use crate::orchestrator::BatchReport;

/// 初始化 tracing，`RUST_LOG` 未设置时默认 `session_batch=info`，
/// `verbose` 时为 `session_batch=debug`
///
/// 重复调用不会报错
pub fn init(verbose: bool) {
    let default_filter = if verbose {
        "session_batch=debug"
    } else {
        "session_batch=info"
    };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> AppResult<()> {
    let log_header = format!(
        "{}\n批次处理日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header).map_err(|source| {
        AppError::File(FileError::WriteFailed {
            path: log_file_path.to_string(),
            source,
        })
    })
}

/// 记录程序启动信息
pub fn log_startup(config: &Config, sessions: usize, items: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 多会话批量生成模式");
    info!(
        "📊 会话数: {} | 每会话槽位: {} | 最多重试: {}",
        sessions, config.slots_per_session, config.max_retries
    );
    info!("📋 待处理任务: {}", items);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息，并在失败的任务后列出原因
///
/// # 参数
/// - `report`: 批次结果
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(report: &BatchReport, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", report.completed(), report.total());
    info!("❌ 失败: {}", report.failed());
    for task in &report.tasks {
        if let Some(reason) = &task.error_reason {
            info!("   #{} {}", task.work_item.sequence_index + 1, reason);
        }
    }
    if report.stopped {
        info!("⏹ 批次被手动停止");
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 把一行结果追加到日志文件
pub fn append_log_line(log_file_path: &str, line: &str) -> AppResult<()> {
    use std::io::Write;

    let write_failed = |source| {
        AppError::File(FileError::WriteFailed {
            path: log_file_path.to_string(),
            source,
        })
    };
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .map_err(write_failed)?;
    writeln!(file, "{}", line).map_err(write_failed)
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
