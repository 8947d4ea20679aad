use anyhow::Result;
use session_batch::utils::logging;
use session_batch::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env()?;

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    let report = App::initialize(config).await?.run().await?;

    if report.failed() > 0 {
        std::process::exit(1);
    }
    Ok(())
}
