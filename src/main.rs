use clap::Parser;
use folderwatch_lib::commands;
use folderwatch_lib::logging::{init_logging, LogConfig};
use folderwatch_lib::DEFAULT_STATE_DIR;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "监控重要文件夹，为其中的文件保留带时间戳的版本"
)]
struct Args {
    /// 状态目录（config.json 和注册表）
    #[arg(long, default_value = DEFAULT_STATE_DIR)]
    state_dir: PathBuf,

    /// 控制台输出调试日志
    #[arg(long)]
    debug: bool,

    /// 运行一次自检后退出
    #[arg(long, conflicts_with = "init_config")]
    test: bool,

    /// 写入默认配置后退出
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_config = LogConfig::load(&args.state_dir);
    let _log_guard = init_logging(&log_config, args.debug);

    if args.init_config {
        return commands::run::init_config(&args.state_dir);
    }
    if args.test {
        return commands::selftest::run(&args.state_dir).await;
    }

    commands::run::run(&args.state_dir).await
}
