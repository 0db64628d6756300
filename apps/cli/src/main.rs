//! # Gripper CLI
//!
//! 夹爪管理器命令行工具。每次调用：读取配置 → 连接夹爪 → 执行一条指令 → 断开。
//!
//! ```bash
//! # 连接正在运行的夹爪服务（gripper-daemon 或真实夹爪网关）
//! gripper-cli --address 127.0.0.1:18890 grasp --width 0.02 --force 40
//!
//! # 使用进程内仿真夹爪
//! gripper-cli --sim move --width 0.04
//! ```
//!
//! ## 退出码
//!
//! | 码 | 含义 |
//! |---|---|
//! | 0 | 成功 |
//! | 1 | 指令失败（链路错误、故障、取消、抢占） |
//! | 2 | 指令超时 |
//! | 3 | 指令被拒绝（校验失败或忙碌） |
//! | 4 | 参数、配置或连接错误 |
//!
//! 执行期间按 Ctrl-C 会取消当前指令。

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gripper_client::{GripperBuilder, GripperClient, GripperCommand, SimConfig};
use gripper_config::GripperConfig;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit;

use commands::{ConfigCommand, MotionArgs};
use exit::Exit;

/// Gripper CLI - 夹爪命令行工具
#[derive(Parser, Debug)]
#[command(name = "gripper-cli")]
#[command(about = "Command-line client for the gripper manager", long_about = None)]
#[command(version)]
struct Cli {
    /// 链路服务地址（覆盖配置中的 connection.address）
    #[arg(long, global = true)]
    address: Option<String>,

    /// 使用进程内仿真夹爪
    #[arg(long, global = true)]
    sim: bool,

    /// 仿真夹爪两指间的物体宽度（m），仅与 --sim 一起使用
    #[arg(long, global = true, value_name = "WIDTH")]
    sim_object: Option<f64>,

    /// 配置文件路径（默认 <config_dir>/gripper-manager/config.toml）
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// 指令超时（秒，覆盖配置默认值）
    #[arg(long, global = true, value_name = "SECONDS")]
    timeout: Option<f64>,

    /// 手指速度（m/s，覆盖配置默认值）
    #[arg(long, global = true, value_name = "M/S")]
    speed: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(flatten)]
    Action(Action),

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// 夹爪操作
#[derive(Subcommand, Debug)]
enum Action {
    /// 张开到最大宽度
    Open,

    /// 闭合到最小宽度（不建立夹持力）
    Close,

    /// 移动到指定宽度
    Move {
        /// 目标宽度（m）
        #[arg(long)]
        width: f64,
    },

    /// 抓取物体
    Grasp {
        /// 物体期望宽度（m）
        #[arg(long)]
        width: f64,

        /// 夹持力（N，默认取配置）
        #[arg(long)]
        force: Option<f64>,

        /// 内侧容差（m）
        #[arg(long)]
        epsilon_inner: Option<f64>,

        /// 外侧容差（m）
        #[arg(long)]
        epsilon_outer: Option<f64>,
    },

    /// 回零（重新估计最大宽度）
    Homing,

    /// 停止当前运动
    Stop,

    /// 查询当前状态
    State,
}

#[tokio::main]
async fn main() -> ExitCode {
    // 初始化日志（输出到 stderr，stdout 留给结果）
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,gripper_cli=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                Exit::Setup.into()
            } else {
                Exit::Success.into()
            };
        },
    };

    match run(cli).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            eprintln!("❌ {:#}", e);
            Exit::Setup.into()
        },
    }
}

async fn run(cli: Cli) -> Result<Exit> {
    let Cli {
        address,
        sim,
        sim_object,
        config: config_path,
        timeout,
        speed,
        command,
    } = cli;
    let action = match command {
        Commands::Config(cmd) => return cmd.execute(config_path.as_deref()),
        Commands::Action(action) => action,
    };

    let config = load_config(config_path.as_deref())?;
    let client = connect(address, sim, sim_object, config).await?;
    let args = MotionArgs { speed, timeout };

    match action {
        Action::Open => {
            let command = GripperCommand::open(client.limits().max_width);
            commands::motion::execute(&client, args.apply(&client, command)).await
        },
        Action::Close => {
            let command = GripperCommand::close(client.limits().min_width);
            commands::motion::execute(&client, args.apply(&client, command)).await
        },
        Action::Move { width } => {
            let command = GripperCommand::move_to(width);
            commands::motion::execute(&client, args.apply(&client, command)).await
        },
        Action::Grasp {
            width,
            force,
            epsilon_inner,
            epsilon_outer,
        } => {
            let command = commands::motion::grasp_command(
                &client,
                &args,
                width,
                force,
                epsilon_inner,
                epsilon_outer,
            );
            commands::motion::execute(&client, command).await
        },
        Action::Homing => {
            let command = GripperCommand::homing();
            commands::motion::execute(&client, args.apply(&client, command)).await
        },
        Action::Stop => {
            let command = GripperCommand::stop();
            commands::motion::execute(&client, args.apply(&client, command)).await
        },
        Action::State => commands::state::execute(&client),
    }
}

/// 读取配置：显式路径必须存在，默认路径不存在时使用默认配置
pub(crate) fn load_config(path: Option<&Path>) -> Result<GripperConfig> {
    GripperConfig::resolve(path).context("Failed to load config")
}

async fn connect(
    address: Option<String>,
    sim: bool,
    sim_object: Option<f64>,
    config: GripperConfig,
) -> Result<GripperClient> {
    let mut builder = GripperBuilder::new().config(config);
    if sim {
        builder = builder.simulated(SimConfig {
            object_width: sim_object,
            ..Default::default()
        });
    } else {
        if sim_object.is_some() {
            warn!("--sim-object is ignored without --sim");
        }
        if let Some(address) = address {
            builder = builder.address(address);
        }
    }

    // 连接和等待首帧反馈是阻塞操作
    tokio::task::spawn_blocking(move || builder.build())
        .await
        .context("Connection task failed")?
        .context("Failed to connect to gripper")
}
