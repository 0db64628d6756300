//! 仿真夹爪服务
//!
//! 把一个仿真夹爪通过 TCP 链路暴露出来，供 `gripper-cli --address` 或其它客户端连接。
//! 同一时刻只接受一个客户端，其它连接会被拒绝。

use anyhow::{Context, Result};
use clap::Parser;
use gripper_config::GripperConfig;
use gripper_link::{LinkServer, SimConfig, SimulatedGripper};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 仿真夹爪服务
#[derive(Parser, Debug)]
#[command(name = "gripper-daemon")]
#[command(about = "Simulated gripper served over the gripper link protocol", long_about = None)]
#[command(version)]
struct Args {
    /// 监听地址（默认取配置中的 connection.address）
    ///
    /// 格式: IP:PORT (例如: 127.0.0.1:18890)
    #[arg(long)]
    bind: Option<String>,

    /// 配置文件路径
    #[arg(long)]
    config: Option<PathBuf>,

    /// 两指间的物体宽度（m），不指定则没有物体
    #[arg(long)]
    object_width: Option<f64>,

    /// 手指真实行程（m，默认取配置中的 limits.max_width）
    #[arg(long)]
    travel: Option<f64>,
}

/// 与 gripper-cli 相同的查找规则，保证两端默认使用同一个 connection.address
fn load_config(path: Option<&Path>) -> Result<GripperConfig> {
    GripperConfig::resolve(path).context("Failed to load config")
}

/// 按参数创建仿真夹爪并绑定监听地址
fn build_server(args: &Args, config: &GripperConfig) -> Result<LinkServer> {
    let travel = args.travel.unwrap_or(config.limits.max_width);
    let sim = SimulatedGripper::new(SimConfig {
        travel,
        initial_width: travel,
        uncalibrated_max_width: config.limits.max_width,
        object_width: args.object_width,
    });

    let bind = args
        .bind
        .clone()
        .unwrap_or_else(|| config.connection.address.clone());
    LinkServer::bind(&bind, sim).with_context(|| format!("Failed to bind {}", bind))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let server = build_server(&args, &config)?.spawn();

    info!("Gripper daemon listening on {}", server.local_addr());
    if let Some(width) = args.object_width {
        info!("Simulated object width: {:.4} m", width);
    }
    info!("Press Ctrl+C to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Received interrupt signal. Shutting down...");
    server.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gripper_link::{ActuatorLink, LinkTarget, TcpLink};
    use std::time::Duration;

    fn args(object_width: Option<f64>) -> Args {
        Args {
            bind: Some("127.0.0.1:0".to_string()),
            config: None,
            object_width,
            travel: None,
        }
    }

    #[test]
    fn test_server_serves_simulated_gripper() {
        let server = build_server(&args(None), &GripperConfig::default())
            .unwrap()
            .spawn();

        let mut link =
            TcpLink::connect(&server.local_addr().to_string(), Duration::from_millis(500)).unwrap();
        let state = link.poll().unwrap();
        assert_eq!(state.width, 0.08);
        assert_eq!(state.max_width, 0.08);

        link.send(LinkTarget::Move {
            width: 0.07,
            speed: 0.2,
        })
        .unwrap();
        assert!(link.poll().unwrap().sequence > state.sequence);
        server.shutdown();
    }

    #[test]
    fn test_travel_and_object_from_args() {
        let mut a = args(Some(0.03));
        a.travel = Some(0.1);
        let server = build_server(&a, &GripperConfig::default()).unwrap().spawn();

        let mut link =
            TcpLink::connect(&server.local_addr().to_string(), Duration::from_millis(500)).unwrap();
        let state = link.poll().unwrap();
        // 回零前仍报告配置中的最大宽度
        assert_eq!(state.width, 0.1);
        assert_eq!(state.max_width, 0.08);
    }

    #[test]
    fn test_missing_config_is_error() {
        let path = PathBuf::from("/nonexistent/gripper-manager/config.toml");
        assert!(load_config(Some(path.as_path())).is_err());
    }

    #[test]
    fn test_explicit_config_sets_bind_address() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[connection]\naddress = \"127.0.0.1:0\"\n").unwrap();

        let config = load_config(Some(path.as_path())).unwrap();
        let mut a = args(None);
        a.bind = None;
        let server = build_server(&a, &config).unwrap();
        assert!(server.local_addr().unwrap().ip().is_loopback());
    }
}
