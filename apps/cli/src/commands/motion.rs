//! 运动指令
//!
//! 提交一条指令并等待终态；等待期间收到 Ctrl-C 时取消该指令并继续等待取消完成。

use crate::exit::Exit;
use anyhow::Result;
use gripper_client::{CommandOutcome, Epsilon, GripperClient, GripperCommand};
use std::time::Duration;
use tracing::{info, warn};

/// 全局覆盖参数
#[derive(Debug, Clone, Copy, Default)]
pub struct MotionArgs {
    /// 速度（m/s）
    pub speed: Option<f64>,
    /// 超时（秒）
    pub timeout: Option<f64>,
}

impl MotionArgs {
    /// 填充配置默认值，再应用命令行覆盖
    pub fn apply(&self, client: &GripperClient, command: GripperCommand) -> GripperCommand {
        let mut command = client.with_defaults(command);
        if let Some(speed) = self.speed {
            command = command.with_speed(speed);
        }
        if let Some(secs) = self.timeout {
            // 非法值（负数、NaN）转换为零超时，由校验器拒绝
            let timeout = Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO);
            command = command.with_timeout(timeout);
        }
        command
    }
}

/// 构造抓取指令
pub fn grasp_command(
    client: &GripperClient,
    args: &MotionArgs,
    width: f64,
    force: Option<f64>,
    epsilon_inner: Option<f64>,
    epsilon_outer: Option<f64>,
) -> GripperCommand {
    let force = force.unwrap_or(client.defaults().force);
    let mut command = args.apply(client, GripperCommand::grasp(width, force));

    if epsilon_inner.is_some() || epsilon_outer.is_some() {
        let current = command.epsilon();
        command = command.with_epsilon(Epsilon::new(
            epsilon_inner.unwrap_or(current.inner),
            epsilon_outer.unwrap_or(current.outer),
        ));
    }
    command
}

/// 执行指令并返回退出码
pub async fn execute(client: &GripperClient, command: GripperCommand) -> Result<Exit> {
    let kind = command.kind();
    let handle = match client.submit(command) {
        Ok(handle) => handle,
        Err(e) if e.is_rejection() => {
            eprintln!("❌ {} rejected: {}", kind, e);
            return Ok(Exit::Rejected);
        },
        Err(e) => return Err(e.into()),
    };
    info!("Command {} ({}) submitted", handle.id(), kind);

    let mut waiter = {
        let handle = handle.clone();
        tokio::task::spawn_blocking(move || handle.wait())
    };

    let outcome = tokio::select! {
        result = &mut waiter => result?,
        Ok(()) = tokio::signal::ctrl_c() => {
            eprintln!("\n收到中断信号，正在取消 {}...", kind);
            if let Err(e) = client.cancel(&handle) {
                warn!("Cancel request failed: {}", e);
            }
            waiter.await?
        },
    };

    report(&outcome, &kind.to_string());
    Ok(Exit::from_outcome(&outcome))
}

fn report(outcome: &CommandOutcome, kind: &str) {
    match outcome {
        CommandOutcome::Succeeded(state) => {
            println!(
                "✅ {} succeeded: width {:.4} m, force {:.1} N, grasped {}",
                kind, state.width, state.force, state.is_grasped
            );
        },
        CommandOutcome::Failed(reason) => {
            eprintln!("❌ {} failed: {}", kind, reason);
        },
        CommandOutcome::TimedOut => {
            eprintln!("⏱ {} timed out", kind);
        },
    }
}
