//! 配置管理命令

use crate::exit::Exit;
use anyhow::{Context, Result, bail};
use clap::Subcommand;
use gripper_config::GripperConfig;
use std::path::{Path, PathBuf};

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 显示生效的配置（TOML）
    Show,

    /// 写入默认配置文件
    Init {
        /// 覆盖已存在的文件
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(self, path: Option<&Path>) -> Result<Exit> {
        match self {
            ConfigCommand::Show => Self::show(path),
            ConfigCommand::Init { force } => Self::init(path, force),
        }
    }

    fn show(path: Option<&Path>) -> Result<Exit> {
        let config = crate::load_config(path)?;
        match resolve_path(path) {
            Ok(path) if path.exists() => println!("# {}", path.display()),
            _ => println!("# (defaults)"),
        }
        print!("{}", config.to_toml_string()?);
        Ok(Exit::Success)
    }

    fn init(path: Option<&Path>, force: bool) -> Result<Exit> {
        let path = resolve_path(path)?;
        if path.exists() && !force {
            bail!(
                "Config file {} already exists (use --force to overwrite)",
                path.display()
            );
        }

        GripperConfig::default()
            .save_to_file(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("✅ Wrote default config to {}", path.display());
        Ok(Exit::Success)
    }
}

fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(GripperConfig::default_path()?),
    }
}
