use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use apple_picker::{config, logger, BatchCoordinator, RawConfig, ReferencePicker};
use clap::Parser;

/// 在 micrograph 目录中批量拾取颗粒
#[derive(Parser, Debug)]
#[command(name = "apple_picker", version, about = "Apple Picker")]
struct Cli {
    /// 包含所有待拾取 mrc 文件的目录
    #[arg(value_name = "INPUT_DIR")]
    mrc_dir: PathBuf,

    /// 颗粒尺寸（像素）
    #[arg(short = 's', value_name = "PARTICLE_SIZE")]
    particle_size: Option<u32>,

    /// 保存 star 文件的目录，必须已存在（默认在输入目录旁创建 star_dir）
    #[arg(short = 'o', value_name = "OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// 同时处理的 micrograph 数量
    #[arg(short = 'j', long = "proc")]
    proc: Option<usize>,

    /// TOML 配置文件
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Cli {
    /// 依次叠加 默认值 → 配置文件 → 环境变量 → 命令行参数
    fn raw_config(&self) -> Result<RawConfig> {
        let base = match &self.config {
            Some(path) => RawConfig::from_toml_file(path)?,
            None => RawConfig::default(),
        };
        let mut raw = base.with_env_overrides()?;

        if let Some(size) = self.particle_size {
            raw.particle_size = Some(size);
        }
        if let Some(dir) = &self.output_dir {
            raw.output_dir = Some(dir.clone());
        }
        if let Some(proc) = self.proc {
            raw.proc = proc;
        }
        Ok(raw)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logger::init();

    let cli = Cli::parse();

    // 加载并解析配置（失败时不会启动任何 worker）
    let raw = cli.raw_config()?;
    let resolved = config::resolve(raw, &cli.mrc_dir)?;

    // 运行批量拾取
    let coordinator = BatchCoordinator::new(resolved, Arc::new(ReferencePicker::new()));
    coordinator.run(&cli.mrc_dir).await?;

    Ok(())
}
