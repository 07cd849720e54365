//! STAR 坐标文件写入服务 - 业务能力层
//!
//! 只负责"写 .star 文件"能力，不关心流程

use crate::error::ProcessingError;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 未使用列的占位值
const UNSET: i32 = -999;

/// 一个颗粒的中心坐标（像素）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
}

/// STAR 文件写入服务
///
/// 每个 micrograph 对应 `<output_dir>/<文件名去掉扩展名>.star`
pub struct StarWriter {
    output_dir: PathBuf,
}

impl StarWriter {
    /// 创建写入到 `output_dir` 的服务
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// micrograph 对应的输出路径
    pub fn output_path(&self, micrograph: &Path) -> PathBuf {
        let stem = micrograph
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "micrograph".to_string());
        self.output_dir.join(format!("{}.star", stem))
    }

    /// 写入坐标列表
    ///
    /// # 返回
    /// 返回写入的文件路径
    pub fn write(&self, micrograph: &Path, particles: &[Particle]) -> Result<PathBuf, ProcessingError> {
        let path = self.output_path(micrograph);
        debug!("写入坐标文件: {} | 颗粒数: {}", path.display(), particles.len());

        std::fs::write(&path, render(particles)).map_err(|source| ProcessingError::Write {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }
}

/// 生成 RELION 风格的 STAR 文本
pub fn render(particles: &[Particle]) -> String {
    let mut out = String::from(
        "data_root\n\nloop_\n\
         _rlnCoordinateX #1\n\
         _rlnCoordinateY #2\n\
         _rlnClassNumber #3\n\
         _rlnAnglePsi #4\n\
         _rlnAutopickFigureOfMerit #5\n",
    );
    for p in particles {
        let _ = writeln!(out, "{:.1}\t{:.1}\t{}\t{}\t{}", p.x, p.y, UNSET, UNSET, UNSET);
    }
    out
}
