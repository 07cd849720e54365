//! micrograph 任务描述
//!
//! 封装"我正在处理哪个文件、用哪份配置"这一信息

use crate::config::ResolvedConfig;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 可被拾取的文件扩展名
pub const MICROGRAPH_EXTENSION: &str = "mrc";

/// 扩展名恰好为 `.mrc` 的路径
pub fn is_micrograph(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some(MICROGRAPH_EXTENSION)
}

/// 单个 micrograph 的处理任务
///
/// 配置是所有 worker 共享的只读快照
#[derive(Debug, Clone)]
pub struct MicrographTask {
    /// micrograph 文件路径
    pub path: PathBuf,

    /// 解析后的配置
    pub config: Arc<ResolvedConfig>,
}

impl MicrographTask {
    /// 创建新的任务
    pub fn new(path: PathBuf, config: Arc<ResolvedConfig>) -> Self {
        Self { path, config }
    }

    /// 文件名（仅用于日志显示）
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }
}

impl Display for MicrographTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[micrograph {}]", self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_must_match_exactly() {
        assert!(is_micrograph(Path::new("/data/a.mrc")));
        assert!(is_micrograph(Path::new("b.c.mrc")));
        assert!(!is_micrograph(Path::new("a.MRC")));
        assert!(!is_micrograph(Path::new("a.mrcs")));
        assert!(!is_micrograph(Path::new("a.mrc.bak")));
        assert!(!is_micrograph(Path::new("mrc")));
    }
}
