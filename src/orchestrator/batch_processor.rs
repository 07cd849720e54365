//! 批量 micrograph 处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责批量 micrograph 的扫描和并发调度。
//!
//! ## 核心功能
//!
//! 1. **扫描**：列出输入目录下（不递归）扩展名为 `.mrc` 的文件
//! 2. **共享配置**：所有 worker 共享同一份只读配置（`Arc<ResolvedConfig>`）
//! 3. **并发控制**：使用 Semaphore 把同时运行的任务数限制为 `proc`
//! 4. **同步等待**：所有任务完成后才返回
//! 5. **快速失败**：任一任务出错立即终止整个批次
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个 micrograph 的细节
//! - **CPU 密集**：每个任务运行在 `spawn_blocking` 的系统线程上
//! - **向下委托**：委托 `MicrographFlow` 处理单个 micrograph

use crate::config::ResolvedConfig;
use crate::error::{PickResult, PickerError, ProcessingError};
use crate::services::Picker;
use crate::utils::logging::{log_micrographs_found, log_startup, print_final_stats};
use crate::workflow::{is_micrograph, FlowResult, MicrographFlow, MicrographTask};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

/// 批量处理器
pub struct BatchCoordinator {
    config: Arc<ResolvedConfig>,
    picker: Arc<dyn Picker>,
}

/// 处理统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    /// 分发的 .mrc 文件数
    pub found: usize,
    /// 被忽略的其他目录项
    pub ignored: usize,
    /// 成功输出坐标文件的数量
    pub picked: usize,
}

/// 输入目录扫描结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MicrographListing {
    /// 按路径排序的 .mrc 文件
    pub micrographs: Vec<PathBuf>,
    /// 被忽略的其他目录项
    pub ignored: usize,
}

impl BatchCoordinator {
    /// 创建批量处理器，配置从此不再修改
    pub fn new(config: ResolvedConfig, picker: Arc<dyn Picker>) -> Self {
        Self {
            config: Arc::new(config),
            picker,
        }
    }

    /// 处理输入目录下所有 micrograph，全部完成后返回
    pub async fn run(&self, input_dir: &Path) -> PickResult<BatchStats> {
        log_startup(self.config.proc);

        let listing = list_micrographs(input_dir).await?;
        log_micrographs_found(listing.micrographs.len(), listing.ignored);

        let mut stats = BatchStats {
            found: listing.micrographs.len(),
            ignored: listing.ignored,
            ..Default::default()
        };

        if listing.micrographs.is_empty() {
            warn!("⚠️ 没有找到待处理的 mrc 文件，程序结束");
            return Ok(stats);
        }

        let tasks = listing
            .micrographs
            .into_iter()
            .map(|path| MicrographTask::new(path, self.config.clone()))
            .collect();

        stats.picked = self.process_all(tasks).await?;

        print_final_stats(stats.picked, stats.found, &self.config.output_dir);

        Ok(stats)
    }

    /// 以 `proc` 个 worker 并发处理所有任务
    ///
    /// 第一个失败的任务会终止整个批次：未分发的任务不再分发，已在运行的任务被放弃。
    async fn process_all(&self, tasks: Vec<MicrographTask>) -> PickResult<usize> {
        let semaphore = Arc::new(Semaphore::new(self.config.proc));
        let mut pending: JoinSet<Result<FlowResult, ProcessingError>> = JoinSet::new();
        let mut picked = 0;

        for task in tasks {
            // 等待空闲 worker，同时检查已完成的任务
            let permit = loop {
                tokio::select! {
                    biased;
                    Some(joined) = pending.join_next() => {
                        if let Err(e) = settle(joined, &mut picked) {
                            pending.abort_all();
                            return Err(e);
                        }
                    }
                    permit = semaphore.clone().acquire_owned() => break permit?,
                }
            };

            let flow = MicrographFlow::new(self.picker.clone());
            pending.spawn_blocking(move || {
                let _permit = permit;
                flow.run(&task)
            });
        }

        // 等待剩余任务完成
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = settle(joined, &mut picked) {
                pending.abort_all();
                return Err(e);
            }
        }

        Ok(picked)
    }
}

/// 汇总一个已结束的任务
fn settle(
    joined: Result<Result<FlowResult, ProcessingError>, JoinError>,
    picked: &mut usize,
) -> PickResult<()> {
    match joined {
        Ok(Ok(FlowResult::Picked(_))) => {
            *picked += 1;
            Ok(())
        }
        Ok(Ok(FlowResult::Skipped)) => Ok(()),
        Ok(Err(e)) => {
            error!("❌ 处理过程中发生错误，终止批次: {}", e);
            Err(e.into())
        }
        Err(e) => {
            error!("❌ worker 任务执行失败，终止批次: {}", e);
            Err(PickerError::Worker(e))
        }
    }
}

/// 列出输入目录下（不递归）的 .mrc 文件
pub async fn list_micrographs(input_dir: &Path) -> PickResult<MicrographListing> {
    info!("📁 正在扫描 {} ...", input_dir.display());

    let dir_error = |source| PickerError::InputDir {
        path: input_dir.to_path_buf(),
        source,
    };

    let mut listing = MicrographListing::default();
    let mut entries = tokio::fs::read_dir(input_dir).await.map_err(dir_error)?;

    while let Some(entry) = entries.next_entry().await.map_err(dir_error)? {
        let path = entry.path();
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);

        if is_file && is_micrograph(&path) {
            listing.micrographs.push(path);
        } else {
            listing.ignored += 1;
        }
    }

    listing.micrographs.sort();
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lists_only_mrc_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mrc", "a.mrc", "notes.txt", "c.MRC", "d.mrcs"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.mrc")).unwrap();

        let listing = list_micrographs(dir.path()).await.unwrap();

        assert_eq!(
            listing.micrographs,
            vec![dir.path().join("a.mrc"), dir.path().join("b.mrc")]
        );
        assert_eq!(listing.ignored, 4);
    }

    #[tokio::test]
    async fn test_missing_input_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_micrographs(&dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, PickerError::InputDir { .. }));
    }
}
