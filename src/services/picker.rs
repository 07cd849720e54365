//! 颗粒拾取能力接口 - 业务能力层
//!
//! 只描述"对一张 micrograph 我能做什么"，不关心重试和调度。

use crate::error::ProcessingError;
use crate::models::{Micrograph, ScoreGrid, SegmentationGrid};
use crate::workflow::MicrographTask;
use std::path::PathBuf;

/// 拾取流水线
///
/// 职责：
/// - 读取 micrograph、计算查询得分、分类窗口、去除伪影、输出坐标
/// - 只处理单个 micrograph
/// - 不持有可变共享状态，可以被多个 worker 同时调用
///
/// `classify_windows` 会被反复调用，给定相同输入时结果只取决于 `tau1` / `tau2`。
pub trait Picker: Send + Sync {
    /// 把 micrograph 文件解码为强度网格
    fn read_micrograph(&self, task: &MicrographTask) -> Result<Micrograph, ProcessingError>;

    /// 计算每个窗口的查询得分
    fn compute_query_score(
        &self,
        task: &MicrographTask,
        micrograph: &Micrograph,
    ) -> Result<ScoreGrid, ProcessingError>;

    /// 训练分类器并对所有窗口分类
    ///
    /// `tau1` 越大越偏向颗粒，`tau2` 越大越偏向噪声。
    fn classify_windows(
        &self,
        task: &MicrographTask,
        micrograph: &Micrograph,
        score: &ScoreGrid,
        tau1: u32,
        tau2: u32,
    ) -> Result<SegmentationGrid, ProcessingError>;

    /// 去除尺寸与颗粒约束不符的连通区域
    fn remove_artifacts(
        &self,
        task: &MicrographTask,
        segmentation: SegmentationGrid,
    ) -> Result<SegmentationGrid, ProcessingError>;

    /// 把颗粒坐标写入输出目录，返回输出文件路径
    fn extract_particles(
        &self,
        task: &MicrographTask,
        segmentation: &SegmentationGrid,
    ) -> Result<PathBuf, ProcessingError>;
}
