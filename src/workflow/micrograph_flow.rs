//! micrograph 处理流程 - 流程层
//!
//! 核心职责：定义"一张 micrograph"的完整处理流程
//!
//! 流程顺序：
//! 1. 读取 micrograph → 计算查询得分
//! 2. 分类窗口；结果全是颗粒则 tau2 + 500，全是噪声则 tau1 + 500，重新分类
//! 3. 去除伪影 → 输出坐标文件

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ProcessingError;
use crate::models::{Degeneracy, Micrograph, ScoreGrid, SegmentationGrid};
use crate::services::Picker;
use crate::workflow::micrograph_task::{is_micrograph, MicrographTask};

/// 每次分割退化时阈值的增量
pub const TAU_INCREMENT: u32 = 500;

/// micrograph 处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum FlowResult {
    /// 已输出坐标文件
    Picked(PickOutcome),
    /// 不是 .mrc 文件，跳过
    Skipped,
}

/// 一次成功拾取的细节
#[derive(Debug, Clone, PartialEq)]
pub struct PickOutcome {
    /// 输出的坐标文件
    pub output: PathBuf,
    /// 最终使用的 tau1
    pub tau1: u32,
    /// 最终使用的 tau2
    pub tau2: u32,
    /// 阈值调整次数
    pub adjustments: u32,
}

/// 本任务私有的阈值副本
#[derive(Debug, Clone, Copy)]
struct Thresholds {
    tau1: u32,
    tau2: u32,
    adjustments: u32,
}

impl Thresholds {
    fn adjust(&mut self, degeneracy: Degeneracy) {
        match degeneracy {
            Degeneracy::AllParticle => self.tau2 = self.tau2.saturating_add(TAU_INCREMENT),
            Degeneracy::AllNoise => self.tau1 = self.tau1.saturating_add(TAU_INCREMENT),
            Degeneracy::Mixed | Degeneracy::Empty => return,
        }
        self.adjustments += 1;
    }
}

/// micrograph 处理流程
///
/// - 编排单个 micrograph 的完整流程
/// - 负责退化分割的阈值修复
/// - 不持有共享可变状态
/// - 只依赖拾取能力（[`Picker`]）
pub struct MicrographFlow {
    picker: Arc<dyn Picker>,
}

impl MicrographFlow {
    /// 创建新的处理流程
    pub fn new(picker: Arc<dyn Picker>) -> Self {
        Self { picker }
    }

    pub fn run(&self, task: &MicrographTask) -> Result<FlowResult, ProcessingError> {
        if !is_micrograph(&task.path) {
            debug!("{} 不是 mrc 文件，跳过", task);
            return Ok(FlowResult::Skipped);
        }

        info!("{} 开始处理..", task);

        let micrograph = self.picker.read_micrograph(task)?;
        let score = self.picker.compute_query_score(task, &micrograph)?;

        let (segmentation, thresholds) = self.classify_until_mixed(task, &micrograph, &score)?;

        let segmentation = self.picker.remove_artifacts(task, segmentation)?;
        let output = self.picker.extract_particles(task, &segmentation)?;

        info!(
            "{} ✓ 完成 -> {} (tau1={}, tau2={}, 调整 {} 次)",
            task,
            output.display(),
            thresholds.tau1,
            thresholds.tau2,
            thresholds.adjustments
        );

        Ok(FlowResult::Picked(PickOutcome {
            output,
            tau1: thresholds.tau1,
            tau2: thresholds.tau2,
            adjustments: thresholds.adjustments,
        }))
    }

    /// 反复分类直到得到非退化的分割，最多调整 `max_tau_adjustments` 次
    fn classify_until_mixed(
        &self,
        task: &MicrographTask,
        micrograph: &Micrograph,
        score: &ScoreGrid,
    ) -> Result<(SegmentationGrid, Thresholds), ProcessingError> {
        let max_adjustments = task.config.max_tau_adjustments;
        let mut thresholds = Thresholds {
            tau1: task.config.tau1,
            tau2: task.config.tau2,
            adjustments: 0,
        };

        loop {
            let segmentation = self.picker.classify_windows(
                task,
                micrograph,
                score,
                thresholds.tau1,
                thresholds.tau2,
            )?;

            let degeneracy = segmentation.degeneracy();
            match degeneracy {
                Degeneracy::Mixed => return Ok((segmentation, thresholds)),
                Degeneracy::Empty => {
                    return Err(ProcessingError::EmptyGrid {
                        path: task.path.clone(),
                    })
                }
                Degeneracy::AllParticle | Degeneracy::AllNoise => {
                    if thresholds.adjustments >= max_adjustments {
                        return Err(ProcessingError::NotConverged {
                            path: task.path.clone(),
                            attempts: thresholds.adjustments,
                            tau1: thresholds.tau1,
                            tau2: thresholds.tau2,
                        });
                    }
                    thresholds.adjust(degeneracy);
                    warn!(
                        "{} ⚠️ 分割结果退化 ({:?})，调整阈值: tau1={}, tau2={}",
                        task, degeneracy, thresholds.tau1, thresholds.tau2
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolvedConfig;
    use crate::models::{NOISE, PARTICLE};
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    /// 依次返回预设分割结果，并记录每次分类用的阈值
    struct ScriptedPicker {
        outcomes: Mutex<VecDeque<SegmentationGrid>>,
        fallback: SegmentationGrid,
        calls: Mutex<Vec<(u32, u32)>>,
        extracted: Mutex<usize>,
    }

    impl ScriptedPicker {
        fn new(outcomes: Vec<SegmentationGrid>, fallback: SegmentationGrid) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                fallback,
                calls: Mutex::new(Vec::new()),
                extracted: Mutex::new(0),
            }
        }
    }

    impl Picker for ScriptedPicker {
        fn read_micrograph(&self, _task: &MicrographTask) -> Result<Micrograph, ProcessingError> {
            Ok(Micrograph::new(4, 4, vec![0.0; 16]).unwrap())
        }

        fn compute_query_score(
            &self,
            _task: &MicrographTask,
            _micrograph: &Micrograph,
        ) -> Result<ScoreGrid, ProcessingError> {
            Ok(ScoreGrid::filled(2, 2, 2, 0.0))
        }

        fn classify_windows(
            &self,
            _task: &MicrographTask,
            _micrograph: &Micrograph,
            _score: &ScoreGrid,
            tau1: u32,
            tau2: u32,
        ) -> Result<SegmentationGrid, ProcessingError> {
            self.calls.lock().unwrap().push((tau1, tau2));
            let next = self.outcomes.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| self.fallback.clone()))
        }

        fn remove_artifacts(
            &self,
            _task: &MicrographTask,
            segmentation: SegmentationGrid,
        ) -> Result<SegmentationGrid, ProcessingError> {
            Ok(segmentation)
        }

        fn extract_particles(
            &self,
            task: &MicrographTask,
            _segmentation: &SegmentationGrid,
        ) -> Result<PathBuf, ProcessingError> {
            *self.extracted.lock().unwrap() += 1;
            Ok(task.path.with_extension("star"))
        }
    }

    fn mixed() -> SegmentationGrid {
        SegmentationGrid::from_cells(2, 2, 2, vec![PARTICLE, NOISE, NOISE, NOISE]).unwrap()
    }

    fn all(value: u8) -> SegmentationGrid {
        SegmentationGrid::filled(2, 2, 2, value)
    }

    fn task(path: &str, max_tau_adjustments: u32) -> MicrographTask {
        let config = ResolvedConfig {
            particle_size: 300,
            query_image_size: 200,
            query_window_size: 200,
            max_particle_size: 1200,
            min_particle_size: 50,
            minimum_overlap_amount: 30,
            tau1: 48,
            tau2: 480,
            container_size: 450,
            proc: 1,
            output_dir: PathBuf::from("/out"),
            max_tau_adjustments,
        };
        MicrographTask::new(PathBuf::from(path), Arc::new(config))
    }

    fn outcome(result: FlowResult) -> PickOutcome {
        match result {
            FlowResult::Picked(outcome) => outcome,
            FlowResult::Skipped => panic!("expected a picked micrograph"),
        }
    }

    #[test]
    fn test_mixed_segmentation_needs_no_retry() {
        let picker = Arc::new(ScriptedPicker::new(vec![], mixed()));
        let flow = MicrographFlow::new(picker.clone());

        let result = outcome(flow.run(&task("a.mrc", 10)).unwrap());

        assert_eq!(result.adjustments, 0);
        assert_eq!((result.tau1, result.tau2), (48, 480));
        assert_eq!(result.output, Path::new("a.star"));
        assert_eq!(picker.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_all_particle_raises_tau2_once() {
        let picker = Arc::new(ScriptedPicker::new(vec![all(PARTICLE)], mixed()));
        let flow = MicrographFlow::new(picker.clone());

        let result = outcome(flow.run(&task("a.mrc", 10)).unwrap());

        assert_eq!(result.adjustments, 1);
        assert_eq!(result.tau1, 48);
        assert_eq!(result.tau2, 480 + TAU_INCREMENT);
        assert_eq!(*picker.calls.lock().unwrap(), vec![(48, 480), (48, 980)]);
    }

    #[test]
    fn test_all_noise_raises_tau1() {
        let picker = Arc::new(ScriptedPicker::new(vec![all(NOISE), all(NOISE)], mixed()));
        let flow = MicrographFlow::new(picker.clone());

        let result = outcome(flow.run(&task("a.mrc", 10)).unwrap());

        assert_eq!(result.adjustments, 2);
        assert_eq!((result.tau1, result.tau2), (1048, 480));
    }

    #[test]
    fn test_taus_are_local_to_each_run() {
        let picker = Arc::new(ScriptedPicker::new(vec![all(PARTICLE)], mixed()));
        let flow = MicrographFlow::new(picker.clone());
        let task = task("a.mrc", 10);

        flow.run(&task).unwrap();
        let second = outcome(flow.run(&task).unwrap());

        assert_eq!((second.tau1, second.tau2), (48, 480));
        assert_eq!(task.config.tau2, 480);
    }

    #[test]
    fn test_gives_up_after_adjustment_limit() {
        let picker = Arc::new(ScriptedPicker::new(vec![], all(PARTICLE)));
        let flow = MicrographFlow::new(picker.clone());

        let err = flow.run(&task("a.mrc", 3)).unwrap_err();

        match err {
            ProcessingError::NotConverged {
                attempts,
                tau1,
                tau2,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(tau1, 48);
                assert_eq!(tau2, 480 + 3 * TAU_INCREMENT);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(picker.calls.lock().unwrap().len(), 4);
        assert_eq!(*picker.extracted.lock().unwrap(), 0);
    }

    #[test]
    fn test_empty_segmentation_is_an_error() {
        let picker = Arc::new(ScriptedPicker::new(vec![], all(PARTICLE)));
        *picker.outcomes.lock().unwrap() = VecDeque::from([SegmentationGrid::filled(0, 0, 2, NOISE)]);
        let flow = MicrographFlow::new(picker);

        let err = flow.run(&task("a.mrc", 3)).unwrap_err();
        assert!(matches!(err, ProcessingError::EmptyGrid { .. }));
    }

    #[test]
    fn test_non_mrc_file_is_skipped() {
        let picker = Arc::new(ScriptedPicker::new(vec![], mixed()));
        let flow = MicrographFlow::new(picker.clone());

        let result = flow.run(&task("notes.txt", 10)).unwrap();

        assert_eq!(result, FlowResult::Skipped);
        assert!(picker.calls.lock().unwrap().is_empty());
    }
}
