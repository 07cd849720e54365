//! 默认拾取流水线 - 业务能力层
//!
//! 不依赖外部科学计算包即可运行的 [`Picker`] 实现：
//! - 查询得分: 窗口均值相对全图的归一化对比度（颗粒比背景暗，得分高）
//! - 分类: 得分最高的 `tau1` 个窗口作为颗粒样本，最低的 `tau2` 个作为噪声样本，
//!   按最近质心分类
//! - 去伪影: 按像素跨度过滤 4 连通区域
//! - 输出: 每个区域的质心，去掉越界和重叠过多的框

use crate::error::ProcessingError;
use crate::models::loaders::read_mrc;
use crate::models::{Micrograph, ScoreGrid, SegmentationGrid, NOISE, PARTICLE};
use crate::services::picker::Picker;
use crate::services::star_writer::{Particle, StarWriter};
use crate::workflow::MicrographTask;
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::debug;

/// 默认拾取流水线，无内部状态
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferencePicker;

impl ReferencePicker {
    pub fn new() -> Self {
        Self
    }
}

/// 一个窗口的分类特征: (得分, 归一化标准差)
type Feature = [f64; 2];

/// 一个颗粒连通区域
struct Component {
    cells: Vec<(usize, usize)>,
}

impl Component {
    /// 行、列方向上跨越的窗口数中的较大者
    fn span(&self) -> usize {
        let (mut r0, mut r1, mut c0, mut c1) = (usize::MAX, 0, usize::MAX, 0);
        for &(r, c) in &self.cells {
            r0 = r0.min(r);
            r1 = r1.max(r);
            c0 = c0.min(c);
            c1 = c1.max(c);
        }
        (r1 - r0 + 1).max(c1 - c0 + 1)
    }

    fn centroid(&self, window_size: usize) -> Particle {
        let n = self.cells.len() as f64;
        let w = window_size as f64;
        let (sx, sy) = self.cells.iter().fold((0.0, 0.0), |(sx, sy), &(r, c)| {
            (sx + (c as f64 + 0.5) * w, sy + (r as f64 + 0.5) * w)
        });
        Particle {
            x: sx / n,
            y: sy / n,
        }
    }
}

impl Picker for ReferencePicker {
    fn read_micrograph(&self, task: &MicrographTask) -> Result<Micrograph, ProcessingError> {
        read_mrc(&task.path)
    }

    fn compute_query_score(
        &self,
        task: &MicrographTask,
        micrograph: &Micrograph,
    ) -> Result<ScoreGrid, ProcessingError> {
        let window = task.config.query_image_size as usize;
        if window == 0 || window > micrograph.width() || window > micrograph.height() {
            return Err(ProcessingError::Pipeline {
                path: task.path.clone(),
                reason: format!(
                    "micrograph {}x{} 小于查询窗口 {}",
                    micrograph.width(),
                    micrograph.height(),
                    window
                ),
            });
        }

        let rows = micrograph.height() / window;
        let cols = micrograph.width() / window;
        let global = micrograph.moments();

        let mut grid = ScoreGrid::filled(rows, cols, window, 0.0);
        if global.std > 0.0 {
            for row in 0..rows {
                for col in 0..cols {
                    let local = micrograph.window_moments(col * window, row * window, window);
                    grid.set(row, col, (global.mean - local.mean) / global.std);
                }
            }
        }
        Ok(grid)
    }

    fn classify_windows(
        &self,
        task: &MicrographTask,
        micrograph: &Micrograph,
        score: &ScoreGrid,
        tau1: u32,
        tau2: u32,
    ) -> Result<SegmentationGrid, ProcessingError> {
        let (rows, cols, window) = (score.rows(), score.cols(), score.window_size());
        let n = score.len();
        let particle_count = (tau1 as usize).min(n);
        let noise_count = (tau2 as usize).min(n);

        if particle_count == 0 {
            return Ok(SegmentationGrid::filled(rows, cols, window, NOISE));
        }
        if noise_count == 0 {
            return Ok(SegmentationGrid::filled(rows, cols, window, PARTICLE));
        }

        let global_std = micrograph.moments().std;
        let features: Vec<Feature> = (0..n)
            .map(|i| {
                let (row, col) = (i / cols, i % cols);
                let local = micrograph.window_moments(col * window, row * window, window);
                let deviation = if global_std > 0.0 {
                    local.std / global_std
                } else {
                    0.0
                };
                [score.cells()[i], deviation]
            })
            .collect();

        // 按得分从高到低排序，得分相同按位置
        let mut ranked: Vec<usize> = (0..n).collect();
        ranked.sort_by(|&a, &b| features[b][0].total_cmp(&features[a][0]).then(a.cmp(&b)));

        let particle_centroid = centroid(ranked[..particle_count].iter().map(|&i| features[i]));
        let noise_centroid = centroid(ranked[n - noise_count..].iter().map(|&i| features[i]));

        let cells = features
            .iter()
            .map(|f| {
                if distance_sq(f, &particle_centroid) < distance_sq(f, &noise_centroid) {
                    PARTICLE
                } else {
                    NOISE
                }
            })
            .collect();

        debug!(
            "{} 分类完成 tau1={} tau2={} 颗粒样本={} 噪声样本={}",
            task, tau1, tau2, particle_count, noise_count
        );

        SegmentationGrid::from_cells(rows, cols, window, cells).ok_or_else(|| {
            ProcessingError::Pipeline {
                path: task.path.clone(),
                reason: "分类结果与得分网格尺寸不一致".to_string(),
            }
        })
    }

    fn remove_artifacts(
        &self,
        task: &MicrographTask,
        mut segmentation: SegmentationGrid,
    ) -> Result<SegmentationGrid, ProcessingError> {
        let window = segmentation.window_size();
        let max_size = task.config.max_particle_size as usize;
        let min_size = task.config.min_particle_size as usize;

        let mut removed = 0;
        for component in components(&segmentation) {
            let span_px = component.span() * window;
            if span_px > max_size || span_px < min_size {
                for &(r, c) in &component.cells {
                    segmentation.set(r, c, NOISE);
                }
                removed += 1;
            }
        }

        debug!("{} 去除 {} 个伪影区域", task, removed);
        Ok(segmentation)
    }

    fn extract_particles(
        &self,
        task: &MicrographTask,
        segmentation: &SegmentationGrid,
    ) -> Result<PathBuf, ProcessingError> {
        let config = &task.config;
        let window = segmentation.window_size();
        let width = (segmentation.cols() * window) as f64;
        let height = (segmentation.rows() * window) as f64;
        let box_size = f64::from(config.particle_size);
        let half = box_size / 2.0;
        let tolerated = f64::from(config.minimum_overlap_amount);

        let mut found = components(segmentation);
        // 大区域优先
        found.sort_by(|a, b| b.cells.len().cmp(&a.cells.len()));

        let mut accepted: Vec<Particle> = Vec::new();
        for component in found {
            let p = component.centroid(window);
            let inside = p.x - half >= 0.0
                && p.y - half >= 0.0
                && p.x + half <= width
                && p.y + half <= height;
            if !inside {
                continue;
            }
            let overlaps = accepted.iter().any(|q| {
                let overlap_x = box_size - (p.x - q.x).abs();
                let overlap_y = box_size - (p.y - q.y).abs();
                overlap_x > tolerated && overlap_y > tolerated
            });
            if !overlaps {
                accepted.push(p);
            }
        }

        StarWriter::new(&config.output_dir).write(&task.path, &accepted)
    }
}

fn centroid(features: impl Iterator<Item = Feature>) -> Feature {
    let mut sum = [0.0; 2];
    let mut count = 0usize;
    for f in features {
        sum[0] += f[0];
        sum[1] += f[1];
        count += 1;
    }
    let n = count.max(1) as f64;
    [sum[0] / n, sum[1] / n]
}

fn distance_sq(a: &Feature, b: &Feature) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}

/// 4 连通的颗粒区域，按首个单元的行优先顺序
fn components(segmentation: &SegmentationGrid) -> Vec<Component> {
    let (rows, cols) = (segmentation.rows(), segmentation.cols());
    let mut seen = vec![false; rows * cols];
    let mut out = Vec::new();

    for start in 0..rows * cols {
        if seen[start] || segmentation.cells()[start] != PARTICLE {
            continue;
        }
        seen[start] = true;
        let mut cells = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(i) = queue.pop_front() {
            let (r, c) = (i / cols, i % cols);
            cells.push((r, c));
            let neighbours = [
                (r > 0).then(|| i - cols),
                (r + 1 < rows).then(|| i + cols),
                (c > 0).then(|| i - 1),
                (c + 1 < cols).then(|| i + 1),
            ];
            for j in neighbours.into_iter().flatten() {
                if !seen[j] && segmentation.cells()[j] == PARTICLE {
                    seen[j] = true;
                    queue.push_back(j);
                }
            }
        }
        out.push(Component { cells });
    }
    out
}
