//! 窗口网格
//!
//! micrograph 被划分为边长 `window_size` 的窗口，每个窗口对应网格中的一个单元。

/// 颗粒窗口
pub const PARTICLE: u8 = 1;
/// 噪声窗口
pub const NOISE: u8 = 0;

/// 按行存储的二维窗口网格
#[derive(Clone, Debug, PartialEq)]
pub struct WindowGrid<T> {
    rows: usize,
    cols: usize,
    window_size: usize,
    cells: Vec<T>,
}

/// 每个窗口的查询得分
pub type ScoreGrid = WindowGrid<f64>;

/// 每个窗口的分类结果（[`PARTICLE`] 或 [`NOISE`]）
pub type SegmentationGrid = WindowGrid<u8>;

impl<T: Clone> WindowGrid<T> {
    /// 所有单元都为 `value` 的网格
    pub fn filled(rows: usize, cols: usize, window_size: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            window_size,
            cells: vec![value; rows * cols],
        }
    }
}

impl<T> WindowGrid<T> {
    /// 由按行排列的单元构造，长度不匹配时返回 `None`
    pub fn from_cells(rows: usize, cols: usize, window_size: usize, cells: Vec<T>) -> Option<Self> {
        (cells.len() == rows * cols).then_some(Self {
            rows,
            cols,
            window_size,
            cells,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// 单个窗口的边长（像素）
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        (row < self.rows && col < self.cols).then(|| &self.cells[row * self.cols + col])
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        assert!(row < self.rows && col < self.cols, "cell ({row}, {col}) out of bounds");
        self.cells[row * self.cols + col] = value;
    }
}

/// 分割结果的退化情况
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    /// 没有任何窗口
    Empty,
    /// 全部窗口都被判为颗粒
    AllParticle,
    /// 全部窗口都被判为噪声
    AllNoise,
    /// 正常的混合结果
    Mixed,
}

impl SegmentationGrid {
    pub fn degeneracy(&self) -> Degeneracy {
        if self.cells.is_empty() {
            Degeneracy::Empty
        } else if self.cells.iter().all(|&c| c == PARTICLE) {
            Degeneracy::AllParticle
        } else if self.cells.iter().all(|&c| c == NOISE) {
            Degeneracy::AllNoise
        } else {
            Degeneracy::Mixed
        }
    }

    pub fn particle_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == PARTICLE).count()
    }
}
