/// 单张 micrograph 的强度网格（按行存储，`pixels[y * width + x]`）
#[derive(Clone, Debug, PartialEq)]
pub struct Micrograph {
    width: usize,
    height: usize,
    pixels: Vec<f64>,
}

/// 一组像素的均值和标准差
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Moments {
    pub mean: f64,
    pub std: f64,
}

impl Micrograph {
    /// 像素数量与尺寸不匹配时返回 `None`
    pub fn new(width: usize, height: usize, pixels: Vec<f64>) -> Option<Self> {
        (pixels.len() == width * height).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[f64] {
        &self.pixels
    }

    /// 全图均值和标准差
    pub fn moments(&self) -> Moments {
        moments(self.pixels.iter().copied())
    }

    /// 左上角为 (x, y)、边长 `size` 的窗口的均值和标准差
    ///
    /// 超出图像的部分被裁掉。
    pub fn window_moments(&self, x: usize, y: usize, size: usize) -> Moments {
        let x_end = (x + size).min(self.width);
        let y_end = (y + size).min(self.height);
        let rows = (y.min(y_end)..y_end).flat_map(|row| {
            let start = row * self.width;
            self.pixels[start + x.min(x_end)..start + x_end].iter().copied()
        });
        moments(rows)
    }
}

fn moments(values: impl Iterator<Item = f64>) -> Moments {
    let mut count = 0usize;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for v in values {
        count += 1;
        sum += v;
        sum_sq += v * v;
    }
    if count == 0 {
        return Moments { mean: 0.0, std: 0.0 };
    }
    let n = count as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    Moments {
        mean,
        std: variance.sqrt(),
    }
}
