//! 配置解析层
//!
//! 用户只需要提供少量参数（至少是颗粒尺寸），其余参数由 [`resolve`] 推导，
//! 推导完成后统一做范围校验，得到不可变的 [`ResolvedConfig`]。
//!
//! 配置来源（优先级从低到高）：
//! 1. `RawConfig::default()`
//! 2. TOML 配置文件
//! 3. `APPLE_*` 环境变量
//! 4. 命令行参数

use crate::error::{ConfigError, PickResult, PickerError};
use crate::utils::logging;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// 尺寸类参数的上限
pub const MAX_SIZE: u32 = 3000;
/// 容器尺寸上限 (container_size * 2 + 200 <= 4000)
pub const MAX_CONTAINER_SIZE: u32 = 1900;
/// 颗粒尺寸下限
pub const MIN_PARTICLE_SIZE: u32 = 5;
/// 默认输出目录名
pub const OUTPUT_DIR_NAME: &str = "star_dir";

/// tau 推导所基于的 micrograph 边长
const REFERENCE_EXTENT: f64 = 4000.0;

/// 用户提供的原始配置
///
/// `None` 表示未设置，由 [`resolve`] 推导。
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub particle_size: Option<u32>,
    pub query_image_size: Option<u32>,
    pub query_window_size: Option<u32>,
    pub max_particle_size: Option<u32>,
    pub min_particle_size: Option<u32>,
    pub minimum_overlap_amount: Option<u32>,
    pub tau1: Option<u32>,
    pub tau2: Option<u32>,
    pub container_size: u32,
    /// 同时处理的 micrograph 数量
    pub proc: usize,
    pub output_dir: Option<PathBuf>,
    /// 分割退化时最多调整阈值的次数
    pub max_tau_adjustments: u32,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            particle_size: None,
            query_image_size: None,
            query_window_size: None,
            max_particle_size: None,
            min_particle_size: None,
            minimum_overlap_amount: None,
            tau1: None,
            tau2: None,
            container_size: 450,
            proc: 1,
            output_dir: None,
            max_tau_adjustments: 100,
        }
    }
}

impl RawConfig {
    /// 从 TOML 文件加载，未出现的字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ConfigFileRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ConfigFileParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 叠加 `APPLE_*` 环境变量
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// 叠加由 `lookup` 提供的覆盖值（变量名与环境变量相同）
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = &lookup;
        override_opt(&mut self.particle_size, lookup, "APPLE_PARTICLE_SIZE")?;
        override_opt(&mut self.query_image_size, lookup, "APPLE_QUERY_IMAGE_SIZE")?;
        override_opt(&mut self.query_window_size, lookup, "APPLE_QUERY_WINDOW_SIZE")?;
        override_opt(&mut self.max_particle_size, lookup, "APPLE_MAX_PARTICLE_SIZE")?;
        override_opt(&mut self.min_particle_size, lookup, "APPLE_MIN_PARTICLE_SIZE")?;
        override_opt(
            &mut self.minimum_overlap_amount,
            lookup,
            "APPLE_MINIMUM_OVERLAP_AMOUNT",
        )?;
        override_opt(&mut self.tau1, lookup, "APPLE_TAU1")?;
        override_opt(&mut self.tau2, lookup, "APPLE_TAU2")?;
        if let Some(v) = parse_var(lookup, "APPLE_CONTAINER_SIZE")? {
            self.container_size = v;
        }
        if let Some(v) = parse_var(lookup, "APPLE_PROC")? {
            self.proc = v;
        }
        if let Some(v) = lookup("APPLE_OUTPUT_DIR") {
            self.output_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = parse_var(lookup, "APPLE_MAX_TAU_ADJUSTMENTS")? {
            self.max_tau_adjustments = v;
        }
        Ok(self)
    }
}

fn override_opt<T, F>(slot: &mut Option<T>, lookup: &F, name: &str) -> Result<(), ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = parse_var(lookup, name)? {
        *slot = Some(v);
    }
    Ok(())
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: name.to_string(),
                value,
                expected_type: std::any::type_name::<T>(),
            }),
    }
}

/// 推导并校验后的配置，创建后不再修改
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConfig {
    pub particle_size: u32,
    pub query_image_size: u32,
    pub query_window_size: u32,
    pub max_particle_size: u32,
    pub min_particle_size: u32,
    pub minimum_overlap_amount: u32,
    pub tau1: u32,
    pub tau2: u32,
    pub container_size: u32,
    pub proc: usize,
    pub output_dir: PathBuf,
    pub max_tau_adjustments: u32,
}

impl ResolvedConfig {
    /// 按固定顺序检查所有不变量，返回第一个违反的
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_SIZE).contains(&self.max_particle_size) {
            return Err(ConfigError::MaxParticleSize(self.max_particle_size));
        }
        if !(1..=MAX_SIZE).contains(&self.query_image_size) {
            return Err(ConfigError::QueryImageSize(self.query_image_size));
        }
        if !(MIN_PARTICLE_SIZE..MAX_SIZE).contains(&self.particle_size) {
            return Err(ConfigError::ParticleSize(self.particle_size));
        }
        if !(1..MAX_SIZE).contains(&self.min_particle_size) {
            return Err(ConfigError::MinParticleSize(self.min_particle_size));
        }

        let max_tau = max_tau(self.query_image_size);
        if f64::from(self.tau1) > max_tau {
            return Err(ConfigError::Tau1 {
                value: self.tau1,
                max: max_tau,
            });
        }
        if f64::from(self.tau2) > max_tau {
            return Err(ConfigError::Tau2 {
                value: self.tau2,
                max: max_tau,
            });
        }

        if self.minimum_overlap_amount > MAX_SIZE {
            return Err(ConfigError::MinimumOverlap(self.minimum_overlap_amount));
        }
        if !(self.particle_size..=MAX_CONTAINER_SIZE).contains(&self.container_size) {
            return Err(ConfigError::ContainerSize {
                value: self.container_size,
                particle_size: self.particle_size,
            });
        }
        if self.particle_size < self.query_image_size {
            return Err(ConfigError::ParticleSmallerThanQuery {
                particle_size: self.particle_size,
                query_image_size: self.query_image_size,
            });
        }
        if self.proc < 1 {
            return Err(ConfigError::NoProcessors);
        }
        Ok(())
    }

    /// 参数报告的行（标签, 值），顺序固定
    pub fn report_rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("颗粒尺寸 (particle size)", self.particle_size.to_string()),
            ("查询图像尺寸 (query image size)", self.query_image_size.to_string()),
            ("最大颗粒尺寸 (maximum particle size)", self.max_particle_size.to_string()),
            ("最小颗粒尺寸 (minimal particle size)", self.min_particle_size.to_string()),
            ("容许重叠 (tolerated overlap)", self.minimum_overlap_amount.to_string()),
            ("颗粒训练集大小 (tau1)", self.tau1.to_string()),
            ("噪声训练集大小 (tau2)", self.tau2.to_string()),
            ("容器尺寸 (container size)", self.container_size.to_string()),
            ("进程池大小 (processor pool size)", self.proc.to_string()),
            ("输出目录 (output directory)", self.output_dir.display().to_string()),
        ]
    }
}

/// 推导缺失参数、校验并返回最终配置
///
/// 只有在全部推导完成后才做校验；校验通过后才会创建默认输出目录，
/// 并输出参数报告。
pub fn resolve(raw: RawConfig, input_dir: &Path) -> PickResult<ResolvedConfig> {
    let particle_size = raw.particle_size.ok_or(PickerError::UnsetParticleSize)?;

    let query_window_size = raw
        .query_window_size
        .unwrap_or_else(|| derive_query_window_size(particle_size));
    let query_image_size = raw.query_image_size.unwrap_or(query_window_size);

    let q_box = q_box(query_image_size);

    let (output_dir, create_output_dir) = match raw.output_dir {
        Some(dir) => (dir, false),
        None => (derive_output_dir(input_dir)?, true),
    };

    let resolved = ResolvedConfig {
        particle_size,
        query_image_size,
        query_window_size,
        max_particle_size: raw.max_particle_size.unwrap_or(particle_size.saturating_mul(4)),
        min_particle_size: raw.min_particle_size.unwrap_or(particle_size / 6),
        minimum_overlap_amount: raw.minimum_overlap_amount.unwrap_or(particle_size / 10),
        tau1: raw.tau1.unwrap_or((q_box * 3.0 / 100.0) as u32),
        tau2: raw.tau2.unwrap_or((q_box * 30.0 / 100.0) as u32),
        container_size: raw.container_size,
        proc: raw.proc,
        output_dir,
        max_tau_adjustments: raw.max_tau_adjustments,
    };

    resolved.validate()?;

    if create_output_dir {
        std::fs::create_dir_all(&resolved.output_dir).map_err(|source| {
            ConfigError::OutputDirCreate {
                path: resolved.output_dir.clone(),
                source,
            }
        })?;
    } else if !resolved.output_dir.is_dir() {
        return Err(ConfigError::OutputDirMissing(resolved.output_dir).into());
    }

    logging::log_parameter_report(&resolved);

    Ok(resolved)
}

/// 查询窗口尺寸: floor(particle_size * 2 / 3)，再向下取到 4 的倍数
pub fn derive_query_window_size(particle_size: u32) -> u32 {
    let size = particle_size.saturating_mul(2) / 3;
    size - size % 4
}

/// 默认输出目录: 当前工作目录下的 `star_dir/<输入目录名>`
pub fn derive_output_dir(input_dir: &Path) -> Result<PathBuf, ConfigError> {
    let path_error = |source| ConfigError::InputDirPath {
        path: input_dir.to_path_buf(),
        source,
    };

    let absolute = std::path::absolute(input_dir).map_err(path_error)?;
    let relative = match absolute.file_name() {
        Some(name) => Path::new(OUTPUT_DIR_NAME).join(name),
        None => PathBuf::from(OUTPUT_DIR_NAME),
    };
    std::path::absolute(relative).map_err(path_error)
}

fn q_box(query_image_size: u32) -> f64 {
    let q = f64::from(query_image_size);
    REFERENCE_EXTENT * REFERENCE_EXTENT / (q * q) * 4.0
}

/// tau1 / tau2 的上限: (4000 / query_image_size * 2)^2
pub fn max_tau(query_image_size: u32) -> f64 {
    (REFERENCE_EXTENT / f64::from(query_image_size) * 2.0).powi(2)
}
