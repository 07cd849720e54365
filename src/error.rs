use std::path::PathBuf;

use thiserror::Error;

/// 拾取程序的顶层错误类型
#[derive(Debug, Error)]
pub enum PickerError {
    /// 配置错误（在任何 worker 启动之前抛出）
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 颗粒尺寸既没有通过 -s 指定，也没有在配置中设置
    #[error("未设置颗粒尺寸 (particle_size)！请使用 -s 指定或在配置文件中设置")]
    UnsetParticleSize,

    /// 单个 micrograph 处理失败，会终止整个批次
    #[error("处理错误: {0}")]
    Processing(#[from] ProcessingError),

    /// 无法列出输入目录
    #[error("无法读取输入目录 {}: {source}", path.display())]
    InputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// worker 任务 panic 或被取消
    #[error("worker 任务执行失败: {0}")]
    Worker(#[from] tokio::task::JoinError),

    /// worker 池的信号量已关闭
    #[error("worker 池已关闭: {0}")]
    PoolClosed(#[from] tokio::sync::AcquireError),
}

/// 配置错误
///
/// 校验按固定顺序进行，每个不变量对应一个变体。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("最大颗粒尺寸 (max_particle_size) 必须在 [1, 3000] 范围内！当前值: {0}")]
    MaxParticleSize(u32),

    #[error("查询图像尺寸 (query_image_size) 必须在 [1, 3000] 范围内！当前值: {0}")]
    QueryImageSize(u32),

    #[error("颗粒尺寸 (particle_size) 必须在 [5, 3000) 范围内！当前值: {0}")]
    ParticleSize(u32),

    #[error("最小颗粒尺寸 (min_particle_size) 必须在 [1, 3000) 范围内！当前值: {0}")]
    MinParticleSize(u32),

    #[error("\u{03C4}\u{2081} (tau1) 必须在 [0, {max}] 范围内！当前值: {value}")]
    Tau1 { value: u32, max: f64 },

    #[error("\u{03C4}\u{2082} (tau2) 必须在 [0, {max}] 范围内！当前值: {value}")]
    Tau2 { value: u32, max: f64 },

    #[error("容许重叠 (minimum_overlap_amount) 必须在 [0, 3000] 范围内！当前值: {0}")]
    MinimumOverlap(u32),

    #[error("容器尺寸 (container_size) 必须在 [{particle_size}, 1900] 范围内！当前值: {value}")]
    ContainerSize { value: u32, particle_size: u32 },

    #[error(
        "颗粒尺寸不能小于查询图像尺寸！particle_size: {particle_size}, query_image_size: {query_image_size}"
    )]
    ParticleSmallerThanQuery {
        particle_size: u32,
        query_image_size: u32,
    },

    #[error("至少需要一个处理进程 (proc >= 1)！")]
    NoProcessors,

    #[error("输出目录不存在: {}", .0.display())]
    OutputDirMissing(PathBuf),

    #[error("无法创建输出目录 {}: {source}", path.display())]
    OutputDirCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("无法解析输入目录路径 {}: {source}", path.display())]
    InputDirPath {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("无法读取配置文件 {}: {source}", path.display())]
    ConfigFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("配置文件解析失败 {}: {source}", path.display())]
    ConfigFileParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: &'static str,
    },
}

/// 单个 micrograph 处理过程中的错误
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("读取文件失败 {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("MRC 文件格式错误 {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    #[error("拾取流程失败 {}: {reason}", path.display())]
    Pipeline { path: PathBuf, reason: String },

    #[error("分割网格为空 {}", path.display())]
    EmptyGrid { path: PathBuf },

    #[error(
        "阈值调整 {attempts} 次后分割仍然退化 {} (tau1={tau1}, tau2={tau2})",
        path.display()
    )]
    NotConverged {
        path: PathBuf,
        attempts: u32,
        tau1: u32,
        tau2: u32,
    },

    #[error("写入文件失败 {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ========== Result 类型别名 ==========

/// 拾取程序结果类型
pub type PickResult<T> = Result<T, PickerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_into_picker_error() {
        let err: PickerError = ConfigError::NoProcessors.into();
        assert!(matches!(err, PickerError::Config(ConfigError::NoProcessors)));
        assert!(err.to_string().contains("proc >= 1"));
    }

    #[test]
    fn not_converged_message_names_taus() {
        let err = ProcessingError::NotConverged {
            path: PathBuf::from("a.mrc"),
            attempts: 3,
            tau1: 48,
            tau2: 1980,
        };
        let msg = err.to_string();
        assert!(msg.contains("tau1=48"));
        assert!(msg.contains("tau2=1980"));
    }
}
