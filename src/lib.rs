//! # Apple Picker
//!
//! 在电子显微镜 micrograph 中批量拾取颗粒的 Rust 程序
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 配置层（Config）
//! - `config/` - 由少量参数推导出完整配置并做范围校验
//! - `ResolvedConfig` - 不可变配置，所有 worker 共享
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"对一张 micrograph 我能做什么"
//! - `Picker` - 读取 / 打分 / 分类 / 去伪影 / 输出 的能力接口
//! - `ReferencePicker` - 默认实现
//! - `StarWriter` - 写 .star 坐标文件能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一张 micrograph"的完整处理流程
//! - `MicrographTask` - 任务描述（文件路径 + 配置快照）
//! - `MicrographFlow` - 流程编排，含退化分割的阈值修复
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量处理器，管理并发和快速失败

pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{resolve, RawConfig, ResolvedConfig};
pub use error::{ConfigError, PickResult, PickerError, ProcessingError};
pub use models::{Micrograph, ScoreGrid, SegmentationGrid};
pub use orchestrator::{BatchCoordinator, BatchStats};
pub use services::{Picker, ReferencePicker};
pub use utils::logging as logger;
pub use workflow::{FlowResult, MicrographFlow, MicrographTask, PickOutcome};
