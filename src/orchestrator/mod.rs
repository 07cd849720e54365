//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和并发调度，是整个系统的"指挥中心"。
//!
//! ### `batch_processor` - 批量 micrograph 处理器
//! - 扫描输入目录，过滤出 .mrc 文件
//! - 控制并发数量（Semaphore）
//! - 等待所有任务完成，任一失败即终止
//! - 输出全局统计信息
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<MicrographTask>)
//!     ↓
//! workflow::MicrographFlow (处理单个 micrograph，含阈值修复)
//!     ↓
//! services::Picker (能力层：读取 / 打分 / 分类 / 去伪影 / 输出)
//! ```

pub mod batch_processor;

pub use batch_processor::{list_micrographs, BatchCoordinator, BatchStats, MicrographListing};
