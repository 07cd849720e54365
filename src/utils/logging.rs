/// 日志工具模块
///
/// 提供日志初始化和格式化输出的辅助函数
use crate::config::ResolvedConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 报告横幅宽度
const BANNER_WIDTH: usize = 60;

/// 初始化 tracing 日志
///
/// 日志级别由 `RUST_LOG` 控制，默认 `info`。重复调用是安全的。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 输出参数报告
///
/// # 参数
/// - `config`: 解析后的配置
pub fn log_parameter_report(config: &ResolvedConfig) {
    info!("{}", banner(" 参数报告 "));
    for (label, value) in config.report_rows() {
        info!("{}", format_report_row(label, &value));
    }
    info!("{}", banner(" 参数报告 "));
}

/// 参数报告的一行: 标签左对齐 40 列，值左对齐 10 列
pub fn format_report_row(label: &str, value: &str) -> String {
    format!("{:<40} {:<10}", label, value)
}

/// 记录程序启动信息
///
/// # 参数
/// - `proc`: 并发 worker 数
pub fn log_startup(proc: usize) {
    info!("{}", "=".repeat(BANNER_WIDTH));
    info!("🚀 程序启动 - 多线程颗粒拾取模式");
    info!("📊 worker 数量: {}", proc);
    info!("{}", "=".repeat(BANNER_WIDTH));
}

/// 记录 micrograph 扫描结果
///
/// # 参数
/// - `found`: 找到的 .mrc 文件数
/// - `ignored`: 被忽略的其他文件数
pub fn log_micrographs_found(found: usize, ignored: usize) {
    info!("✓ 找到 {} 个 mrc 文件，开始转换..", found);
    if ignored > 0 {
        info!("💡 忽略 {} 个非 mrc 文件", ignored);
    }
}

/// 打印最终统计信息
///
/// # 参数
/// - `picked`: 成功拾取的 micrograph 数
/// - `total`: 分发的 micrograph 总数
/// - `output_dir`: 输出目录
pub fn print_final_stats(picked: usize, total: usize, output_dir: &std::path::Path) {
    info!("{}", "=".repeat(BANNER_WIDTH));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("✅ 成功: {}/{}", picked, total);
    info!("📁 坐标文件已保存至: {}", output_dir.display());
    info!("{}", "=".repeat(BANNER_WIDTH));
}

fn banner(title: &str) -> String {
    let title_width = title.chars().count();
    if title_width >= BANNER_WIDTH {
        return title.to_string();
    }
    let left = (BANNER_WIDTH - title_width) / 2;
    let right = BANNER_WIDTH - title_width - left;
    format!("{}{}{}", "=".repeat(left), title, "=".repeat(right))
}
