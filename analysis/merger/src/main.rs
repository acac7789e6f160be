//! 病灶掩膜批量调和程序.
//!
//! 枚举病灶真值目录下的 `GT_` raw 文件, 在超像素合并卷目录中为每个病例
//! 配对 `OS_` 文件, 逐切片调和出超像素区域并集形式的病灶掩膜 (`ML_` 文件),
//! 汇总逐切片相似度并输出 JSON 与图表.

mod report;
mod runner;

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let summary = runner::run();
    summary.analyze();

    if let Err(e) = report::write_json(&summary) {
        log::error!("JSON 汇总写出失败: {e}");
    }
    if let Err(e) = report::render_charts(&summary) {
        log::error!("图表渲染失败: {e}");
    }
}
