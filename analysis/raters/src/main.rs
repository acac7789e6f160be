//! 标注员一致性分析程序.
//!
//! 加载组间与自身一致性研究的标注目录树, 统计一致面积占比与手动修正占比,
//! 输出 JSON 汇总表与图表.

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
