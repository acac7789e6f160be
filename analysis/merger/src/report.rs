//! 调和结果的汇总与输出.

use ann_berry::plot::{self, BarSeries};
use ann_berry::similarity::Similarity;
use std::error::Error;
use std::io::{self, Write};

/// 单病例的调和结果.
pub struct CaseOutcome {
    /// 病例编号.
    pub case_no: u32,

    /// 超像素合并卷中的标签值个数.
    pub sp_regions: usize,

    /// 调和掩膜对真值的逐切片相似度均值.
    pub sim: Similarity,
}

/// 批量调和的最终结果.
pub struct MergeSummary {
    /// 成功调和的病例, 按编号升序.
    pub outcomes: Vec<CaseOutcome>,

    /// 被跳过的病例编号.
    pub skipped: Vec<u32>,

    /// 输出目录.
    pub out_dir: std::path::PathBuf,
}

fn f64_to_display(f: Option<f64>) -> String {
    match f {
        Some(f) => format!("{f:.6}"),
        None => "/".to_string(),
    }
}

/// 将单个病例的结果写进 `w` 中.
fn describe_into<W: Write>(o: &CaseOutcome, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Case `{}`:", o.case_no)?;
    writeln!(w, "{S4}Superpixel regions: {}", o.sp_regions)?;
    writeln!(w, "{S4}Mean slice IoU: {}", f64_to_display(o.sim.iou))?;
    write!(w, "{S4}Mean slice Dice: {}", f64_to_display(o.sim.dice))?;
    Ok(())
}

impl MergeSummary {
    /// 分析运行结果.
    pub fn analyze(&self) {
        utils::sep();
        let mut buf = Vec::with_capacity(512);

        for outcome in self.outcomes.iter() {
            describe_into(outcome, &mut buf).unwrap();
            println!("{}", std::str::from_utf8(&buf).unwrap());
            buf.clear();

            utils::sep();
        }

        if !self.skipped.is_empty() {
            println!("Skipped cases: {:?}", self.skipped);
            utils::sep();
        }
    }
}

/// 将逐切片相似度汇总写为 `similarity_by_slice.json`.
///
/// 均值无意义 (全空病例) 的条目不写入.
pub fn write_json(summary: &MergeSummary) -> io::Result<()> {
    let mut table = serde_json::Map::new();
    for o in &summary.outcomes {
        let Some(iou) = o.sim.iou else {
            continue;
        };
        table.insert(
            o.case_no.to_string(),
            serde_json::json!({
                "iou": iou,
                "dice": o.sim.dice,
                "sp_regions": o.sp_regions,
            }),
        );
    }

    let path = summary.out_dir.join("similarity_by_slice.json");
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &serde_json::Value::Object(table))?;
    Ok(())
}

/// 渲染逐病例相似度柱状图与 "超像素个数 - 相似度" 折线图.
pub fn render_charts(summary: &MergeSummary) -> Result<(), Box<dyn Error>> {
    let defined: Vec<&CaseOutcome> = summary
        .outcomes
        .iter()
        .filter(|o| o.sim.iou.is_some())
        .collect();
    if defined.is_empty() {
        log::warn!("没有可绘制的病例, 跳过图表渲染");
        return Ok(());
    }

    let groups: Vec<String> = defined.iter().map(|o| o.case_no.to_string()).collect();
    let series = [
        BarSeries {
            label: "IoU".to_owned(),
            values: defined.iter().map(|o| o.sim.iou.unwrap_or(0.0)).collect(),
            std: None,
        },
        BarSeries {
            label: "Dice".to_owned(),
            values: defined.iter().map(|o| o.sim.dice.unwrap_or(0.0)).collect(),
            std: None,
        },
    ];
    plot::grouped_bar_chart(
        summary.out_dir.join("similarity_by_case.png"),
        "Merged mask similarity by case",
        &groups,
        &series,
    )?;

    let iou_pts: Vec<(f64, f64)> = defined
        .iter()
        .filter_map(|o| Some((o.sp_regions as f64, o.sim.iou?)))
        .collect();
    let dice_pts: Vec<(f64, f64)> = defined
        .iter()
        .filter_map(|o| Some((o.sp_regions as f64, o.sim.dice?)))
        .collect();
    plot::line_chart(
        summary.out_dir.join("superpixels_performance.png"),
        "Similarity versus superpixel count",
        ("superpixel regions", "mean slice similarity"),
        &[("IoU".to_owned(), iou_pts), ("Dice".to_owned(), dice_pts)],
    )?;
    Ok(())
}
