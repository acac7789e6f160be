//! 一致性统计的汇总与输出.

use ann_berry::plot::{self, BarSeries};
use std::collections::BTreeMap;
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

/// 按一致人数分档的面积占比统计.
pub struct AgreementStats {
    /// `mean[k - 1]`: 恰好 `k` 人一致的面积占比均值.
    pub mean: Vec<f64>,

    /// 与 `mean` 逐档对应的标准差.
    pub std: Vec<f64>,

    /// 参与统计的病例数.
    pub cases: usize,
}

/// 标量统计 (均值, 标准差, 样本数).
pub struct ScalarStats {
    /// 均值.
    pub mean: f64,

    /// 总体标准差.
    pub std: f64,

    /// 样本数.
    pub n: usize,
}

/// 一致性分析的最终结果.
///
/// 组间/自身一致性两张表以标注类型目录名为键;
/// 修正占比跨部位合并, 以协议分组为键, 组内再按部位分列.
pub struct RaterSummary {
    /// 组间一致面积占比.
    pub inter_agreement: BTreeMap<String, AgreementStats>,

    /// 手动修正量占比 (仅超像素协议), 协议分组 -> 部位 -> 统计.
    pub correction_ratio: BTreeMap<String, BTreeMap<String, ScalarStats>>,

    /// 自身一致性 (跨批次完全一致的面积占比).
    pub intra_consistency: BTreeMap<String, ScalarStats>,

    /// 输出目录.
    pub out_dir: PathBuf,
}

/// 将单个标注类型的统计写进 `w` 中.
fn describe_into<W: Write>(
    name: &str,
    agree: Option<&AgreementStats>,
    intra: Option<&ScalarStats>,
    w: &mut W,
) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Annotation type `{name}`:")?;
    if let Some(s) = agree {
        for (k, (m, sd)) in s.mean.iter().zip(s.std.iter()).enumerate() {
            writeln!(
                w,
                "{S4}Exactly {} rater(s) agree: {m:.4} ± {sd:.4} ({} cases)",
                k + 1,
                s.cases
            )?;
        }
    }
    if let Some(s) = intra {
        writeln!(
            w,
            "{S4}Intra-rater consistency: {:.4} ± {:.4} (n = {})",
            s.mean, s.std, s.n
        )?;
    }
    Ok(())
}

impl RaterSummary {
    /// 全部出现过的标注类型目录名.
    fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inter_agreement
            .keys()
            .chain(self.intra_consistency.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// 分析运行结果.
    pub fn analyze(&self) {
        utils::sep();
        let mut buf = Vec::with_capacity(512);

        for name in self.type_names() {
            describe_into(
                &name,
                self.inter_agreement.get(&name),
                self.intra_consistency.get(&name),
                &mut buf,
            )
            .unwrap();
            print!("{}", std::str::from_utf8(&buf).unwrap());
            buf.clear();

            utils::sep();
        }

        for (bucket, regions) in &self.correction_ratio {
            println!("Manual correction ratio, protocol `{bucket}`:");
            for (region, s) in regions {
                println!(
                    "    {region}: {:.4} ± {:.4} (n = {})",
                    s.mean, s.std, s.n
                );
            }
            utils::sep();
        }
    }
}

/// 将三张统计表写为 `agreement_summary.json`.
pub fn write_json(summary: &RaterSummary) -> io::Result<()> {
    let inter: serde_json::Map<String, serde_json::Value> = summary
        .inter_agreement
        .iter()
        .map(|(name, s)| {
            (
                name.clone(),
                serde_json::json!({
                    "mean": s.mean,
                    "std": s.std,
                    "cases": s.cases,
                }),
            )
        })
        .collect();
    let scalar_table = |table: &BTreeMap<String, ScalarStats>| -> serde_json::Value {
        table
            .iter()
            .map(|(name, s)| {
                (
                    name.clone(),
                    serde_json::json!({ "mean": s.mean, "std": s.std, "n": s.n }),
                )
            })
            .collect::<serde_json::Map<_, _>>()
            .into()
    };
    let correction: serde_json::Map<String, serde_json::Value> = summary
        .correction_ratio
        .iter()
        .map(|(bucket, regions)| (bucket.clone(), scalar_table(regions)))
        .collect();

    let doc = serde_json::json!({
        "inter_rater_agreement": inter,
        "manual_correction_ratio": correction,
        "intra_rater_consistency": scalar_table(&summary.intra_consistency),
    });

    let path = summary.out_dir.join("agreement_summary.json");
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &doc)?;
    Ok(())
}

/// 渲染一致面积堆叠柱状图与带误差棒的占比柱状图.
pub fn render_charts(summary: &RaterSummary) -> Result<(), Box<dyn Error>> {
    if !summary.inter_agreement.is_empty() {
        let groups: Vec<String> = summary.inter_agreement.keys().cloned().collect();
        let k_len = summary
            .inter_agreement
            .values()
            .map(|s| s.mean.len())
            .max()
            .unwrap();
        let series: Vec<BarSeries> = (0..k_len)
            .map(|k| BarSeries {
                label: format!("{} rater(s)", k + 1),
                values: summary
                    .inter_agreement
                    .values()
                    .map(|s| s.mean.get(k).copied().unwrap_or(0.0))
                    .collect(),
                std: None,
            })
            .collect();
        plot::stacked_bar_chart(
            summary.out_dir.join("inter_rater_agreement.png"),
            "Inter-rater agreement area",
            &groups,
            &series,
        )?;
    }

    if !summary.correction_ratio.is_empty() {
        // 每个协议分组为一组柱, 部位为组内系列.
        let groups: Vec<String> = summary.correction_ratio.keys().cloned().collect();
        let mut regions: Vec<String> = summary
            .correction_ratio
            .values()
            .flat_map(|t| t.keys().cloned())
            .collect();
        regions.sort();
        regions.dedup();
        let series: Vec<BarSeries> = regions
            .into_iter()
            .map(|region| BarSeries {
                values: summary
                    .correction_ratio
                    .values()
                    .map(|t| t.get(&region).map_or(0.0, |s| s.mean))
                    .collect(),
                std: Some(
                    summary
                        .correction_ratio
                        .values()
                        .map(|t| t.get(&region).map_or(0.0, |s| s.std))
                        .collect(),
                ),
                label: region,
            })
            .collect();
        plot::grouped_bar_chart(
            summary.out_dir.join("manual_correction_ratio.png"),
            "Manual correction versus superpixel area",
            &groups,
            &series,
        )?;
    }

    if !summary.intra_consistency.is_empty() {
        let groups: Vec<String> = summary.intra_consistency.keys().cloned().collect();
        let series = [BarSeries {
            label: "unanimous area ratio".to_owned(),
            values: summary.intra_consistency.values().map(|s| s.mean).collect(),
            std: Some(summary.intra_consistency.values().map(|s| s.std).collect()),
        }];
        plot::grouped_bar_chart(
            summary.out_dir.join("intra_rater_consistency.png"),
            "Intra-rater consistency across series",
            &groups,
            &series,
        )?;
    }
    Ok(())
}
