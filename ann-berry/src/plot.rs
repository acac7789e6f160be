//! 聚合统计结果的图表渲染.
//!
//! 本模块只负责把 **已经聚合好的** 数值画成 PNG 图表, 不做任何统计计算.
//! 所有函数在画图前都会确保输出文件的父目录存在.

use ordered_float::NotNan;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::error::Error;
use std::path::Path;

/// 一组带标签的柱状数据. `std` 存在时以误差棒形式叠加在柱顶.
#[derive(Clone, Debug)]
pub struct BarSeries {
    /// 序列名, 显示在图例中.
    pub label: String,

    /// 每个分组一个数值, 长度与分组标签一致.
    pub values: Vec<f64>,

    /// 每个分组的标准差. `None` 时不画误差棒.
    pub std: Option<Vec<f64>>,
}

/// 序列中的最大纵轴值 (含误差棒顶端). 全空时取 1.
fn y_axis_top(series: &[BarSeries]) -> f64 {
    let top = series
        .iter()
        .flat_map(|s| {
            s.values.iter().enumerate().map(|(i, &v)| {
                v + s
                    .std
                    .as_ref()
                    .and_then(|stds| stds.get(i).copied())
                    .unwrap_or(0.0)
            })
        })
        .filter_map(|v| NotNan::new(v).ok())
        .max();
    top.map_or(1.0, |v| (v.into_inner() * 1.1).max(1e-6))
}

/// 确保输出文件父目录存在, 并创建画布.
fn prepare_root(
    path: &Path,
    size: (u32, u32),
) -> Result<DrawingArea<BitMapBackend<'_>, Shift>, Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    Ok(root)
}

const PALETTE: [RGBColor; 5] = [
    RGBColor(68, 114, 196),
    RGBColor(237, 125, 49),
    RGBColor(112, 173, 71),
    RGBColor(165, 165, 165),
    RGBColor(255, 192, 0),
];

/// 渲染分组柱状图: 每个分组并排画出各序列的一根柱, 可选标准差误差棒.
///
/// `groups` 是分组标签 (如病例编号或协议分组名); 每个序列的 `values`
/// 长度必须等于 `groups` 长度, 否则程序 panic.
pub fn grouped_bar_chart<P: AsRef<Path>>(
    path: P,
    title: &str,
    groups: &[String],
    series: &[BarSeries],
) -> Result<(), Box<dyn Error>> {
    for s in series {
        assert_eq!(s.values.len(), groups.len(), "序列长度与分组个数不符");
    }

    let root = prepare_root(path.as_ref(), (1024, 640))?;
    let y_top = y_axis_top(series);

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(16)
        .x_label_area_size(48)
        .y_label_area_size(56)
        .build_cartesian_2d(0f64..groups.len() as f64, 0f64..y_top)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(groups.len())
        .x_label_formatter(&|x| {
            // 坐标落在分组中心附近时显示分组标签.
            groups
                .get(x.floor() as usize)
                .cloned()
                .unwrap_or_default()
        })
        .draw()?;

    // 每个分组占宽 1, 其中 0.8 均分给各序列的柱.
    let bar_w = 0.8 / series.len() as f64;
    for (si, s) in series.iter().enumerate() {
        let color = PALETTE[si % PALETTE.len()];
        chart
            .draw_series(s.values.iter().enumerate().map(|(gi, &v)| {
                let x0 = gi as f64 + 0.1 + si as f64 * bar_w;
                Rectangle::new([(x0, 0.0), (x0 + bar_w, v)], color.filled())
            }))?
            .label(s.label.clone())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));

        if let Some(stds) = &s.std {
            chart.draw_series(stds.iter().enumerate().map(|(gi, &sd)| {
                let x = gi as f64 + 0.1 + (si as f64 + 0.5) * bar_w;
                let v = s.values[gi];
                ErrorBar::new_vertical(
                    x,
                    (v - sd).max(0.0),
                    v,
                    (v + sd).min(y_top),
                    BLACK.filled(),
                    6,
                )
            }))?;
        }
    }

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()?;
    root.present()?;
    Ok(())
}

/// 渲染堆叠柱状图: 每个分组画一根柱, 各序列的数值自下而上堆叠.
///
/// 适合一致性面积比这类分量和为 1 的比例数据.
pub fn stacked_bar_chart<P: AsRef<Path>>(
    path: P,
    title: &str,
    groups: &[String],
    series: &[BarSeries],
) -> Result<(), Box<dyn Error>> {
    for s in series {
        assert_eq!(s.values.len(), groups.len(), "序列长度与分组个数不符");
    }

    let root = prepare_root(path.as_ref(), (1024, 640))?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(16)
        .x_label_area_size(48)
        .y_label_area_size(56)
        .build_cartesian_2d(0f64..groups.len() as f64, 0f64..1.05f64)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(groups.len())
        .x_label_formatter(&|x| {
            groups
                .get(x.floor() as usize)
                .cloned()
                .unwrap_or_default()
        })
        .draw()?;

    let mut base = vec![0.0f64; groups.len()];
    for (si, s) in series.iter().enumerate() {
        let color = PALETTE[si % PALETTE.len()];
        let segments: Vec<_> = s
            .values
            .iter()
            .enumerate()
            .map(|(gi, &v)| {
                let x0 = gi as f64 + 0.15;
                let seg = Rectangle::new(
                    [(x0, base[gi]), (x0 + 0.7, base[gi] + v)],
                    color.filled(),
                );
                base[gi] += v;
                seg
            })
            .collect();
        chart
            .draw_series(segments)?
            .label(s.label.clone())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()?;
    root.present()?;
    Ok(())
}

/// 渲染折线图: 每个序列一条折线, 点按横坐标升序连接.
pub fn line_chart<P: AsRef<Path>>(
    path: P,
    title: &str,
    (x_desc, y_desc): (&str, &str),
    series: &[(String, Vec<(f64, f64)>)],
) -> Result<(), Box<dyn Error>> {
    let root = prepare_root(path.as_ref(), (1024, 640))?;

    let all_pts = series.iter().flat_map(|(_, pts)| pts.iter());
    let x_max = all_pts
        .clone()
        .filter_map(|&(x, _)| NotNan::new(x).ok())
        .max()
        .map_or(1.0, NotNan::into_inner);
    let y_max = all_pts
        .filter_map(|&(_, y)| NotNan::new(y).ok())
        .max()
        .map_or(1.0, |v| (v.into_inner() * 1.1).max(1e-6));

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(16)
        .x_label_area_size(48)
        .y_label_area_size(56)
        .build_cartesian_2d(0f64..x_max * 1.05, 0f64..y_max)?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()?;

    for (si, (label, pts)) in series.iter().enumerate() {
        let color = PALETTE[si % PALETTE.len()];
        let mut pts = pts.clone();
        pts.sort_by_key(|&(x, _)| NotNan::new(x).ok());

        chart
            .draw_series(LineSeries::new(pts.iter().copied(), color.stroke_width(2)))?
            .label(label.clone())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 16, y)], color.stroke_width(2))
            });
        chart.draw_series(
            pts.iter()
                .map(|&p| Circle::new(p, 4, color.filled())),
        )?;
    }

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()?;
    root.present()?;
    Ok(())
}
