//! 程序运行函数与聚合逻辑.

use crate::report::{AgreementStats, RaterSummary, ScalarStats};
use ann_berry::agreement::{self, AgreementRatios};
use ann_berry::prelude::*;
use std::collections::BTreeMap;
use utils::loader;

/// 实际运行.
pub fn run() -> RaterSummary {
    let root = loader::study_dir_from_env_or_home();
    assert!(root.is_dir(), "标注研究根目录不存在");
    let out_dir = loader::out_dir_from_env_or_home();
    std::fs::create_dir_all(&out_dir).expect("无法创建输出目录");

    let cfg = StudyConfig::new(&root);
    println!("Loading annotation study from {}...", root.display());
    let inter = study::load_interrater(&cfg).expect("组间研究加载失败");
    let intra = study::load_intrarater(&cfg).expect("自身一致性研究加载失败");
    log::info!("组间 {} 条测量, 自身一致性 {} 条测量", inter.len(), intra.len());

    RaterSummary {
        inter_agreement: inter_agreement(&inter),
        correction_ratio: correction_ratio(&inter),
        intra_consistency: intra_consistency(&intra),
        out_dir,
    }
}

/// 对每个键值组, 以合成掩膜计算一致面积占比. 不足两个掩膜的组跳过.
fn group_ratios<K: Ord + std::fmt::Debug>(
    groups: BTreeMap<K, Vec<&MaskVolume>>,
) -> Vec<(K, AgreementRatios)> {
    groups
        .into_iter()
        .filter_map(|(key, masks)| {
            if masks.len() < 2 {
                log::warn!("组 {key:?} 仅 {} 个掩膜, 跳过", masks.len());
                return None;
            }
            Some((key, agreement::agreement_area_ratio(&masks)))
        })
        .collect()
}

/// 组间研究: 逐 (标注类型, 病例) 的跨标注员一致面积占比,
/// 再按标注类型聚合出每档 `k` 的均值与标准差.
pub fn inter_agreement(data: &StudyData) -> BTreeMap<String, AgreementStats> {
    let mut groups: BTreeMap<(AnnotationType, u32), Vec<&MaskVolume>> = BTreeMap::new();
    for (key, ann) in data {
        groups
            .entry((key.ann_type, key.case_no))
            .or_default()
            .push(&ann.combined);
    }

    let mut by_type: BTreeMap<String, Vec<AgreementRatios>> = BTreeMap::new();
    for ((ann_type, _), ratios) in group_ratios(groups) {
        by_type.entry(ann_type.dir_name()).or_default().push(ratios);
    }

    by_type
        .into_iter()
        .map(|(name, all)| {
            let k_len = all[0].ratios.len();
            let mut mean = Vec::with_capacity(k_len);
            let mut std = Vec::with_capacity(k_len);
            for k in 0..k_len {
                let vals: Vec<f64> = all.iter().map(|r| r.ratios[k]).collect();
                // `all` 非空, 统计必有结果.
                let (m, s) = agreement::mean_std(&vals).unwrap();
                mean.push(m);
                std.push(s);
            }
            (
                name,
                AgreementStats {
                    mean,
                    std,
                    cases: all.len(),
                },
            )
        })
        .collect()
}

/// 组间研究: 超像素协议下手动修正量与超像素标注量之比.
///
/// 跨部位合并到协议分组 (`LSC-lower` 等), 分组内再按部位 (SIJ/Knee) 分列.
pub fn correction_ratio(data: &StudyData) -> BTreeMap<String, BTreeMap<String, ScalarStats>> {
    let mut grouped: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
    for (key, ann) in data {
        let Some(sp) = &ann.sp else {
            continue;
        };
        match agreement::manual_to_sp_ratio(&ann.manual, sp) {
            Some(ratio) => grouped
                .entry((
                    key.ann_type.display_bucket().to_owned(),
                    key.ann_type.region.display_name().to_owned(),
                ))
                .or_default()
                .push(ratio),
            None => log::warn!(
                "标注员 {} 病例 {} 的超像素标注为空, 修正占比无意义",
                key.rater,
                key.case_no
            ),
        }
    }

    let mut out: BTreeMap<String, BTreeMap<String, ScalarStats>> = BTreeMap::new();
    for ((bucket, region), vals) in grouped {
        let (mean, std) = agreement::mean_std(&vals).unwrap();
        out.entry(bucket).or_default().insert(
            region,
            ScalarStats {
                mean,
                std,
                n: vals.len(),
            },
        );
    }
    out
}

/// 自身一致性研究: 同一标注员跨批次的合成掩膜一致性 (全批次一致的面积占比),
/// 按标注类型聚合.
pub fn intra_consistency(data: &StudyData) -> BTreeMap<String, ScalarStats> {
    let mut groups: BTreeMap<(u32, AnnotationType, u32), Vec<&MaskVolume>> = BTreeMap::new();
    for (key, ann) in data {
        groups
            .entry((key.rater, key.ann_type, key.case_no))
            .or_default()
            .push(&ann.combined);
    }

    let mut by_type: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for ((_, ann_type, _), ratios) in group_ratios(groups) {
        by_type
            .entry(ann_type.dir_name())
            .or_default()
            .push(ratios.unanimous());
    }

    by_type
        .into_iter()
        .map(|(name, vals)| {
            let (mean, std) = agreement::mean_std(&vals).unwrap();
            (
                name,
                ScalarStats {
                    mean,
                    std,
                    n: vals.len(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ann_berry::study::Annotation;
    use ndarray::Array3;

    fn mask(fill: &[(usize, usize, usize)]) -> MaskVolume {
        let mut data = Array3::from_elem((1, 2, 2), false);
        for &pos in fill {
            data[pos] = true;
        }
        MaskVolume::from_parts(data)
    }

    fn annotation(combined: MaskVolume) -> Annotation {
        let shape = Array3::from_elem((1, 2, 2), 0i8);
        Annotation {
            sp: None,
            manual: ManualVolume::from_parts(shape),
            combined,
        }
    }

    fn key(rater: u32, case_no: u32, series: Option<Series>) -> MeasurementKey {
        MeasurementKey {
            rater,
            ann_type: AnnotationType::parse_dir("SPAMANUAL").unwrap(),
            case_no,
            series,
        }
    }

    /// 2 个超像素前景体素 + 1 处增补修正, 修正占比 0.5.
    fn annotation_with_sp() -> Annotation {
        let mut sp = Array3::from_elem((1, 2, 2), false);
        sp[(0, 0, 0)] = true;
        sp[(0, 0, 1)] = true;
        let sp = MaskVolume::from_parts(sp);

        let mut manual = Array3::from_elem((1, 2, 2), 0i8);
        manual[(0, 1, 0)] = 1;
        let manual = ManualVolume::from_parts(manual);

        let combined = sp.apply_corrections(&manual).unwrap();
        Annotation {
            sp: Some(sp),
            manual,
            combined,
        }
    }

    #[test]
    fn test_inter_agreement_aggregation() {
        let mut data = StudyData::new();
        // 两名标注员, 同一病例: 一个体素共同标注, 一个体素单人标注.
        data.insert(key(1, 4, None), annotation(mask(&[(0, 0, 0), (0, 0, 1)])));
        data.insert(key(2, 4, None), annotation(mask(&[(0, 0, 0)])));

        let stats = inter_agreement(&data);
        let s = &stats["SPAMANUAL"];
        assert_eq!(s.cases, 1);
        assert_eq!(s.mean, vec![0.5, 0.5]);
        assert_eq!(s.std, vec![0.0, 0.0]);
    }

    #[test]
    fn test_single_rater_group_is_skipped() {
        let mut data = StudyData::new();
        data.insert(key(1, 4, None), annotation(mask(&[(0, 0, 0)])));
        assert!(inter_agreement(&data).is_empty());
    }

    #[test]
    fn test_correction_ratio_merges_regions_into_buckets() {
        let mut data = StudyData::new();
        let spa = AnnotationType::parse_dir("SPA1000LSC").unwrap();
        let knee = AnnotationType::parse_dir("KNEE1250LSC").unwrap();
        data.insert(
            MeasurementKey {
                rater: 1,
                ann_type: spa,
                case_no: 4,
                series: None,
            },
            annotation_with_sp(),
        );
        data.insert(
            MeasurementKey {
                rater: 1,
                ann_type: knee,
                case_no: 1,
                series: None,
            },
            annotation_with_sp(),
        );
        // 纯手动协议没有超像素侧, 不参与修正占比统计.
        data.insert(key(1, 4, None), annotation(mask(&[(0, 0, 0)])));

        let stats = correction_ratio(&data);
        // 两个部位的 LSC 低密度测量落入同一个协议分组, 组内按部位分列.
        assert_eq!(stats.len(), 1);
        let bucket = &stats["LSC-lower"];
        assert_eq!(bucket.len(), 2);
        assert_eq!((bucket["SIJ"].mean, bucket["SIJ"].n), (0.5, 1));
        assert_eq!((bucket["Knee"].mean, bucket["Knee"].n), (0.5, 1));
    }

    #[test]
    fn test_intra_consistency_uses_series() {
        let mut data = StudyData::new();
        // 同一标注员两个批次完全一致.
        data.insert(key(1, 4, Some(Series::I)), annotation(mask(&[(0, 0, 0)])));
        data.insert(key(1, 4, Some(Series::II)), annotation(mask(&[(0, 0, 0)])));

        let stats = intra_consistency(&data);
        let s = &stats["SPAMANUAL"];
        assert_eq!((s.mean, s.std, s.n), (1.0, 0.0, 1));
    }
}
