//! 多标注员一致性统计.

use crate::{ManualVolume, MaskVolume, VolumeAttr};
use ndarray::Array3;

/// 手动修正量与超像素标注量之比: 非零修正体素数 / 超像素前景体素数.
///
/// 比值衡量 "超像素预分割帮了多少忙": 越小说明预分割越接近标注员的意图.
/// 超像素标注为空时比值没有意义, 返回 `None`.
pub fn manual_to_sp_ratio(manual: &ManualVolume, sp: &MaskVolume) -> Option<f64> {
    assert_eq!(manual.shape(), sp.shape(), "体数据形状不一致");
    let sp_area = sp.count_foreground();
    (sp_area > 0).then(|| manual.correction_area() as f64 / sp_area as f64)
}

/// 多标注员的标注面积一致性.
#[derive(Clone, Debug, PartialEq)]
pub struct AgreementRatios {
    /// `ratios[k - 1]`: 被 **恰好** `k` 名标注员标注的体素, 占全部被标注
    /// (至少一人) 体素的比例. 各分量之和为 1, 全空输入时各分量为 0.
    pub ratios: Vec<f64>,
}

impl AgreementRatios {
    /// 被全体标注员一致标注的比例, 即最后一个分量.
    ///
    /// 输入标注员个数为 0 时 panic.
    #[inline]
    pub fn unanimous(&self) -> f64 {
        *self.ratios.last().unwrap()
    }
}

/// 计算多名标注员对同一病例的标注面积一致性.
///
/// 所有掩膜逐体素叠加后, 对 `k = 1..=n` 统计被恰好 `k` 人标注的体素比例.
/// 所有掩膜必须同形状, 且至少有一个, 否则程序 panic.
pub fn agreement_area_ratio(masks: &[&MaskVolume]) -> AgreementRatios {
    let first = masks.first().expect("至少需要一个掩膜");
    let mut stacked = Array3::<u32>::zeros(first.shape());
    for mask in masks {
        assert_eq!(mask.shape(), first.shape(), "体数据形状不一致");
        for (acc, &p) in stacked.iter_mut().zip(mask.data().iter()) {
            *acc += u32::from(p);
        }
    }

    let mut counts = vec![0usize; masks.len()];
    let mut annotated = 0usize;
    for &k in stacked.iter() {
        if k > 0 {
            annotated += 1;
            counts[k as usize - 1] += 1;
        }
    }

    let ratios = counts
        .into_iter()
        .map(|c| {
            if annotated > 0 {
                c as f64 / annotated as f64
            } else {
                0.0
            }
        })
        .collect();
    AgreementRatios { ratios }
}

/// 样本均值与总体标准差. 空序列返回 `None`.
pub fn mean_std(vals: &[f64]) -> Option<(f64, f64)> {
    if vals.is_empty() {
        return None;
    }
    let n = vals.len() as f64;
    let mean = vals.iter().sum::<f64>() / n;
    let var = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ManualVolume, MaskVolume};
    use ndarray::{array, Array3};

    #[test]
    fn test_manual_to_sp_ratio() {
        let sp = MaskVolume::from_parts(array![[[true, true], [true, true]]]);
        let manual = ManualVolume::from_parts(array![[[1i8, 0], [-1, 0]]]);
        // 2 处修正 / 4 体素前景.
        assert_eq!(manual_to_sp_ratio(&manual, &sp), Some(0.5));

        let empty = MaskVolume::from_parts(Array3::from_elem((1, 2, 2), false));
        assert_eq!(manual_to_sp_ratio(&manual, &empty), None);
    }

    #[test]
    fn test_agreement_two_raters() {
        // 体素 a 两人标注, 体素 b 仅一人, 其余无人.
        let m1 = MaskVolume::from_parts(array![[[true, true], [false, false]]]);
        let m2 = MaskVolume::from_parts(array![[[true, false], [false, false]]]);
        let agree = agreement_area_ratio(&[&m1, &m2]);

        assert_eq!(agree.ratios, vec![0.5, 0.5]);
        assert_eq!(agree.unanimous(), 0.5);
        assert!((agree.ratios.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_agreement_all_empty() {
        let empty = MaskVolume::from_parts(Array3::from_elem((1, 2, 2), false));
        let agree = agreement_area_ratio(&[&empty, &empty, &empty]);
        assert_eq!(agree.ratios, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_mean_std() {
        assert_eq!(mean_std(&[]), None);
        let (mean, std) = mean_std(&[2.0, 4.0]).unwrap();
        assert!((mean - 3.0).abs() < 1e-12);
        assert!((std - 1.0).abs() < 1e-12);
    }
}
