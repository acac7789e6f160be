//! 掩膜相似度度量.
//!
//! IoU (交并比) 与 Dice 系数. 当分母为 0 时比较没有意义, 以 `None` 表示;
//! 调用方不得将 `None` 当作 0 参与均值统计.

use crate::{MaskVolume, VolumeAttr};
use ndarray::ArrayView2;

/// 单次遍历统计两个掩膜的交集/并集/各自面积.
///
/// 如果两者形状不符, 则程序 panic.
fn overlap_counts(
    a: ArrayView2<bool>,
    b: ArrayView2<bool>,
) -> (usize, usize, usize, usize) {
    assert_eq!(a.shape(), b.shape(), "掩膜形状不一致");
    let (mut inter, mut union, mut count_a, mut count_b) = (0, 0, 0, 0);
    for (&pa, &pb) in a.iter().zip(b.iter()) {
        inter += usize::from(pa && pb);
        union += usize::from(pa || pb);
        count_a += usize::from(pa);
        count_b += usize::from(pb);
    }
    (inter, union, count_a, count_b)
}

/// 两个二维掩膜的 IoU: `|a ∧ b| / |a ∨ b|`.
///
/// 当并集为空时返回 `None`.
pub fn iou(a: ArrayView2<bool>, b: ArrayView2<bool>) -> Option<f64> {
    let (inter, union, _, _) = overlap_counts(a, b);
    (union > 0).then(|| inter as f64 / union as f64)
}

/// 两个二维掩膜的 Dice 系数: `2 |a ∧ b| / (|a| + |b|)`.
///
/// 当两个掩膜都为空时返回 `None`.
pub fn dice(a: ArrayView2<bool>, b: ArrayView2<bool>) -> Option<f64> {
    let (inter, _, count_a, count_b) = overlap_counts(a, b);
    let total = count_a + count_b;
    (total > 0).then(|| 2.0 * inter as f64 / total as f64)
}

/// 整体 (IoU, Dice) 相似度.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Similarity {
    /// 交并比. 并集为空时无意义.
    pub iou: Option<f64>,

    /// Dice 系数. 两掩膜都为空时无意义.
    pub dice: Option<f64>,
}

/// 按整卷体素计算两个掩膜体数据的 (IoU, Dice).
///
/// 如果两者形状不符, 则程序 panic.
pub fn compare_volumes(a: &MaskVolume, b: &MaskVolume) -> Similarity {
    assert_eq!(a.shape(), b.shape(), "体数据形状不一致");
    let av = a.data();
    let bv = b.data();
    let (mut inter, mut union, mut count_a, mut count_b) = (0usize, 0, 0, 0);
    for (&pa, &pb) in av.iter().zip(bv.iter()) {
        inter += usize::from(pa && pb);
        union += usize::from(pa || pb);
        count_a += usize::from(pa);
        count_b += usize::from(pb);
    }
    Similarity {
        iou: (union > 0).then(|| inter as f64 / union as f64),
        dice: (count_a + count_b > 0).then(|| 2.0 * inter as f64 / (count_a + count_b) as f64),
    }
}

/// 逐切片计算 (IoU, Dice) 后对 **有意义的** 切片取均值.
///
/// 两个掩膜在某切片上都为空时, 该切片不参与均值; 若所有切片都无意义,
/// 则对应均值为 `None`.
///
/// 如果两者形状不符, 则程序 panic.
pub fn compare_by_slice(a: &MaskVolume, b: &MaskVolume) -> Similarity {
    assert_eq!(a.shape(), b.shape(), "体数据形状不一致");

    let mut iou_vals = Vec::with_capacity(a.len_z());
    let mut dice_vals = Vec::with_capacity(a.len_z());
    for (sa, sb) in a.slice_iter().zip(b.slice_iter()) {
        if let Some(v) = iou(sa.array_view(), sb.array_view()) {
            iou_vals.push(v);
        }
        if let Some(v) = dice(sa.array_view(), sb.array_view()) {
            dice_vals.push(v);
        }
    }
    Similarity {
        iou: mean(&iou_vals),
        dice: mean(&dice_vals),
    }
}

/// 均值. 空序列返回 `None`.
#[inline]
fn mean(vals: &[f64]) -> Option<f64> {
    (!vals.is_empty()).then(|| vals.iter().sum::<f64>() / vals.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MaskVolume;
    use ndarray::{array, Array3};

    fn mask(data: Array3<bool>) -> MaskVolume {
        MaskVolume::from_parts(data)
    }

    #[test]
    fn test_iou_identity() {
        let a = array![[true, false], [true, true]];
        assert_eq!(iou(a.view(), a.view()), Some(1.0));
        assert_eq!(dice(a.view(), a.view()), Some(1.0));
    }

    #[test]
    fn test_disjoint_masks() {
        let a = array![[true, false], [false, false]];
        let b = array![[false, true], [false, true]];
        assert_eq!(iou(a.view(), b.view()), Some(0.0));
        assert_eq!(dice(a.view(), b.view()), Some(0.0));
    }

    #[test]
    fn test_empty_union_is_undefined() {
        let a = array![[false, false], [false, false]];
        assert_eq!(iou(a.view(), a.view()), None);
        assert_eq!(dice(a.view(), a.view()), None);
    }

    #[test]
    fn test_dice_not_less_than_iou() {
        // 部分重叠: |a ∧ b| = 1, |a ∨ b| = 3.
        let a = array![[true, true], [false, false]];
        let b = array![[true, false], [true, false]];
        let i = iou(a.view(), b.view()).unwrap();
        let d = dice(a.view(), b.view()).unwrap();
        assert!((i - 1.0 / 3.0).abs() < 1e-12);
        assert!((d - 0.5).abs() < 1e-12);
        assert!(d >= i);
    }

    #[test]
    fn test_compare_by_slice_skips_undefined() {
        // 第 0 切片完全一致, 第 1 切片双空 (不参与均值).
        let a = mask(array![[[true, true]], [[false, false]]]);
        let b = mask(array![[[true, true]], [[false, false]]]);
        let sim = compare_by_slice(&a, &b);
        assert_eq!(sim.iou, Some(1.0));
        assert_eq!(sim.dice, Some(1.0));

        let volume_sim = compare_volumes(&a, &b);
        assert_eq!(volume_sim.iou, Some(1.0));
    }

    #[test]
    fn test_compare_all_empty() {
        let a = mask(Array3::from_elem((2, 2, 2), false));
        let sim = compare_by_slice(&a, &a);
        assert_eq!(sim.iou, None);
        assert_eq!(sim.dice, None);
    }
}
